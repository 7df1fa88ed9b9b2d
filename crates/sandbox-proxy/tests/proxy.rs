//! End-to-end tests: real servers on temp-dir sockets, driven through the
//! client, with a fake `gh` so nothing leaves the machine.

#![allow(clippy::unwrap_used, clippy::expect_used)] // unwrap is acceptable in tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use sandbox_proxy::policy::github_policy;
use sandbox_proxy::{
    AuditEvent, AuditLog, AuditRecord, AuditRequest, ClientError, ClipboardCommand,
    ClipboardRequest, ClipboardService, CommandRunner, DENIED_EXIT_CODE, DISCONNECTED_REASON,
    Decision, ExecError, ExecOutput, GhRequest, GhService, ProxyClient, ProxyServer, ProxyService,
};

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("sandbox_proxy=debug")
            .with_test_writer()
            .init();
    });
}

/// Sets a flag when dropped, i.e. when the run future is abandoned.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Stand-in for `gh`: records every vector and echoes it back.
#[derive(Default)]
struct FakeGh {
    calls: Mutex<Vec<Vec<String>>>,
    delay: Option<Duration>,
    exit_code: i32,
    abandoned: Arc<AtomicBool>,
}

#[async_trait]
impl CommandRunner for FakeGh {
    async fn run(&self, args: &[String]) -> Result<ExecOutput, ExecError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let guard = DropFlag(Arc::clone(&self.abandoned));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        std::mem::forget(guard);
        Ok(ExecOutput {
            exit_code: self.exit_code,
            stdout: format!("{}\n", args.join("|")).into_bytes(),
            ..Default::default()
        })
    }
}

struct Harness {
    dir: TempDir,
    socket: PathBuf,
    audit: PathBuf,
    shutdown: CancellationToken,
}

impl Harness {
    fn client(&self) -> ProxyClient {
        ProxyClient::new(&self.socket)
    }

    fn records(&self) -> Vec<AuditRecord> {
        match std::fs::read_to_string(&self.audit) {
            Ok(text) => text
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn wait_for_records(&self, count: usize) -> Vec<AuditRecord> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let records = self.records();
            if records.len() >= count || Instant::now() > deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn start<S, F>(name: &str, make: F) -> Harness
where
    S: ProxyService + 'static,
    F: FnOnce(&Path, Arc<AuditLog>) -> S,
{
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join(".claude-sandbox").join(format!("{name}.sock"));
    let audit = dir.path().join(".claude-sandbox").join(format!("{name}.log"));
    let service = make(dir.path(), Arc::new(AuditLog::new(&audit)));

    let server = ProxyServer::bind(&socket, Arc::new(service)).unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        server
            .serve_with_shutdown(async move { token.cancelled().await })
            .await;
    });

    Harness {
        dir,
        socket,
        audit,
        shutdown,
    }
}

fn start_gh(runner: Arc<FakeGh>) -> Harness {
    start("gh-proxy", |_, audit| {
        GhService::new(Arc::new(github_policy()), runner, audit)
            .with_workspace_repo(Some("owner/repo".parse().unwrap()))
    })
}

fn gh(args: &[&str]) -> GhRequest {
    GhRequest {
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_allowed_command_mirrors_exit_code() {
    let runner = Arc::new(FakeGh {
        exit_code: 3,
        ..Default::default()
    });
    let harness = start_gh(Arc::clone(&runner));

    let response = harness.client().call(&gh(&["pr", "list"])).await.unwrap();

    assert_eq!(response.exit_code, 3);
    assert_eq!(response.stdout.as_deref(), Some("pr|list\n"));
    assert_eq!(*runner.calls.lock().unwrap(), vec![vec!["pr", "list"]]);

    let records = harness.wait_for_records(2).await;
    assert_eq!(records[0].event, AuditEvent::Decision);
    assert_eq!(records[0].decision, Decision::Allowed);
    assert_eq!(records[1].event, AuditEvent::Completion);
    assert_eq!(records[1].exit_code, Some(3));
}

#[tokio::test]
async fn test_liveness_check_leaves_no_record() {
    let runner = Arc::new(FakeGh::default());
    let harness = start_gh(Arc::clone(&runner));

    // Connect and hang up without a request, as a launcher probing the socket does.
    drop(UnixStream::connect(&harness.socket).await.unwrap());

    let response = harness.client().call(&gh(&["pr", "list"])).await.unwrap();
    assert_eq!(response.exit_code, 0);

    let records = harness.wait_for_records(2).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.decision == Decision::Allowed));
}

#[tokio::test]
async fn test_arguments_pass_through_opaquely() {
    let runner = Arc::new(FakeGh::default());
    let harness = start_gh(Arc::clone(&runner));

    let response = harness
        .client()
        .call(&gh(&["pr", "view", "; rm -rf /", "--json", "$(id)"]))
        .await
        .unwrap();

    assert_eq!(response.exit_code, 0);
    assert_eq!(
        *runner.calls.lock().unwrap(),
        vec![vec!["pr", "view", "; rm -rf /", "--json", "$(id)"]]
    );
}

#[tokio::test]
async fn test_write_with_repo_override_denied() {
    let runner = Arc::new(FakeGh::default());
    let harness = start_gh(Arc::clone(&runner));

    let response = harness
        .client()
        .call(&gh(&["pr", "create", "--repo", "other/repo"]))
        .await
        .unwrap();

    assert_eq!(response.exit_code, DENIED_EXIT_CODE);
    assert!(response.stderr.contains("--repo"), "{}", response.stderr);
    assert!(runner.calls.lock().unwrap().is_empty());

    let records = harness.wait_for_records(1).await;
    assert_eq!(records[0].decision, Decision::Denied);
    assert_eq!(
        records[0].request,
        AuditRequest::Args(vec![
            "pr".into(),
            "create".into(),
            "--repo".into(),
            "other/repo".into()
        ])
    );
}

#[tokio::test]
async fn test_unlisted_subcommand_denied() {
    let runner = Arc::new(FakeGh::default());
    let harness = start_gh(Arc::clone(&runner));

    let response = harness
        .client()
        .call(&gh(&["repo", "delete"]))
        .await
        .unwrap();

    assert_eq!(response.exit_code, DENIED_EXIT_CODE);
    assert!(response.stderr.contains("unsupported command"));
    assert!(runner.calls.lock().unwrap().is_empty());
    assert_eq!(harness.wait_for_records(1).await[0].decision, Decision::Denied);
}

#[tokio::test]
async fn test_malformed_request_gets_response() {
    let runner = Arc::new(FakeGh::default());
    let harness = start_gh(Arc::clone(&runner));

    let response = harness.client().call_raw(b"{\"args\": [\n").await.unwrap();
    assert_eq!(response.exit_code, 1);
    assert!(response.stderr.starts_with("gh-proxy: invalid request"));

    let response = harness
        .client()
        .call_raw(b"{\"args\":[\"pr\",\"list\"],\"env\":{\"GH_TOKEN\":\"x\"}}\n")
        .await
        .unwrap();
    assert_eq!(response.exit_code, 1);

    assert!(runner.calls.lock().unwrap().is_empty());
    let records = harness.wait_for_records(2).await;
    assert!(records.iter().all(|r| r.decision == Decision::Denied));
    assert!(matches!(records[0].request, AuditRequest::Raw(_)));
}

#[tokio::test]
async fn test_oversized_request_rejected() {
    let harness = start_gh(Arc::new(FakeGh::default()));

    let mut frame = b"{\"args\":[\"".to_vec();
    frame.extend(std::iter::repeat_n(b'a', 2 * 1024 * 1024));
    frame.extend_from_slice(b"\"]}\n");

    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();
    // The server may stop reading and answer before the whole frame is sent.
    let _ = stream.write_all(&frame).await;
    let mut reply = Vec::new();
    let _ = stream.read_to_end(&mut reply).await;

    if !reply.is_empty() {
        let text = String::from_utf8(reply).unwrap();
        assert!(text.contains("exceeds"), "{text}");
    }
    let records = harness.wait_for_records(1).await;
    assert_eq!(records[0].decision, Decision::Denied);
}

#[tokio::test]
async fn test_one_request_per_connection() {
    let harness = start_gh(Arc::new(FakeGh::default()));

    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();
    stream
        .write_all(b"{\"args\":[\"pr\",\"list\"]}\n{\"args\":[\"pr\",\"view\",\"1\"]}\n")
        .await
        .unwrap();

    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut reply))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reply.lines().count(), 1);
    assert!(reply.ends_with('\n'));
    assert!(reply.contains("pr|list"));
}

#[tokio::test]
async fn test_requests_served_concurrently() {
    let runner = Arc::new(FakeGh {
        delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    let harness = start_gh(runner);

    let started = Instant::now();
    let mut calls = Vec::new();
    for i in 0..8 {
        let client = harness.client();
        calls.push(tokio::spawn(async move {
            client
                .call(&gh(&["pr", "view", &i.to_string()]))
                .await
                .unwrap()
        }));
    }
    for call in calls {
        assert_eq!(call.await.unwrap().exit_code, 0);
    }

    assert!(started.elapsed() < Duration::from_secs(3));
    // A decision and a completion per request.
    assert_eq!(harness.wait_for_records(16).await.len(), 16);
}

#[tokio::test]
async fn test_client_disconnect_abandons_request() {
    let runner = Arc::new(FakeGh {
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let harness = start_gh(Arc::clone(&runner));

    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();
    stream
        .write_all(b"{\"args\":[\"run\",\"view\",\"7\",\"--log\"]}\n")
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while runner.calls.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "request never reached the runner");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event, AuditEvent::Decision);
    assert_eq!(records[0].decision, Decision::Allowed);
    drop(stream);

    let records = harness.wait_for_records(2).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].event, AuditEvent::Completion);
    assert_eq!(records[1].reason.as_deref(), Some(DISCONNECTED_REASON));
    assert_eq!(records[1].exit_code, None);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !runner.abandoned.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "runner was not abandoned");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_run_logs_extension() {
    let runner = Arc::new(FakeGh::default());
    let harness = start_gh(Arc::clone(&runner));

    let response = harness
        .client()
        .call(&gh(&["ext", "run-logs", "12345"]))
        .await
        .unwrap();
    assert_eq!(response.exit_code, 0);
    assert_eq!(
        *runner.calls.lock().unwrap(),
        vec![vec!["api", "/repos/owner/repo/actions/runs/12345/logs"]]
    );
}

#[tokio::test]
async fn test_clipboard_read_image() {
    let png: Vec<u8> = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
        .into_iter()
        .chain(0..=255)
        .collect();
    let harness = start("clipboard-proxy", |dir, audit| {
        let shots = dir.join("Screenshots");
        std::fs::create_dir(&shots).unwrap();
        ClipboardService::new(shots, Duration::from_secs(120), audit)
    });
    std::fs::write(
        harness.dir.path().join("Screenshots").join("shot.png"),
        &png,
    )
    .unwrap();

    let response = harness
        .client()
        .call(&ClipboardRequest::new(ClipboardCommand::ReadImage))
        .await
        .unwrap();

    assert_eq!(response.exit_code, 0);
    assert!(response.stdout.is_none());
    assert_eq!(response.stdout_bytes().unwrap(), png);
    assert_eq!(harness.wait_for_records(2).await[1].exit_code, Some(0));
}

#[tokio::test]
async fn test_clipboard_without_screenshots() {
    let harness = start("clipboard-proxy", |dir, audit| {
        ClipboardService::new(dir.join("missing"), Duration::from_secs(120), audit)
    });

    let response = harness
        .client()
        .call(&ClipboardRequest::new(ClipboardCommand::ReadImage))
        .await
        .unwrap();
    assert_eq!(response.exit_code, 1);
    assert!(response.stderr.starts_with("clipboard-proxy: "));
}

#[tokio::test]
async fn test_socket_removed_after_shutdown() {
    let harness = start_gh(Arc::new(FakeGh::default()));
    assert!(harness.socket.exists());

    harness.shutdown.cancel();
    let deadline = Instant::now() + Duration::from_secs(5);
    while harness.socket.exists() {
        assert!(Instant::now() < deadline, "socket not removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A server that answers every connection with `reply`.
async fn fake_server(socket: PathBuf, reply: &'static [u8]) -> PathBuf {
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(reply).await;
        }
    });
    socket
}

#[tokio::test]
async fn test_client_protocol_errors() {
    let dir = tempfile::tempdir().unwrap();

    let garbage = fake_server(dir.path().join("garbage.sock"), b"not json\n").await;
    let err = ProxyClient::new(garbage)
        .call(&gh(&["pr", "list"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));

    let no_exit_code = fake_server(
        dir.path().join("no-exit-code.sock"),
        b"{\"stdout\":\"x\",\"stderr\":\"\"}\n",
    )
    .await;
    let err = ProxyClient::new(no_exit_code)
        .call(&gh(&["pr", "list"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));

    let err = ProxyClient::new(dir.path().join("nothing.sock"))
        .call(&gh(&["pr", "list"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}
