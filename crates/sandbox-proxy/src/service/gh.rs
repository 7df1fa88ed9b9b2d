use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DENIED_EXIT_CODE, DISCONNECTED_REASON, ProxyService, denied_response};
use crate::audit::{AuditLog, AuditRecord, AuditRequest, Proxy};
use crate::codec::{self, Response};
use crate::executor::{CommandRunner, ExecOutput};
use crate::extension::{ExtensionContext, ExtensionError};
use crate::policy::PolicyTable;
use crate::repo::RepoSlug;
use crate::validator::{self, ExecutionPlan};

/// The gh proxy: validates argument vectors against the policy table and
/// runs the allowed ones.
#[derive(Clone)]
pub struct GhService {
    policy: Arc<PolicyTable>,
    runner: Arc<dyn CommandRunner>,
    audit: Arc<AuditLog>,
    workspace_repo: Option<RepoSlug>,
}

impl fmt::Debug for GhService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhService")
            .field("audit", &self.audit.path())
            .field("workspace_repo", &self.workspace_repo)
            .finish_non_exhaustive()
    }
}

/// What happened to an allowed request.
struct Completion {
    response: Response,
    record: AuditRecord,
}

impl GhService {
    /// Create a service. Without a workspace repository, extensions that
    /// need one are refused.
    pub fn new(
        policy: Arc<PolicyTable>,
        runner: Arc<dyn CommandRunner>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            policy,
            runner,
            audit,
            workspace_repo: None,
        }
    }

    /// Set the repository write commands and extensions act on.
    pub fn with_workspace_repo(mut self, repo: Option<RepoSlug>) -> Self {
        self.workspace_repo = repo;
        self
    }

    /// Validate `args` and, for extensions, their own arguments. The error
    /// is the denial reason.
    fn authorize(&self, args: &[String]) -> Result<ExecutionPlan, String> {
        let plan = validator::validate(&self.policy, args).map_err(|d| d.to_string())?;
        if let ExecutionPlan::Extension { command, args } = &plan {
            command
                .handler
                .check(args, self.extension_context())
                .map_err(|e| e.to_string())?;
        }
        Ok(plan)
    }

    fn extension_context(&self) -> ExtensionContext<'_> {
        ExtensionContext {
            runner: self.runner.as_ref(),
            workspace_repo: self.workspace_repo.as_ref(),
        }
    }

    async fn execute(&self, plan: ExecutionPlan) -> Result<ExecOutput, ExtensionError> {
        match plan {
            ExecutionPlan::Help(text) => Ok(ExecOutput {
                exit_code: 0,
                stdout: text.into_bytes(),
                ..Default::default()
            }),
            ExecutionPlan::Passthrough { args, .. } => Ok(self.runner.run(&args).await?),
            ExecutionPlan::Extension { command, args } => {
                command.handler.run(&args, self.extension_context()).await
            }
        }
    }

    fn finish(
        &self,
        request: AuditRequest,
        result: Result<ExecOutput, ExtensionError>,
    ) -> Completion {
        match result {
            Ok(output) => {
                let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.truncated {
                    stderr.push_str("gh-proxy: output truncated\n");
                }
                let mut record =
                    AuditRecord::completed(Proxy::Gh, request, Some(output.exit_code));
                if output.timed_out {
                    record = record.with_reason("timed out");
                }
                Completion {
                    response: Response::from_output(output.exit_code, output.stdout, stderr),
                    record,
                }
            }
            Err(e) if e.is_denial() => {
                let reason = e.to_string();
                Completion {
                    response: denied_response(Proxy::Gh, &reason),
                    record: AuditRecord::completed(Proxy::Gh, request, Some(DENIED_EXIT_CODE))
                        .with_reason(reason),
                }
            }
            Err(e) => {
                tracing::warn!("gh-proxy: execution failed: {}", e);
                Completion {
                    response: Response::error(DENIED_EXIT_CODE, format!("gh-proxy: {}\n", e)),
                    record: AuditRecord::completed(Proxy::Gh, request, Some(DENIED_EXIT_CODE))
                        .with_reason(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl ProxyService for GhService {
    fn proxy(&self) -> Proxy {
        Proxy::Gh
    }

    fn audit(&self) -> &AuditLog {
        &self.audit
    }

    async fn handle(&self, frame: &[u8], cancel: CancellationToken) -> Response {
        let request = match codec::decode_gh_request(frame) {
            Ok(request) => request,
            Err(e) => return self.reject(frame, &e).await,
        };
        let args = request.args;

        let plan = match self.authorize(&args) {
            Ok(plan) => plan,
            Err(reason) => {
                tracing::info!(?args, "gh-proxy: denied: {}", reason);
                self.audit
                    .record(&AuditRecord::denied(
                        Proxy::Gh,
                        AuditRequest::Args(args),
                        &reason,
                    ))
                    .await;
                return denied_response(Proxy::Gh, &reason);
            }
        };

        tracing::debug!(?args, "gh-proxy: allowed");
        let mut decision = AuditRecord::allowed(Proxy::Gh, AuditRequest::Args(args.clone()));
        if matches!(plan, ExecutionPlan::Help(_)) {
            decision = decision.with_reason("help");
        }
        // Written before execution so a request cut short by shutdown is
        // still on record.
        self.audit.record(&decision).await;

        // Dropping the execution future kills any child it spawned.
        let result = tokio::select! {
            result = self.execute(plan) => result,
            () = cancel.cancelled() => {
                tracing::info!(?args, "gh-proxy: client disconnected, abandoning request");
                self.audit
                    .record(
                        &AuditRecord::completed(Proxy::Gh, AuditRequest::Args(args), None)
                            .with_reason(DISCONNECTED_REASON),
                    )
                    .await;
                return Response::error(DENIED_EXIT_CODE, DISCONNECTED_REASON);
            }
        };

        let completion = self.finish(AuditRequest::Args(args), result);
        self.audit.record(&completion.record).await;
        completion.response
    }
}
