//! Screenshot selection for the clipboard proxy.
//!
//! The directory is scanned on every request. Only regular files directly
//! inside it with an image extension are considered; the newest one by
//! modification time is returned if it is fresh enough.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

/// Default freshness threshold.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(120);

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Reasons no screenshot is returned.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    /// The directory could not be listed.
    #[error("cannot read screenshot directory {}: {source}", .path.display())]
    Unreadable {
        /// Directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// No image files in the directory.
    #[error("no screenshots found in {}", .0.display())]
    NoImages(PathBuf),
    /// The newest image is older than the threshold.
    #[error(
        "no recent screenshot found (newest is {}s old, must be under {}s)",
        .age.as_secs(),
        .max_age.as_secs()
    )]
    Stale {
        /// The newest image
        path: PathBuf,
        /// Its age
        age: Duration,
        /// The threshold
        max_age: Duration,
    },
    /// The selected image could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Image path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// An image file and its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotCandidate {
    /// Full path
    pub path: PathBuf,
    /// Last modification time
    pub modified: SystemTime,
}

/// A selected screenshot.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Where it was read from
    pub path: PathBuf,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// The newest image in `dir`, regardless of age.
pub async fn newest_image(dir: &Path) -> Result<ScreenshotCandidate, ScreenshotError> {
    let unreadable = |source| ScreenshotError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
    let mut newest: Option<ScreenshotCandidate> = None;
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let path = entry.path();
        if !is_image(&path) {
            continue;
        }
        // Symlinks are not followed.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if newest.as_ref().is_none_or(|n| modified > n.modified) {
            newest = Some(ScreenshotCandidate { path, modified });
        }
    }

    newest.ok_or_else(|| ScreenshotError::NoImages(dir.to_path_buf()))
}

/// Return the newest image in `dir` if it is at most `max_age` old.
///
/// A modification time in the future counts as age zero.
pub async fn latest_image(dir: &Path, max_age: Duration) -> Result<Screenshot, ScreenshotError> {
    let candidate = newest_image(dir).await?;
    let age = SystemTime::now()
        .duration_since(candidate.modified)
        .unwrap_or(Duration::ZERO);
    if age > max_age {
        return Err(ScreenshotError::Stale {
            path: candidate.path,
            age,
            max_age,
        });
    }

    let bytes = tokio::fs::read(&candidate.path)
        .await
        .map_err(|source| ScreenshotError::Read {
            path: candidate.path.clone(),
            source,
        })?;
    tracing::debug!("selected {} ({} bytes)", candidate.path.display(), bytes.len());
    Ok(Screenshot {
        path: candidate.path,
        bytes,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::fs::File;

    use super::*;

    fn write_aged(dir: &Path, name: &str, contents: &[u8], age: Duration) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[tokio::test]
    async fn test_selects_fresh_image_skipping_non_images() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(dir.path(), "notes.txt", b"text", Duration::from_secs(10));
        let fresh = write_aged(dir.path(), "b.png", b"fresh", Duration::from_secs(90));
        write_aged(dir.path(), "c.png", b"old", Duration::from_secs(200));

        let shot = latest_image(dir.path(), Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(shot.path, fresh);
        assert_eq!(shot.bytes, b"fresh");
    }

    #[tokio::test]
    async fn test_newest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let newest = write_aged(dir.path(), "a.png", b"a", Duration::from_secs(10));
        write_aged(dir.path(), "b.jpg", b"b", Duration::from_secs(90));
        write_aged(dir.path(), "c.gif", b"c", Duration::from_secs(200));

        let shot = latest_image(dir.path(), DEFAULT_MAX_AGE).await.unwrap();
        assert_eq!(shot.path, newest);
    }

    #[tokio::test]
    async fn test_all_stale_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(dir.path(), "a.png", b"a", Duration::from_secs(200));
        write_aged(dir.path(), "b.png", b"b", Duration::from_secs(300));

        let err = latest_image(dir.path(), Duration::from_secs(120))
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenshotError::Stale { .. }));
        assert!(err.to_string().contains("no recent screenshot"));
    }

    #[tokio::test]
    async fn test_empty_and_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            latest_image(dir.path(), DEFAULT_MAX_AGE).await,
            Err(ScreenshotError::NoImages(_))
        ));

        let missing = dir.path().join("missing");
        assert!(matches!(
            latest_image(&missing, DEFAULT_MAX_AGE).await,
            Err(ScreenshotError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn test_extension_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let shot = write_aged(dir.path(), "Shot.PNG", b"x", Duration::from_secs(1));
        assert_eq!(newest_image(dir.path()).await.unwrap().path, shot);
    }

    #[tokio::test]
    async fn test_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub.png");
        std::fs::create_dir(&sub).unwrap();
        write_aged(&sub, "inner.png", b"x", Duration::from_secs(1));

        assert!(matches!(
            newest_image(dir.path()).await,
            Err(ScreenshotError::NoImages(_))
        ));
    }

    #[tokio::test]
    async fn test_future_mtime_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.png");
        std::fs::write(&path, b"x").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();

        assert!(latest_image(dir.path(), DEFAULT_MAX_AGE).await.is_ok());
    }
}
