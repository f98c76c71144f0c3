use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use log::{debug, info, warn};
use tokio::process::Command;

/// Runs after the tracking store has been written. Failures stay inside the
/// hook; the saved file is already final by then.
#[async_trait]
pub trait SyncHook: Send + Sync {
    async fn after_save(&self, tracking_file: &Path, entries: usize);
}

/// Commits the tracking file and pushes it, so scheduled runs on fresh
/// checkouts (CI) see what earlier runs already sent.
pub struct GitSync {
    branch: String,
}

impl GitSync {
    pub fn new(branch: impl Into<String>) -> Self {
        Self { branch: branch.into() }
    }
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

async fn git(workdir: &Path, args: &[&str]) -> std::io::Result<GitOutput> {
    debug!("git {}", args.join(" "));
    let output = Command::new("git").args(args).current_dir(workdir).output().await?;
    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

async fn git_step(workdir: &Path, args: &[&str]) -> Result<GitOutput, String> {
    match git(workdir, args).await {
        Ok(out) if out.success => Ok(out),
        Ok(out) => Err(format!("git {} failed: {}", args.join(" "), out.stderr)),
        Err(e) => Err(format!("could not run git {}: {}", args.join(" "), e)),
    }
}

fn workdir_and_name(tracking_file: &Path) -> (PathBuf, String) {
    let workdir = match tracking_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = tracking_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| tracking_file.display().to_string());
    (workdir, name)
}

impl GitSync {
    async fn commit_and_push(&self, tracking_file: &Path, entries: usize) -> Result<(), String> {
        let (workdir, file) = workdir_and_name(tracking_file);

        if !matches!(git(&workdir, &["status"]).await, Ok(out) if out.success) {
            info!("Not in a git repository, skipping git commit");
            return Ok(());
        }

        git_step(&workdir, &["add", file.as_str()]).await?;
        git_step(&workdir, &["config", "--local", "user.email", "showtime-alert@localhost"]).await?;
        git_step(&workdir, &["config", "--local", "user.name", "Showtime Alert Bot"]).await?;

        let status = git_step(&workdir, &["status", "--porcelain", "--", file.as_str()]).await?;
        if status.stdout.trim().is_empty() {
            info!("No changes to commit in tracking file");
            return Ok(());
        }

        let message = format!(
            "Update notification tracking - {} entries - {}",
            entries,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        git_step(&workdir, &["commit", "-m", message.as_str(), "--", file.as_str()]).await?;
        info!("Committed tracking data to git: {}", message);

        match git_step(&workdir, &["push", "origin", self.branch.as_str()]).await {
            Ok(_) => info!("Pushed tracking data to remote repository"),
            Err(e) => warn!("{}; tracking data committed locally but not pushed", e),
        }
        Ok(())
    }
}

#[async_trait]
impl SyncHook for GitSync {
    async fn after_save(&self, tracking_file: &Path, entries: usize) {
        if let Err(e) = self.commit_and_push(tracking_file, entries).await {
            warn!("Tracking data saved to file but not committed to git: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_file_name_runs_in_current_dir() {
        let (dir, name) = workdir_and_name(Path::new("notification_tracking.json"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "notification_tracking.json");
    }

    #[test]
    fn test_nested_file_runs_in_its_directory() {
        let (dir, name) = workdir_and_name(Path::new("state/tracking.json"));
        assert_eq!(dir, PathBuf::from("state"));
        assert_eq!(name, "tracking.json");
    }

    #[tokio::test]
    async fn test_outside_a_repository_is_a_quiet_no_op() {
        let dir = std::env::temp_dir().join(format!("showtime-alert-nogit-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("tracking.json");
        std::fs::write(&file, "{}").unwrap();

        // Either git is missing or the temp dir is not a repository; both end quietly.
        GitSync::new("main").after_save(&file, 0).await;
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "{}");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
