use std::path::Path;

use crate::checker::AvailabilityChecker;
use crate::config::{Config, EnsureOutcome};
use crate::email::SmtpMailer;
use crate::fetcher::{HttpPageFetcher, PageFetcher};
use crate::logger::init_logger;
use crate::models::AvailabilityResult;
use crate::notifier::{notify_available, Mailer};
use crate::sync::{GitSync, SyncHook};
use crate::tracking::NotificationTracker;

use anyhow::Result;
use log::{debug, error, info, warn};

pub struct RunOptions<'a> {
    pub config_path: Option<&'a Path>,
    pub no_email: bool,
    pub no_tracking: bool,
    pub verbose: bool,
}

pub async fn run_once(opts: RunOptions<'_>) -> Result<()> {
    // 0) Initialize logger
    init_logger(opts.verbose)?;
    debug!("Logger initialized");

    // 1) Ensure config exists
    let config_outcome: EnsureOutcome = Config::ensure_user_config(opts.config_path)?;
    if config_outcome.created {
        warn!(
            "Config file created at {}. Please edit it and restart the app.",
            config_outcome.path.display()
        );
        return Ok(());
    }

    let mut cfg = Config::get_user_config(Some(config_outcome.path.as_path()))?;
    if opts.no_tracking {
        cfg.tracking_enabled = false;
    }
    debug!("User config loaded from {}", config_outcome.path.display());

    info!("Movie notification check started!");
    info!("Checking for '{}'", cfg.movie_name);

    // 2) Check every theatre
    let fetcher = HttpPageFetcher::new(&cfg)?;
    let available = check_theatres(&fetcher, &cfg).await;

    if available.is_empty() {
        info!("Movie not found. No notification sent.");
        return Ok(());
    }

    if opts.no_email {
        info!("--no-email flag set, skipping email notifications");
        return Ok(());
    }

    // 3) Notify
    let sender = match cfg.sender() {
        Ok(sender) => sender,
        Err(e) => {
            warn!("{}. Skipping email notification.", e);
            return Ok(());
        }
    };
    info!("Attempting to send emails from {}", sender.email);
    info!("Using SMTP server: {}:{}", cfg.smtp_host, cfg.smtp_port);

    let mailer = match SmtpMailer::new(&cfg, &sender) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!("{}. Skipping email notification.", e);
            return Ok(());
        }
    };

    let sync_hook: Option<GitSync> = cfg.git_sync.then(|| GitSync::new(cfg.git_branch.clone()));
    notify_and_record(&available, &cfg, &mailer, sync_hook.as_ref().map(|h| h as &dyn SyncHook)).await;

    info!("Check completed. Exiting...");
    Ok(())
}

pub async fn check_theatres(fetcher: &dyn PageFetcher, cfg: &Config) -> Vec<AvailabilityResult> {
    let urls = cfg.theatre_urls();
    AvailabilityChecker::new(fetcher, cfg)
        .check_all(&urls, &cfg.movie_name)
        .await
}

/// Dispatch, then persist the tracking store once, then sync it. The store is
/// only written when at least one email actually went out.
pub async fn notify_and_record(
    available: &[AvailabilityResult],
    cfg: &Config,
    mailer: &dyn Mailer,
    sync_hook: Option<&dyn SyncHook>,
) {
    if !cfg.tracking_enabled {
        debug!("Tracking disabled, every available theatre is notified");
        let report = notify_available(available, cfg, mailer, None).await;
        info!("Sent {} email(s), {} failed", report.groups_sent, report.groups_failed);
        return;
    }

    let mut tracker = NotificationTracker::load(&cfg.tracking_file);
    let report = notify_available(available, cfg, mailer, Some(&mut tracker)).await;
    info!("Sent {} email(s), {} failed", report.groups_sent, report.groups_failed);

    if report.theatres_covered == 0 {
        return;
    }

    if let Err(e) = tracker.save() {
        error!("Error saving notification tracking: {}", e);
        return;
    }

    if let Some(hook) = sync_hook {
        hook.after_save(tracker.path(), tracker.len()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::tests::{kingdom_page, FakeFetcher, AMB_30, AMB_31};
    use crate::config::test_config;
    use crate::notifier::tests::RecordingMailer;
    use async_trait::async_trait;
    use std::{fs, path::PathBuf, sync::Mutex};

    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<(PathBuf, usize)>>,
    }

    #[async_trait]
    impl SyncHook for RecordingHook {
        async fn after_save(&self, tracking_file: &Path, entries: usize) {
            self.calls.lock().unwrap().push((tracking_file.to_path_buf(), entries));
        }
    }

    fn tracked_config(name: &str) -> Config {
        let dir = std::env::temp_dir().join(format!("showtime-alert-app-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let mut cfg = test_config(&[(AMB_30, "a@example.com"), (AMB_31, "a@example.com")]);
        cfg.tracking_file = dir.join("tracking.json");
        cfg
    }

    #[tokio::test]
    async fn test_full_pipeline_is_idempotent() {
        let cfg = tracked_config("pipeline");
        let fetcher = FakeFetcher::with(&[
            (AMB_30, kingdom_page("20250730", None)),
            (AMB_31, kingdom_page("20250730", None)),
        ]);
        let hook = RecordingHook::default();

        let available = check_theatres(&fetcher, &cfg).await;
        assert_eq!(available.len(), 1);

        let mailer = RecordingMailer::default();
        notify_and_record(&available, &cfg, &mailer, Some(&hook)).await;
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
        assert_eq!(*hook.calls.lock().unwrap(), vec![(cfg.tracking_file.clone(), 1)]);
        let stored = fs::read_to_string(&cfg.tracking_file).unwrap();

        let available = check_theatres(&fetcher, &cfg).await;
        let mailer = RecordingMailer::default();
        notify_and_record(&available, &cfg, &mailer, Some(&hook)).await;

        assert!(mailer.sent.lock().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&cfg.tracking_file).unwrap(), stored);
        assert_eq!(hook.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_store_unwritten() {
        let cfg = tracked_config("undelivered");
        let available = vec![AvailabilityResult {
            url: AMB_30.to_string(),
            theatre_name: "Amb Cinemas Gachibowli".to_string(),
            readable_date: "30/07/2025".to_string(),
        }];
        let mailer = RecordingMailer { fail_for: Some("a@example.com".to_string()), ..Default::default() };
        let hook = RecordingHook::default();

        notify_and_record(&available, &cfg, &mailer, Some(&hook)).await;

        assert!(!cfg.tracking_file.exists());
        assert!(hook.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tracking_disabled_never_touches_the_store() {
        let mut cfg = tracked_config("untracked");
        cfg.tracking_enabled = false;
        let available = vec![AvailabilityResult {
            url: AMB_30.to_string(),
            theatre_name: "Amb Cinemas Gachibowli".to_string(),
            readable_date: "30/07/2025".to_string(),
        }];
        let mailer = RecordingMailer::default();

        notify_and_record(&available, &cfg, &mailer, None).await;
        notify_and_record(&available, &cfg, &mailer, None).await;

        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
        assert!(!cfg.tracking_file.exists());
    }
}
