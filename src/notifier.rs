use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{error, info, warn};

use crate::config::Config;
use crate::error::AlertError;
use crate::models::{AvailabilityResult, OutgoingEmail, RecipientGroup};
use crate::tracking::NotificationTracker;
use crate::utils::{format_body_plain_text, format_subject, recipient_key};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AlertError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub groups_sent: usize,
    pub groups_failed: usize,
    pub theatres_covered: usize,
}

/// Partition results by their exact recipient set. Results whose URL has no
/// recipients are dropped.
pub fn group_by_recipients(results: &[AvailabilityResult], cfg: &Config) -> Vec<RecipientGroup> {
    let mut groups: BTreeMap<Vec<String>, Vec<AvailabilityResult>> = BTreeMap::new();

    for result in results {
        let recipients = recipient_key(&cfg.recipients_for(&result.url));
        if recipients.is_empty() {
            warn!("No emails configured for theatre {}", result.url);
            continue;
        }
        groups.entry(recipients).or_default().push(result.clone());
    }

    groups
        .into_iter()
        .map(|(recipients, results)| RecipientGroup { recipients, results })
        .collect()
}

pub fn compose(group: &RecipientGroup, movie_name: &str) -> OutgoingEmail {
    OutgoingEmail {
        bcc: group.recipients.clone(),
        subject: format_subject(movie_name, &group.results),
        body: format_body_plain_text(movie_name, &group.results),
    }
}

/// Sends one email per recipient group. A failed group is logged and the rest
/// still go out. With a tracker, every theatre of a delivered group is marked
/// sent; saving is left to the caller.
pub async fn dispatch(
    groups: &[RecipientGroup],
    movie_name: &str,
    mailer: &dyn Mailer,
    mut tracker: Option<&mut NotificationTracker>,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for group in groups {
        let email = compose(group, movie_name);

        match mailer.send(&email).await {
            Ok(()) => {
                if let Some(tracker) = tracker.as_deref_mut() {
                    for result in &group.results {
                        tracker.mark_sent(result, movie_name);
                    }
                }
                report.groups_sent += 1;
                report.theatres_covered += group.results.len();

                info!(
                    "Notification email sent to {} recipient(s): {}",
                    group.recipients.len(),
                    group.recipients.join(", ")
                );
                info!(
                    "Email covered {} theatre(s): {:?}",
                    group.results.len(),
                    group.results.iter().map(|r| r.theatre_name.as_str()).collect::<Vec<_>>()
                );
            }
            Err(e) => {
                report.groups_failed += 1;
                error!("Error sending email to {}: {}", group.recipients.join(", "), e);
            }
        }
    }

    report
}

/// Filter (when tracking), group and dispatch this run's available theatres.
pub async fn notify_available(
    available: &[AvailabilityResult],
    cfg: &Config,
    mailer: &dyn Mailer,
    tracker: Option<&mut NotificationTracker>,
) -> DispatchReport {
    let candidates = match tracker.as_deref() {
        Some(tracker) => tracker.filter_new(available, cfg),
        None => available.to_vec(),
    };

    if candidates.is_empty() {
        info!("No new notifications to send - all theatres already notified");
        return DispatchReport::default();
    }

    let groups = group_by_recipients(&candidates, cfg);
    if groups.is_empty() {
        warn!("No valid email recipients found for any available theatres.");
        return DispatchReport::default();
    }

    dispatch(&groups, &cfg.movie_name, mailer, tracker).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::test_config;
    use std::{fs, path::PathBuf, sync::Mutex};

    const PRASADS: &str = "https://in.bookmyshow.com/cinemas/hyderabad/prasads-multiplex-hyderabad/buytickets/PRHN/20250809";
    const SUDARSHAN: &str = "https://in.bookmyshow.com/cinemas/hyderabad/sudarshan-35mm-4k-laser-dolby-atmos-rtc-x-roads/buytickets/SUDA/20250809";
    const AMB: &str = "https://in.bookmyshow.com/cinemas/hyderabad/amb-cinemas-gachibowli/buytickets/AMBH/20250809";

    /// Records every email; fails for any message addressed to `fail_for`.
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub fail_for: Option<String>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), AlertError> {
            if let Some(bad) = &self.fail_for {
                if email.bcc.contains(bad) {
                    return Err(AlertError::Delivery("535 authentication failed".to_string()));
                }
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn available(url: &str) -> AvailabilityResult {
        let (theatre_name, readable_date) = crate::url_info::extract_theatre_info(url);
        AvailabilityResult { url: url.to_string(), theatre_name, readable_date }
    }

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("showtime-alert-notify-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("tracking.json")
    }

    #[test]
    fn test_same_recipients_share_one_group_regardless_of_order() {
        let cfg = test_config(&[
            (PRASADS, "b@example.com, a@example.com"),
            (SUDARSHAN, "a@example.com,b@example.com"),
            (AMB, "c@example.com"),
        ]);

        let forward = group_by_recipients(&[available(PRASADS), available(SUDARSHAN), available(AMB)], &cfg);
        let backward = group_by_recipients(&[available(AMB), available(SUDARSHAN), available(PRASADS)], &cfg);

        assert_eq!(forward.len(), 2);
        assert_eq!(backward.len(), 2);
        assert_eq!(forward[0].recipients, vec!["a@example.com", "b@example.com"]);
        assert_eq!(forward[0].results.len(), 2);
        assert_eq!(forward[1].recipients, vec!["c@example.com"]);
        assert_eq!(
            forward.iter().map(|g| &g.recipients).collect::<Vec<_>>(),
            backward.iter().map(|g| &g.recipients).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_shared_recipients_get_a_single_message() {
        let cfg = test_config(&[(PRASADS, "a@example.com,b@example.com"), (SUDARSHAN, "b@example.com , a@example.com")]);
        let mailer = RecordingMailer::default();

        let report = notify_available(&[available(SUDARSHAN), available(PRASADS)], &cfg, &mailer, None).await;

        assert_eq!(report, DispatchReport { groups_sent: 1, groups_failed: 0, theatres_covered: 2 });
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bcc, vec!["a@example.com", "b@example.com"]);
        assert_eq!(sent[0].subject, "Tickets now available for 'Kingdom' at 2 theatres!");
    }

    #[tokio::test]
    async fn test_failed_group_does_not_block_others() {
        let dir_file = scratch_file("failure");
        let cfg = test_config(&[(PRASADS, "broken@example.com"), (AMB, "ok@example.com")]);
        let mailer = RecordingMailer { fail_for: Some("broken@example.com".to_string()), ..Default::default() };
        let mut tracker = NotificationTracker::load(&dir_file);

        let report = notify_available(&[available(PRASADS), available(AMB)], &cfg, &mailer, Some(&mut tracker)).await;

        assert_eq!(report.groups_sent, 1);
        assert_eq!(report.groups_failed, 1);
        assert_eq!(mailer.sent.lock().unwrap()[0].bcc, vec!["ok@example.com"]);
        assert!(tracker.is_sent(&available(AMB), "Kingdom"));
        assert!(!tracker.is_sent(&available(PRASADS), "Kingdom"));
    }

    #[tokio::test]
    async fn test_second_run_sends_nothing_and_leaves_store_alone() {
        let path = scratch_file("idempotent");
        let cfg = test_config(&[(AMB, "a@example.com")]);
        let results = vec![available(AMB)];

        let first_mailer = RecordingMailer::default();
        let mut tracker = NotificationTracker::load(&path);
        let first = notify_available(&results, &cfg, &first_mailer, Some(&mut tracker)).await;
        assert_eq!(first.groups_sent, 1);
        tracker.save().unwrap();
        let stored = fs::read_to_string(&path).unwrap();

        let second_mailer = RecordingMailer::default();
        let mut tracker = NotificationTracker::load(&path);
        let second = notify_available(&results, &cfg, &second_mailer, Some(&mut tracker)).await;

        assert_eq!(second, DispatchReport::default());
        assert!(second_mailer.sent.lock().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), stored);
    }

    #[tokio::test]
    async fn test_without_tracking_every_run_notifies() {
        let cfg = test_config(&[(AMB, "a@example.com")]);
        let mailer = RecordingMailer::default();

        notify_available(&[available(AMB)], &cfg, &mailer, None).await;
        notify_available(&[available(AMB)], &cfg, &mailer, None).await;

        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_compose_single_theatre() {
        let cfg = test_config(&[(AMB, "a@example.com")]);
        let groups = group_by_recipients(&[available(AMB)], &cfg);
        let email = compose(&groups[0], "Kingdom");
        assert_eq!(email.subject, "Tickets now available for 'Kingdom' at Amb Cinemas Gachibowli on 09/08/2025!");
        assert!(email.body.contains(&format!("Book here: {}", AMB)));
    }
}
