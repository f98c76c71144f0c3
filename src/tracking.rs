use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{Local, Utc};
use log::{error, info, warn};

use crate::config::Config;
use crate::error::AlertError;
use crate::models::{AvailabilityResult, NotificationRecord};

/// Who has already been told about which (theatre, date, movie).
///
/// Backed by a JSON object on disk. Keys are only ever added, so once a
/// theatre/date/movie is recorded it is never reported as new again.
#[derive(Debug)]
pub struct NotificationTracker {
    path: PathBuf,
    records: BTreeMap<String, NotificationRecord>,
}

pub fn notification_key(result: &AvailabilityResult, movie_name: &str) -> String {
    format!("{}_{}_{}", result.theatre_name, result.readable_date, movie_name)
}

impl NotificationTracker {
    /// Never fails: a missing or empty file is a fresh start, and a corrupt one
    /// is moved aside so the run can continue.
    pub fn load(path: &Path) -> Self {
        let records = match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => {
                info!("Notification tracking file is empty, starting fresh");
                BTreeMap::new()
            }
            Ok(raw) => match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&raw) {
                Ok(entries) => {
                    let records = records_from(entries);
                    info!("Loaded notification tracking data: {} entries", records.len());
                    records
                }
                Err(e) => {
                    error!("Invalid JSON in notification tracking file: {}", e);
                    quarantine(path);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No notification tracking file found, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                error!("Error loading notification tracking from {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self { path: path.to_path_buf(), records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_sent(&self, result: &AvailabilityResult, movie_name: &str) -> bool {
        self.records.contains_key(&notification_key(result, movie_name))
    }

    /// Records a successful dispatch. An existing record is left as it was.
    pub fn mark_sent(&mut self, result: &AvailabilityResult, movie_name: &str) {
        self.records
            .entry(notification_key(result, movie_name))
            .or_insert_with(|| NotificationRecord {
                theatre_url: result.url.clone(),
                sent_at: Utc::now().to_rfc3339(),
                movie_name: movie_name.to_string(),
            });
    }

    /// Results that still need an email: never notified, and somebody to tell.
    pub fn filter_new(&self, results: &[AvailabilityResult], cfg: &Config) -> Vec<AvailabilityResult> {
        results
            .iter()
            .filter(|result| {
                if cfg.recipients_for(&result.url).is_empty() {
                    warn!("No emails configured for theatre {}", result.url);
                    return false;
                }
                if self.is_sent(result, &cfg.movie_name) {
                    info!(
                        "Notification already sent for {} on {}",
                        result.theatre_name, result.readable_date
                    );
                    return false;
                }
                info!(
                    "New notification needed for {} on {}",
                    result.theatre_name, result.readable_date
                );
                true
            })
            .cloned()
            .collect()
    }

    pub fn save(&self) -> Result<(), AlertError> {
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| AlertError::Parse(format!("tracking data: {e}")))?;

        // Write beside the store, then swap it in, so a crash never leaves half a file.
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!("Saved notification tracking data: {} entries", self.records.len());
        Ok(())
    }
}

// Any JSON object is a usable store. An entry whose record has an unexpected
// shape keeps its key, since the key alone is what suppresses a repeat alert.
fn records_from(entries: serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, NotificationRecord> {
    entries
        .into_iter()
        .map(|(key, value)| {
            let record = serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Tracking entry '{}' has an unexpected shape ({}), keeping it as sent", key, e);
                NotificationRecord::default()
            });
            (key, record)
        })
        .collect()
}

fn quarantine(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(format!(".backup.{}", Local::now().format("%Y%m%d_%H%M%S")));
    let backup = PathBuf::from(backup);

    match fs::rename(path, &backup) {
        Ok(()) => info!("Corrupted tracking file backed up as {}", backup.display()),
        Err(e) => error!("Failed to back up corrupted tracking file: {}", e),
    }
}
