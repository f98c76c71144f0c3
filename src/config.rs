use std::{
    env,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Deserialize;
use serde_yaml::Deserializer;

use crate::error::AlertError;
use crate::utils::split_emails;

const APP_PREFIX: &str = "showtime-alert";
const CONFIG_FILE: &str = "config.yaml";

// Values shipped in the template; treated as "not configured".
const PLACEHOLDER_EMAIL: &str = "your_email@gmail.com";
const PLACEHOLDER_PASSWORD: &str = "your_email_password";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub movie_name: String,
    pub theatres: Vec<TheatreConfig>,
    pub sender_email: Option<String>,
    pub sender_password: Option<String>,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_true")]
    pub tracking_enabled: bool,
    #[serde(default = "default_tracking_file")]
    pub tracking_file: PathBuf,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_screen_filters")]
    pub screen_filters: Vec<ScreenFilter>,
    #[serde(default)]
    pub git_sync: bool,
    #[serde(default = "default_git_branch")]
    pub git_branch: String,
    pub debug_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TheatreConfig {
    pub url: String,
    /// Comma-separated recipient addresses.
    #[serde(default)]
    pub emails: String,
}

/// Venue-specific rule: on URLs containing `url_marker`, only showtimes whose
/// attributes equal `attributes` are bookable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScreenFilter {
    pub url_marker: String,
    pub attributes: String,
}

#[derive(Debug, Clone)]
pub struct SenderCredentials {
    pub email: String,
    pub password: String,
}

pub struct EnsureOutcome {
    pub path: PathBuf,
    pub created: bool,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_true() -> bool {
    true
}

fn default_tracking_file() -> PathBuf {
    PathBuf::from("notification_tracking.json")
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_screen_filters() -> Vec<ScreenFilter> {
    vec![ScreenFilter {
        url_marker: "prasads".to_string(),
        attributes: "PCX SCREEN".to_string(),
    }]
}

fn default_git_branch() -> String {
    "main".to_string()
}

impl Config {
    pub fn ensure_user_config(custom: Option<&Path>) -> Result<EnsureOutcome> {
        let config_path = match custom {
            Some(path) if path.exists() => {
                return Ok(EnsureOutcome { path: path.to_path_buf(), created: false });
            }
            Some(path) => path.to_path_buf(),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX);
                if let Some(path) = xdg_dirs.find_config_file(CONFIG_FILE) {
                    return Ok(EnsureOutcome { path, created: false });
                }
                xdg_dirs
                    .place_config_file(CONFIG_FILE)
                    .context("Cannot create configuration directory")?
            }
        };

        let mut config_file = File::create(&config_path)
            .with_context(|| format!("Failed to create {}", config_path.display()))?;

        write!(
            &mut config_file,
            r#"# showtime-alert config (YAML)
# movie_name and theatres are required; everything else has a default.

movie_name: "Kingdom"

# One entry per booking page. The last path segment is the show date (YYYYMMDD).
# emails is a comma-separated list; theatres without emails are checked but never notified.
theatres:
  - url: "https://in.bookmyshow.com/cinemas/hyderabad/amb-cinemas-gachibowli/buytickets/AMBH/20250730"
    emails: "you@example.com, friend@example.com"

# Sender account (SENDER_EMAIL / SENDER_PASSWORD env vars take precedence)
sender_email: "{PLACEHOLDER_EMAIL}"
sender_password: "{PLACEHOLDER_PASSWORD}"
smtp_host: "smtp.gmail.com"
smtp_port: 465 # 465 = implicit TLS, 587 = STARTTLS

# Optional
tracking_enabled: true
tracking_file: "notification_tracking.json"
settle_delay_ms: 2000
fetch_timeout_secs: 30
screen_filters:
  - url_marker: "prasads"
    attributes: "PCX SCREEN"
git_sync: false
git_branch: "main"
# debug_dir: "/tmp/showtime-alert"
"#
        )?;

        Ok(EnsureOutcome { path: config_path, created: true })
    }

    pub fn get_user_config(custom: Option<&Path>) -> Result<Config> {
        let path = match custom {
            Some(path) => path.to_path_buf(),
            None => xdg::BaseDirectories::with_prefix(APP_PREFIX)
                .find_config_file(CONFIG_FILE)
                .ok_or_else(|| anyhow!("Could not find configuration file in config::get_user_config"))?,
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut cfg = Self::from_yaml_str(&raw, &path.display().to_string())?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str, origin: &str) -> Result<Config> {
        let deserialized = Deserializer::from_str(raw);
        let mut cfg: Config = serde_path_to_error::deserialize(deserialized).map_err(|e| {
            anyhow!("Invalid YAML in {} at `{}`: {}", origin, e.path(), e.inner())
        })?;
        cfg.theatres = merge_duplicate_theatres(cfg.theatres);
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(email) = env::var("SENDER_EMAIL").ok().filter(|v| !v.trim().is_empty()) {
            self.sender_email = Some(email);
        }
        if let Some(password) = env::var("SENDER_PASSWORD").ok().filter(|v| !v.is_empty()) {
            self.sender_password = Some(password);
        }
    }

    pub fn theatre_urls(&self) -> Vec<String> {
        self.theatres.iter().map(|t| t.url.clone()).collect()
    }

    /// Configured recipients for a theatre URL; empty when the URL is unknown.
    pub fn recipients_for(&self, url: &str) -> Vec<String> {
        self.theatres
            .iter()
            .find(|t| t.url == url)
            .map(|t| split_emails(&t.emails))
            .unwrap_or_default()
    }

    pub fn screen_filter_for(&self, url: &str) -> Option<&str> {
        self.screen_filters
            .iter()
            .find(|f| url.contains(&f.url_marker))
            .map(|f| f.attributes.as_str())
    }

    pub fn sender(&self) -> Result<SenderCredentials, AlertError> {
        let email = self
            .sender_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty() && *e != PLACEHOLDER_EMAIL)
            .ok_or_else(|| AlertError::Config("sender email is not configured".into()))?;
        let password = self
            .sender_password
            .as_deref()
            .filter(|p| !p.is_empty() && *p != PLACEHOLDER_PASSWORD)
            .ok_or_else(|| AlertError::Config("sender password is not configured".into()))?;

        Ok(SenderCredentials {
            email: email.to_string(),
            password: password.to_string(),
        })
    }
}

/// One entry per URL, in first-seen order. Repeated URLs pool their recipients
/// so a page is fetched once and nobody listed under either entry is dropped.
fn merge_duplicate_theatres(theatres: Vec<TheatreConfig>) -> Vec<TheatreConfig> {
    let mut merged: Vec<TheatreConfig> = Vec::with_capacity(theatres.len());
    for theatre in theatres {
        match merged.iter_mut().find(|t| t.url == theatre.url) {
            Some(existing) => {
                warn!("Theatre {} is listed more than once, merging its recipients", theatre.url);
                let mut emails = split_emails(&existing.emails);
                for email in split_emails(&theatre.emails) {
                    if !emails.contains(&email) {
                        emails.push(email);
                    }
                }
                existing.emails = emails.join(", ");
            }
            None => merged.push(theatre),
        }
    }
    merged
}

#[cfg(test)]
pub(crate) fn test_config(theatres: &[(&str, &str)]) -> Config {
    Config {
        movie_name: "Kingdom".to_string(),
        theatres: theatres
            .iter()
            .map(|(url, emails)| TheatreConfig { url: url.to_string(), emails: emails.to_string() })
            .collect(),
        sender_email: Some("bot@example.com".to_string()),
        sender_password: Some("secret".to_string()),
        smtp_host: default_smtp_host(),
        smtp_port: default_smtp_port(),
        tracking_enabled: true,
        tracking_file: default_tracking_file(),
        settle_delay_ms: 0,
        fetch_timeout_secs: 5,
        screen_filters: default_screen_filters(),
        git_sync: false,
        git_branch: default_git_branch(),
        debug_dir: None,
    }
}
