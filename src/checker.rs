use std::{fs, path::Path, time::Duration};

use chrono::Local;
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AlertError;
use crate::extractor::extract_showtimes;
use crate::fetcher::PageFetcher;
use crate::models::{AvailabilityResult, ShowtimeMatch, ShowtimeQuery};
use crate::url_info::{date_code, extract_theatre_info};

const CORROBORATING_KEYWORDS: &[&str] = &["showtimes", "book tickets", "buy tickets"];

pub struct AvailabilityChecker<'a> {
    fetcher: &'a dyn PageFetcher,
    cfg: &'a Config,
}

impl<'a> AvailabilityChecker<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, cfg: &'a Config) -> Self {
        Self { fetcher, cfg }
    }

    /// Checks theatres one at a time, in order. A failing theatre is logged and
    /// skipped; it never stops the others.
    pub async fn check_all(&self, urls: &[String], movie_name: &str) -> Vec<AvailabilityResult> {
        info!("Checking for {} at {} theatres", movie_name, urls.len());
        let mut available = Vec::new();

        for url in urls {
            info!("Checking {}", url);
            match self.check_one(url, movie_name).await {
                Ok(true) => {
                    let (theatre_name, readable_date) = extract_theatre_info(url);
                    info!("{} is available at {} on {}!", movie_name, theatre_name, readable_date);
                    available.push(AvailabilityResult {
                        url: url.clone(),
                        theatre_name,
                        readable_date,
                    });
                }
                Ok(false) => info!("Movie not found at {}", url),
                Err(e) => error!("Error checking {}: {}", url, e),
            }
        }

        if available.is_empty() {
            info!("{} not found at any of the theatres.", movie_name);
        } else {
            info!("Found {} at {} theatre(s)", movie_name, available.len());
        }
        available
    }

    async fn check_one(&self, url: &str, movie_name: &str) -> Result<bool, AlertError> {
        let markup = self.fetch_bounded(url).await?;

        let query = ShowtimeQuery {
            movie_name: movie_name.to_string(),
            target_date_code: date_code(url).unwrap_or_default(),
            theatre_url: url.to_string(),
        };

        let mut outcome = extract_showtimes(&markup, &query, self.cfg.screen_filter_for(url));

        if !outcome.movie_found && mentions_movie(&markup, movie_name) {
            info!("Found {} in page content (fallback)", movie_name);
            outcome.movie_found = true;
        }

        if outcome.movie_found && !outcome.has_bookable_showtime {
            info!(
                "Movie {} found but no show times available for date {}",
                movie_name, query.target_date_code
            );
        }

        if let Some(dir) = &self.cfg.debug_dir {
            if let Err(e) = dump_debug(dir, &query, &markup, outcome) {
                warn!("Could not write debug output to {}: {}", dir.display(), e);
            }
        }

        Ok(outcome.movie_found && outcome.has_bookable_showtime)
    }

    async fn fetch_bounded(&self, url: &str) -> Result<String, AlertError> {
        let limit = Duration::from_secs(self.cfg.fetch_timeout_secs)
            + Duration::from_millis(self.cfg.settle_delay_ms);

        match tokio::time::timeout(limit, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Fetch {
                url: url.to_string(),
                reason: format!("no response within {}s", limit.as_secs()),
            }),
        }
    }
}

/// Plain-text fallback: the name alone is too weak (menus, promos), so it must
/// come with a quoted or path-style mention or a booking keyword.
pub fn mentions_movie(markup: &str, movie_name: &str) -> bool {
    let content = markup.to_lowercase();
    let movie = movie_name.to_lowercase();

    if movie.is_empty() || !content.contains(&movie) {
        return false;
    }

    content.contains(&format!("\"{}\"", movie))
        || content.contains(&format!("/{}/", movie))
        || CORROBORATING_KEYWORDS.iter().any(|k| content.contains(k))
}

fn dump_debug(
    dir: &Path,
    query: &ShowtimeQuery,
    markup: &str,
    outcome: ShowtimeMatch,
) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f");

    let page_path = dir.join(format!("page_content_{}.html", timestamp));
    fs::write(&page_path, markup)?;

    let summary = format!(
        "URL: {}\nMovie: {}\nTarget Date: {}\nMovie Found: {}\nHas Showtimes: {}\n",
        query.theatre_url,
        query.movie_name,
        query.target_date_code,
        outcome.movie_found,
        outcome.has_bookable_showtime
    );
    fs::write(dir.join(format!("summary_{}.txt", timestamp)), summary)?;

    debug!("Saved debug output to {}", page_path.display());
    Ok(())
}
