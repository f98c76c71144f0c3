use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::Regex;

use crate::error::AlertError;
use crate::models::{Event, ShowTime, ShowtimeMatch, ShowtimeQuery};

const DATA_MARKER: &str = "Event";

// The showtime payload is serialized as `"Event":[...],"Date":...` inside an inline script.
static EVENTS_BLOB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"Event":(\[.*?\])\s*,\s*"Date""#).expect("events pattern is valid")
});

/// Best-effort read of the showtime data embedded in a venue page.
///
/// Failing to locate or parse the data is a normal outcome for markup we do not
/// control and comes back as `ShowtimeMatch::default()`, never as an error.
/// `required_attributes` is the venue-specific screen tag (if any) a showtime
/// must carry to count in the title pass.
pub fn extract_showtimes(
    markup: &str,
    query: &ShowtimeQuery,
    required_attributes: Option<&str>,
) -> ShowtimeMatch {
    let events = match parse_events(markup) {
        Ok(Some(events)) => events,
        Ok(None) => return ShowtimeMatch::default(),
        Err(e) => {
            warn!("Embedded showtime data for {} is unusable: {}", query.theatre_url, e);
            return ShowtimeMatch::default();
        }
    };
    debug!("Parsed {} events from {}", events.len(), query.theatre_url);

    let needle = query.movie_name.to_lowercase();

    let by_title = match_by_title(&events, &needle, query, required_attributes);
    if by_title.movie_found {
        return by_title;
    }

    match_by_child_name(&events, &needle, query)
}

/// `Ok(None)` when the page carries no showtime block at all.
pub fn parse_events(markup: &str) -> Result<Option<Vec<Event>>, AlertError> {
    if !markup.contains(DATA_MARKER) {
        debug!("No event marker in page content");
        return Ok(None);
    }

    let Some(captures) = EVENTS_BLOB.captures(markup) else {
        debug!("Event marker present but no event array could be isolated");
        return Ok(None);
    };

    let events: Vec<Event> = serde_json::from_str(&captures[1])
        .map_err(|e| AlertError::Parse(format!("event array: {e}")))?;
    Ok(Some(events))
}

fn match_by_title(
    events: &[Event],
    needle: &str,
    query: &ShowtimeQuery,
    required_attributes: Option<&str>,
) -> ShowtimeMatch {
    let mut result = ShowtimeMatch::default();

    for event in events.iter().filter(|e| e.title.to_lowercase().contains(needle)) {
        result.movie_found = true;
        info!("Found '{}' in event title '{}'", query.movie_name, event.title);

        let bookable = event
            .child_events
            .iter()
            .flat_map(|child| child.show_times.iter())
            .find(|show| is_bookable(show, &query.target_date_code, required_attributes));

        if let Some(show) = bookable {
            info!(
                "Found show time for {} on {} at {}",
                query.movie_name, query.target_date_code, show.time_of_day
            );
            result.has_bookable_showtime = true;
            break;
        }
    }

    result
}

fn match_by_child_name(events: &[Event], needle: &str, query: &ShowtimeQuery) -> ShowtimeMatch {
    let mut result = ShowtimeMatch::default();

    for event in events {
        for child in event.child_events.iter().filter(|c| c.name.to_lowercase().contains(needle)) {
            result.movie_found = true;
            info!("Found '{}' in child event '{}'", query.movie_name, child.name);

            if let Some(show) = child
                .show_times
                .iter()
                .find(|show| is_bookable(show, &query.target_date_code, None))
            {
                info!(
                    "Found show time for {} on {} at {}",
                    query.movie_name, query.target_date_code, show.time_of_day
                );
                result.has_bookable_showtime = true;
                break;
            }
        }

        if result.movie_found {
            break;
        }
    }

    result
}

fn is_bookable(show: &ShowTime, target_date_code: &str, required_attributes: Option<&str>) -> bool {
    if show.date_code != target_date_code {
        return false;
    }
    match required_attributes {
        Some(tag) => show.attributes.as_deref() == Some(tag),
        None => true,
    }
}
