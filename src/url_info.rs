use chrono::NaiveDate;
use log::warn;
use url::Url;

pub const UNKNOWN_THEATRE: &str = "Unknown Theatre";
pub const UNKNOWN_DATE: &str = "Unknown Date";

// Path: /cinemas/<city>/<theatre-slug>/buytickets/<code>/<YYYYMMDD>
const SLUG_SEGMENT: usize = 2;
const MIN_SEGMENTS: usize = 4;

const THEATRE_ALIASES: &[(&str, &str)] = &[
    ("prasads", "Prasads Multiplex"),
    ("sudarshan", "Sudarshan 35mm"),
];

/// Theatre display name and `DD/MM/YYYY` date for a booking URL.
///
/// Never fails: anything that does not look like a booking URL comes back as
/// (`UNKNOWN_THEATRE`, `UNKNOWN_DATE`) so one bad entry can't stop a run.
pub fn extract_theatre_info(url: &str) -> (String, String) {
    match try_extract(url) {
        Some(info) => info,
        None => {
            warn!("Could not derive theatre info from URL {}", url);
            (UNKNOWN_THEATRE.to_string(), UNKNOWN_DATE.to_string())
        }
    }
}

/// The raw trailing path segment, which the booking site uses as the show date code.
pub fn date_code(url: &str) -> Option<String> {
    path_segments(url)?.last().cloned()
}

fn try_extract(url: &str) -> Option<(String, String)> {
    let segments = path_segments(url)?;
    if segments.len() < MIN_SEGMENTS {
        return None;
    }

    let slug = segments.get(SLUG_SEGMENT)?;
    let date = parse_date_code(segments.last()?)?;

    Some((theatre_display_name(slug), date.format("%d/%m/%Y").to_string()))
}

fn path_segments(url: &str) -> Option<Vec<String>> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<String> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Some(segments)
}

fn parse_date_code(code: &str) -> Option<NaiveDate> {
    if code.len() != 8 || !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(code, "%Y%m%d").ok()
}

fn theatre_display_name(slug: &str) -> String {
    let lower = slug.to_lowercase();
    if let Some((_, alias)) = THEATRE_ALIASES.iter().find(|(needle, _)| lower.contains(*needle)) {
        return alias.to_string();
    }

    lower
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

// A letter is capitalised when it does not follow another letter, so "35mm"
// becomes "35Mm" and "4k" becomes "4K".
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut after_letter = false;
    for c in word.chars() {
        if after_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        after_letter = c.is_alphabetic();
    }
    out
}
