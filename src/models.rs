use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// What the extractor is asked to look for on one booking page.
#[derive(Debug, Clone)]
pub struct ShowtimeQuery {
    pub movie_name: String,
    pub target_date_code: String, // YYYYMMDD
    pub theatre_url: String,
}

// Shapes of the showtime blob the booking site embeds in its pages.
// Missing keys, nulls and numbers where text is expected are all tolerated so
// one odd field can't hide the rest of the payload.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(rename = "EventTitle", default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(rename = "ChildEvents", default, deserialize_with = "null_as_empty")]
    pub child_events: Vec<ChildEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChildEvent {
    #[serde(rename = "EventName", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "ShowTimes", default, deserialize_with = "null_as_empty")]
    pub show_times: Vec<ShowTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowTime {
    #[serde(rename = "ShowDateCode", default, deserialize_with = "lenient_string")]
    pub date_code: String,
    #[serde(rename = "ShowTime", default, deserialize_with = "lenient_string")]
    pub time_of_day: String,
    #[serde(rename = "Attributes", default, deserialize_with = "lenient_opt_string")]
    pub attributes: Option<String>,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowtimeMatch {
    pub movie_found: bool,
    pub has_bookable_showtime: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub url: String,
    pub theatre_name: String,
    pub readable_date: String,
}

/// Only the key matters for dedup; a record missing fields still counts as sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub theatre_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sent_at: String, // RFC 3339
    #[serde(default, deserialize_with = "lenient_string")]
    pub movie_name: String,
}

/// Theatres that share exactly the same recipients, reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientGroup {
    pub recipients: Vec<String>,
    pub results: Vec<AvailabilityResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}
