use chrono::{Datelike, DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::error::AppError;

const REQUIRED_FIELDS: &[&str] = &["title"];
const ALLOWED_FIELDS: &[&str] = &[
    "title",
    "created_at",
    "start",
    "finish",
    "public",
    "description",
    "complete",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%B %d %Y"];

/// A persisted journal entry. `complete` is stored but kept out of responses.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Trip {
    pub id: i64,
    pub title: String,
    pub username: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
    pub start: Option<String>,
    pub finish: Option<String>,
    pub public: bool,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub complete: bool,
}

/// Fields a client may supply when creating a trip.
#[derive(Debug, Deserialize)]
struct TripFields {
    title: String,
    created_at: Option<String>,
    start: Option<String>,
    finish: Option<String>,
    public: Option<bool>,
    description: Option<String>,
    complete: Option<bool>,
}

/// A validated trip that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrip {
    pub username: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub start: Option<String>,
    pub finish: Option<String>,
    pub public: bool,
    pub description: Option<String>,
    pub complete: bool,
}

impl NewTrip {
    pub fn new(username: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            title: title.into(),
            created_at: Utc::now().trunc_subsecs(6),
            start: None,
            finish: None,
            public: true,
            description: None,
            complete: false,
        }
    }

    /// Builds a trip for `username` from a client payload, rejecting missing
    /// required fields and anything outside the allowed field set.
    pub fn from_payload(username: &str, payload: Value) -> Result<Self, AppError> {
        let Value::Object(fields) = payload else {
            return Err(AppError::Validation(
                "Failed to decode JSON object: expected a JSON object".into(),
            ));
        };

        check_field_set(&fields)?;

        let fields: TripFields = serde_json::from_value(Value::Object(fields))
            .map_err(|err| AppError::Validation(format!("invalid trip: {err}")))?;

        let mut trip = NewTrip::new(username, fields.title);
        if let Some(raw) = fields.created_at {
            trip.created_at = parse_timestamp(&raw)?;
        }
        trip.start = fields.start;
        trip.finish = fields.finish;
        trip.description = fields.description;
        trip.public = fields.public.unwrap_or(true);
        trip.complete = fields.complete.unwrap_or(false);
        Ok(trip)
    }
}

fn check_field_set(fields: &Map<String, Value>) -> Result<(), AppError> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|name| !fields.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "missing fields: {}",
            missing.join(" ")
        )));
    }

    let mut unexpected: Vec<&str> = fields
        .keys()
        .map(String::as_str)
        .filter(|name| !ALLOWED_FIELDS.contains(name))
        .collect();
    unexpected.sort_unstable();
    if !unexpected.is_empty() {
        return Err(AppError::Validation(format!(
            "unexpected fields: {}",
            unexpected.join(" ")
        )));
    }

    Ok(())
}

/// Parses a caller-supplied timestamp, accepting ISO-8601 and a handful of
/// common written forms. Values without an offset are taken as UTC.
/// The UTC year must fit in four digits so the stored text stays sortable.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let input = raw.trim();
    parse_any(input)
        .filter(|ts| (0..=9999).contains(&ts.year()))
        .map(|ts| ts.trunc_subsecs(6))
        .ok_or_else(|| AppError::Validation(format!("invalid timestamp: {raw}")))
}

fn parse_any(input: &str) -> Option<DateTime<Utc>> {
    if input.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(input) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(ts) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(input, fmt).ok())
    {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(ts) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
    {
        return Some(ts.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Canonical text form of a timestamp, used both on the wire and in storage.
/// Fixed width, so lexical order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}
