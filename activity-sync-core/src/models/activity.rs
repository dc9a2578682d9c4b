use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::record::Record;

/// Wire format for activity timestamps.
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// An activity is a dated event (a meetup, a drinks night, a film) that
/// users browse grouped by day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(with = "wire_date")]
    pub date: NaiveDateTime,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub venue: String,
}

impl Activity {
    pub fn new(title: impl Into<String>, date: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            category: String::new(),
            date,
            city: String::new(),
            venue: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = venue.into();
        self
    }
}

impl Record for Activity {
    fn id(&self) -> &str {
        &self.id
    }

    fn date(&self) -> NaiveDateTime {
        self.date
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Drops sub-second precision; the API reports seven fractional digits
    /// that carry no meaning for display or ordering.
    fn normalize_date(&mut self) {
        self.date = self.date.with_nanosecond(0).unwrap_or(self.date);
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.len().max(10)))?;
        writeln!(f, "When: {}", self.date.format("%Y-%m-%d %H:%M"))?;

        if !self.category.is_empty() {
            writeln!(f, "Category: {}", self.category)?;
        }

        match (self.venue.is_empty(), self.city.is_empty()) {
            (false, false) => writeln!(f, "Where: {}, {}", self.venue, self.city)?,
            (false, true) => writeln!(f, "Where: {}", self.venue)?,
            (true, false) => writeln!(f, "Where: {}", self.city)?,
            (true, true) => {}
        }

        if !self.description.is_empty() {
            writeln!(f, "\n{}", self.description)?;
        }

        Ok(())
    }
}

/// Parses a timestamp in any of the forms the API or a user may supply:
/// RFC 3339 with an offset (converted to UTC), a naive ISO-8601 timestamp
/// with optional fractional seconds, or a naive timestamp without seconds.
pub fn parse_date(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
}

mod wire_date {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(super::DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_date(&s).map_err(serde::de::Error::custom)
    }
}
