//! Dates, times and durations as ISO-8601 strings.
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::scalar::{textual, ScalarConverter};
use super::{scalar_types, BuiltinTable};
use crate::descriptor::{ClassId, TypeDescriptor};
use crate::shape::{Shape, Typed};

scalar_types!(Duration, NaiveDate, NaiveTime, NaiveDateTime);

// Both instantiations share a family path, so each gets its own class.
impl Typed for DateTime<Utc> {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::class(ClassId::named("chrono::DateTime<Utc>")) }
    fn shape() -> Shape<Self> { Shape::Scalar }
}

impl Typed for DateTime<FixedOffset> {
    fn descriptor() -> TypeDescriptor { TypeDescriptor::class(ClassId::named("chrono::DateTime<FixedOffset>")) }
    fn shape() -> Shape<Self> { Shape::Scalar }
}

static ISO_DURATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d{1,9}))?S)?$").ok());

/// `PT[nH][nM][n[.fff]S]`, the time-only subset of ISO-8601 durations.
fn parse_duration(text: &str) -> Option<Duration> {
    let caps = ISO_DURATION.as_ref()?.captures(text)?;
    if text == "PT" {
        return None;
    }
    let part = |i: usize| -> Option<u64> { caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok()) };
    let secs = part(1)?.checked_mul(3600)?
        .checked_add(part(2)?.checked_mul(60)?)?
        .checked_add(part(3)?)?;
    let nanos = match caps.get(4) {
        Some(m) => format!("{:0<9}", m.as_str()).parse().ok()?,
        None => 0,
    };
    Some(Duration::new(secs, nanos))
}

fn duration_text(value: &Duration) -> String {
    let nanos = value.subsec_nanos();
    if nanos == 0 {
        format!("PT{}S", value.as_secs())
    } else {
        let fraction = format!("{nanos:09}");
        format!("PT{}.{}S", value.as_secs(), fraction.trim_end_matches('0'))
    }
}

pub(crate) fn register(table: &mut BuiltinTable) {
    table.add::<Duration, _>(ScalarConverter::new(
        "Duration",
        |json, _| json.as_str().and_then(parse_duration),
        |value, _| Value::String(duration_text(value)),
    ));
    table.add::<NaiveDate, _>(textual::<NaiveDate>("NaiveDate"));
    table.add::<NaiveTime, _>(textual::<NaiveTime>("NaiveTime"));
    table.add::<NaiveDateTime, _>(textual::<NaiveDateTime>("NaiveDateTime"));
    table.add::<DateTime<FixedOffset>, _>(ScalarConverter::new(
        "DateTime<FixedOffset>",
        |json, _| json.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
        |value, _| Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
    ));
    table.add::<DateTime<Utc>, _>(ScalarConverter::new(
        "DateTime<Utc>",
        |json, _| {
            json.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        },
        |value, _| Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    ));
}

// ------------------------------- Tests ------------------------------------ //
