use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::{Error, Result};

/// MS-DOS packed date and time, as stored in ZIP headers.
///
/// The time field holds seconds/2, minutes and hours; the date field holds
/// day, month and years since 1980.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Pack a wall-clock time. Values outside 1980..=2107 are clamped to the
    /// nearest representable instant.
    pub fn from_naive(datetime: &NaiveDateTime) -> Self {
        let datetime = clamp(*datetime);
        let time = (datetime.second() / 2) | (datetime.minute() << 5) | (datetime.hour() << 11);
        let date = datetime.day()
            | (datetime.month() << 5)
            | (((datetime.year() - 1980) as u32) << 9);

        Self {
            time: time as u16,
            date: date as u16,
        }
    }

    /// Pack an instant using the local time zone, as archive tools display it.
    pub fn from_utc(datetime: &DateTime<Utc>) -> Self {
        Self::from_naive(&datetime.with_timezone(&Local).naive_local())
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

fn clamp(datetime: NaiveDateTime) -> NaiveDateTime {
    let min = NaiveDate::from_ymd_opt(1980, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    let max = NaiveDate::from_ymd_opt(2107, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 58));

    match (min, max) {
        (Some(min), _) if datetime < min => min,
        (_, Some(max)) if datetime > max => max,
        _ => datetime,
    }
}

/// A caller-supplied modification time, checked when the entry is
/// normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModTime {
    At(DateTime<Utc>),
    /// Milliseconds since the Unix epoch.
    UnixMillis(i64),
    /// RFC 3339 or RFC 2822 (HTTP-date) text.
    Text(String),
}

impl ModTime {
    pub fn resolve(&self) -> Result<DateTime<Utc>> {
        match self {
            ModTime::At(datetime) => Ok(*datetime),
            ModTime::UnixMillis(millis) => DateTime::from_timestamp_millis(*millis)
                .ok_or_else(|| Error::InvalidModTime(millis.to_string())),
            ModTime::Text(text) => {
                parse_datetime(text).ok_or_else(|| Error::InvalidModTime(text.clone()))
            }
        }
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ModTime {
    fn from(datetime: DateTime<Tz>) -> Self {
        ModTime::At(datetime.with_timezone(&Utc))
    }
}

impl From<SystemTime> for ModTime {
    fn from(time: SystemTime) -> Self {
        ModTime::At(time.into())
    }
}

impl From<&str> for ModTime {
    fn from(text: &str) -> Self {
        ModTime::Text(text.to_string())
    }
}

impl From<String> for ModTime {
    fn from(text: String) -> Self {
        ModTime::Text(text)
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .ok()
        .map(|datetime| datetime.with_timezone(&Utc))
}

/// Parse a `Last-Modified` style header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|datetime| datetime.with_timezone(&Utc))
}
