use std::fmt;

use chrono::{DateTime, FixedOffset, Local, TimeZone};

use crate::error::TypeError;

/// Name, email and timestamp recorded as a commit's author or committer.
///
/// Serialized as `Name <email> <unix-seconds> <+hhmm>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
    pub time: DateTime<FixedOffset>,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>, time: DateTime<FixedOffset>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
        }
    }

    /// An author stamped with the current local time.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let local = Local::now();
        Self::new(name, email, local.with_timezone(local.offset()))
    }

    /// Parse the `Name <email> 1574646618 -0300` form.
    pub fn parse(line: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidAuthor(line.to_string());

        let (name, rest) = line.split_once('<').ok_or_else(invalid)?;
        let (email, time) = rest.split_once('>').ok_or_else(invalid)?;

        let mut fields = time.split_whitespace();
        let seconds: i64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;
        let offset = fields.next().and_then(parse_offset).ok_or_else(invalid)?;
        let time = offset.timestamp_opt(seconds, 0).single().ok_or_else(invalid)?;

        Ok(Self::new(name.trim(), email.trim(), time))
    }

    /// Long human form, e.g. `Wed Dec 25 17:54:00 2019 -0300`.
    pub fn readable_time(&self) -> String {
        self.time.format("%a %b %-d %H:%M:%S %Y %z").to_string()
    }

    /// `YYYY-MM-DD` in the author's own zone.
    pub fn short_date(&self) -> String {
        self.time.format("%Y-%m-%d").to_string()
    }

    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.time.timestamp(),
            self.time.format("%z")
        )
    }
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    if tz.len() != 5 {
        return None;
    }
    let sign = match &tz[..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i32 = tz[1..3].parse().ok()?;
    let minutes: i32 = tz[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let line = "A. U. Thor <author@example.com> 1574646618 -0300";
        let author = Author::parse(line).unwrap();
        assert_eq!(author.name, "A. U. Thor");
        assert_eq!(author.email, "author@example.com");
        assert_eq!(author.timestamp(), 1574646618);
        assert_eq!(author.to_string(), line);
    }

    #[test]
    fn readable_time_uses_author_zone() {
        let author = Author::parse("x <x@y> 1577307240 -0300").unwrap();
        assert_eq!(author.readable_time(), "Wed Dec 25 17:54:00 2019 -0300");
        assert_eq!(author.short_date(), "2019-12-25");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(Author::parse("no email here").is_err());
        assert!(Author::parse("x <x@y> notanumber +0000").is_err());
        assert!(Author::parse("x <x@y> 12 0000").is_err());
    }
}
