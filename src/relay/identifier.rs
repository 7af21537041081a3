//! Correlation identifiers: `tag:YYYY:MM:DD:HH:mm:ss:rand`.

use std::fmt;

use chrono::{Local, NaiveDateTime};
use rand::Rng;

/// Timestamp layout inside an identifier.
const TIMESTAMP_FORMAT: &str = "%Y:%m:%d:%H:%M:%S";

/// Range the random suffix is drawn from.
pub const SUFFIX_RANGE: std::ops::RangeInclusive<u16> = 1000..=9999;

/// Human-shareable correlation token handed back to the submitter and put
/// in the outbound subject line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Build an identifier from its parts. Pure: same inputs, same output.
    pub fn generate(tag: &str, now: NaiveDateTime, suffix: u16) -> Self {
        Self(format!("{tag}:{}:{suffix}", now.format(TIMESTAMP_FORMAT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split an identifier back into (tag, timestamp, suffix).
    ///
    /// Returns `None` for anything not produced by [`Identifier::generate`].
    pub fn parse(raw: &str) -> Option<ParsedIdentifier> {
        // tag + 6 timestamp fields + suffix
        let parts: Vec<&str> = raw.rsplitn(8, ':').collect();
        let [suffix, ss, mm, hh, day, month, year, tag] = parts.as_slice() else {
            return None;
        };
        if tag.is_empty() {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(
            &format!("{year}:{month}:{day}:{hh}:{mm}:{ss}"),
            TIMESTAMP_FORMAT,
        )
        .ok()?;
        Some(ParsedIdentifier {
            tag: (*tag).to_string(),
            timestamp,
            suffix: suffix.parse().ok()?,
        })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Components of a parsed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub tag: String,
    pub timestamp: NaiveDateTime,
    pub suffix: u16,
}

/// Source of the clock reading and random suffix used for identifiers.
///
/// Injected into the orchestrator so tests can pin both.
pub trait IdentifierSource: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    fn suffix(&self) -> u16;

    fn next_identifier(&self, tag: &str) -> Identifier {
        Identifier::generate(tag, self.now(), self.suffix())
    }
}

/// Local wall clock plus thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentifierSource;

impl IdentifierSource for SystemIdentifierSource {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn suffix(&self) -> u16 {
        rand::thread_rng().gen_range(SUFFIX_RANGE)
    }
}

/// Fixed clock and suffix.
#[derive(Debug, Clone, Copy)]
pub struct FixedIdentifierSource {
    pub now: NaiveDateTime,
    pub suffix: u16,
}

impl IdentifierSource for FixedIdentifierSource {
    fn now(&self) -> NaiveDateTime {
        self.now
    }

    fn suffix(&self) -> u16 {
        self.suffix
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn generate_matches_documented_format() {
        let id = Identifier::generate("devcon", at(2023, 1, 1, 12, 0, 0), 123);
        assert_eq!(id.as_str(), "devcon:2023:01:01:12:00:00:123");
    }

    #[test]
    fn generate_zero_pads_time_fields() {
        let id = Identifier::generate("legal", at(2025, 1, 15, 14, 30, 45), 1234);
        assert_eq!(id.to_string(), "legal:2025:01:15:14:30:45:1234");
    }

    #[test]
    fn parse_recovers_components() {
        let parsed = Identifier::parse("legal:2025:01:15:14:30:45:1234").unwrap();
        assert_eq!(parsed.tag, "legal");
        assert_eq!(parsed.timestamp, at(2025, 1, 15, 14, 30, 45));
        assert_eq!(parsed.suffix, 1234);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Identifier::parse("just:some:identifier").is_none());
        assert!(Identifier::parse(":2025:01:15:14:30:45:1234").is_none());
        assert!(Identifier::parse("legal:2025:13:15:14:30:45:1234").is_none());
        assert!(Identifier::parse("legal:2025:01:15:14:30:45:abcd").is_none());
    }

    #[test]
    fn system_suffix_stays_in_range() {
        let source = SystemIdentifierSource;
        for _ in 0..500 {
            assert!(SUFFIX_RANGE.contains(&source.suffix()));
        }
    }

    #[test]
    fn fixed_source_is_deterministic() {
        let source = FixedIdentifierSource {
            now: at(2023, 1, 1, 12, 0, 0),
            suffix: 4321,
        };
        assert_eq!(source.next_identifier("security"), source.next_identifier("security"));
        assert_eq!(
            source.next_identifier("security").as_str(),
            "security:2023:01:01:12:00:00:4321"
        );
    }
}
