/**
 * Capture timestamp decoding
 *
 * EXIF records capture times as "YYYY:MM:DD HH:MM:SS" wall-clock strings, with the
 * UTC offset (if any) stored in a separate "±HH:MM" field. When the offset is missing
 * or unusable the wall-clock time is read in a fallback timezone, which defaults to the
 * timezone of the machine doing the decoding.
 */

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use log::debug;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::TimestampError;

const EXIF_TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

// ASCII digit classes only; `\d` would also accept non-ASCII digits.
fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]{4}:[0-9]{2}:[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}$")
            .expect("timestamp pattern is valid")
    })
}

fn offset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([+-])([0-9]{2}):?([0-9]{2})$").expect("offset pattern is valid")
    })
}

/// Source of the timezone used for capture times that carry no offset of their own.
pub trait TimezoneProvider: Send + Sync {
    /// Map a wall-clock time to an absolute time, or `None` if that wall-clock time
    /// does not exist in the zone.
    fn to_utc(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>>;

    fn name(&self) -> String;
}

/// The timezone of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimezone;

impl TimezoneProvider for SystemTimezone {
    fn to_utc(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        // DST folds resolve to the earlier instant
        Local
            .from_local_datetime(local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn name(&self) -> String {
        "system local time".to_string()
    }
}

/// A pinned UTC offset, mostly useful to make decoding deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimezone(FixedOffset);

impl FixedTimezone {
    pub fn new(offset: FixedOffset) -> Self {
        Self(offset)
    }

    pub fn utc() -> Self {
        Self(Utc.fix())
    }
}

impl TimezoneProvider for FixedTimezone {
    fn to_utc(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        self.0
            .from_local_datetime(local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn name(&self) -> String {
        format!("fixed offset {}", self.0)
    }
}

/// Parse a "±HH:MM", "±HHMM" or "Z" offset string.
pub fn parse_utc_offset(text: &str) -> Result<FixedOffset, TimestampError> {
    if text == "Z" {
        return Ok(Utc.fix());
    }

    let caps = offset_pattern()
        .captures(text)
        .ok_or_else(|| TimestampError::InvalidOffset(text.to_string()))?;

    let sign = if &caps[1] == "-" { -1 } else { 1 };
    let hours: i32 = caps[2]
        .parse()
        .map_err(|_| TimestampError::InvalidOffset(text.to_string()))?;
    let minutes: i32 = caps[3]
        .parse()
        .map_err(|_| TimestampError::InvalidOffset(text.to_string()))?;

    if hours > 23 || minutes > 59 {
        return Err(TimestampError::InvalidOffset(text.to_string()));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| TimestampError::InvalidOffset(text.to_string()))
}

/// Parse the wall-clock part of an EXIF timestamp without attaching any timezone.
pub fn parse_local_timestamp(text: &str) -> Result<NaiveDateTime, TimestampError> {
    if !timestamp_pattern().is_match(text) {
        return Err(TimestampError::Malformed(text.to_string()));
    }

    // The pattern guarantees the shape; chrono still rejects out-of-range fields
    // such as month 13 or the all-zero placeholder some cameras write.
    NaiveDateTime::parse_from_str(text, EXIF_TIMESTAMP_FORMAT)
        .map_err(|_| TimestampError::Malformed(text.to_string()))
}

/// Decodes EXIF capture timestamps into absolute times.
#[derive(Clone)]
pub struct TimestampCodec {
    fallback: Arc<dyn TimezoneProvider>,
}

impl TimestampCodec {
    /// Codec that falls back to the system timezone.
    pub fn new() -> Self {
        Self::with_timezone(SystemTimezone)
    }

    pub fn with_timezone(provider: impl TimezoneProvider + 'static) -> Self {
        Self {
            fallback: Arc::new(provider),
        }
    }

    /// Decode `timestamp` ("YYYY:MM:DD HH:MM:SS") as local time at `offset`.
    ///
    /// A missing or unparseable offset is not an error: the timestamp is then read in
    /// the fallback timezone. Only a malformed timestamp (or a wall-clock time that the
    /// fallback zone skips over) fails.
    pub fn decode(&self, timestamp: &str, offset: Option<&str>) -> Result<DateTime<Utc>, TimestampError> {
        let naive = parse_local_timestamp(timestamp)?;

        if let Some(raw_offset) = offset {
            match parse_utc_offset(raw_offset) {
                Ok(offset) => {
                    return offset
                        .from_local_datetime(&naive)
                        .single()
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok_or_else(|| TimestampError::Nonexistent(timestamp.to_string()));
                }
                Err(e) => {
                    debug!("Ignoring offset for {}: {}", timestamp, e);
                }
            }
        }

        debug!("Reading {} in {}", timestamp, self.fallback.name());
        self.fallback
            .to_utc(&naive)
            .ok_or_else(|| TimestampError::Nonexistent(timestamp.to_string()))
    }
}

impl Default for TimestampCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimestampCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampCodec")
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::MetadataExtractor;
    use crate::exif_writer::ExifBlockWriter;
    use chrono::LocalResult;

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    fn fixed(hours: i32) -> FixedTimezone {
        FixedTimezone::new(FixedOffset::east_opt(hours * 3600).unwrap())
    }

    #[test]
    fn offset_shifts_wall_clock_to_utc() {
        let codec = TimestampCodec::with_timezone(FixedTimezone::utc());
        let dt = codec.decode("2024:01:15 14:30:00", Some("+09:00")).unwrap();
        assert_eq!(dt, utc("2024-01-15T05:30:00Z"));
    }

    #[test]
    fn compact_and_negative_offsets() {
        let codec = TimestampCodec::with_timezone(FixedTimezone::utc());
        assert_eq!(
            codec.decode("2024:01:15 14:30:00", Some("+0900")).unwrap(),
            utc("2024-01-15T05:30:00Z")
        );
        assert_eq!(
            codec.decode("2024:01:15 14:30:00", Some("-05:30")).unwrap(),
            utc("2024-01-15T20:00:00Z")
        );
        assert_eq!(
            codec.decode("2024:01:15 14:30:00", Some("Z")).unwrap(),
            utc("2024-01-15T14:30:00Z")
        );
    }

    #[test]
    fn explicit_offset_ignores_fallback_timezone() {
        let east = TimestampCodec::with_timezone(fixed(5));
        let west = TimestampCodec::with_timezone(fixed(-8));
        let system = TimestampCodec::new();

        let a = east.decode("2023:07:04 23:59:59", Some("-03:00")).unwrap();
        let b = west.decode("2023:07:04 23:59:59", Some("-03:00")).unwrap();
        let c = system.decode("2023:07:04 23:59:59", Some("-03:00")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, utc("2023-07-05T02:59:59Z"));
    }

    #[test]
    fn missing_offset_uses_fallback_timezone() {
        let codec = TimestampCodec::with_timezone(FixedTimezone::utc());
        assert_eq!(
            codec.decode("2024:06:01 12:00:01", None).unwrap(),
            utc("2024-06-01T12:00:01Z")
        );

        let tokyo = TimestampCodec::with_timezone(fixed(9));
        assert_eq!(
            tokyo.decode("2024:06:01 12:00:01", None).unwrap(),
            utc("2024-06-01T03:00:01Z")
        );
    }

    #[test]
    fn unparseable_offset_falls_back_instead_of_failing() {
        let codec = TimestampCodec::with_timezone(fixed(2));
        for bad in ["+9:00", "09:00", "+24:00", "+05:60", "", "  ", "+05:00:00"] {
            assert_eq!(
                codec.decode("2024:06:01 12:00:00", Some(bad)).unwrap(),
                utc("2024-06-01T10:00:00Z"),
                "offset {:?}",
                bad
            );
        }
    }

    #[test]
    fn malformed_timestamps_are_rejected() {
        let codec = TimestampCodec::with_timezone(FixedTimezone::utc());
        for bad in [
            "",
            "2024-01-15 14:30:00",
            "2024:1:15 14:30:00",
            "2024:01:15T14:30:00",
            "2024:01:15 14:30",
            "2024:01:15 14:30:00.123",
            " 2024:01:15 14:30:00",
            "2024:13:01 00:00:00",
            "2024:02:30 00:00:00",
            "2024:01:15 25:00:00",
            "0000:00:00 00:00:00",
            "２０２４:01:15 14:30:00",
        ] {
            assert!(
                matches!(codec.decode(bad, Some("+00:00")), Err(TimestampError::Malformed(_))),
                "timestamp {:?}",
                bad
            );
        }
    }

    /// Springs forward over 02:00-03:00 and falls back over 01:00-02:00 on fixed days.
    struct TransitionZone;

    impl TimezoneProvider for TransitionZone {
        fn to_utc(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
            let summer = FixedOffset::east_opt(2 * 3600).unwrap();
            let winter = FixedOffset::east_opt(3600).unwrap();
            let hour = local.format("%H").to_string();
            let resolved = match (local.format("%m-%d").to_string().as_str(), hour.as_str()) {
                ("03-31", "02") => LocalResult::None,
                ("10-27", "01") => LocalResult::Ambiguous(
                    summer.from_local_datetime(local).unwrap(),
                    winter.from_local_datetime(local).unwrap(),
                ),
                _ => winter.from_local_datetime(local),
            };
            resolved.earliest().map(|dt| dt.with_timezone(&Utc))
        }

        fn name(&self) -> String {
            "transition zone".to_string()
        }
    }

    #[test]
    fn wall_clock_in_dst_gap_does_not_exist() {
        let codec = TimestampCodec::with_timezone(TransitionZone);
        assert_eq!(
            codec.decode("2024:03:31 02:30:00", None),
            Err(TimestampError::Nonexistent("2024:03:31 02:30:00".to_string()))
        );
        // An explicit offset bypasses the zone entirely
        assert_eq!(
            codec.decode("2024:03:31 02:30:00", Some("+01:00")).unwrap(),
            utc("2024-03-31T01:30:00Z")
        );

        let mut writer = ExifBlockWriter::new();
        writer.add_capture_time("2024:03:31 02:30:00", None, None).unwrap();
        let extractor = MetadataExtractor::with_codec(TimestampCodec::with_timezone(TransitionZone));
        assert_eq!(extractor.extract_original_date(&writer.to_jpeg_bytes()), None);
    }

    #[test]
    fn wall_clock_in_dst_fold_takes_earlier_instant() {
        let codec = TimestampCodec::with_timezone(TransitionZone);
        assert_eq!(
            codec.decode("2024:10:27 01:30:00", None).unwrap(),
            utc("2024-10-26T23:30:00Z")
        );
        assert_eq!(
            codec.decode("2024:10:27 03:30:00", None).unwrap(),
            utc("2024-10-27T02:30:00Z")
        );
    }

    #[test]
    fn offset_parser_bounds() {
        assert_eq!(parse_utc_offset("+23:59").unwrap().local_minus_utc(), 23 * 3600 + 59 * 60);
        assert_eq!(parse_utc_offset("-0000").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("+2400").is_err());
        assert!(parse_utc_offset("0900").is_err());
    }
}
