/**
 * EXIF processing module - original capture date extraction
 *
 * Extraction is a two-step affair:
 * 1. A MetadataReader turns the raw payload into a field-name -> value map
 *    (kamadak-exif by default, any JPEG/TIFF/HEIF/PNG/WebP container)
 * 2. DateTimeOriginal (+ OffsetTimeOriginal, + SubSecTimeOriginal) is decoded
 *    by the TimestampCodec
 *
 * Every failure along the way means "no authoritative date", never an error.
 */

use chrono::{DateTime, Duration, Utc};
use exif::{Field, In, Reader as ExifReader, Value};
use log::debug;
use std::collections::HashMap;
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::timestamp::TimestampCodec;

pub const DATE_TIME_ORIGINAL: &str = "DateTimeOriginal";
pub const OFFSET_TIME_ORIGINAL: &str = "OffsetTimeOriginal";
pub const SUBSEC_TIME_ORIGINAL: &str = "SubSecTimeOriginal";

/// Reads the embedded metadata block of an image payload.
pub trait MetadataReader: Send + Sync {
    /// Field name -> raw value, or `None` when no recognised metadata block exists.
    fn read_fields(&self, payload: &[u8]) -> Option<HashMap<String, String>>;
}

/// MetadataReader backed by kamadak-exif.
#[derive(Debug, Clone, Copy, Default)]
pub struct KamadakReader;

impl KamadakReader {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataReader for KamadakReader {
    fn read_fields(&self, payload: &[u8]) -> Option<HashMap<String, String>> {
        let parsed = catch_unwind(AssertUnwindSafe(|| {
            let mut cursor = Cursor::new(payload);
            ExifReader::new().read_from_container(&mut cursor)
        }));

        let exif = match parsed {
            Ok(Ok(exif)) => exif,
            Ok(Err(e)) => {
                debug!("kamadak-exif found no usable metadata: {}", e);
                return None;
            }
            Err(_) => {
                debug!("kamadak-exif panicked on a malformed payload");
                return None;
            }
        };

        let mut metadata = HashMap::new();

        // Thumbnail directory fields never shadow the primary image's
        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            metadata.insert(field.tag.to_string(), field_text(field, &exif));
        }

        Some(metadata)
    }
}

/// ASCII fields keep their raw text; kamadak's display form reformats dates.
fn field_text(field: &Field, exif: &exif::Exif) -> String {
    match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .unwrap_or_default(),
        _ => field.display_value().with_unit(exif).to_string(),
    }
}

/// Raw capture fields as found in the payload, plus the decoded date.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginalCapture {
    pub timestamp: DateTime<Utc>,
    pub milliseconds: u16,
    pub raw_timestamp: String,
    pub raw_offset: Option<String>,
}

pub struct MetadataExtractor<R = KamadakReader> {
    reader: R,
    codec: TimestampCodec,
}

impl MetadataExtractor<KamadakReader> {
    /// kamadak-exif reader, system timezone fallback
    pub fn new() -> Self {
        Self::with_reader(KamadakReader, TimestampCodec::new())
    }

    pub fn with_codec(codec: TimestampCodec) -> Self {
        Self::with_reader(KamadakReader, codec)
    }
}

impl Default for MetadataExtractor<KamadakReader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: MetadataReader> MetadataExtractor<R> {
    pub fn with_reader(reader: R, codec: TimestampCodec) -> Self {
        Self { reader, codec }
    }

    /// The embedded original capture date, or `None` when the payload has no
    /// metadata block, no DateTimeOriginal, or one that does not decode.
    pub fn extract_original_date(&self, payload: &[u8]) -> Option<DateTime<Utc>> {
        self.extract_capture(payload).map(|capture| capture.timestamp)
    }

    pub fn extract_capture(&self, payload: &[u8]) -> Option<OriginalCapture> {
        let metadata = self.reader.read_fields(payload)?;
        self.capture_from_fields(&metadata)
    }

    /// Decode capture fields from an already-read metadata map.
    pub fn capture_from_fields(&self, metadata: &HashMap<String, String>) -> Option<OriginalCapture> {
        let raw_timestamp = metadata.get(DATE_TIME_ORIGINAL).map(|v| clean_ascii(v))?;
        let raw_offset = metadata
            .get(OFFSET_TIME_ORIGINAL)
            .map(|v| clean_ascii(v))
            .filter(|v| !v.is_empty());

        let timestamp = match self.codec.decode(&raw_timestamp, raw_offset.as_deref()) {
            Ok(dt) => dt,
            Err(e) => {
                debug!("Discarding capture date: {}", e);
                return None;
            }
        };

        let milliseconds = metadata
            .get(SUBSEC_TIME_ORIGINAL)
            .and_then(|v| parse_subseconds(&clean_ascii(v)))
            .unwrap_or(0);

        Some(OriginalCapture {
            timestamp: timestamp + Duration::milliseconds(i64::from(milliseconds)),
            milliseconds,
            raw_timestamp,
            raw_offset,
        })
    }
}

fn clean_ascii(value: &str) -> String {
    value
        .trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace())
        .to_string()
}

/// "68" -> 680, "123456" -> 123; anything non-numeric is ignored.
fn parse_subseconds(value: &str) -> Option<u16> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = &value[..value.len().min(3)];
    format!("{:0<3}", digits).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_writer::ExifBlockWriter;
    use crate::timestamp::FixedTimezone;

    fn extractor() -> MetadataExtractor {
        MetadataExtractor::with_codec(TimestampCodec::with_timezone(FixedTimezone::utc()))
    }

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    fn jpeg(timestamp: &str, offset: Option<&str>, subsec: Option<&str>) -> Vec<u8> {
        let mut writer = ExifBlockWriter::new();
        writer.add_capture_time(timestamp, offset, subsec).unwrap();
        writer.to_jpeg_bytes()
    }

    #[test]
    fn extracts_offset_aware_date_from_jpeg() {
        let payload = jpeg("2024:01:15 14:30:00", Some("+09:00"), None);
        assert_eq!(
            extractor().extract_original_date(&payload),
            Some(utc("2024-01-15T05:30:00Z"))
        );
    }

    #[test]
    fn extracts_from_big_endian_tiff() {
        let mut writer = ExifBlockWriter::new().big_endian();
        writer.add_capture_time("2019:12:31 23:00:00", Some("-02:00"), None).unwrap();
        assert_eq!(
            extractor().extract_original_date(&writer.to_tiff_bytes()),
            Some(utc("2020-01-01T01:00:00Z"))
        );
    }

    #[test]
    fn subseconds_are_added() {
        let payload = jpeg("2024:06:01 12:00:01", None, Some("68"));
        let capture = extractor().extract_capture(&payload).unwrap();
        assert_eq!(capture.milliseconds, 680);
        assert_eq!(capture.timestamp, utc("2024-06-01T12:00:01.680Z"));
        assert_eq!(capture.raw_offset, None);
    }

    #[test]
    fn bad_subseconds_are_ignored() {
        let payload = jpeg("2024:06:01 12:00:01", None, Some("abc"));
        assert_eq!(
            extractor().extract_original_date(&payload),
            Some(utc("2024-06-01T12:00:01Z"))
        );
    }

    #[test]
    fn no_metadata_block_is_absent() {
        let ex = extractor();
        assert_eq!(ex.extract_original_date(&[]), None);
        assert_eq!(ex.extract_original_date(b"definitely not an image"), None);
        // JPEG with no APP1 segment
        assert_eq!(ex.extract_original_date(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
    }

    #[test]
    fn truncated_payload_is_absent() {
        let payload = jpeg("2024:01:15 14:30:00", Some("+09:00"), None);
        let ex = extractor();
        for len in [1, 3, 5, 12, 20, payload.len() / 2] {
            assert_eq!(ex.extract_original_date(&payload[..len]), None, "len {}", len);
        }
    }

    #[test]
    fn missing_or_malformed_original_timestamp_is_absent() {
        let mut writer = ExifBlockWriter::new();
        writer.add_ascii_tag("DateTime", "2024:01:15 14:30:00").unwrap();
        assert_eq!(extractor().extract_original_date(&writer.to_jpeg_bytes()), None);

        let payload = jpeg("2024-01-15 14:30:00", Some("+09:00"), None);
        assert_eq!(extractor().extract_original_date(&payload), None);

        let payload = jpeg("0000:00:00 00:00:00", None, None);
        assert_eq!(extractor().extract_original_date(&payload), None);
    }

    #[test]
    fn thumbnail_directory_does_not_supply_capture_date() {
        let mut writer = ExifBlockWriter::new();
        writer.add_ascii_tag("Make", "Acme").unwrap();
        writer.add_thumbnail_ascii_tag("DateTime", "2001:01:01 00:00:00").unwrap();
        let fields = KamadakReader.read_fields(&writer.to_jpeg_bytes()).unwrap();
        assert_eq!(fields.get("Make").map(|s| s.as_str()), Some("Acme"));
        assert!(!fields.contains_key("DateTime"));
    }

    struct MapReader(Option<HashMap<String, String>>);

    impl MetadataReader for MapReader {
        fn read_fields(&self, _payload: &[u8]) -> Option<HashMap<String, String>> {
            self.0.clone()
        }
    }

    #[test]
    fn raw_values_are_trimmed_before_decoding() {
        let fields: HashMap<String, String> = [
            (DATE_TIME_ORIGINAL.to_string(), "2024:01:15 14:30:00\0".to_string()),
            (OFFSET_TIME_ORIGINAL.to_string(), " +09:00\0".to_string()),
        ]
        .into_iter()
        .collect();
        let ex = MetadataExtractor::with_reader(
            MapReader(Some(fields)),
            TimestampCodec::with_timezone(FixedTimezone::utc()),
        );
        assert_eq!(ex.extract_original_date(b""), Some(utc("2024-01-15T05:30:00Z")));
    }

    #[test]
    fn reader_absence_propagates() {
        let ex = MetadataExtractor::with_reader(MapReader(None), TimestampCodec::new());
        assert_eq!(ex.extract_capture(b"anything"), None);
    }

    #[test]
    fn subsecond_parsing() {
        assert_eq!(parse_subseconds("5"), Some(500));
        assert_eq!(parse_subseconds("123456"), Some(123));
        assert_eq!(parse_subseconds("007"), Some(7));
        assert_eq!(parse_subseconds(""), None);
        assert_eq!(parse_subseconds("1.5"), None);
    }
}
