/**
 * EXIF block writer - builds minimal TIFF/JPEG payloads carrying capture tags
 *
 * Used to produce realistic metadata blocks for tests and benchmarks:
 * - TIFF header with selectable endianness
 * - IFD0 with an ExifIFDPointer to the Exif sub-IFD
 * - Optional IFD1 (thumbnail directory)
 * - JPEG wrapping via an APP1 "Exif" segment
 */

use anyhow::{Context, Result};
use std::path::Path;

/// EXIF tag types as defined in EXIF specification
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExifTagType {
    Ascii = 2,
    Long = 4,
}

/// EXIF tag definition
#[derive(Debug, Clone)]
pub struct ExifTag {
    pub tag_id: u16,
    pub tag_type: ExifTagType,
    pub count: u32,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directory {
    Primary,
    Exif,
}

const EXIF_IFD_POINTER: u16 = 0x8769;

/// Tag name to (tag ID, owning directory)
fn lookup_tag(tag_name: &str) -> Option<(u16, Directory)> {
    let entry = match tag_name {
        "Make" => (0x010F, Directory::Primary),
        "DateTime" => (0x0132, Directory::Primary),
        "DateTimeOriginal" => (0x9003, Directory::Exif),
        "OffsetTimeOriginal" => (0x9011, Directory::Exif),
        "SubSecTimeOriginal" => (0x9291, Directory::Exif),
        _ => return None,
    };
    Some(entry)
}

/// Builder for EXIF metadata blocks
#[derive(Debug, Clone)]
pub struct ExifBlockWriter {
    primary: Vec<ExifTag>,
    exif: Vec<ExifTag>,
    thumbnail: Vec<ExifTag>,
    is_little_endian: bool,
}

impl ExifBlockWriter {
    pub fn new() -> Self {
        Self {
            primary: Vec::new(),
            exif: Vec::new(),
            thumbnail: Vec::new(),
            is_little_endian: true,
        }
    }

    /// Switch to Motorola (big-endian) byte order
    pub fn big_endian(mut self) -> Self {
        self.is_little_endian = false;
        self
    }

    /// Add the original-capture tags in one go
    pub fn add_capture_time(
        &mut self,
        timestamp: &str,
        offset: Option<&str>,
        subsec: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_ascii_tag("DateTimeOriginal", timestamp)?;
        if let Some(offset) = offset {
            self.add_ascii_tag("OffsetTimeOriginal", offset)?;
        }
        if let Some(subsec) = subsec {
            self.add_ascii_tag("SubSecTimeOriginal", subsec)?;
        }
        Ok(self)
    }

    /// Add an ASCII string tag to the directory that owns it
    pub fn add_ascii_tag(&mut self, tag_name: &str, value: &str) -> Result<&mut Self> {
        let (tag_id, directory) = lookup_tag(tag_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown EXIF tag: {}", tag_name))?;
        let tag = ascii_tag(tag_id, value);
        match directory {
            Directory::Primary => self.primary.push(tag),
            Directory::Exif => self.exif.push(tag),
        }
        Ok(self)
    }

    /// Add an ASCII tag to the thumbnail directory (IFD1)
    pub fn add_thumbnail_ascii_tag(&mut self, tag_name: &str, value: &str) -> Result<&mut Self> {
        let (tag_id, _) = lookup_tag(tag_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown EXIF tag: {}", tag_name))?;
        self.thumbnail.push(ascii_tag(tag_id, value));
        Ok(self)
    }

    /// Raw TIFF-structured EXIF data
    pub fn to_tiff_bytes(&self) -> Vec<u8> {
        let mut primary = self.primary.clone();
        let mut exif = self.exif.clone();
        let mut thumbnail = self.thumbnail.clone();

        // Value of the ExifIFDPointer is patched below once offsets are known
        if !exif.is_empty() {
            primary.push(ExifTag {
                tag_id: EXIF_IFD_POINTER,
                tag_type: ExifTagType::Long,
                count: 1,
                value: vec![0; 4],
            });
        }
        primary.sort_by_key(|t| t.tag_id);
        exif.sort_by_key(|t| t.tag_id);
        thumbnail.sort_by_key(|t| t.tag_id);

        let ifd0_offset = 8u32;
        let exif_offset = ifd0_offset + ifd_len(&primary);
        let thumbnail_offset = if exif.is_empty() {
            exif_offset
        } else {
            exif_offset + ifd_len(&exif)
        };

        if let Some(pointer) = primary.iter_mut().find(|t| t.tag_id == EXIF_IFD_POINTER) {
            pointer.value = self.u32_bytes(exif_offset).to_vec();
        }

        let mut data = Vec::new();
        self.write_tiff_header(&mut data, ifd0_offset);

        let next_after_primary = if thumbnail.is_empty() { 0 } else { thumbnail_offset };
        self.write_ifd(&mut data, &primary, next_after_primary);
        if !exif.is_empty() {
            self.write_ifd(&mut data, &exif, 0);
        }
        if !thumbnail.is_empty() {
            self.write_ifd(&mut data, &thumbnail, 0);
        }

        data
    }

    /// A JPEG stream whose only content is the APP1 Exif segment
    pub fn to_jpeg_bytes(&self) -> Vec<u8> {
        let tiff = self.to_tiff_bytes();
        let mut segment = Vec::with_capacity(tiff.len() + 6);
        segment.extend_from_slice(b"Exif\0\0");
        segment.extend_from_slice(&tiff);

        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE1];
        // Segment length includes its own two bytes
        data.extend_from_slice(&((segment.len() + 2) as u16).to_be_bytes());
        data.extend_from_slice(&segment);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    pub fn write_jpeg(&self, file_path: &Path) -> Result<()> {
        std::fs::write(file_path, self.to_jpeg_bytes())
            .with_context(|| format!("Failed to write JPEG to {}", file_path.display()))
    }

    /// Write TIFF header (8 bytes)
    fn write_tiff_header(&self, data: &mut Vec<u8>, first_ifd: u32) {
        if self.is_little_endian {
            data.extend_from_slice(b"II");
        } else {
            data.extend_from_slice(b"MM");
        }
        data.extend_from_slice(&self.u16_bytes(42));
        data.extend_from_slice(&self.u32_bytes(first_ifd));
    }

    /// Write an IFD followed by its out-of-line values, starting at `data.len()`
    fn write_ifd(&self, data: &mut Vec<u8>, entries: &[ExifTag], next_ifd_offset: u32) {
        let ifd_start = data.len() as u32;
        let mut value_offset = ifd_start + 2 + 12 * entries.len() as u32 + 4;
        let mut values = Vec::new();

        data.extend_from_slice(&self.u16_bytes(entries.len() as u16));
        for entry in entries {
            data.extend_from_slice(&self.u16_bytes(entry.tag_id));
            data.extend_from_slice(&self.u16_bytes(entry.tag_type as u16));
            data.extend_from_slice(&self.u32_bytes(entry.count));

            if entry.value.len() <= 4 {
                let mut inline = entry.value.clone();
                inline.resize(4, 0);
                data.extend_from_slice(&inline);
            } else {
                data.extend_from_slice(&self.u32_bytes(value_offset));
                values.extend_from_slice(&entry.value);
                if entry.value.len() % 2 != 0 {
                    values.push(0);
                }
                value_offset = ifd_start + 2 + 12 * entries.len() as u32 + 4 + values.len() as u32;
            }
        }
        data.extend_from_slice(&self.u32_bytes(next_ifd_offset));
        data.extend_from_slice(&values);
    }

    fn u16_bytes(&self, value: u16) -> [u8; 2] {
        if self.is_little_endian {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        }
    }

    fn u32_bytes(&self, value: u32) -> [u8; 4] {
        if self.is_little_endian {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        }
    }
}

impl Default for ExifBlockWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn ascii_tag(tag_id: u16, value: &str) -> ExifTag {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0); // Null terminator for ASCII strings
    ExifTag {
        tag_id,
        tag_type: ExifTagType::Ascii,
        count: bytes.len() as u32,
        value: bytes,
    }
}

/// Encoded size of an IFD including its padded out-of-line values
fn ifd_len(entries: &[ExifTag]) -> u32 {
    let values: u32 = entries
        .iter()
        .filter(|e| e.value.len() > 4)
        .map(|e| (e.value.len() as u32 + 1) & !1)
        .sum();
    2 + 12 * entries.len() as u32 + 4 + values
}
