//! Image codec adapter.
//!
//! The processing routine only talks to the [`ImageCodec`] trait; the pixel
//! work itself is delegated to external crates.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` |
//! | Resize | `DynamicImage::resize_exact` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | EXIF | `rexif::parse_buffer_quiet` |

use chrono::NaiveDateTime;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use rexif::{ExifData, ExifTag, TagValue};
use tracing::*;

use crate::metadata::{ExifFields, GpsCoordinate};
use crate::CodecError;

const EXIF_TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Decoding, resizing and re-encoding of images plus EXIF extraction.
///
/// Implementations are shared by every concurrent processing run.
pub trait ImageCodec: Send + Sync {
    /// Decode a complete encoded image.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Resize to exactly `width` x `height` and encode in the output format.
    fn resize_and_encode(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CodecError>;

    /// Read the EXIF block embedded in an encoded image.
    fn read_exif(&self, bytes: &[u8]) -> Result<ExifFields, CodecError>;

    /// File extension of the output format, without the dot.
    fn extension(&self) -> &'static str;
}

/// Codec producing lossless WebP variants.
#[derive(Debug, Clone, Copy)]
pub struct WebpCodec {
    filter: FilterType,
}

impl WebpCodec {
    pub fn new() -> Self {
        Self::with_filter(FilterType::Lanczos3)
    }

    pub fn with_filter(filter: FilterType) -> Self {
        WebpCodec { filter }
    }
}

impl Default for WebpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for WebpCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn resize_and_encode(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CodecError> {
        // The WebP encoder only accepts 8-bit RGB(A).
        let resized = DynamicImage::ImageRgba8(
            image
                .resize_exact(width, height, self.filter)
                .to_rgba8(),
        );

        let mut encoded = Vec::new();
        resized
            .write_with_encoder(WebPEncoder::new_lossless(&mut encoded))
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(encoded)
    }

    fn read_exif(&self, bytes: &[u8]) -> Result<ExifFields, CodecError> {
        let (result, warnings) = rexif::parse_buffer_quiet(bytes);
        for warning in warnings {
            debug!(message = "EXIF warning", warning = %warning);
        }
        let exif = result.map_err(|e| CodecError::Exif(e.to_string()))?;
        Ok(exif_fields(&exif))
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}

fn exif_fields(exif: &ExifData) -> ExifFields {
    ExifFields {
        make: ascii_value(exif, ExifTag::Make),
        model: ascii_value(exif, ExifTag::Model),
        taken_at: ascii_value(exif, ExifTag::DateTimeOriginal)
            .or_else(|| ascii_value(exif, ExifTag::DateTime))
            .and_then(|raw| parse_timestamp(&raw)),
        latitude: gps_coordinate(exif, ExifTag::GPSLatitude, ExifTag::GPSLatitudeRef),
        longitude: gps_coordinate(exif, ExifTag::GPSLongitude, ExifTag::GPSLongitudeRef),
    }
}

fn tag_value(exif: &ExifData, tag: ExifTag) -> Option<&TagValue> {
    exif.entries
        .iter()
        .find(|entry| entry.tag == tag)
        .map(|entry| &entry.value)
}

fn ascii_value(exif: &ExifData, tag: ExifTag) -> Option<String> {
    match tag_value(exif, tag)? {
        TagValue::Ascii(value) => clean_ascii(value),
        _ => None,
    }
}

fn clean_ascii(value: &str) -> Option<String> {
    let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, EXIF_TIMESTAMP_FORMAT).ok()
}

/// Both the triple and its reference must be present.
fn gps_coordinate(exif: &ExifData, triple: ExifTag, reference: ExifTag) -> Option<GpsCoordinate> {
    let dms = match tag_value(exif, triple)? {
        TagValue::URational(parts) if parts.len() >= 3 => {
            let mut dms = [0.0; 3];
            for (slot, part) in dms.iter_mut().zip(parts) {
                if part.denominator == 0 {
                    return None;
                }
                *slot = part.numerator as f64 / part.denominator as f64;
            }
            dms
        }
        _ => return None,
    };
    let reference = ascii_value(exif, reference)?;
    Some(GpsCoordinate::new(dms, reference))
}
