use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ImageId;

/// Descriptive record persisted next to the variants of a processed image.
///
/// `id`, `original_file_name` and `upload_at` are always set; every
/// EXIF-derived field is independently optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub id: ImageId,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub taken_at: Option<NaiveDateTime>,
    pub original_file_name: String,
    pub upload_at: DateTime<Utc>,
}

impl ImageMetadata {
    pub fn new(id: ImageId, original_file_name: impl Into<String>) -> Self {
        ImageMetadata {
            id,
            camera_make: None,
            camera_model: None,
            latitude: None,
            longitude: None,
            taken_at: None,
            original_file_name: original_file_name.into(),
            upload_at: Utc::now(),
        }
    }

    /// Copies whatever the EXIF block carried into this record.
    pub fn apply_exif(&mut self, exif: ExifFields) {
        self.camera_make = exif.make;
        self.camera_model = exif.model;
        self.taken_at = exif.taken_at;
        self.latitude = exif
            .latitude
            .map(|coordinate| coordinate.to_degrees(Hemisphere::South));
        self.longitude = exif
            .longitude
            .map(|coordinate| coordinate.to_degrees(Hemisphere::West));
    }
}

/// The subset of EXIF tags the pipeline records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifFields {
    pub make: Option<String>,
    pub model: Option<String>,
    pub taken_at: Option<NaiveDateTime>,
    pub latitude: Option<GpsCoordinate>,
    pub longitude: Option<GpsCoordinate>,
}

/// A GPS coordinate as stored in EXIF: a degrees/minutes/seconds triple and
/// the hemisphere reference letter.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsCoordinate {
    pub degrees: f64,
    pub minutes: f64,
    pub seconds: f64,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    South,
    West,
}

impl Hemisphere {
    fn letter(self) -> &'static str {
        match self {
            Hemisphere::South => "S",
            Hemisphere::West => "W",
        }
    }
}

impl GpsCoordinate {
    pub fn new(dms: [f64; 3], reference: impl Into<String>) -> Self {
        GpsCoordinate {
            degrees: dms[0],
            minutes: dms[1],
            seconds: dms[2],
            reference: reference.into(),
        }
    }

    /// Signed decimal degrees; negative when the reference names `negative`.
    pub fn to_degrees(&self, negative: Hemisphere) -> f64 {
        let magnitude = self.degrees + self.minutes / 60.0 + self.seconds / 3600.0;
        if self.reference.trim().eq_ignore_ascii_case(negative.letter()) {
            -magnitude
        } else {
            magnitude
        }
    }
}
