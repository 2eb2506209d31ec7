//! Shared fixtures for the unit tests.
//!
//! Camera metadata is awkward to come by in a test, so [`Tiff`] writes a
//! minimal little-endian EXIF block by hand: IFD0 plus optional EXIF and
//! GPS sub-directories. [`jpeg_with_exif`] splices such a block into a real
//! JPEG as an `APP1` segment.
//!
//! ```text
//! let exif = Tiff::new()
//!     .ifd0(MAKE, ascii("Canon"))
//!     .gps(GPS_LATITUDE_REF, ascii("S"))
//!     .gps(GPS_LATITUDE, rationals(&[(10, 1), (30, 1), (0, 1)]))
//!     .build();
//! ```

use std::io::Cursor;

use image::{ImageFormat, RgbImage};

pub const MAKE: u16 = 0x010F;
pub const MODEL: u16 = 0x0110;
pub const DATE_TIME: u16 = 0x0132;
pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
pub const GPS_LATITUDE_REF: u16 = 0x0001;
pub const GPS_LATITUDE: u16 = 0x0002;
pub const GPS_LONGITUDE_REF: u16 = 0x0003;
pub const GPS_LONGITUDE: u16 = 0x0004;

const EXIF_IFD_POINTER: u16 = 0x8769;
const GPS_IFD_POINTER: u16 = 0x8825;

const ASCII: u16 = 2;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

/// One encoded field: TIFF type, value count and raw little-endian bytes.
pub struct Field {
    kind: u16,
    count: u32,
    bytes: Vec<u8>,
}

pub fn ascii(value: &str) -> Field {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    Field {
        kind: ASCII,
        count: bytes.len() as u32,
        bytes,
    }
}

pub fn rationals(parts: &[(u32, u32)]) -> Field {
    let bytes = parts
        .iter()
        .flat_map(|(num, den)| num.to_le_bytes().into_iter().chain(den.to_le_bytes()))
        .collect();
    Field {
        kind: RATIONAL,
        count: parts.len() as u32,
        bytes,
    }
}

fn long(value: u32) -> Field {
    Field {
        kind: LONG,
        count: 1,
        bytes: value.to_le_bytes().to_vec(),
    }
}

#[derive(Default)]
pub struct Tiff {
    ifd0: Vec<(u16, Field)>,
    exif: Vec<(u16, Field)>,
    gps: Vec<(u16, Field)>,
}

impl Tiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ifd0(mut self, tag: u16, field: Field) -> Self {
        self.ifd0.push((tag, field));
        self
    }

    pub fn exif(mut self, tag: u16, field: Field) -> Self {
        self.exif.push((tag, field));
        self
    }

    pub fn gps(mut self, tag: u16, field: Field) -> Self {
        self.gps.push((tag, field));
        self
    }

    /// Sub-directories go first so IFD0 can point at them; the header is
    /// patched with IFD0's offset at the end.
    pub fn build(self) -> Vec<u8> {
        let Tiff {
            mut ifd0,
            exif,
            gps,
        } = self;
        let mut buf = b"II\x2a\x00\0\0\0\0".to_vec();

        if !exif.is_empty() {
            let at = write_ifd(&mut buf, exif);
            ifd0.push((EXIF_IFD_POINTER, long(at)));
        }
        if !gps.is_empty() {
            let at = write_ifd(&mut buf, gps);
            ifd0.push((GPS_IFD_POINTER, long(at)));
        }
        let at = write_ifd(&mut buf, ifd0);
        buf[4..8].copy_from_slice(&at.to_le_bytes());
        buf
    }
}

/// Appends one directory and its out-of-line values, returning its offset.
fn write_ifd(buf: &mut Vec<u8>, mut entries: Vec<(u16, Field)>) -> u32 {
    if buf.len() % 2 == 1 {
        buf.push(0);
    }
    entries.sort_by_key(|(tag, _)| *tag);

    let start = buf.len();
    let data_start = start + 2 + 12 * entries.len() + 4;
    let mut data: Vec<u8> = Vec::new();

    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, field) in &entries {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&field.kind.to_le_bytes());
        buf.extend_from_slice(&field.count.to_le_bytes());
        if field.bytes.len() <= 4 {
            let mut inline = field.bytes.clone();
            inline.resize(4, 0);
            buf.extend_from_slice(&inline);
        } else {
            buf.extend_from_slice(&((data_start + data.len()) as u32).to_le_bytes());
            data.extend_from_slice(&field.bytes);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    // no next IFD
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&data);

    start as u32
}

/// A decodable JPEG carrying `tiff` as its EXIF block.
pub fn jpeg_with_exif(width: u32, height: u32, tiff: &[u8]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([30, 90, 160]));
    let mut jpeg = Cursor::new(Vec::new());
    img.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();
    let mut jpeg = jpeg.into_inner();

    let len = u16::try_from(2 + 6 + tiff.len()).unwrap();
    let mut segment = vec![0xFF, 0xE1];
    segment.extend_from_slice(&len.to_be_bytes());
    segment.extend_from_slice(b"Exif\0\0");
    segment.extend_from_slice(tiff);

    // right after SOI
    let rest = jpeg.split_off(2);
    jpeg.extend(segment);
    jpeg.extend(rest);
    jpeg
}
