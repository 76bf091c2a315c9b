use crate::error::MetadataError;
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::io::Cursor;

pub trait MetadataReader: Send + Sync {
    /// Original capture time, when the image carries one.
    fn read_capture_time(&self, bytes: &[u8]) -> Result<Option<NaiveDateTime>, MetadataError>;
}

/// EXIF `DateTimeOriginal` reader.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExifReader;

impl MetadataReader for ExifReader {
    fn read_capture_time(&self, bytes: &[u8]) -> Result<Option<NaiveDateTime>, MetadataError> {
        let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
            return Ok(None);
        };
        let Value::Ascii(ref parts) = field.value else {
            return Ok(None);
        };
        Ok(parts.first().and_then(|raw| parse_exif_datetime(raw)))
    }
}

/// Parses the `YYYY:MM:DD HH:MM:SS` form EXIF uses.
pub fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    chrono::NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
        .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exif_datetime() {
        let parsed = parse_exif_datetime(b"2023:05:01 10:00:00").unwrap();
        assert_eq!(parsed.to_string(), "2023-05-01 10:00:00");
        assert!(parse_exif_datetime(b"not a date").is_none());
        assert!(parse_exif_datetime(b"2023:13:01 10:00:00").is_none());
    }

    #[test]
    fn image_without_exif_has_no_capture_time() {
        let mut png = Vec::new();
        image::RgbaImage::new(2, 2)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(ExifReader.read_capture_time(&png).unwrap(), None);
    }
}
