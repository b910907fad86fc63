//! The friendly, validated header built on top of [`raw::Header`](crate::raw::Header).

use crate::error::Result;
use crate::raw;

/// Global metadata parsed from the start of a PCDB file.
///
/// # Examples
///
/// ```
/// use pcdb::Reader;
/// # let bytes = pcdb::Encoder::encode_from_records(&[]).unwrap();
/// let reader = pcdb::Reader::new(bytes).unwrap();
/// let header = reader.header();
/// println!("{} outwards", header.outward_count());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    outward_count: u16,
    total_unit_count: u32,
    lat_offset: i32,
    lon_offset: i32,
}

impl Header {
    /// Validates a raw header and wraps it in the friendly API.
    pub fn from_raw(raw_header: raw::Header) -> Result<Header> {
        raw_header.validate()?;
        Ok(Header {
            outward_count: raw_header.outward_count,
            total_unit_count: raw_header.total_unit_count,
            lat_offset: raw_header.lat_offset,
            lon_offset: raw_header.lon_offset,
        })
    }

    /// Converts this header back into its raw, byte-exact form.
    pub fn into_raw(self) -> raw::Header {
        raw::Header {
            magic: *raw::MAGIC,
            version: raw::VERSION,
            flags: 0,
            outward_count: self.outward_count,
            total_unit_count: self.total_unit_count,
            lat_offset: self.lat_offset,
            lon_offset: self.lon_offset,
        }
    }

    /// The number of distinct outward codes in the file.
    pub fn outward_count(&self) -> u16 {
        self.outward_count
    }

    /// The total number of postcodes (units) stored in the file.
    pub fn total_unit_count(&self) -> u32 {
        self.total_unit_count
    }

    /// The minimum quantized latitude over all units in the file.
    pub fn lat_offset(&self) -> i32 {
        self.lat_offset
    }

    /// The minimum quantized longitude over all units in the file.
    pub fn lon_offset(&self) -> i32 {
        self.lon_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_invalid_header() {
        let raw_header = raw::Header {
            magic: *b"NOPE",
            ..Default::default()
        };
        assert!(Header::from_raw(raw_header).is_err());
    }

    #[test]
    fn round_trips_through_raw() {
        let raw_header = raw::Header {
            outward_count: 3,
            total_unit_count: 10,
            lat_offset: 5,
            lon_offset: -5,
            ..Default::default()
        };
        let header = Header::from_raw(raw_header).unwrap();
        assert_eq!(3, header.outward_count());
        assert_eq!(10, header.total_unit_count());
        assert_eq!(raw_header, header.into_raw());
    }
}
