//! The raw 32-byte file header.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::raw;

/// The raw, byte-exact PCDB v3 header.
///
/// `magic 'PCDB' (4) | version u8 | flags u8 | outward_count u16 |
/// total_unit_count u32 | lat_offset i32 | lon_offset i32 | reserved[12]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Must be `PCDB`.
    pub magic: [u8; 4],
    /// Must be `3`.
    pub version: u8,
    /// Must be `0`; reserved for future schema evolution.
    pub flags: u8,
    /// The number of outward index entries that follow the header.
    pub outward_count: u16,
    /// The total number of units (postcodes) across the whole file.
    pub total_unit_count: u32,
    /// The minimum quantized latitude over all units.
    pub lat_offset: i32,
    /// The minimum quantized longitude over all units.
    pub lon_offset: i32,
}

impl Header {
    /// Reads a raw header from `read`.
    ///
    /// Does not itself validate magic/version/outward_count; see
    /// [`crate::header::Header::from_raw`] for that.
    pub fn read_from<R: Read>(mut read: R) -> Result<Header> {
        let mut magic = [0u8; 4];
        read.read_exact(&mut magic)?;
        let version = read.read_u8()?;
        let flags = read.read_u8()?;
        let outward_count = read.read_u16::<LittleEndian>()?;
        let total_unit_count = read.read_u32::<LittleEndian>()?;
        let lat_offset = read.read_i32::<LittleEndian>()?;
        let lon_offset = read.read_i32::<LittleEndian>()?;
        let mut reserved = [0u8; 12];
        read.read_exact(&mut reserved)?;
        Ok(Header {
            magic,
            version,
            flags,
            outward_count,
            total_unit_count,
            lat_offset,
            lon_offset,
        })
    }

    /// Writes this raw header to `write`.
    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        write.write_all(&self.magic)?;
        write.write_u8(self.version)?;
        write.write_u8(self.flags)?;
        write.write_u16::<LittleEndian>(self.outward_count)?;
        write.write_u32::<LittleEndian>(self.total_unit_count)?;
        write.write_i32::<LittleEndian>(self.lat_offset)?;
        write.write_i32::<LittleEndian>(self.lon_offset)?;
        write.write_all(&[0u8; 12])?;
        Ok(())
    }

    /// Returns `Ok(())` if magic, version, and outward count are all valid.
    pub fn validate(&self) -> Result<()> {
        if &self.magic != raw::MAGIC {
            return Err(Error::BadMagic(self.magic));
        }
        if self.version != raw::VERSION {
            return Err(Error::UnsupportedVersion(self.version));
        }
        if self.outward_count == 0 {
            return Err(Error::InvalidOutwardCount(0));
        }
        Ok(())
    }
}

impl Default for Header {
    fn default() -> Header {
        Header {
            magic: *raw::MAGIC,
            version: raw::VERSION,
            flags: 0,
            outward_count: 0,
            total_unit_count: 0,
            lat_offset: 0,
            lon_offset: 0,
        }
    }
}
