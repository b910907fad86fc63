//! One entry of a raw outward block's sector table.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::Result;

const LIST_MODE_BIT: u16 = 1 << 1;
const BITS_LAT_SHIFT: u16 = 2;
const BITS_LON_SHIFT: u16 = 7;
const BITS_MASK: u16 = 0b1_1111; // 5 bits

/// `sector_number u8 | unit_count u16 | units_rel_off u24 | base_lat_stored i24 |
/// base_lon_stored i24 | flags_and_bits u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorEntry {
    /// The inward code's leading digit, 0-9.
    pub sector_number: u8,
    /// The number of units stored in this sector.
    pub unit_count: u16,
    /// The offset of this sector's blob, relative to the outward block start.
    pub units_rel_off: u32,
    /// `sector.lat_min - header.lat_offset`.
    pub base_lat_stored: i32,
    /// `sector.lon_min - header.lon_offset`.
    pub base_lon_stored: i32,
    /// Whether units are stored as a sorted delta-varint list instead of a bitmap.
    pub list_mode: bool,
    /// The bit width of each stored `lat_delta`, 0-31.
    pub bits_lat: u32,
    /// The bit width of each stored `lon_delta`, 0-31.
    pub bits_lon: u32,
}

impl SectorEntry {
    /// Reads a raw sector table entry from `read`.
    pub fn read_from<R: Read>(mut read: R) -> Result<SectorEntry> {
        let sector_number = read.read_u8()?;
        let unit_count = read.read_u16::<LittleEndian>()?;
        let units_rel_off = read.read_uint::<LittleEndian>(3)? as u32;
        let base_lat_stored = read.read_int::<LittleEndian>(3)? as i32;
        let base_lon_stored = read.read_int::<LittleEndian>(3)? as i32;
        let flags_and_bits = read.read_u16::<LittleEndian>()?;

        // bit0 (is_bit_packed) is always set in v3 and carries no information here.
        let list_mode = flags_and_bits & LIST_MODE_BIT != 0;
        let bits_lat = u32::from((flags_and_bits >> BITS_LAT_SHIFT) & BITS_MASK);
        // Bits 12..15 are reserved; mask bits_lon to 5 bits per the v3 reference reader.
        let bits_lon = u32::from((flags_and_bits >> BITS_LON_SHIFT) & BITS_MASK);

        Ok(SectorEntry {
            sector_number,
            unit_count,
            units_rel_off,
            base_lat_stored,
            base_lon_stored,
            list_mode,
            bits_lat,
            bits_lon,
        })
    }

    /// Writes this raw sector table entry to `write`.
    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        write.write_u8(self.sector_number)?;
        write.write_u16::<LittleEndian>(self.unit_count)?;
        write.write_uint::<LittleEndian>(u64::from(self.units_rel_off), 3)?;
        write.write_int::<LittleEndian>(i64::from(self.base_lat_stored), 3)?;
        write.write_int::<LittleEndian>(i64::from(self.base_lon_stored), 3)?;
        write.write_u16::<LittleEndian>(self.flags_and_bits())?;
        Ok(())
    }

    fn flags_and_bits(&self) -> u16 {
        let mut word: u16 = 1; // bit0: is_bit_packed
        if self.list_mode {
            word |= LIST_MODE_BIT;
        }
        word |= (self.bits_lat as u16 & BITS_MASK) << BITS_LAT_SHIFT;
        word |= (self.bits_lon as u16 & BITS_MASK) << BITS_LON_SHIFT;
        word
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> SectorEntry {
        SectorEntry {
            sector_number: 7,
            unit_count: 3,
            units_rel_off: 14,
            base_lat_stored: 12345,
            base_lon_stored: -6789,
            list_mode: true,
            bits_lat: 17,
            bits_lon: 21,
        }
    }

    #[test]
    fn round_trip() {
        let entry = sample();
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        assert_eq!(crate::raw::SECTOR_ENTRY_LEN, buf.len());
        let read_back = SectorEntry::read_from(Cursor::new(&buf)).unwrap();
        assert_eq!(entry, read_back);
    }

    #[test]
    fn negative_base_round_trips() {
        let mut entry = sample();
        entry.base_lat_stored = -(1 << 20);
        entry.base_lon_stored = -(1 << 20);
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        let read_back = SectorEntry::read_from(Cursor::new(&buf)).unwrap();
        assert_eq!(entry.base_lat_stored, read_back.base_lat_stored);
        assert_eq!(entry.base_lon_stored, read_back.base_lon_stored);
    }

    #[test]
    fn bitmap_mode_round_trips() {
        let mut entry = sample();
        entry.list_mode = false;
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        let read_back = SectorEntry::read_from(Cursor::new(&buf)).unwrap();
        assert!(!read_back.list_mode);
    }

    #[test]
    fn reserved_bits_12_to_15_are_ignored_on_read() {
        let entry = sample();
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        // Set bits 12..15 of flags_and_bits (last two bytes, high nibble).
        buf[13] |= 0b1111_0000;
        let read_back = SectorEntry::read_from(Cursor::new(&buf)).unwrap();
        assert_eq!(entry.bits_lon, read_back.bits_lon);
    }
}
