//! One entry of the raw outward index.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::Result;

/// `outward_code char[4] (NUL-padded ASCII) | sector_count u8 | sector_index_offset u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutwardEntry {
    /// The outward code, NUL-padded to 4 bytes.
    pub outward_code: [u8; 4],
    /// The number of sectors in this outward's sector table.
    pub sector_count: u8,
    /// The absolute file offset of this outward's block.
    pub sector_index_offset: u32,
}

impl OutwardEntry {
    /// Reads a raw outward index entry from `read`.
    pub fn read_from<R: Read>(mut read: R) -> Result<OutwardEntry> {
        let mut outward_code = [0u8; 4];
        read.read_exact(&mut outward_code)?;
        let sector_count = read.read_u8()?;
        let sector_index_offset = read.read_u32::<LittleEndian>()?;
        Ok(OutwardEntry {
            outward_code,
            sector_count,
            sector_index_offset,
        })
    }

    /// Writes this raw outward index entry to `write`.
    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        write.write_all(&self.outward_code)?;
        write.write_u8(self.sector_count)?;
        write.write_u32::<LittleEndian>(self.sector_index_offset)?;
        Ok(())
    }

    /// Packs an outward code string (at most 4 ASCII bytes) into its NUL-padded form.
    pub fn pack_code(outward: &str) -> [u8; 4] {
        let mut code = [0u8; 4];
        let bytes = outward.as_bytes();
        debug_assert!(bytes.len() <= 4, "outward code too long: {outward:?}");
        code[..bytes.len()].copy_from_slice(bytes);
        code
    }

    /// Unpacks the NUL-padded outward code back into a string.
    pub fn unpack_code(code: &[u8; 4]) -> String {
        let end = code.iter().position(|&b| b == 0).unwrap_or(4);
        String::from_utf8_lossy(&code[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let entry = OutwardEntry {
            outward_code: OutwardEntry::pack_code("M1"),
            sector_count: 2,
            sector_index_offset: 41,
        };
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        assert_eq!(crate::raw::OUTWARD_ENTRY_LEN, buf.len());
        let read_back = OutwardEntry::read_from(Cursor::new(&buf)).unwrap();
        assert_eq!(entry, read_back);
    }

    #[test]
    fn pack_and_unpack_short_code() {
        let code = OutwardEntry::pack_code("M1");
        assert_eq!([b'M', b'1', 0, 0], code);
        assert_eq!("M1", OutwardEntry::unpack_code(&code));
    }

    #[test]
    fn pack_and_unpack_full_length_code() {
        let code = OutwardEntry::pack_code("SW1A");
        assert_eq!(*b"SW1A", code);
        assert_eq!("SW1A", OutwardEntry::unpack_code(&code));
    }

    #[test]
    fn nul_padded_bytes_sort_like_stripped_strings() {
        let mut codes = vec!["SW1A", "M1", "M2", "A"];
        codes.sort();
        let mut packed: Vec<[u8; 4]> = codes.iter().map(|c| OutwardEntry::pack_code(c)).collect();
        packed.sort();
        let unpacked: Vec<String> = packed.iter().map(OutwardEntry::unpack_code).collect();
        assert_eq!(codes, unpacked);
    }
}
