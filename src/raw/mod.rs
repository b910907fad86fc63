//! Byte-exact structs mapping onto the PCDB v3 wire format.
//!
//! Each struct here mirrors a fixed-size region of the file 1:1 and knows only
//! how to read and write its own bytes. The friendly, validated API built on
//! top of these lives in [`crate::header::Header`] and [`crate::reader::Reader`].

mod header;
mod outward;
mod sector;

pub use header::Header;
pub use outward::OutwardEntry;
pub use sector::SectorEntry;

/// The magic bytes that must begin every PCDB file.
pub const MAGIC: &[u8; 4] = b"PCDB";

/// The only file format version this crate reads or writes.
pub const VERSION: u8 = 3;

/// The fixed size, in bytes, of the header.
pub const HEADER_LEN: usize = 32;

/// The fixed size, in bytes, of one outward index entry.
pub const OUTWARD_ENTRY_LEN: usize = 9;

/// The fixed size, in bytes, of one sector table entry.
pub const SECTOR_ENTRY_LEN: usize = 14;

/// The number of two-letter unit combinations (`26 * 26`).
pub const UNIT_COUNT: usize = 676;

/// The fixed size, in bytes, of a dense unit-presence bitmap (`680` bits, 4 unused).
pub const BITMAP_LEN: usize = 85;
