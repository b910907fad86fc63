//! Crate-wide error type.

use thiserror::Error;

/// Crate-specific errors.
///
/// Construction errors and invariant violations are fatal and always surface as
/// an `Err`. Query misses (an unknown postcode, a malformed lookup string) are
/// represented as `None`/an empty `Vec` by the reader, never as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// The buffer is too small to contain a valid header.
    #[error("buffer too small: expected at least {expected} bytes, got {actual}")]
    BufferTooSmall {
        /// The minimum number of bytes required.
        expected: usize,
        /// The number of bytes actually present.
        actual: usize,
    },

    /// The header's magic bytes were not `PCDB`.
    #[error("bad magic: expected `PCDB`, got {0:?}")]
    BadMagic([u8; 4]),

    /// The header's version byte was not a version this crate supports.
    #[error("unsupported version: {0} (only version 3 is supported)")]
    UnsupportedVersion(u8),

    /// The header's outward count was outside `[1, 65535]`.
    #[error("invalid outward count: {0}")]
    InvalidOutwardCount(u32),

    /// A sector's bit widths overflowed the 5 bits allotted to them in the file format.
    #[error("bit width overflow for outward {outward:?} sector {sector}: {bits} bits")]
    BitWidthOverflow {
        /// The outward code of the offending sector.
        outward: String,
        /// The sector number of the offending sector.
        sector: u8,
        /// The bit width that overflowed.
        bits: u32,
    },

    /// A varint would have required more than 5 bytes to encode or decode.
    #[error("varint too long (max 5 bytes for a u32)")]
    VarintTooLong,

    /// A bit-level read ran past the end of the buffer.
    #[error("bit read out of range: offset {offset} in a buffer of {len} bits")]
    BitReadOutOfRange {
        /// The bit offset that was requested.
        offset: usize,
        /// The total number of bits available.
        len: usize,
    },

    /// Wraps `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps `csv::Error`, for structural CSV failures only.
    ///
    /// Row-level malformation (wrong column count, non-numeric coordinates) is a
    /// silent drop handled inside the encoder; it never reaches this variant.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;
