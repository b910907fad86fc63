//! A compact, read-optimized binary database for UK postcode coordinates.
//!
//! [`Encoder`] builds a PCDB v3 file from a CSV of `postcode,lat,lon` rows or
//! from in-memory [`Record`]s. [`Reader`] opens one for lookup and
//! enumeration. The wire format is documented in [`raw`].
//!
//! # Examples
//!
//! ```
//! use pcdb::{Encoder, Reader, Record};
//!
//! let records = vec![
//!     Record::new("M1 1AA", 53.4808, -2.2426),
//!     Record::new("SW1A 1AA", 51.5014, -0.1419),
//! ];
//! let bytes = Encoder::encode_from_records(&records).unwrap();
//! let reader = Reader::new(bytes).unwrap();
//!
//! let result = reader.lookup("m1 1aa").unwrap();
//! assert!((result.lat - 53.4808).abs() < 1e-4);
//! assert!(reader.lookup("ZZ99 9ZZ").is_none());
//! ```

mod encoder;
mod error;
mod header;
mod model;
mod reader;

pub mod bits;
pub mod postcode;
pub mod raw;
pub mod varint;

pub use encoder::{BuildStats, Encoder, Record};
pub use error::{Error, Result};
pub use header::Header;
pub use reader::{LookupResult, Reader, Stats};
