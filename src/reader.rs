//! Reads PCDB v3 databases: exact lookup, outward enumeration, and stats.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use log::debug;

use crate::bits::BitReader;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::postcode;
use crate::raw;
use crate::varint;

/// One resolved postcode and its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// The canonical postcode, e.g. `"M1 1AA"`.
    pub postcode: String,
    /// The postcode's outward code, e.g. `"M1"`.
    pub outward: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

/// Summary counts over a whole database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// The number of distinct outward codes.
    pub total_outwards: usize,
    /// The total number of postcodes stored.
    pub total_postcodes: usize,
    /// The size, in bytes, of the underlying buffer.
    pub file_size: usize,
}

/// A PCDB v3 database opened for reading.
///
/// Construction parses the header and the outward index once; every query
/// derives everything else on demand from the immutable buffer. `Reader` is
/// `Send + Sync` and safe to query concurrently from any number of threads.
///
/// # Examples
///
/// ```
/// use pcdb::{Encoder, Reader, Record};
/// let records = vec![Record::new("M1 1AA", 53.4808, -2.2426)];
/// let bytes = Encoder::encode_from_records(&records).unwrap();
/// let reader = Reader::new(bytes).unwrap();
/// let result = reader.lookup("m1 1aa").unwrap();
/// assert_eq!("M1 1AA", result.postcode);
/// ```
#[derive(Debug)]
pub struct Reader {
    buffer: Vec<u8>,
    header: Header,
    outward_index: Vec<raw::OutwardEntry>,
}

impl Reader {
    /// Parses `buffer` as a PCDB v3 database.
    pub fn new(buffer: Vec<u8>) -> Result<Reader> {
        if buffer.len() < raw::HEADER_LEN {
            return Err(Error::BufferTooSmall {
                expected: raw::HEADER_LEN,
                actual: buffer.len(),
            });
        }
        let raw_header = raw::Header::read_from(Cursor::new(&buffer))?;
        let header = Header::from_raw(raw_header)?;

        let index_start = raw::HEADER_LEN;
        let index_len = header.outward_count() as usize * raw::OUTWARD_ENTRY_LEN;
        if buffer.len() < index_start + index_len {
            return Err(Error::BufferTooSmall {
                expected: index_start + index_len,
                actual: buffer.len(),
            });
        }
        let mut outward_index = Vec::with_capacity(header.outward_count() as usize);
        let mut cursor = Cursor::new(&buffer[index_start..index_start + index_len]);
        for _ in 0..header.outward_count() {
            outward_index.push(raw::OutwardEntry::read_from(&mut cursor)?);
        }

        debug!(
            "opened PCDB database: {} outwards, {} postcodes, {} bytes",
            header.outward_count(),
            header.total_unit_count(),
            buffer.len()
        );

        Ok(Reader {
            buffer,
            header,
            outward_index,
        })
    }

    /// Reads the whole file at `path` and parses it as a PCDB v3 database.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Reader> {
        let buffer = fs::read(path.as_ref())?;
        Reader::new(buffer)
    }

    /// The parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Looks up a postcode, returning `None` if it is malformed or absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcdb::{Encoder, Reader, Record};
    /// let bytes = Encoder::encode_from_records(&[Record::new("M1 1AA", 53.4808, -2.2426)]).unwrap();
    /// let reader = Reader::new(bytes).unwrap();
    /// assert!(reader.lookup("XX1 1XX").is_none());
    /// assert!(reader.lookup("").is_none());
    /// ```
    pub fn lookup(&self, postcode: &str) -> Option<LookupResult> {
        let parsed = postcode::parse(postcode)?;
        let outward_entry = self.find_outward(&parsed.outward)?;
        let sector_entry = self.find_sector(outward_entry, parsed.sector)?;
        let rank = self.find_rank(outward_entry, &sector_entry, parsed.unit_index)?;
        let (lat, lon) = self.decode_coordinates(outward_entry, &sector_entry, rank);
        Some(LookupResult {
            postcode: format!(
                "{} {}{}",
                parsed.outward,
                parsed.sector,
                postcode::index_to_unit(parsed.unit_index)
            ),
            outward: parsed.outward,
            lat,
            lon,
        })
    }

    /// Returns whether `postcode` both parses and is present in the database.
    pub fn is_valid_postcode(&self, postcode: &str) -> bool {
        self.lookup(postcode).is_some()
    }

    /// Returns every postcode in the database whose outward equals `outward`,
    /// ordered by ascending sector then ascending unit index.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcdb::{Encoder, Reader, Record};
    /// let bytes = Encoder::encode_from_records(&[
    ///     Record::new("M1 1AA", 53.4808, -2.2426),
    ///     Record::new("M1 2AA", 53.4810, -2.2430),
    /// ]).unwrap();
    /// let reader = Reader::new(bytes).unwrap();
    /// assert_eq!(2, reader.enumerate_outward("M1").len());
    /// assert!(reader.enumerate_outward("XX1").is_empty());
    /// ```
    pub fn enumerate_outward(&self, outward: &str) -> Vec<LookupResult> {
        let normalized = outward.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_uppercase();
        let Some(outward_entry) = self.find_outward(&normalized) else {
            return Vec::new();
        };
        let sector_table = self.read_sector_table(outward_entry);
        let mut results = Vec::new();
        for sector_entry in &sector_table {
            if sector_entry.list_mode {
                let indices = self.read_list_indices(outward_entry, sector_entry);
                for (rank, &unit_index) in indices.iter().enumerate() {
                    results.push(self.build_result(&normalized, sector_entry, unit_index as u16, rank));
                }
            } else {
                let bitmap = self.read_bitmap(outward_entry, sector_entry);
                let mut rank = 0usize;
                for unit_index in 0..raw::UNIT_COUNT as u16 {
                    if bit_is_set(bitmap, unit_index) {
                        results.push(self.build_result(&normalized, sector_entry, unit_index, rank));
                        rank += 1;
                    }
                }
            }
        }
        results
    }

    /// Returns every outward code in the database, sorted lexicographically.
    pub fn get_outward_list(&self) -> Vec<String> {
        self.outward_index
            .iter()
            .map(|entry| raw::OutwardEntry::unpack_code(&entry.outward_code))
            .collect()
    }

    /// Returns outward codes starting with the uppercased `prefix`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcdb::{Encoder, Reader, Record};
    /// let bytes = Encoder::encode_from_records(&[
    ///     Record::new("SW1A 1AA", 51.5014, -0.1419),
    /// ]).unwrap();
    /// let reader = Reader::new(bytes).unwrap();
    /// assert_eq!(vec!["SW1A".to_string()], reader.find_nearby_outwards("sw"));
    /// ```
    pub fn find_nearby_outwards(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_ascii_uppercase();
        self.get_outward_list()
            .into_iter()
            .filter(|outward| outward.starts_with(&prefix))
            .collect()
    }

    /// Summary counts over the whole database.
    pub fn get_stats(&self) -> Stats {
        Stats {
            total_outwards: self.header.outward_count() as usize,
            total_postcodes: self.header.total_unit_count() as usize,
            file_size: self.buffer.len(),
        }
    }

    fn find_outward(&self, outward: &str) -> Option<raw::OutwardEntry> {
        let target = raw::OutwardEntry::pack_code(outward);
        self.outward_index
            .binary_search_by(|entry| entry.outward_code.cmp(&target))
            .ok()
            .map(|i| self.outward_index[i])
    }

    fn read_sector_table(&self, outward_entry: raw::OutwardEntry) -> Vec<raw::SectorEntry> {
        let start = outward_entry.sector_index_offset as usize;
        let len = outward_entry.sector_count as usize * raw::SECTOR_ENTRY_LEN;
        let mut cursor = Cursor::new(&self.buffer[start..start + len]);
        (0..outward_entry.sector_count)
            .map(|_| raw::SectorEntry::read_from(&mut cursor).expect("sector table is within buffer bounds"))
            .collect()
    }

    fn find_sector(&self, outward_entry: raw::OutwardEntry, sector_number: u8) -> Option<raw::SectorEntry> {
        self.read_sector_table(outward_entry)
            .into_iter()
            .find(|entry| entry.sector_number == sector_number)
    }

    fn blob_start(&self, outward_entry: raw::OutwardEntry, sector_entry: &raw::SectorEntry) -> usize {
        outward_entry.sector_index_offset as usize + sector_entry.units_rel_off as usize
    }

    fn read_bitmap(&self, outward_entry: raw::OutwardEntry, sector_entry: &raw::SectorEntry) -> &[u8] {
        let start = self.blob_start(outward_entry, sector_entry);
        &self.buffer[start..start + raw::BITMAP_LEN]
    }

    fn read_list_indices(&self, outward_entry: raw::OutwardEntry, sector_entry: &raw::SectorEntry) -> Vec<u32> {
        let start = self.blob_start(outward_entry, sector_entry);
        varint::decode_delta_sequence(&self.buffer[start..], sector_entry.unit_count as usize)
            .expect("list-mode blob is well-formed")
    }

    fn coord_stream_start(&self, outward_entry: raw::OutwardEntry, sector_entry: &raw::SectorEntry) -> usize {
        let blob_start = self.blob_start(outward_entry, sector_entry);
        if sector_entry.list_mode {
            let bytes = &self.buffer[blob_start..];
            let mut offset = 0;
            let mut remaining = sector_entry.unit_count;
            while remaining > 0 {
                let (_, consumed) = varint::decode(&bytes[offset..]).expect("list-mode blob is well-formed");
                offset += consumed;
                remaining -= 1;
            }
            blob_start + offset
        } else {
            blob_start + raw::BITMAP_LEN
        }
    }

    /// Returns the rank (ordinal index into the coordinate stream) of
    /// `unit_index` within `sector_entry`, or `None` if absent.
    fn find_rank(
        &self,
        outward_entry: raw::OutwardEntry,
        sector_entry: &raw::SectorEntry,
        unit_index: u16,
    ) -> Option<usize> {
        if sector_entry.list_mode {
            let indices = self.read_list_indices(outward_entry, sector_entry);
            indices.binary_search(&u32::from(unit_index)).ok()
        } else {
            let bitmap = self.read_bitmap(outward_entry, sector_entry);
            if !bit_is_set(bitmap, unit_index) {
                return None;
            }
            Some(rank_in_bitmap(bitmap, unit_index))
        }
    }

    fn decode_coordinates(
        &self,
        outward_entry: raw::OutwardEntry,
        sector_entry: &raw::SectorEntry,
        rank: usize,
    ) -> (f64, f64) {
        let coord_start = self.coord_stream_start(outward_entry, sector_entry);
        let stream_width = sector_entry.bits_lat + sector_entry.bits_lon;
        let mut bit_reader = BitReader::with_bit_offset(&self.buffer[coord_start..], rank * stream_width as usize);
        let lat_delta = bit_reader
            .read_bits(sector_entry.bits_lat)
            .expect("coordinate stream is within bounds");
        let lon_delta = bit_reader
            .read_bits(sector_entry.bits_lon)
            .expect("coordinate stream is within bounds");

        let lat_int = self.header.lat_offset() + sector_entry.base_lat_stored + lat_delta as i32;
        let lon_int = self.header.lon_offset() + sector_entry.base_lon_stored + lon_delta as i32;
        (lat_int as f64 / 100_000.0, lon_int as f64 / 100_000.0)
    }

    fn build_result(
        &self,
        outward: &str,
        sector_entry: &raw::SectorEntry,
        unit_index: u16,
        rank: usize,
    ) -> LookupResult {
        let outward_entry = self.find_outward(outward).expect("outward exists");
        let (lat, lon) = self.decode_coordinates(outward_entry, sector_entry, rank);
        LookupResult {
            postcode: format!(
                "{} {}{}",
                outward,
                sector_entry.sector_number,
                postcode::index_to_unit(unit_index)
            ),
            outward: outward.to_string(),
            lat,
            lon,
        }
    }
}

fn bit_is_set(bitmap: &[u8], unit_index: u16) -> bool {
    let byte = (unit_index / 8) as usize;
    let bit = unit_index % 8;
    bitmap[byte] & (1 << bit) != 0
}

fn rank_in_bitmap(bitmap: &[u8], unit_index: u16) -> usize {
    let byte = (unit_index / 8) as usize;
    let bit = unit_index % 8;
    let full_bytes_popcount: u32 = bitmap[..byte].iter().map(|b| b.count_ones()).sum();
    let partial = bitmap[byte] & ((1u16 << bit) as u8 - 1);
    full_bytes_popcount as usize + partial.count_ones() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Encoder, Record};

    fn sample_reader() -> Reader {
        let records = vec![
            Record::new("M1 1AA", 53.4808, -2.2426),
            Record::new("M1 1AB", 53.4809, -2.2427),
            Record::new("M1 2AA", 53.4810, -2.2430),
            Record::new("SW1A 1AA", 51.5014, -0.1419),
            Record::new("SW1A 1AB", 51.5015, -0.1420),
        ];
        let bytes = Encoder::encode_from_records(&records).unwrap();
        Reader::new(bytes).unwrap()
    }

    #[test]
    fn s1_stats_and_lookup() {
        let reader = sample_reader();
        let stats = reader.get_stats();
        assert_eq!(2, stats.total_outwards);
        assert_eq!(5, stats.total_postcodes);
        let result = reader.lookup("M1 1AA").unwrap();
        assert!((result.lat - 53.4808).abs() < 1e-4);
        assert!((result.lon - (-2.2426)).abs() < 1e-4);
    }

    #[test]
    fn s2_case_and_whitespace_insensitive() {
        let reader = sample_reader();
        let a = reader.lookup("M1 1AA").unwrap();
        let b = reader.lookup("m1  1aa").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn s3_misses_return_none() {
        let reader = sample_reader();
        assert!(reader.lookup("XX1 1XX").is_none());
        assert!(reader.lookup("").is_none());
    }

    #[test]
    fn s4_enumerate_outward() {
        let reader = sample_reader();
        let results = reader.enumerate_outward("M1");
        let postcodes: std::collections::HashSet<_> =
            results.iter().map(|r| r.postcode.clone()).collect();
        assert_eq!(
            std::collections::HashSet::from([
                "M1 1AA".to_string(),
                "M1 1AB".to_string(),
                "M1 2AA".to_string()
            ]),
            postcodes
        );
        assert!(reader.enumerate_outward("XX1").is_empty());
    }

    #[test]
    fn s5_find_nearby_outwards() {
        let reader = sample_reader();
        assert_eq!(vec!["SW1A".to_string()], reader.find_nearby_outwards("SW"));
        assert_eq!(vec!["SW1A".to_string()], reader.find_nearby_outwards("sw"));
    }

    #[test]
    fn s6_deterministic_reencode() {
        let records = vec![Record::new("M1 1AA", 53.4808, -2.2426)];
        let a = Encoder::encode_from_records(&records).unwrap();
        let b = Encoder::encode_from_records(&records).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn header_validation_rejects_short_buffer() {
        assert!(Reader::new(vec![0u8; 10]).is_err());
    }

    #[test]
    fn header_validation_rejects_bad_magic() {
        let mut bytes = Encoder::encode_from_records(&[Record::new("M1 1AA", 53.4808, -2.2426)]).unwrap();
        bytes[0] = b'X';
        assert!(Reader::new(bytes).is_err());
    }

    #[test]
    fn outward_list_is_sorted_with_no_duplicates() {
        let records = vec![
            Record::new("SW1A 1AA", 51.5014, -0.1419),
            Record::new("M1 1AA", 53.4808, -2.2426),
            Record::new("A1 1AA", 1.0, 1.0),
        ];
        let bytes = Encoder::encode_from_records(&records).unwrap();
        let reader = Reader::new(bytes).unwrap();
        let list = reader.get_outward_list();
        let mut sorted = list.clone();
        sorted.sort();
        assert_eq!(sorted, list);
    }

    #[test]
    fn first_wins_on_duplicate_postcode() {
        let records = vec![
            Record::new("M1 1AA", 53.4808, -2.2426),
            Record::new("M1 1AA", 0.0, 0.0),
        ];
        let bytes = Encoder::encode_from_records(&records).unwrap();
        let reader = Reader::new(bytes).unwrap();
        let result = reader.lookup("M1 1AA").unwrap();
        assert!((result.lat - 53.4808).abs() < 1e-4);
    }

    #[test]
    fn enumeration_matches_lookup_coordinates() {
        let reader = sample_reader();
        for result in reader.enumerate_outward("M1") {
            let looked_up = reader.lookup(&result.postcode).unwrap();
            assert_eq!(looked_up.lat, result.lat);
            assert_eq!(looked_up.lon, result.lon);
        }
    }

    #[test]
    fn enumeration_is_ordered_by_sector_then_unit() {
        let records = vec![
            Record::new("M1 2AB", 1.0, 1.0),
            Record::new("M1 1AA", 1.0, 1.0),
            Record::new("M1 1AB", 1.0, 1.0),
        ];
        let bytes = Encoder::encode_from_records(&records).unwrap();
        let reader = Reader::new(bytes).unwrap();
        let results = reader.enumerate_outward("M1");
        let postcodes: Vec<_> = results.iter().map(|r| r.postcode.clone()).collect();
        assert_eq!(vec!["M1 1AA", "M1 1AB", "M1 2AB"], postcodes);
    }

    #[test]
    fn dense_sector_uses_bitmap_and_still_round_trips() {
        let records: Vec<Record> = (0..676u16)
            .map(|i| {
                let suffix = postcode::index_to_unit(i);
                Record::new(format!("M1 1{suffix}"), 53.0 + i as f64 * 1e-5, -2.0)
            })
            .collect();
        let bytes = Encoder::encode_from_records(&records).unwrap();
        let reader = Reader::new(bytes).unwrap();
        assert_eq!(676, reader.enumerate_outward("M1").len());
        let result = reader.lookup("M1 1AA").unwrap();
        assert!((result.lat - 53.0).abs() < 1e-4);
    }
}
