//! Builds a PCDB v3 file from CSV or in-memory records.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::{debug, info};

use crate::bits::BitWriter;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::postcode;
use crate::raw;
use crate::varint;

/// One input record: a postcode string and its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The postcode as it appeared in the input, e.g. `"M1 1AA"`.
    pub postcode: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl Record {
    /// Creates a new record.
    pub fn new(postcode: impl Into<String>, lat: f64, lon: f64) -> Record {
        Record {
            postcode: postcode.into(),
            lat,
            lon,
        }
    }
}

/// Summary counts from a build, useful for caller-side logging or telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildStats {
    /// Total input rows seen (for `build`) or records passed in (for `encode_from_records`).
    pub rows_seen: usize,
    /// Rows dropped for being malformed CSV or an unparseable postcode.
    pub rows_dropped: usize,
    /// Distinct outward codes in the resulting database.
    pub total_outwards: usize,
    /// Total postcodes (after duplicate-dropping) in the resulting database.
    pub total_postcodes: usize,
    /// The size, in bytes, of the serialized database.
    pub file_size: usize,
}

/// Quantizes a coordinate to an integer at `10^-5` degree resolution.
fn quantize(value: f64) -> i32 {
    (value * 100_000.0).round() as i32
}

/// Encodes a PCDB v3 database, either from a CSV file or from in-memory records.
#[derive(Debug, Default)]
pub struct Encoder;

impl Encoder {
    /// Reads `csv_path`, encodes it, and writes the result to `out_path`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pcdb::Encoder;
    /// let stats = Encoder::build("postcodes.csv", "postcodes.pcod").unwrap();
    /// println!("wrote {} postcodes", stats.total_postcodes);
    /// ```
    pub fn build(csv_path: impl AsRef<Path>, out_path: impl AsRef<Path>) -> Result<BuildStats> {
        info!("reading postcodes from {}", csv_path.as_ref().display());
        let (records, csv_rows_dropped) = read_csv(csv_path.as_ref())?;
        let rows_seen = records.len() + csv_rows_dropped;
        let (bytes, mut stats) = encode(&records)?;
        stats.rows_seen = rows_seen;
        stats.rows_dropped += csv_rows_dropped;

        let mut file = File::create(out_path.as_ref())?;
        file.write_all(&bytes)?;
        info!(
            "wrote {} postcodes across {} outwards to {} ({} bytes)",
            stats.total_postcodes,
            stats.total_outwards,
            out_path.as_ref().display(),
            stats.file_size
        );
        Ok(stats)
    }

    /// Encodes `records` into an in-memory buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcdb::{Encoder, Record};
    /// let records = vec![Record::new("M1 1AA", 53.4808, -2.2426)];
    /// let bytes = Encoder::encode_from_records(&records).unwrap();
    /// assert!(!bytes.is_empty());
    /// ```
    pub fn encode_from_records(records: &[Record]) -> Result<Vec<u8>> {
        let (bytes, _) = encode(records)?;
        Ok(bytes)
    }
}

/// Reads a 3-column `postcode,lat,lon` CSV, dropping malformed rows silently.
///
/// Returns the parsed records alongside a count of rows dropped at the CSV
/// level (wrong field count, unreadable row, non-numeric coordinate) — this
/// is distinct from rows dropped later for an unparseable postcode.
fn read_csv(path: &Path) -> Result<(Vec<Record>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut records = Vec::new();
    let mut rows_dropped = 0;
    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                debug!("dropping unreadable CSV row: {err}");
                rows_dropped += 1;
                continue;
            }
        };
        if row.len() != 3 {
            debug!("dropping row with {} fields, expected 3", row.len());
            rows_dropped += 1;
            continue;
        }
        let postcode = row[0].trim().trim_matches('"').to_string();
        let lat: f64 = match row[1].trim().trim_matches('"').parse() {
            Ok(lat) => lat,
            Err(_) => {
                debug!("dropping row with non-numeric latitude: {:?}", &row[1]);
                rows_dropped += 1;
                continue;
            }
        };
        let lon: f64 = match row[2].trim().trim_matches('"').parse() {
            Ok(lon) => lon,
            Err(_) => {
                debug!("dropping row with non-numeric longitude: {:?}", &row[2]);
                rows_dropped += 1;
                continue;
            }
        };
        records.push(Record { postcode, lat, lon });
    }
    Ok((records, rows_dropped))
}

/// Parses, groups, lays out, and serializes `records` into a PCDB v3 buffer.
fn encode(records: &[Record]) -> Result<(Vec<u8>, BuildStats)> {
    let mut model = Model::new();
    let mut rows_dropped = 0;
    for record in records {
        let parsed = match postcode::parse(&record.postcode) {
            Some(parsed) => parsed,
            None => {
                debug!("dropping unparseable postcode: {:?}", record.postcode);
                rows_dropped += 1;
                continue;
            }
        };
        model.insert(
            &parsed.outward,
            parsed.sector,
            parsed.unit_index,
            quantize(record.lat),
            quantize(record.lon),
        );
    }

    let (lat_offset, lon_offset) = model.global_offsets();
    let outward_count = model.outward_count();
    let total_unit_count = model.total_unit_count();
    info!(
        "grouped {} postcodes into {} outwards ({} rows dropped)",
        total_unit_count, outward_count, rows_dropped
    );
    info!(
        "laying out {} outwards (lat_offset {}, lon_offset {})",
        outward_count, lat_offset, lon_offset
    );
    let bytes = serialize(&mut model, lat_offset, lon_offset)?;
    let stats = BuildStats {
        rows_seen: records.len(),
        rows_dropped,
        total_outwards: outward_count,
        total_postcodes: total_unit_count,
        file_size: bytes.len(),
    };
    Ok((bytes, stats))
}

struct OutwardBlock {
    outward_code: [u8; 4],
    sector_entries: Vec<raw::SectorEntry>,
    blobs: Vec<Vec<u8>>,
}

impl OutwardBlock {
    fn len(&self) -> usize {
        self.sector_entries.len() * raw::SECTOR_ENTRY_LEN + self.blobs.iter().map(Vec::len).sum::<usize>()
    }
}

/// Builds one sector's presence-payload-plus-coordinate-stream blob.
fn build_blob(
    outward: &str,
    sector_number: u8,
    finalized: &crate::model::FinalizedSector,
) -> Result<Vec<u8>> {
    if finalized.bits_lat > 31 || finalized.bits_lon > 31 {
        return Err(Error::BitWidthOverflow {
            outward: outward.to_string(),
            sector: sector_number,
            bits: finalized.bits_lat.max(finalized.bits_lon),
        });
    }

    let mut blob = if finalized.list_mode {
        varint::encode_delta_sequence(&finalized.unit_indices)
    } else {
        let mut bitmap = vec![0u8; raw::BITMAP_LEN];
        for &unit_index in &finalized.unit_indices {
            let byte = (unit_index / 8) as usize;
            let bit = unit_index % 8;
            bitmap[byte] |= 1 << bit;
        }
        bitmap
    };

    let mut coord_writer = BitWriter::new();
    for i in 0..finalized.unit_indices.len() {
        coord_writer.write_bits(finalized.lat_deltas[i], finalized.bits_lat);
        coord_writer.write_bits(finalized.lon_deltas[i], finalized.bits_lon);
    }
    blob.extend(coord_writer.into_bytes());
    Ok(blob)
}

/// Computes the layout and serializes the whole file.
fn serialize(model: &mut Model, lat_offset: i32, lon_offset: i32) -> Result<Vec<u8>> {
    let outward_count = model.outward_count();
    let total_unit_count = model.total_unit_count();

    let outward_index_start = raw::HEADER_LEN;
    let outward_index_len = outward_count * raw::OUTWARD_ENTRY_LEN;
    let mut blocks_start = outward_index_start + outward_index_len;

    let mut blocks = Vec::with_capacity(outward_count);
    let mut block_offsets = Vec::with_capacity(outward_count);

    for outward in model.outwards() {
        let code = raw::OutwardEntry::pack_code(outward.code());
        let outward_name = outward.code().to_string();
        let sector_count = outward.sector_count();
        let mut sector_entries = Vec::with_capacity(sector_count);
        let mut blobs = Vec::with_capacity(sector_count);
        let mut rel_off = sector_count * raw::SECTOR_ENTRY_LEN;

        for sector in outward.sectors() {
            let finalized = sector.finalize();
            let sector_number = sector.sector_number();
            let blob = build_blob(&outward_name, sector_number, &finalized)?;
            sector_entries.push(raw::SectorEntry {
                sector_number,
                unit_count: finalized.unit_indices.len() as u16,
                units_rel_off: rel_off as u32,
                base_lat_stored: sector.lat_min() - lat_offset,
                base_lon_stored: sector.lon_min() - lon_offset,
                list_mode: finalized.list_mode,
                bits_lat: finalized.bits_lat,
                bits_lon: finalized.bits_lon,
            });
            rel_off += blob.len();
            blobs.push(blob);
        }

        let block = OutwardBlock {
            outward_code: code,
            sector_entries,
            blobs,
        };
        block_offsets.push(blocks_start);
        blocks_start += block.len();
        blocks.push(block);
    }

    let mut out = Vec::with_capacity(blocks_start);

    let header = raw::Header {
        magic: *raw::MAGIC,
        version: raw::VERSION,
        flags: 0,
        outward_count: outward_count as u16,
        total_unit_count: total_unit_count as u32,
        lat_offset,
        lon_offset,
    };
    header.write_to(&mut out)?;

    for (block, &offset) in blocks.iter().zip(&block_offsets) {
        let entry = raw::OutwardEntry {
            outward_code: block.outward_code,
            sector_count: block.sector_entries.len() as u8,
            sector_index_offset: offset as u32,
        };
        entry.write_to(&mut out)?;
    }

    for block in &blocks {
        for entry in &block.sector_entries {
            entry.write_to(&mut out)?;
        }
        for blob in &block.blobs {
            out.extend_from_slice(blob);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_header_only_with_zero_outwards() {
        let result = Encoder::encode_from_records(&[]);
        // outward_count == 0 is itself an invalid header per the reader's
        // validation, but encoding an empty database must not panic or error.
        assert!(result.is_ok());
    }

    #[test]
    fn deterministic_across_runs() {
        let records = vec![
            Record::new("M1 1AA", 53.4808, -2.2426),
            Record::new("SW1A 1AA", 51.5014, -0.1419),
        ];
        let first = Encoder::encode_from_records(&records).unwrap();
        let second = Encoder::encode_from_records(&records).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn quantize_rounds_to_nearest() {
        assert_eq!(5348080, quantize(53.4808));
        assert_eq!(-224260, quantize(-2.2426));
    }

    #[test]
    fn malformed_rows_are_dropped_silently() {
        let records = vec![
            Record::new("not a postcode", 1.0, 2.0),
            Record::new("M1 1AA", 53.4808, -2.2426),
        ];
        let (_, stats) = encode(&records).unwrap();
        assert_eq!(1, stats.rows_dropped);
        assert_eq!(1, stats.total_postcodes);
    }
}
