//! The in-memory outward → sector → unit tree built during encoding.

use std::collections::{BTreeMap, HashSet};

use crate::raw;
use crate::varint;

/// One postcode's quantized coordinates, keyed by its unit index within a sector.
#[derive(Debug, Clone, Copy)]
struct Unit {
    unit_index: u16,
    lat_int: i32,
    lon_int: i32,
}

/// All units sharing an `(outward, sector_number)`.
#[derive(Debug, Clone)]
pub struct Sector {
    sector_number: u8,
    units: Vec<Unit>,
    seen: HashSet<u16>,
    lat_min: i32,
    lat_max: i32,
    lon_min: i32,
    lon_max: i32,
}

impl Sector {
    fn new(sector_number: u8) -> Sector {
        Sector {
            sector_number,
            units: Vec::new(),
            seen: HashSet::new(),
            lat_min: i32::MAX,
            lat_max: i32::MIN,
            lon_min: i32::MAX,
            lon_max: i32::MIN,
        }
    }

    /// Inserts a unit, keeping the first record on a duplicate `unit_index`.
    fn insert(&mut self, unit_index: u16, lat_int: i32, lon_int: i32) {
        if !self.seen.insert(unit_index) {
            return;
        }
        self.units.push(Unit {
            unit_index,
            lat_int,
            lon_int,
        });
        self.lat_min = self.lat_min.min(lat_int);
        self.lat_max = self.lat_max.max(lat_int);
        self.lon_min = self.lon_min.min(lon_int);
        self.lon_max = self.lon_max.max(lon_int);
    }

    /// The sector's digit, 0-9.
    pub fn sector_number(&self) -> u8 {
        self.sector_number
    }

    /// The number of units stored in this sector.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// The minimum quantized latitude across this sector's units.
    pub fn lat_min(&self) -> i32 {
        self.lat_min
    }

    /// The minimum quantized longitude across this sector's units.
    pub fn lon_min(&self) -> i32 {
        self.lon_min
    }

    /// Sorted `unit_index`es, their lat/lon deltas from this sector's min, and
    /// the minimal bit widths required to store those deltas.
    pub fn finalize(&mut self) -> FinalizedSector {
        self.units.sort_by_key(|u| u.unit_index);
        let mut unit_indices = Vec::with_capacity(self.units.len());
        let mut lat_deltas = Vec::with_capacity(self.units.len());
        let mut lon_deltas = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            unit_indices.push(u32::from(unit.unit_index));
            lat_deltas.push((unit.lat_int - self.lat_min) as u32);
            lon_deltas.push((unit.lon_int - self.lon_min) as u32);
        }
        let bits_lat = min_bits(lat_deltas.iter().copied().max().unwrap_or(0));
        let bits_lon = min_bits(lon_deltas.iter().copied().max().unwrap_or(0));

        let list_encoded_len = varint::encoded_delta_sequence_len(&unit_indices);
        let list_mode = list_encoded_len < raw::BITMAP_LEN;

        FinalizedSector {
            unit_indices,
            lat_deltas,
            lon_deltas,
            bits_lat,
            bits_lon,
            list_mode,
        }
    }
}

/// The outcome of [`Sector::finalize`]: everything the encoder needs to lay out
/// one sector's blob.
#[derive(Debug, Clone)]
pub struct FinalizedSector {
    /// Ascending unit indices present in this sector.
    pub unit_indices: Vec<u32>,
    /// `lat_int - sector.lat_min` for each unit, in the same order as `unit_indices`.
    pub lat_deltas: Vec<u32>,
    /// `lon_int - sector.lon_min` for each unit, in the same order as `unit_indices`.
    pub lon_deltas: Vec<u32>,
    /// The minimal bit width needed to store every `lat_deltas` entry.
    pub bits_lat: u32,
    /// The minimal bit width needed to store every `lon_deltas` entry.
    pub bits_lon: u32,
    /// Whether the delta-varint list encoding beats the fixed bitmap size.
    pub list_mode: bool,
}

/// `ceil(log2(max_delta + 1))`, `0` if `max_delta` is `0`.
fn min_bits(max_delta: u32) -> u32 {
    32 - max_delta.leading_zeros()
}

/// All sectors sharing an outward code.
#[derive(Debug, Clone)]
pub struct Outward {
    outward: String,
    sectors: BTreeMap<u8, Sector>,
}

impl Outward {
    fn new(outward: String) -> Outward {
        Outward {
            outward,
            sectors: BTreeMap::new(),
        }
    }

    /// The outward code, e.g. `"SW1A"`.
    pub fn code(&self) -> &str {
        &self.outward
    }

    /// Sectors in ascending sector-number order.
    pub fn sectors(&mut self) -> impl Iterator<Item = &mut Sector> {
        self.sectors.values_mut()
    }

    /// The number of sectors in this outward.
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }
}

/// The full outward → sector → unit tree accumulated during the parse/group pass.
#[derive(Debug, Clone, Default)]
pub struct Model {
    outwards: BTreeMap<String, Outward>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Model {
        Model::default()
    }

    /// Inserts one parsed, quantized record. Later duplicates of the same
    /// `(outward, sector, unit_index)` are dropped.
    pub fn insert(&mut self, outward: &str, sector: u8, unit_index: u16, lat_int: i32, lon_int: i32) {
        let entry = self
            .outwards
            .entry(outward.to_string())
            .or_insert_with(|| Outward::new(outward.to_string()));
        let sector_entry = entry
            .sectors
            .entry(sector)
            .or_insert_with(|| Sector::new(sector));
        sector_entry.insert(unit_index, lat_int, lon_int);
    }

    /// Outwards in ascending lexicographic order.
    pub fn outwards(&mut self) -> impl Iterator<Item = &mut Outward> {
        self.outwards.values_mut()
    }

    /// The number of distinct outwards.
    pub fn outward_count(&self) -> usize {
        self.outwards.len()
    }

    /// The total number of units across every sector of every outward.
    pub fn total_unit_count(&self) -> usize {
        self.outwards
            .values()
            .flat_map(|o| o.sectors.values())
            .map(Sector::unit_count)
            .sum()
    }

    /// The minimum quantized `(lat, lon)` over every unit, or `(0, 0)` if empty.
    pub fn global_offsets(&self) -> (i32, i32) {
        let mut lat_offset = i32::MAX;
        let mut lon_offset = i32::MAX;
        for outward in self.outwards.values() {
            for sector in outward.sectors.values() {
                if sector.unit_count() > 0 {
                    lat_offset = lat_offset.min(sector.lat_min);
                    lon_offset = lon_offset.min(sector.lon_min);
                }
            }
        }
        if lat_offset == i32::MAX {
            (0, 0)
        } else {
            (lat_offset, lon_offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_unit_keeps_first() {
        let mut model = Model::new();
        model.insert("M1", 1, 0, 100, 200);
        model.insert("M1", 1, 0, 999, 999);
        let outward = model.outwards().next().unwrap();
        let sector = outward.sectors().next().unwrap();
        assert_eq!(1, sector.unit_count());
        let finalized = sector.finalize();
        assert_eq!(vec![0], finalized.lat_deltas);
        assert_eq!(vec![0], finalized.lon_deltas);
    }

    #[test]
    fn global_offsets_are_minimum_over_all_units() {
        let mut model = Model::new();
        model.insert("M1", 1, 0, 100, -50);
        model.insert("M1", 2, 1, 50, 10);
        model.insert("SW1A", 1, 0, -10, 999);
        assert_eq!((-10, -50), model.global_offsets());
    }

    #[test]
    fn empty_model_has_zero_offsets() {
        let model = Model::new();
        assert_eq!((0, 0), model.global_offsets());
    }

    #[test]
    fn bit_width_selection() {
        let mut model = Model::new();
        model.insert("M1", 1, 0, 0, 0);
        model.insert("M1", 1, 5, 31, 0);
        let outward = model.outwards().next().unwrap();
        let sector = outward.sectors().next().unwrap();
        let finalized = sector.finalize();
        assert_eq!(5, finalized.bits_lat); // max delta 31 needs 5 bits
        assert_eq!(0, finalized.bits_lon); // all deltas 0
    }

    #[test]
    fn mode_selection_prefers_list_for_sparse_sectors() {
        let mut model = Model::new();
        model.insert("M1", 1, 0, 0, 0);
        let outward = model.outwards().next().unwrap();
        let sector = outward.sectors().next().unwrap();
        let finalized = sector.finalize();
        assert!(finalized.list_mode);
    }

    #[test]
    fn mode_selection_prefers_bitmap_for_dense_sectors() {
        let mut model = Model::new();
        for i in 0..676u16 {
            model.insert("M1", 1, i, i as i32, i as i32);
        }
        let outward = model.outwards().next().unwrap();
        let sector = outward.sectors().next().unwrap();
        let finalized = sector.finalize();
        assert!(!finalized.list_mode);
    }
}
