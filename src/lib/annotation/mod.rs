//! Genomic feature annotation and the interval index used to assign reads.
//!
//! Coordinates are 0-based and half-open throughout; loaders convert from the
//! conventions of their input formats.

pub mod bed;
pub mod gtf;
pub mod vcf;

use log::info;
use rust_lapper::{Interval, Lapper};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{CountError, Result};

pub use bed::load_bed;
pub use gtf::load_gtf;
pub use vcf::load_vcf;

/// Strand of a feature or of an aligned read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    /// Strand of a read given its SAM reverse-complement flag.
    #[inline]
    pub fn from_reverse_flag(reverse: bool) -> Self {
        if reverse {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }
}

/// Library strandedness protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrandMode {
    /// Unstranded; features on both strands are counted.
    #[default]
    None,
    /// Read 1 (or the single read) comes from the feature strand.
    Forward,
    /// Read 1 (or the single read) comes from the opposite strand.
    Reverse,
}

impl FromStr for StrandMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" | "none" => Ok(StrandMode::None),
            "yes" | "forward" => Ok(StrandMode::Forward),
            "reverse" => Ok(StrandMode::Reverse),
            other => Err(format!(
                "unknown strandedness '{}', expected no, yes or reverse",
                other
            )),
        }
    }
}

impl fmt::Display for StrandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrandMode::None => "no",
            StrandMode::Forward => "yes",
            StrandMode::Reverse => "reverse",
        };
        f.write_str(label)
    }
}

/// Which segment of a template a read is, for strand filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MateOrder {
    Single,
    First,
    Second,
}

impl MateOrder {
    pub fn of_pair(first_of_pair: bool) -> Self {
        if first_of_pair {
            MateOrder::First
        } else {
            MateOrder::Second
        }
    }
}

/// Whether a feature on `feature` strand may receive a read on `read` strand.
#[inline]
pub fn strand_compatible(mode: StrandMode, order: MateOrder, read: Strand, feature: Strand) -> bool {
    let same = read == feature;
    match (mode, order) {
        (StrandMode::None, _) => true,
        (StrandMode::Forward, MateOrder::Single | MateOrder::First) => same,
        (StrandMode::Forward, MateOrder::Second) => !same,
        (StrandMode::Reverse, MateOrder::Single | MateOrder::First) => !same,
        (StrandMode::Reverse, MateOrder::Second) => same,
    }
}

/// One annotated interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub strand: Strand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotTag {
    slot: u32,
    strand: Strand,
}

/// Sorted, duplicate-free feature slots hit by a read.
pub type FeatureHits = SmallVec<[u32; 4]>;

/// Add `slot` to `hits`, keeping it sorted and unique.
#[inline]
pub fn insert_hit(hits: &mut FeatureHits, slot: u32) {
    if let Err(at) = hits.binary_search(&slot) {
        hits.insert(at, slot);
    }
}

/// Interval trees per chromosome plus the dense feature catalogue.
#[derive(Debug)]
pub struct FeatureIndex {
    trees: FxHashMap<String, Lapper<u32, SlotTag>>,
    ids: Vec<String>,
    names: Vec<String>,
    slots: FxHashMap<String, u32>,
}

impl FeatureIndex {
    /// Build from features; slots follow first-seen identifier order.
    pub fn build(features: Vec<Feature>) -> Result<Self> {
        Self::with_catalog(Vec::new(), features)
    }

    /// Build with slot order fixed by `catalog` (`(id, name)` pairs). Identifiers
    /// seen only in `features` are appended in first-seen order.
    pub fn with_catalog(catalog: Vec<(String, String)>, features: Vec<Feature>) -> Result<Self> {
        let mut index = FeatureIndex {
            trees: FxHashMap::default(),
            ids: Vec::new(),
            names: Vec::new(),
            slots: FxHashMap::default(),
        };
        for (id, name) in catalog {
            index.slot_for(&id, &name);
        }

        let mut per_chrom: FxHashMap<String, Vec<Interval<u32, SlotTag>>> = FxHashMap::default();
        for feature in features {
            let slot = index.slot_for(&feature.id, &feature.name);
            per_chrom
                .entry(feature.chrom)
                .or_default()
                .push(Interval {
                    start: feature.start,
                    stop: feature.end,
                    val: SlotTag {
                        slot,
                        strand: feature.strand,
                    },
                });
        }
        if index.ids.is_empty() {
            return Err(CountError::EmptyAnnotation);
        }

        index.trees = per_chrom
            .into_iter()
            .map(|(chrom, ivs)| (chrom, Lapper::new(ivs)))
            .collect();
        info!(
            "Feature index holds {} features on {} chromosomes",
            index.ids.len(),
            index.trees.len()
        );
        Ok(index)
    }

    fn slot_for(&mut self, id: &str, name: &str) -> u32 {
        if let Some(&slot) = self.slots.get(id) {
            return slot;
        }
        let slot = self.ids.len() as u32;
        self.ids.push(id.to_string());
        self.names.push(name.to_string());
        self.slots.insert(id.to_string(), slot);
        slot
    }

    /// Number of dense feature slots.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.slots.get(id).map(|&s| s as usize)
    }

    pub fn id(&self, slot: usize) -> &str {
        &self.ids[slot]
    }

    pub fn name(&self, slot: usize) -> &str {
        &self.names[slot]
    }

    /// Chromosomes carrying at least one interval.
    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    /// Features overlapping `[start, end)` on `chrom` that pass the strand rule.
    pub fn query_overlaps(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        read_strand: Strand,
        order: MateOrder,
        mode: StrandMode,
    ) -> FeatureHits {
        let mut hits = FeatureHits::new();
        self.extend_overlaps(&mut hits, chrom, start, end, read_strand, order, mode);
        hits
    }

    /// Union the overlaps of `[start, end)` into `hits`.
    #[allow(clippy::too_many_arguments)]
    pub fn extend_overlaps(
        &self,
        hits: &mut FeatureHits,
        chrom: &str,
        start: u32,
        end: u32,
        read_strand: Strand,
        order: MateOrder,
        mode: StrandMode,
    ) {
        if end <= start {
            return;
        }
        if let Some(tree) = self.trees.get(chrom) {
            for iv in tree.find(start, end) {
                if strand_compatible(mode, order, read_strand, iv.val.strand) {
                    insert_hit(hits, iv.val.slot);
                }
            }
        }
    }
}
