//! Per-barcode results and their additive merge.

use serde::Serialize;

use super::barcode::BarcodeUniverse;
use super::umi::UmiSets;
use crate::core::error::{CountError, Result};

/// Scalar read counters. Every processed record lands in exactly one of
/// `unmapped`, `not_unique` (when multi-mapped reads are dropped),
/// `too_low_qual`, `no_feature`, `ambiguous`, `mapped`, or the pair buffer;
/// `duplicates` and the paired-end fields are auxiliary tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub total_reads: u64,
    pub mapped: u64,
    pub ambiguous: u64,
    pub no_feature: u64,
    pub unmapped: u64,
    pub not_unique: u64,
    pub too_low_qual: u64,
    pub duplicates: u64,
    pub mate_unmapped: u64,
    pub properly_paired: u64,
    pub counted_pair: u64,
    pub counted_unique: u64,
    pub feature_tags_seen: u64,
    pub umi_tags_seen: u64,
}

impl Counters {
    pub fn add(&mut self, other: &Counters) {
        self.total_reads += other.total_reads;
        self.mapped += other.mapped;
        self.ambiguous += other.ambiguous;
        self.no_feature += other.no_feature;
        self.unmapped += other.unmapped;
        self.not_unique += other.not_unique;
        self.too_low_qual += other.too_low_qual;
        self.duplicates += other.duplicates;
        self.mate_unmapped += other.mate_unmapped;
        self.properly_paired += other.properly_paired;
        self.counted_pair += other.counted_pair;
        self.counted_unique += other.counted_unique;
        self.feature_tags_seen += other.feature_tags_seen;
        self.umi_tags_seen += other.umi_tags_seen;
    }
}

/// Counts accumulated for one barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeResult {
    pub barcode: String,
    pub counters: Counters,
    pub counts: Vec<u32>,
    pub umis: Option<UmiSets>,
}

impl BarcodeResult {
    pub fn new(barcode: impl Into<String>, n_features: usize) -> Self {
        Self {
            barcode: barcode.into(),
            counters: Counters::default(),
            counts: vec![0; n_features],
            umis: None,
        }
    }

    /// Add `other` into `self`. Both must describe the same barcode and the
    /// same feature space.
    pub fn merge(&mut self, other: BarcodeResult) -> Result<()> {
        if self.barcode != other.barcode {
            return Err(CountError::BarcodeMismatch {
                left: self.barcode.clone(),
                right: other.barcode,
            });
        }
        if self.counts.len() != other.counts.len() {
            return Err(CountError::CountLengthMismatch {
                barcode: self.barcode.clone(),
                expected: self.counts.len(),
                actual: other.counts.len(),
            });
        }

        self.counters.add(&other.counters);
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        if let Some(theirs) = other.umis {
            match self.umis.as_mut() {
                Some(mine) => mine.merge(&self.barcode, theirs)?,
                None => self.umis = Some(theirs),
            }
        }
        Ok(())
    }

    /// Deduplicated molecule count for a feature.
    pub fn umi_count(&self, slot: usize) -> usize {
        self.umis.as_ref().map_or(0, |sets| sets.distinct(slot))
    }
}

/// Results of one worker (or of a whole run), indexed by barcode id. Barcodes
/// never seen stay `None` until [`ResultSet::into_results`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    results: Vec<Option<BarcodeResult>>,
}

impl ResultSet {
    pub fn new(n_barcodes: usize) -> Self {
        Self {
            results: vec![None; n_barcodes],
        }
    }

    pub fn n_barcodes(&self) -> usize {
        self.results.len()
    }

    /// Result for `barcode_id`, created on first use.
    pub fn entry(&mut self, barcode_id: u32, barcode: &str, n_features: usize) -> &mut BarcodeResult {
        self.results[barcode_id as usize].get_or_insert_with(|| BarcodeResult::new(barcode, n_features))
    }

    pub fn get(&self, barcode_id: u32) -> Option<&BarcodeResult> {
        self.results.get(barcode_id as usize).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BarcodeResult> {
        self.results.iter().flatten()
    }

    pub fn merge(mut self, other: ResultSet) -> Result<ResultSet> {
        if self.results.len() != other.results.len() {
            return Err(CountError::DimensionMismatch {
                expected: self.results.len(),
                actual: other.results.len(),
            });
        }
        for (mine, theirs) in self.results.iter_mut().zip(other.results) {
            let Some(theirs) = theirs else {
                continue;
            };
            match mine {
                Some(existing) => existing.merge(theirs)?,
                None => *mine = Some(theirs),
            }
        }
        Ok(self)
    }

    /// One result per barcode of the universe, in universe order.
    pub fn into_results(self, barcodes: &BarcodeUniverse, n_features: usize) -> Vec<BarcodeResult> {
        self.results
            .into_iter()
            .zip(barcodes.ordered_barcodes())
            .map(|(result, barcode)| result.unwrap_or_else(|| BarcodeResult::new(barcode.as_str(), n_features)))
            .collect()
    }
}

/// Totals over every barcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalSummary {
    pub counters: Counters,
    pub barcodes_with_reads: usize,
}

impl GlobalSummary {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a BarcodeResult>,
    {
        let mut summary = GlobalSummary::default();
        for result in results {
            summary.counters.add(&result.counters);
            if result.counters.total_reads > 0 {
                summary.barcodes_with_reads += 1;
            }
        }
        summary
    }
}
