//! Per-chunk accumulation: barcode resolution, filter cascade, mate pairing.

use log::debug;
use noodles::bam;
use rustc_hash::FxHashMap;

use super::classifier::{AlignedRead, ClassifyContext, Outcome, PendingMate, Strategy};
use super::config::{CountConfig, FeatureMode};
use super::result::{BarcodeResult, ResultSet};
use super::umi::{encode_umi, UmiSets};
use super::{CountContext, UNKNOWN_BARCODE};
use crate::bam::record::{read_name, read_name_lossy, string_tag};
use crate::core::error::{CountError, Result};

/// Private accumulator of one worker.
pub struct ChunkTally<'a> {
    ctx: &'a CountContext,
    classify: ClassifyContext<'a>,
    strategy: Strategy,
    results: ResultSet,
    pending: FxHashMap<Vec<u8>, PendingMate>,
}

fn record_outcome(result: &mut BarcodeResult, outcome: Outcome, config: &CountConfig) -> Result<()> {
    let tag_mode = config.feature_mode == FeatureMode::Tag;
    let counters = &mut result.counters;
    match outcome {
        Outcome::NoFeature => counters.no_feature += 1,
        Outcome::Ambiguous => {
            counters.ambiguous += 1;
            if tag_mode {
                counters.feature_tags_seen += 1;
            }
        }
        Outcome::Assigned { slot, weight, umi } => {
            counters.mapped += weight;
            if tag_mode {
                counters.feature_tags_seen += 1;
            }
            result.counts[slot] += 1;
            if let Some(umi) = umi {
                result.counters.umi_tags_seen += 1;
                let key = encode_umi(&umi)?;
                let n_features = result.counts.len();
                result
                    .umis
                    .get_or_insert_with(|| UmiSets::new(n_features))
                    .insert(slot, key);
            }
        }
    }
    Ok(())
}

fn count_single(
    strategy: &Strategy,
    classify: &ClassifyContext<'_>,
    config: &CountConfig,
    result: &mut BarcodeResult,
    read: &AlignedRead,
) -> Result<()> {
    if read.mapq < config.min_mapq {
        result.counters.too_low_qual += 1;
        return Ok(());
    }
    let outcome = (strategy.single)(classify, read)?;
    record_outcome(result, outcome, config)
}

impl<'a> ChunkTally<'a> {
    pub fn new(ctx: &'a CountContext) -> Self {
        Self {
            ctx,
            classify: ctx.classify_context(),
            strategy: ctx.strategy(),
            results: ResultSet::new(ctx.barcodes.len()),
            pending: FxHashMap::default(),
        }
    }

    /// Number of paired-end halves still waiting for their mate.
    pub fn pending_mates(&self) -> usize {
        self.pending.len()
    }

    pub fn process(&mut self, record: &bam::Record) -> Result<()> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let barcode_id = if ctx.barcodes.is_demultiplexed() {
            let barcode = string_tag(record, config.barcode_tag)?;
            ctx.barcodes.resolve(barcode.as_deref())?
        } else {
            ctx.barcodes.unknown_id()
        };
        let barcode = ctx
            .barcodes
            .barcode_by_id(barcode_id)
            .unwrap_or(UNKNOWN_BARCODE);
        let result = self.results.entry(barcode_id, barcode, ctx.n_features());

        let flags = record.flags();
        result.counters.total_reads += 1;
        if config.paired && !flags.is_segmented() {
            return Err(CountError::NotPaired(read_name_lossy(record)));
        }
        if flags.is_duplicate() {
            result.counters.duplicates += 1;
        }
        if flags.is_unmapped() {
            result.counters.unmapped += 1;
            return Ok(());
        }
        if flags.is_secondary() || flags.is_supplementary() {
            result.counters.not_unique += 1;
            if !config.keep_multi_mapped {
                return Ok(());
            }
        }

        let read = AlignedRead::from_record(record, config)?;
        if !config.paired {
            return count_single(&self.strategy, &self.classify, config, result, &read);
        }

        if flags.is_mate_unmapped() {
            result.counters.mate_unmapped += 1;
        }
        if flags.is_properly_segmented() {
            result.counters.properly_paired += 1;
        }
        if flags.is_mate_unmapped() {
            result.counters.counted_unique += 1;
            return count_single(&self.strategy, &self.classify, config, result, &read);
        }

        match self.pending.remove(read_name(record)) {
            Some(mate) => {
                result.counters.counted_pair += 1;
                if read.mapq < config.min_mapq || mate.mapq < config.min_mapq {
                    result.counters.too_low_qual += 1;
                    return Ok(());
                }
                let outcome = (self.strategy.pair)(&self.classify, &read, &mate)?;
                record_outcome(result, outcome, config)
            }
            None => {
                self.pending.insert(read_name(record).to_vec(), read);
                Ok(())
            }
        }
    }

    /// Close the chunk. Mates still waiting are dropped uncounted.
    pub fn finish(self) -> ResultSet {
        if !self.pending.is_empty() {
            debug!(
                "{} paired-end reads left without a mate at chunk end",
                self.pending.len()
            );
        }
        self.results
    }
}
