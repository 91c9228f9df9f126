//! Read-to-feature assignment.
//!
//! Two interchangeable strategies are chosen once from the configuration:
//! position-based (CIGAR blocks against the interval index) and tag-based
//! (feature identifier read from a BAM tag). Both are plain functions over
//! [`AlignedRead`]s and never touch counters themselves.

use noodles::bam;
use noodles::sam::alignment::record::cigar::Op;

use crate::annotation::{insert_hit, FeatureHits, FeatureIndex, MateOrder, Strand, StrandMode};
use crate::bam::record::{alignment_start, cigar_ops, is_aligned, mapping_quality, reference_id, string_tag};
use crate::bam::ReferenceDictionary;
use crate::core::error::{CountError, Result};

use super::config::{CountConfig, FeatureMode};

/// The parts of an alignment needed for assignment. Also the form in which an
/// unresolved paired-end half waits for its mate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    pub ref_id: i32,
    pub start: i64,
    pub cigar: Vec<Op>,
    pub strand: Strand,
    pub first_of_pair: bool,
    pub mapq: u8,
    pub feature: Option<String>,
    pub umi: Option<String>,
}

/// A paired-end half buffered until its mate is decoded.
pub type PendingMate = AlignedRead;

/// Tag value with the `-` / empty placeholders treated as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "-")
}

impl AlignedRead {
    pub fn from_record(record: &bam::Record, config: &CountConfig) -> Result<Self> {
        let feature = match config.feature_mode {
            FeatureMode::Tag => present(string_tag(record, config.feature_tag)?),
            FeatureMode::Position => None,
        };
        let umi = if config.collects_umis() {
            match present(string_tag(record, config.umi_tag)?) {
                Some(umi) => Some(umi),
                None => present(string_tag(record, config.raw_umi_tag)?),
            }
        } else {
            None
        };
        let flags = record.flags();
        Ok(Self {
            ref_id: reference_id(record)?,
            start: alignment_start(record)?,
            cigar: cigar_ops(record)?,
            strand: Strand::from_reverse_flag(flags.is_reverse_complemented()),
            first_of_pair: flags.is_first_segment(),
            mapq: mapping_quality(record),
            feature,
            umi,
        })
    }
}

/// Result of assigning one read or one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoFeature,
    Ambiguous,
    Assigned {
        slot: usize,
        /// Amount added to the `mapped` counter.
        weight: u64,
        umi: Option<String>,
    },
}

/// Read-only lookups available to the strategies.
pub struct ClassifyContext<'a> {
    pub features: &'a FeatureIndex,
    pub references: &'a ReferenceDictionary,
    pub strand_mode: StrandMode,
    pub paired: bool,
}

impl ClassifyContext<'_> {
    fn mate_order(&self, read: &AlignedRead) -> MateOrder {
        if self.paired {
            MateOrder::of_pair(read.first_of_pair)
        } else {
            MateOrder::Single
        }
    }
}

pub type SingleStrategy = fn(&ClassifyContext<'_>, &AlignedRead) -> Result<Outcome>;
pub type PairStrategy = fn(&ClassifyContext<'_>, &AlignedRead, &AlignedRead) -> Result<Outcome>;

/// Assignment functions for single reads and completed pairs.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub single: SingleStrategy,
    pub pair: PairStrategy,
}

impl Strategy {
    pub fn for_mode(mode: FeatureMode) -> Self {
        match mode {
            FeatureMode::Position => Strategy {
                single: position_single,
                pair: position_pair,
            },
            FeatureMode::Tag => Strategy {
                single: tag_single,
                pair: tag_pair,
            },
        }
    }
}

/// Union of the features overlapped by the aligned blocks of `read`.
///
/// `M`, `=` and `X` blocks are queried and advance the reference position;
/// `N` and `D` only advance it; `I`, `S`, `H` and `P` are ignored.
pub fn overlapping_features(ctx: &ClassifyContext<'_>, read: &AlignedRead, hits: &mut FeatureHits) {
    let Some(chrom) = ctx.references.name(read.ref_id) else {
        return;
    };
    let order = ctx.mate_order(read);
    let mut pos = read.start.max(0) as u64;
    for op in &read.cigar {
        let len = op.len() as u64;
        if is_aligned(op.kind()) {
            let start = u32::try_from(pos).unwrap_or(u32::MAX);
            let end = u32::try_from(pos + len).unwrap_or(u32::MAX);
            ctx.features
                .extend_overlaps(hits, chrom, start, end, read.strand, order, ctx.strand_mode);
        }
        if op.kind().consumes_reference() {
            pos += len;
        }
    }
}

fn outcome_from_hits(hits: &FeatureHits) -> Outcome {
    match hits.as_slice() {
        [] => Outcome::NoFeature,
        [slot] => Outcome::Assigned {
            slot: *slot as usize,
            weight: 1,
            umi: None,
        },
        _ => Outcome::Ambiguous,
    }
}

pub fn position_single(ctx: &ClassifyContext<'_>, read: &AlignedRead) -> Result<Outcome> {
    let mut hits = FeatureHits::new();
    overlapping_features(ctx, read, &mut hits);
    Ok(outcome_from_hits(&hits))
}

pub fn position_pair(ctx: &ClassifyContext<'_>, read: &AlignedRead, mate: &AlignedRead) -> Result<Outcome> {
    let mut hits = FeatureHits::new();
    overlapping_features(ctx, read, &mut hits);
    let mut mate_hits = FeatureHits::new();
    overlapping_features(ctx, mate, &mut mate_hits);
    for slot in mate_hits {
        insert_hit(&mut hits, slot);
    }
    Ok(outcome_from_hits(&hits))
}

fn feature_slot(ctx: &ClassifyContext<'_>, id: &str) -> Result<usize> {
    ctx.features
        .slot_of(id)
        .ok_or_else(|| CountError::UnknownFeature(id.to_string()))
}

pub fn tag_single(ctx: &ClassifyContext<'_>, read: &AlignedRead) -> Result<Outcome> {
    match read.feature.as_deref() {
        None => Ok(Outcome::NoFeature),
        Some(id) => Ok(Outcome::Assigned {
            slot: feature_slot(ctx, id)?,
            weight: 1,
            umi: read.umi.clone(),
        }),
    }
}

/// Pairs agree when both halves carry the same feature or only one carries
/// one; the pair then counts once for the feature and twice toward `mapped`.
pub fn tag_pair(ctx: &ClassifyContext<'_>, read: &AlignedRead, mate: &AlignedRead) -> Result<Outcome> {
    let id = match (read.feature.as_deref(), mate.feature.as_deref()) {
        (None, None) => return Ok(Outcome::NoFeature),
        (Some(a), Some(b)) if a != b => return Ok(Outcome::Ambiguous),
        (Some(id), _) | (None, Some(id)) => id,
    };
    Ok(Outcome::Assigned {
        slot: feature_slot(ctx, id)?,
        weight: 2,
        umi: read.umi.clone().or_else(|| mate.umi.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Feature;
    use noodles::sam::alignment::record::cigar::op::Kind;

    fn features() -> FeatureIndex {
        let f = |id: &str, start, end, strand| Feature {
            id: id.to_string(),
            name: id.to_string(),
            chrom: "chr1".to_string(),
            start,
            end,
            strand,
        };
        FeatureIndex::build(vec![
            f("A", 100, 200, Strand::Forward),
            f("B", 1000, 1100, Strand::Forward),
            f("C", 150, 250, Strand::Reverse),
        ])
        .unwrap()
    }

    fn references() -> ReferenceDictionary {
        ReferenceDictionary::new(vec![("chr1", 10_000)])
    }

    fn read(start: i64, cigar: &[(Kind, usize)]) -> AlignedRead {
        AlignedRead {
            ref_id: 0,
            start,
            cigar: cigar.iter().map(|&(k, l)| Op::new(k, l)).collect(),
            strand: Strand::Forward,
            first_of_pair: true,
            mapq: 60,
            feature: None,
            umi: None,
        }
    }

    fn ctx<'a>(idx: &'a FeatureIndex, refs: &'a ReferenceDictionary, mode: StrandMode, paired: bool) -> ClassifyContext<'a> {
        ClassifyContext {
            features: idx,
            references: refs,
            strand_mode: mode,
            paired,
        }
    }

    #[test]
    fn spliced_read_skips_intron() {
        let (idx, refs) = (features(), references());
        let c = ctx(&idx, &refs, StrandMode::None, false);
        // 50M900N50M: blocks [50,100) and [1000,1050)
        let r = read(50, &[(Kind::Match, 50), (Kind::Skip, 900), (Kind::Match, 50)]);
        assert_eq!(
            position_single(&c, &r).unwrap(),
            Outcome::Assigned { slot: 1, weight: 1, umi: None }
        );
    }

    #[test]
    fn soft_clips_and_insertions_do_not_move_the_reference() {
        let (idx, refs) = (features(), references());
        let c = ctx(&idx, &refs, StrandMode::None, false);
        let r = read(
            95,
            &[(Kind::SoftClip, 30), (Kind::Match, 10), (Kind::Insertion, 500), (Kind::SequenceMatch, 10)],
        );
        assert_eq!(position_single(&c, &r).unwrap(), Outcome::Assigned { slot: 0, weight: 1, umi: None });

        let deleted = read(60, &[(Kind::Match, 10), (Kind::Deletion, 940), (Kind::Match, 10)]);
        assert_eq!(position_single(&c, &deleted).unwrap(), Outcome::Assigned { slot: 1, weight: 1, umi: None });
    }

    #[test]
    fn overlapping_features_are_ambiguous_unless_stranded() {
        let (idx, refs) = (features(), references());
        let r = read(160, &[(Kind::Match, 20)]);
        let none = ctx(&idx, &refs, StrandMode::None, false);
        assert_eq!(position_single(&none, &r).unwrap(), Outcome::Ambiguous);
        let fwd = ctx(&idx, &refs, StrandMode::Forward, false);
        assert_eq!(position_single(&fwd, &r).unwrap(), Outcome::Assigned { slot: 0, weight: 1, umi: None });
        let rev = ctx(&idx, &refs, StrandMode::Reverse, false);
        assert_eq!(position_single(&rev, &r).unwrap(), Outcome::Assigned { slot: 2, weight: 1, umi: None });
    }

    #[test]
    fn same_strand_read_is_no_feature_in_reverse_mode() {
        let (idx, refs) = (features(), references());
        let r = read(1010, &[(Kind::Match, 20)]);
        let rev = ctx(&idx, &refs, StrandMode::Reverse, false);
        assert_eq!(position_single(&rev, &r).unwrap(), Outcome::NoFeature);
        let fwd = ctx(&idx, &refs, StrandMode::Forward, false);
        assert!(matches!(position_single(&fwd, &r).unwrap(), Outcome::Assigned { slot: 1, .. }));
    }

    #[test]
    fn pair_union_decides_the_bucket() {
        let (idx, refs) = (features(), references());
        let c = ctx(&idx, &refs, StrandMode::None, true);
        let left = read(110, &[(Kind::Match, 20)]);
        let right = read(1010, &[(Kind::Match, 20)]);
        let far = read(5000, &[(Kind::Match, 20)]);
        assert_eq!(position_pair(&c, &left, &right).unwrap(), Outcome::Ambiguous);
        assert_eq!(position_pair(&c, &left, &far).unwrap(), Outcome::Assigned { slot: 0, weight: 1, umi: None });
        assert_eq!(position_pair(&c, &far, &far).unwrap(), Outcome::NoFeature);
    }

    #[test]
    fn second_mate_uses_flipped_strand_rule() {
        let (idx, refs) = (features(), references());
        let c = ctx(&idx, &refs, StrandMode::Reverse, true);
        let mut second = read(1010, &[(Kind::Match, 20)]);
        second.first_of_pair = false;
        assert!(matches!(position_single(&c, &second).unwrap(), Outcome::Assigned { slot: 1, .. }));
        second.first_of_pair = true;
        assert_eq!(position_single(&c, &second).unwrap(), Outcome::NoFeature);
    }

    #[test]
    fn tag_strategies() {
        let (idx, refs) = (features(), references());
        let c = ctx(&idx, &refs, StrandMode::None, true);
        let mut a = read(0, &[]);
        let mut b = read(0, &[]);
        assert_eq!(tag_single(&c, &a).unwrap(), Outcome::NoFeature);
        assert_eq!(tag_pair(&c, &a, &b).unwrap(), Outcome::NoFeature);

        a.feature = Some("B".into());
        b.umi = Some("ACGT".into());
        assert_eq!(
            tag_pair(&c, &a, &b).unwrap(),
            Outcome::Assigned { slot: 1, weight: 2, umi: Some("ACGT".into()) }
        );

        b.feature = Some("A".into());
        assert_eq!(tag_pair(&c, &a, &b).unwrap(), Outcome::Ambiguous);

        a.feature = Some("nope".into());
        assert!(matches!(tag_single(&c, &a), Err(CountError::UnknownFeature(id)) if id == "nope"));
    }
}
