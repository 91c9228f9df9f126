//! Count matrices and per-barcode summary tables.

use anyhow::{Context, Result};
use fastcount_lib::core::prelude::{get_writer, make_parent_dirs};
use fastcount_lib::count::{BarcodeResult, Counters, CountConfig, CountContext, FeatureMode, GlobalSummary};
use fastcount_lib::engine::CountReport;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Extra rows of the detailed matrices, named after their HTSeq-count
/// counterparts.
const DETAIL_ROWS: [(&str, fn(&Counters) -> u64); 5] = [
    ("__no_feature", |c: &Counters| c.no_feature),
    ("__ambiguous", |c: &Counters| c.ambiguous),
    ("__too_low_aQual", |c: &Counters| c.too_low_qual),
    ("__not_aligned", |c: &Counters| c.unmapped),
    ("__alignment_not_unique", |c: &Counters| c.not_unique),
];

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    barcode: &'a str,
    sample: &'a str,
    total_reads: u64,
    mapped: u64,
    ambiguous: u64,
    no_feature: u64,
    not_aligned: u64,
    alignment_not_unique: u64,
    too_low_aqual: u64,
    duplicates: u64,
    mate_unmapped: u64,
    properly_paired: u64,
    counted_pairs: u64,
    counted_singletons: u64,
    feature_tags_seen: u64,
    umi_tags_seen: u64,
}

impl<'a> SummaryRow<'a> {
    fn new(barcode: &'a str, sample: &'a str, c: &Counters) -> Self {
        SummaryRow {
            barcode,
            sample,
            total_reads: c.total_reads,
            mapped: c.mapped,
            ambiguous: c.ambiguous,
            no_feature: c.no_feature,
            not_aligned: c.unmapped,
            alignment_not_unique: c.not_unique,
            too_low_aqual: c.too_low_qual,
            duplicates: c.duplicates,
            mate_unmapped: c.mate_unmapped,
            properly_paired: c.properly_paired,
            counted_pairs: c.counted_pair,
            counted_singletons: c.counted_unique,
            feature_tags_seen: c.feature_tags_seen,
            umi_tags_seen: c.umi_tags_seen,
        }
    }
}

fn column_names<'a>(report: &'a CountReport, ctx: &'a CountContext) -> Vec<&'a str> {
    (0..report.results.len() as u32)
        .map(|id| ctx.barcodes.sample_name(id).unwrap_or(""))
        .collect()
}

fn write_matrix<F>(path: &Path, report: &CountReport, ctx: &CountContext, detailed: bool, value: F) -> Result<()>
where
    F: Fn(&BarcodeResult, usize) -> u64,
{
    let mut writer = get_writer(&Some(path), false, false, 1, 6)?;
    let columns = column_names(report, ctx);

    let mut header = vec!["Gene_id"];
    if detailed {
        header.push("Gene_name");
    }
    header.extend(columns.iter().copied());
    writer.write_record(&header)?;

    for slot in 0..ctx.features.len() {
        let mut row = vec![ctx.features.id(slot).to_string()];
        if detailed {
            row.push(ctx.features.name(slot).to_string());
        }
        row.extend(report.results.iter().map(|r| value(r, slot).to_string()));
        writer.write_record(&row)?;
    }

    if detailed {
        for (label, field) in DETAIL_ROWS.iter() {
            let mut row = vec![label.to_string(), label.to_string()];
            row.extend(report.results.iter().map(|r| field(&r.counters).to_string()));
            writer.write_record(&row)?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn write_summary(path: &Path, report: &CountReport, ctx: &CountContext) -> Result<()> {
    let mut writer = get_writer(&Some(path), false, true, 1, 6)?;
    for (id, result) in report.results.iter().enumerate() {
        let sample = ctx.barcodes.sample_name(id as u32).unwrap_or("");
        writer.serialize(SummaryRow::new(&result.barcode, sample, &result.counters))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write every output table into `dir`, returning the paths written.
pub fn write_outputs(dir: &Path, report: &CountReport, ctx: &CountContext) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let path = |name: &str| dir.join(name);

    let counts = path("counts.tsv");
    make_parent_dirs(&counts)?;
    write_matrix(&counts, report, ctx, false, |r, slot| r.counts[slot] as u64)?;
    written.push(counts);

    let detailed = path("counts.detailed.tsv");
    write_matrix(&detailed, report, ctx, true, |r, slot| r.counts[slot] as u64)?;
    written.push(detailed);

    if ctx.config.collects_umis() && report.summary.counters.umi_tags_seen > 0 {
        let umis = path("umis.tsv");
        write_matrix(&umis, report, ctx, false, |r, slot| r.umi_count(slot) as u64)?;
        written.push(umis);

        let detailed = path("umis.detailed.tsv");
        write_matrix(&detailed, report, ctx, true, |r, slot| r.umi_count(slot) as u64)?;
        written.push(detailed);
    }

    let summary = path("summary.tsv");
    write_summary(&summary, report, ctx)?;
    written.push(summary);

    info!("Count matrices written in {}", dir.display());
    Ok(written)
}

fn pc(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Log the run summary, percentages relative to all reads (or to retained
/// pairs and singletons in paired-end runs).
pub fn log_summary(summary: &GlobalSummary, unknown: Option<&Counters>, config: &CountConfig) {
    let c = &summary.counters;
    let mut total = c.total_reads;
    info!("[Global information]");
    info!(
        "{} reads/pairs have a secondary/supplementary flag [multiple mappers] ({:.2}%)",
        c.not_unique,
        pc(c.not_unique, total)
    );
    info!(
        "{} reads/pairs are marked as duplicates ({:.2}%)",
        c.duplicates,
        pc(c.duplicates, total)
    );

    if config.paired {
        let retained = c.counted_pair * 2 + c.counted_unique;
        let primary = c.total_reads.saturating_sub(c.not_unique);
        info!("[Paired-end specific]");
        info!(
            "{} pairs and singletons retained ({} reads, {:.2}% of total)",
            c.counted_pair + c.counted_unique,
            retained,
            pc(retained, total)
        );
        info!(
            "    {} pairs ({} reads, {:.2}% of retained reads)",
            c.counted_pair,
            c.counted_pair * 2,
            pc(c.counted_pair * 2, primary)
        );
        info!(
            "    {} singletons with an unaligned mate ({:.2}% of retained reads)",
            c.counted_unique,
            pc(c.mate_unmapped, primary)
        );
        total = c.counted_pair + c.counted_unique;
    }

    info!("[Summary]");
    info!(
        "{} reads/pairs pass all filters and are counted ({:.2}%)",
        c.mapped,
        pc(c.mapped, total)
    );
    info!("{} reads/pairs are not mapped ({:.2}%)", c.unmapped, pc(c.unmapped, total));
    info!(
        "{} reads/pairs overlap several features [ambiguous] ({:.2}%)",
        c.ambiguous,
        pc(c.ambiguous, total)
    );
    info!(
        "{} reads/pairs overlap no feature [no feature] ({:.2}%)",
        c.no_feature,
        pc(c.no_feature, total)
    );
    info!(
        "{} reads/pairs have a too low mapping quality ({:.2}%)",
        c.too_low_qual,
        pc(c.too_low_qual, total)
    );
    if let Some(unknown) = unknown {
        info!(
            "{} reads without a listed barcode ({:.2}%)",
            unknown.total_reads,
            pc(unknown.total_reads, c.total_reads)
        );
    }

    if config.feature_mode == FeatureMode::Tag {
        if c.feature_tags_seen == 0 {
            warn!(
                "Tag-based counting was requested but no {} tag was found. Is this BAM gene-annotated?",
                String::from_utf8_lossy(&config.feature_tag)
            );
        }
        if config.collects_umis() && c.umi_tags_seen == 0 {
            warn!(
                "No {} or {} tag was found; the UMI matrices are not written",
                String::from_utf8_lossy(&config.umi_tag),
                String::from_utf8_lossy(&config.raw_umi_tag)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcount_lib::annotation::{Feature, FeatureIndex, Strand};
    use fastcount_lib::bam::ReferenceDictionary;
    use fastcount_lib::count::{encode_umi, BarcodeUniverse, ResultSet, UmiDedup};
    use fastcount_lib::engine::aggregate;
    use std::fs;
    use tempfile::tempdir;

    fn context(config: CountConfig) -> CountContext {
        let feature = |id: &str, start| Feature {
            id: id.to_string(),
            name: format!("{}_name", id),
            chrom: "chr1".to_string(),
            start,
            end: start + 100,
            strand: Strand::Forward,
        };
        CountContext::new(
            config,
            FeatureIndex::build(vec![feature("G1", 0), feature("G2", 500)]).unwrap(),
            BarcodeUniverse::from_pairs(vec![("AC".into(), "cell_a".into()), ("GT".into(), "cell_b".into())]),
            ReferenceDictionary::new(vec![("chr1", 1_000)]),
        )
        .unwrap()
    }

    fn report(ctx: &CountContext) -> CountReport {
        let mut set = ResultSet::new(ctx.barcodes.len());
        let a = set.entry(0, "AC", 2);
        a.counts = vec![4, 1];
        a.counters.mapped = 5;
        a.counters.no_feature = 2;
        a.counters.total_reads = 7;
        let unknown = set.entry(2, "Unknown", 2);
        unknown.counts = vec![0, 3];
        unknown.counters.mapped = 3;
        unknown.counters.unmapped = 1;
        unknown.counters.total_reads = 4;
        aggregate(vec![set], ctx).unwrap()
    }

    #[test]
    fn writes_counts_and_summary() {
        let ctx = context(CountConfig::default());
        let report = report(&ctx);
        let dir = tempdir().unwrap();
        let written = write_outputs(dir.path(), &report, &ctx).unwrap();
        assert_eq!(written.len(), 3);

        let counts = fs::read_to_string(dir.path().join("counts.tsv")).unwrap();
        assert_eq!(
            counts,
            "Gene_id\tcell_a\tcell_b\tUnknown\nG1\t4\t0\t0\nG2\t1\t0\t3\n"
        );

        let detailed = fs::read_to_string(dir.path().join("counts.detailed.tsv")).unwrap();
        let lines: Vec<_> = detailed.lines().collect();
        assert_eq!(lines.len(), 1 + 2 + DETAIL_ROWS.len());
        assert_eq!(lines[1], "G1\tG1_name\t4\t0\t0");
        assert_eq!(lines[3], "__no_feature\t__no_feature\t2\t0\t0");
        assert_eq!(lines[6], "__not_aligned\t__not_aligned\t0\t0\t1");

        let summary = fs::read_to_string(dir.path().join("summary.tsv")).unwrap();
        let lines: Vec<_> = summary.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("barcode\tsample\ttotal_reads\tmapped"));
        assert!(lines[1].starts_with("AC\tcell_a\t7\t5"));
        assert!(lines[2].starts_with("GT\tcell_b\t0\t0"));
        assert!(!dir.path().join("umis.tsv").exists());
    }

    #[test]
    fn writes_umi_matrices_when_umis_were_seen() {
        let config = CountConfig {
            feature_mode: FeatureMode::Tag,
            umi_dedup: UmiDedup::Exact,
            ..Default::default()
        };
        let ctx = context(config);
        let mut set = ResultSet::new(ctx.barcodes.len());
        let b = set.entry(1, "GT", 2);
        b.counts = vec![0, 3];
        b.counters.mapped = 3;
        b.counters.total_reads = 3;
        b.counters.umi_tags_seen = 3;
        let mut umis = fastcount_lib::count::UmiSets::new(2);
        umis.insert(1, encode_umi("ACGT").unwrap());
        umis.insert(1, encode_umi("ACGA").unwrap());
        umis.insert(1, encode_umi("ACGT").unwrap());
        b.umis = Some(umis);
        let report = aggregate(vec![set], &ctx).unwrap();

        let dir = tempdir().unwrap();
        let written = write_outputs(dir.path(), &report, &ctx).unwrap();
        assert_eq!(written.len(), 5);
        let umis = fs::read_to_string(dir.path().join("umis.tsv")).unwrap();
        assert_eq!(umis, "Gene_id\tcell_a\tcell_b\tUnknown\nG1\t0\t0\t0\nG2\t0\t2\t0\n");
    }

    #[test]
    fn percentages_handle_empty_runs() {
        assert_eq!(pc(3, 0), 0.0);
        assert!((pc(1, 4) - 25.0).abs() < 1e-9);
    }
}
