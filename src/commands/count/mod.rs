mod args;
mod writer;

use anyhow::{Context, Result};
use fastcount_lib::annotation::{load_bed, load_gtf, load_vcf, FeatureIndex};
use fastcount_lib::core::prelude::inner_extension;
use fastcount_lib::count::{BarcodeUniverse, CountContext};
use fastcount_lib::engine::ParallelReader;
use log::{info, warn};
use std::time::Instant;

use crate::commands::common;

pub use args::{AnnotationSource, CountArgs, CountSettings};

fn load_annotation(source: &AnnotationSource) -> Result<FeatureIndex> {
    let expected = match source {
        AnnotationSource::Gtf(_) => "gtf",
        AnnotationSource::Bed(_) => "bed",
        AnnotationSource::Vcf(_) => "vcf",
    };
    if inner_extension(source.path()).as_deref() != Some(expected) {
        warn!(
            "{} does not end in .{} or .{}.gz; reading it as {} anyway",
            source.path().display(),
            expected,
            expected,
            expected.to_uppercase()
        );
    }
    let features = match source {
        AnnotationSource::Gtf(path) => load_gtf(path)?,
        AnnotationSource::Bed(path) => load_bed(path)?,
        AnnotationSource::Vcf(path) => load_vcf(path)?,
    };
    info!(
        "{} features loaded from {}",
        features.len(),
        source.path().display()
    );
    Ok(features)
}

/// Execute the `count` command end-to-end.
pub fn run_count(args: CountArgs) -> Result<()> {
    let settings = CountSettings::try_from(args)?;
    let start = Instant::now();
    let config = &settings.config;
    info!("Running fastcount count on {:?}", settings.bam);
    info!(
        "threads={} paired={} min_mapq={} stranded={} mode={:?} umi_dedup={} multiple_mapped={}",
        config.threads,
        config.paired,
        config.min_mapq,
        config.strand_mode,
        config.feature_mode,
        config.umi_dedup,
        config.keep_multi_mapped
    );
    common::configure_global_thread_pool(config.threads)?;

    let features = load_annotation(&settings.annotation)?;
    let barcodes = match &settings.barcode_file {
        Some(path) => BarcodeUniverse::from_file(path)?,
        None => BarcodeUniverse::unknown_only(),
    };
    let reader = ParallelReader::open(&settings.bam)
        .with_context(|| format!("Failed to open {}", settings.bam.display()))?;
    common::warn_on_unmatched_contigs(reader.references(), &features);

    let ctx = CountContext::new(
        settings.config.clone(),
        features,
        barcodes,
        reader.references().clone(),
    )?;
    let read_start = Instant::now();
    let report = reader
        .count(&ctx)
        .with_context(|| format!("Failed to count reads of {}", settings.bam.display()))?;
    info!("BAM reading done in {:.1?}", read_start.elapsed());

    let unknown = if ctx.barcodes.is_demultiplexed() {
        report.results.last().map(|r| &r.counters)
    } else {
        None
    };
    writer::log_summary(&report.summary, unknown, &ctx.config);
    writer::write_outputs(&settings.output_dir, &report, &ctx)?;
    info!("fastcount done in {:.1?}", start.elapsed());
    Ok(())
}
