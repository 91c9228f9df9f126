use anyhow::{anyhow, Result};
use fastcount_lib::annotation::FeatureIndex;
use fastcount_lib::bam::ReferenceDictionary;
use fastcount_lib::core::prelude::determine_allowed_cpus;
use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;

static GLOBAL_RAYON_THREADS: OnceCell<usize> = OnceCell::new();

/// Configure the global Rayon pool (used for result merging) exactly once,
/// returning the active worker count.
pub fn configure_global_thread_pool(threads: usize) -> Result<usize> {
    let requested = determine_allowed_cpus(threads)?;

    if let Some(active) = GLOBAL_RAYON_THREADS.get() {
        if *active != requested {
            log::warn!(
                "Rayon global thread pool already initialised with {} threads; ignoring request for {}",
                active,
                requested
            );
        }
        return Ok(*active);
    }

    match ThreadPoolBuilder::new().num_threads(requested).build_global() {
        Ok(_) => {
            GLOBAL_RAYON_THREADS
                .set(requested)
                .map_err(|_| anyhow!("Failed to record global Rayon thread count"))?;
            Ok(requested)
        }
        Err(err) => {
            log::debug!("Global Rayon thread pool initialisation skipped: {}", err);
            let fallback = rayon::current_num_threads();
            GLOBAL_RAYON_THREADS.set(fallback).ok();
            Ok(fallback)
        }
    }
}

/// Chromosome names must match exactly between the BAM and the annotation;
/// warn about annotation chromosomes the BAM does not know.
pub fn warn_on_unmatched_contigs(references: &ReferenceDictionary, features: &FeatureIndex) -> usize {
    let mut missing: Vec<&str> = features
        .chromosomes()
        .filter(|chrom| references.id_of(chrom).is_none())
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        let total = features.chromosomes().count();
        if missing.len() == total {
            log::warn!(
                "None of the {} annotated chromosomes appear in the BAM header (e.g. {}); position-based counts will be empty",
                total,
                missing[0]
            );
        } else {
            log::warn!(
                "{} annotated chromosome(s) are absent from the BAM header: {}",
                missing.len(),
                missing.join(", ")
            );
        }
    }
    missing.len()
}
