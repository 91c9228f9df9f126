//! VCF loader: single-nucleotide variants become 1-bp features.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use rust_htslib::bcf::{self, Read as _};
use std::convert::TryInto;
use std::path::Path;

use super::{Feature, FeatureIndex, Strand};

/// Comma-separated allele list with only A/C/G/T/N/. and no duplicates.
fn alleles_well_formed(alleles: &str) -> bool {
    let mut seen = Vec::new();
    for allele in alleles.split(',') {
        if allele.is_empty()
            || seen.contains(&allele)
            || !allele
                .bytes()
                .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N' | b'.'))
        {
            return false;
        }
        seen.push(allele);
    }
    true
}

pub fn load_vcf<P: AsRef<Path>>(path: P) -> Result<FeatureIndex> {
    let path = path.as_ref();
    info!("Reading VCF file {}", path.display());
    let mut reader = bcf::Reader::from_path(path)
        .map_err(|e| anyhow!("Error opening VCF file '{}': {}", path.display(), e))?;

    let mut features = Vec::new();
    let mut variants = 0usize;
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: VCF record {} is invalid", path.display(), i + 1))?;
        variants += 1;
        let alleles = record.alleles();
        let Some((reference, alternates)) = alleles.split_first() else {
            warn!("[IGNORED] VCF record {} has no alleles", i + 1);
            continue;
        };
        let reference = String::from_utf8_lossy(reference);
        let alt = if alternates.is_empty() {
            ".".to_string()
        } else {
            alternates
                .iter()
                .map(|a| String::from_utf8_lossy(a))
                .collect::<Vec<_>>()
                .join(",")
        };
        if !alleles_well_formed(&reference) || !alleles_well_formed(&alt) {
            warn!("[IGNORED] malformed alleles at VCF record {}", i + 1);
            continue;
        }
        if reference.len() != 1 || alt.len() != 1 {
            continue;
        }

        let rid = record
            .rid()
            .ok_or_else(|| anyhow!("{}: VCF record {} has no CHROM", path.display(), i + 1))?;
        let chrom = record
            .header()
            .rid2name(rid)
            .map_err(|e| anyhow!("Error getting record RID name: {}", e))?;
        let chrom = String::from_utf8_lossy(chrom).into_owned();
        let start: u32 = record
            .pos()
            .try_into()
            .map_err(|_| anyhow!("{}: VCF record {} has a negative position", path.display(), i + 1))?;
        features.push(Feature {
            id: format!("{}:{}", chrom, start + 1),
            name: String::from_utf8_lossy(&record.id()).into_owned(),
            chrom,
            start,
            end: start + 1,
            strand: Strand::Forward,
        });
    }

    info!(
        "{} of {} variants are SNPs and will be counted",
        features.len(),
        variants
    );
    FeatureIndex::build(features).map_err(Into::into)
}
