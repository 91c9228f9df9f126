//! GTF loader: exons become intervals labelled with their `gene_id`.

use anyhow::{anyhow, Context, Result};
use bio::io::gff::{self, GffType};
use log::{info, warn};
use rustc_hash::FxHashSet;
use std::convert::TryInto;
use std::path::Path;

use super::{Feature, FeatureIndex, Strand};
use crate::core::io::open_text;

struct GtfEntry {
    is_gene: bool,
    start: u32,
    end: u32,
    strand: Strand,
    gene_id: String,
    gene_name: Option<String>,
}

/// Pull the fields the counter uses out of an exon or gene record; other
/// feature types yield `None`.
fn entry(record: &gff::Record) -> Result<Option<GtfEntry>> {
    let is_gene = match record.feature_type() {
        "gene" => true,
        "exon" => false,
        _ => return Ok(None),
    };
    let start: u32 = (*record.start())
        .try_into()
        .map_err(|_| anyhow!("start {} is out of range", record.start()))?;
    let end: u32 = (*record.end())
        .try_into()
        .map_err(|_| anyhow!("end {} is out of range", record.end()))?;
    if start == 0 || end < start {
        return Err(anyhow!("invalid interval {}-{}", start, end));
    }
    let attributes = record.attributes();
    let gene_id = attributes
        .get("gene_id")
        .cloned()
        .ok_or_else(|| anyhow!("missing gene_id attribute"))?;

    Ok(Some(GtfEntry {
        is_gene,
        start: start - 1,
        end,
        strand: match record.strand() {
            Some(strand) if strand.strand_symbol() == "+" => Strand::Forward,
            _ => Strand::Reverse,
        },
        gene_id,
        gene_name: attributes.get("gene_name").cloned(),
    }))
}

/// Load a GTF (optionally gzipped).
///
/// `gene` lines fix the feature order and display names; when a file has none,
/// genes are collected from exon `gene_id`s in first-seen order.
pub fn load_gtf<P: AsRef<Path>>(path: P) -> Result<FeatureIndex> {
    let path = path.as_ref();
    info!("Reading GTF file {}", path.display());
    let mut reader = gff::Reader::new(open_text(path)?, GffType::GTF2);

    let mut catalog = Vec::new();
    let mut features = Vec::new();
    let mut exon_genes = FxHashSet::default();
    for (i, record) in reader.records().enumerate() {
        let parsed = record
            .map_err(|e| anyhow!(e))
            .and_then(|record| Ok(entry(&record)?.map(|entry| (record.seqname().to_string(), entry))))
            .with_context(|| format!("{}: malformed GTF record {}", path.display(), i + 1))?;
        let Some((chrom, entry)) = parsed else {
            continue;
        };
        let name = entry.gene_name.unwrap_or_else(|| entry.gene_id.clone());
        if entry.is_gene {
            catalog.push((entry.gene_id, name));
        } else {
            exon_genes.insert(entry.gene_id.clone());
            features.push(Feature {
                id: entry.gene_id,
                name,
                chrom,
                start: entry.start,
                end: entry.end,
                strand: entry.strand,
            });
        }
    }

    if catalog.is_empty() {
        warn!("No 'gene' lines in {}; collapsing exons to their gene_id", path.display());
    }
    info!(
        "{} exons annotate {} genes; {} 'gene' lines found",
        features.len(),
        exon_genes.len(),
        catalog.len()
    );
    FeatureIndex::with_catalog(catalog, features).map_err(Into::into)
}
