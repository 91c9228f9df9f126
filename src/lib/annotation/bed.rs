//! BED loader: one feature per distinct `chrom:start:end`.

use anyhow::{anyhow, Context, Result};
use bio::io::bed;
use log::{info, warn};
use rustc_hash::FxHashSet;
use std::convert::TryInto;
use std::io::BufRead;
use std::path::Path;

use super::{Feature, FeatureIndex, Strand};
use crate::core::io::open_text;

/// Strand column of a BED record: only `+` (or no column at all) is forward.
fn bed_strand(record: &bed::Record) -> Strand {
    match record.aux(2) {
        None | Some("+") => Strand::Forward,
        Some(_) => Strand::Reverse,
    }
}

/// Read the file with `browser`/`track` lines and blank lines removed; the
/// BED record reader only knows about `#` comments.
fn body_lines(path: &Path) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for line in open_text(path)?.lines() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.starts_with("browser") || line.starts_with("track") || line.trim().is_empty() {
            continue;
        }
        body.extend_from_slice(line.as_bytes());
        body.push(b'\n');
    }
    Ok(body)
}

pub fn load_bed<P: AsRef<Path>>(path: P) -> Result<FeatureIndex> {
    let path = path.as_ref();
    info!("Reading BED file {}", path.display());
    let body = body_lines(path)?;
    let mut reader = bed::Reader::new(&body[..]);

    let mut seen = FxHashSet::default();
    let mut features = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: BED record {} is invalid", path.display(), i + 1))?;
        let start: u32 = record
            .start()
            .try_into()
            .with_context(|| format!("{}: BED record {} start is out of range", path.display(), i + 1))?;
        let end: u32 = record
            .end()
            .try_into()
            .with_context(|| format!("{}: BED record {} end is out of range", path.display(), i + 1))?;
        if end < start {
            return Err(anyhow!("{}: BED record {} is invalid: end < start", path.display(), i + 1));
        }

        let id = format!("{}:{}:{}", record.chrom(), start, end);
        if !seen.insert(id.clone()) {
            warn!("{} appears again at record {}; extra occurrences are ignored", id, i + 1);
            continue;
        }
        features.push(Feature {
            id,
            name: record.name().unwrap_or_default().to_string(),
            chrom: record.chrom().to_string(),
            start,
            end,
            strand: bed_strand(&record),
        });
    }

    info!("{} features found in the BED file", features.len());
    FeatureIndex::build(features).map_err(Into::into)
}
