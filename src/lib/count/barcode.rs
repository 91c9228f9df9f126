//! Closed barcode universe for demultiplexing.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::error::CountError;
use crate::core::io::get_reader;

/// Barcode collecting every read without a usable barcode tag.
pub const UNKNOWN_BARCODE: &str = "Unknown";

/// Ordered set of accepted barcodes, always ending with [`UNKNOWN_BARCODE`].
#[derive(Debug, Clone)]
pub struct BarcodeUniverse {
    ordered_barcodes: Arc<Vec<String>>,
    sample_names: Arc<Vec<String>>,
    barcode_to_id: Arc<FxHashMap<String, u32>>,
    demultiplexed: bool,
}

impl BarcodeUniverse {
    /// Universe for runs without demultiplexing: every read is `Unknown`.
    pub fn unknown_only() -> Self {
        Self::build(Vec::new(), false)
    }

    /// Load a tab-separated barcode file: `barcode[<TAB>sample name]` per line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = get_reader(&Some(path), false)?;
        let mut entries = Vec::new();
        let mut barcode_len = None;
        for (i, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
            if record.len() > 2 {
                return Err(anyhow!(
                    "{}: line {} has {} columns, expected barcode and an optional sample name",
                    path.display(),
                    i + 1,
                    record.len()
                ));
            }
            let barcode = record.get(0).unwrap_or("").trim();
            if barcode.is_empty() {
                continue;
            }
            match barcode_len {
                None => barcode_len = Some(barcode.len()),
                Some(len) if len != barcode.len() => {
                    return Err(anyhow!(
                        "{}: barcode {} does not have the same length as the previous ones ({})",
                        path.display(),
                        barcode,
                        len
                    ))
                }
                _ => {}
            }
            let name = record
                .get(1)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(barcode);
            entries.push((barcode.to_string(), name.to_string()));
        }
        if entries.is_empty() {
            return Err(anyhow!("{} contains no barcodes", path.display()));
        }

        let universe = Self::build(entries, true);
        info!(
            "{} barcodes loaded from {} ({} with '{}')",
            universe.len() - 1,
            path.display(),
            universe.len(),
            UNKNOWN_BARCODE
        );
        Ok(universe)
    }

    /// Construct from `(barcode, sample name)` pairs, preserving order.
    pub fn from_pairs(entries: Vec<(String, String)>) -> Self {
        Self::build(entries, true)
    }

    fn build(entries: Vec<(String, String)>, demultiplexed: bool) -> Self {
        let mut ordered = Vec::with_capacity(entries.len() + 1);
        let mut names = Vec::with_capacity(entries.len() + 1);
        let mut index = FxHashMap::with_capacity_and_hasher(entries.len() + 1, Default::default());
        for (barcode, name) in entries
            .into_iter()
            .chain(std::iter::once((UNKNOWN_BARCODE.to_string(), UNKNOWN_BARCODE.to_string())))
        {
            if index.contains_key(&barcode) {
                if barcode != UNKNOWN_BARCODE {
                    warn!("Barcode {} is listed more than once; keeping the first entry", barcode);
                }
                continue;
            }
            index.insert(barcode.clone(), ordered.len() as u32);
            ordered.push(barcode);
            names.push(name);
        }
        BarcodeUniverse {
            ordered_barcodes: Arc::new(ordered),
            sample_names: Arc::new(names),
            barcode_to_id: Arc::new(index),
            demultiplexed,
        }
    }

    /// Whether reads are split by their barcode tag.
    pub fn is_demultiplexed(&self) -> bool {
        self.demultiplexed
    }

    /// Map a barcode tag value to its id; absent tags and `-` map to `Unknown`.
    pub fn resolve(&self, tag: Option<&str>) -> crate::core::error::Result<u32> {
        match tag {
            None | Some("-") | Some("") => Ok(self.unknown_id()),
            Some(barcode) => self
                .id_of(barcode)
                .ok_or_else(|| CountError::UnknownBarcode(barcode.to_string())),
        }
    }

    /// Lookup the numeric identifier for a barcode if present.
    #[inline]
    pub fn id_of(&self, barcode: &str) -> Option<u32> {
        self.barcode_to_id.get(barcode).copied()
    }

    #[inline]
    pub fn unknown_id(&self) -> u32 {
        // the sentinel is always present
        self.barcode_to_id
            .get(UNKNOWN_BARCODE)
            .copied()
            .unwrap_or(self.ordered_barcodes.len() as u32 - 1)
    }

    /// Retrieve a barcode string by numeric identifier.
    #[inline]
    pub fn barcode_by_id(&self, id: u32) -> Option<&str> {
        self.ordered_barcodes.get(id as usize).map(|s| s.as_str())
    }

    /// Display name used as the matrix column header.
    #[inline]
    pub fn sample_name(&self, id: u32) -> Option<&str> {
        self.sample_names.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ordered_barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_barcodes.is_empty()
    }

    /// Borrow the ordered barcodes without cloning.
    pub fn ordered_barcodes(&self) -> &[String] {
        self.ordered_barcodes.as_ref()
    }
}
