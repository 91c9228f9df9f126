//! Exact UMI deduplication.
//!
//! UMIs are packed two bits per base (`A=0, C=1, G=2, T=3`; anything else is
//! folded onto `G`). Up to 16 bases fit a `u32` key, up to 32 a `u64` key.
//! Because packing is positional from the right, a 32-bit key widens to the
//! identical 64-bit value, so sets can be promoted without re-encoding.

use rustc_hash::FxHashSet;

use crate::core::error::{CountError, Result};

/// Packed UMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UmiKey {
    Short(u32),
    Long(u64),
}

#[inline]
fn base_code(base: u8) -> u64 {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'T' | b't' => 3,
        _ => 2,
    }
}

pub fn encode_umi(umi: &str) -> Result<UmiKey> {
    let bytes = umi.as_bytes();
    if bytes.len() > 32 {
        return Err(CountError::UmiTooLong(umi.to_string()));
    }
    let packed = bytes.iter().fold(0u64, |acc, &b| (acc << 2) | base_code(b));
    Ok(if bytes.len() <= 16 {
        UmiKey::Short(packed as u32)
    } else {
        UmiKey::Long(packed)
    })
}

/// Per-feature sets of distinct UMIs for one barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UmiSets {
    Short(Vec<FxHashSet<u32>>),
    Long(Vec<FxHashSet<u64>>),
}

impl UmiSets {
    pub fn new(n_features: usize) -> Self {
        UmiSets::Short(vec![FxHashSet::default(); n_features])
    }

    /// Number of features covered.
    pub fn len(&self) -> usize {
        match self {
            UmiSets::Short(sets) => sets.len(),
            UmiSets::Long(sets) => sets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_long(&self) -> bool {
        matches!(self, UmiSets::Long(_))
    }

    fn into_long(self) -> Vec<FxHashSet<u64>> {
        match self {
            UmiSets::Short(sets) => sets
                .into_iter()
                .map(|set| set.into_iter().map(u64::from).collect())
                .collect(),
            UmiSets::Long(sets) => sets,
        }
    }

    fn widen(&mut self) {
        if !self.is_long() {
            let short = std::mem::replace(self, UmiSets::Long(Vec::new()));
            *self = UmiSets::Long(short.into_long());
        }
    }

    pub fn insert(&mut self, slot: usize, key: UmiKey) {
        match key {
            UmiKey::Short(k) => match self {
                UmiSets::Short(sets) => {
                    sets[slot].insert(k);
                }
                UmiSets::Long(sets) => {
                    sets[slot].insert(u64::from(k));
                }
            },
            UmiKey::Long(k) => {
                self.widen();
                if let UmiSets::Long(sets) = self {
                    sets[slot].insert(k);
                }
            }
        }
    }

    /// Distinct UMIs seen for a feature.
    pub fn distinct(&self, slot: usize) -> usize {
        match self {
            UmiSets::Short(sets) => sets[slot].len(),
            UmiSets::Long(sets) => sets[slot].len(),
        }
    }

    /// Union `other` into `self`, feature by feature.
    pub fn merge(&mut self, barcode: &str, other: UmiSets) -> Result<()> {
        if self.len() != other.len() {
            return Err(CountError::UmiShapeMismatch {
                barcode: barcode.to_string(),
                expected: self.len(),
                actual: other.len(),
            });
        }
        let mine = std::mem::replace(self, UmiSets::Long(Vec::new()));
        *self = match (mine, other) {
            (UmiSets::Short(mut mine), UmiSets::Short(theirs)) => {
                for (a, b) in mine.iter_mut().zip(theirs) {
                    a.extend(b);
                }
                UmiSets::Short(mine)
            }
            (mine, theirs) => {
                let mut mine = mine.into_long();
                for (a, b) in mine.iter_mut().zip(theirs.into_long()) {
                    a.extend(b);
                }
                UmiSets::Long(mine)
            }
        };
        Ok(())
    }
}
