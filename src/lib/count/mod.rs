//! Read classification and per-barcode aggregation.

pub mod barcode;
pub mod classifier;
pub mod config;
pub mod result;
pub mod tally;
pub mod umi;

use crate::annotation::FeatureIndex;
use crate::bam::ReferenceDictionary;
use crate::core::error::Result;

pub use barcode::{BarcodeUniverse, UNKNOWN_BARCODE};
pub use classifier::{AlignedRead, ClassifyContext, Outcome, PendingMate, Strategy};
pub use config::{parse_tag, CountConfig, FeatureMode, UmiDedup};
pub use result::{BarcodeResult, Counters, GlobalSummary, ResultSet};
pub use tally::ChunkTally;
pub use umi::{encode_umi, UmiKey, UmiSets};

/// Everything a worker reads but never modifies.
pub struct CountContext {
    pub config: CountConfig,
    pub features: FeatureIndex,
    pub barcodes: BarcodeUniverse,
    pub references: ReferenceDictionary,
    strategy: Strategy,
}

impl CountContext {
    pub fn new(
        config: CountConfig,
        features: FeatureIndex,
        barcodes: BarcodeUniverse,
        references: ReferenceDictionary,
    ) -> Result<Self> {
        config.validate()?;
        let strategy = Strategy::for_mode(config.feature_mode);
        Ok(Self {
            config,
            features,
            barcodes,
            references,
            strategy,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn classify_context(&self) -> ClassifyContext<'_> {
        ClassifyContext {
            features: &self.features,
            references: &self.references,
            strand_mode: self.config.strand_mode,
            paired: self.config.paired,
        }
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }
}
