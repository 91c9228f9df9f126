//! Run configuration shared by every worker.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::annotation::StrandMode;
use crate::bam::ScanLimits;
use crate::core::error::{CountError, Result};

/// How a read is tied to a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureMode {
    /// Overlap of the aligned blocks with annotated intervals.
    #[default]
    Position,
    /// Feature identifier carried by a BAM tag (e.g. `GX`).
    Tag,
}

/// UMI deduplication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UmiDedup {
    #[default]
    None,
    Exact,
}

impl FromStr for UmiDedup {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(UmiDedup::None),
            "exact" => Ok(UmiDedup::Exact),
            other => Err(format!(
                "unknown UMI deduplication '{}', expected none or exact",
                other
            )),
        }
    }
}

impl fmt::Display for UmiDedup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UmiDedup::None => "none",
            UmiDedup::Exact => "exact",
        })
    }
}

/// Parse a two-character SAM tag name.
pub fn parse_tag(tag: &str) -> Result<[u8; 2]> {
    match tag.as_bytes() {
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphanumeric() => Ok([*a, *b]),
        _ => Err(CountError::Config(format!(
            "'{}' is not a valid two-character BAM tag",
            tag
        ))),
    }
}

/// Configuration for a counting run.
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub threads: usize,
    pub paired: bool,
    pub min_mapq: u8,
    pub feature_mode: FeatureMode,
    pub umi_dedup: UmiDedup,
    pub strand_mode: StrandMode,
    pub keep_multi_mapped: bool,
    pub barcode_tag: [u8; 2],
    pub feature_tag: [u8; 2],
    pub umi_tag: [u8; 2],
    pub raw_umi_tag: [u8; 2],
    pub limits: ScanLimits,
    pub progress_interval: Duration,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            paired: false,
            min_mapq: 10,
            feature_mode: FeatureMode::Position,
            umi_dedup: UmiDedup::None,
            strand_mode: StrandMode::None,
            keep_multi_mapped: false,
            barcode_tag: *b"CB",
            feature_tag: *b"GX",
            umi_tag: *b"UB",
            raw_umi_tag: *b"UR",
            limits: ScanLimits::default(),
            progress_interval: Duration::from_secs(1),
        }
    }
}

impl CountConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(CountError::Config("at least one thread is required".into()));
        }
        if self.umi_dedup == UmiDedup::Exact && self.feature_mode != FeatureMode::Tag {
            return Err(CountError::Config(
                "UMI deduplication requires tag-based feature assignment".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn collects_umis(&self) -> bool {
        self.umi_dedup == UmiDedup::Exact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_must_be_two_characters() {
        assert_eq!(parse_tag("CB").unwrap(), *b"CB");
        assert_eq!(parse_tag("X0").unwrap(), *b"X0");
        assert!(parse_tag("C").is_err());
        assert!(parse_tag("CBX").is_err());
        assert!(parse_tag("1B").is_err());
    }

    #[test]
    fn umi_dedup_needs_tag_mode() {
        let mut config = CountConfig {
            umi_dedup: UmiDedup::Exact,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.feature_mode = FeatureMode::Tag;
        assert!(config.validate().is_ok());
        config.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_dedup_policy() {
        assert_eq!("exact".parse::<UmiDedup>().unwrap(), UmiDedup::Exact);
        assert_eq!("None".parse::<UmiDedup>().unwrap(), UmiDedup::None);
        assert!("cluster".parse::<UmiDedup>().is_err());
    }
}
