//! Error types for the fastcount library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no BGZF block found at or after byte offset {offset}")]
    NoBlockFound { offset: u64 },

    #[error("invalid BAM data: {0}")]
    InvalidBam(String),

    #[error("barcode {0:?} is not part of the barcode list")]
    UnknownBarcode(String),

    #[error("feature {0:?} found in BAM tag is not present in the annotation")]
    UnknownFeature(String),

    #[error("count vectors differ in length for barcode {barcode}: expected {expected}, got {actual}")]
    CountLengthMismatch {
        barcode: String,
        expected: usize,
        actual: usize,
    },

    #[error("UMI sets differ in shape for barcode {barcode}: expected {expected}, got {actual}")]
    UmiShapeMismatch {
        barcode: String,
        expected: usize,
        actual: usize,
    },

    #[error("result sets cover {actual} barcodes, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("barcodes do not match while merging results: {left} vs {right}")]
    BarcodeMismatch { left: String, right: String },

    #[error("UMI {0:?} is longer than 32 bases")]
    UmiTooLong(String),

    #[error("read {0} is not flagged as paired although paired-end mode is enabled")]
    NotPaired(String),

    #[error("annotation contains no features")]
    EmptyAnnotation,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("worker thread for chunk {0} panicked")]
    WorkerPanic(usize),
}

pub type Result<T> = std::result::Result<T, CountError>;
