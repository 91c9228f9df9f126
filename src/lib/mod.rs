//! fastcount: index-free parallel read counting
//!
//! fastcount assigns the alignments of a BAM file to genomic features and
//! aggregates them into per-barcode, per-feature count matrices. The library
//! provides:
//! 1. Index-free access to BAM files, including locating record boundaries from
//!    an arbitrary byte offset
//! 2. Feature annotations (GTF, BED, VCF) indexed by interval trees
//! 3. Read classification under strandedness, pairing, multi-mapping, quality
//!    and UMI rules
//! 4. Parallel chunked reading and merging of partial results
//!
//! # Modules
//!
//! - [`bam`]: BGZF blocks, the binary header, alignment records and boundary search
//! - [`annotation`]: feature loaders and the interval index
//! - [`count`]: classification strategies and per-barcode accumulation
//! - [`engine`]: chunk planning, workers and aggregation
//! - [`core`]: errors, I/O helpers and thread-count handling

pub mod annotation;
pub mod bam;
pub mod core;
pub mod count;
pub mod engine;
