//! Parallel, index-free counting over one BAM file.
//!
//! [`partition`] cuts the compressed file into chunks delimited by sentinel
//! records, [`worker`] tallies one chunk on its own thread, [`reader`] runs and
//! supervises the workers, and [`aggregate`] folds their partial results.

pub mod aggregate;
pub mod partition;
pub mod reader;
pub mod worker;

pub use aggregate::{aggregate, merge_result_sets, CountReport};
pub use partition::{plan_chunks, BamStream, Chunk};
pub use reader::ParallelReader;
pub use worker::{run_chunk, WorkerProgress};
