//! Index-free access to BAM files: BGZF block validation, the reference
//! dictionary, record field helpers over noodles, and the heuristics used to
//! find block and record boundaries from an arbitrary byte offset.

pub mod bgzf;
pub mod header;
pub mod locator;
pub mod pushback;
pub mod record;

#[cfg(test)]
pub(crate) mod test_support;

pub use header::{read_header, Contig, ReferenceDictionary};
pub use locator::{find_next_block_start, find_next_record_start, ScanLimits};
pub use pushback::PushbackReader;
pub use record::{read_next, ReadIdentity};
