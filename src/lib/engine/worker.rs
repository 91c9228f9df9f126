//! The per-chunk read loop.

use log::{debug, warn};
use noodles::bam;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::partition::Chunk;
use crate::bam::read_next;
use crate::count::{ChunkTally, CountContext, ResultSet};
use crate::core::error::Result;

/// Records between two publications of the progress counter and two checks
/// of the cancel flag.
const CHECK_INTERVAL: u64 = 1024;

/// Live counters of one worker, read by the supervisor.
#[derive(Debug, Default)]
pub struct WorkerProgress {
    reads: AtomicU64,
    finished: AtomicBool,
}

impl WorkerProgress {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Decode and tally every record of `chunk` up to its sentinel.
pub fn run_chunk(
    ctx: &CountContext,
    chunk: Chunk,
    progress: &WorkerProgress,
    cancel: &AtomicBool,
) -> Result<ResultSet> {
    let Chunk {
        index,
        mut stream,
        first,
        stop_at,
    } = chunk;
    let mut tally = ChunkTally::new(ctx);
    let (mut record, mut pending_first) = match first {
        Some(record) => (record, true),
        None => (bam::Record::default(), false),
    };
    let mut seen = 0u64;

    loop {
        if !std::mem::take(&mut pending_first) && !read_next(&mut stream, &mut record)? {
            if let Some(sentinel) = &stop_at {
                warn!(
                    "Chunk {} reached the end of the file without meeting {}; \
                     records after it may be counted twice",
                    index,
                    sentinel.name_lossy()
                );
            }
            break;
        }
        if let Some(sentinel) = &stop_at {
            if sentinel.matches(&record)? {
                break;
            }
        }
        tally.process(&record)?;
        seen += 1;
        if seen % CHECK_INTERVAL == 0 {
            progress.reads.store(seen, Ordering::Relaxed);
            if cancel.load(Ordering::Relaxed) {
                debug!("Chunk {} abandoned after {} reads", index, seen);
                break;
            }
        }
    }

    progress.reads.store(seen, Ordering::Relaxed);
    progress.finished.store(true, Ordering::Relaxed);
    debug!(
        "Chunk {} done: {} reads, {} mates left unpaired",
        index,
        seen,
        tally.pending_mates()
    );
    Ok(tally.finish())
}
