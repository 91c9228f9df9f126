use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::aggregate::{aggregate, CountReport};
use super::partition::{open_after_header, plan_chunks};
use super::worker::{run_chunk, WorkerProgress};
use crate::bam::ReferenceDictionary;
use crate::count::{CountContext, ResultSet};
use crate::core::error::{CountError, Result};

/// Upper bound on how long the supervisor sleeps between checks.
const POLL_STEP: Duration = Duration::from_millis(50);

/// Index-free parallel reader over one BAM file.
///
/// The header is read once at [`ParallelReader::open`]; [`ParallelReader::run`]
/// then partitions the file, starts one thread per chunk and watches them from
/// the calling thread.
#[derive(Debug, Clone)]
pub struct ParallelReader {
    path: PathBuf,
    references: ReferenceDictionary,
}

impl ParallelReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (_, references) = open_after_header(&path)?;
        info!(
            "Opened {} ({} reference sequences)",
            path.display(),
            references.len()
        );
        Ok(Self { path, references })
    }

    pub fn references(&self) -> &ReferenceDictionary {
        &self.references
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tally every record of the file into one partial result set per chunk.
    pub fn run(&self, ctx: &CountContext) -> Result<Vec<ResultSet>> {
        let config = &ctx.config;
        let chunks = plan_chunks(&self.path, &self.references, &config.limits, config.threads)?;
        info!(
            "Reading {} with {} chunk(s) ({} requested)",
            self.path.display(),
            chunks.len(),
            config.threads
        );

        let progress: Vec<WorkerProgress> = chunks.iter().map(|_| WorkerProgress::default()).collect();
        let cancel = AtomicBool::new(false);
        let interval = config.progress_interval;

        thread::scope(|scope| -> Result<Vec<ResultSet>> {
            let mut handles = Vec::with_capacity(chunks.len());
            for (chunk, progress) in chunks.into_iter().zip(&progress) {
                let cancel = &cancel;
                let index = chunk.index;
                let handle = thread::Builder::new()
                    .name(format!("chunk-{}", index))
                    .spawn_scoped(scope, move || {
                        let result = run_chunk(ctx, chunk, progress, cancel);
                        if let Err(e) = &result {
                            error!("Chunk {} failed: {}", index, e);
                            cancel.store(true, Ordering::Relaxed);
                        }
                        result
                    })?;
                handles.push(handle);
            }

            let started = Instant::now();
            let mut last_report = Instant::now();
            while !handles.iter().all(|h| h.is_finished()) {
                thread::sleep(interval.min(POLL_STEP));
                if last_report.elapsed() >= interval {
                    let reads: u64 = progress.iter().map(WorkerProgress::reads).sum();
                    let done = progress.iter().filter(|p| p.is_finished()).count();
                    info!(
                        "{} reads processed, {}/{} chunks finished",
                        reads,
                        done,
                        progress.len()
                    );
                    last_report = Instant::now();
                }
            }

            let mut sets = Vec::with_capacity(handles.len());
            let mut first_error = None;
            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(set)) => sets.push(set),
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(CountError::WorkerPanic(index));
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            let reads: u64 = progress.iter().map(WorkerProgress::reads).sum();
            debug!("{} reads read in {:.1?}", reads, started.elapsed());
            Ok(sets)
        })
    }

    /// Read, tally and merge: the whole counting pipeline for one file.
    pub fn count(&self, ctx: &CountContext) -> Result<CountReport> {
        let sets = self.run(ctx)?;
        aggregate(sets, ctx)
    }
}
