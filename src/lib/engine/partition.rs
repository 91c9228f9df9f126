//! Splitting a BAM file into byte-range chunks without an index.
//!
//! Chunk 0 starts right after the header. Chunk `i > 0` starts at the first
//! record that can be located from byte `i * S / N` of the compressed file;
//! that record is also where chunk `i - 1` stops.

use log::{debug, trace};
use noodles::{bam, bgzf};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::bam::bgzf::BGZF_EOF;
use crate::bam::record::read_name_lossy;
use crate::bam::{
    find_next_block_start, find_next_record_start, read_header, read_next, PushbackReader, ReadIdentity,
    ReferenceDictionary, ScanLimits,
};
use crate::core::error::Result;

type BlockStream = PushbackReader<bgzf::io::Reader<BufReader<File>>>;

/// Record reader over one file handle.
pub type BamStream = bam::io::Reader<BlockStream>;

/// One unit of work: an open stream positioned at the chunk's first record.
pub struct Chunk {
    pub index: usize,
    pub stream: BamStream,
    /// Already decoded first record, processed before reading further.
    pub first: Option<bam::Record>,
    /// Identity of the following chunk's first record; never processed by
    /// this one.
    pub stop_at: Option<ReadIdentity>,
}

/// Where a chunk resolved to: the BGZF block it starts in and the number of
/// decompressed bytes skipped inside that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedStart {
    block: u64,
    skipped: u64,
}

fn open_at(path: &Path, block_start: u64) -> Result<BlockStream> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(block_start))?;
    Ok(PushbackReader::new(bgzf::io::Reader::new(BufReader::new(file))))
}

/// Open the file at its beginning and consume the header.
pub fn open_after_header(path: &Path) -> Result<(BamStream, ReferenceDictionary)> {
    let mut stream = bam::io::Reader::from(open_at(path, 0)?);
    let references = read_header(&mut stream)?;
    Ok((stream, references))
}

/// Locate the first record at or after compressed byte `offset`.
///
/// Returns `None` when nothing but the end of the stream follows `offset`.
fn resolve_start(
    path: &Path,
    offset: u64,
    file_len: u64,
    references: &ReferenceDictionary,
    limits: &ScanLimits,
) -> Result<Option<(ResolvedStart, BamStream, bam::Record)>> {
    if offset + BGZF_EOF.len() as u64 >= file_len {
        trace!("Offset {} lies in the trailing EOF marker", offset);
        return Ok(None);
    }
    let mut file = File::open(path)?;
    let block = find_next_block_start(&mut file, offset)?;
    drop(file);

    let mut blocks = open_at(path, block)?;
    let Some(skipped) = find_next_record_start(&mut blocks, references, limits)? else {
        return Ok(None);
    };
    let mut stream = bam::io::Reader::from(blocks);
    let mut first = bam::Record::default();
    if !read_next(&mut stream, &mut first)? {
        return Ok(None);
    }
    trace!(
        "Offset {} resolved to block {} + {} bytes ({})",
        offset,
        block,
        skipped,
        read_name_lossy(&first)
    );
    Ok(Some((ResolvedStart { block, skipped }, stream, first)))
}

/// Split `path` into at most `n_chunks` chunks, each paired with the sentinel
/// record where it must stop.
pub fn plan_chunks(
    path: &Path,
    references: &ReferenceDictionary,
    limits: &ScanLimits,
    n_chunks: usize,
) -> Result<Vec<Chunk>> {
    let n_chunks = n_chunks.max(1);
    let file_len = std::fs::metadata(path)?.len();
    let (stream, _) = open_after_header(path)?;

    let mut chunks = vec![Chunk {
        index: 0,
        stream,
        first: None,
        stop_at: None,
    }];
    let mut previous: Option<ResolvedStart> = None;
    for i in 1..n_chunks {
        let offset = (i as u128 * file_len as u128 / n_chunks as u128) as u64;
        let Some((start, stream, first)) = resolve_start(path, offset, file_len, references, limits)? else {
            debug!("Chunk {} (offset {}) holds no records; dropped", i, offset);
            continue;
        };
        if previous == Some(start) {
            debug!("Chunk {} starts where the previous one does; merged", i);
            continue;
        }
        previous = Some(start);
        chunks.push(Chunk {
            index: chunks.len(),
            stream,
            first: Some(first),
            stop_at: None,
        });
    }

    for i in 1..chunks.len() {
        let sentinel = match &chunks[i].first {
            Some(first) => Some(ReadIdentity::of(first)?),
            None => None,
        };
        chunks[i - 1].stop_at = sentinel;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam::test_support::{bgzf_file, encode_bam_stream, TestRead};
    use crate::core::error::CountError;
    use tempfile::tempdir;

    fn dictionary() -> ReferenceDictionary {
        ReferenceDictionary::new(vec![("chr1", 100_000), ("chr2", 50_000)])
    }

    fn reads(n: usize) -> Vec<TestRead> {
        (0..n)
            .map(|i| TestRead::new(&format!("read{:05}", i)).at((i % 2) as i32, (i * 7) as i32))
            .collect()
    }

    #[test]
    fn chunks_follow_each_other() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small_blocks.bam");
        let payload = encode_bam_stream(&dictionary(), &reads(300));
        std::fs::write(&path, bgzf_file(&payload, 700)).unwrap();

        let chunks = plan_chunks(&path, &dictionary(), &ScanLimits::default(), 4).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks[0].first.is_none());
        for pair in chunks.windows(2) {
            let next = ReadIdentity::of(pair[1].first.as_ref().unwrap()).unwrap();
            assert_eq!(pair[0].stop_at.as_ref(), Some(&next));
        }
        assert!(chunks[3].stop_at.is_none());
        let names: Vec<_> = chunks[1..]
            .iter()
            .map(|c| ReadIdentity::of(c.first.as_ref().unwrap()).unwrap().name)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn more_chunks_than_blocks_collapse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one_block.bam");
        let payload = encode_bam_stream(&dictionary(), &reads(20));
        std::fs::write(&path, bgzf_file(&payload, 60_000)).unwrap();

        let chunks = plan_chunks(&path, &dictionary(), &ScanLimits::default(), 16).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].stop_at.is_none());
    }

    #[test]
    fn garbage_file_has_no_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.bam");
        let payload = encode_bam_stream(&dictionary(), &reads(5));
        let mut bytes = bgzf_file(&payload, 60_000);
        bytes.truncate(bytes.len() - BGZF_EOF.len());
        bytes.extend(std::iter::repeat(0x55u8).take(4096));
        std::fs::write(&path, bytes).unwrap();

        let file_len = std::fs::metadata(&path).unwrap().len();
        let err = match resolve_start(&path, file_len - 2048, file_len, &dictionary(), &ScanLimits::default()) {
            Err(err) => err,
            Ok(_) => panic!("expected NoBlockFound"),
        };
        assert!(matches!(err, CountError::NoBlockFound { offset } if offset == file_len - 2048));
    }
}
