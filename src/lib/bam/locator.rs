//! Boundary discovery from arbitrary byte offsets.
//!
//! BAM files carry no record index of their own, so a worker that starts in
//! the middle of a file has to re-synchronise twice: first on a BGZF block
//! (compressed coordinates), then on an alignment record inside the
//! decompressed stream. Both searches advance one byte at a time and accept a
//! position only when several independent structural checks agree.
//!
//! The record search is a heuristic. Binary content could satisfy every check
//! without being a true record start; the checks are chosen so that this is
//! vanishingly rare on real data.

use log::trace;
use noodles::bam;
use noodles::sam::alignment::record::Flags;
use std::io::{BufRead, Read, Seek, SeekFrom};

use super::bgzf::{inflate_block, parse_block_header, read_full, BGZF_HEADER_SIZE};
use super::header::ReferenceDictionary;
use super::pushback::PushbackReader;
use super::record::{fields_decode, read_name};
use crate::core::error::{CountError, Result};

/// `block_size` plus the 32-byte fixed part of a record.
pub const FIXED_HEADER_LEN: usize = 36;

/// Smallest plausible `block_size`: fixed fields plus a one-character name.
pub const MIN_BLOCK_SIZE: usize = 34;

/// Default upper bound on `block_size` accepted by the record search.
pub const DEFAULT_MAX_RECORD_LEN: usize = 100_000;

const SCAN_WINDOW: usize = 256 * 1024;

/// Bounds applied while searching for a record start.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    pub max_record_len: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

#[inline]
fn le_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Find the file offset of the first valid BGZF block at or after `offset`.
pub fn find_next_block_start<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<u64> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    let mut window = Vec::with_capacity(SCAN_WINDOW);
    let mut block = Vec::new();
    let mut scratch = Vec::new();
    let mut window_start = offset;

    while window_start < file_len {
        reader.seek(SeekFrom::Start(window_start))?;
        window.clear();
        (&mut *reader)
            .take(SCAN_WINDOW as u64)
            .read_to_end(&mut window)?;
        let candidates = window.len().saturating_sub(BGZF_HEADER_SIZE - 1);
        if candidates == 0 {
            break;
        }

        for i in 0..candidates {
            let Some(block_size) = parse_block_header(&window[i..]) else {
                continue;
            };
            let start = window_start + i as u64;
            if start + block_size as u64 > file_len {
                continue;
            }
            let candidate = if i + block_size <= window.len() {
                &window[i..i + block_size]
            } else {
                reader.seek(SeekFrom::Start(start))?;
                block.resize(block_size, 0);
                reader.read_exact(&mut block)?;
                &block[..]
            };
            if inflate_block(candidate, &mut scratch).is_ok() {
                trace!("BGZF block found at {} (searched from {})", start, offset);
                return Ok(start);
            }
        }
        window_start += candidates as u64;
    }

    Err(CountError::NoBlockFound { offset })
}

/// Check the 36 leading bytes of a candidate record against the reference
/// dictionary. Returns the candidate's `block_size` when every field is
/// plausible.
pub fn validate_fixed_header(
    bytes: &[u8],
    dict: &ReferenceDictionary,
    limits: &ScanLimits,
) -> Option<usize> {
    if bytes.len() < FIXED_HEADER_LEN {
        return None;
    }
    let block_size = usize::try_from(le_i32(bytes, 0)).ok()?;
    if block_size < MIN_BLOCK_SIZE || block_size > limits.max_record_len {
        return None;
    }

    let ref_id = le_i32(bytes, 4);
    let contig_len = match ref_id {
        -1 => None,
        id => Some(i64::from(dict.length(id)?)),
    };
    if let Some(len) = contig_len {
        let pos = i64::from(le_i32(bytes, 8));
        if pos < 0 || pos >= len {
            return None;
        }
    }

    if bytes[12] == 0 {
        return None;
    }
    let flags = Flags::from_bits(u16::from_le_bytes([bytes[18], bytes[19]]))?;
    if le_i32(bytes, 20) < 0 {
        return None;
    }

    if flags.is_segmented() && !flags.is_mate_unmapped() {
        let mate_len = i64::from(dict.length(le_i32(bytes, 24))?);
        let mate_pos = i64::from(le_i32(bytes, 28));
        if mate_pos < 0 || mate_pos >= mate_len {
            return None;
        }
    }

    if let Some(len) = contig_len {
        if i64::from(le_i32(bytes, 32)).abs() > len {
            return None;
        }
    }
    Some(block_size)
}

/// Full-record check on `block_size` plus body: noodles decodes every field
/// and the read name is printable.
fn record_is_plausible(bytes: &[u8]) -> bool {
    let mut reader = bam::io::Reader::from(bytes);
    let mut record = bam::Record::default();
    match reader.read_record(&mut record) {
        Ok(n) if n > 0 => {}
        _ => return false,
    }
    let name = read_name(&record);
    name.iter().all(|&b| (32..=127).contains(&b)) && fields_decode(&record)
}

fn can_decode<R: BufRead>(
    stream: &mut PushbackReader<R>,
    dict: &ReferenceDictionary,
    limits: &ScanLimits,
    consumed: &mut Vec<u8>,
) -> Result<bool> {
    consumed.clear();
    consumed.resize(FIXED_HEADER_LEN, 0);
    let n = read_full(stream, consumed)?;
    if n < FIXED_HEADER_LEN {
        consumed.truncate(n);
        stream.unread(consumed);
        return Ok(false);
    }

    let verdict = match validate_fixed_header(consumed, dict, limits) {
        Some(block_size) => {
            let total = 4 + block_size;
            consumed.resize(total, 0);
            let got = read_full(stream, &mut consumed[FIXED_HEADER_LEN..])?;
            if got < total - FIXED_HEADER_LEN {
                consumed.truncate(FIXED_HEADER_LEN + got);
                false
            } else {
                record_is_plausible(consumed)
            }
        }
        None => false,
    };
    stream.unread(consumed);
    Ok(verdict)
}

/// Advance `stream` to the next plausible record start.
///
/// Returns the number of bytes skipped, or `None` when the stream ends first.
/// On success the stream is positioned on the record; nothing of it has been
/// consumed.
pub fn find_next_record_start<R: BufRead>(
    stream: &mut PushbackReader<R>,
    dict: &ReferenceDictionary,
    limits: &ScanLimits,
) -> Result<Option<u64>> {
    let mut consumed = Vec::with_capacity(FIXED_HEADER_LEN);
    let mut skipped = 0u64;
    loop {
        if can_decode(stream, dict, limits, &mut consumed)? {
            return Ok(Some(skipped));
        }
        if stream.read_byte()?.is_none() {
            return Ok(None);
        }
        skipped += 1;
    }
}
