//! BGZF block handling.
//!
//! A BAM file is a concatenation of independent gzip members ("blocks"), each
//! carrying its own total size in a `BC` extra subfield:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                            │
//! │  1f 8b 08 04 | MTIME XFL OS (6) | XLEN=6 | 'B' 'C' 02 00 BSIZE│
//! ├──────────────────────────────────────────────────────────────┤
//! │ Raw deflate payload                                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CRC32 (4) | ISIZE (4)                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `BSIZE` is the total block size minus one and `ISIZE` never exceeds 64 KiB,
//! which is what makes blocks discoverable from an arbitrary byte offset.
//!
//! Sequential decoding is left to `noodles::bgzf`; this module only validates
//! candidate blocks found by the boundary scan.

use flate2::{Crc, Decompress, FlushDecompress, Status};
use std::io::{self, Read};

/// Size of the BGZF block header.
pub const BGZF_HEADER_SIZE: usize = 18;

/// Size of the BGZF block footer (CRC32 + ISIZE).
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Largest uncompressed payload a block may carry.
pub const MAX_BLOCK_UNCOMPRESSED: usize = 65536;

/// BGZF EOF marker block (empty block signaling end of file).
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Validate the fixed 18-byte block header and return the total block size.
///
/// Only the layout written by every BGZF producer is accepted: a single `BC`
/// extra subfield of length two.
pub fn parse_block_header(header: &[u8]) -> Option<usize> {
    if header.len() < BGZF_HEADER_SIZE {
        return None;
    }
    if header[0] != 0x1f || header[1] != 0x8b || header[2] != 0x08 || header[3] & 0x04 == 0 {
        return None;
    }
    let xlen = u16::from_le_bytes([header[10], header[11]]);
    let slen = u16::from_le_bytes([header[14], header[15]]);
    if xlen != 6 || header[12] != b'B' || header[13] != b'C' || slen != 2 {
        return None;
    }
    let block_size = u16::from_le_bytes([header[16], header[17]]) as usize + 1;
    if block_size < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
        return None;
    }
    Some(block_size)
}

/// ISIZE field of a complete block.
#[inline]
pub fn block_uncompressed_size(block: &[u8]) -> usize {
    let len = block.len();
    u32::from_le_bytes([block[len - 4], block[len - 3], block[len - 2], block[len - 1]]) as usize
}

#[inline]
fn block_crc32(block: &[u8]) -> u32 {
    let len = block.len();
    u32::from_le_bytes([block[len - 8], block[len - 7], block[len - 6], block[len - 5]])
}

/// Inflate a complete block into `out`, checking ISIZE and CRC32.
pub fn inflate_block(block: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
    if block.len() < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("BGZF block too small: {} bytes", block.len()),
        ));
    }
    let expected = block_uncompressed_size(block);
    if expected > MAX_BLOCK_UNCOMPRESSED {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("BGZF block ISIZE {} exceeds {}", expected, MAX_BLOCK_UNCOMPRESSED),
        ));
    }

    let payload = &block[BGZF_HEADER_SIZE..block.len() - BGZF_FOOTER_SIZE];
    out.clear();
    out.reserve(expected.max(1));
    let mut inflater = Decompress::new(false);
    let status = inflater
        .decompress_vec(payload, out, FlushDecompress::Finish)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if status != Status::StreamEnd || out.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "BGZF block inflated to {} bytes, footer says {}",
                out.len(),
                expected
            ),
        ));
    }

    let mut crc = Crc::new();
    crc.update(out);
    if crc.sum() != block_crc32(block) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "BGZF block CRC32 mismatch",
        ));
    }
    Ok(())
}

/// Read until `buf` is full or the reader is exhausted; returns the bytes read.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
