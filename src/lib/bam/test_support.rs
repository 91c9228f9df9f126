//! Fixture builders shared by the unit tests: raw record/header encoders, a
//! minimal BGZF block writer, and an htslib-backed BAM writer.

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::Flags;
use rust_htslib::bam;
use rust_htslib::bam::record::{Aux, Cigar, CigarString};
use std::io::Write;
use std::path::Path;

use super::bgzf::BGZF_EOF;
use super::header::ReferenceDictionary;

/// Compress `data` into a single BGZF block.
pub fn bgzf_block(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    let payload = encoder.finish().unwrap();
    let mut crc = Crc::new();
    crc.update(data);

    let block_size = 18 + payload.len() + 8;
    let mut block = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0xff, 6, 0, b'B', b'C', 2, 0];
    block.extend_from_slice(&((block_size - 1) as u16).to_le_bytes());
    block.extend_from_slice(&payload);
    block.extend_from_slice(&crc.sum().to_le_bytes());
    block.extend_from_slice(&(data.len() as u32).to_le_bytes());
    block
}

/// Split `payload` into BGZF blocks of at most `block_len` bytes and append EOF.
pub fn bgzf_file(payload: &[u8], block_len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in payload.chunks(block_len) {
        out.extend(bgzf_block(chunk));
    }
    out.extend_from_slice(&BGZF_EOF);
    out
}

pub fn encode_header(dict: &ReferenceDictionary) -> Vec<u8> {
    let text: String = dict
        .iter()
        .map(|c| format!("@SQ\tSN:{}\tLN:{}\n", c.name, c.length))
        .collect();
    let mut out = b"BAM\x01".to_vec();
    out.extend_from_slice(&(text.len() as i32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&(dict.len() as i32).to_le_bytes());
    for contig in dict.iter() {
        out.extend_from_slice(&((contig.name.len() + 1) as i32).to_le_bytes());
        out.extend_from_slice(contig.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&(contig.length as i32).to_le_bytes());
    }
    out
}

/// Description of one alignment for fixture generation.
#[derive(Debug, Clone)]
pub struct TestRead {
    pub name: String,
    pub ref_id: i32,
    pub pos: i32,
    pub mapq: u8,
    pub flags: u16,
    pub cigar: Vec<(Kind, u32)>,
    pub mate_ref_id: i32,
    pub mate_pos: i32,
    pub tlen: i32,
    pub tags: Vec<([u8; 2], String)>,
}

impl TestRead {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ref_id: 0,
            pos: 0,
            mapq: 60,
            flags: 0,
            cigar: vec![(Kind::Match, 10)],
            mate_ref_id: -1,
            mate_pos: -1,
            tlen: 0,
            tags: Vec::new(),
        }
    }

    pub fn at(mut self, ref_id: i32, pos: i32) -> Self {
        self.ref_id = ref_id;
        self.pos = pos;
        self
    }

    pub fn cigar(mut self, ops: &[(Kind, u32)]) -> Self {
        self.cigar = ops.to_vec();
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags.bits();
        self
    }

    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn mate(mut self, ref_id: i32, pos: i32) -> Self {
        self.mate_ref_id = ref_id;
        self.mate_pos = pos;
        self
    }

    pub fn tag(mut self, tag: &[u8; 2], value: &str) -> Self {
        self.tags.push((*tag, value.to_string()));
        self
    }

    fn query_len(&self) -> usize {
        self.cigar
            .iter()
            .filter(|(kind, _)| {
                matches!(
                    kind,
                    Kind::Match
                        | Kind::Insertion
                        | Kind::SoftClip
                        | Kind::SequenceMatch
                        | Kind::SequenceMismatch
                )
            })
            .map(|(_, len)| *len as usize)
            .sum()
    }
}

fn cigar_code(kind: Kind) -> u32 {
    match kind {
        Kind::Match => 0,
        Kind::Insertion => 1,
        Kind::Deletion => 2,
        Kind::Skip => 3,
        Kind::SoftClip => 4,
        Kind::HardClip => 5,
        Kind::Pad => 6,
        Kind::SequenceMatch => 7,
        Kind::SequenceMismatch => 8,
    }
}

/// Encode a record including its leading `block_size`.
pub fn encode_record(read: &TestRead) -> Vec<u8> {
    let l_seq = read.query_len();
    let mut body = Vec::new();
    body.extend_from_slice(&read.ref_id.to_le_bytes());
    body.extend_from_slice(&read.pos.to_le_bytes());
    body.push((read.name.len() + 1) as u8);
    body.push(read.mapq);
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&(read.cigar.len() as u16).to_le_bytes());
    body.extend_from_slice(&read.flags.to_le_bytes());
    body.extend_from_slice(&(l_seq as i32).to_le_bytes());
    body.extend_from_slice(&read.mate_ref_id.to_le_bytes());
    body.extend_from_slice(&read.mate_pos.to_le_bytes());
    body.extend_from_slice(&read.tlen.to_le_bytes());
    body.extend_from_slice(read.name.as_bytes());
    body.push(0);
    for (kind, len) in &read.cigar {
        body.extend_from_slice(&((len << 4) | cigar_code(*kind)).to_le_bytes());
    }
    body.extend(std::iter::repeat(0x11).take((l_seq + 1) / 2));
    body.extend(std::iter::repeat(30).take(l_seq));
    for (tag, value) in &read.tags {
        body.extend_from_slice(tag);
        body.push(b'Z');
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    let mut out = (body.len() as i32).to_le_bytes().to_vec();
    out.extend(body);
    out
}

/// Decode one fixture through noodles, the way the workers see records.
pub fn decode_record(read: &TestRead) -> noodles::bam::Record {
    let bytes = encode_record(read);
    let mut reader = noodles::bam::io::Reader::from(&bytes[..]);
    let mut record = noodles::bam::Record::default();
    reader.read_record(&mut record).unwrap();
    record
}

/// Header bytes followed by every record, uncompressed.
pub fn encode_bam_stream(dict: &ReferenceDictionary, reads: &[TestRead]) -> Vec<u8> {
    let mut out = encode_header(dict);
    for read in reads {
        out.extend(encode_record(read));
    }
    out
}

fn htslib_cigar(ops: &[(Kind, u32)]) -> CigarString {
    CigarString(
        ops.iter()
            .map(|&(kind, len)| match kind {
                Kind::Match => Cigar::Match(len),
                Kind::Insertion => Cigar::Ins(len),
                Kind::Deletion => Cigar::Del(len),
                Kind::Skip => Cigar::RefSkip(len),
                Kind::SoftClip => Cigar::SoftClip(len),
                Kind::HardClip => Cigar::HardClip(len),
                Kind::Pad => Cigar::Pad(len),
                Kind::SequenceMatch => Cigar::Equal(len),
                Kind::SequenceMismatch => Cigar::Diff(len),
            })
            .collect(),
    )
}

/// Write a coordinate-agnostic BAM file through htslib.
pub fn write_htslib_bam(path: &Path, contigs: &[(&str, u32)], reads: &[TestRead]) {
    let mut header = bam::Header::new();
    for (name, length) in contigs {
        let mut record = bam::header::HeaderRecord::new(b"SQ");
        record.push_tag(b"SN", &name.to_string());
        record.push_tag(b"LN", &length.to_string());
        header.push_record(&record);
    }

    let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam).unwrap();
    for read in reads {
        let l_seq = read.query_len();
        let seq = vec![b'A'; l_seq];
        let qual = vec![30u8; l_seq];
        let mut record = bam::Record::new();
        record.set(
            read.name.as_bytes(),
            Some(&htslib_cigar(&read.cigar)),
            &seq,
            &qual,
        );
        record.set_tid(read.ref_id);
        record.set_pos(i64::from(read.pos));
        record.set_mapq(read.mapq);
        record.set_flags(read.flags);
        record.set_mtid(read.mate_ref_id);
        record.set_mpos(i64::from(read.mate_pos));
        record.set_insert_size(i64::from(read.tlen));
        for (tag, value) in &read.tags {
            record.push_aux(tag, Aux::String(value)).unwrap();
        }
        writer.write(&record).unwrap();
    }
}
