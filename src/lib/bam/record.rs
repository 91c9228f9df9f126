//! Field access on noodles BAM records.
//!
//! Records are decoded lazily by noodles; the helpers here turn the fields
//! the counter needs into plain values and map decoding failures onto
//! [`CountError::InvalidBam`].

use noodles::bam::{self, Record};
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::data::field::{Tag, Value};
use std::io::{self, BufRead};

use crate::core::error::{CountError, Result};

fn invalid(e: io::Error) -> CountError {
    CountError::InvalidBam(e.to_string())
}

/// Read the next record into `record`; `false` at a clean end of stream.
pub fn read_next<R: BufRead>(reader: &mut bam::io::Reader<R>, record: &mut Record) -> Result<bool> {
    match reader.read_record(record) {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) => Err(invalid(e)),
    }
}

/// Whether the operation aligns read bases to the reference.
#[inline]
pub fn is_aligned(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch
    )
}

/// Reference span covered by a CIGAR.
pub fn reference_span(cigar: &[Op]) -> u64 {
    cigar
        .iter()
        .filter(|op| op.kind().consumes_reference())
        .map(|op| op.len() as u64)
        .sum()
}

/// Read name without the trailing NUL; empty for `*`.
pub fn read_name(record: &Record) -> &[u8] {
    match record.name() {
        Some(name) => name.as_ref(),
        None => &[],
    }
}

pub fn read_name_lossy(record: &Record) -> String {
    String::from_utf8_lossy(read_name(record)).into_owned()
}

/// BAM reference id, `-1` when unset.
pub fn reference_id(record: &Record) -> Result<i32> {
    match record.reference_sequence_id().transpose().map_err(invalid)? {
        Some(id) => i32::try_from(id)
            .map_err(|_| CountError::InvalidBam(format!("reference id {} out of range", id))),
        None => Ok(-1),
    }
}

/// 0-based leftmost aligned position, `-1` when unset.
pub fn alignment_start(record: &Record) -> Result<i64> {
    match record.alignment_start().transpose().map_err(invalid)? {
        Some(position) => Ok(usize::from(position) as i64 - 1),
        None => Ok(-1),
    }
}

/// Mapping quality with the "unavailable" value reported as 255.
pub fn mapping_quality(record: &Record) -> u8 {
    record.mapping_quality().map_or(u8::MAX, u8::from)
}

pub fn cigar_ops(record: &Record) -> Result<Vec<Op>> {
    record
        .cigar()
        .iter()
        .collect::<io::Result<Vec<_>>>()
        .map_err(invalid)
}

/// String-valued (`Z`) auxiliary field. Other value types read as absent.
pub fn string_tag(record: &Record, tag: [u8; 2]) -> Result<Option<String>> {
    let wanted = Tag::from(tag);
    for field in record.data().iter() {
        let (found, value) = field.map_err(invalid)?;
        if found != wanted {
            continue;
        }
        return Ok(match value {
            Value::String(value) => Some(String::from_utf8_lossy(value.as_ref()).into_owned()),
            _ => None,
        });
    }
    Ok(None)
}

/// Whether every lazily decoded field of `record` parses.
pub fn fields_decode(record: &Record) -> bool {
    record.reference_sequence_id().transpose().is_ok()
        && record.alignment_start().transpose().is_ok()
        && record.cigar().iter().all(|op| op.is_ok())
        && record.data().iter().all(|field| field.is_ok())
}

/// Name and reference span: what two independent decoders compare to agree
/// that they are looking at the same record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadIdentity {
    pub name: Vec<u8>,
    pub start: i64,
    pub end: i64,
}

impl ReadIdentity {
    pub fn of(record: &Record) -> Result<Self> {
        let start = alignment_start(record)?;
        let span = reference_span(&cigar_ops(record)?);
        Ok(Self {
            name: read_name(record).to_vec(),
            start,
            end: start + span as i64,
        })
    }

    /// Compare against `record`, decoding its CIGAR only when the names agree.
    pub fn matches(&self, record: &Record) -> Result<bool> {
        if read_name(record) != self.name.as_slice() {
            return Ok(false);
        }
        Ok(*self == Self::of(record)?)
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam::test_support::{decode_record, TestRead};
    use noodles::sam::alignment::record::Flags;

    #[test]
    fn decodes_fields_and_tags() {
        let read = TestRead::new("read/1")
            .at(0, 99)
            .cigar(&[(Kind::SoftClip, 2), (Kind::Match, 10), (Kind::Skip, 100), (Kind::Match, 5)])
            .flags(Flags::SEGMENTED | Flags::REVERSE_COMPLEMENTED | Flags::FIRST_SEGMENT)
            .mapq(37)
            .tag(b"CB", "ACGT")
            .tag(b"GX", "ENSG1");
        let rec = decode_record(&read);

        assert_eq!(read_name(&rec), b"read/1");
        assert_eq!(reference_id(&rec).unwrap(), 0);
        assert_eq!(alignment_start(&rec).unwrap(), 99);
        assert_eq!(mapping_quality(&rec), 37);
        let flags = rec.flags();
        assert!(flags.is_segmented() && flags.is_reverse_complemented() && flags.is_first_segment());
        assert!(!flags.is_unmapped());
        assert_eq!(string_tag(&rec, *b"CB").unwrap().as_deref(), Some("ACGT"));
        assert_eq!(string_tag(&rec, *b"GX").unwrap().as_deref(), Some("ENSG1"));
        assert_eq!(string_tag(&rec, *b"UB").unwrap(), None);
        assert!(fields_decode(&rec));

        let identity = ReadIdentity::of(&rec).unwrap();
        assert_eq!((identity.start, identity.end), (99, 99 + 115));
    }

    #[test]
    fn unplaced_record_has_negative_coordinates() {
        let rec = decode_record(&TestRead::new("u").at(-1, -1).flags(Flags::UNMAPPED).cigar(&[]));
        assert_eq!(reference_id(&rec).unwrap(), -1);
        assert_eq!(alignment_start(&rec).unwrap(), -1);
        assert_eq!(mapping_quality(&rec), 60);
        let identity = ReadIdentity::of(&rec).unwrap();
        assert_eq!((identity.start, identity.end), (-1, -1));
    }

    #[test]
    fn identity_compares_name_and_span() {
        let a = TestRead::new("q").at(0, 10).cigar(&[(Kind::Match, 20)]);
        let b = a.clone().cigar(&[(Kind::Match, 21)]);
        let id = |r: &TestRead| ReadIdentity::of(&decode_record(r)).unwrap();
        assert_eq!(id(&a), id(&a));
        assert_ne!(id(&a), id(&b));
        assert_ne!(id(&a), id(&a.clone().at(0, 11)));
        assert!(id(&a).matches(&decode_record(&a)).unwrap());
        assert!(!id(&a).matches(&decode_record(&b)).unwrap());
    }

    #[test]
    fn read_next_stops_cleanly_and_rejects_truncation() {
        use crate::bam::test_support::encode_record;
        let bytes = encode_record(&TestRead::new("only"));
        let mut record = Record::default();

        let mut reader = bam::io::Reader::from(&bytes[..]);
        assert!(read_next(&mut reader, &mut record).unwrap());
        assert_eq!(read_name(&record), b"only");
        assert!(!read_next(&mut reader, &mut record).unwrap());

        let mut reader = bam::io::Reader::from(&bytes[..bytes.len() - 3]);
        assert!(matches!(
            read_next(&mut reader, &mut record),
            Err(CountError::InvalidBam(_))
        ));
    }

    #[test]
    fn missing_mapping_quality_reads_as_255() {
        let rec = decode_record(&TestRead::new("m").mapq(255));
        assert_eq!(mapping_quality(&rec), 255);
    }
}
