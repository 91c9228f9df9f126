//! The reference sequence dictionary, built from the noodles BAM header.

use noodles::{bam, sam};
use rustc_hash::FxHashMap;
use std::io::BufRead;

use crate::core::error::{CountError, Result};

/// A reference sequence as declared in the BAM header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub length: u32,
}

/// Ordered reference sequences, indexed by BAM reference id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDictionary {
    contigs: Vec<Contig>,
    by_name: FxHashMap<String, usize>,
}

impl ReferenceDictionary {
    pub fn new<I, S>(contigs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let contigs: Vec<Contig> = contigs
            .into_iter()
            .map(|(name, length)| Contig {
                name: name.into(),
                length,
            })
            .collect();
        let by_name = contigs
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { contigs, by_name }
    }

    /// Reference sequences of a parsed SAM header, in header order.
    pub fn from_header(header: &sam::Header) -> Result<Self> {
        let mut contigs = Vec::with_capacity(header.reference_sequences().len());
        for (name, reference_sequence) in header.reference_sequences() {
            let name = String::from_utf8_lossy(name).into_owned();
            let length = u32::try_from(reference_sequence.length().get()).map_err(|_| {
                CountError::InvalidBam(format!("contig {} is longer than 2^32 bases", name))
            })?;
            contigs.push((name, length));
        }
        Ok(Self::new(contigs))
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Contig for a BAM reference id; negative ids map to `None`.
    #[inline]
    pub fn get(&self, ref_id: i32) -> Option<&Contig> {
        usize::try_from(ref_id)
            .ok()
            .and_then(|i| self.contigs.get(i))
    }

    #[inline]
    pub fn name(&self, ref_id: i32) -> Option<&str> {
        self.get(ref_id).map(|c| c.name.as_str())
    }

    #[inline]
    pub fn length(&self, ref_id: i32) -> Option<u32> {
        self.get(ref_id).map(|c| c.length)
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contig> {
        self.contigs.iter()
    }
}

/// Consume the BAM header from a decompressed stream, leaving the reader on
/// the first alignment record.
pub fn read_header<R: BufRead>(reader: &mut bam::io::Reader<R>) -> Result<ReferenceDictionary> {
    let header = reader
        .read_header()
        .map_err(|e| CountError::InvalidBam(format!("cannot read BAM header: {}", e)))?;
    ReferenceDictionary::from_header(&header)
}
