//! Reduction of per-chunk results into the final per-barcode table.

use rayon::prelude::*;

use crate::count::{BarcodeResult, CountContext, GlobalSummary, ResultSet};
use crate::core::error::{CountError, Result};

/// Final output of a run, in barcode universe order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountReport {
    pub results: Vec<BarcodeResult>,
    pub summary: GlobalSummary,
}

/// Merge partial result sets pairwise in parallel.
pub fn merge_result_sets(sets: Vec<ResultSet>, n_barcodes: usize) -> Result<ResultSet> {
    sets.into_par_iter()
        .map(Ok::<ResultSet, CountError>)
        .try_reduce(|| ResultSet::new(n_barcodes), |a, b| a.merge(b))
}

pub fn aggregate(sets: Vec<ResultSet>, ctx: &CountContext) -> Result<CountReport> {
    let merged = merge_result_sets(sets, ctx.barcodes.len())?;
    let results = merged.into_results(&ctx.barcodes, ctx.n_features());
    let summary = GlobalSummary::from_results(&results);
    Ok(CountReport { results, summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n_barcodes: usize, id: u32, counts: Vec<u32>) -> ResultSet {
        let mut set = ResultSet::new(n_barcodes);
        let n = counts.len();
        let entry = set.entry(id, &format!("bc{}", id), n);
        entry.counts = counts;
        entry.counters.mapped = entry.counts.iter().map(|&c| c as u64).sum();
        entry.counters.total_reads = entry.counters.mapped;
        set
    }

    #[test]
    fn counts_add_up_across_sets() {
        let sets = vec![
            set(2, 0, vec![3, 0, 1]),
            set(2, 0, vec![0, 2, 1]),
            set(2, 1, vec![1, 1, 1]),
        ];
        let merged = merge_result_sets(sets, 2).unwrap();
        assert_eq!(merged.get(0).unwrap().counts, vec![3, 2, 2]);
        assert_eq!(merged.get(1).unwrap().counts, vec![1, 1, 1]);
        assert_eq!(merged.get(0).unwrap().counters.mapped, 7);
    }

    #[test]
    fn mismatched_vectors_fail() {
        let sets = vec![set(1, 0, vec![1, 2]), set(1, 0, vec![1, 2, 3])];
        let err = merge_result_sets(sets, 1).unwrap_err();
        assert!(matches!(err, CountError::CountLengthMismatch { .. }));
    }

    #[test]
    fn empty_input_gives_empty_set() {
        let merged = merge_result_sets(Vec::new(), 3).unwrap();
        assert_eq!(merged.n_barcodes(), 3);
        assert_eq!(merged.iter().count(), 0);
    }
}
