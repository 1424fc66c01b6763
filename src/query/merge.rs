//! Reconcile projection candidates with base-table rows by natural key.

use crate::query::rows::{EventRow, ProjectionRow, RowKey};
use std::collections::{HashMap, HashSet};

/// One output row per distinct candidate, in candidate order. The base row
/// wins when present; otherwise the raw projection row stands in.
pub fn merge_by_key(candidates: Vec<ProjectionRow>, base: Vec<EventRow>) -> Vec<EventRow> {
    let mut enriched: HashMap<RowKey, EventRow> = base.into_iter().map(|row| (row.key(), row)).collect();
    let mut seen = HashSet::with_capacity(candidates.len());

    candidates
        .into_iter()
        .filter_map(|candidate| {
            let key = candidate.key();
            if !seen.insert(key.clone()) {
                return None;
            }
            Some(enriched.remove(&key).unwrap_or_else(|| EventRow::from(candidate)))
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_rows::{enriched, projection};
    use super::*;

    #[test]
    fn test_missing_base_rows_fall_back_to_projection() {
        let candidates: Vec<ProjectionRow> = (0..26).map(|i| projection(1_000 - i, 0)).collect();
        // base lags: two rows missing
        let base: Vec<EventRow> = candidates
            .iter()
            .filter(|row| row.block_timestamp != 990 && row.block_timestamp != 980)
            .map(enriched)
            .collect();
        assert_eq!(base.len(), 24);

        let merged = merge_by_key(candidates.clone(), base);
        assert_eq!(merged.len(), 26);
        for (row, candidate) in merged.iter().zip(&candidates) {
            assert_eq!(row.key(), candidate.key());
            let lagging = candidate.block_timestamp == 990 || candidate.block_timestamp == 980;
            assert_eq!(row.is_enriched(), !lagging);
        }
    }

    #[test]
    fn test_duplicates_and_strays_are_dropped() {
        let a = projection(5, 0);
        let b = projection(5, 1);
        let stray = enriched(&projection(9, 9));
        let merged = merge_by_key(vec![a.clone(), b.clone(), a.clone()], vec![enriched(&b), stray]);
        assert_eq!(merged.len(), 2);
        assert!(!merged[0].is_enriched());
        assert!(merged[1].is_enriched());
        assert_eq!(merged[1].affected, b.affected);
    }
}
