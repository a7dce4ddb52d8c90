//! Differential engine.
//!
//! Compares a query's new result set against the one stored from its previous
//! run and reports the rows that were added and removed:
//! - The whole row is the identity, no column acts as a key
//! - Rows are compared as a multiset, so duplicate counts are tracked
//! - The store is swapped to the new result set in the same transaction

use crate::query::{DiffResults, Row};
use crate::store::{ResultStore, StoreError};
use std::collections::HashMap;

/// Canonical key for a row: length-prefixed column/value pairs in column order.
/// Length prefixes keep `{"a": "b:c"}` and `{"a:b": "c"}` distinct.
fn row_key(row: &Row) -> String {
    let mut key = String::new();
    for (column, value) in row {
        key.push_str(&column.len().to_string());
        key.push(':');
        key.push_str(column);
        key.push_str(&value.len().to_string());
        key.push(':');
        key.push_str(value);
    }
    key
}

fn count_rows(rows: &[Row]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row_key(row)).or_default() += 1;
    }
    counts
}

/// Compare two result sets as multisets.
///
/// A row present `n` times before and `m` times now contributes `m - n`
/// entries to `added` when it grew and `n - m` entries to `removed` when it
/// shrank. Output keeps the order rows appear in their source set.
pub fn compare_results(previous: &[Row], current: &[Row]) -> DiffResults {
    // rows from the previous run not yet matched by a current row
    let mut unmatched = count_rows(previous);
    let mut added = Vec::new();

    for row in current {
        match unmatched.get_mut(&row_key(row)) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added.push(row.clone()),
        }
    }

    let mut removed = Vec::new();
    for row in previous {
        if let Some(count) = unmatched.get_mut(&row_key(row)) {
            if *count > 0 {
                *count -= 1;
                removed.push(row.clone());
            }
        }
    }

    DiffResults { added, removed }
}

/// Diff `results` against the stored result set for `name` and store `results`
/// as the new baseline.
///
/// A query with no stored results diffs against the empty set, so its first run
/// reports every row as added. On error the stored results are unchanged.
pub fn compute_and_store(
    store: &ResultStore,
    name: &str,
    results: &[Row],
) -> Result<DiffResults, StoreError> {
    store.swap_results(name, results, |previous| compare_results(previous, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::row;

    fn r(value: &str) -> Row {
        row([("a", value)])
    }

    /// previous - removed + added, as sorted canonical keys
    fn apply(previous: &[Row], diff: &DiffResults) -> Vec<String> {
        let mut keys: Vec<String> = previous.iter().map(row_key).collect();
        for gone in &diff.removed {
            let key = row_key(gone);
            let pos = keys.iter().position(|k| *k == key).unwrap();
            keys.remove(pos);
        }
        keys.extend(diff.added.iter().map(row_key));
        keys.sort();
        keys
    }

    fn sorted_keys(rows: &[Row]) -> Vec<String> {
        let mut keys: Vec<String> = rows.iter().map(row_key).collect();
        keys.sort();
        keys
    }

    #[test]
    fn new_row_detected() {
        let diff = compare_results(&[r("1")], &[r("1"), r("2")]);
        assert_eq!(diff.added, vec![r("2")]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn gone_row_detected() {
        let diff = compare_results(&[r("1"), r("2")], &[r("2")]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![r("1")]);
    }

    #[test]
    fn unchanged_rows_not_reported() {
        let rows = vec![r("1"), r("2"), r("3")];
        assert!(compare_results(&rows, &rows).is_empty());
    }

    #[test]
    fn reordered_rows_not_reported() {
        let diff = compare_results(&[r("1"), r("2")], &[r("2"), r("1")]);
        assert!(diff.is_empty());
    }

    #[test]
    fn changed_column_value_is_remove_plus_add() {
        let before = row([("pid", "1"), ("name", "init")]);
        let after = row([("pid", "1"), ("name", "systemd")]);
        let diff = compare_results(&[before.clone()], &[after.clone()]);
        assert_eq!(diff.added, vec![after]);
        assert_eq!(diff.removed, vec![before]);
    }

    #[test]
    fn duplicates_in_both_sets_are_unchanged() {
        let rows = vec![r("1"), r("1")];
        assert!(compare_results(&rows, &rows).is_empty());
    }

    #[test]
    fn duplicate_count_increase_adds_delta() {
        let diff = compare_results(&[r("1")], &[r("1"), r("1"), r("1")]);
        assert_eq!(diff.added, vec![r("1"), r("1")]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn duplicate_count_decrease_removes_delta() {
        let diff = compare_results(&[r("1"), r("1"), r("2")], &[r("1"), r("2")]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![r("1")]);
    }

    #[test]
    fn separator_characters_do_not_collide() {
        let left = row([("a", "b:c")]);
        let right = row([("a:b", "c")]);
        let diff = compare_results(&[left.clone()], &[right.clone()]);
        assert_eq!(diff.added, vec![right]);
        assert_eq!(diff.removed, vec![left]);
    }

    #[test]
    fn empty_both_sides_no_changes() {
        assert!(compare_results(&[], &[]).is_empty());
    }

    #[test]
    fn diff_reconstructs_new_set_as_multiset() {
        let values = ["1", "2", "3"];
        // every previous/current pair of length <= 3 over three values
        let mut sets: Vec<Vec<Row>> = vec![vec![]];
        for _ in 0..3 {
            let mut longer = Vec::new();
            for set in &sets {
                for v in values {
                    let mut next = set.clone();
                    next.push(r(v));
                    longer.push(next);
                }
            }
            sets.extend(longer.into_iter().filter(|s| s.len() <= 3));
            sets.sort_by_key(|s| sorted_keys(s));
            sets.dedup_by_key(|s| sorted_keys(s));
        }

        for previous in &sets {
            for current in &sets {
                let diff = compare_results(previous, current);
                assert_eq!(apply(previous, &diff), sorted_keys(current));

                // nothing common to both sets shows up on both sides
                for added in &diff.added {
                    assert!(!diff.removed.contains(added));
                }
            }
        }
    }

    #[test]
    fn first_run_reports_all_rows_added() {
        let store = ResultStore::open_in_memory().unwrap();
        let rows = vec![r("1"), r("2"), r("2")];

        let diff = compute_and_store(&store, "q", &rows).unwrap();

        assert_eq!(diff.added, rows);
        assert!(diff.removed.is_empty());
        assert_eq!(store.get("q").unwrap(), Some(rows));
    }

    #[test]
    fn second_run_with_same_rows_is_empty() {
        let store = ResultStore::open_in_memory().unwrap();
        let rows = vec![r("1"), r("2")];

        compute_and_store(&store, "q", &rows).unwrap();
        let diff = compute_and_store(&store, "q", &rows).unwrap();

        assert!(diff.is_empty());
    }

    #[test]
    fn stored_baseline_is_replaced() {
        let store = ResultStore::open_in_memory().unwrap();
        compute_and_store(&store, "p1", &[r("1")]).unwrap();

        let diff = compute_and_store(&store, "p1", &[r("1"), r("2")]).unwrap();
        assert_eq!(diff.added, vec![r("2")]);
        assert!(diff.removed.is_empty());

        let diff = compute_and_store(&store, "p1", &[r("2")]).unwrap();
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![r("1")]);
        assert_eq!(store.get("p1").unwrap(), Some(vec![r("2")]));
    }

    #[test]
    fn query_names_are_tracked_independently() {
        let store = ResultStore::open_in_memory().unwrap();
        compute_and_store(&store, "a", &[r("1")]).unwrap();

        let diff = compute_and_store(&store, "b", &[r("1")]).unwrap();
        assert_eq!(diff.added, vec![r("1")]);
    }
}
