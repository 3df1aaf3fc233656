//! Global top-k selection over one comparison series.
//!
//! Each rank extracts its matching rows, keeps a local top-k, and the
//! partial results merge deterministically across ranks (every rank
//! computes the same final list). Ties break by rank, then row id.

use std::cmp::Ordering;

use crate::error::{GraphError, Result};
use crate::graph::name::SeriesName;
use crate::graph::{Graph, Namespace, WhereClause};
use crate::store::record::SeriesIdx;
use crate::store::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Largest values first.
    Descending,
    /// Smallest values first.
    Ascending,
}

/// Total order over same-type values; the missing value sorts below
/// everything.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::UInt64(x), Value::UInt64(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::None, Value::None) => Ordering::Equal,
        (Value::None, _) => Ordering::Less,
        (_, Value::None) => Ordering::Greater,
        // Companion-series typing rules make this unreachable.
        _ => Ordering::Equal,
    }
}

type Candidate = (Vec<Value>, u64, u64);

fn rank_candidates(candidates: &mut Vec<Candidate>, order: SortOrder, k: usize) {
    candidates.sort_by(|(a, a_rank, a_row), (b, b_rank, b_row)| {
        let by_value = match order {
            SortOrder::Descending => compare_values(&b[0], &a[0]),
            SortOrder::Ascending => compare_values(&a[0], &b[0]),
        };
        by_value
            .then_with(|| a_rank.cmp(b_rank))
            .then_with(|| a_row.cmp(b_row))
    });
    candidates.truncate(k);
}

impl Graph<'_> {
    /// The global top `k` rows by `series`, each row carrying the
    /// comparison value followed by the companion series' values.
    /// Companion series must share the comparison series' type.
    /// Collective; every rank receives the same rows.
    pub fn topk(
        &self,
        k: usize,
        series: &str,
        companions: &[&str],
        order: SortOrder,
        where_: Option<&WhereClause>,
    ) -> Result<Vec<Vec<Value>>> {
        let name = SeriesName::parse(series)?;
        let ns = name.namespace();
        let store = self.store_for(ns);
        let cmp_idx = store
            .find_series(name.unqualified())
            .ok_or_else(|| GraphError::SeriesNotFound(name.qualified()))?;
        let cmp_ty = store.series_type(cmp_idx)?;

        let mut idxs: Vec<SeriesIdx> = vec![cmp_idx];
        for raw in companions {
            let companion = SeriesName::parse(raw)?;
            if companion.namespace() != ns {
                return Err(GraphError::InvalidSeriesName(companion.qualified()));
            }
            let idx = store
                .find_series(companion.unqualified())
                .ok_or_else(|| GraphError::SeriesNotFound(companion.qualified()))?;
            let ty = store.series_type(idx)?;
            if ty != cmp_ty {
                return Err(GraphError::TypeMismatch {
                    series: companion.qualified(),
                    expected: cmp_ty,
                    actual: ty,
                });
            }
            idxs.push(idx);
        }

        let rank = self.comm().rank() as u64;
        let mut local: Vec<Candidate> = Vec::new();
        let visit = |row: u64| {
            let tuple = self.gather_tuple(ns, &idxs, row);
            // Rows without a comparison value do not compete.
            if tuple[0].is_none() {
                return;
            }
            local.push((tuple, rank, row));
        };
        match ns {
            Namespace::Node => self.for_all_nodes(where_, visit)?,
            Namespace::Edge => self.for_all_edges(where_, visit)?,
        }
        rank_candidates(&mut local, order, k);

        let mut merged = self.comm().all_reduce(local, |mut a, b| {
            a.extend(b);
            a
        });
        rank_candidates(&mut merged, order, k);
        Ok(merged.into_iter().map(|(values, _, _)| values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_values_totals() {
        assert_eq!(
            compare_values(&Value::Int64(1), &Value::Int64(2)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Double(2.0), &Value::Double(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&Value::Str("a".into()), &Value::Str("a".into())),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(&Value::None, &Value::Int64(0)),
            Ordering::Less
        );
    }

    #[test]
    fn test_rank_candidates_orders_and_breaks_ties() {
        let mut cands: Vec<Candidate> = vec![
            (vec![Value::Int64(5)], 1, 0),
            (vec![Value::Int64(9)], 0, 3),
            (vec![Value::Int64(5)], 0, 7),
            (vec![Value::Int64(2)], 0, 1),
        ];
        rank_candidates(&mut cands, SortOrder::Descending, 3);
        assert_eq!(cands[0].0, vec![Value::Int64(9)]);
        // Tie on 5: rank 0 before rank 1.
        assert_eq!((cands[1].1, cands[1].2), (0, 7));
        assert_eq!((cands[2].1, cands[2].2), (1, 0));
    }

    #[test]
    fn test_rank_candidates_ascending() {
        let mut cands: Vec<Candidate> = vec![
            (vec![Value::Double(0.5)], 0, 0),
            (vec![Value::Double(-1.0)], 0, 1),
        ];
        rank_candidates(&mut cands, SortOrder::Ascending, 2);
        assert_eq!(cands[0].0, vec![Value::Double(-1.0)]);
    }
}
