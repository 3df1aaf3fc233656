//! Compiled where clauses.
//!
//! A clause is an ordered list of fully-qualified series names plus a
//! callable evaluated over a tuple of cells drawn from those series. How
//! the callable is produced (expression compiler, hand-written closure) is
//! the caller's business; the graph only classifies the clause, resolves
//! the series once per call, and evaluates row-local.

use std::fmt;
use std::sync::Arc;

use crate::graph::name::{Namespace, SeriesName};
use crate::store::value::Value;

type Predicate = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct WhereClause {
    series: Vec<SeriesName>,
    predicate: Predicate,
}

impl WhereClause {
    /// The empty clause matches every row.
    pub fn empty() -> Self {
        Self {
            series: Vec::new(),
            predicate: Arc::new(|_| true),
        }
    }

    pub fn new(
        series: Vec<SeriesName>,
        predicate: impl Fn(&[Value]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            series,
            predicate: Arc::new(predicate),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series(&self) -> &[SeriesName] {
        &self.series
    }

    /// All referenced series agree on a namespace (vacuously true when
    /// empty).
    pub fn is_uniform(&self) -> bool {
        self.series
            .windows(2)
            .all(|w| w[0].namespace() == w[1].namespace())
    }

    pub fn is_node_clause(&self) -> bool {
        !self.series.is_empty()
            && self.series[0].namespace() == Namespace::Node
            && self.is_uniform()
    }

    pub fn is_edge_clause(&self) -> bool {
        !self.series.is_empty()
            && self.series[0].namespace() == Namespace::Edge
            && self.is_uniform()
    }

    /// Evaluate over a tuple of cells, one per referenced series in order.
    /// The empty clause is always true.
    pub fn evaluate(&self, row: &[Value]) -> bool {
        if self.series.is_empty() {
            return true;
        }
        (self.predicate)(row)
    }
}

impl Default for WhereClause {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhereClause")
            .field("series", &self.series)
            .finish_non_exhaustive()
    }
}
