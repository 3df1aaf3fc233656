//! Column-oriented record store.
//!
//! Rows are addressed by monotonically increasing ids that are never
//! reused; a validity bit marks each row live or removed. Columns (series)
//! are typed containers addressed by stable index or by name. Removing a
//! series leaves a tombstone so other series' indices never shift.
//!
//! A cell is missing iff the row is not live or the series container
//! reports the row absent. String cells hold 16-byte handles whose pooled
//! payloads live in a [`StringStore`] passed in by the caller.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::store::accessor::StrHandle;
use crate::store::series::{ContainerKind, SeriesData};
use crate::store::strings::StringStore;
use crate::store::value::{PrimitiveType, Value, ValueRef};

pub type RowId = u64;
pub type SeriesIdx = usize;

/// Resolve a series either by stable index or by name.
pub trait SeriesSelector: Copy {
    fn resolve(&self, store: &RecordStore) -> Result<SeriesIdx>;
}

impl SeriesSelector for SeriesIdx {
    fn resolve(&self, store: &RecordStore) -> Result<SeriesIdx> {
        match store.series.get(*self) {
            Some(Some(_)) => Ok(*self),
            _ => Err(GraphError::SeriesNotFound(format!("#{}", self))),
        }
    }
}

impl SeriesSelector for &str {
    fn resolve(&self, store: &RecordStore) -> Result<SeriesIdx> {
        store
            .find_series(self)
            .ok_or_else(|| GraphError::SeriesNotFound((*self).to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeriesHeader {
    name: String,
    data: SeriesData,
}

/// Ordered set of rows with a name → typed-series map.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordStore {
    /// Per-row validity. Position is the row id; slots are never removed.
    validity: Vec<bool>,
    /// Cached count of live rows.
    live: usize,
    /// Series headers in creation order. `None` marks a removed series;
    /// tombstones keep surviving indices stable.
    series: Vec<Option<SeriesHeader>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Records ───────────────────────────────────────────────────────

    /// Append a live row and return its id. Ids are never reused.
    pub fn add_record(&mut self) -> RowId {
        self.validity.push(true);
        self.live += 1;
        (self.validity.len() - 1) as RowId
    }

    /// Count of live rows.
    pub fn num_records(&self) -> usize {
        self.live
    }

    /// Size of the row-id domain, including removed rows.
    pub fn row_domain(&self) -> u64 {
        self.validity.len() as u64
    }

    pub fn contains_record(&self, row: RowId) -> bool {
        self.validity.get(row as usize).copied().unwrap_or(false)
    }

    /// Clear the validity bit and erase the row from every series.
    pub fn remove_record(&mut self, row: RowId) -> bool {
        let idx = row as usize;
        if idx >= self.validity.len() {
            return false;
        }
        for header in self.series.iter_mut().flatten() {
            header.data.erase(row);
        }
        if self.validity[idx] {
            self.validity[idx] = false;
            self.live -= 1;
        }
        true
    }

    // ── Series ────────────────────────────────────────────────────────

    /// Add a series, returning its stable index. Idempotent: an existing
    /// name returns the existing index regardless of the requested type.
    pub fn add_series(&mut self, name: &str, ty: PrimitiveType, kind: ContainerKind) -> SeriesIdx {
        if let Some(idx) = self.find_series(name) {
            return idx;
        }
        self.series.push(Some(SeriesHeader {
            name: name.to_string(),
            data: SeriesData::new(ty, kind),
        }));
        self.series.len() - 1
    }

    pub fn find_series(&self, name: &str) -> Option<SeriesIdx> {
        self.series
            .iter()
            .position(|h| h.as_ref().map(|h| h.name.as_str()) == Some(name))
    }

    pub fn contains_series(&self, name: &str) -> bool {
        self.find_series(name).is_some()
    }

    /// Remove a series and all its cells. Surviving indices do not shift.
    pub fn remove_series(&mut self, name: &str) -> bool {
        match self.find_series(name) {
            Some(idx) => {
                self.series[idx] = None;
                true
            }
            None => false,
        }
    }

    /// Count of live series.
    pub fn num_series(&self) -> usize {
        self.series.iter().flatten().count()
    }

    /// Live series names in creation order.
    pub fn series_names(&self) -> Vec<&str> {
        self.series
            .iter()
            .flatten()
            .map(|h| h.name.as_str())
            .collect()
    }

    pub fn series_type(&self, sel: impl SeriesSelector) -> Result<PrimitiveType> {
        let idx = sel.resolve(self)?;
        Ok(self.header(idx).data.primitive_type())
    }

    pub fn is_series_type(&self, sel: impl SeriesSelector, ty: PrimitiveType) -> bool {
        self.series_type(sel).map(|t| t == ty).unwrap_or(false)
    }

    pub fn series_kind(&self, sel: impl SeriesSelector) -> Result<ContainerKind> {
        let idx = sel.resolve(self)?;
        Ok(self.header(idx).data.kind())
    }

    /// Present-cell count of a series.
    pub fn size(&self, sel: impl SeriesSelector) -> Result<usize> {
        let idx = sel.resolve(self)?;
        Ok(self.header(idx).data.size())
    }

    /// Physical slot count of a series.
    pub fn capacity(&self, sel: impl SeriesSelector) -> Result<usize> {
        let idx = sel.resolve(self)?;
        Ok(self.header(idx).data.capacity())
    }

    /// Present cells over the row-id domain.
    pub fn load_factor(&self, sel: impl SeriesSelector) -> Result<f64> {
        let idx = sel.resolve(self)?;
        if self.validity.is_empty() {
            return Ok(0.0);
        }
        Ok(self.header(idx).data.size() as f64 / self.validity.len() as f64)
    }

    /// Switch a series between dense and sparse in place.
    pub fn convert(&mut self, sel: impl SeriesSelector, kind: ContainerKind) -> Result<()> {
        let idx = sel.resolve(self)?;
        self.header_mut(idx).data.convert(kind);
        Ok(())
    }

    // ── Cells ─────────────────────────────────────────────────────────

    /// Write a cell. `Value::None` erases it. The value type must match
    /// the series type.
    pub fn set(
        &mut self,
        sel: impl SeriesSelector,
        row: RowId,
        value: ValueRef<'_>,
        pool: &mut StringStore,
    ) -> Result<()> {
        let idx = sel.resolve(self)?;
        if row >= self.row_domain() {
            return Err(GraphError::RecordOutOfRange(row));
        }
        let header = self.series[idx].as_mut().expect("resolved index is live");
        // Writing the missing value erases the cell.
        if matches!(value, ValueRef::None) {
            header.data.erase(row);
            return Ok(());
        }
        match (&mut header.data, value) {
            (SeriesData::Bool(c), ValueRef::Bool(v)) => c.insert(row, v),
            (SeriesData::Int64(c), ValueRef::Int64(v)) => c.insert(row, v),
            (SeriesData::UInt64(c), ValueRef::UInt64(v)) => c.insert(row, v),
            (SeriesData::Double(c), ValueRef::Double(v)) => c.insert(row, v),
            (SeriesData::Str(c), ValueRef::Str(v)) => c.insert(row, StrHandle::new(v, pool)),
            (data, v) => {
                return Err(GraphError::TypeMismatch {
                    series: header.name.clone(),
                    expected: data.primitive_type(),
                    actual: v.primitive_type().expect("non-none checked above"),
                })
            }
        }
        Ok(())
    }

    pub fn set_str(
        &mut self,
        sel: impl SeriesSelector,
        row: RowId,
        value: &str,
        pool: &mut StringStore,
    ) -> Result<()> {
        self.set(sel, row, ValueRef::Str(value), pool)
    }

    pub fn set_bool(&mut self, sel: impl SeriesSelector, row: RowId, value: bool) -> Result<()> {
        let idx = self.writable_cell(sel, row, PrimitiveType::Bool)?;
        if let SeriesData::Bool(c) = &mut self.header_mut(idx).data {
            c.insert(row, value);
        }
        Ok(())
    }

    pub fn set_i64(&mut self, sel: impl SeriesSelector, row: RowId, value: i64) -> Result<()> {
        let idx = self.writable_cell(sel, row, PrimitiveType::Int64)?;
        if let SeriesData::Int64(c) = &mut self.header_mut(idx).data {
            c.insert(row, value);
        }
        Ok(())
    }

    pub fn set_u64(&mut self, sel: impl SeriesSelector, row: RowId, value: u64) -> Result<()> {
        let idx = self.writable_cell(sel, row, PrimitiveType::UInt64)?;
        if let SeriesData::UInt64(c) = &mut self.header_mut(idx).data {
            c.insert(row, value);
        }
        Ok(())
    }

    pub fn set_f64(&mut self, sel: impl SeriesSelector, row: RowId, value: f64) -> Result<()> {
        let idx = self.writable_cell(sel, row, PrimitiveType::Double)?;
        if let SeriesData::Double(c) = &mut self.header_mut(idx).data {
            c.insert(row, value);
        }
        Ok(())
    }

    /// Read a cell. Out-of-range rows and missing cells are errors;
    /// use [`RecordStore::is_none`] to probe.
    pub fn get<'a>(
        &'a self,
        sel: impl SeriesSelector,
        row: RowId,
        pool: &'a StringStore,
    ) -> Result<ValueRef<'a>> {
        let idx = sel.resolve(self)?;
        if row >= self.row_domain() {
            return Err(GraphError::RecordOutOfRange(row));
        }
        let header = self.header(idx);
        let missing = || GraphError::CellMissing {
            series: header.name.clone(),
            record: row,
        };
        if !self.contains_record(row) {
            return Err(missing());
        }
        let value = match &header.data {
            SeriesData::Bool(c) => ValueRef::Bool(*c.get(row).ok_or_else(missing)?),
            SeriesData::Int64(c) => ValueRef::Int64(*c.get(row).ok_or_else(missing)?),
            SeriesData::UInt64(c) => ValueRef::UInt64(*c.get(row).ok_or_else(missing)?),
            SeriesData::Double(c) => ValueRef::Double(*c.get(row).ok_or_else(missing)?),
            SeriesData::Str(c) => ValueRef::Str(c.get(row).ok_or_else(missing)?.as_str(pool)),
        };
        Ok(value)
    }

    pub fn get_str<'a>(
        &'a self,
        sel: impl SeriesSelector,
        row: RowId,
        pool: &'a StringStore,
    ) -> Result<&'a str> {
        let idx = self.readable_cell(sel, row, PrimitiveType::Str)?;
        if let SeriesData::Str(c) = &self.header(idx).data {
            if let Some(h) = c.get(row) {
                return Ok(h.as_str(pool));
            }
        }
        Err(self.missing(idx, row))
    }

    pub fn get_bool(&self, sel: impl SeriesSelector, row: RowId) -> Result<bool> {
        let idx = self.readable_cell(sel, row, PrimitiveType::Bool)?;
        if let SeriesData::Bool(c) = &self.header(idx).data {
            if let Some(v) = c.get(row) {
                return Ok(*v);
            }
        }
        Err(self.missing(idx, row))
    }

    pub fn get_i64(&self, sel: impl SeriesSelector, row: RowId) -> Result<i64> {
        let idx = self.readable_cell(sel, row, PrimitiveType::Int64)?;
        if let SeriesData::Int64(c) = &self.header(idx).data {
            if let Some(v) = c.get(row) {
                return Ok(*v);
            }
        }
        Err(self.missing(idx, row))
    }

    pub fn get_u64(&self, sel: impl SeriesSelector, row: RowId) -> Result<u64> {
        let idx = self.readable_cell(sel, row, PrimitiveType::UInt64)?;
        if let SeriesData::UInt64(c) = &self.header(idx).data {
            if let Some(v) = c.get(row) {
                return Ok(*v);
            }
        }
        Err(self.missing(idx, row))
    }

    pub fn get_f64(&self, sel: impl SeriesSelector, row: RowId) -> Result<f64> {
        let idx = self.readable_cell(sel, row, PrimitiveType::Double)?;
        if let SeriesData::Double(c) = &self.header(idx).data {
            if let Some(v) = c.get(row) {
                return Ok(*v);
            }
        }
        Err(self.missing(idx, row))
    }

    /// True iff the cell is missing: unknown series, out-of-range row,
    /// removed row, or absent cell.
    pub fn is_none(&self, sel: impl SeriesSelector, row: RowId) -> bool {
        let Ok(idx) = sel.resolve(self) else {
            return true;
        };
        if !self.contains_record(row) {
            return true;
        }
        !self.header(idx).data.contains(row)
    }

    /// Erase one cell; reports whether a value was present.
    pub fn remove(&mut self, sel: impl SeriesSelector, row: RowId) -> bool {
        match sel.resolve(self) {
            Ok(idx) => self.header_mut(idx).data.erase(row),
            Err(_) => false,
        }
    }

    // ── Iteration ─────────────────────────────────────────────────────

    /// Visit present cells of one series on live rows, in row order.
    pub fn for_all(
        &self,
        sel: impl SeriesSelector,
        pool: &StringStore,
        mut f: impl FnMut(RowId, ValueRef<'_>),
    ) -> Result<()> {
        let idx = sel.resolve(self)?;
        // remove_record also erases, but skip non-live rows regardless.
        match &self.header(idx).data {
            SeriesData::Bool(c) => c.for_each(|row, v| {
                if self.contains_record(row) {
                    f(row, ValueRef::Bool(*v))
                }
            }),
            SeriesData::Int64(c) => c.for_each(|row, v| {
                if self.contains_record(row) {
                    f(row, ValueRef::Int64(*v))
                }
            }),
            SeriesData::UInt64(c) => c.for_each(|row, v| {
                if self.contains_record(row) {
                    f(row, ValueRef::UInt64(*v))
                }
            }),
            SeriesData::Double(c) => c.for_each(|row, v| {
                if self.contains_record(row) {
                    f(row, ValueRef::Double(*v))
                }
            }),
            SeriesData::Str(c) => c.for_each(|row, v| {
                if self.contains_record(row) {
                    f(row, ValueRef::Str(v.as_str(pool)))
                }
            }),
        }
        Ok(())
    }

    /// Visit every live row id in order.
    pub fn for_all_rows(&self, mut f: impl FnMut(RowId)) {
        for (row, &live) in self.validity.iter().enumerate() {
            if live {
                f(row as RowId);
            }
        }
    }

    /// All cells of one row, positionally aligned with series indices.
    /// Missing cells (and tombstoned series slots) are `Value::None`.
    /// A removed row yields an empty vector.
    pub fn row_values(&self, row: RowId, pool: &StringStore) -> Vec<Value> {
        if !self.contains_record(row) {
            return Vec::new();
        }
        self.series
            .iter()
            .map(|slot| match slot {
                None => Value::None,
                Some(header) => match &header.data {
                    SeriesData::Bool(c) => {
                        c.get(row).map(|v| Value::Bool(*v)).unwrap_or(Value::None)
                    }
                    SeriesData::Int64(c) => {
                        c.get(row).map(|v| Value::Int64(*v)).unwrap_or(Value::None)
                    }
                    SeriesData::UInt64(c) => {
                        c.get(row).map(|v| Value::UInt64(*v)).unwrap_or(Value::None)
                    }
                    SeriesData::Double(c) => {
                        c.get(row).map(|v| Value::Double(*v)).unwrap_or(Value::None)
                    }
                    SeriesData::Str(c) => c
                        .get(row)
                        .map(|v| Value::Str(v.as_str(pool).to_string()))
                        .unwrap_or(Value::None),
                },
            })
            .collect()
    }

    /// Visit every live row with its full cell vector (positionally
    /// aligned with series indices, `Value::None` for absent cells). This
    /// allocates per row; prefer [`RecordStore::for_all`] in hot loops.
    pub fn for_all_dynamic(&self, pool: &StringStore, mut f: impl FnMut(RowId, Vec<Value>)) {
        self.for_all_rows(|row| f(row, self.row_values(row, pool)));
    }

    /// Invoke `f` on the cell iff the row is live and the cell present.
    /// Unknown series and removed rows are errors.
    pub fn visit_field(
        &self,
        name: &str,
        row: RowId,
        pool: &StringStore,
        f: impl FnOnce(ValueRef<'_>),
    ) -> Result<()> {
        let idx = name.resolve(self)?;
        if !self.contains_record(row) {
            return Err(GraphError::RecordOutOfRange(row));
        }
        match self.get(idx, row, pool) {
            Ok(v) => {
                f(v);
                Ok(())
            }
            Err(GraphError::CellMissing { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn header(&self, idx: SeriesIdx) -> &SeriesHeader {
        self.series[idx].as_ref().expect("resolved index is live")
    }

    fn header_mut(&mut self, idx: SeriesIdx) -> &mut SeriesHeader {
        self.series[idx].as_mut().expect("resolved index is live")
    }

    fn missing(&self, idx: SeriesIdx, row: RowId) -> GraphError {
        GraphError::CellMissing {
            series: self.header(idx).name.clone(),
            record: row,
        }
    }

    fn expect_type(&self, idx: SeriesIdx, wanted: PrimitiveType) -> Result<()> {
        let actual = self.header(idx).data.primitive_type();
        if actual != wanted {
            return Err(GraphError::TypeMismatch {
                series: self.header(idx).name.clone(),
                expected: wanted,
                actual,
            });
        }
        Ok(())
    }

    /// Resolve + bounds + type check for a typed write.
    fn writable_cell(
        &self,
        sel: impl SeriesSelector,
        row: RowId,
        wanted: PrimitiveType,
    ) -> Result<SeriesIdx> {
        let idx = sel.resolve(self)?;
        if row >= self.row_domain() {
            return Err(GraphError::RecordOutOfRange(row));
        }
        self.expect_type(idx, wanted)?;
        Ok(idx)
    }

    /// Resolve + bounds + liveness + type check for a typed read.
    fn readable_cell(
        &self,
        sel: impl SeriesSelector,
        row: RowId,
        wanted: PrimitiveType,
    ) -> Result<SeriesIdx> {
        let idx = sel.resolve(self)?;
        if row >= self.row_domain() {
            return Err(GraphError::RecordOutOfRange(row));
        }
        self.expect_type(idx, wanted)?;
        if !self.contains_record(row) {
            return Err(self.missing(idx, row));
        }
        Ok(idx)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_series() -> (RecordStore, StringStore) {
        let mut rs = RecordStore::new();
        rs.add_series("id", PrimitiveType::Str, ContainerKind::Dense);
        rs.add_series("age", PrimitiveType::Int64, ContainerKind::Dense);
        rs.add_series("score", PrimitiveType::Double, ContainerKind::Sparse);
        (rs, StringStore::new())
    }

    #[test]
    fn test_add_record_ids_monotonic() {
        let mut rs = RecordStore::new();
        let a = rs.add_record();
        let b = rs.add_record();
        let c = rs.add_record();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(rs.num_records(), 3);

        // Removed ids are never reused.
        rs.remove_record(b);
        let d = rs.add_record();
        assert_eq!(d, 3);
        assert_eq!(rs.num_records(), 3);
    }

    #[test]
    fn test_add_series_idempotent() {
        let mut rs = RecordStore::new();
        let a = rs.add_series("x", PrimitiveType::Int64, ContainerKind::Dense);
        let b = rs.add_series("x", PrimitiveType::Int64, ContainerKind::Dense);
        assert_eq!(a, b);
        assert_eq!(rs.num_series(), 1);
    }

    #[test]
    fn test_set_get_roundtrip() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        rs.set_str("id", row, "alice", &mut pool).unwrap();
        rs.set_i64("age", row, 30).unwrap();
        rs.set_f64("score", row, 0.5).unwrap();

        assert_eq!(rs.get_str("id", row, &pool).unwrap(), "alice");
        assert_eq!(rs.get_i64("age", row).unwrap(), 30);
        assert_eq!(rs.get_f64("score", row).unwrap(), 0.5);
    }

    #[test]
    fn test_type_mismatch_fails_loudly() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        let err = rs.set("age", row, ValueRef::Str("oops"), &mut pool);
        assert!(matches!(err, Err(GraphError::TypeMismatch { .. })));

        rs.set_i64("age", row, 1).unwrap();
        assert!(matches!(
            rs.get_str("age", row, &pool),
            Err(GraphError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_series_and_bad_rows() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();

        assert!(matches!(
            rs.set_i64("nope", row, 1),
            Err(GraphError::SeriesNotFound(_))
        ));
        assert!(matches!(
            rs.get("age", 99, &pool),
            Err(GraphError::RecordOutOfRange(99))
        ));
        assert!(matches!(
            rs.set("age", 99, ValueRef::Int64(1), &mut pool),
            Err(GraphError::RecordOutOfRange(99))
        ));
        // Probing is silent.
        assert!(rs.is_none("nope", row));
        assert!(rs.is_none("age", 99));
    }

    #[test]
    fn test_missing_cell_is_error_on_get() {
        let (mut rs, pool) = store_with_series();
        let row = rs.add_record();
        assert!(matches!(
            rs.get("age", row, &pool),
            Err(GraphError::CellMissing { .. })
        ));
        assert!(rs.is_none("age", row));
    }

    #[test]
    fn test_is_none_equivalence_invariant() {
        // is_none(s, r) <=> !live(r) || !contains(r)
        let (mut rs, mut pool) = store_with_series();
        let r0 = rs.add_record();
        let r1 = rs.add_record();
        rs.set_i64("age", r0, 10).unwrap();
        rs.set_i64("age", r1, 11).unwrap();

        assert!(!rs.is_none("age", r0));
        rs.remove("age", r0);
        assert!(rs.is_none("age", r0));

        // Removing the record flips is_none even though the cell existed.
        assert!(!rs.is_none("age", r1));
        rs.remove_record(r1);
        assert!(rs.is_none("age", r1));

        // And the sweep means the container agrees.
        rs.set_str("id", r0, "x", &mut pool).unwrap();
        rs.remove_record(r0);
        assert!(rs.is_none("id", r0));
    }

    #[test]
    fn test_remove_record_sweeps_all_series() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        rs.set_str("id", row, "bob", &mut pool).unwrap();
        rs.set_i64("age", row, 44).unwrap();

        assert!(rs.remove_record(row));
        assert_eq!(rs.num_records(), 0);
        assert_eq!(rs.size("id").unwrap(), 0);
        assert_eq!(rs.size("age").unwrap(), 0);
        // Idempotent on the validity bit.
        assert!(rs.remove_record(row));
        assert_eq!(rs.num_records(), 0);
    }

    #[test]
    fn test_remove_series_keeps_indices_stable() {
        let (mut rs, _) = store_with_series();
        let age_idx = rs.find_series("age").unwrap();
        let score_idx = rs.find_series("score").unwrap();

        assert!(rs.remove_series("id"));
        assert!(!rs.contains_series("id"));
        assert_eq!(rs.find_series("age"), Some(age_idx));
        assert_eq!(rs.find_series("score"), Some(score_idx));
        assert_eq!(rs.num_series(), 2);
        assert_eq!(rs.series_names(), vec!["age", "score"]);

        // A re-added name gets a fresh index.
        let new_idx = rs.add_series("id", PrimitiveType::Str, ContainerKind::Dense);
        assert!(new_idx > score_idx);
    }

    #[test]
    fn test_for_all_skips_removed_rows() {
        let (mut rs, pool) = store_with_series();
        let r0 = rs.add_record();
        let r1 = rs.add_record();
        let r2 = rs.add_record();
        rs.set_i64("age", r0, 1).unwrap();
        rs.set_i64("age", r1, 2).unwrap();
        rs.set_i64("age", r2, 3).unwrap();
        rs.remove_record(r1);

        let mut seen = Vec::new();
        rs.for_all("age", &pool, |row, v| {
            if let ValueRef::Int64(v) = v {
                seen.push((row, v));
            }
        })
        .unwrap();
        assert_eq!(seen, vec![(0, 1), (2, 3)]);

        let mut rows = Vec::new();
        rs.for_all_rows(|r| rows.push(r));
        assert_eq!(rows, vec![0, 2]);
    }

    #[test]
    fn test_row_values_with_missing_sentinel() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        rs.set_str("id", row, "carol", &mut pool).unwrap();
        rs.set_f64("score", row, 2.5).unwrap();

        let vals = rs.row_values(row, &pool);
        assert_eq!(vals.len(), 3);
        assert_eq!(vals[0], Value::Str("carol".into()));
        assert_eq!(vals[1], Value::None);
        assert_eq!(vals[2], Value::Double(2.5));

        rs.remove_record(row);
        assert!(rs.row_values(row, &pool).is_empty());
    }

    #[test]
    fn test_for_all_dynamic_rows() {
        let (mut rs, mut pool) = store_with_series();
        let r0 = rs.add_record();
        let r1 = rs.add_record();
        rs.set_str("id", r0, "x", &mut pool).unwrap();
        rs.set_i64("age", r1, 5).unwrap();
        rs.remove_record(r0);

        let mut seen = Vec::new();
        rs.for_all_dynamic(&pool, |row, cells| seen.push((row, cells)));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, r1);
        assert_eq!(
            seen[0].1,
            vec![Value::None, Value::Int64(5), Value::None]
        );
    }

    #[test]
    fn test_visit_field() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        rs.set_str("id", row, "dave", &mut pool).unwrap();

        let mut got = None;
        rs.visit_field("id", row, &pool, |v| {
            if let ValueRef::Str(s) = v {
                got = Some(s.to_string());
            }
        })
        .unwrap();
        assert_eq!(got.as_deref(), Some("dave"));

        // Absent cell: visitor not invoked, no error.
        let mut called = false;
        rs.visit_field("age", row, &pool, |_| called = true).unwrap();
        assert!(!called);

        assert!(rs.visit_field("nope", row, &pool, |_| {}).is_err());
    }

    #[test]
    fn test_sparse_series_load_factor_and_convert() {
        let mut rs = RecordStore::new();
        rs.add_series("s", PrimitiveType::Int64, ContainerKind::Sparse);
        for _ in 0..1001 {
            rs.add_record();
        }
        let mut pool = StringStore::new();
        rs.set("s", 0, ValueRef::Int64(10), &mut pool).unwrap();
        rs.set("s", 100, ValueRef::Int64(20), &mut pool).unwrap();
        rs.set("s", 1000, ValueRef::Int64(30), &mut pool).unwrap();

        assert_eq!(rs.size("s").unwrap(), 3);
        assert!((rs.load_factor("s").unwrap() - 3.0 / 1001.0).abs() < 1e-12);

        rs.convert("s", ContainerKind::Dense).unwrap();
        assert_eq!(rs.get_i64("s", 100).unwrap(), 20);
        assert_eq!(rs.size("s").unwrap(), 3);
        assert!(rs.capacity("s").unwrap() >= 1001);

        rs.convert("s", ContainerKind::Sparse).unwrap();
        assert_eq!(rs.get_i64("s", 1000).unwrap(), 30);
        assert_eq!(rs.capacity("s").unwrap(), 3);
    }

    #[test]
    fn test_set_none_erases() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        rs.set_i64("age", row, 9).unwrap();
        rs.set("age", row, ValueRef::None, &mut pool).unwrap();
        assert!(rs.is_none("age", row));
    }

    #[test]
    fn test_serde_roundtrip() {
        let (mut rs, mut pool) = store_with_series();
        let row = rs.add_record();
        rs.set_str("id", row, "a-rather-long-identifier-string", &mut pool)
            .unwrap();
        rs.set_i64("age", row, 7).unwrap();
        rs.remove_series("score");

        let rs_bytes = bincode::serialize(&rs).unwrap();
        let pool_bytes = bincode::serialize(&pool).unwrap();
        let rs2: RecordStore = bincode::deserialize(&rs_bytes).unwrap();
        let pool2: StringStore = bincode::deserialize(&pool_bytes).unwrap();

        assert_eq!(rs2.num_records(), 1);
        assert_eq!(rs2.num_series(), 2);
        assert_eq!(
            rs2.get_str("id", row, &pool2).unwrap(),
            "a-rather-long-identifier-string"
        );
        assert_eq!(rs2.get_i64("age", row).unwrap(), 7);
    }
}
