//! Writable in-memory table module.
//!
//! `memtable` stores rows in a shared ordered map keyed by row
//! identifier. Column names come from the module arguments, one per
//! argument:
//!
//! ```text
//! CREATE VIRTUAL TABLE people USING memtable(name, score)
//! ```
//!
//! Cursors share the row store with the table through an `Arc`, but each
//! filter call snapshots the matching rows, so a cursor's iteration
//! order and content are unaffected by concurrent mutations through the
//! table handle.
//!
//! Planning supports three strategies, encoded as a discriminant in the
//! plan id:
//!
//! - **rowid point lookup** — a usable `rowid = ?` constraint; at most
//!   one row, flagged unique.
//! - **column filter** — usable comparison constraints on regular
//!   columns, serialized into the plan string as JSON and re-read by the
//!   filter call (the plan string is the only state that crosses over).
//! - **full scan** — always valid, priced to lose against the others.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use vtab_bridge_core::{
    BridgeError, ColumnDef, ColumnSink, ConstraintOp, IndexInfo, ROWID_COLUMN, Result, ScanFlags,
    TableSchema, TypeAffinity, Value, ValueVector,
};
use vtab_bridge_registry::{
    CreatableTable, Module, Registry, TableCursor, TableKind, VirtualTable, WritableTable,
};

/// Plan id: unconstrained scan in rowid order.
const PLAN_SCAN: i32 = 0;
/// Plan id: rowid point lookup, argument 1 is the rowid.
const PLAN_ROWID: i32 = 1;
/// Plan id: column comparisons described by the plan string.
const PLAN_COLUMNS: i32 = 2;

/// Cost of the fallback scan; constrained plans must undercut this.
const SCAN_COST: f64 = 1e6;

/// Registers the module under the name `memtable` (creatable, writable).
pub fn load_module(registry: &mut Registry) -> Result<()> {
    registry.register("memtable", Module::<MemTable>::new().with_update(), None, false)
}

/// One comparison term of a column-filter plan.
#[derive(Debug, Serialize, Deserialize)]
struct FilterTerm {
    column: usize,
    op: ConstraintOp,
}

/// The column-filter plan carried in the plan string.
#[derive(Debug, Serialize, Deserialize)]
struct FilterSpec {
    terms: Vec<FilterTerm>,
}

struct MemRows {
    rows: BTreeMap<i64, Vec<Value>>,
    next_rowid: i64,
}

/// The writable in-memory virtual table.
pub struct MemTable {
    columns: usize,
    rows: Arc<Mutex<MemRows>>,
}

impl MemTable {
    fn lock(&self) -> MutexGuard<'_, MemRows> {
        // A poisoned lock means a panic elsewhere already tore the
        // process state; propagate the data regardless.
        self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn supported_op(op: ConstraintOp) -> bool {
    matches!(
        op,
        ConstraintOp::Eq
            | ConstraintOp::Ne
            | ConstraintOp::Gt
            | ConstraintOp::Ge
            | ConstraintOp::Lt
            | ConstraintOp::Le
    )
}

/// Orders two values of comparable storage classes; integers and reals
/// compare numerically across classes.
fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b),
        (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// SQL comparison semantics: anything involving NULL, or values of
/// incomparable classes, matches nothing.
fn term_matches(lhs: &Value, op: ConstraintOp, rhs: &Value) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return false;
    }
    let Some(ordering) = compare(lhs, rhs) else {
        return false;
    };
    match op {
        ConstraintOp::Eq => ordering == Ordering::Equal,
        ConstraintOp::Ne => ordering != Ordering::Equal,
        ConstraintOp::Gt => ordering == Ordering::Greater,
        ConstraintOp::Ge => ordering != Ordering::Less,
        ConstraintOp::Lt => ordering == Ordering::Less,
        ConstraintOp::Le => ordering != Ordering::Greater,
        _ => false,
    }
}

impl VirtualTable for MemTable {
    type Aux = ();
    type Cursor = MemCursor;

    fn connect(_aux: Option<&()>, raw_args: &[String]) -> Result<(TableSchema, Self)> {
        if raw_args.is_empty() {
            return Err(BridgeError::module("memtable requires at least one column name"));
        }
        let mut schema = TableSchema::new();
        for name in raw_args {
            schema = schema.with_column(ColumnDef::new(name.trim(), TypeAffinity::Any));
        }
        let table = MemTable {
            columns: raw_args.len(),
            rows: Arc::new(Mutex::new(MemRows { rows: BTreeMap::new(), next_rowid: 1 })),
        };
        Ok((schema, table))
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        let mut rowid_eq = None;
        let mut terms: Vec<(usize, FilterTerm)> = Vec::new();
        for (i, constraint) in info.constraints().iter().enumerate() {
            if !constraint.usable {
                continue;
            }
            if constraint.column == ROWID_COLUMN && constraint.op == ConstraintOp::Eq {
                if rowid_eq.is_none() {
                    rowid_eq = Some(i);
                }
            } else if constraint.column >= 0
                && (constraint.column as usize) < self.columns
                && supported_op(constraint.op)
            {
                terms.push((
                    i,
                    FilterTerm { column: constraint.column as usize, op: constraint.op },
                ));
            }
        }

        if let Some(i) = rowid_eq {
            info.constraint_usage(i).argv_index = 1;
            info.constraint_usage(i).omit = true;
            info.set_idx_num(PLAN_ROWID);
            info.set_estimated_cost(1.0);
            info.set_estimated_rows(1);
            info.set_flags(ScanFlags::UNIQUE);
        } else if !terms.is_empty() {
            // More consumed comparisons mean a cheaper plan and fewer
            // expected rows; equality narrows harder than a range.
            let eq_terms = terms.iter().filter(|(_, t)| t.op == ConstraintOp::Eq).count();
            let cost = SCAN_COST / (terms.len() as f64 + 3.0 * eq_terms as f64 + 1.0);
            let rows = (1000_i64 >> terms.len().min(8)).max(1);

            let mut spec = FilterSpec { terms: Vec::with_capacity(terms.len()) };
            for (argv, (i, term)) in (1..).zip(terms) {
                info.constraint_usage(i).argv_index = argv;
                info.constraint_usage(i).omit = true;
                spec.terms.push(term);
            }
            let encoded = serde_json::to_string(&spec)
                .map_err(|e| BridgeError::module(format!("cannot encode filter plan: {e}")))?;
            info.set_idx_num(PLAN_COLUMNS);
            info.set_idx_str(encoded);
            info.set_estimated_cost(cost);
            info.set_estimated_rows(rows);
        } else {
            info.set_idx_num(PLAN_SCAN);
            info.set_estimated_cost(SCAN_COST);
            info.set_estimated_rows(1000);
        }

        // Natural production order is ascending rowid for every plan.
        if info.num_of_order_by() == 1 {
            let order = info.order_bys()[0];
            if order.column == ROWID_COLUMN && !order.desc {
                info.set_order_by_consumed(true);
            }
        }
        Ok(())
    }

    fn open(&mut self) -> Result<MemCursor> {
        Ok(MemCursor {
            rows: Arc::clone(&self.rows),
            snapshot: Vec::new(),
            pos: 0,
        })
    }
}

impl CreatableTable for MemTable {
    const KIND: TableKind = TableKind::Default;

    fn destroy(&self) -> Result<()> {
        let mut guard = self.lock();
        guard.rows.clear();
        Ok(())
    }
}

impl WritableTable for MemTable {
    fn delete(&mut self, rowid: &Value) -> Result<()> {
        let id = rowid_value(rowid)?;
        let mut guard = self.lock();
        if guard.rows.remove(&id).is_none() {
            return Err(BridgeError::not_found(format!("no row with rowid {id}")));
        }
        Ok(())
    }

    fn insert(&mut self, values: &ValueVector<'_>) -> Result<i64> {
        let row = self.row_from_values(values)?;
        let mut guard = self.lock();
        let id = guard.next_rowid;
        guard.next_rowid += 1;
        guard.rows.insert(id, row);
        Ok(id)
    }

    fn update(&mut self, rowid: &Value, values: &ValueVector<'_>) -> Result<()> {
        let id = rowid_value(rowid)?;
        let row = self.row_from_values(values)?;
        let mut guard = self.lock();
        match guard.rows.get_mut(&id) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(BridgeError::not_found(format!("no row with rowid {id}"))),
        }
    }
}

impl MemTable {
    fn row_from_values(&self, values: &ValueVector<'_>) -> Result<Vec<Value>> {
        if values.len() != self.columns {
            return Err(BridgeError::constraint(format!(
                "expected {} column values, got {}",
                self.columns,
                values.len()
            )));
        }
        Ok(values.iter().cloned().collect())
    }
}

fn rowid_value(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(id) => Ok(*id),
        other => Err(BridgeError::constraint(format!(
            "row identifier must be an integer, got {}",
            other.value_type()
        ))),
    }
}

/// Cursor over a snapshot of matching rows, in ascending rowid order.
pub struct MemCursor {
    rows: Arc<Mutex<MemRows>>,
    snapshot: Vec<(i64, Vec<Value>)>,
    pos: usize,
}

impl MemCursor {
    fn lock(&self) -> MutexGuard<'_, MemRows> {
        self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn current(&self) -> Result<&(i64, Vec<Value>)> {
        self.snapshot
            .get(self.pos)
            .ok_or_else(|| BridgeError::module("cursor is past the end of its data"))
    }
}

impl TableCursor for MemCursor {
    fn filter(&mut self, idx_num: i32, idx_str: Option<&str>, args: &ValueVector<'_>) -> Result<()> {
        self.pos = 0;
        self.snapshot.clear();
        match idx_num {
            PLAN_ROWID => {
                if args.len() != 1 {
                    return Err(BridgeError::module(format!(
                        "rowid plan expects exactly one argument, got {}",
                        args.len()
                    )));
                }
                let wanted: Option<i64> = args.get(0)?;
                if let Some(id) = wanted {
                    let guard = self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    if let Some(row) = guard.rows.get(&id) {
                        self.snapshot.push((id, row.clone()));
                    }
                }
            }
            PLAN_COLUMNS => {
                let encoded = idx_str.ok_or_else(|| {
                    BridgeError::module("column-filter plan is missing its plan string")
                })?;
                let spec: FilterSpec = serde_json::from_str(encoded)
                    .map_err(|e| BridgeError::module(format!("cannot decode filter plan: {e}")))?;
                if spec.terms.len() != args.len() {
                    return Err(BridgeError::module(format!(
                        "filter plan expects {} arguments, got {}",
                        spec.terms.len(),
                        args.len()
                    )));
                }
                let guard = self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                'rows: for (&id, row) in &guard.rows {
                    for (term, bound) in spec.terms.iter().zip(args.iter()) {
                        let cell = row.get(term.column).unwrap_or(&Value::Null);
                        if !term_matches(cell, term.op, bound) {
                            continue 'rows;
                        }
                    }
                    self.snapshot.push((id, row.clone()));
                }
            }
            PLAN_SCAN => {
                let guard = self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                self.snapshot
                    .extend(guard.rows.iter().map(|(&id, row)| (id, row.clone())));
            }
            other => {
                return Err(BridgeError::module(format!("unknown plan id {other}")));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.snapshot.len()
    }

    fn column(&self, sink: &mut ColumnSink, i: usize) -> Result<()> {
        let (_, row) = self.current()?;
        match row.get(i) {
            Some(value) => {
                sink.set_result(value.clone());
                Ok(())
            }
            None => Err(BridgeError::module(format!("no column {i} in this table"))),
        }
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.current()?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_matching_follows_sql_null_semantics() {
        assert!(!term_matches(&Value::Null, ConstraintOp::Eq, &Value::Null));
        assert!(!term_matches(&Value::Integer(1), ConstraintOp::Eq, &Value::Null));
        assert!(term_matches(&Value::Integer(1), ConstraintOp::Eq, &Value::Integer(1)));
    }

    #[test]
    fn test_numeric_comparison_crosses_storage_classes() {
        assert!(term_matches(&Value::Integer(2), ConstraintOp::Gt, &Value::Real(1.5)));
        assert!(term_matches(&Value::Real(1.0), ConstraintOp::Eq, &Value::Integer(1)));
        assert!(!term_matches(&Value::from("2"), ConstraintOp::Eq, &Value::Integer(2)));
    }

    #[test]
    fn test_filter_spec_round_trips_through_json() {
        let spec = FilterSpec {
            terms: vec![
                FilterTerm { column: 0, op: ConstraintOp::Eq },
                FilterTerm { column: 2, op: ConstraintOp::Le },
            ],
        };
        let encoded = serde_json::to_string(&spec).unwrap();
        let decoded: FilterSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.terms.len(), 2);
        assert_eq!(decoded.terms[1].column, 2);
        assert_eq!(decoded.terms[1].op, ConstraintOp::Le);
    }
}
