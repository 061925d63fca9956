//! Table over a host-provided value array.
//!
//! `array` exposes a shared `Vec<Value>` owned by host code as a
//! one-column table. The host binds the vector as a pointer-tagged value
//! (see [`bind_array`]) against the hidden `ptr` column; the engine
//! carries the pointer through planning into the cursor's filter call, so
//! the rows are never copied.
//!
//! ```
//! use std::sync::Arc;
//! use vtab_bridge_core::{Constraint, ConstraintOp, Value};
//! use vtab_bridge_registry::Registry;
//! use vtab_bridge_modules::array;
//!
//! let mut registry = Registry::new();
//! array::load_module(&mut registry).unwrap();
//!
//! let data: array::Array = Arc::new(vec![Value::Integer(1), Value::Integer(2)]);
//! let table = registry.connect_table("array", &[]).unwrap();
//! let (plan, _) = registry
//!     .best_index(table, vec![Constraint::usable(1, ConstraintOp::Eq)], vec![])
//!     .unwrap();
//!
//! let cursor = registry.open(table).unwrap();
//! registry
//!     .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[array::bind_array(data)])
//!     .unwrap();
//! assert_eq!(registry.column_value(cursor, 0).unwrap(), Value::Integer(1));
//! ```

use std::sync::Arc;

use vtab_bridge_core::{
    ColumnDef, ColumnSink, ConstraintOp, FULL_SCAN_COST, IndexInfo, Result, TableSchema,
    TypeAffinity, Value, ValueVector,
};
use vtab_bridge_registry::{Module, Registry, TableCursor, VirtualTable};

/// Pointer tag identifying array bindings.
pub const ARRAY_TAG: &str = "array";

/// Array parameter type shared between host code and cursors.
pub type Array = Arc<Vec<Value>>;

/// Plan id: a pointer binding is present in argv slot 1.
const PLAN_POINTER: i32 = 1;

/// Registers the module under the name `array` (eponymous-only).
pub fn load_module(registry: &mut Registry) -> Result<()> {
    registry.register("array", Module::<ArrayTable>::new(), None, true)
}

/// Wraps a shared value vector for binding against the `ptr` column.
#[must_use]
pub fn bind_array(array: Array) -> Value {
    Value::pointer(ARRAY_TAG, array)
}

/// The array virtual table. Stateless: the backing vector arrives through
/// the filter arguments.
pub struct ArrayTable;

impl VirtualTable for ArrayTable {
    type Aux = ();
    type Cursor = ArrayCursor;

    fn connect(_aux: Option<&()>, _args: &[String]) -> Result<(TableSchema, Self)> {
        let schema = TableSchema::new()
            .with_column(ColumnDef::new("value", TypeAffinity::Any))
            .with_column(ColumnDef::new("ptr", TypeAffinity::Blob).hidden());
        Ok((schema, ArrayTable))
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        let ptr = info
            .constraints()
            .iter()
            .position(|c| c.usable && c.column == 1 && c.op == ConstraintOp::Eq);
        match ptr {
            Some(i) => {
                info.constraint_usage(i).argv_index = 1;
                info.constraint_usage(i).omit = true;
                info.set_idx_num(PLAN_POINTER);
                info.set_estimated_cost(1.0);
                info.set_estimated_rows(100);
            }
            None => {
                // Without a binding the table is empty; make sure any
                // bound plan wins.
                info.set_idx_num(0);
                info.set_estimated_cost(FULL_SCAN_COST);
                info.set_estimated_rows(1);
            }
        }
        Ok(())
    }

    fn open(&mut self) -> Result<ArrayCursor> {
        Ok(ArrayCursor::default())
    }
}

/// Cursor over one bound array (or nothing, when unbound).
#[derive(Default)]
pub struct ArrayCursor {
    rows: Option<Array>,
    pos: usize,
}

impl ArrayCursor {
    fn len(&self) -> usize {
        self.rows.as_ref().map_or(0, |rows| rows.len())
    }
}

impl TableCursor for ArrayCursor {
    fn filter(&mut self, idx_num: i32, _idx_str: Option<&str>, args: &ValueVector<'_>) -> Result<()> {
        self.rows = if idx_num == PLAN_POINTER {
            args.pointer::<Vec<Value>>(0, ARRAY_TAG)
        } else {
            None
        };
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.len()
    }

    fn column(&self, sink: &mut ColumnSink, i: usize) -> Result<()> {
        if i == 0 {
            if let Some(rows) = &self.rows {
                if let Some(value) = rows.get(self.pos) {
                    sink.set_result(value.clone());
                }
            }
        }
        // The hidden ptr column reads back as NULL.
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.pos as i64 + 1)
    }
}
