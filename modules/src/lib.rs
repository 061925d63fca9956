//! Concrete virtual table modules for vtab-bridge.
//!
//! Four modules exercising the full protocol surface:
//!
//! - [`series`] — numeric-range generator with hidden bound columns and
//!   bidirectional order consumption.
//! - [`array`] — read-only view over a host-owned value vector bound
//!   through a pointer-tagged value.
//! - [`logtable`] — fixed-row-count diagnostics table that traces every
//!   callback.
//! - [`memtable`] — writable in-memory table with rowid point lookups,
//!   JSON-encoded column-filter plans, and shape-dispatched mutation.
//!
//! Each module exposes a `load_module` function that registers it under
//! its canonical name.
//!
//! # Example
//!
//! ```
//! use vtab_bridge_core::{Constraint, ConstraintOp, Value};
//! use vtab_bridge_registry::Registry;
//!
//! let mut registry = Registry::new();
//! vtab_bridge_modules::series::load_module(&mut registry).unwrap();
//!
//! let table = registry.connect_table("series", &[]).unwrap();
//! let (plan, _usages) = registry
//!     .best_index(
//!         table,
//!         vec![
//!             Constraint::usable(1, ConstraintOp::Eq),
//!             Constraint::usable(2, ConstraintOp::Eq),
//!         ],
//!         vec![],
//!     )
//!     .unwrap();
//!
//! let cursor = registry.open(table).unwrap();
//! registry
//!     .filter(
//!         cursor,
//!         plan.idx_num,
//!         plan.idx_str.as_deref(),
//!         &[Value::Integer(1), Value::Integer(3)],
//!     )
//!     .unwrap();
//!
//! let mut values = Vec::new();
//! while !registry.eof(cursor).unwrap() {
//!     values.push(registry.column_value(cursor, 0).unwrap());
//!     registry.next(cursor).unwrap();
//! }
//! assert_eq!(values, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
//! ```

pub mod array;
pub mod logtable;
pub mod memtable;
pub mod series;
