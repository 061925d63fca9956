//! Core types for the vtab-bridge virtual table protocol.
//!
//! This crate defines the data model exchanged between an embedded SQL
//! engine and host-implemented table modules:
//!
//! - [`Value`], [`ValueVector`] — dynamically-typed scalars and the
//!   read-only argument view handed to each callback.
//! - [`Constraint`], [`OrderBy`], [`ConstraintUsage`], [`IndexInfo`],
//!   [`IndexPlan`] — the query-planning records flowing through the
//!   best-index callback.
//! - [`TableSchema`], [`ColumnDef`] — the logical schema a module
//!   declares on connect.
//! - [`BridgeError`], [`StatusCode`] — the failure taxonomy and the
//!   closed status-code set the engine interprets structurally.
//! - [`args`] — `key=value` module-argument parsing.
//!
//! The capability traits and the registry that drives them live in
//! `vtab-bridge-registry`; concrete table modules live in
//! `vtab-bridge-modules`.
//!
//! # Example
//!
//! ```
//! use vtab_bridge_core::*;
//!
//! // The engine plans `SELECT * FROM t WHERE x = ? ORDER BY x`:
//! let mut info = IndexInfo::new(
//!     vec![Constraint::usable(0, ConstraintOp::Eq)],
//!     vec![OrderBy::new(0, false)],
//! );
//!
//! // A module consumes the equality constraint and keeps the order:
//! info.constraint_usage(0).argv_index = 1;
//! info.constraint_usage(0).omit = true;
//! info.set_idx_num(1);
//! info.set_estimated_cost(10.0);
//! info.set_order_by_consumed(true);
//!
//! let (plan, _usages) = info.into_outcome().unwrap();
//! assert!(plan.estimated_cost < FULL_SCAN_COST);
//! assert!(plan.order_by_consumed);
//! ```

pub mod args;
mod error;
mod plan;
mod schema;
mod value;

pub use error::{BridgeError, Result, StatusCode};
pub use plan::{
    Constraint, ConstraintOp, ConstraintUsage, FULL_SCAN_COST, IndexInfo, IndexPlan, OrderBy,
    ROWID_COLUMN, ScanFlags,
};
pub use schema::{ColumnDef, SchemaError, TableSchema, TypeAffinity};
pub use value::{ColumnSink, FromValue, FromValueError, PointerValue, Value, ValueType, ValueVector};
