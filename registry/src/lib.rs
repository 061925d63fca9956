//! Module registry and cursor protocol for vtab-bridge virtual tables.
//!
//! Follow these steps to implement and use a virtual table:
//!
//! 1. Implement the [`VirtualTable`] and [`TableCursor`] traits (and
//!    [`CreatableTable`] / [`WritableTable`] for the optional
//!    capabilities).
//! 2. Build a [`Module`] for the table type: [`Module::new()`], then
//!    chain [`with_create`](Module::with_create) /
//!    [`with_update`](Module::with_update) as needed.
//! 3. Install it with [`Registry::register`].
//! 4. Drive queries through the registry: connect, plan with
//!    [`Registry::best_index`], then iterate a cursor with
//!    filter/next/eof/column/rowid.
//!
//! The registry is the engine-facing adapter: it owns table and cursor
//! handles in generation-checked arena slots, enforces the cursor calling
//! order, validates planning output, reference-counts cursors against
//! their tables, and converts every module failure into a status code
//! plus a message on the owning table handle before it crosses back to
//! the caller.
//!
//! All handle state crosses the boundary as plain Rust values — the
//! engine-side structures are never shared memory, so modules cannot
//! corrupt registry bookkeeping and the registry cannot dangle module
//! state.

mod arena;
mod module;
mod registry;

pub use module::{CreatableTable, Module, TableCursor, TableKind, VirtualTable, WritableTable};
pub use registry::{CursorHandle, Registry, TableHandle};
