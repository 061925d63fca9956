//! The engine-facing module registry.
//!
//! The registry owns every table and cursor handle in generation-checked
//! arena slots and drives registered modules through their callback
//! slots. It enforces the parts of the protocol the engine normally
//! guarantees — calling order within a cursor, argv-slot validity of a
//! plan, reference counting between a table and its cursors — so a
//! misbehaving caller gets a misuse-class error instead of undefined
//! behavior.
//!
//! # Example
//!
//! ```
//! use vtab_bridge_core::*;
//! use vtab_bridge_registry::*;
//!
//! struct OneRow;
//! struct OneRowCursor { done: bool }
//!
//! impl VirtualTable for OneRow {
//!     type Aux = ();
//!     type Cursor = OneRowCursor;
//!
//!     fn connect(_aux: Option<&()>, _args: &[String]) -> Result<(TableSchema, Self)> {
//!         let schema = TableSchema::new()
//!             .with_column(ColumnDef::new("value", TypeAffinity::Integer));
//!         Ok((schema, OneRow))
//!     }
//!
//!     fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
//!         info.set_estimated_cost(1.0);
//!         info.set_estimated_rows(1);
//!         Ok(())
//!     }
//!
//!     fn open(&mut self) -> Result<OneRowCursor> {
//!         Ok(OneRowCursor { done: false })
//!     }
//! }
//!
//! impl TableCursor for OneRowCursor {
//!     fn filter(&mut self, _: i32, _: Option<&str>, _: &ValueVector<'_>) -> Result<()> {
//!         self.done = false;
//!         Ok(())
//!     }
//!     fn next(&mut self) -> Result<()> {
//!         self.done = true;
//!         Ok(())
//!     }
//!     fn eof(&self) -> bool {
//!         self.done
//!     }
//!     fn column(&self, sink: &mut ColumnSink, _i: usize) -> Result<()> {
//!         sink.set_result(42_i64);
//!         Ok(())
//!     }
//!     fn rowid(&self) -> Result<i64> {
//!         Ok(0)
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register("one_row", Module::<OneRow>::new(), None, true).unwrap();
//!
//! let table = registry.connect_table("one_row", &[]).unwrap();
//! let cursor = registry.open(table).unwrap();
//! registry.filter(cursor, 0, None, &[]).unwrap();
//! assert!(!registry.eof(cursor).unwrap());
//! assert_eq!(registry.column_value(cursor, 0).unwrap(), Value::Integer(42));
//! registry.close(cursor).unwrap();
//! registry.disconnect(table).unwrap();
//! ```

use std::collections::HashMap;

use tracing::{debug, warn};
use vtab_bridge_core::{
    BridgeError, ColumnSink, Constraint, ConstraintUsage, IndexInfo, IndexPlan, OrderBy, Result,
    TableSchema, Value, ValueVector,
};

use crate::arena::{Arena, RawHandle};
use crate::module::{CursorState, Module, ModuleSlots, TableState, VirtualTable};

/// Opaque handle to a connected table instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableHandle(RawHandle);

/// Opaque handle to an open cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(RawHandle);

struct RegisteredModule {
    slots: ModuleSlots,
    aux: Option<Box<dyn std::any::Any + Send + Sync>>,
}

struct TableSlot {
    module_name: String,
    slots: ModuleSlots,
    state: TableState,
    schema: TableSchema,
    ref_count: usize,
    last_error: Option<String>,
}

/// Protocol phase of a cursor, tracked by the registry.
///
/// Normal exhaustion is the module cursor's own eof predicate; the
/// `Exhausted` phase here marks a cursor killed by a failure or a
/// protocol-misuse call, so iteration terminates instead of looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorPhase {
    Open,
    Positioned,
    Exhausted,
}

struct CursorSlot {
    table: TableHandle,
    slots: ModuleSlots,
    state: CursorState,
    phase: CursorPhase,
}

fn stale_table() -> BridgeError {
    BridgeError::misuse("stale or freed table handle")
}

fn stale_cursor() -> BridgeError {
    BridgeError::misuse("stale or closed cursor handle")
}

/// Registry of virtual table modules and owner of all handle state.
pub struct Registry {
    modules: HashMap<String, RegisteredModule>,
    tables: Arena<TableSlot>,
    cursors: Arena<CursorSlot>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            tables: Arena::new(),
            cursors: Arena::new(),
        }
    }

    /// Installs a module's callback slots under `name`.
    ///
    /// `aux` is shared, read-only client data every instance of the
    /// module sees on connect. With `eponymous_only` the module's
    /// create/destroy slots (if any) are stripped, making it usable only
    /// directly — without an explicit creation step.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateModule`] if `name` is taken.
    pub fn register<T: VirtualTable>(
        &mut self,
        name: &str,
        module: Module<T>,
        aux: Option<T::Aux>,
        eponymous_only: bool,
    ) -> Result<()> {
        if self.modules.contains_key(name) {
            return Err(BridgeError::DuplicateModule(name.to_string()));
        }
        let mut slots = module.into_slots();
        if eponymous_only {
            slots.create = None;
            slots.destroy = None;
        }
        debug!(module = name, eponymous_only, "registered table module");
        self.modules.insert(
            name.to_string(),
            RegisteredModule {
                slots,
                aux: aux.map(|a| Box::new(a) as Box<dyn std::any::Any + Send + Sync>),
            },
        );
        Ok(())
    }

    /// Returns `true` when a module is registered under `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Connects to a table of the named module.
    ///
    /// The module declares its logical schema; the declaration is
    /// validated before a handle is produced, so a failed declaration
    /// never yields a live handle.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownModule`] for an unregistered name, or the
    /// module's own connect/declaration failure.
    pub fn connect_table(&mut self, name: &str, args: &[String]) -> Result<TableHandle> {
        self.instantiate(name, args, false)
    }

    /// Creates a table of the named module (the explicit-creation path of
    /// a creatable module).
    ///
    /// # Errors
    ///
    /// [`BridgeError::Misuse`] when the module is eponymous-only,
    /// otherwise as [`connect_table`](Registry::connect_table).
    pub fn create_table(&mut self, name: &str, args: &[String]) -> Result<TableHandle> {
        self.instantiate(name, args, true)
    }

    fn instantiate(&mut self, name: &str, args: &[String], create: bool) -> Result<TableHandle> {
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| BridgeError::UnknownModule(name.to_string()))?;
        let entry = if create {
            module.slots.create.ok_or_else(|| {
                BridgeError::misuse(format!("module '{name}' cannot be explicitly created"))
            })?
        } else {
            module.slots.connect
        };
        let (schema, state) = entry(module.aux.as_deref(), args)?;
        schema.validate()?;
        let slots = module.slots;
        let handle = TableHandle(self.tables.insert(TableSlot {
            module_name: name.to_string(),
            slots,
            state,
            schema,
            ref_count: 0,
            last_error: None,
        }));
        debug!(module = name, table = ?handle, create, "instantiated virtual table");
        Ok(handle)
    }

    /// Runs the module's planning callback for one candidate query.
    ///
    /// Builds the planning boundary object from the engine's constraints
    /// and ordering request, and validates the module's argv-slot
    /// assignment before handing the plan back.
    ///
    /// # Errors
    ///
    /// The module's planning failure, or [`BridgeError::Misuse`] when the
    /// returned argv assignment is invalid.
    pub fn best_index(
        &mut self,
        table: TableHandle,
        constraints: Vec<Constraint>,
        order_by: Vec<OrderBy>,
    ) -> Result<(IndexPlan, Vec<ConstraintUsage>)> {
        self.best_index_with_columns(table, constraints, order_by, u64::MAX)
    }

    /// [`best_index`](Registry::best_index) with an explicit column-usage
    /// mask (bit `i` set when the statement reads column `i`).
    pub fn best_index_with_columns(
        &mut self,
        table: TableHandle,
        constraints: Vec<Constraint>,
        order_by: Vec<OrderBy>,
        col_used: u64,
    ) -> Result<(IndexPlan, Vec<ConstraintUsage>)> {
        let slot = self.tables.get(table.0).ok_or_else(stale_table)?;
        let mut info = IndexInfo::new(constraints, order_by).with_col_used(col_used);
        let outcome =
            (slot.slots.best_index)(&slot.state, &mut info).and_then(|()| info.into_outcome());
        match outcome {
            Ok(result) => Ok(result),
            Err(err) => Err(self.fail_table(table, err)),
        }
    }

    /// Opens a cursor over the table, incrementing its reference count.
    pub fn open(&mut self, table: TableHandle) -> Result<CursorHandle> {
        let slot = self.tables.get_mut(table.0).ok_or_else(stale_table)?;
        match (slot.slots.open)(&mut slot.state) {
            Ok(state) => {
                slot.ref_count += 1;
                let slots = slot.slots;
                let handle = CursorHandle(self.cursors.insert(CursorSlot {
                    table,
                    slots,
                    state,
                    phase: CursorPhase::Open,
                }));
                Ok(handle)
            }
            Err(err) => Err(self.fail_table(table, err)),
        }
    }

    /// Begins (or restarts) a search on the cursor with a previously
    /// planned `(idx_num, idx_str)` pair and the bound argument values.
    ///
    /// Valid in every cursor phase — re-filtering an already-positioned
    /// cursor restarts the search for a requery. A failure kills the
    /// cursor: it reports end-of-data from then on.
    pub fn filter(
        &mut self,
        cursor: CursorHandle,
        idx_num: i32,
        idx_str: Option<&str>,
        args: &[Value],
    ) -> Result<()> {
        let slot = self.cursors.get_mut(cursor.0).ok_or_else(stale_cursor)?;
        let vector = ValueVector::new(args);
        match (slot.slots.filter)(&mut slot.state, idx_num, idx_str, &vector) {
            Ok(()) => {
                slot.phase = CursorPhase::Positioned;
                Ok(())
            }
            Err(err) => Err(self.fail_cursor(cursor, err)),
        }
    }

    /// Advances the cursor to the next row.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Misuse`] before the first `filter` or after a
    /// failure; the module's own failure otherwise. Either way the cursor
    /// reports end-of-data afterwards.
    pub fn next(&mut self, cursor: CursorHandle) -> Result<()> {
        match self.cursor_phase(cursor)? {
            CursorPhase::Open => {
                return Err(self.fail_cursor(
                    cursor,
                    BridgeError::misuse("next called before filter"),
                ));
            }
            CursorPhase::Exhausted => {
                return Err(self.fail_cursor(
                    cursor,
                    BridgeError::misuse("next called on a dead cursor"),
                ));
            }
            CursorPhase::Positioned => {}
        }
        let slot = self.cursors.get_mut(cursor.0).ok_or_else(stale_cursor)?;
        match (slot.slots.next)(&mut slot.state) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail_cursor(cursor, err)),
        }
    }

    /// Reports whether the cursor has run off the end of its result set.
    ///
    /// Pure: repeated calls without an intervening `next` agree. A cursor
    /// that has not been filtered yet, or that was killed by a failure,
    /// reports `true`.
    pub fn eof(&self, cursor: CursorHandle) -> Result<bool> {
        let slot = self.cursors.get(cursor.0).ok_or_else(stale_cursor)?;
        Ok(match slot.phase {
            CursorPhase::Open | CursorPhase::Exhausted => true,
            CursorPhase::Positioned => (slot.slots.eof)(&slot.state),
        })
    }

    /// Writes the value of column `i` of the current row into `sink`.
    pub fn column(&mut self, cursor: CursorHandle, i: usize, sink: &mut ColumnSink) -> Result<()> {
        match self.cursor_phase(cursor)? {
            CursorPhase::Open => {
                return Err(self.fail_cursor(
                    cursor,
                    BridgeError::misuse("column called before filter"),
                ));
            }
            CursorPhase::Exhausted => {
                return Err(self.fail_cursor(
                    cursor,
                    BridgeError::misuse("column called on a dead cursor"),
                ));
            }
            CursorPhase::Positioned => {}
        }
        let slot = self.cursors.get_mut(cursor.0).ok_or_else(stale_cursor)?;
        match (slot.slots.column)(&slot.state, sink, i) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail_cursor(cursor, err)),
        }
    }

    /// Convenience wrapper around [`column`](Registry::column) that
    /// returns the deposited value.
    pub fn column_value(&mut self, cursor: CursorHandle, i: usize) -> Result<Value> {
        let mut sink = ColumnSink::new();
        self.column(cursor, i, &mut sink)?;
        Ok(sink.take())
    }

    /// Returns the row identifier of the current row.
    pub fn rowid(&mut self, cursor: CursorHandle) -> Result<i64> {
        match self.cursor_phase(cursor)? {
            CursorPhase::Open => {
                return Err(self.fail_cursor(
                    cursor,
                    BridgeError::misuse("rowid called before filter"),
                ));
            }
            CursorPhase::Exhausted => {
                return Err(self.fail_cursor(
                    cursor,
                    BridgeError::misuse("rowid called on a dead cursor"),
                ));
            }
            CursorPhase::Positioned => {}
        }
        let slot = self.cursors.get(cursor.0).ok_or_else(stale_cursor)?;
        match (slot.slots.rowid)(&slot.state) {
            Ok(rowid) => Ok(rowid),
            Err(err) => Err(self.fail_cursor(cursor, err)),
        }
    }

    /// Closes the cursor and decrements its table's reference count.
    ///
    /// Abandoning a query mid-iteration this way is a normal teardown
    /// path, not an error.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Misuse`] when called twice on the same handle.
    pub fn close(&mut self, cursor: CursorHandle) -> Result<()> {
        let slot = self
            .cursors
            .remove(cursor.0)
            .ok_or_else(|| BridgeError::misuse("close called on an unknown or closed cursor"))?;
        if let Some(table) = self.tables.get_mut(slot.table.0) {
            table.ref_count = table.ref_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Single mutation entry point, dispatching by argument shape:
    ///
    /// - one argument: delete of that row identifier;
    /// - more than one, first argument null: insert of the remaining
    ///   column values, returning the new row identifier;
    /// - otherwise: update of the row named by the first argument.
    ///
    /// A table whose first declared column is nullable cannot distinguish
    /// an insert with an explicit null key from a keyed update by type
    /// alone; this is a documented limitation of the wire contract.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Misuse`] for a read-only module or an empty
    /// argument vector; the module's own mutation failure otherwise. A
    /// mutation failure aborts only that statement — the table handle and
    /// any open cursors stay valid.
    pub fn update(&mut self, table: TableHandle, args: &[Value]) -> Result<Option<i64>> {
        let slot = self.tables.get_mut(table.0).ok_or_else(stale_table)?;
        let Some(update) = slot.slots.update else {
            let name = slot.module_name.clone();
            return Err(self.fail_table(
                table,
                BridgeError::misuse(format!("module '{name}' is read-only")),
            ));
        };
        let vector = ValueVector::new(args);
        match update(&mut slot.state, &vector) {
            Ok(rowid) => Ok(rowid),
            Err(err) => Err(self.fail_table(table, err)),
        }
    }

    /// Disconnects the table and frees its handle.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Misuse`] while cursors are still open against the
    /// table — the reference count must reach zero before the handle may
    /// be freed.
    pub fn disconnect(&mut self, table: TableHandle) -> Result<()> {
        self.check_no_cursors(table)?;
        let slot = self.tables.remove(table.0).ok_or_else(stale_table)?;
        debug!(module = %slot.module_name, table = ?table, "disconnected virtual table");
        Ok(())
    }

    /// Destroys the table: runs the module's destroy slot, then frees the
    /// handle. For modules without a destroy slot this is plain
    /// disconnect.
    ///
    /// # Errors
    ///
    /// As [`disconnect`](Registry::disconnect); additionally, if the
    /// destroy slot fails the handle stays alive and the failure is
    /// recorded on it.
    pub fn destroy(&mut self, table: TableHandle) -> Result<()> {
        self.check_no_cursors(table)?;
        let slot = self.tables.get(table.0).ok_or_else(stale_table)?;
        if let Some(destroy) = slot.slots.destroy {
            if let Err(err) = destroy(&slot.state) {
                return Err(self.fail_table(table, err));
            }
        }
        self.disconnect(table)
    }

    /// The logical schema the table declared on connect.
    pub fn table_schema(&self, table: TableHandle) -> Result<&TableSchema> {
        Ok(&self.tables.get(table.0).ok_or_else(stale_table)?.schema)
    }

    /// The most recent error message recorded on the table handle.
    ///
    /// This is the single channel for rich diagnostics; each new failure
    /// overwrites it.
    #[must_use]
    pub fn last_error(&self, table: TableHandle) -> Option<&str> {
        self.tables.get(table.0).and_then(|slot| slot.last_error.as_deref())
    }

    /// Number of cursors currently open against the table.
    pub fn cursor_count(&self, table: TableHandle) -> Result<usize> {
        Ok(self.tables.get(table.0).ok_or_else(stale_table)?.ref_count)
    }

    /// Number of live table handles.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    fn cursor_phase(&self, cursor: CursorHandle) -> Result<CursorPhase> {
        Ok(self.cursors.get(cursor.0).ok_or_else(stale_cursor)?.phase)
    }

    fn check_no_cursors(&mut self, table: TableHandle) -> Result<()> {
        let slot = self.tables.get(table.0).ok_or_else(stale_table)?;
        if slot.ref_count > 0 {
            let count = slot.ref_count;
            return Err(self.fail_table(
                table,
                BridgeError::misuse(format!(
                    "table still has {count} open cursor(s); close them before freeing the handle"
                )),
            ));
        }
        Ok(())
    }

    /// Records a failure on the table handle's error-message slot,
    /// overwriting any earlier message, and hands the error back.
    fn fail_table(&mut self, table: TableHandle, err: BridgeError) -> BridgeError {
        if let Some(slot) = self.tables.get_mut(table.0) {
            warn!(
                module = %slot.module_name,
                status = err.status().code(),
                error = %err,
                "virtual table callback failed"
            );
            slot.last_error = Some(err.to_string());
        }
        err
    }

    /// Kills the cursor (it reports end-of-data from now on) and records
    /// the failure on its owning table handle.
    fn fail_cursor(&mut self, cursor: CursorHandle, err: BridgeError) -> BridgeError {
        let table = match self.cursors.get_mut(cursor.0) {
            Some(slot) => {
                slot.phase = CursorPhase::Exhausted;
                Some(slot.table)
            }
            None => None,
        };
        match table {
            Some(table) => self.fail_table(table, err),
            None => err,
        }
    }
}
