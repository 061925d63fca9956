//! Capability traits and the module slot table.
//!
//! A virtual table implementation is two types: a table type implementing
//! [`VirtualTable`] (plus [`CreatableTable`] and [`WritableTable`] for the
//! optional capabilities) and a cursor type implementing [`TableCursor`].
//! A [`Module`] packages them into the fixed callback-slot table the
//! registry drives: `Module::new()` fills the mandatory slots, and the
//! `with_*` builders add create/destroy and update slots when the table
//! type offers those capabilities.
//!
//! ```rust,ignore
//! // Eponymous-only read-only table (simplest case)
//! let simple = Module::<MyTable>::new();
//!
//! // Read-only table with explicit create/destroy support
//! let creatable = Module::<MyTable>::new().with_create();
//!
//! // Writable table
//! let writable = Module::<MyTable>::new().with_update();
//! ```
//!
//! Slots are monomorphized trampolines: each knows the concrete table or
//! cursor type, recovers it from the type-erased arena state, and calls
//! the trait method. The registry never sees a concrete module type.

use std::any::Any;
use std::marker::PhantomData;

use vtab_bridge_core::{
    BridgeError, ColumnSink, IndexInfo, Result, TableSchema, Value, ValueVector,
};

/// Type-erased registration payload shared by every table instance of a
/// module.
pub(crate) type AuxRef<'a> = &'a (dyn Any + Send + Sync);

/// Type-erased table instance state, owned by a registry arena slot.
pub(crate) type TableState = Box<dyn Any + Send>;

/// Type-erased cursor state, owned by a registry arena slot.
pub(crate) type CursorState = Box<dyn Any + Send>;

/// How a module participates in explicit table creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Distinct create/destroy and connect/disconnect, for persistent
    /// virtual tables.
    Default,
    /// Create shares the connect implementation; destroy is plain
    /// disconnect.
    Eponymous,
    /// No create/destroy at all; the module is only usable directly,
    /// without an explicit creation step.
    EponymousOnly,
}

/// Read-only virtual table capability set: describe, plan, open.
///
/// Disconnect is `Drop`: when the registry frees the table's arena slot,
/// the instance is dropped and releases whatever it owns.
pub trait VirtualTable: Sized + Send + 'static {
    /// Client data passed to [`Registry::register`](crate::Registry::register)
    /// and shared by every instance of the module.
    type Aux: Send + Sync + 'static;
    /// Cursor implementation for this table.
    type Cursor: TableCursor + Send + 'static;

    /// Establishes a table instance and declares its logical schema.
    ///
    /// `args` are the raw module arguments from the statement that
    /// created or connected the table (see
    /// [`args`](vtab_bridge_core::args) for the `key=value` helpers).
    ///
    /// # Errors
    ///
    /// A failed connect produces no handle; the error's status code and
    /// message surface through the host driver.
    fn connect(aux: Option<&Self::Aux>, args: &[String]) -> Result<(TableSchema, Self)>;

    /// Chooses an access strategy for one candidate query.
    ///
    /// The strategy must be fully encoded into the plan id and plan
    /// string written to `info` — they are the only planning state that
    /// reaches the cursor's [`filter`](TableCursor::filter) call.
    fn best_index(&self, info: &mut IndexInfo) -> Result<()>;

    /// Opens a new cursor over this table.
    fn open(&mut self) -> Result<Self::Cursor>;
}

/// Virtual table with explicit create/destroy support.
pub trait CreatableTable: VirtualTable {
    /// Creation behavior of this module.
    const KIND: TableKind;

    /// Creates the table's backing resources in response to an explicit
    /// creation statement. Defaults to [`connect`](VirtualTable::connect).
    fn create(aux: Option<&Self::Aux>, args: &[String]) -> Result<(TableSchema, Self)> {
        Self::connect(aux, args)
    }

    /// Destroys the table's backing resources, undoing
    /// [`create`](CreatableTable::create). Defaults to doing nothing.
    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// Writable virtual table capability: insert/update/delete.
///
/// The registry dispatches all three through one mutation entry point by
/// argument shape (see [`Registry::update`](crate::Registry::update)).
pub trait WritableTable: CreatableTable {
    /// Removes the row with the given row identifier.
    fn delete(&mut self, rowid: &Value) -> Result<()>;

    /// Inserts a row from column values in declared order; returns the
    /// newly assigned row identifier.
    fn insert(&mut self, values: &ValueVector<'_>) -> Result<i64>;

    /// Replaces the row with the given row identifier with new column
    /// values in declared order.
    fn update(&mut self, rowid: &Value, values: &ValueVector<'_>) -> Result<()>;
}

/// Per-query iteration state over a virtual table.
///
/// The registry guarantees the calling order `filter` → (`eof` /
/// `column` / `rowid` / `next`)* and rejects out-of-order calls before
/// they reach the cursor, so implementations only handle the happy path.
pub trait TableCursor: Sized {
    /// Begins (or restarts) a search using a plan produced by
    /// [`VirtualTable::best_index`]. `args` carries the constraint values
    /// at the argv positions assigned during planning.
    fn filter(&mut self, idx_num: i32, idx_str: Option<&str>, args: &ValueVector<'_>)
    -> Result<()>;

    /// Advances to the next row.
    fn next(&mut self) -> Result<()>;

    /// Reports whether the cursor has run off the end of its result set.
    /// Must be a pure predicate.
    fn eof(&self) -> bool;

    /// Writes the value of column `i` (0-based) of the current row into
    /// the sink. Called once per selected column without advancing the
    /// cursor.
    fn column(&self, sink: &mut ColumnSink, i: usize) -> Result<()>;

    /// Returns the row identifier of the current row, stable for the
    /// lifetime of this cursor.
    fn rowid(&self) -> Result<i64>;
}

/// The fixed callback-slot table for one registered module.
///
/// Mandatory slots are filled by [`Module::new`]; create/destroy and
/// update slots stay `None` unless the corresponding capability builder
/// was applied.
#[derive(Clone, Copy)]
pub(crate) struct ModuleSlots {
    pub(crate) create: Option<fn(Option<AuxRef<'_>>, &[String]) -> Result<(TableSchema, TableState)>>,
    pub(crate) connect: fn(Option<AuxRef<'_>>, &[String]) -> Result<(TableSchema, TableState)>,
    pub(crate) best_index: fn(&TableState, &mut IndexInfo) -> Result<()>,
    pub(crate) destroy: Option<fn(&TableState) -> Result<()>>,
    pub(crate) open: fn(&mut TableState) -> Result<CursorState>,
    pub(crate) filter: fn(&mut CursorState, i32, Option<&str>, &ValueVector<'_>) -> Result<()>,
    pub(crate) next: fn(&mut CursorState) -> Result<()>,
    pub(crate) eof: fn(&CursorState) -> bool,
    pub(crate) column: fn(&CursorState, &mut ColumnSink, usize) -> Result<()>,
    pub(crate) rowid: fn(&CursorState) -> Result<i64>,
    pub(crate) update: Option<fn(&mut TableState, &ValueVector<'_>) -> Result<Option<i64>>>,
}

/// A virtual table module: the slot table for a concrete table type.
///
/// Build one with [`Module::new`] and chain `with_*` methods to enable
/// additional capabilities, then hand it to
/// [`Registry::register`](crate::Registry::register).
pub struct Module<T: VirtualTable> {
    slots: ModuleSlots,
    phantom: PhantomData<fn() -> T>,
}

impl<T: VirtualTable> Clone for Module<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: VirtualTable> Copy for Module<T> {}

impl<T: VirtualTable> Module<T> {
    /// Creates a base module with the mandatory callback slots: connect,
    /// best-index, open, and the cursor slots (filter, next, eof, column,
    /// rowid). Create/destroy and update slots are left empty.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Module {
            slots: ModuleSlots {
                create: None,
                connect: connect_slot::<T>,
                best_index: best_index_slot::<T>,
                destroy: None,
                open: open_slot::<T>,
                filter: filter_slot::<T::Cursor>,
                next: next_slot::<T::Cursor>,
                eof: eof_slot::<T::Cursor>,
                column: column_slot::<T::Cursor>,
                rowid: rowid_slot::<T::Cursor>,
                update: None,
            },
            phantom: PhantomData,
        }
    }

    pub(crate) fn into_slots(self) -> ModuleSlots {
        self.slots
    }
}

impl<T: CreatableTable> Module<T> {
    /// Enables create/destroy slots according to [`TableKind`].
    #[must_use]
    pub const fn with_create(self) -> Self {
        let (create, destroy) = creation_slots::<T>();
        Module {
            slots: ModuleSlots { create, destroy, ..self.slots },
            phantom: PhantomData,
        }
    }
}

impl<T: WritableTable> Module<T> {
    /// Enables the mutation slot for insert/update/delete dispatch.
    ///
    /// Also sets create/destroy slots according to [`TableKind`].
    #[must_use]
    pub const fn with_update(self) -> Self {
        let (create, destroy) = creation_slots::<T>();
        Module {
            slots: ModuleSlots {
                create,
                destroy,
                update: Some(update_slot::<T>),
                ..self.slots
            },
            phantom: PhantomData,
        }
    }
}

#[allow(clippy::type_complexity)]
const fn creation_slots<T: CreatableTable>() -> (
    Option<fn(Option<AuxRef<'_>>, &[String]) -> Result<(TableSchema, TableState)>>,
    Option<fn(&TableState) -> Result<()>>,
) {
    match T::KIND {
        TableKind::EponymousOnly => (None, None),
        TableKind::Eponymous => (Some(connect_slot::<T>), None),
        TableKind::Default => (Some(create_slot::<T>), Some(destroy_slot::<T>)),
    }
}

fn state_mismatch() -> BridgeError {
    BridgeError::misuse("handle state does not belong to this module")
}

fn connect_slot<T: VirtualTable>(
    aux: Option<AuxRef<'_>>,
    args: &[String],
) -> Result<(TableSchema, TableState)> {
    let aux = aux.and_then(|a| a.downcast_ref::<T::Aux>());
    let (schema, table) = T::connect(aux, args)?;
    Ok((schema, Box::new(table)))
}

fn create_slot<T: CreatableTable>(
    aux: Option<AuxRef<'_>>,
    args: &[String],
) -> Result<(TableSchema, TableState)> {
    let aux = aux.and_then(|a| a.downcast_ref::<T::Aux>());
    let (schema, table) = T::create(aux, args)?;
    Ok((schema, Box::new(table)))
}

fn destroy_slot<T: CreatableTable>(table: &TableState) -> Result<()> {
    table.downcast_ref::<T>().ok_or_else(state_mismatch)?.destroy()
}

fn best_index_slot<T: VirtualTable>(table: &TableState, info: &mut IndexInfo) -> Result<()> {
    table.downcast_ref::<T>().ok_or_else(state_mismatch)?.best_index(info)
}

fn open_slot<T: VirtualTable>(table: &mut TableState) -> Result<CursorState> {
    let table = table.downcast_mut::<T>().ok_or_else(state_mismatch)?;
    Ok(Box::new(table.open()?))
}

fn filter_slot<C: TableCursor + 'static>(
    cursor: &mut CursorState,
    idx_num: i32,
    idx_str: Option<&str>,
    args: &ValueVector<'_>,
) -> Result<()> {
    cursor
        .downcast_mut::<C>()
        .ok_or_else(state_mismatch)?
        .filter(idx_num, idx_str, args)
}

fn next_slot<C: TableCursor + 'static>(cursor: &mut CursorState) -> Result<()> {
    cursor.downcast_mut::<C>().ok_or_else(state_mismatch)?.next()
}

fn eof_slot<C: TableCursor + 'static>(cursor: &CursorState) -> bool {
    // A state mismatch has no error channel here; report end-of-data so
    // iteration terminates.
    cursor.downcast_ref::<C>().is_none_or(|cursor| cursor.eof())
}

fn column_slot<C: TableCursor + 'static>(
    cursor: &CursorState,
    sink: &mut ColumnSink,
    i: usize,
) -> Result<()> {
    cursor.downcast_ref::<C>().ok_or_else(state_mismatch)?.column(sink, i)
}

fn rowid_slot<C: TableCursor + 'static>(cursor: &CursorState) -> Result<i64> {
    cursor.downcast_ref::<C>().ok_or_else(state_mismatch)?.rowid()
}

/// Mutation entry point: dispatches by argument shape.
///
/// One argument is a delete of that row identifier; more than one with a
/// null first argument is an insert of the remaining column values;
/// anything else is an update of the row named by the first argument.
///
/// A table whose first declared column is nullable cannot distinguish
/// "insert with explicit null key" from "keyed update" by type alone;
/// callers binding such tables must account for the ambiguity — it is a
/// documented precondition of the wire contract, not something this
/// dispatch resolves.
fn update_slot<T: WritableTable>(
    table: &mut TableState,
    args: &ValueVector<'_>,
) -> Result<Option<i64>> {
    let table = table.downcast_mut::<T>().ok_or_else(state_mismatch)?;
    if args.is_empty() {
        return Err(BridgeError::misuse("mutation dispatch requires at least one argument"));
    }
    if args.len() == 1 {
        table.delete(args.value(0))?;
        Ok(None)
    } else if args.value(0).is_null() {
        table.insert(&args.tail(1)).map(Some)
    } else {
        table.update(args.value(0), &args.tail(1))?;
        Ok(None)
    }
}
