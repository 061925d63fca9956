//! Callback-logging diagnostics table.
//!
//! `logtable` is a fixed-row-count table whose real purpose is tracing:
//! every callback the registry dispatches to it emits a `tracing` event,
//! which makes it a convenient probe for watching the protocol drive a
//! module. Rows are synthetic — column `j` of row `i` renders as the
//! letter for `j` (`a`, `b`, `c`) followed by `i`, so row 0 reads
//! `a0`, `b0`, `c0`.
//!
//! Configuration: a `rows=N` module argument (default 10).

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;
use vtab_bridge_core::{
    BridgeError, ColumnDef, ColumnSink, IndexInfo, Result, TableSchema, TypeAffinity, ValueVector,
    args,
};
use vtab_bridge_registry::{CreatableTable, Module, Registry, TableCursor, TableKind, VirtualTable};

/// Distinguishes table instances in trace output.
static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Registers the module under the name `logtable` (creatable).
pub fn load_module(registry: &mut Registry) -> Result<()> {
    registry.register("logtable", Module::<LogTable>::new().with_create(), None, false)
}

/// The callback-logging virtual table.
pub struct LogTable {
    instance: usize,
    rows: i64,
}

impl LogTable {
    fn setup(op: &str, raw_args: &[String]) -> Result<(TableSchema, Self)> {
        let mut rows = 10;
        for arg in raw_args {
            let (key, value) = args::parameter(arg)?;
            match key {
                "rows" => {
                    rows = value
                        .parse()
                        .map_err(|_| BridgeError::module(format!("invalid rows value: {value}")))?;
                }
                other => {
                    return Err(BridgeError::module(format!("unrecognized parameter: {other}")));
                }
            }
        }
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(instance, op, rows, "logtable setup");
        let schema = TableSchema::new()
            .with_column(ColumnDef::new("a", TypeAffinity::Text))
            .with_column(ColumnDef::new("b", TypeAffinity::Text))
            .with_column(ColumnDef::new("c", TypeAffinity::Text));
        Ok((schema, LogTable { instance, rows }))
    }
}

impl VirtualTable for LogTable {
    type Aux = ();
    type Cursor = LogCursor;

    fn connect(_aux: Option<&()>, raw_args: &[String]) -> Result<(TableSchema, Self)> {
        Self::setup("connect", raw_args)
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        for (i, constraint) in info.constraints().iter().enumerate() {
            debug!(
                instance = self.instance,
                constraint = i,
                column = constraint.column,
                op = ?constraint.op,
                usable = constraint.usable,
                "logtable best_index constraint"
            );
        }
        for (i, order) in info.order_bys().iter().enumerate() {
            debug!(
                instance = self.instance,
                term = i,
                column = order.column,
                desc = order.desc,
                "logtable best_index order-by"
            );
        }
        debug!(
            instance = self.instance,
            col_used = info.col_used(),
            "logtable best_index column usage"
        );
        // Always a full scan; the default cost already marks it as such.
        info.set_estimated_rows(self.rows);
        Ok(())
    }

    fn open(&mut self) -> Result<LogCursor> {
        debug!(instance = self.instance, "logtable open");
        Ok(LogCursor { instance: self.instance, limit: self.rows, rowid: 0 })
    }
}

impl CreatableTable for LogTable {
    const KIND: TableKind = TableKind::Default;

    fn create(_aux: Option<&()>, raw_args: &[String]) -> Result<(TableSchema, Self)> {
        Self::setup("create", raw_args)
    }

    fn destroy(&self) -> Result<()> {
        debug!(instance = self.instance, "logtable destroy");
        Ok(())
    }
}

/// Cursor over the synthetic rows.
pub struct LogCursor {
    instance: usize,
    limit: i64,
    rowid: i64,
}

impl TableCursor for LogCursor {
    fn filter(&mut self, idx_num: i32, idx_str: Option<&str>, args: &ValueVector<'_>) -> Result<()> {
        debug!(
            instance = self.instance,
            idx_num,
            idx_str,
            argc = args.len(),
            "logtable filter"
        );
        self.rowid = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        debug!(instance = self.instance, rowid = self.rowid, "logtable next");
        self.rowid += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.rowid >= self.limit
    }

    fn column(&self, sink: &mut ColumnSink, i: usize) -> Result<()> {
        let letter = (b'a' + (i % 26) as u8) as char;
        debug!(instance = self.instance, rowid = self.rowid, column = i, "logtable column");
        sink.set_result(format!("{letter}{}", self.rowid));
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        debug!(instance = self.instance, rowid = self.rowid, "logtable rowid");
        Ok(self.rowid)
    }
}
