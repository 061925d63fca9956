//! Numeric-range table module.
//!
//! `series` produces the integers from `start` to `stop` inclusive, in
//! increments of `step`. The bounds are hidden filter columns, so a query
//! constrains them like ordinary columns:
//!
//! ```text
//! SELECT value FROM series WHERE start = 0 AND stop = 20 AND step = 5
//! ```
//!
//! Planning packs the set of bounded parameters into plan-id bits; the
//! filter call decodes the same bits to know which argument carries which
//! bound. A descending bit is added when the query orders by `value`
//! descending, letting the engine skip its post-sort in both directions.

use vtab_bridge_core::{
    BridgeError, ColumnDef, ColumnSink, ConstraintOp, FULL_SCAN_COST, IndexInfo, Result,
    TableSchema, TypeAffinity, ValueVector,
};
use vtab_bridge_registry::{Module, Registry, TableCursor, VirtualTable};

/// Plan bit: a `start = ?` constraint is bound.
const SERIES_START: i32 = 1;
/// Plan bit: a `stop = ?` constraint is bound.
const SERIES_STOP: i32 = 2;
/// Plan bit: a `step = ?` constraint is bound.
const SERIES_STEP: i32 = 4;
/// Plan bit: produce values in descending order.
const SERIES_DESC: i32 = 8;

/// Upper bound used when no `stop` constraint is present.
const DEFAULT_STOP: i64 = 4_294_967_295;

/// Registers the module under the name `series` (eponymous-only).
pub fn load_module(registry: &mut Registry) -> Result<()> {
    registry.register("series", Module::<SeriesTable>::new(), None, true)
}

/// The numeric-range virtual table. Stateless: everything a scan needs
/// arrives through the filter arguments.
pub struct SeriesTable;

impl VirtualTable for SeriesTable {
    type Aux = ();
    type Cursor = SeriesCursor;

    fn connect(_aux: Option<&()>, _args: &[String]) -> Result<(TableSchema, Self)> {
        let schema = TableSchema::new()
            .with_column(ColumnDef::new("value", TypeAffinity::Integer))
            .with_column(ColumnDef::new("start", TypeAffinity::Integer).hidden())
            .with_column(ColumnDef::new("stop", TypeAffinity::Integer).hidden())
            .with_column(ColumnDef::new("step", TypeAffinity::Integer).hidden());
        Ok((schema, SeriesTable))
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        let mut idx_num = 0;
        // One slot per bound parameter, in the order filter() decodes
        // them: start, stop, step. The first matching constraint wins.
        let mut wanted: [Option<usize>; 3] = [None; 3];
        for (i, constraint) in info.constraints().iter().enumerate() {
            if !constraint.usable || constraint.op != ConstraintOp::Eq {
                continue;
            }
            let (slot, bit) = match constraint.column {
                1 => (0, SERIES_START),
                2 => (1, SERIES_STOP),
                3 => (2, SERIES_STEP),
                _ => continue,
            };
            if wanted[slot].is_none() {
                wanted[slot] = Some(i);
                idx_num |= bit;
            }
        }

        let mut argv = 0;
        for i in wanted.into_iter().flatten() {
            argv += 1;
            info.constraint_usage(i).argv_index = argv;
            info.constraint_usage(i).omit = true;
        }

        if idx_num & (SERIES_START | SERIES_STOP) == (SERIES_START | SERIES_STOP) {
            info.set_estimated_cost(if idx_num & SERIES_STEP != 0 { 1.0 } else { 2.0 });
            info.set_estimated_rows(1000);
            if info.num_of_order_by() == 1 && info.order_bys()[0].column == 0 {
                if info.order_bys()[0].desc {
                    idx_num |= SERIES_DESC;
                }
                info.set_order_by_consumed(true);
            }
        } else if idx_num != 0 {
            // Partially bounded: better than nothing, far worse than a
            // full range specification.
            info.set_estimated_cost(2_147_483_647.0);
            info.set_estimated_rows(DEFAULT_STOP);
        } else {
            // Unbounded: the default range is enormous, so price the plan
            // to lose against any bounded alternative.
            info.set_estimated_cost(FULL_SCAN_COST);
            info.set_estimated_rows(DEFAULT_STOP);
        }
        info.set_idx_num(idx_num);
        Ok(())
    }

    fn open(&mut self) -> Result<SeriesCursor> {
        Ok(SeriesCursor::default())
    }
}

/// Cursor over one numeric range.
#[derive(Default)]
pub struct SeriesCursor {
    value: i64,
    min_value: i64,
    max_value: i64,
    step: i64,
    desc: bool,
    rowid: i64,
}

impl TableCursor for SeriesCursor {
    fn filter(&mut self, idx_num: i32, _idx_str: Option<&str>, args: &ValueVector<'_>) -> Result<()> {
        let mut argv = 0;
        let mut bound = |present: bool, default: i64| -> Result<Option<i64>> {
            if !present {
                return Ok(Some(default));
            }
            let value: Option<i64> = args.get(argv)?;
            argv += 1;
            Ok(value)
        };

        let start = bound(idx_num & SERIES_START != 0, 0)?;
        let stop = bound(idx_num & SERIES_STOP != 0, DEFAULT_STOP)?;
        let step = bound(idx_num & SERIES_STEP != 0, 1)?;

        self.rowid = 1;
        match (start, stop, step) {
            (Some(start), Some(stop), Some(step)) => {
                if step < 1 {
                    return Err(BridgeError::constraint("step must be a positive integer"));
                }
                self.min_value = start;
                self.max_value = stop;
                self.step = step;
                self.desc = idx_num & SERIES_DESC != 0;
                if self.desc {
                    // Align the starting point so descending iteration
                    // visits exactly the ascending value set.
                    self.max_value -= (self.max_value - self.min_value).rem_euclid(self.step);
                    self.value = self.max_value;
                } else {
                    self.value = self.min_value;
                }
            }
            _ => {
                // A NULL bound matches nothing.
                self.min_value = 1;
                self.max_value = 0;
                self.step = 1;
                self.desc = false;
                self.value = 1;
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if self.desc {
            self.value -= self.step;
        } else {
            self.value += self.step;
        }
        self.rowid += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        if self.desc {
            self.value < self.min_value
        } else {
            self.value > self.max_value
        }
    }

    fn column(&self, sink: &mut ColumnSink, i: usize) -> Result<()> {
        match i {
            0 => sink.set_result(self.value),
            1 => sink.set_result(self.min_value),
            2 => sink.set_result(self.max_value),
            3 => sink.set_result(self.step),
            _ => return Err(BridgeError::module(format!("series has no column {i}"))),
        }
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.rowid)
    }
}
