//! Query planning and cursor iteration over the series module.
//!
//! Drives the registry the way the engine would: plan with best-index,
//! then filter and iterate a cursor using the planned tuple.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p vtab-bridge-demos --example series_scan
//! ```

use vtab_bridge_core::{Constraint, ConstraintOp, OrderBy, Value};
use vtab_bridge_modules::series;
use vtab_bridge_registry::Registry;

fn main() {
    let mut registry = Registry::new();
    series::load_module(&mut registry).unwrap();

    // === Step 1: Connect (eponymous, no explicit creation needed) ===
    let table = registry.connect_table("series", &[]).unwrap();
    let schema = registry.table_schema(table).unwrap();
    println!("=== Schema ===");
    for column in &schema.columns {
        println!("  {} ({:?}{})", column.name, column.affinity, if column.hidden { ", hidden" } else { "" });
    }

    // === Step 2: Plan `WHERE start=? AND stop=? AND step=? ORDER BY value DESC` ===
    let constraints = vec![
        Constraint::usable(1, ConstraintOp::Eq), // start
        Constraint::usable(2, ConstraintOp::Eq), // stop
        Constraint::usable(3, ConstraintOp::Eq), // step
    ];
    let order_by = vec![OrderBy::new(0, true)];
    let (plan, usages) = registry.best_index(table, constraints, order_by).unwrap();

    println!("\n=== Plan ===");
    println!("  idx_num: {:#06b}", plan.idx_num);
    println!("  estimated cost: {}", plan.estimated_cost);
    println!("  estimated rows: {}", plan.estimated_rows);
    println!("  order-by consumed: {}", plan.order_by_consumed);
    for (i, usage) in usages.iter().enumerate() {
        println!("  constraint {i}: argv={} omit={}", usage.argv_index, usage.omit);
    }

    // === Step 3: Filter with the planned tuple and iterate ===
    let cursor = registry.open(table).unwrap();
    registry
        .filter(
            cursor,
            plan.idx_num,
            plan.idx_str.as_deref(),
            &[Value::Integer(0), Value::Integer(50), Value::Integer(10)],
        )
        .unwrap();

    println!("\n=== Rows ===");
    while !registry.eof(cursor).unwrap() {
        let rowid = registry.rowid(cursor).unwrap();
        let value = registry.column_value(cursor, 0).unwrap();
        println!("  rowid={rowid} value={value:?}");
        registry.next(cursor).unwrap();
    }

    // === Step 4: Teardown ===
    registry.close(cursor).unwrap();
    registry.disconnect(table).unwrap();
    println!("\nDone!");
}
