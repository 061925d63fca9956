//! Mutation dispatch against the writable in-memory table.
//!
//! Shows the single shape-dispatched mutation entry point: delete with
//! one argument, insert with a null first argument, update otherwise —
//! plus a rowid point-lookup plan to read a row back.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p vtab-bridge-demos --example writable_table
//! ```

use vtab_bridge_core::{Constraint, ConstraintOp, ROWID_COLUMN, Value};
use vtab_bridge_modules::memtable;
use vtab_bridge_registry::Registry;

fn main() {
    let mut registry = Registry::new();
    memtable::load_module(&mut registry).unwrap();

    // === Step 1: Create the table with two columns ===
    let table = registry
        .create_table("memtable", &["name".to_string(), "score".to_string()])
        .unwrap();

    // === Step 2: Insert (null first argument → insert) ===
    println!("=== Insert ===");
    let alice = registry
        .update(table, &[Value::Null, Value::from("alice"), Value::Integer(10)])
        .unwrap()
        .unwrap();
    let bob = registry
        .update(table, &[Value::Null, Value::from("bob"), Value::Integer(7)])
        .unwrap()
        .unwrap();
    println!("  inserted rowids: {alice}, {bob}");

    // === Step 3: Update (first argument names the row) ===
    registry
        .update(table, &[Value::Integer(bob), Value::from("bob"), Value::Integer(12)])
        .unwrap();
    println!("updated bob's score to 12");

    // === Step 4: Point lookup by rowid ===
    let (plan, _usages) = registry
        .best_index(
            table,
            vec![Constraint::usable(ROWID_COLUMN, ConstraintOp::Eq)],
            vec![],
        )
        .unwrap();
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[Value::Integer(bob)])
        .unwrap();
    println!("\n=== Lookup rowid={bob} ===");
    while !registry.eof(cursor).unwrap() {
        let name = registry.column_value(cursor, 0).unwrap();
        let score = registry.column_value(cursor, 1).unwrap();
        println!("  {name:?} {score:?}");
        registry.next(cursor).unwrap();
    }
    registry.close(cursor).unwrap();

    // === Step 5: Delete (single argument → delete) ===
    registry.update(table, &[Value::Integer(alice)]).unwrap();
    println!("\ndeleted alice");

    // A failed mutation surfaces a status code and a message on the
    // table handle.
    let err = registry.update(table, &[Value::Integer(alice)]).unwrap_err();
    println!("re-delete failed: status={:?}", err.status().code());
    println!("table message: {:?}", registry.last_error(table));

    registry.destroy(table).unwrap();
    println!("\nDone!");
}
