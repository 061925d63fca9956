//! Integration tests for the vtab-bridge-modules crate.
//!
//! These drive the concrete modules the way the engine would: plan with
//! best-index, then open/filter/iterate a cursor with the planned
//! `(idx_num, idx_str, argv)` tuple.

use std::sync::Arc;

use vtab_bridge_core::{
    Constraint, ConstraintOp, ConstraintUsage, FULL_SCAN_COST, OrderBy, ROWID_COLUMN, ScanFlags,
    StatusCode, Value,
};
use vtab_bridge_modules::{array, logtable, memtable, series};
use vtab_bridge_registry::{CursorHandle, Registry, TableHandle};

fn registry_with_all_modules() -> Registry {
    let mut registry = Registry::new();
    series::load_module(&mut registry).unwrap();
    array::load_module(&mut registry).unwrap();
    logtable::load_module(&mut registry).unwrap();
    memtable::load_module(&mut registry).unwrap();
    registry
}

/// Places each constraint's bound value at the argv position the plan
/// assigned it, exactly as the engine does before calling filter.
fn bind_args(usages: &[ConstraintUsage], values: Vec<Value>) -> Vec<Value> {
    let argc = usages.iter().filter(|u| u.argv_index > 0).count();
    let mut out = vec![Value::Null; argc];
    for (usage, value) in usages.iter().zip(values) {
        if usage.argv_index > 0 {
            out[usage.argv_index as usize - 1] = value;
        }
    }
    out
}

/// Iterates the cursor to exhaustion, collecting rowids and the
/// requested columns.
fn collect(
    registry: &mut Registry,
    cursor: CursorHandle,
    columns: &[usize],
) -> Vec<(i64, Vec<Value>)> {
    let mut out = Vec::new();
    while !registry.eof(cursor).unwrap() {
        let rowid = registry.rowid(cursor).unwrap();
        let row = columns
            .iter()
            .map(|&i| registry.column_value(cursor, i).unwrap())
            .collect();
        out.push((rowid, row));
        registry.next(cursor).unwrap();
    }
    out
}

/// Inserts through the shape-dispatched mutation entry point and returns
/// the assigned rowid.
fn insert_row(registry: &mut Registry, table: TableHandle, values: &[Value]) -> i64 {
    let mut args = vec![Value::Null];
    args.extend_from_slice(values);
    registry.update(table, &args).unwrap().unwrap()
}

#[test]
fn test_series_bounded_sequence() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("series", &[]).unwrap();

    // Constraints arrive in arbitrary order; argv slots must still line
    // up with filter's start/stop/step decoding.
    let constraints = vec![
        Constraint::usable(3, ConstraintOp::Eq), // step
        Constraint::usable(1, ConstraintOp::Eq), // start
        Constraint::usable(2, ConstraintOp::Eq), // stop
    ];
    let (plan, usages) = registry.best_index(table, constraints, vec![]).unwrap();
    assert_eq!(plan.idx_num & 7, 7);

    let args = bind_args(
        &usages,
        vec![Value::Integer(5), Value::Integer(0), Value::Integer(20)],
    );
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0]);
    let values: Vec<&Value> = rows.iter().map(|(_, row)| &row[0]).collect();
    assert_eq!(
        values,
        vec![
            &Value::Integer(0),
            &Value::Integer(5),
            &Value::Integer(10),
            &Value::Integer(15),
            &Value::Integer(20),
        ]
    );
    assert!(registry.eof(cursor).unwrap());
}

#[test]
fn test_series_plan_costs_favor_tighter_bounds() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("series", &[]).unwrap();

    let (bounded, _) = registry
        .best_index(
            table,
            vec![
                Constraint::usable(1, ConstraintOp::Eq),
                Constraint::usable(2, ConstraintOp::Eq),
            ],
            vec![],
        )
        .unwrap();
    let (partial, _) = registry
        .best_index(table, vec![Constraint::usable(1, ConstraintOp::Eq)], vec![])
        .unwrap();
    let (unconstrained, _) = registry.best_index(table, vec![], vec![]).unwrap();

    assert!(bounded.estimated_cost < partial.estimated_cost);
    assert!(partial.estimated_cost < unconstrained.estimated_cost);
    assert_eq!(unconstrained.estimated_cost, FULL_SCAN_COST);
}

#[test]
fn test_series_descending_order_consumed() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("series", &[]).unwrap();

    let (plan, usages) = registry
        .best_index(
            table,
            vec![
                Constraint::usable(1, ConstraintOp::Eq),
                Constraint::usable(2, ConstraintOp::Eq),
                Constraint::usable(3, ConstraintOp::Eq),
            ],
            vec![OrderBy::new(0, true)],
        )
        .unwrap();
    assert!(plan.order_by_consumed);

    let args = bind_args(
        &usages,
        vec![Value::Integer(0), Value::Integer(20), Value::Integer(5)],
    );
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0]);
    let values: Vec<i64> = rows
        .iter()
        .map(|(_, row)| match row[0] {
            Value::Integer(v) => v,
            _ => panic!("series produced a non-integer value"),
        })
        .collect();
    assert_eq!(values, vec![20, 15, 10, 5, 0]);
}

#[test]
fn test_series_ascending_order_consumed_without_desc_bit() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("series", &[]).unwrap();

    let (plan, _) = registry
        .best_index(
            table,
            vec![
                Constraint::usable(1, ConstraintOp::Eq),
                Constraint::usable(2, ConstraintOp::Eq),
            ],
            vec![OrderBy::new(0, false)],
        )
        .unwrap();
    assert!(plan.order_by_consumed);
    assert_eq!(plan.idx_num & 8, 0);
}

#[test]
fn test_series_rejects_non_positive_step() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("series", &[]).unwrap();

    let (plan, usages) = registry
        .best_index(
            table,
            vec![
                Constraint::usable(1, ConstraintOp::Eq),
                Constraint::usable(2, ConstraintOp::Eq),
                Constraint::usable(3, ConstraintOp::Eq),
            ],
            vec![],
        )
        .unwrap();
    let args = bind_args(
        &usages,
        vec![Value::Integer(0), Value::Integer(10), Value::Integer(0)],
    );

    let cursor = registry.open(table).unwrap();
    let err = registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::Constraint);
    assert!(registry.eof(cursor).unwrap());
    assert!(registry.last_error(table).unwrap().contains("step"));
}

#[test]
fn test_series_null_bound_matches_nothing() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("series", &[]).unwrap();

    let (plan, usages) = registry
        .best_index(
            table,
            vec![
                Constraint::usable(1, ConstraintOp::Eq),
                Constraint::usable(2, ConstraintOp::Eq),
            ],
            vec![],
        )
        .unwrap();
    let args = bind_args(&usages, vec![Value::Null, Value::Integer(20)]);

    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
        .unwrap();
    assert!(registry.eof(cursor).unwrap());
}

#[test]
fn test_array_sum_scenario() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("array", &[]).unwrap();

    let data: array::Array = Arc::new(vec![
        Value::Integer(1),
        Value::Integer(2),
        Value::Integer(3),
        Value::Integer(4),
    ]);
    let (plan, usages) = registry
        .best_index(table, vec![Constraint::usable(1, ConstraintOp::Eq)], vec![])
        .unwrap();
    assert_eq!(usages[0].argv_index, 1);
    assert!(usages[0].omit);

    let cursor = registry.open(table).unwrap();
    registry
        .filter(
            cursor,
            plan.idx_num,
            plan.idx_str.as_deref(),
            &bind_args(&usages, vec![array::bind_array(Arc::clone(&data))]),
        )
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0]);
    let sum: i64 = rows
        .iter()
        .map(|(_, row)| match row[0] {
            Value::Integer(v) => v,
            _ => 0,
        })
        .sum();
    assert_eq!(sum, 10);

    let rowids: Vec<i64> = rows.iter().map(|(rowid, _)| *rowid).collect();
    assert_eq!(rowids, vec![1, 2, 3, 4]);
}

#[test]
fn test_array_without_binding_is_empty() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("array", &[]).unwrap();

    let (plan, _) = registry.best_index(table, vec![], vec![]).unwrap();
    assert_eq!(plan.estimated_cost, FULL_SCAN_COST);

    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[])
        .unwrap();
    assert!(registry.eof(cursor).unwrap());
}

#[test]
fn test_array_ignores_foreign_binding() {
    let mut registry = registry_with_all_modules();
    let table = registry.connect_table("array", &[]).unwrap();

    let (plan, _) = registry
        .best_index(table, vec![Constraint::usable(1, ConstraintOp::Eq)], vec![])
        .unwrap();
    let cursor = registry.open(table).unwrap();

    // A plain integer where the pointer binding belongs: no rows.
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[Value::Integer(5)])
        .unwrap();
    assert!(registry.eof(cursor).unwrap());
}

#[test]
fn test_logtable_fixed_row_scenario() {
    let mut registry = registry_with_all_modules();
    let table = registry
        .create_table("logtable", &["rows=5".to_string()])
        .unwrap();

    let (plan, _) = registry.best_index(table, vec![], vec![]).unwrap();
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[])
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0, 1]);
    assert_eq!(rows.len(), 5);
    for (i, (rowid, row)) in rows.iter().enumerate() {
        assert_eq!(*rowid, i as i64);
        assert_eq!(row[0], Value::Text(format!("a{i}")));
        assert_eq!(row[1], Value::Text(format!("b{i}")));
    }

    registry.close(cursor).unwrap();
    registry.destroy(table).unwrap();
}

#[test]
fn test_logtable_rejects_unknown_parameter() {
    let mut registry = registry_with_all_modules();
    let err = registry
        .create_table("logtable", &["color=red".to_string()])
        .unwrap_err();
    assert!(err.to_string().contains("unrecognized parameter"));
    assert_eq!(registry.table_count(), 0);
}

#[test]
fn test_memtable_insert_then_rowid_lookup_round_trip() {
    let mut registry = registry_with_all_modules();
    let table = registry
        .create_table("memtable", &["name".to_string(), "score".to_string()])
        .unwrap();

    let rowid = insert_row(
        &mut registry,
        table,
        &[Value::from("alice"), Value::Integer(10)],
    );
    insert_row(&mut registry, table, &[Value::from("bob"), Value::Integer(7)]);

    let (plan, usages) = registry
        .best_index(
            table,
            vec![Constraint::usable(ROWID_COLUMN, ConstraintOp::Eq)],
            vec![],
        )
        .unwrap();
    assert!(plan.flags.contains(ScanFlags::UNIQUE));

    let cursor = registry.open(table).unwrap();
    registry
        .filter(
            cursor,
            plan.idx_num,
            plan.idx_str.as_deref(),
            &bind_args(&usages, vec![Value::Integer(rowid)]),
        )
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0, 1]);
    assert_eq!(
        rows,
        vec![(rowid, vec![Value::from("alice"), Value::Integer(10)])]
    );
}

#[test]
fn test_memtable_iteration_completeness() {
    let mut registry = registry_with_all_modules();
    let table = registry.create_table("memtable", &["n".to_string()]).unwrap();

    for i in 0..6 {
        insert_row(&mut registry, table, &[Value::Integer(i * 100)]);
    }

    let (plan, _) = registry.best_index(table, vec![], vec![]).unwrap();
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[])
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0]);
    assert_eq!(rows.len(), 6);

    let rowids: Vec<i64> = rows.iter().map(|(rowid, _)| *rowid).collect();
    assert!(
        rowids.windows(2).all(|pair| pair[0] < pair[1]),
        "row identifiers must be strictly ascending (distinct, no repeats)"
    );
}

#[test]
fn test_memtable_column_plan_is_self_contained() {
    let mut registry = registry_with_all_modules();
    let table = registry
        .create_table("memtable", &["name".to_string(), "score".to_string()])
        .unwrap();

    insert_row(&mut registry, table, &[Value::from("alice"), Value::Integer(10)]);
    insert_row(&mut registry, table, &[Value::from("bob"), Value::Integer(7)]);
    insert_row(&mut registry, table, &[Value::from("alice"), Value::Integer(3)]);

    let (plan, usages) = registry
        .best_index(table, vec![Constraint::usable(0, ConstraintOp::Eq)], vec![])
        .unwrap();
    assert!(plan.idx_str.is_some(), "column plan travels in the plan string");
    let args = bind_args(&usages, vec![Value::from("alice")]);

    // The same (idx_num, idx_str, argv) tuple reproduces the result set
    // on any cursor, with no other state carried over.
    let mut observed = Vec::new();
    for _ in 0..2 {
        let cursor = registry.open(table).unwrap();
        registry
            .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
            .unwrap();
        observed.push(collect(&mut registry, cursor, &[0, 1]));
        registry.close(cursor).unwrap();
    }
    assert_eq!(observed[0], observed[1]);
    assert_eq!(observed[0].len(), 2);

    // Re-filtering an existing cursor restarts the same search.
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
        .unwrap();
    registry.next(cursor).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &args)
        .unwrap();
    assert_eq!(collect(&mut registry, cursor, &[0, 1]), observed[0]);
}

#[test]
fn test_memtable_range_operators() {
    let mut registry = registry_with_all_modules();
    let table = registry.create_table("memtable", &["score".to_string()]).unwrap();

    for score in [5, 10, 15, 20] {
        insert_row(&mut registry, table, &[Value::Integer(score)]);
    }

    let (plan, usages) = registry
        .best_index(table, vec![Constraint::usable(0, ConstraintOp::Gt)], vec![])
        .unwrap();
    let cursor = registry.open(table).unwrap();
    registry
        .filter(
            cursor,
            plan.idx_num,
            plan.idx_str.as_deref(),
            &bind_args(&usages, vec![Value::Integer(10)]),
        )
        .unwrap();

    let rows = collect(&mut registry, cursor, &[0]);
    let scores: Vec<&Value> = rows.iter().map(|(_, row)| &row[0]).collect();
    assert_eq!(scores, vec![&Value::Integer(15), &Value::Integer(20)]);
}

#[test]
fn test_memtable_plan_costs_reward_equality_constraints() {
    let mut registry = registry_with_all_modules();
    let table = registry
        .create_table("memtable", &["a".to_string(), "b".to_string()])
        .unwrap();

    let (scan, _) = registry.best_index(table, vec![], vec![]).unwrap();
    let (one_eq, _) = registry
        .best_index(table, vec![Constraint::usable(0, ConstraintOp::Eq)], vec![])
        .unwrap();
    let (two_eq, _) = registry
        .best_index(
            table,
            vec![
                Constraint::usable(0, ConstraintOp::Eq),
                Constraint::usable(1, ConstraintOp::Eq),
            ],
            vec![],
        )
        .unwrap();
    let (rowid, _) = registry
        .best_index(
            table,
            vec![Constraint::usable(ROWID_COLUMN, ConstraintOp::Eq)],
            vec![],
        )
        .unwrap();

    assert!(one_eq.estimated_cost < scan.estimated_cost);
    assert!(two_eq.estimated_cost < one_eq.estimated_cost);
    assert!(two_eq.estimated_rows < one_eq.estimated_rows);
    assert!(rowid.estimated_cost < two_eq.estimated_cost);
}

#[test]
fn test_memtable_order_by_rowid_consumption() {
    let mut registry = registry_with_all_modules();
    let table = registry.create_table("memtable", &["a".to_string()]).unwrap();

    let (ascending, _) = registry
        .best_index(table, vec![], vec![OrderBy::new(ROWID_COLUMN, false)])
        .unwrap();
    assert!(ascending.order_by_consumed);

    let (descending, _) = registry
        .best_index(table, vec![], vec![OrderBy::new(ROWID_COLUMN, true)])
        .unwrap();
    assert!(!descending.order_by_consumed);
}

#[test]
fn test_memtable_update_and_delete() {
    let mut registry = registry_with_all_modules();
    let table = registry
        .create_table("memtable", &["name".to_string(), "score".to_string()])
        .unwrap();

    let first = insert_row(&mut registry, table, &[Value::from("alice"), Value::Integer(1)]);
    let second = insert_row(&mut registry, table, &[Value::from("bob"), Value::Integer(2)]);

    // Keyed update replaces the row's column values.
    registry
        .update(
            table,
            &[Value::Integer(first), Value::from("alice"), Value::Integer(99)],
        )
        .unwrap();

    // Delete removes the other row.
    registry.update(table, &[Value::Integer(second)]).unwrap();

    let (plan, _) = registry.best_index(table, vec![], vec![]).unwrap();
    let cursor = registry.open(table).unwrap();
    registry
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[])
        .unwrap();
    let rows = collect(&mut registry, cursor, &[0, 1]);
    assert_eq!(
        rows,
        vec![(first, vec![Value::from("alice"), Value::Integer(99)])]
    );
}

#[test]
fn test_memtable_mutation_failures_report_status_and_message() {
    let mut registry = registry_with_all_modules();
    let table = registry.create_table("memtable", &["a".to_string()]).unwrap();

    let err = registry.update(table, &[Value::Integer(42)]).unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);
    assert!(registry.last_error(table).unwrap().contains("rowid 42"));

    let err = registry
        .update(table, &[Value::Null, Value::Integer(1), Value::Integer(2)])
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::Constraint);
    assert!(registry.last_error(table).unwrap().contains("expected 1"));

    // A failed mutation aborts only that statement; the table still works.
    let rowid = insert_row(&mut registry, table, &[Value::Integer(7)]);
    assert_eq!(rowid, 1);
}
