//! Query-planning records exchanged through the best-index callback.
//!
//! For each candidate query the engine builds an [`IndexInfo`] from the
//! WHERE-clause [`Constraint`]s and ORDER-BY terms, hands it to the
//! module's planning callback, and reads back an [`IndexPlan`] plus one
//! [`ConstraintUsage`] per constraint. The plan id and plan string are the
//! only planning state that survives to the cursor's filter call, so a
//! module must encode its whole access strategy into them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// WHERE-clause operator attached to a [`Constraint`].
///
/// Numeric codes follow the engine's wire values so plans and logs can
/// round-trip them.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::ConstraintOp;
///
/// assert_eq!(ConstraintOp::Eq.code(), 2);
/// assert_eq!(ConstraintOp::from_code(2), Some(ConstraintOp::Eq));
/// assert_eq!(ConstraintOp::from_code(99), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintOp {
    /// `column = ?`
    Eq,
    /// `column > ?`
    Gt,
    /// `column <= ?`
    Le,
    /// `column < ?`
    Lt,
    /// `column >= ?`
    Ge,
    /// `column MATCH ?`
    Match,
    /// `column LIKE ?`
    Like,
    /// `column GLOB ?`
    Glob,
    /// `column REGEXP ?`
    Regexp,
    /// `column != ?`
    Ne,
    /// `column IS NOT ?`
    IsNot,
    /// `column IS NOT NULL`
    IsNotNull,
    /// `column IS NULL`
    IsNull,
    /// `column IS ?`
    Is,
}

impl ConstraintOp {
    /// Returns the engine's numeric code for this operator.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            ConstraintOp::Eq => 2,
            ConstraintOp::Gt => 4,
            ConstraintOp::Le => 8,
            ConstraintOp::Lt => 16,
            ConstraintOp::Ge => 32,
            ConstraintOp::Match => 64,
            ConstraintOp::Like => 65,
            ConstraintOp::Glob => 66,
            ConstraintOp::Regexp => 67,
            ConstraintOp::Ne => 68,
            ConstraintOp::IsNot => 69,
            ConstraintOp::IsNotNull => 70,
            ConstraintOp::IsNull => 71,
            ConstraintOp::Is => 72,
        }
    }

    /// Decodes an operator from the engine's numeric code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<ConstraintOp> {
        match code {
            2 => Some(ConstraintOp::Eq),
            4 => Some(ConstraintOp::Gt),
            8 => Some(ConstraintOp::Le),
            16 => Some(ConstraintOp::Lt),
            32 => Some(ConstraintOp::Ge),
            64 => Some(ConstraintOp::Match),
            65 => Some(ConstraintOp::Like),
            66 => Some(ConstraintOp::Glob),
            67 => Some(ConstraintOp::Regexp),
            68 => Some(ConstraintOp::Ne),
            69 => Some(ConstraintOp::IsNot),
            70 => Some(ConstraintOp::IsNotNull),
            71 => Some(ConstraintOp::IsNull),
            72 => Some(ConstraintOp::Is),
            _ => None,
        }
    }
}

/// Column index standing for the row identifier in constraints and
/// order-by terms.
pub const ROWID_COLUMN: i32 = -1;

/// One WHERE-clause constraint, produced by the engine for one planning
/// call.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{Constraint, ConstraintOp, ROWID_COLUMN};
///
/// let by_rowid = Constraint::usable(ROWID_COLUMN, ConstraintOp::Eq);
/// assert!(by_rowid.usable);
/// assert_eq!(by_rowid.column, -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// Constrained column; [`ROWID_COLUMN`] for the row identifier.
    pub column: i32,
    /// Comparison operator.
    pub op: ConstraintOp,
    /// Whether the engine can supply this constraint's value to the
    /// cursor's filter call. Unusable constraints must not be assigned an
    /// argv slot.
    pub usable: bool,
}

impl Constraint {
    /// Creates a constraint.
    #[must_use]
    pub fn new(column: i32, op: ConstraintOp, usable: bool) -> Self {
        Self { column, op, usable }
    }

    /// Creates a usable constraint.
    #[must_use]
    pub fn usable(column: i32, op: ConstraintOp) -> Self {
        Self::new(column, op, true)
    }
}

/// One ORDER-BY term, produced by the engine for one planning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    /// Ordered column; [`ROWID_COLUMN`] for the row identifier.
    pub column: i32,
    /// `true` for descending order.
    pub desc: bool,
}

impl OrderBy {
    /// Creates an order-by term.
    #[must_use]
    pub fn new(column: i32, desc: bool) -> Self {
        Self { column, desc }
    }
}

/// The module's declaration of how one constraint participates in its
/// chosen plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintUsage {
    /// 1-based position of this constraint's value in the filter argument
    /// vector; 0 when the plan does not consume it.
    pub argv_index: i32,
    /// `true` when the module enforces the predicate itself, so the engine
    /// need not re-check it on returned rows.
    pub omit: bool,
}

bitflags! {
    /// Scan-property flags a plan may set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScanFlags: u32 {
        /// The scan visits at most one row.
        const UNIQUE = 0x1;
    }
}

/// The record a module returns from query planning.
///
/// The plan id and plan string are echoed back verbatim on the subsequent
/// cursor filter call for the same query; no other planning state
/// survives between the two calls.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    /// Opaque plan id chosen by the module.
    pub idx_num: i32,
    /// Optional opaque plan string chosen by the module.
    pub idx_str: Option<String>,
    /// `true` when the plan's natural production order already satisfies
    /// the query's ordering request, letting the engine skip a post-sort.
    pub order_by_consumed: bool,
    /// Estimated cost of running this plan.
    pub estimated_cost: f64,
    /// Estimated number of rows the plan produces.
    pub estimated_rows: i64,
    /// Scan-property flags.
    pub flags: ScanFlags,
}

/// Estimated cost reported when a plan has nothing to narrow the scan.
///
/// The exact magnitude is not meaningful; what matters is that any plan
/// consuming at least one usable constraint undercuts it.
pub const FULL_SCAN_COST: f64 = 1e99;

/// Default row estimate before a module overrides it.
const DEFAULT_ESTIMATED_ROWS: i64 = 25;

/// Planning boundary object passed to the best-index callback.
///
/// The read side carries the engine's constraints, order-by terms, and
/// column-usage mask. The write side collects the module's plan: argv
/// slot assignments per constraint, plan id/string, ordering consumption,
/// and cost estimates. [`into_outcome`](IndexInfo::into_outcome) validates
/// the assignments and splits the result into an [`IndexPlan`] and the
/// per-constraint usages.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{Constraint, ConstraintOp, IndexInfo};
///
/// let mut info = IndexInfo::new(vec![Constraint::usable(0, ConstraintOp::Eq)], vec![]);
/// info.constraint_usage(0).argv_index = 1;
/// info.constraint_usage(0).omit = true;
/// info.set_idx_num(1);
/// info.set_estimated_cost(10.0);
///
/// let (plan, usages) = info.into_outcome().unwrap();
/// assert_eq!(plan.idx_num, 1);
/// assert_eq!(usages[0].argv_index, 1);
/// ```
#[derive(Debug)]
pub struct IndexInfo {
    constraints: Vec<Constraint>,
    order_by: Vec<OrderBy>,
    col_used: u64,
    usages: Vec<ConstraintUsage>,
    idx_num: i32,
    idx_str: Option<String>,
    order_by_consumed: bool,
    estimated_cost: f64,
    estimated_rows: i64,
    flags: ScanFlags,
}

impl IndexInfo {
    /// Creates a planning request from the engine's constraint set and
    /// ordering request.
    #[must_use]
    pub fn new(constraints: Vec<Constraint>, order_by: Vec<OrderBy>) -> Self {
        let usages = vec![ConstraintUsage::default(); constraints.len()];
        Self {
            constraints,
            order_by,
            col_used: u64::MAX,
            usages,
            idx_num: 0,
            idx_str: None,
            order_by_consumed: false,
            estimated_cost: FULL_SCAN_COST,
            estimated_rows: DEFAULT_ESTIMATED_ROWS,
            flags: ScanFlags::empty(),
        }
    }

    /// Restricts the column-usage mask (bit `i` set when column `i` is
    /// referenced by the statement; the top bit covers columns 63+).
    #[must_use]
    pub fn with_col_used(mut self, col_used: u64) -> Self {
        self.col_used = col_used;
        self
    }

    /// The engine's WHERE-clause constraints.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The engine's ORDER-BY terms.
    #[must_use]
    pub fn order_bys(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Number of ORDER-BY terms.
    #[must_use]
    pub fn num_of_order_by(&self) -> usize {
        self.order_by.len()
    }

    /// Mask of columns the statement actually reads.
    #[must_use]
    pub fn col_used(&self) -> u64 {
        self.col_used
    }

    /// The usage slot for constraint `idx`, for the module to fill in.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not a valid constraint index.
    pub fn constraint_usage(&mut self, idx: usize) -> &mut ConstraintUsage {
        &mut self.usages[idx]
    }

    /// Sets the opaque plan id.
    pub fn set_idx_num(&mut self, idx_num: i32) {
        self.idx_num = idx_num;
    }

    /// Sets the opaque plan string.
    pub fn set_idx_str(&mut self, idx_str: impl Into<String>) {
        self.idx_str = Some(idx_str.into());
    }

    /// Declares that the plan's natural order satisfies the ordering
    /// request.
    pub fn set_order_by_consumed(&mut self, consumed: bool) {
        self.order_by_consumed = consumed;
    }

    /// Sets the estimated cost of the plan.
    pub fn set_estimated_cost(&mut self, cost: f64) {
        self.estimated_cost = cost;
    }

    /// Sets the estimated row count of the plan.
    pub fn set_estimated_rows(&mut self, rows: i64) {
        self.estimated_rows = rows;
    }

    /// Sets scan-property flags.
    pub fn set_flags(&mut self, flags: ScanFlags) {
        self.flags = flags;
    }

    /// Validates the module's argv assignments and splits the planning
    /// output into the plan record and the per-constraint usages.
    ///
    /// Assignments must reference usable constraints only and occupy a
    /// contiguous 1-based range with no position used twice — the filter
    /// call binds argument `n` from the constraint assigned position `n`,
    /// so a gap or duplicate would silently misalign values.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Misuse`] describing the invalid assignment.
    pub fn into_outcome(self) -> Result<(IndexPlan, Vec<ConstraintUsage>)> {
        let mut positions: Vec<i32> = Vec::new();
        for (i, usage) in self.usages.iter().enumerate() {
            if usage.argv_index < 0 {
                return Err(BridgeError::misuse(format!(
                    "constraint {i} assigned negative argv position {}",
                    usage.argv_index
                )));
            }
            if usage.argv_index > 0 {
                if !self.constraints[i].usable {
                    return Err(BridgeError::misuse(format!(
                        "constraint {i} is not usable but was assigned argv position {}",
                        usage.argv_index
                    )));
                }
                positions.push(usage.argv_index);
            }
        }
        positions.sort_unstable();
        for (expected, position) in (1..).zip(&positions) {
            if *position != expected {
                return Err(BridgeError::misuse(format!(
                    "argv positions must form a contiguous 1-based range, got {positions:?}"
                )));
            }
        }

        let plan = IndexPlan {
            idx_num: self.idx_num,
            idx_str: self.idx_str,
            order_by_consumed: self.order_by_consumed,
            estimated_cost: self.estimated_cost,
            estimated_rows: self.estimated_rows,
            flags: self.flags,
        };
        Ok((plan, self.usages))
    }
}
