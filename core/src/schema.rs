//! Logical schema declaration for virtual tables.
//!
//! On connect a module declares the logical shape of its table as a
//! [`TableSchema`]: ordered columns with a type affinity and a hidden
//! flag. Hidden columns never appear in a `SELECT *` projection; they
//! model filter parameters a query can constrain (the numeric-range and
//! array modules use them for their bounds and bindings).
//!
//! A declaration is validated before the registry accepts the connection;
//! an invalid schema fails the connect without producing a live handle.

use thiserror::Error;

/// Type affinity of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeAffinity {
    /// No preferred storage class (the default).
    #[default]
    Any,
    /// Integer storage.
    Integer,
    /// Floating-point storage.
    Real,
    /// Text storage.
    Text,
    /// Blob storage.
    Blob,
}

/// One declared column.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{ColumnDef, TypeAffinity};
///
/// let value = ColumnDef::new("value", TypeAffinity::Integer);
/// let start = ColumnDef::new("start", TypeAffinity::Integer).hidden();
/// assert!(!value.hidden);
/// assert!(start.hidden);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type affinity.
    pub affinity: TypeAffinity,
    /// Hidden columns model filter parameters rather than projected data.
    pub hidden: bool,
}

impl ColumnDef {
    /// Creates a visible column.
    pub fn new(name: impl Into<String>, affinity: TypeAffinity) -> Self {
        Self { name: name.into(), affinity, hidden: false }
    }

    /// Marks the column hidden.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Schema declaration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The declaration has no columns at all.
    #[error("a table schema must declare at least one column")]
    NoColumns,
    /// A column name is empty or whitespace-only.
    #[error("column {0} has an empty name")]
    EmptyColumnName(usize),
    /// Two columns share a name.
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// The logical schema a module declares on connect.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{ColumnDef, TableSchema, TypeAffinity};
///
/// let schema = TableSchema::new()
///     .with_column(ColumnDef::new("value", TypeAffinity::Integer))
///     .with_column(ColumnDef::new("start", TypeAffinity::Integer).hidden());
///
/// assert!(schema.validate().is_ok());
/// assert_eq!(schema.column_index("start"), Some(1));
/// assert_eq!(schema.visible_column_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    /// Declared columns, in logical column-index order.
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the logical index of the named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Number of visible (non-hidden) columns.
    #[must_use]
    pub fn visible_column_count(&self) -> usize {
        self.columns.iter().filter(|c| !c.hidden).count()
    }

    /// Checks the declaration's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found: no columns, an empty
    /// column name, or a duplicate column name.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns);
        }
        let mut seen: Vec<&str> = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            let name = column.name.trim();
            if name.is_empty() {
                return Err(SchemaError::EmptyColumnName(i));
            }
            if seen.contains(&name) {
                return Err(SchemaError::DuplicateColumn(name.to_string()));
            }
            seen.push(name);
        }
        Ok(())
    }
}
