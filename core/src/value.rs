//! Dynamically-typed scalar values and callback argument views.
//!
//! The engine and table modules exchange data as [`Value`]s: owned,
//! dynamically-typed scalars covering the integer, real, text, blob, and
//! null storage classes, plus an opaque [pointer-tagged](PointerValue)
//! variant used to hand host objects through the engine without copying.
//!
//! A [`ValueVector`] is the read-only view over one callback invocation's
//! argument array. It borrows the arguments for the duration of the
//! callback, so a module cannot retain them past callback return without
//! copying — the lifetime enforces what the native protocol only documents.

use std::any::Any;
use std::fmt;
use std::slice;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{BridgeError, Result};

/// Storage class of a [`Value`].
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{Value, ValueType};
///
/// assert_eq!(Value::Integer(7).value_type(), ValueType::Integer);
/// assert_eq!(Value::Null.value_type(), ValueType::Null);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE float.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Opaque pointer-tagged host object.
    Pointer,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Integer => "integer",
            ValueType::Real => "real",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

/// An opaque host object passed through the engine by reference.
///
/// A pointer value pairs a static tag string with a shared host object.
/// The tag guards against a module interpreting a foreign pointer as the
/// wrong type: [`downcast`](PointerValue::downcast) only succeeds when the
/// tag and the concrete type both match.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use vtab_bridge_core::PointerValue;
///
/// let data = Arc::new(vec![1_i64, 2, 3]);
/// let ptr = PointerValue::new("int-list", data);
///
/// assert_eq!(ptr.tag(), "int-list");
/// assert_eq!(ptr.downcast::<Vec<i64>>().unwrap().len(), 3);
/// assert!(ptr.downcast::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct PointerValue {
    tag: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl PointerValue {
    /// Wraps a shared host object under the given tag.
    pub fn new<T: Send + Sync + 'static>(tag: &'static str, value: Arc<T>) -> Self {
        Self { tag, value }
    }

    /// Returns the tag this pointer was created with.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Recovers the host object if the concrete type matches.
    #[must_use]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Returns `true` when both values share the same underlying object.
    #[must_use]
    pub fn same_object(&self, other: &PointerValue) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for PointerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerValue").field("tag", &self.tag).finish_non_exhaustive()
    }
}

/// A dynamically-typed scalar exchanged across the callback boundary.
///
/// Equality is structural for the plain storage classes; two
/// [`Pointer`](Value::Pointer) values are equal only when they carry the
/// same tag and the same underlying object.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::Value;
///
/// let v = Value::from("hello");
/// assert_eq!(v, Value::Text("hello".to_string()));
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit IEEE float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Opaque pointer-tagged host object.
    Pointer(PointerValue),
}

impl Value {
    /// Returns the storage class of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Pointer(_) => ValueType::Pointer,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Wraps a shared host object as a pointer-tagged value.
    pub fn pointer<T: Send + Sync + 'static>(tag: &'static str, value: Arc<T>) -> Self {
        Value::Pointer(PointerValue::new(tag, value))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a.tag == b.tag && a.same_object(b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<PointerValue> for Value {
    fn from(v: PointerValue) -> Self {
        Value::Pointer(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Conversion failures from a [`Value`] to a concrete Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FromValueError {
    /// The value's storage class does not match the requested type.
    #[error("invalid type: expected {expected}, found {found}")]
    InvalidType {
        /// Storage class the conversion requires.
        expected: ValueType,
        /// Storage class actually present.
        found: ValueType,
    },
    /// An integer value does not fit the requested integer type.
    #[error("integer {0} out of range for requested type")]
    OutOfRange(i64),
}

/// Extraction of a concrete Rust type from a [`Value`].
///
/// Implemented for the scalar types modules typically read from filter and
/// mutation arguments. `Option<T>` maps NULL to `None`.
pub trait FromValue: Sized {
    /// Converts from a value, or reports why the conversion is impossible.
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => Err(FromValueError::InvalidType {
                expected: ValueType::Integer,
                found: other.value_type(),
            }),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| FromValueError::OutOfRange(wide))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(FromValueError::InvalidType {
                expected: ValueType::Real,
                found: other.value_type(),
            }),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        Ok(i64::from_value(value)? != 0)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(FromValueError::InvalidType {
                expected: ValueType::Text,
                found: other.value_type(),
            }),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => Err(FromValueError::InvalidType {
                expected: ValueType::Blob,
                found: other.value_type(),
            }),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, FromValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Read-only view over one callback invocation's argument array.
///
/// The view is valid only for the duration of the callback that receives
/// it; copy values out if they must outlive the call.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{Value, ValueVector};
///
/// let args = vec![Value::Integer(5), Value::from("name")];
/// let vector = ValueVector::new(&args);
///
/// assert_eq!(vector.len(), 2);
/// assert_eq!(vector.get::<i64>(0).unwrap(), 5);
/// assert_eq!(vector.get::<String>(1).unwrap(), "name");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ValueVector<'a> {
    args: &'a [Value],
}

impl<'a> ValueVector<'a> {
    /// Wraps an argument slice.
    #[must_use]
    pub fn new(args: &'a [Value]) -> ValueVector<'a> {
        ValueVector { args }
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns the argument at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds; the planning contract fixes the
    /// argument count, so an out-of-range index is a caller bug.
    #[must_use]
    pub fn value(&self, idx: usize) -> &'a Value {
        &self.args[idx]
    }

    /// Converts the argument at `idx` to a concrete Rust type.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] carrying the argument index
    /// when the value cannot represent the requested type.
    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T> {
        T::from_value(self.value(idx))
            .map_err(|source| BridgeError::InvalidArgument { index: idx, source })
    }

    /// Recovers a pointer-tagged host object from the argument at `idx`.
    ///
    /// Returns `None` when the argument is not a pointer value, carries a
    /// different tag, or wraps a different concrete type.
    #[must_use]
    pub fn pointer<T: Send + Sync + 'static>(&self, idx: usize, tag: &str) -> Option<Arc<T>> {
        match self.value(idx) {
            Value::Pointer(ptr) if ptr.tag() == tag => ptr.downcast::<T>(),
            _ => None,
        }
    }

    /// Returns the sub-view starting at `start`.
    ///
    /// Used by mutation dispatch to separate the row-identifier argument
    /// from the column values that follow it.
    #[must_use]
    pub fn tail(&self, start: usize) -> ValueVector<'a> {
        ValueVector { args: &self.args[start..] }
    }

    /// Iterates over the arguments.
    pub fn iter(&self) -> slice::Iter<'a, Value> {
        self.args.iter()
    }
}

impl<'a, 'v> IntoIterator for &'v ValueVector<'a> {
    type Item = &'a Value;
    type IntoIter = slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Result slot a cursor writes one column value into.
///
/// The engine hands a sink to the column callback; the module deposits the
/// cell value with [`set_result`](ColumnSink::set_result). A sink left
/// untouched reads back as NULL, matching the engine's default for columns
/// a module declines to produce.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::{ColumnSink, Value};
///
/// let mut sink = ColumnSink::new();
/// sink.set_result(42_i64);
/// assert_eq!(sink.take(), Value::Integer(42));
/// assert_eq!(sink.take(), Value::Null);
/// ```
#[derive(Debug, Default)]
pub struct ColumnSink {
    value: Option<Value>,
}

impl ColumnSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits the cell value, replacing any earlier deposit.
    pub fn set_result(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    /// Returns `true` once a value has been deposited.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Takes the deposited value, leaving the sink empty.
    ///
    /// An empty sink yields [`Value::Null`].
    pub fn take(&mut self) -> Value {
        self.value.take().unwrap_or(Value::Null)
    }
}
