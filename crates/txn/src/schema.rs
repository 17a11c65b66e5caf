//! Typed table schemas
//!
//! A [`TableSchema`] names its columns, their types, nullability and
//! defaults, and the ordered list of primary-key columns. Rows are checked
//! against the schema before they are buffered and again when they are
//! applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use streamvault_core::{Error, KeyPart, Result, Value};

/// A row: column name → value
pub type Row = BTreeMap<String, Value>;

/// Column data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// BOOL
    Bool,
    /// INT64
    Int64,
    /// FLOAT64 (accepts INT64 values, widened on write)
    Float64,
    /// STRING(n) or unbounded STRING/TEXT
    String {
        /// Maximum length in characters
        max_len: Option<usize>,
    },
    /// TIMESTAMP
    Timestamp,
    /// ARRAY<T>
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// `STRING(max_len)`
    pub fn string(max_len: usize) -> Self {
        ColumnType::String {
            max_len: Some(max_len),
        }
    }

    /// Unbounded string
    pub fn text() -> Self {
        ColumnType::String { max_len: None }
    }

    /// `ARRAY<inner>`
    pub fn array(inner: ColumnType) -> Self {
        ColumnType::Array(Box::new(inner))
    }

    /// Check (and for FLOAT64, widen) a non-null value
    fn coerce(&self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (ColumnType::Bool, v @ Value::Bool(_)) => Ok(v),
            (ColumnType::Int64, v @ Value::Int(_)) => Ok(v),
            (ColumnType::Float64, v @ Value::Float(_)) => Ok(v),
            (ColumnType::Float64, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ColumnType::String { max_len }, Value::String(s)) => match max_len {
                Some(max) if s.chars().count() > *max => {
                    Err(format!("string of length {} exceeds STRING({})", s.chars().count(), max))
                }
                _ => Ok(Value::String(s)),
            },
            (ColumnType::Timestamp, v @ Value::Timestamp(_)) => Ok(v),
            (ColumnType::Array(inner), Value::Array(items)) => items
                .into_iter()
                .map(|item| {
                    if item.is_null() {
                        Err("array elements must not be NULL".to_string())
                    } else {
                        inner.coerce(item)
                    }
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            (ty, v) => Err(format!("expected {}, got {}", ty, v.type_name())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Bool => write!(f, "BOOL"),
            ColumnType::Int64 => write!(f, "INT64"),
            ColumnType::Float64 => write!(f, "FLOAT64"),
            ColumnType::String { max_len: Some(n) } => write!(f, "STRING({})", n),
            ColumnType::String { max_len: None } => write!(f, "STRING(MAX)"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Array(inner) => write!(f, "ARRAY<{}>", inner),
        }
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Data type
    pub ty: ColumnType,
    /// Whether NULL is allowed
    pub nullable: bool,
    /// Value used when an insert omits the column
    pub default: Option<Value>,
}

impl ColumnDef {
    /// Nullable column without default
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            nullable: true,
            default: None,
        }
    }

    /// Mark NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default value
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Composite primary key of a row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(pub Vec<KeyPart>);

impl RowKey {
    /// Key made of one part
    pub fn single(part: impl Into<KeyPart>) -> Self {
        RowKey(vec![part.into()])
    }

    /// Key parts in primary-key order
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        RowKey::single(s)
    }
}

impl From<String> for RowKey {
    fn from(s: String) -> Self {
        RowKey::single(s)
    }
}

impl From<Vec<KeyPart>> for RowKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        RowKey(parts)
    }
}

/// Typed relation definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Primary-key column names, in key order
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Start a schema with no columns
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Add a column
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Look up a column definition
    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True if `name` is a primary-key column
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Check the schema itself is well formed
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_input("table name must not be empty"));
        }
        if self.primary_key.is_empty() {
            return Err(Error::schema(&self.name, "primary key must not be empty"));
        }
        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::schema(
                    &self.name,
                    format!("duplicate column '{}'", column.name),
                ));
            }
            if let Some(default) = &column.default {
                column.ty.coerce(default.clone()).map_err(|msg| {
                    Error::schema(&self.name, format!("default of '{}': {}", column.name, msg))
                })?;
            }
        }
        for key in &self.primary_key {
            let def = self.column_def(key).ok_or_else(|| {
                Error::schema(&self.name, format!("primary key column '{}' not declared", key))
            })?;
            if def.nullable {
                return Err(Error::schema(
                    &self.name,
                    format!("primary key column '{}' must be NOT NULL", key),
                ));
            }
            if matches!(def.ty, ColumnType::Float64 | ColumnType::Array(_)) {
                return Err(Error::schema(
                    &self.name,
                    format!("primary key column '{}' has unkeyable type {}", key, def.ty),
                ));
            }
        }
        Ok(())
    }

    /// Check one column value against its definition
    pub fn check_value(&self, column: &str, value: Value) -> Result<Value> {
        let def = self.column_def(column).ok_or_else(|| {
            Error::schema(&self.name, format!("unknown column '{}'", column))
        })?;
        if value.is_null() {
            return if def.nullable {
                Ok(Value::Null)
            } else {
                Err(Error::schema(
                    &self.name,
                    format!("column '{}' is NOT NULL", column),
                ))
            };
        }
        def.ty
            .coerce(value)
            .map_err(|msg| Error::schema(&self.name, format!("column '{}': {}", column, msg)))
    }

    /// Validate a full row for insert
    ///
    /// Unknown columns are rejected, omitted columns take their default (or
    /// NULL), and every value is type-checked. The result holds every
    /// declared column.
    pub fn normalize_row(&self, mut row: Row) -> Result<Row> {
        if let Some(unknown) = row.keys().find(|k| self.column_def(k).is_none()) {
            return Err(Error::schema(
                &self.name,
                format!("unknown column '{}'", unknown),
            ));
        }
        let mut normalized = Row::new();
        for def in &self.columns {
            let value = row
                .remove(&def.name)
                .or_else(|| def.default.clone())
                .unwrap_or(Value::Null);
            normalized.insert(def.name.clone(), self.check_value(&def.name, value)?);
        }
        Ok(normalized)
    }

    /// Extract the primary key of a normalized row
    pub fn key_of(&self, row: &Row) -> Result<RowKey> {
        self.primary_key
            .iter()
            .map(|column| {
                row.get(column)
                    .and_then(KeyPart::from_value)
                    .ok_or_else(|| {
                        Error::schema(
                            &self.name,
                            format!("primary key column '{}' missing or not keyable", column),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map(RowKey)
    }

    /// Check a key has the right arity and part types
    pub fn check_key(&self, key: &RowKey) -> Result<()> {
        if key.0.len() != self.primary_key.len() {
            return Err(Error::schema(
                &self.name,
                format!(
                    "key {} has {} parts, primary key has {}",
                    key,
                    key.0.len(),
                    self.primary_key.len()
                ),
            ));
        }
        for (part, column) in key.0.iter().zip(&self.primary_key) {
            self.check_value(column, part.to_value())?;
        }
        Ok(())
    }
}
