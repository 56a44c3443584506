//! Schema model types for remodel.
//!
//! A [`SchemaModel`] is the relational shape of an object model at one point
//! in time: tables, their columns, indexes, foreign keys and full-text index.
//! The upgrade engine compares two of these and never mutates either.
//!
//! Columns are addressed by their *logical* name (the entity field name).
//! A column may be mapped to a different *storage* name, which is what the
//! database sees. Indexes, foreign keys and full-text indexes always refer to
//! logical names, so a storage rename never changes their identity.
//!
//! ```
//! use remodel_schema::{Column, ColumnType, SchemaModel, Table};
//!
//! let model = SchemaModel::from_tables([
//!     Table::new("author")
//!         .column(Column::new("Id", ColumnType::Int64))
//!         .primary_key(&["Id"]),
//!     Table::new("book")
//!         .column(Column::new("Id", ColumnType::Int64))
//!         .column(Column::new("Title", ColumnType::String).mapped("title"))
//!         .column(Column::new("AuthorId", ColumnType::Int64))
//!         .primary_key(&["Id"])
//!         .index(&["Title"])
//!         .foreign_key(&["AuthorId"], "author", &["Id"])
//!         .full_text("Title", "English"),
//! ])
//! .unwrap();
//!
//! model.validate().unwrap();
//! ```

use indexmap::IndexMap;
use remodel_sql::{foreign_key_name, full_text_index_name, index_name, unique_index_name};
use std::fmt;

mod action;
mod simulate;
mod validate;

pub use action::{ActionKind, SchemaAction};
pub use simulate::ApplyError;
pub use validate::MalformedSchemaError;

/// Semantic column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    DateTime,
    /// Bounded string
    String,
    /// Unbounded text
    Text,
}

impl ColumnType {
    /// Postgres type used by the reference emitter.
    pub fn to_sql(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Int16 => "SMALLINT",
            ColumnType::Int32 => "INTEGER",
            ColumnType::Int64 => "BIGINT",
            ColumnType::Float32 => "REAL",
            ColumnType::Float64 => "DOUBLE PRECISION",
            ColumnType::DateTime => "TIMESTAMPTZ",
            ColumnType::String => "VARCHAR",
            ColumnType::Text => "TEXT",
        }
    }

    /// Whether a full-text index may target a column of this type.
    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Logical (field) name
    pub name: String,
    /// Semantic type
    pub column_type: ColumnType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Storage name, when it differs from the logical name
    pub mapped_name: Option<String>,
}

impl Column {
    /// A non-nullable, unmapped column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            mapped_name: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Map this field to a different storage name.
    pub fn mapped(mut self, storage_name: impl Into<String>) -> Self {
        self.mapped_name = Some(storage_name.into());
        self
    }

    /// The name the database sees.
    pub fn storage_name(&self) -> &str {
        self.mapped_name.as_deref().unwrap_or(&self.name)
    }

    /// Same type and nullability. Storage name is not compared.
    pub fn same_shape(&self, other: &Column) -> bool {
        self.column_type == other.column_type && self.nullable == other.nullable
    }
}

/// A (possibly unique) index over logical column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Column(s) in the index, in order
    pub columns: Vec<String>,
    /// Whether this is a unique index
    pub unique: bool,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        }
    }

    /// Identity used when comparing models: column tuple plus uniqueness.
    pub fn key(&self) -> (&[String], bool) {
        (&self.columns, self.unique)
    }

    pub fn touches(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// A foreign key constraint owned by the table that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Column(s) in the owning (child) table
    pub columns: Vec<String>,
    /// Referenced (parent) table
    pub references_table: String,
    /// Referenced column(s), positionally paired with `columns`
    pub references_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(columns: &[&str], references_table: &str, references_columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references_table: references_table.to_string(),
            references_columns: references_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Constraint name when owned by `table`.
    pub fn constraint_name(&self, table: &str) -> String {
        foreign_key_name(table, &self.columns, &self.references_table)
    }

    pub fn touches(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Whether this key points at `column` of `table`.
    pub fn references(&self, table: &str, column: &str) -> bool {
        self.references_table == table && self.references_columns.iter().any(|c| c == column)
    }
}

/// A full-text index over one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullTextIndex {
    /// Logical column name
    pub column: String,
    /// Analyzer language tag (e.g. "English")
    pub language: String,
}

impl FullTextIndex {
    pub fn new(column: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            language: language.into(),
        }
    }

    /// Index name when owned by `table`.
    pub fn index_name(&self, table: &str) -> String {
        full_text_index_name(table, &self.column)
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<Column>,
    /// Primary key column names (logical)
    pub primary_key: Vec<String>,
    /// Indices
    pub indices: Vec<Index>,
    /// Foreign keys
    pub foreign_keys: Vec<ForeignKey>,
    /// Full-text index, at most one per table
    pub full_text: Option<FullTextIndex>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indices: Vec::new(),
            foreign_keys: Vec::new(),
            full_text: None,
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add a non-unique index named by convention.
    pub fn index(mut self, columns: &[&str]) -> Self {
        let name = index_name(&self.name, columns);
        self.indices.push(Index::new(name, columns, false));
        self
    }

    /// Add a unique index named by convention.
    pub fn unique_index(mut self, columns: &[&str]) -> Self {
        let name = unique_index_name(&self.name, columns);
        self.indices.push(Index::new(name, columns, true));
        self
    }

    /// Add an explicitly named index.
    pub fn with_index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    pub fn foreign_key(
        mut self,
        columns: &[&str],
        references_table: &str,
        references_columns: &[&str],
    ) -> Self {
        self.foreign_keys
            .push(ForeignKey::new(columns, references_table, references_columns));
        self
    }

    pub fn full_text(mut self, column: &str, language: &str) -> Self {
        self.full_text = Some(FullTextIndex::new(column, language));
        self
    }

    /// Look up a column by logical name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column by storage name.
    pub fn column_by_storage(&self, storage_name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.storage_name() == storage_name)
    }

    /// Storage name for a logical column, falling back to the logical name.
    pub fn storage_name_of<'a>(&'a self, column: &'a str) -> &'a str {
        self.get_column(column)
            .map(|c| c.storage_name())
            .unwrap_or(column)
    }

    /// The table without indexes, foreign keys or full-text index.
    ///
    /// Table creation and removal carry only the shell; everything else is a
    /// separate action so it can be ordered independently.
    pub fn shell(&self) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
            indices: Vec::new(),
            foreign_keys: Vec::new(),
            full_text: None,
        }
    }
}

/// A complete schema model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaModel {
    /// Tables in the model, indexed by name
    pub tables: IndexMap<String, Table>,
}

impl SchemaModel {
    /// Create a new empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model, rejecting duplicate table names.
    pub fn from_tables(
        tables: impl IntoIterator<Item = Table>,
    ) -> Result<Self, MalformedSchemaError> {
        let mut model = Self::new();
        for table in tables {
            model.insert_table(table)?;
        }
        Ok(model)
    }

    /// Add a table, rejecting a duplicate name.
    pub fn insert_table(&mut self, table: Table) -> Result<(), MalformedSchemaError> {
        if self.tables.contains_key(&table.name) {
            return Err(MalformedSchemaError::DuplicateTable { table: table.name });
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .map(|t| t.get_column(column).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests;
