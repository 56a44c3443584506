//! Atomic structural actions.

use crate::{Column, ForeignKey, FullTextIndex, Index, Table};
use std::fmt;

/// A single structural change.
///
/// Every variant carries the table it targets and the whole object it
/// creates or removes, so an action can be applied on its own and undone
/// with [`SchemaAction::inverse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaAction {
    /// Create a table. Carries the shell (columns and primary key only).
    CreateTable(Table),
    /// Drop a table. Carries the shell it had.
    DropTable(Table),
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: Column,
    },
    /// Change the storage name of a column, keeping its data.
    RenameColumn {
        table: String,
        /// Logical column name
        column: String,
        /// Previous storage name
        from: String,
        /// New storage name
        to: String,
    },
    CreateIndex {
        table: String,
        index: Index,
    },
    DropIndex {
        table: String,
        index: Index,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
    DropForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
    CreateFullTextIndex {
        table: String,
        index: FullTextIndex,
    },
    DropFullTextIndex {
        table: String,
        index: FullTextIndex,
    },
}

/// Action kinds, declared in tie-break order: drops first (innermost
/// objects before their containers), then creations (containers before
/// their contents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    DropForeignKey,
    DropIndex,
    DropFullTextIndex,
    DropColumn,
    RenameColumn,
    DropTable,
    CreateTable,
    AddColumn,
    CreateIndex,
    AddForeignKey,
    CreateFullTextIndex,
}

impl SchemaAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            SchemaAction::CreateTable(_) => ActionKind::CreateTable,
            SchemaAction::DropTable(_) => ActionKind::DropTable,
            SchemaAction::AddColumn { .. } => ActionKind::AddColumn,
            SchemaAction::DropColumn { .. } => ActionKind::DropColumn,
            SchemaAction::RenameColumn { .. } => ActionKind::RenameColumn,
            SchemaAction::CreateIndex { .. } => ActionKind::CreateIndex,
            SchemaAction::DropIndex { .. } => ActionKind::DropIndex,
            SchemaAction::AddForeignKey { .. } => ActionKind::AddForeignKey,
            SchemaAction::DropForeignKey { .. } => ActionKind::DropForeignKey,
            SchemaAction::CreateFullTextIndex { .. } => ActionKind::CreateFullTextIndex,
            SchemaAction::DropFullTextIndex { .. } => ActionKind::DropFullTextIndex,
        }
    }

    /// The table this action targets (the child table for foreign keys).
    pub fn table(&self) -> &str {
        match self {
            SchemaAction::CreateTable(t) | SchemaAction::DropTable(t) => &t.name,
            SchemaAction::AddColumn { table, .. }
            | SchemaAction::DropColumn { table, .. }
            | SchemaAction::RenameColumn { table, .. }
            | SchemaAction::CreateIndex { table, .. }
            | SchemaAction::DropIndex { table, .. }
            | SchemaAction::AddForeignKey { table, .. }
            | SchemaAction::DropForeignKey { table, .. }
            | SchemaAction::CreateFullTextIndex { table, .. }
            | SchemaAction::DropFullTextIndex { table, .. } => table,
        }
    }

    /// Logical columns of [`Self::table`] this action reads or writes.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            SchemaAction::CreateTable(_) | SchemaAction::DropTable(_) => Vec::new(),
            SchemaAction::AddColumn { column, .. } | SchemaAction::DropColumn { column, .. } => {
                vec![column.name.as_str()]
            }
            SchemaAction::RenameColumn { column, .. } => vec![column.as_str()],
            SchemaAction::CreateIndex { index, .. } | SchemaAction::DropIndex { index, .. } => {
                index.columns.iter().map(|c| c.as_str()).collect()
            }
            SchemaAction::AddForeignKey { foreign_key, .. }
            | SchemaAction::DropForeignKey { foreign_key, .. } => {
                foreign_key.columns.iter().map(|c| c.as_str()).collect()
            }
            SchemaAction::CreateFullTextIndex { index, .. }
            | SchemaAction::DropFullTextIndex { index, .. } => vec![index.column.as_str()],
        }
    }

    /// The foreign key carried by `AddForeignKey` / `DropForeignKey`.
    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        match self {
            SchemaAction::AddForeignKey { foreign_key, .. }
            | SchemaAction::DropForeignKey { foreign_key, .. } => Some(foreign_key),
            _ => None,
        }
    }

    /// Whether this action creates structure (as opposed to removing it).
    pub fn is_creation(&self) -> bool {
        self.kind() >= ActionKind::CreateTable
    }

    /// The action that undoes this one.
    pub fn inverse(&self) -> SchemaAction {
        match self.clone() {
            SchemaAction::CreateTable(t) => SchemaAction::DropTable(t),
            SchemaAction::DropTable(t) => SchemaAction::CreateTable(t),
            SchemaAction::AddColumn { table, column } => SchemaAction::DropColumn { table, column },
            SchemaAction::DropColumn { table, column } => SchemaAction::AddColumn { table, column },
            SchemaAction::RenameColumn {
                table,
                column,
                from,
                to,
            } => SchemaAction::RenameColumn {
                table,
                column,
                from: to,
                to: from,
            },
            SchemaAction::CreateIndex { table, index } => SchemaAction::DropIndex { table, index },
            SchemaAction::DropIndex { table, index } => SchemaAction::CreateIndex { table, index },
            SchemaAction::AddForeignKey { table, foreign_key } => {
                SchemaAction::DropForeignKey { table, foreign_key }
            }
            SchemaAction::DropForeignKey { table, foreign_key } => {
                SchemaAction::AddForeignKey { table, foreign_key }
            }
            SchemaAction::CreateFullTextIndex { table, index } => {
                SchemaAction::DropFullTextIndex { table, index }
            }
            SchemaAction::DropFullTextIndex { table, index } => {
                SchemaAction::CreateFullTextIndex { table, index }
            }
        }
    }
}

impl fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaAction::CreateTable(t) => write!(f, "+ table {}", t.name),
            SchemaAction::DropTable(t) => write!(f, "- table {}", t.name),
            SchemaAction::AddColumn { table, column } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(
                    f,
                    "{}: + column {} {}{}",
                    table, column.name, column.column_type, nullable
                )?;
                if let Some(mapped) = &column.mapped_name {
                    write!(f, " as {}", mapped)?;
                }
                Ok(())
            }
            SchemaAction::DropColumn { table, column } => {
                write!(f, "{}: - column {}", table, column.name)
            }
            SchemaAction::RenameColumn {
                table,
                column,
                from,
                to,
            } => write!(f, "{}: ~ column {}: {} -> {}", table, column, from, to),
            SchemaAction::CreateIndex { table, index } => {
                let unique = if index.unique { "UNIQUE " } else { "" };
                write!(
                    f,
                    "{}: + {}INDEX {} ({})",
                    table,
                    unique,
                    index.name,
                    index.columns.join(", ")
                )
            }
            SchemaAction::DropIndex { table, index } => {
                write!(f, "{}: - INDEX {}", table, index.name)
            }
            SchemaAction::AddForeignKey { table, foreign_key } => write!(
                f,
                "{}: + FOREIGN KEY ({}) -> {}.{}",
                table,
                foreign_key.columns.join(", "),
                foreign_key.references_table,
                foreign_key.references_columns.join(", ")
            ),
            SchemaAction::DropForeignKey { table, foreign_key } => write!(
                f,
                "{}: - FOREIGN KEY ({}) -> {}.{}",
                table,
                foreign_key.columns.join(", "),
                foreign_key.references_table,
                foreign_key.references_columns.join(", ")
            ),
            SchemaAction::CreateFullTextIndex { table, index } => {
                write!(f, "{}: + FULLTEXT ({}, {})", table, index.column, index.language)
            }
            SchemaAction::DropFullTextIndex { table, index } => {
                write!(f, "{}: - FULLTEXT ({}, {})", table, index.column, index.language)
            }
        }
    }
}
