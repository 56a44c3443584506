//! Applying actions to a model, and comparing models structurally.
//!
//! Every precondition is checked before the model is touched, so a failed
//! [`SchemaModel::apply`] leaves the model exactly as it was.

use crate::{Column, SchemaAction, SchemaModel, Table};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// An action whose preconditions do not hold against a model.
///
/// `action` is the offending action, rendered for context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    TableNotFound {
        action: String,
        table: String,
    },
    TableAlreadyExists {
        action: String,
        table: String,
    },
    /// The table still owns indexes or foreign keys, or is referenced.
    TableHasDependents {
        action: String,
        table: String,
        dependents: Vec<String>,
    },
    ColumnNotFound {
        action: String,
        table: String,
        column: String,
    },
    ColumnAlreadyExists {
        action: String,
        table: String,
        column: String,
    },
    StorageNameTaken {
        action: String,
        table: String,
        storage_name: String,
    },
    /// The column is still used by a key, index or foreign key.
    ColumnInUse {
        action: String,
        table: String,
        column: String,
        used_by: String,
    },
    IndexNotFound {
        action: String,
        index: String,
    },
    IndexAlreadyExists {
        action: String,
        index: String,
    },
    ForeignKeyNotFound {
        action: String,
        table: String,
    },
    ForeignKeyAlreadyExists {
        action: String,
        table: String,
    },
    ForeignKeyTargetNotFound {
        action: String,
        source_table: String,
        target_table: String,
    },
    FullTextNotFound {
        action: String,
        table: String,
    },
    FullTextAlreadyExists {
        action: String,
        table: String,
    },
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::TableNotFound { action, table } => {
                write!(f, "{}: table '{}' does not exist", action, table)
            }
            ApplyError::TableAlreadyExists { action, table } => {
                write!(f, "{}: table '{}' already exists", action, table)
            }
            ApplyError::TableHasDependents {
                action,
                table,
                dependents,
            } => write!(
                f,
                "{}: table '{}' is still used by {}",
                action,
                table,
                dependents.join(", ")
            ),
            ApplyError::ColumnNotFound {
                action,
                table,
                column,
            } => write!(f, "{}: column '{}.{}' does not exist", action, table, column),
            ApplyError::ColumnAlreadyExists {
                action,
                table,
                column,
            } => write!(f, "{}: column '{}.{}' already exists", action, table, column),
            ApplyError::StorageNameTaken {
                action,
                table,
                storage_name,
            } => write!(
                f,
                "{}: storage name '{}' is already used in '{}'",
                action, storage_name, table
            ),
            ApplyError::ColumnInUse {
                action,
                table,
                column,
                used_by,
            } => write!(
                f,
                "{}: column '{}.{}' is still used by {}",
                action, table, column, used_by
            ),
            ApplyError::IndexNotFound { action, index } => {
                write!(f, "{}: index '{}' does not exist", action, index)
            }
            ApplyError::IndexAlreadyExists { action, index } => {
                write!(f, "{}: index '{}' already exists", action, index)
            }
            ApplyError::ForeignKeyNotFound { action, table } => {
                write!(f, "{}: no such foreign key on '{}'", action, table)
            }
            ApplyError::ForeignKeyAlreadyExists { action, table } => {
                write!(f, "{}: foreign key already exists on '{}'", action, table)
            }
            ApplyError::ForeignKeyTargetNotFound {
                action,
                source_table,
                target_table,
            } => write!(
                f,
                "{}: foreign key from '{}' references non-existent table '{}'",
                action, source_table, target_table
            ),
            ApplyError::FullTextNotFound { action, table } => {
                write!(f, "{}: '{}' has no such full-text index", action, table)
            }
            ApplyError::FullTextAlreadyExists { action, table } => {
                write!(f, "{}: '{}' already has a full-text index", action, table)
            }
        }
    }
}

impl std::error::Error for ApplyError {}

impl SchemaModel {
    /// Apply one action in place, validating its preconditions.
    pub fn apply(&mut self, action: &SchemaAction) -> Result<(), ApplyError> {
        let desc = action.to_string();

        match action {
            SchemaAction::CreateTable(t) => {
                if self.table_exists(&t.name) {
                    return Err(ApplyError::TableAlreadyExists {
                        action: desc,
                        table: t.name.clone(),
                    });
                }
                self.tables.insert(t.name.clone(), t.shell());
            }

            SchemaAction::DropTable(t) => {
                let table = self.table(&desc, &t.name)?;
                let dependents = self.dependents_of(table);
                if !dependents.is_empty() {
                    return Err(ApplyError::TableHasDependents {
                        action: desc,
                        table: t.name.clone(),
                        dependents,
                    });
                }
                self.tables.shift_remove(&t.name);
            }

            SchemaAction::AddColumn { table, column } => {
                let t = self.table(&desc, table)?;
                if t.get_column(&column.name).is_some() {
                    return Err(ApplyError::ColumnAlreadyExists {
                        action: desc,
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                if t.column_by_storage(column.storage_name()).is_some() {
                    return Err(ApplyError::StorageNameTaken {
                        action: desc,
                        table: table.clone(),
                        storage_name: column.storage_name().to_string(),
                    });
                }
                self.table_mut(table).columns.push(column.clone());
            }

            SchemaAction::DropColumn { table, column } => {
                let t = self.table(&desc, table)?;
                t.column_or_err(&desc, &column.name)?;
                if let Some(used_by) = self.column_user(t, &column.name) {
                    return Err(ApplyError::ColumnInUse {
                        action: desc,
                        table: table.clone(),
                        column: column.name.clone(),
                        used_by,
                    });
                }
                self.table_mut(table)
                    .columns
                    .retain(|c| c.name != column.name);
            }

            SchemaAction::RenameColumn {
                table,
                column,
                from,
                to,
            } => {
                let t = self.table(&desc, table)?;
                let current = t.column_or_err(&desc, column)?;
                if current.storage_name() != from {
                    return Err(ApplyError::ColumnNotFound {
                        action: desc,
                        table: table.clone(),
                        column: from.clone(),
                    });
                }
                if t.column_by_storage(to).is_some_and(|c| &c.name != column) {
                    return Err(ApplyError::StorageNameTaken {
                        action: desc,
                        table: table.clone(),
                        storage_name: to.clone(),
                    });
                }
                let mapped = (to != column).then(|| to.clone());
                if let Some(c) = self
                    .table_mut(table)
                    .columns
                    .iter_mut()
                    .find(|c| &c.name == column)
                {
                    c.mapped_name = mapped;
                }
            }

            SchemaAction::CreateIndex { table, index } => {
                let t = self.table(&desc, table)?;
                for col in &index.columns {
                    t.column_or_err(&desc, col)?;
                }
                let taken = self
                    .iter_tables()
                    .flat_map(|t| t.indices.iter())
                    .any(|i| i.name == index.name)
                    || t.indices.iter().any(|i| i.key() == index.key());
                if taken {
                    return Err(ApplyError::IndexAlreadyExists {
                        action: desc,
                        index: index.name.clone(),
                    });
                }
                self.table_mut(table).indices.push(index.clone());
            }

            SchemaAction::DropIndex { table, index } => {
                let t = self.table(&desc, table)?;
                if !t.indices.iter().any(|i| i.name == index.name) {
                    return Err(ApplyError::IndexNotFound {
                        action: desc,
                        index: index.name.clone(),
                    });
                }
                self.table_mut(table)
                    .indices
                    .retain(|i| i.name != index.name);
            }

            SchemaAction::AddForeignKey { table, foreign_key } => {
                let t = self.table(&desc, table)?;
                for col in &foreign_key.columns {
                    t.column_or_err(&desc, col)?;
                }
                let name = foreign_key.constraint_name(table);
                if t.foreign_keys.iter().any(|fk| fk.constraint_name(table) == name) {
                    return Err(ApplyError::ForeignKeyAlreadyExists {
                        action: desc,
                        table: table.clone(),
                    });
                }
                let Some(parent) = self.get_table(&foreign_key.references_table) else {
                    return Err(ApplyError::ForeignKeyTargetNotFound {
                        action: desc,
                        source_table: table.clone(),
                        target_table: foreign_key.references_table.clone(),
                    });
                };
                for col in &foreign_key.references_columns {
                    parent.column_or_err(&desc, col)?;
                }
                self.table_mut(table).foreign_keys.push(foreign_key.clone());
            }

            SchemaAction::DropForeignKey { table, foreign_key } => {
                let t = self.table(&desc, table)?;
                if !t.foreign_keys.contains(foreign_key) {
                    return Err(ApplyError::ForeignKeyNotFound {
                        action: desc,
                        table: table.clone(),
                    });
                }
                self.table_mut(table)
                    .foreign_keys
                    .retain(|fk| fk != foreign_key);
            }

            SchemaAction::CreateFullTextIndex { table, index } => {
                let t = self.table(&desc, table)?;
                t.column_or_err(&desc, &index.column)?;
                if t.full_text.is_some() {
                    return Err(ApplyError::FullTextAlreadyExists {
                        action: desc,
                        table: table.clone(),
                    });
                }
                self.table_mut(table).full_text = Some(index.clone());
            }

            SchemaAction::DropFullTextIndex { table, index } => {
                let t = self.table(&desc, table)?;
                if t.full_text.as_ref() != Some(index) {
                    return Err(ApplyError::FullTextNotFound {
                        action: desc,
                        table: table.clone(),
                    });
                }
                self.table_mut(table).full_text = None;
            }
        }

        Ok(())
    }

    /// Whether `self` and `other` describe the same structure.
    pub fn structurally_eq(&self, other: &SchemaModel) -> bool {
        self.structural_mismatch(other).is_none()
    }

    /// Describe how `other` differs from `self`, one line per difference.
    ///
    /// Column order and index names are ignored: columns are compared by
    /// logical name, indexes by column tuple and uniqueness.
    pub fn structural_mismatch(&self, other: &SchemaModel) -> Option<String> {
        let mut out = String::new();

        let ours: BTreeSet<&str> = self.tables.keys().map(|k| k.as_str()).collect();
        let theirs: BTreeSet<&str> = other.tables.keys().map(|k| k.as_str()).collect();

        for name in theirs.difference(&ours) {
            let _ = writeln!(out, "+ table {}", name);
        }
        for name in ours.difference(&theirs) {
            let _ = writeln!(out, "- table {}", name);
        }
        for name in ours.intersection(&theirs) {
            if let (Some(a), Some(b)) = (self.get_table(name), other.get_table(name)) {
                table_mismatch(a, b, &mut out);
            }
        }

        if out.is_empty() { None } else { Some(out) }
    }

    fn table(&self, desc: &str, name: &str) -> Result<&Table, ApplyError> {
        self.get_table(name).ok_or_else(|| ApplyError::TableNotFound {
            action: desc.to_string(),
            table: name.to_string(),
        })
    }

    // Only called after `table` has confirmed the table exists.
    fn table_mut(&mut self, name: &str) -> &mut Table {
        &mut self.tables[name]
    }

    fn dependents_of(&self, table: &Table) -> Vec<String> {
        let mut dependents: Vec<String> = table
            .indices
            .iter()
            .map(|i| format!("index {}", i.name))
            .collect();
        dependents.extend(
            table
                .foreign_keys
                .iter()
                .map(|fk| format!("foreign key {}", fk.constraint_name(&table.name))),
        );
        if let Some(ft) = &table.full_text {
            dependents.push(format!("full-text index {}", ft.index_name(&table.name)));
        }
        for other in self.iter_tables().filter(|t| t.name != table.name) {
            for fk in &other.foreign_keys {
                if fk.references_table == table.name {
                    dependents.push(format!(
                        "foreign key {} on {}",
                        fk.constraint_name(&other.name),
                        other.name
                    ));
                }
            }
        }
        dependents
    }

    fn column_user(&self, table: &Table, column: &str) -> Option<String> {
        if table.primary_key.iter().any(|c| c == column) {
            return Some("the primary key".to_string());
        }
        if let Some(idx) = table.indices.iter().find(|i| i.touches(column)) {
            return Some(format!("index {}", idx.name));
        }
        if let Some(ft) = table.full_text.as_ref().filter(|ft| ft.column == column) {
            return Some(format!("full-text index {}", ft.index_name(&table.name)));
        }
        for other in self.iter_tables() {
            for fk in &other.foreign_keys {
                let owned = other.name == table.name && fk.touches(column);
                if owned || fk.references(&table.name, column) {
                    return Some(format!(
                        "foreign key {} on {}",
                        fk.constraint_name(&other.name),
                        other.name
                    ));
                }
            }
        }
        None
    }
}

impl Table {
    fn column_or_err(&self, desc: &str, name: &str) -> Result<&Column, ApplyError> {
        self.get_column(name).ok_or_else(|| ApplyError::ColumnNotFound {
            action: desc.to_string(),
            table: self.name.clone(),
            column: name.to_string(),
        })
    }
}

fn table_mismatch(a: &Table, b: &Table, out: &mut String) {
    let name = &a.name;

    let a_cols: BTreeMap<&str, &Column> = a.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let b_cols: BTreeMap<&str, &Column> = b.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    for (col, bc) in &b_cols {
        match a_cols.get(col) {
            None => {
                let _ = writeln!(out, "{}: + column {}", name, col);
            }
            Some(ac) => {
                if !ac.same_shape(bc) || ac.storage_name() != bc.storage_name() {
                    let _ = writeln!(
                        out,
                        "{}: ~ column {}: {} {} as {} -> {} {} as {}",
                        name,
                        col,
                        ac.column_type,
                        nullability(ac),
                        ac.storage_name(),
                        bc.column_type,
                        nullability(bc),
                        bc.storage_name()
                    );
                }
            }
        }
    }
    for col in a_cols.keys().filter(|c| !b_cols.contains_key(*c)) {
        let _ = writeln!(out, "{}: - column {}", name, col);
    }

    if a.primary_key != b.primary_key {
        let _ = writeln!(
            out,
            "{}: ~ primary key ({}) -> ({})",
            name,
            a.primary_key.join(", "),
            b.primary_key.join(", ")
        );
    }

    let a_idx: BTreeSet<_> = a.indices.iter().map(|i| i.key()).collect();
    let b_idx: BTreeSet<_> = b.indices.iter().map(|i| i.key()).collect();
    for (cols, unique) in b_idx.difference(&a_idx) {
        let _ = writeln!(out, "{}: + {} ({})", name, index_word(*unique), cols.join(", "));
    }
    for (cols, unique) in a_idx.difference(&b_idx) {
        let _ = writeln!(out, "{}: - {} ({})", name, index_word(*unique), cols.join(", "));
    }

    for fk in b.foreign_keys.iter().filter(|fk| !a.foreign_keys.contains(fk)) {
        let _ = writeln!(
            out,
            "{}: + FOREIGN KEY ({}) -> {}",
            name,
            fk.columns.join(", "),
            fk.references_table
        );
    }
    for fk in a.foreign_keys.iter().filter(|fk| !b.foreign_keys.contains(fk)) {
        let _ = writeln!(
            out,
            "{}: - FOREIGN KEY ({}) -> {}",
            name,
            fk.columns.join(", "),
            fk.references_table
        );
    }

    if a.full_text != b.full_text {
        let render = |ft: &Option<crate::FullTextIndex>| match ft {
            Some(ft) => format!("({}, {})", ft.column, ft.language),
            None => "none".to_string(),
        };
        let _ = writeln!(
            out,
            "{}: ~ FULLTEXT {} -> {}",
            name,
            render(&a.full_text),
            render(&b.full_text)
        );
    }
}

fn nullability(c: &Column) -> &'static str {
    if c.nullable { "NULL" } else { "NOT NULL" }
}

fn index_word(unique: bool) -> &'static str {
    if unique { "UNIQUE INDEX" } else { "INDEX" }
}
