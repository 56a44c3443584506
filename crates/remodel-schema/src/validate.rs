//! Internal consistency checks for a single model.

use crate::{SchemaModel, Table};
use std::collections::HashSet;

/// A model that is not internally consistent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedSchemaError {
    #[error("duplicate table '{table}'")]
    DuplicateTable { table: String },

    #[error("table '{table}' is stored under key '{key}'")]
    TableKeyMismatch { key: String, table: String },

    #[error("table '{table}' has no columns")]
    EmptyTable { table: String },

    #[error("duplicate column '{table}.{column}'")]
    DuplicateColumn { table: String, column: String },

    #[error("storage name '{storage_name}' is used by more than one column of '{table}'")]
    DuplicateStorageName { table: String, storage_name: String },

    #[error("primary key of '{table}' names unknown column '{column}'")]
    UnknownPrimaryKeyColumn { table: String, column: String },

    #[error("index '{index}' on '{table}' has no columns")]
    EmptyIndex { table: String, index: String },

    #[error("index '{index}' on '{table}' names unknown column '{column}'")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },

    #[error("table '{table}' has two indexes on ({columns})")]
    DuplicateIndex { table: String, columns: String },

    #[error("index name '{index}' on '{table}' is already used")]
    DuplicateIndexName { table: String, index: String },

    #[error("foreign key on '{table}' names unknown column '{column}'")]
    UnknownForeignKeyColumn { table: String, column: String },

    #[error("foreign key on '{table}' references unknown table '{references_table}'")]
    UnknownForeignKeyTarget {
        table: String,
        references_table: String,
    },

    #[error("foreign key on '{table}' references unknown column '{references_table}.{column}'")]
    UnknownReferencedColumn {
        table: String,
        references_table: String,
        column: String,
    },

    #[error(
        "foreign key on '{table}' pairs {columns} column(s) with {references_columns} referenced column(s)"
    )]
    ForeignKeyArity {
        table: String,
        columns: usize,
        references_columns: usize,
    },

    #[error("table '{table}' declares the foreign key ({columns}) -> {references_table} twice")]
    DuplicateForeignKey {
        table: String,
        columns: String,
        references_table: String,
    },

    #[error("constraint name '{name}' on '{table}' is used by two foreign keys")]
    DuplicateConstraintName { table: String, name: String },

    #[error("full-text index on '{table}' names unknown column '{column}'")]
    UnknownFullTextColumn { table: String, column: String },

    #[error("full-text column '{table}.{column}' is not a string or text column")]
    FullTextColumnNotText { table: String, column: String },
}

impl SchemaModel {
    /// Check that every reference in the model resolves.
    ///
    /// Returns the first violation found, visiting tables in insertion order.
    pub fn validate(&self) -> Result<(), MalformedSchemaError> {
        let mut index_names = HashSet::new();

        for (key, table) in &self.tables {
            if key != &table.name {
                return Err(MalformedSchemaError::TableKeyMismatch {
                    key: key.clone(),
                    table: table.name.clone(),
                });
            }
            validate_columns(table)?;
            validate_indices(table, &mut index_names)?;
            self.validate_foreign_keys(table)?;
            validate_full_text(table)?;
        }

        Ok(())
    }

    fn validate_foreign_keys(&self, table: &Table) -> Result<(), MalformedSchemaError> {
        let mut seen = HashSet::new();
        let mut names = HashSet::new();

        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.references_columns.len() {
                return Err(MalformedSchemaError::ForeignKeyArity {
                    table: table.name.clone(),
                    columns: fk.columns.len(),
                    references_columns: fk.references_columns.len(),
                });
            }

            for col in &fk.columns {
                if table.get_column(col).is_none() {
                    return Err(MalformedSchemaError::UnknownForeignKeyColumn {
                        table: table.name.clone(),
                        column: col.clone(),
                    });
                }
            }

            let Some(parent) = self.get_table(&fk.references_table) else {
                return Err(MalformedSchemaError::UnknownForeignKeyTarget {
                    table: table.name.clone(),
                    references_table: fk.references_table.clone(),
                });
            };

            for col in &fk.references_columns {
                if parent.get_column(col).is_none() {
                    return Err(MalformedSchemaError::UnknownReferencedColumn {
                        table: table.name.clone(),
                        references_table: fk.references_table.clone(),
                        column: col.clone(),
                    });
                }
            }

            if !seen.insert(fk) {
                return Err(MalformedSchemaError::DuplicateForeignKey {
                    table: table.name.clone(),
                    columns: fk.columns.join(", "),
                    references_table: fk.references_table.clone(),
                });
            }

            // Same columns and parent, different referenced columns
            let name = fk.constraint_name(&table.name);
            if !names.insert(name.clone()) {
                return Err(MalformedSchemaError::DuplicateConstraintName {
                    table: table.name.clone(),
                    name,
                });
            }
        }

        Ok(())
    }
}

fn validate_columns(table: &Table) -> Result<(), MalformedSchemaError> {
    if table.columns.is_empty() {
        return Err(MalformedSchemaError::EmptyTable {
            table: table.name.clone(),
        });
    }

    let mut names = HashSet::new();
    let mut storage_names = HashSet::new();
    for col in &table.columns {
        if !names.insert(col.name.as_str()) {
            return Err(MalformedSchemaError::DuplicateColumn {
                table: table.name.clone(),
                column: col.name.clone(),
            });
        }
        if !storage_names.insert(col.storage_name()) {
            return Err(MalformedSchemaError::DuplicateStorageName {
                table: table.name.clone(),
                storage_name: col.storage_name().to_string(),
            });
        }
    }

    for col in &table.primary_key {
        if table.get_column(col).is_none() {
            return Err(MalformedSchemaError::UnknownPrimaryKeyColumn {
                table: table.name.clone(),
                column: col.clone(),
            });
        }
    }

    Ok(())
}

fn validate_indices<'a>(
    table: &'a Table,
    index_names: &mut HashSet<&'a str>,
) -> Result<(), MalformedSchemaError> {
    let mut keys = HashSet::new();

    for idx in &table.indices {
        if idx.columns.is_empty() {
            return Err(MalformedSchemaError::EmptyIndex {
                table: table.name.clone(),
                index: idx.name.clone(),
            });
        }

        for col in &idx.columns {
            if table.get_column(col).is_none() {
                return Err(MalformedSchemaError::UnknownIndexColumn {
                    table: table.name.clone(),
                    index: idx.name.clone(),
                    column: col.clone(),
                });
            }
        }

        if !keys.insert(idx.key()) {
            return Err(MalformedSchemaError::DuplicateIndex {
                table: table.name.clone(),
                columns: idx.columns.join(", "),
            });
        }

        // Index names share one namespace across the whole schema.
        if !index_names.insert(idx.name.as_str()) {
            return Err(MalformedSchemaError::DuplicateIndexName {
                table: table.name.clone(),
                index: idx.name.clone(),
            });
        }
    }

    Ok(())
}

fn validate_full_text(table: &Table) -> Result<(), MalformedSchemaError> {
    let Some(ft) = &table.full_text else {
        return Ok(());
    };

    match table.get_column(&ft.column) {
        None => Err(MalformedSchemaError::UnknownFullTextColumn {
            table: table.name.clone(),
            column: ft.column.clone(),
        }),
        Some(col) if !col.column_type.is_textual() => {
            Err(MalformedSchemaError::FullTextColumnNotText {
                table: table.name.clone(),
                column: ft.column.clone(),
            })
        }
        Some(_) => Ok(()),
    }
}
