//! Schema diffing - compare an old model against a new one.
//!
//! The differ produces the atomic [`SchemaAction`]s that turn the old model
//! into the new one. It does not order them; see [`crate::graph`] and
//! [`crate::planner`].
//!
//! ## Identity
//!
//! - Tables and columns are matched by (logical) name.
//! - Indexes are matched by column tuple and uniqueness. Their names do not
//!   take part, so renaming an index alone produces nothing.
//! - Foreign keys are matched by child columns, parent table and referenced
//!   columns.
//! - The full-text index is matched by column and language.
//!
//! ## Recreation
//!
//! Nothing is altered in place. A column whose type or nullability changed
//! is dropped and added again, and so is everything the database drops
//! along with it:
//!
//! ```text
//! book:
//!   - FOREIGN KEY (AuthorId) -> author.Id     (references the column)
//!   - INDEX idx_book_AuthorId                 (touches the column)
//!   - column AuthorId
//!   + column AuthorId BIGINT
//!   + INDEX idx_book_AuthorId (AuthorId)
//!   + FOREIGN KEY (AuthorId) -> author.Id
//! ```
//!
//! A table whose primary key changed, whose primary-key column is
//! recreated, or none of whose columns survive, is dropped and created from
//! scratch.
//!
//! ## Storage swaps
//!
//! Renames that trade storage names in a ring cannot run in any order, so one
//! rename of each ring goes through a temporary name:
//!
//! ```text
//! t: ~ column A: a -> tmp_a
//! t: ~ column B: b -> a
//! t: ~ column A: tmp_a -> b
//! ```

use remodel_schema::{Column, ForeignKey, Index, SchemaAction, SchemaModel, Table};
use std::collections::{BTreeSet, HashMap, HashSet};

/// The unordered action set between two models.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Actions in diff order: tables by name, then per table drops before
    /// column changes before creations.
    pub actions: Vec<SchemaAction>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaAction> {
        self.actions.iter()
    }
}

impl std::fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes detected.");
        }
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", action)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnChange {
    Same,
    Rename,
    Recreate,
}

/// Structure the database loses as a side effect of recreation.
#[derive(Debug, Default)]
struct Invalidated<'a> {
    tables: HashSet<&'a str>,
    columns: HashSet<(&'a str, &'a str)>,
}

impl Invalidated<'_> {
    fn column(&self, table: &str, column: &str) -> bool {
        self.tables.contains(table) || self.columns.contains(&(table, column))
    }

    fn index(&self, table: &str, index: &Index) -> bool {
        index.columns.iter().any(|c| self.column(table, c))
    }

    fn foreign_key(&self, table: &str, fk: &ForeignKey) -> bool {
        fk.columns.iter().any(|c| self.column(table, c))
            || fk
                .references_columns
                .iter()
                .any(|c| self.column(&fk.references_table, c))
    }
}

/// Computes the [`SchemaDiff`] from `old` to `new`.
///
/// Neither model is modified.
#[derive(Debug, Clone, Copy)]
pub struct Differ<'a> {
    old: &'a SchemaModel,
    new: &'a SchemaModel,
    detect_column_renames: bool,
}

impl<'a> Differ<'a> {
    pub fn new(old: &'a SchemaModel, new: &'a SchemaModel) -> Self {
        Self {
            old,
            new,
            detect_column_renames: true,
        }
    }

    /// When off, a storage-name change is a drop and add.
    pub fn detect_column_renames(mut self, enabled: bool) -> Self {
        self.detect_column_renames = enabled;
        self
    }

    pub fn diff(&self) -> SchemaDiff {
        let invalidated = self.invalidated();

        let names: BTreeSet<&str> = self
            .old
            .tables
            .keys()
            .chain(self.new.tables.keys())
            .map(|k| k.as_str())
            .collect();

        let mut actions = Vec::new();
        for name in names {
            match (self.old.get_table(name), self.new.get_table(name)) {
                (None, Some(table)) => create_sequence(table, &mut actions),
                (Some(table), None) => drop_sequence(table, &mut actions),
                (Some(old), Some(new)) if invalidated.tables.contains(name) => {
                    drop_sequence(old, &mut actions);
                    create_sequence(new, &mut actions);
                }
                (Some(old), Some(new)) => {
                    self.diff_table(old, new, &invalidated, &mut actions);
                }
                (None, None) => {}
            }
        }

        tracing::debug!(actions = actions.len(), "diff computed");
        SchemaDiff { actions }
    }

    fn column_change(&self, old: &Column, new: &Column) -> ColumnChange {
        if !old.same_shape(new) {
            ColumnChange::Recreate
        } else if old.storage_name() == new.storage_name() {
            ColumnChange::Same
        } else if self.detect_column_renames {
            ColumnChange::Rename
        } else {
            ColumnChange::Recreate
        }
    }

    /// Whether some new index other than the counterpart of `index` (old,
    /// on `table`) is named like it. Index names are schema-wide.
    fn index_name_claimed(&self, table: &str, index: &Index) -> bool {
        self.new.iter_tables().any(|t| {
            t.indices
                .iter()
                .any(|n| n.name == index.name && (t.name != table || n.key() != index.key()))
        })
    }

    /// Find recreated tables and columns across the whole model first, since
    /// foreign keys in one table are invalidated by recreation in another.
    fn invalidated(&self) -> Invalidated<'a> {
        let mut invalidated = Invalidated::default();

        for old in self.old.iter_tables() {
            let Some(new) = self.new.get_table(&old.name) else {
                continue;
            };

            let recreated: Vec<&'a str> = old
                .columns
                .iter()
                .filter(|c| {
                    new.get_column(&c.name)
                        .is_some_and(|n| self.column_change(c, n) == ColumnChange::Recreate)
                })
                .map(|c| c.name.as_str())
                .collect();

            let survivors = old.columns.iter().any(|c| {
                new.get_column(&c.name)
                    .is_some_and(|n| self.column_change(c, n) != ColumnChange::Recreate)
            });

            let incompatible = old.primary_key != new.primary_key
                || recreated.iter().any(|c| old.primary_key.iter().any(|pk| pk == c))
                || !survivors;

            if incompatible {
                tracing::debug!(table = %old.name, "table shape is incompatible, recreating");
                invalidated.tables.insert(old.name.as_str());
            } else {
                invalidated
                    .columns
                    .extend(recreated.into_iter().map(|c| (old.name.as_str(), c)));
            }
        }

        invalidated
    }

    fn diff_table(
        &self,
        old: &Table,
        new: &Table,
        invalidated: &Invalidated<'_>,
        actions: &mut Vec<SchemaAction>,
    ) {
        let name = &new.name;

        // Foreign keys
        let kept_fks: Vec<&ForeignKey> = new
            .foreign_keys
            .iter()
            .filter(|fk| old.foreign_keys.contains(fk) && !invalidated.foreign_key(name, fk))
            .collect();
        for fk in &old.foreign_keys {
            if !kept_fks.contains(&fk) {
                actions.push(SchemaAction::DropForeignKey {
                    table: name.clone(),
                    foreign_key: fk.clone(),
                });
            }
        }

        // Indices, compared by key rather than name. An old index whose name
        // goes to a different new index is recreated to free it.
        let kept_index = |idx: &Index| {
            new.indices.iter().any(|n| n.key() == idx.key())
                && !invalidated.index(name, idx)
                && !self.index_name_claimed(name, idx)
        };
        for idx in &old.indices {
            if !kept_index(idx) {
                actions.push(SchemaAction::DropIndex {
                    table: name.clone(),
                    index: idx.clone(),
                });
            }
        }

        let kept_full_text = old.full_text == new.full_text
            && old
                .full_text
                .as_ref()
                .is_none_or(|ft| !invalidated.column(name, &ft.column));
        if let (Some(ft), false) = (&old.full_text, kept_full_text) {
            actions.push(SchemaAction::DropFullTextIndex {
                table: name.clone(),
                index: ft.clone(),
            });
        }

        // Columns
        let mut renames = Vec::new();
        for col in &new.columns {
            let Some(old_col) = old.get_column(&col.name) else {
                actions.push(SchemaAction::AddColumn {
                    table: name.clone(),
                    column: col.clone(),
                });
                continue;
            };
            match self.column_change(old_col, col) {
                ColumnChange::Same => {}
                ColumnChange::Rename => {
                    let from = old_col.storage_name().to_string();
                    let to = col.storage_name().to_string();
                    renames.push((actions.len(), from.clone(), to.clone()));
                    actions.push(SchemaAction::RenameColumn {
                        table: name.clone(),
                        column: col.name.clone(),
                        from,
                        to,
                    });
                }
                ColumnChange::Recreate => {
                    actions.push(SchemaAction::DropColumn {
                        table: name.clone(),
                        column: old_col.clone(),
                    });
                    actions.push(SchemaAction::AddColumn {
                        table: name.clone(),
                        column: col.clone(),
                    });
                }
            }
        }
        for col in &old.columns {
            if new.get_column(&col.name).is_none() {
                actions.push(SchemaAction::DropColumn {
                    table: name.clone(),
                    column: col.clone(),
                });
            }
        }
        break_rename_rings(old, new, &renames, actions);

        for idx in &new.indices {
            let kept = old
                .indices
                .iter()
                .any(|o| o.key() == idx.key() && kept_index(o));
            if !kept {
                actions.push(SchemaAction::CreateIndex {
                    table: name.clone(),
                    index: idx.clone(),
                });
            }
        }

        for fk in &new.foreign_keys {
            if !kept_fks.contains(&fk) {
                actions.push(SchemaAction::AddForeignKey {
                    table: name.clone(),
                    foreign_key: fk.clone(),
                });
            }
        }

        if let (Some(ft), false) = (&new.full_text, kept_full_text) {
            actions.push(SchemaAction::CreateFullTextIndex {
                table: name.clone(),
                index: ft.clone(),
            });
        }
    }
}

/// Split one rename of every ring into two steps through a storage name
/// neither table uses. `renames` holds (position in `actions`, from, to).
fn break_rename_rings(
    old: &Table,
    new: &Table,
    renames: &[(usize, String, String)],
    actions: &mut Vec<SchemaAction>,
) {
    let by_from: HashMap<&str, usize> = renames
        .iter()
        .enumerate()
        .map(|(k, (_, from, _))| (from.as_str(), k))
        .collect();

    let mut visited = HashSet::new();
    let mut starts = Vec::new();
    for start in 0..renames.len() {
        let mut current = start;
        let ring = loop {
            if !visited.insert(current) {
                break false;
            }
            match by_from.get(renames[current].2.as_str()) {
                Some(&next) if next == start => break true,
                Some(&next) => current = next,
                None => break false,
            }
        };
        if ring {
            starts.push(renames[start].0);
        }
    }

    let mut taken: HashSet<String> = old
        .columns
        .iter()
        .chain(&new.columns)
        .map(|c| c.storage_name().to_string())
        .collect();

    for position in starts {
        let SchemaAction::RenameColumn {
            table,
            column,
            from,
            to,
        } = &mut actions[position]
        else {
            continue;
        };

        let base = format!("tmp_{}", from);
        let mut temporary = base.clone();
        let mut n = 1;
        while taken.contains(&temporary) {
            temporary = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(temporary.clone());

        tracing::debug!(table = %table, column = %column, via = %temporary, "breaking storage swap");
        let second = SchemaAction::RenameColumn {
            table: table.clone(),
            column: column.clone(),
            from: temporary.clone(),
            to: std::mem::replace(to, temporary),
        };
        actions.push(second);
    }
}

fn create_sequence(table: &Table, actions: &mut Vec<SchemaAction>) {
    actions.push(SchemaAction::CreateTable(table.shell()));
    for idx in &table.indices {
        actions.push(SchemaAction::CreateIndex {
            table: table.name.clone(),
            index: idx.clone(),
        });
    }
    for fk in &table.foreign_keys {
        actions.push(SchemaAction::AddForeignKey {
            table: table.name.clone(),
            foreign_key: fk.clone(),
        });
    }
    if let Some(ft) = &table.full_text {
        actions.push(SchemaAction::CreateFullTextIndex {
            table: table.name.clone(),
            index: ft.clone(),
        });
    }
}

fn drop_sequence(table: &Table, actions: &mut Vec<SchemaAction>) {
    for fk in &table.foreign_keys {
        actions.push(SchemaAction::DropForeignKey {
            table: table.name.clone(),
            foreign_key: fk.clone(),
        });
    }
    for idx in &table.indices {
        actions.push(SchemaAction::DropIndex {
            table: table.name.clone(),
            index: idx.clone(),
        });
    }
    if let Some(ft) = &table.full_text {
        actions.push(SchemaAction::DropFullTextIndex {
            table: table.name.clone(),
            index: ft.clone(),
        });
    }
    actions.push(SchemaAction::DropTable(table.shell()));
}
