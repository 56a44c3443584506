//! Turning a plan into DDL.
//!
//! [`DdlEmitter`] is the boundary between planning and a database dialect.
//! Emitters see each action together with the model as it stands right
//! before that action, so they can resolve logical column names to the
//! storage names the database knows.

use crate::error::Error;
use crate::planner::UpgradePlan;
use remodel_schema::{SchemaAction, SchemaModel, Table};
use remodel_sql::{Ident, escape_string};

/// Renders schema actions for some target.
pub trait DdlEmitter {
    type Error;

    /// Emit `action`. `before` is the model the action applies to.
    fn emit(&mut self, action: &SchemaAction, before: &SchemaModel) -> Result<(), Self::Error>;
}

/// Feed every action of `plan` to `emitter`, ordered actions first, then
/// deferred foreign keys, tracking the model as it evolves from `old`.
pub fn render_plan<E>(plan: &UpgradePlan, old: &SchemaModel, emitter: &mut E) -> Result<(), E::Error>
where
    E: DdlEmitter,
    E::Error: From<Error>,
{
    let mut model = old.clone();
    for action in plan.iter() {
        emitter.emit(action, &model)?;
        model.apply(action).map_err(Error::from)?;
    }
    Ok(())
}

/// Collects one Postgres statement per action.
#[derive(Debug, Clone, Default)]
pub struct PostgresEmitter {
    statements: Vec<String>,
}

impl PostgresEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// All statements, one per line (or block, for `CREATE TABLE`).
    pub fn into_sql(self) -> String {
        self.statements.join("\n")
    }
}

impl DdlEmitter for PostgresEmitter {
    type Error = Error;

    fn emit(&mut self, action: &SchemaAction, before: &SchemaModel) -> Result<(), Error> {
        let sql = match action {
            SchemaAction::CreateTable(t) => create_table_sql(t),
            SchemaAction::DropTable(t) => format!("DROP TABLE {};", Ident(&t.name)),
            SchemaAction::AddColumn { table, column } => {
                let not_null = if column.nullable { "" } else { " NOT NULL" };
                format!(
                    "ALTER TABLE {} ADD COLUMN {} {}{};",
                    Ident(table),
                    Ident(column.storage_name()),
                    column.column_type,
                    not_null
                )
            }
            SchemaAction::DropColumn { table, column } => {
                let current = lookup(before, action, table)?;
                format!(
                    "ALTER TABLE {} DROP COLUMN {};",
                    Ident(table),
                    Ident(current.storage_name_of(&column.name))
                )
            }
            SchemaAction::RenameColumn {
                table, from, to, ..
            } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                Ident(table),
                Ident(from),
                Ident(to)
            ),
            SchemaAction::CreateIndex { table, index } => {
                let current = lookup(before, action, table)?;
                let unique = if index.unique { "UNIQUE " } else { "" };
                format!(
                    "CREATE {}INDEX {} ON {} ({});",
                    unique,
                    Ident(&index.name),
                    Ident(table),
                    storage_list(current, &index.columns)
                )
            }
            SchemaAction::DropIndex { index, .. } => {
                format!("DROP INDEX {};", Ident(&index.name))
            }
            SchemaAction::AddForeignKey { table, foreign_key } => {
                let current = lookup(before, action, table)?;
                let parent = lookup(before, action, &foreign_key.references_table)?;
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({});",
                    Ident(table),
                    Ident(foreign_key.constraint_name(table)),
                    storage_list(current, &foreign_key.columns),
                    Ident(&foreign_key.references_table),
                    storage_list(parent, &foreign_key.references_columns)
                )
            }
            SchemaAction::DropForeignKey { table, foreign_key } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                Ident(table),
                Ident(foreign_key.constraint_name(table))
            ),
            SchemaAction::CreateFullTextIndex { table, index } => {
                let current = lookup(before, action, table)?;
                format!(
                    "CREATE INDEX {} ON {} USING GIN (to_tsvector({}, {}));",
                    Ident(index.index_name(table)),
                    Ident(table),
                    escape_string(&index.language.to_lowercase()),
                    Ident(current.storage_name_of(&index.column))
                )
            }
            SchemaAction::DropFullTextIndex { table, index } => {
                format!("DROP INDEX {};", Ident(index.index_name(table)))
            }
        };

        self.statements.push(sql);
        Ok(())
    }
}

fn lookup<'m>(model: &'m SchemaModel, action: &SchemaAction, table: &str) -> Result<&'m Table, Error> {
    model.get_table(table).ok_or_else(|| Error::InvalidModel {
        action: action.to_string(),
        reason: format!("table '{}' does not exist", table),
    })
}

fn storage_list(table: &Table, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| Ident(table.storage_name_of(c)).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE` for a table shell. Foreign keys and indexes are separate
/// statements.
fn create_table_sql(table: &Table) -> String {
    // A composite key needs a table constraint
    let composite = table.primary_key.len() > 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let in_pk = table.primary_key.contains(&col.name);
            let mut def = format!("    {} {}", Ident(col.storage_name()), col.column_type);
            if in_pk && !composite {
                def.push_str(" PRIMARY KEY");
            } else if !col.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();

    if composite {
        parts.push(format!(
            "    PRIMARY KEY ({})",
            storage_list(table, &table.primary_key)
        ));
    }

    format!("CREATE TABLE {} (\n{}\n);", Ident(&table.name), parts.join(",\n"))
}
