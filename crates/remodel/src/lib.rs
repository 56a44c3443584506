//! Dependency-safe schema upgrades.
//!
//! Given the schema an application had and the schema it wants, remodel
//! computes the structural actions that take one to the other and orders
//! them so that every action only touches structure that exists at that
//! moment:
//!
//! - foreign keys, indexes and full-text indexes are dropped before the
//!   columns and tables they depend on
//! - tables and columns exist before anything that refers to them
//! - a foreign key waits for its parent's new foreign keys, and one key of
//!   each resulting cycle is deferred to the end
//! - columns trading storage names go through a temporary name
//!
//! The engine never talks to a database. Feed the resulting [`UpgradePlan`]
//! to a [`DdlEmitter`] to get statements.
//!
//! ```
//! use remodel::{Column, ColumnType, SchemaModel, Table, UpgradeOptions, plan_upgrade};
//!
//! let old = SchemaModel::from_tables([Table::new("author")
//!     .column(Column::new("Id", ColumnType::Int64))
//!     .primary_key(&["Id"])])
//! .unwrap();
//!
//! let new = SchemaModel::from_tables([
//!     Table::new("author")
//!         .column(Column::new("Id", ColumnType::Int64))
//!         .primary_key(&["Id"]),
//!     Table::new("book")
//!         .column(Column::new("Id", ColumnType::Int64))
//!         .column(Column::new("AuthorId", ColumnType::Int64))
//!         .primary_key(&["Id"])
//!         .foreign_key(&["AuthorId"], "author", &["Id"]),
//! ])
//! .unwrap();
//!
//! let plan = plan_upgrade(&old, &new, &UpgradeOptions::default()).unwrap();
//! assert_eq!(
//!     plan.to_string(),
//!     "+ table book\nbook: + FOREIGN KEY (AuthorId) -> author.Id"
//! );
//! ```

mod diff;
mod emit;
mod error;
mod graph;
mod options;
mod planner;

pub use diff::{Differ, SchemaDiff};
pub use emit::{DdlEmitter, PostgresEmitter, render_plan};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, Edge};
pub use options::UpgradeOptions;
pub use planner::{Planner, Schedule, UpgradePlan, verify};

pub use remodel_schema::{
    ActionKind, ApplyError, Column, ColumnType, ForeignKey, FullTextIndex, Index,
    MalformedSchemaError, SchemaAction, SchemaModel, Table,
};

/// Plan the upgrade from `old` to `new`.
///
/// Both models are validated first. With [`UpgradeOptions::verify`] on, the
/// plan is replayed on a copy of `old` before it is returned.
pub fn plan_upgrade(
    old: &SchemaModel,
    new: &SchemaModel,
    options: &UpgradeOptions,
) -> Result<UpgradePlan> {
    let span = tracing::debug_span!(
        "plan_upgrade",
        old_tables = old.tables.len(),
        new_tables = new.tables.len()
    );
    let _guard = span.enter();

    old.validate()?;
    new.validate()?;

    let diff = Differ::new(old, new)
        .detect_column_renames(options.detect_column_renames)
        .diff();
    tracing::debug!(actions = diff.len(), "diff computed");

    if diff.is_empty() {
        return Ok(UpgradePlan::default());
    }

    let graph = DependencyGraph::build(diff, old, new)?;
    let plan = Planner::new(&graph)
        .allow_deferred_foreign_keys(options.allow_deferred_foreign_keys)
        .plan()?;

    if options.verify {
        verify(&plan, old, new)?;
    }

    tracing::info!(
        ordered = plan.ordered.len(),
        deferred = plan.deferred_foreign_keys.len(),
        "upgrade planned"
    );
    Ok(plan)
}
