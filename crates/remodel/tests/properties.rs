//! Property tests over randomly generated pairs of models.

mod common;

use proptest::prelude::*;
use remodel::{
    ActionKind, Column, ColumnType, DependencyGraph, Differ, Index, Planner, SchemaModel, Table,
    UpgradeOptions, plan_upgrade, verify,
};
use std::collections::HashSet;

const TABLES: usize = 4;
const COLUMNS: usize = 3;

/// Mapped columns draw storage names from one pool, so columns of the same
/// table trade storage between two generated models.
const STORAGE_POOL: [&str; 3] = ["p0", "p1", "p2"];
/// Explicit index names are shared by every table.
const INDEX_NAME_POOL: [&str; 3] = ["ix0", "ix1", "ix2"];

#[derive(Debug, Clone)]
struct ColumnSeed {
    present: bool,
    kind: usize,
    nullable: bool,
    storage: Option<usize>,
}

#[derive(Debug, Clone)]
struct IndexSeed {
    column: usize,
    unique: bool,
    name: Option<usize>,
}

#[derive(Debug, Clone)]
struct TableSeed {
    present: bool,
    wide_id: bool,
    columns: Vec<ColumnSeed>,
    refs: Vec<bool>,
    /// All references go through one `OwnerId` column
    shared_ref: bool,
    indices: Vec<Option<IndexSeed>>,
    /// Some(german)
    full_text: Option<bool>,
}

fn column_seed() -> impl Strategy<Value = ColumnSeed> {
    (
        any::<bool>(),
        0..3usize,
        any::<bool>(),
        prop::option::of(0..STORAGE_POOL.len()),
    )
        .prop_map(|(present, kind, nullable, storage)| ColumnSeed {
            present,
            kind,
            nullable,
            storage,
        })
}

fn index_seed() -> impl Strategy<Value = IndexSeed> {
    (
        0..COLUMNS,
        any::<bool>(),
        prop::option::of(0..INDEX_NAME_POOL.len()),
    )
        .prop_map(|(column, unique, name)| IndexSeed {
            column,
            unique,
            name,
        })
}

fn table_seed() -> impl Strategy<Value = TableSeed> {
    (
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec(column_seed(), COLUMNS),
        prop::collection::vec(any::<bool>(), TABLES),
        any::<bool>(),
        prop::collection::vec(prop::option::of(index_seed()), 2),
        prop::option::of(any::<bool>()),
    )
        .prop_map(
            |(present, wide_id, columns, refs, shared_ref, indices, full_text)| TableSeed {
                present,
                wide_id,
                columns,
                refs,
                shared_ref,
                indices,
                full_text,
            },
        )
}

fn model() -> impl Strategy<Value = SchemaModel> {
    prop::collection::vec(table_seed(), TABLES).prop_map(|seeds| build(&seeds))
}

/// Turn seeds into a valid model. Seeds that would break validity (a storage
/// or index name already used, a second index on a column) fall back to
/// conventional names or are skipped.
fn build(seeds: &[TableSeed]) -> SchemaModel {
    const TYPES: [ColumnType; 3] = [ColumnType::Int64, ColumnType::String, ColumnType::Text];

    let mut tables = Vec::new();
    let mut index_names = HashSet::new();
    for (i, seed) in seeds.iter().enumerate().filter(|(_, s)| s.present) {
        let table = format!("t{}", i);
        let id_type = if seed.wide_id {
            ColumnType::Int64
        } else {
            ColumnType::Int32
        };
        let mut t = Table::new(table.as_str())
            .column(Column::new("Id", id_type))
            .primary_key(&["Id"]);

        let mut present: Vec<(usize, ColumnType)> = Vec::new();
        let mut storage_used = HashSet::new();
        for (j, c) in seed.columns.iter().enumerate().filter(|(_, c)| c.present) {
            let ty = TYPES[c.kind];
            let mut col = Column::new(format!("c{}", j).as_str(), ty);
            if c.nullable {
                col = col.nullable();
            }
            if let Some(slot) = c.storage
                && storage_used.insert(slot)
            {
                col = col.mapped(STORAGE_POOL[slot]);
            }
            t = t.column(col);
            present.push((j, ty));
        }

        let parents = seed
            .refs
            .iter()
            .enumerate()
            .filter(|(k, r)| **r && seeds[*k].present)
            .map(|(k, _)| format!("t{}", k));
        if seed.shared_ref {
            let mut parents = parents.peekable();
            if parents.peek().is_some() {
                t = t.column(Column::new("OwnerId", ColumnType::Int64).nullable());
            }
            for parent in parents {
                t = t.foreign_key(&["OwnerId"], &parent, &["Id"]);
            }
        } else {
            for parent in parents {
                let col = format!("Ref{}Id", &parent[1..]);
                t = t
                    .column(Column::new(col.as_str(), ColumnType::Int64))
                    .foreign_key(&[col.as_str()], &parent, &["Id"]);
            }
        }

        let mut indexed = HashSet::new();
        for idx in seed.indices.iter().flatten() {
            if !present.iter().any(|(j, _)| *j == idx.column) || !indexed.insert(idx.column) {
                continue;
            }
            let column = format!("c{}", idx.column);
            let explicit = idx
                .name
                .map(|slot| INDEX_NAME_POOL[slot])
                .filter(|name| !index_names.contains(*name));
            let index = match explicit {
                Some(name) => Index::new(name, &[column.as_str()], idx.unique),
                None if idx.unique => Index::new(
                    remodel_sql::unique_index_name(&table, &[column.as_str()]),
                    &[column.as_str()],
                    true,
                ),
                None => Index::new(
                    remodel_sql::index_name(&table, &[column.as_str()]),
                    &[column.as_str()],
                    false,
                ),
            };
            index_names.insert(index.name.clone());
            t = t.with_index(index);
        }

        let textual = present.iter().find(|(_, ty)| ty.is_textual());
        if let (Some(german), Some((j, _))) = (seed.full_text, textual) {
            t = t.full_text(&format!("c{}", j), if german { "German" } else { "English" });
        }

        tables.push(t);
    }

    SchemaModel::from_tables(tables).unwrap()
}

proptest! {
    #[test]
    fn prop_generated_models_are_valid(m in model()) {
        prop_assert!(m.validate().is_ok());
    }

    #[test]
    fn prop_upgrade_to_self_is_empty(m in model()) {
        let plan = plan_upgrade(&m, &m, &UpgradeOptions::default()).unwrap();
        prop_assert!(plan.is_empty(), "{}", plan);
    }

    #[test]
    fn prop_plan_reproduces_target(old in model(), new in model()) {
        common::init_tracing();
        // Verification runs inside plan_upgrade.
        let forward = plan_upgrade(&old, &new, &UpgradeOptions::default());
        prop_assert!(forward.is_ok(), "{}", forward.unwrap_err());
        let backward = plan_upgrade(&new, &old, &UpgradeOptions::default());
        prop_assert!(backward.is_ok(), "{}", backward.unwrap_err());

        let without_renames = UpgradeOptions::default().detect_column_renames(false);
        let recreated = plan_upgrade(&old, &new, &without_renames);
        prop_assert!(recreated.is_ok(), "{}", recreated.unwrap_err());
    }

    #[test]
    fn prop_only_foreign_keys_are_deferred(old in model(), new in model()) {
        let plan = plan_upgrade(&old, &new, &UpgradeOptions::default()).unwrap();
        for action in &plan.deferred_foreign_keys {
            prop_assert_eq!(action.kind(), ActionKind::AddForeignKey);
        }
    }

    #[test]
    fn prop_planning_is_deterministic(old in model(), new in model()) {
        let options = UpgradeOptions::default().verify(false);
        let first = plan_upgrade(&old, &new, &options).unwrap();
        let second = plan_upgrade(&old, &new, &options).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(verify(&first, &old, &new).is_ok());
    }

    #[test]
    fn prop_schedule_respects_every_live_edge(old in model(), new in model()) {
        let graph = DependencyGraph::build(Differ::new(&old, &new).diff(), &old, &new).unwrap();
        let schedule = Planner::new(&graph).schedule().unwrap();

        let mut position = vec![None; graph.len()];
        for (i, &n) in schedule.ordered.iter().enumerate() {
            position[n] = Some(i);
        }
        prop_assert_eq!(
            schedule.ordered.len() + schedule.deferred.len(),
            graph.len()
        );
        for edge in graph.edges() {
            let deferred = edge
                .induced_by
                .is_some_and(|fk| schedule.deferred.contains(&fk));
            if deferred || schedule.deferred.contains(&edge.to) {
                continue;
            }
            prop_assert!(position[edge.from] < position[edge.to], "{:?}", edge);
        }
    }
}
