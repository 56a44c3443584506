#![allow(dead_code)]

use remodel::{Column, ColumnType, SchemaModel, Table};

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn entity_name(i: usize) -> String {
    format!("TestEntity{}", i)
}

/// `count` entities, each referencing up to `fanout` of its predecessors.
///
/// Every entity has a mapped text column with a full-text index and an
/// index per reference column.
pub fn chain_model(count: usize, fanout: usize) -> SchemaModel {
    let tables = (0..count).map(|i| {
        let mut t = Table::new(entity_name(i))
            .column(Column::new("Id", ColumnType::Int64))
            .column(Column::new("Text", ColumnType::Text).mapped("body"))
            .primary_key(&["Id"])
            .full_text("Text", "English");
        for k in 0..fanout.min(i) {
            let col = format!("Ref{}Id", k);
            t = t
                .column(Column::new(col.as_str(), ColumnType::Int64).nullable())
                .index(&[col.as_str()])
                .foreign_key(&[col.as_str()], &entity_name(i - 1 - k), &["Id"]);
        }
        t
    });
    SchemaModel::from_tables(tables).unwrap()
}

/// `count` entities where each references the next and the last the first.
pub fn ring_model(count: usize) -> SchemaModel {
    let tables = (0..count).map(|i| {
        Table::new(entity_name(i))
            .column(Column::new("Id", ColumnType::Int64))
            .column(Column::new("NextId", ColumnType::Int64).nullable())
            .primary_key(&["Id"])
            .foreign_key(&["NextId"], &entity_name((i + 1) % count), &["Id"])
    });
    SchemaModel::from_tables(tables).unwrap()
}

pub fn author() -> Table {
    Table::new("author")
        .column(Column::new("Id", ColumnType::Int64))
        .column(Column::new("Name", ColumnType::String))
        .primary_key(&["Id"])
}

pub fn book() -> Table {
    Table::new("book")
        .column(Column::new("Id", ColumnType::Int64))
        .column(Column::new("Title", ColumnType::Text))
        .column(Column::new("AuthorId", ColumnType::Int64))
        .primary_key(&["Id"])
        .index(&["AuthorId"])
        .foreign_key(&["AuthorId"], "author", &["Id"])
        .full_text("Title", "English")
}
