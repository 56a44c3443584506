use super::*;

fn author() -> Table {
    Table::new("author")
        .column(Column::new("Id", ColumnType::Int64))
        .column(Column::new("Name", ColumnType::String))
        .primary_key(&["Id"])
}

fn book() -> Table {
    Table::new("book")
        .column(Column::new("Id", ColumnType::Int64))
        .column(Column::new("Title", ColumnType::Text).mapped("title"))
        .column(Column::new("AuthorId", ColumnType::Int64))
        .primary_key(&["Id"])
        .index(&["Title"])
        .foreign_key(&["AuthorId"], "author", &["Id"])
        .full_text("Title", "English")
}

fn library() -> SchemaModel {
    SchemaModel::from_tables([author(), book()]).unwrap()
}

#[test]
fn test_storage_name_defaults_to_logical_name() {
    let plain = Column::new("Text", ColumnType::Text);
    let mapped = Column::new("Text", ColumnType::Text).mapped("body");

    assert_eq!(plain.storage_name(), "Text");
    assert_eq!(mapped.storage_name(), "body");
    assert!(plain.same_shape(&mapped));
    assert!(!plain.same_shape(&plain.clone().nullable()));
}

#[test]
fn test_builder_names_indices_by_convention() {
    let t = book();
    assert_eq!(t.indices[0].name, "idx_book_Title");
    assert_eq!(t.foreign_keys[0].constraint_name("book"), "fk_book_AuthorId_author");
    assert_eq!(
        t.full_text.as_ref().unwrap().index_name("book"),
        "ft_book_Title"
    );
    assert_eq!(t.storage_name_of("Title"), "title");
    assert_eq!(t.column_by_storage("title").unwrap().name, "Title");
}

#[test]
fn test_shell_strips_sub_objects() {
    let shell = book().shell();
    assert_eq!(shell.columns.len(), 3);
    assert_eq!(shell.primary_key, vec!["Id".to_string()]);
    assert!(shell.indices.is_empty());
    assert!(shell.foreign_keys.is_empty());
    assert!(shell.full_text.is_none());
}

#[test]
fn test_duplicate_table_rejected_on_insert() {
    let err = SchemaModel::from_tables([author(), author()]).unwrap_err();
    assert_eq!(
        err,
        MalformedSchemaError::DuplicateTable {
            table: "author".to_string()
        }
    );
}

#[test]
fn test_valid_model_passes() {
    library().validate().unwrap();
}

#[test]
fn test_validate_unknown_fk_target() {
    let model = SchemaModel::from_tables([book()]).unwrap();
    let err = model.validate().unwrap_err();
    assert!(matches!(
        err,
        MalformedSchemaError::UnknownForeignKeyTarget { ref references_table, .. } if references_table == "author"
    ));
}

#[test]
fn test_validate_unknown_referenced_column() {
    let child = Table::new("book")
        .column(Column::new("AuthorId", ColumnType::Int64))
        .foreign_key(&["AuthorId"], "author", &["Missing"]);
    let model = SchemaModel::from_tables([author(), child]).unwrap();
    assert!(matches!(
        model.validate(),
        Err(MalformedSchemaError::UnknownReferencedColumn { ref column, .. }) if column == "Missing"
    ));
}

#[test]
fn test_validate_fk_arity() {
    let child = Table::new("book")
        .column(Column::new("AuthorId", ColumnType::Int64))
        .foreign_key(&["AuthorId"], "author", &["Id", "Name"]);
    let model = SchemaModel::from_tables([author(), child]).unwrap();
    assert!(matches!(
        model.validate(),
        Err(MalformedSchemaError::ForeignKeyArity {
            columns: 1,
            references_columns: 2,
            ..
        })
    ));
}

#[test]
fn test_one_column_may_reference_several_parents() {
    let team = Table::new("team")
        .column(Column::new("Id", ColumnType::Int64))
        .primary_key(&["Id"]);
    let post = Table::new("post")
        .column(Column::new("Id", ColumnType::Int64))
        .column(Column::new("OwnerId", ColumnType::Int64))
        .primary_key(&["Id"])
        .foreign_key(&["OwnerId"], "author", &["Id"])
        .foreign_key(&["OwnerId"], "team", &["Id"]);
    let model = SchemaModel::from_tables([author(), team, post]).unwrap();
    model.validate().unwrap();

    let post = model.get_table("post").unwrap();
    assert_eq!(
        post.foreign_keys[0].constraint_name("post"),
        "fk_post_OwnerId_author"
    );
    assert_eq!(
        post.foreign_keys[1].constraint_name("post"),
        "fk_post_OwnerId_team"
    );
}

#[test]
fn test_validate_duplicate_constraint_name() {
    let child = Table::new("book")
        .column(Column::new("AuthorRef", ColumnType::Int64))
        .foreign_key(&["AuthorRef"], "author", &["Id"])
        .foreign_key(&["AuthorRef"], "author", &["Name"]);
    let model = SchemaModel::from_tables([author(), child]).unwrap();
    assert_eq!(
        model.validate().unwrap_err().to_string(),
        "constraint name 'fk_book_AuthorRef_author' on 'book' is used by two foreign keys"
    );
}

#[test]
fn test_validate_unknown_index_column() {
    let t = author().index(&["Email"]);
    let model = SchemaModel::from_tables([t]).unwrap();
    let err = model.validate().unwrap_err();
    assert_eq!(
        err.to_string(),
        "index 'idx_author_Email' on 'author' names unknown column 'Email'"
    );
}

#[test]
fn test_validate_duplicate_storage_name() {
    let t = Table::new("t")
        .column(Column::new("A", ColumnType::Int32).mapped("x"))
        .column(Column::new("B", ColumnType::Int32).mapped("x"));
    let model = SchemaModel::from_tables([t]).unwrap();
    assert!(matches!(
        model.validate(),
        Err(MalformedSchemaError::DuplicateStorageName { .. })
    ));
}

#[test]
fn test_validate_full_text_requires_text_column() {
    let t = author().full_text("Id", "English");
    let model = SchemaModel::from_tables([t]).unwrap();
    assert!(matches!(
        model.validate(),
        Err(MalformedSchemaError::FullTextColumnNotText { .. })
    ));
}

#[test]
fn test_validate_table_key_mismatch() {
    let mut model = SchemaModel::new();
    model.tables.insert("writer".to_string(), author());
    assert!(matches!(
        model.validate(),
        Err(MalformedSchemaError::TableKeyMismatch { .. })
    ));
}

#[test]
fn test_validate_duplicate_index_key() {
    let t = author()
        .index(&["Name"])
        .with_index(Index::new("by_name", &["Name"], false));
    let model = SchemaModel::from_tables([t]).unwrap();
    assert!(matches!(
        model.validate(),
        Err(MalformedSchemaError::DuplicateIndex { .. })
    ));
}

#[test]
fn test_apply_create_table_uses_shell() {
    let mut model = SchemaModel::new();
    model.apply(&SchemaAction::CreateTable(book())).unwrap();
    let t = model.get_table("book").unwrap();
    assert!(t.indices.is_empty());
    assert!(t.foreign_keys.is_empty());
}

#[test]
fn test_apply_rejects_existing_table() {
    let mut model = library();
    let err = model
        .apply(&SchemaAction::CreateTable(author().shell()))
        .unwrap_err();
    assert!(matches!(err, ApplyError::TableAlreadyExists { .. }));
    assert_eq!(err.to_string(), "+ table author: table 'author' already exists");
}

#[test]
fn test_apply_drop_table_with_dependents_fails() {
    let mut model = library();
    let err = model
        .apply(&SchemaAction::DropTable(author().shell()))
        .unwrap_err();
    match err {
        ApplyError::TableHasDependents { dependents, .. } => {
            assert_eq!(dependents, vec!["foreign key fk_book_AuthorId_author on book"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Nothing changed
    assert_eq!(model, library());
}

#[test]
fn test_apply_drop_column_in_use_fails() {
    let mut model = library();
    let err = model
        .apply(&SchemaAction::DropColumn {
            table: "book".to_string(),
            column: Column::new("Title", ColumnType::Text).mapped("title"),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ApplyError::ColumnInUse { ref used_by, .. } if used_by == "index idx_book_Title"
    ));
}

#[test]
fn test_apply_referenced_column_is_in_use() {
    let mut model = library();
    let err = model
        .apply(&SchemaAction::DropColumn {
            table: "author".to_string(),
            column: Column::new("Name", ColumnType::String),
        })
        .map(|_| ());
    assert!(err.is_ok());

    let err = model
        .apply(&SchemaAction::DropColumn {
            table: "author".to_string(),
            column: Column::new("Id", ColumnType::Int64),
        })
        .unwrap_err();
    assert!(matches!(err, ApplyError::ColumnInUse { .. }));
}

#[test]
fn test_apply_rename_column() {
    let mut model = library();
    model
        .apply(&SchemaAction::RenameColumn {
            table: "book".to_string(),
            column: "Title".to_string(),
            from: "title".to_string(),
            to: "Title".to_string(),
        })
        .unwrap();
    let col = model.get_table("book").unwrap().get_column("Title").unwrap();
    assert_eq!(col.mapped_name, None);
    assert_eq!(col.storage_name(), "Title");
}

#[test]
fn test_apply_rename_to_taken_storage_name_fails() {
    let mut model = library();
    let err = model
        .apply(&SchemaAction::RenameColumn {
            table: "book".to_string(),
            column: "Title".to_string(),
            from: "title".to_string(),
            to: "AuthorId".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, ApplyError::StorageNameTaken { .. }));
}

#[test]
fn test_apply_fk_requires_target() {
    let mut model = SchemaModel::from_tables([book().shell()]).unwrap();
    let err = model
        .apply(&SchemaAction::AddForeignKey {
            table: "book".to_string(),
            foreign_key: ForeignKey::new(&["AuthorId"], "author", &["Id"]),
        })
        .unwrap_err();
    assert!(matches!(err, ApplyError::ForeignKeyTargetNotFound { .. }));
}

#[test]
fn test_apply_fk_rejects_taken_constraint_name() {
    let mut model = library();
    let err = model
        .apply(&SchemaAction::AddForeignKey {
            table: "book".to_string(),
            foreign_key: ForeignKey::new(&["AuthorId"], "author", &["Name"]),
        })
        .unwrap_err();
    assert!(matches!(err, ApplyError::ForeignKeyAlreadyExists { .. }));
}

#[test]
fn test_action_then_inverse_restores_model() {
    let base = library();
    let actions = [
        SchemaAction::AddColumn {
            table: "author".to_string(),
            column: Column::new("Bio", ColumnType::Text).nullable(),
        },
        SchemaAction::CreateIndex {
            table: "author".to_string(),
            index: Index::new("uq_author_Name", &["Name"], true),
        },
        SchemaAction::DropFullTextIndex {
            table: "book".to_string(),
            index: FullTextIndex::new("Title", "English"),
        },
        SchemaAction::DropForeignKey {
            table: "book".to_string(),
            foreign_key: ForeignKey::new(&["AuthorId"], "author", &["Id"]),
        },
    ];

    for action in &actions {
        let mut model = base.clone();
        model.apply(action).unwrap();
        assert!(!model.structurally_eq(&base), "{action} changed nothing");
        model.apply(&action.inverse()).unwrap();
        assert!(model.structurally_eq(&base), "{action} was not undone");
    }
}

#[test]
fn test_structural_equality_ignores_column_order_and_index_names() {
    let a = SchemaModel::from_tables([author().index(&["Name"])]).unwrap();
    let reordered = Table::new("author")
        .column(Column::new("Name", ColumnType::String))
        .column(Column::new("Id", ColumnType::Int64))
        .primary_key(&["Id"])
        .with_index(Index::new("author_by_name", &["Name"], false));
    let b = SchemaModel::from_tables([reordered]).unwrap();

    assert_ne!(a, b);
    assert!(a.structurally_eq(&b));
}

#[test]
fn test_structural_mismatch_report() {
    let a = library();
    let mut b = library();
    b.tables["book"].full_text = None;
    b.tables["author"].columns[1].nullable = true;
    b.insert_table(Table::new("tag").column(Column::new("Id", ColumnType::Int32)))
        .unwrap();

    let report = a.structural_mismatch(&b).unwrap();
    assert_eq!(
        report,
        "+ table tag\n\
         author: ~ column Name: VARCHAR NOT NULL as Name -> VARCHAR NULL as Name\n\
         book: ~ FULLTEXT (Title, English) -> none\n"
    );
    assert!(a.structural_mismatch(&a).is_none());
}

#[test]
fn test_action_display() {
    let add = SchemaAction::AddColumn {
        table: "book".to_string(),
        column: Column::new("Title", ColumnType::Text).nullable().mapped("title"),
    };
    assert_eq!(add.to_string(), "book: + column Title TEXT (nullable) as title");

    let fk = SchemaAction::AddForeignKey {
        table: "book".to_string(),
        foreign_key: ForeignKey::new(&["AuthorId"], "author", &["Id"]),
    };
    assert_eq!(fk.to_string(), "book: + FOREIGN KEY (AuthorId) -> author.Id");
    assert_eq!(
        fk.inverse().to_string(),
        "book: - FOREIGN KEY (AuthorId) -> author.Id"
    );
}

#[test]
fn test_kind_priority_order() {
    assert!(ActionKind::DropForeignKey < ActionKind::DropIndex);
    assert!(ActionKind::DropColumn < ActionKind::DropTable);
    assert!(ActionKind::DropTable < ActionKind::CreateTable);
    assert!(ActionKind::CreateTable < ActionKind::AddColumn);
    assert!(ActionKind::CreateIndex < ActionKind::AddForeignKey);
    assert!(ActionKind::AddForeignKey < ActionKind::CreateFullTextIndex);
}
