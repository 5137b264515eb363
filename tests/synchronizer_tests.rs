
use rectus::db_operations::MetadataStore;
use rectus::error::{ConflictError, RectusError, ValidationError};
use rectus::physical::PhysicalStore;
use rectus::schema::types::{
    CollectionDefinition, CollectionPatch, DataType, FieldDefinition, FieldPatch, FieldSchema,
    FieldSchemaPatch,
};
use serde_json::json;
use std::sync::Arc;
use test_utils::{article_fields, row, string_field, TestFixture};

#[test]
fn collection_columns_mirror_physical_fields() {
    let fixture = TestFixture::new();
    fixture.create_articles();

    assert_eq!(
        fixture.columns("articles"),
        fixture.physical_field_names("articles")
    );
    assert!(!fixture.columns("articles").contains(&"divider".to_string()));

    let entry = fixture.registry.get_collection("articles").unwrap();
    assert_eq!(entry.fields.len(), 7);
    assert!(fixture.registry.get_field("articles", "divider").unwrap().is_virtual());
}

#[test]
fn collection_names_are_checked() {
    let fixture = TestFixture::new();
    fixture.create_articles();

    let duplicate = fixture
        .synchronizer
        .create_collection(CollectionDefinition::new("articles"), vec![])
        .unwrap_err();
    assert!(matches!(
        duplicate,
        RectusError::Conflict(ConflictError::Duplicate { .. })
    ));

    let reserved = fixture
        .synchronizer
        .create_collection(CollectionDefinition::new("users"), vec![])
        .unwrap_err();
    assert!(matches!(
        reserved,
        RectusError::Validation(ValidationError::ReservedName(_))
    ));

    let invalid = fixture
        .synchronizer
        .create_collection(CollectionDefinition::new("1st-articles"), vec![])
        .unwrap_err();
    assert!(matches!(
        invalid,
        RectusError::Validation(ValidationError::InvalidIdentifier { .. })
    ));
    assert!(fixture.physical.table("1st-articles").unwrap().is_none());
}

#[test]
fn duplicate_field_in_definition_creates_nothing() {
    let fixture = TestFixture::new();
    let err = fixture
        .synchronizer
        .create_collection(
            CollectionDefinition::new("pages"),
            vec![string_field("slug"), string_field("slug")],
        )
        .unwrap_err();
    assert!(matches!(err, RectusError::Conflict(_)));
    assert!(fixture.physical.table("pages").unwrap().is_none());
    assert!(fixture.registry.get_collection("pages").is_none());
}

#[test]
fn created_field_is_visible_in_both_stores() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    let before = fixture.registry.snapshot().version();

    let field = fixture
        .synchronizer
        .create_field("articles", string_field("subtitle"))
        .unwrap();
    assert_eq!(field.data_type(), Some(DataType::String));
    assert!(fixture.columns("articles").contains(&"subtitle".to_string()));
    assert!(fixture.registry.get_field("articles", "subtitle").is_some());
    assert!(fixture.registry.snapshot().version() > before);

    let again = fixture
        .synchronizer
        .create_field("articles", string_field("subtitle"))
        .unwrap_err();
    assert!(matches!(again, RectusError::Conflict(_)));
}

#[test]
fn metadata_failure_removes_the_new_column() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    let columns = fixture.columns("articles");

    fixture.metadata.fail_apply(true);
    let err = fixture
        .synchronizer
        .create_field("articles", string_field("subtitle"))
        .unwrap_err();
    fixture.metadata.fail_apply(false);

    match err {
        RectusError::Consistency { compensations, .. } => {
            assert_eq!(compensations, "DropColumn(articles.subtitle)");
        }
        other => panic!("expected a consistency error, got {:?}", other),
    }
    assert_eq!(fixture.columns("articles"), columns);
    assert!(fixture.registry.get_field("articles", "subtitle").is_none());
}

#[test]
fn failed_compensation_is_reported_as_corruption() {
    let fixture = TestFixture::new();
    fixture.create_articles();

    fixture.metadata.fail_apply(true);
    fixture.physical.fail_drops(true);
    let err = fixture
        .synchronizer
        .create_field("articles", string_field("subtitle"))
        .unwrap_err();

    assert!(err.is_storage_corruption());
    assert!(err.to_string().contains("operator intervention"));
}

#[test]
fn metadata_failure_on_delete_restores_column_values() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    let inserted = fixture
        .physical
        .insert_row("articles", row(json!({"title": "Hello", "price": 9.5})))
        .unwrap();
    let id = inserted["id"].as_str().unwrap().to_string();

    fixture.metadata.fail_apply(true);
    let err = fixture
        .synchronizer
        .delete_field("articles", "title", false)
        .unwrap_err();
    fixture.metadata.fail_apply(false);

    assert!(matches!(err, RectusError::Consistency { .. }));
    let restored = fixture.physical.get_row("articles", &id).unwrap().unwrap();
    assert_eq!(restored["title"], json!("Hello"));
    assert_eq!(
        fixture.columns("articles"),
        fixture.physical_field_names("articles")
    );
}

#[test]
fn sort_field_is_protected_unless_forced() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    fixture
        .synchronizer
        .update_collection(
            "articles",
            CollectionPatch {
                sort_field: Some(Some("position".to_string())),
                ..Default::default()
            },
        )
        .unwrap();

    let err = fixture
        .synchronizer
        .delete_field("articles", "position", false)
        .unwrap_err();
    match err {
        RectusError::Conflict(ConflictError::FieldInUse { field, usage, .. }) => {
            assert_eq!(field, "position");
            assert!(usage.contains("sort"));
        }
        other => panic!("expected FieldInUse, got {:?}", other),
    }
    assert!(fixture.columns("articles").contains(&"position".to_string()));

    fixture
        .synchronizer
        .delete_field("articles", "position", true)
        .unwrap();
    let entry = fixture.registry.get_collection("articles").unwrap();
    assert_eq!(entry.collection.sort_field, None);
    assert!(!fixture.columns("articles").contains(&"position".to_string()));
}

#[test]
fn system_fields_cannot_be_deleted() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    let err = fixture
        .synchronizer
        .delete_field("articles", "id", true)
        .unwrap_err();
    assert!(matches!(
        err,
        RectusError::Validation(ValidationError::ReservedName(_))
    ));
}

#[test]
fn narrowing_a_populated_column_is_refused() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    fixture
        .physical
        .insert_row("articles", row(json!({"title": "A long enough title"})))
        .unwrap();

    let narrow = FieldPatch::default().schema(FieldSchemaPatch {
        max_length: Some(Some(4)),
        ..Default::default()
    });
    let err = fixture
        .synchronizer
        .update_field("articles", "title", narrow)
        .unwrap_err();
    assert!(matches!(
        err,
        RectusError::Validation(ValidationError::PotentialDataLoss(_))
    ));

    let widen = FieldPatch::default().schema(FieldSchemaPatch {
        data_type: Some(DataType::BigInteger),
        ..Default::default()
    });
    let updated = fixture
        .synchronizer
        .update_field("articles", "position", widen)
        .unwrap();
    assert_eq!(updated.data_type(), Some(DataType::BigInteger));
    let column = fixture
        .physical
        .table("articles")
        .unwrap()
        .unwrap()
        .column("position")
        .cloned()
        .unwrap();
    assert_eq!(column.data_type, DataType::BigInteger);
}

#[test]
fn virtual_fields_cannot_gain_a_column() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    let patch = FieldPatch {
        interface: Some("input".to_string()),
        ..Default::default()
    };
    let err = fixture
        .synchronizer
        .update_field("articles", "divider", patch)
        .unwrap_err();
    assert!(matches!(
        err,
        RectusError::Validation(ValidationError::IncompatibleFieldConfig(_))
    ));
}

#[test]
fn referenced_collection_cannot_be_deleted() {
    let fixture = TestFixture::new();
    fixture
        .synchronizer
        .create_collection(CollectionDefinition::new("authors"), vec![string_field("name")])
        .unwrap();
    fixture.create_articles();
    fixture
        .synchronizer
        .create_field(
            "articles",
            FieldDefinition::new("author")
                .with_schema(FieldSchema::new(DataType::Uuid).references("authors", "id")),
        )
        .unwrap();

    let err = fixture.synchronizer.delete_collection("authors").unwrap_err();
    match err {
        RectusError::Conflict(ConflictError::CollectionInUse { referenced_by, .. }) => {
            assert_eq!(referenced_by, "articles.author");
        }
        other => panic!("expected CollectionInUse, got {:?}", other),
    }

    fixture
        .synchronizer
        .delete_field("articles", "author", false)
        .unwrap();
    fixture.synchronizer.delete_collection("authors").unwrap();
    assert!(fixture.physical.table("authors").unwrap().is_none());
    assert!(fixture.registry.get_collection("authors").is_none());
}

#[test]
fn metadata_failure_on_collection_delete_restores_rows() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    fixture
        .physical
        .insert_row("articles", row(json!({"title": "Kept"})))
        .unwrap();

    fixture.metadata.fail_apply(true);
    let err = fixture.synchronizer.delete_collection("articles").unwrap_err();
    fixture.metadata.fail_apply(false);

    assert!(matches!(err, RectusError::Consistency { .. }));
    let rows = fixture.physical.rows("articles").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], json!("Kept"));
    assert!(fixture.registry.get_collection("articles").is_some());
}

#[test]
fn concurrent_field_creation_keeps_stores_in_step() {
    let fixture = Arc::new(TestFixture::new());
    fixture.create_articles();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fixture = Arc::clone(&fixture);
            std::thread::spawn(move || {
                fixture
                    .synchronizer
                    .create_field("articles", string_field(&format!("extra_{}", i)))
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(
        fixture.columns("articles"),
        fixture.physical_field_names("articles")
    );
    let entry = fixture.registry.get_collection("articles").unwrap();
    for i in 0..8 {
        assert!(entry.field(&format!("extra_{}", i)).is_some());
    }
}

#[test]
fn racing_creates_of_one_field_yield_one_winner() {
    let fixture = Arc::new(TestFixture::new());
    fixture.create_articles();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            std::thread::spawn(move || {
                fixture
                    .synchronizer
                    .create_field("articles", string_field("subtitle"))
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(
        fixture.columns("articles"),
        fixture.physical_field_names("articles")
    );
}

#[test]
fn archive_field_is_protected_unless_forced() {
    let fixture = TestFixture::new();
    fixture
        .synchronizer
        .create_collection(
            CollectionDefinition::new("articles").archive_field("status", "archived", "draft"),
            article_fields(),
        )
        .unwrap();

    let err = fixture
        .synchronizer
        .delete_field("articles", "status", false)
        .unwrap_err();
    match err {
        RectusError::Conflict(ConflictError::FieldInUse { field, usage, .. }) => {
            assert_eq!(field, "status");
            assert!(usage.contains("archive_field"));
        }
        other => panic!("expected FieldInUse, got {:?}", other),
    }
    assert!(fixture.columns("articles").contains(&"status".to_string()));
    assert!(fixture.registry.get_field("articles", "status").is_some());

    fixture
        .synchronizer
        .delete_field("articles", "status", true)
        .unwrap();
    let entry = fixture.registry.get_collection("articles").unwrap();
    assert_eq!(entry.collection.archive_field, None);
    assert_eq!(entry.collection.archive_value, None);
    assert_eq!(
        fixture.columns("articles"),
        fixture.physical_field_names("articles")
    );
}

#[test]
fn relation_target_column_is_protected_unless_forced() {
    let fixture = TestFixture::new();
    fixture
        .synchronizer
        .create_collection(CollectionDefinition::new("authors"), vec![string_field("code")])
        .unwrap();
    fixture.create_articles();
    fixture
        .synchronizer
        .create_field(
            "articles",
            FieldDefinition::new("author_code")
                .with_schema(FieldSchema::new(DataType::String).references("authors", "code")),
        )
        .unwrap();

    let err = fixture
        .synchronizer
        .delete_field("authors", "code", false)
        .unwrap_err();
    match err {
        RectusError::Conflict(ConflictError::FieldInUse { field, usage, .. }) => {
            assert_eq!(field, "code");
            assert!(usage.contains("articles.author_code"));
        }
        other => panic!("expected FieldInUse, got {:?}", other),
    }
    assert!(fixture.columns("authors").contains(&"code".to_string()));

    fixture
        .synchronizer
        .delete_field("authors", "code", true)
        .unwrap();
    assert!(!fixture.columns("authors").contains(&"code".to_string()));

    let column = fixture
        .physical
        .table("articles")
        .unwrap()
        .unwrap()
        .column("author_code")
        .cloned()
        .unwrap();
    assert_eq!(column.foreign_key, None);
    let field = fixture.registry.get_field("articles", "author_code").unwrap();
    assert!(field.foreign_key().is_none());
    let stored = fixture
        .db
        .load_fields("articles")
        .unwrap()
        .into_iter()
        .find(|f| f.field == "author_code")
        .unwrap();
    assert!(stored.foreign_key().is_none());
}

#[test]
fn narrowing_an_empty_column_is_allowed() {
    let fixture = TestFixture::new();
    fixture.create_articles();
    assert_eq!(fixture.physical.row_count("articles").unwrap(), 0);

    let narrow = FieldPatch::default().schema(FieldSchemaPatch {
        max_length: Some(Some(4)),
        is_nullable: Some(false),
        ..Default::default()
    });
    let updated = fixture
        .synchronizer
        .update_field("articles", "title", narrow)
        .unwrap();
    let schema = updated.schema.clone().unwrap();
    assert_eq!(schema.max_length, Some(4));
    assert!(!schema.is_nullable);

    let column = fixture
        .physical
        .table("articles")
        .unwrap()
        .unwrap()
        .column("title")
        .cloned()
        .unwrap();
    assert_eq!(column.max_length, Some(4));
    assert!(!column.nullable);
    assert_eq!(
        fixture.registry.get_field("articles", "title").unwrap().schema,
        Some(schema)
    );
}
