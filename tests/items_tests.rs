
use rectus::error::{RectusError, ValidationError};
use rectus::permissions::{Action, FieldSet, RequestContext};
use rectus::physical::PhysicalStore;
use rectus::schema::types::{DataType, FieldDefinition, FieldSchema};
use serde_json::{json, Map};
use test_utils::{admin, editor, engine_with_articles, grant, row};

const ALICE: &str = "0d6c3f4e-5b7a-4d8e-9f10-a1b2c3d4e5f6";
const BOB: &str = "7e8f9a0b-1c2d-4e3f-8a5b-6c7d8e9f0a1b";

fn owned_article(engine: &rectus::RectusEngine, title: &str, owner: &str) -> String {
    let ctx = admin(engine);
    let created = engine
        .items()
        .create_item(
            &ctx,
            "articles",
            row(json!({"title": title, "owner": owner, "price": 10, "internal_cost": 4})),
        )
        .unwrap();
    created["id"].as_str().unwrap().to_string()
}

#[test]
fn create_layers_payload_over_presets() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, ALICE);
    let mut presets = Map::new();
    presets.insert("status".to_string(), json!("review"));
    presets.insert("owner".to_string(), json!(ALICE));
    grant(
        &engine,
        &ctx,
        Action::Create,
        FieldSet::only(["title", "price", "status", "owner"]),
        |p| p.with_presets(presets),
    );

    let created = engine
        .items()
        .create_item(&ctx, "articles", row(json!({"title": "Hat", "status": "draft"})))
        .unwrap();
    assert_eq!(created["status"], json!("draft"));
    assert_eq!(created["owner"], json!(ALICE));
    assert!(created.contains_key("id"));
    assert!(!created.contains_key("internal_cost"));
}

#[test]
fn required_fields_are_enforced_on_create() {
    let engine = engine_with_articles();
    engine
        .synchronizer()
        .create_field(
            "articles",
            FieldDefinition::new("sku")
                .with_schema(FieldSchema::new(DataType::String))
                .required(),
        )
        .unwrap();
    let ctx = admin(&engine);

    let err = engine
        .items()
        .create_item(&ctx, "articles", row(json!({"title": "Hat"})))
        .unwrap_err();
    assert!(matches!(
        err,
        RectusError::Validation(ValidationError::InvalidPayload(_))
    ));

    let created = engine
        .items()
        .create_item(&ctx, "articles", row(json!({"title": "Hat", "sku": "H-1"})))
        .unwrap();
    assert_eq!(created["sku"], json!("H-1"));
}

#[test]
fn reads_only_return_permitted_rows_and_columns() {
    let engine = engine_with_articles();
    owned_article(&engine, "Mine", ALICE);
    owned_article(&engine, "Also mine", ALICE);
    owned_article(&engine, "Theirs", BOB);

    let ctx = editor(&engine, ALICE);
    grant(&engine, &ctx, Action::Read, FieldSet::only(["title", "price"]), |p| {
        p.with_filter(json!({"owner": {"_eq": "$CURRENT_USER"}}))
    });

    let mut titles: Vec<String> = engine
        .items()
        .read_items(&ctx, "articles", FieldSet::All, None)
        .unwrap()
        .into_iter()
        .map(|r| {
            assert!(!r.contains_key("internal_cost"));
            assert!(!r.contains_key("owner"));
            r["title"].as_str().unwrap().to_string()
        })
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Also mine", "Mine"]);

    let filter = json!({"title": {"_starts_with": "Also"}});
    let narrowed = engine
        .items()
        .read_items(&ctx, "articles", FieldSet::only(["title"]), Some(&filter))
        .unwrap();
    assert_eq!(narrowed.len(), 1);
    assert_eq!(narrowed[0]["title"], json!("Also mine"));
    assert!(!narrowed[0].contains_key("price"));
}

#[test]
fn caller_filters_cannot_probe_hidden_fields() {
    let engine = engine_with_articles();
    owned_article(&engine, "Mine", ALICE);
    let ctx = editor(&engine, ALICE);
    grant(&engine, &ctx, Action::Read, FieldSet::only(["title"]), |p| p);

    let probe = json!({"internal_cost": {"_lt": 5}});
    let err = engine
        .items()
        .read_items(&ctx, "articles", FieldSet::All, Some(&probe))
        .unwrap_err();
    match err {
        RectusError::DeniedFields(fields) => assert_eq!(fields, vec!["internal_cost"]),
        other => panic!("expected DeniedFields, got {:?}", other),
    }
}

#[test]
fn single_item_access_respects_the_row_filter() {
    let engine = engine_with_articles();
    let mine = owned_article(&engine, "Mine", ALICE);
    let theirs = owned_article(&engine, "Theirs", BOB);

    let ctx = editor(&engine, ALICE);
    grant(&engine, &ctx, Action::Read, FieldSet::All, |p| {
        p.with_filter(json!({"owner": {"_eq": "$CURRENT_USER"}}))
    });

    let item = engine
        .items()
        .read_item(&ctx, "articles", &mine, FieldSet::only(["title"]))
        .unwrap();
    assert_eq!(item["title"], json!("Mine"));

    let err = engine
        .items()
        .read_item(&ctx, "articles", &theirs, FieldSet::All)
        .unwrap_err();
    assert!(matches!(err, RectusError::PermissionDenied(_)));
}

#[test]
fn updates_are_limited_to_allowed_fields() {
    let engine = engine_with_articles();
    let mine = owned_article(&engine, "Mine", ALICE);
    let ctx = editor(&engine, ALICE);
    grant(&engine, &ctx, Action::Update, FieldSet::only(["title"]), |p| {
        p.with_filter(json!({"owner": {"_eq": "$CURRENT_USER"}}))
    });

    let updated = engine
        .items()
        .update_item(&ctx, "articles", &mine, row(json!({"title": "Renamed"})))
        .unwrap();
    assert_eq!(updated["title"], json!("Renamed"));
    assert!(!updated.contains_key("price"));

    let err = engine
        .items()
        .update_item(&ctx, "articles", &mine, row(json!({"price": 0})))
        .unwrap_err();
    assert!(matches!(err, RectusError::DeniedFields(_)));

    let stored = engine.physical().get_row("articles", &mine).unwrap().unwrap();
    assert_eq!(stored["title"], json!("Renamed"));
    assert_eq!(stored["price"], json!(10));
}

#[test]
fn deleting_items() {
    let engine = engine_with_articles();
    let mine = owned_article(&engine, "Mine", ALICE);
    let ctx = editor(&engine, ALICE);

    let err = engine.items().delete_item(&ctx, "articles", &mine).unwrap_err();
    assert!(matches!(err, RectusError::PermissionDenied(_)));

    grant(&engine, &ctx, Action::Delete, FieldSet::All, |p| p);
    engine.items().delete_item(&ctx, "articles", &mine).unwrap();

    let err = engine.items().delete_item(&ctx, "articles", &mine).unwrap_err();
    assert!(matches!(err, RectusError::NotFound(_)));
}

#[test]
fn callers_without_a_user_see_no_owned_rows() {
    let engine = engine_with_articles();
    let admin_ctx = admin(&engine);
    engine
        .items()
        .create_item(&admin_ctx, "articles", row(json!({"title": "orphan"})))
        .unwrap();
    owned_article(&engine, "Mine", ALICE);

    let ctx = editor(&engine, ALICE);
    grant(&engine, &ctx, Action::Read, FieldSet::All, |p| {
        p.with_filter(json!({"owner": {"_eq": "$CURRENT_USER"}}))
    });
    let anonymous = RequestContext::new(ctx.role.clone(), None);

    let visible = engine
        .items()
        .read_items(&anonymous, "articles", FieldSet::All, None)
        .unwrap();
    assert!(visible.is_empty(), "unexpected rows: {:?}", visible);

    let mine = engine
        .items()
        .read_items(&ctx, "articles", FieldSet::All, None)
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["title"], json!("Mine"));
}

#[test]
fn missing_ids_are_hidden_from_roles_without_access() {
    let engine = engine_with_articles();
    let existing = owned_article(&engine, "Mine", ALICE);
    let ctx = editor(&engine, ALICE);
    let missing = "00000000-0000-4000-8000-000000000000";

    for id in [existing.as_str(), missing] {
        let err = engine
            .items()
            .read_item(&ctx, "articles", id, FieldSet::All)
            .unwrap_err();
        assert!(matches!(err, RectusError::PermissionDenied(_)), "read {}: {:?}", id, err);

        let err = engine
            .items()
            .update_item(&ctx, "articles", id, row(json!({"title": "x"})))
            .unwrap_err();
        assert!(matches!(err, RectusError::PermissionDenied(_)), "update {}: {:?}", id, err);

        let err = engine.items().delete_item(&ctx, "articles", id).unwrap_err();
        assert!(matches!(err, RectusError::PermissionDenied(_)), "delete {}: {:?}", id, err);
    }

    grant(&engine, &ctx, Action::Read, FieldSet::All, |p| p);
    let err = engine
        .items()
        .read_item(&ctx, "articles", missing, FieldSet::All)
        .unwrap_err();
    assert!(matches!(err, RectusError::NotFound(_)));
}

#[test]
fn partial_updates_keep_validated_columns() {
    let engine = engine_with_articles();
    let mine = owned_article(&engine, "Hat", ALICE);
    let ctx = editor(&engine, ALICE);
    grant(&engine, &ctx, Action::Update, FieldSet::only(["title", "price"]), |p| {
        p.with_validation(json!({"price": {"_gt": 0}}))
    });

    let updated = engine
        .items()
        .update_item(&ctx, "articles", &mine, row(json!({"title": "Cap"})))
        .unwrap();
    assert_eq!(updated["title"], json!("Cap"));
    assert_eq!(updated["price"], json!(10));

    let err = engine
        .items()
        .update_item(&ctx, "articles", &mine, row(json!({"price": 0})))
        .unwrap_err();
    assert!(matches!(err, RectusError::PermissionDenied(_)));
}
