
use rectus::error::RectusError;
use rectus::permissions::{AccessDecision, AccessRequest, Action, DenyReason, FieldSet};
use serde_json::{json, Map};
use test_utils::{admin, editor, engine_with_articles, grant, row};

#[test]
fn read_is_projected_onto_the_allowlist() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    grant(&engine, &ctx, Action::Read, FieldSet::only(["title", "price"]), |p| p);

    let request = AccessRequest::new(
        "articles",
        "read",
        FieldSet::only(["title", "price", "internal_cost"]),
    );
    match engine.check(&ctx, &request).unwrap() {
        AccessDecision::Allowed(grant) => {
            assert_eq!(grant.fields, FieldSet::only(["title", "price"]));
            assert_eq!(grant.denied_fields, vec!["internal_cost".to_string()]);
            assert!(grant.row_filter.is_none());
        }
        other => panic!("expected Allowed, got {:?}", other),
    }

    let hidden_only = AccessRequest::new("articles", "read", FieldSet::only(["internal_cost"]));
    assert_eq!(
        engine.check(&ctx, &hidden_only).unwrap(),
        AccessDecision::DeniedFields(vec!["internal_cost".to_string()])
    );
}

#[test]
fn admin_sees_everything_on_known_collections() {
    let engine = engine_with_articles();
    let ctx = admin(&engine);

    let request = AccessRequest::new("articles", "read", FieldSet::All);
    match engine.check(&ctx, &request).unwrap() {
        AccessDecision::Allowed(grant) => {
            assert!(grant.fields.is_all());
            assert!(grant.row_filter.is_none());
        }
        other => panic!("expected Allowed, got {:?}", other),
    }

    let unknown = AccessRequest::new("ghosts", "read", FieldSet::All);
    assert_eq!(
        engine.check(&ctx, &unknown).unwrap(),
        AccessDecision::Denied(DenyReason::UnknownCollection("ghosts".to_string()))
    );
}

#[test]
fn unknown_actions_and_missing_rows_are_denied() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    grant(&engine, &ctx, Action::Read, FieldSet::All, |p| p);

    let share = AccessRequest::new("articles", "share", FieldSet::All);
    assert_eq!(
        engine.check(&ctx, &share).unwrap(),
        AccessDecision::Denied(DenyReason::UnknownAction("share".to_string()))
    );

    let delete = AccessRequest::new("articles", "delete", FieldSet::All);
    assert_eq!(
        engine.check(&ctx, &delete).unwrap(),
        AccessDecision::Denied(DenyReason::NoPermission)
    );
}

#[test]
fn duplicate_rows_or_their_filters() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    grant(&engine, &ctx, Action::Read, FieldSet::only(["title"]), |p| {
        p.with_filter(json!({"status": {"_eq": "published"}}))
    });
    grant(&engine, &ctx, Action::Read, FieldSet::only(["status"]), |p| {
        p.with_filter(json!({"owner": {"_eq": "$CURRENT_USER"}}))
    });

    let published = row(json!({"status": "published", "owner": "u2"}));
    let own_draft = row(json!({"status": "draft", "owner": "u1"}));
    let other_draft = row(json!({"status": "draft", "owner": "u2"}));

    for target in [&published, &own_draft] {
        let request = AccessRequest::new("articles", "read", FieldSet::All).with_row(target);
        match engine.check(&ctx, &request).unwrap() {
            AccessDecision::Allowed(grant) => {
                assert_eq!(grant.fields, FieldSet::only(["title", "status"]));
            }
            other => panic!("expected Allowed, got {:?}", other),
        }
    }

    let request = AccessRequest::new("articles", "read", FieldSet::All).with_row(&other_draft);
    assert_eq!(
        engine.check(&ctx, &request).unwrap(),
        AccessDecision::Denied(DenyReason::RowFiltered)
    );
}

#[test]
fn writes_are_validated_against_allowlist_and_predicate() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    let mut presets = Map::new();
    presets.insert("status".to_string(), json!("review"));
    grant(&engine, &ctx, Action::Create, FieldSet::only(["title", "price", "status"]), |p| {
        p.with_validation(json!({"price": {"_gt": 0}}))
            .with_presets(presets)
    });

    let good = row(json!({"title": "Hat", "price": 12}));
    let request = AccessRequest::new("articles", "create", FieldSet::All).with_payload(&good);
    match engine.check(&ctx, &request).unwrap() {
        AccessDecision::Allowed(grant) => {
            assert_eq!(grant.presets.get("status"), Some(&json!("review")));
        }
        other => panic!("expected Allowed, got {:?}", other),
    }

    let free = row(json!({"title": "Hat", "price": -1}));
    let request = AccessRequest::new("articles", "create", FieldSet::All).with_payload(&free);
    assert!(matches!(
        engine.check(&ctx, &request).unwrap(),
        AccessDecision::Denied(DenyReason::ValidationFailed(_))
    ));

    let sneaky = row(json!({"title": "Hat", "price": 5, "internal_cost": 1}));
    let request = AccessRequest::new("articles", "create", FieldSet::All).with_payload(&sneaky);
    assert_eq!(
        engine.check(&ctx, &request).unwrap(),
        AccessDecision::DeniedFields(vec!["internal_cost".to_string()])
    );
}

#[test]
fn allowlists_must_name_declared_fields() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    let permission = rectus::permissions::Permission::new(
        &ctx.role.id,
        "articles",
        Action::Read,
        FieldSet::only(["title", "colour"]),
    );
    assert!(engine.store_permission(&permission).is_err());
}

#[test]
fn deleting_a_field_prunes_allowlists() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    grant(&engine, &ctx, Action::Read, FieldSet::only(["title", "price"]), |p| p);

    engine.delete_field("articles", "price", false).unwrap();

    let stored = engine.db().list_permissions(&ctx.role.id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].fields, FieldSet::only(["title"]));

    let request = AccessRequest::new("articles", "read", FieldSet::only(["price"]));
    assert_eq!(
        engine.check(&ctx, &request).unwrap(),
        AccessDecision::DeniedFields(vec!["price".to_string()])
    );
}

#[test]
fn deleting_a_collection_removes_its_permissions() {
    let engine = engine_with_articles();
    let ctx = editor(&engine, "u1");
    grant(&engine, &ctx, Action::Read, FieldSet::All, |p| p);

    engine.delete_collection("articles").unwrap();
    assert!(engine.db().list_permissions(&ctx.role.id).unwrap().is_empty());

    let err = engine
        .check(&ctx, &AccessRequest::new("articles", "read", FieldSet::All))
        .unwrap()
        .into_result()
        .unwrap_err();
    assert!(matches!(err, RectusError::PermissionDenied(_)));
}
