use proptest::prelude::*;
use serde_json::{json, Value};
use val_path::{ModuleFilePath, ModulePath};
use val_schema::{to_shallow_view, ResolveError, Schema, SchemaKind};

fn module() -> ModuleFilePath {
    ModuleFilePath::new("/content/pages.val.ts").unwrap()
}

/// One schema per kind with a valid and an invalid sample value.
fn cases() -> Vec<(Schema, Value, Value)> {
    let raw = vec![
        (
            json!({"type": "object", "items": {"a": {"type": "string"}}}),
            json!({"a": "x"}),
            json!(["x"]),
        ),
        (
            json!({"type": "array", "item": {"type": "string"}}),
            json!(["x", "y"]),
            json!("x"),
        ),
        (
            json!({"type": "record", "item": {"type": "number"}}),
            json!({"one": 1}),
            json!(1),
        ),
        (
            json!({"type": "union", "key": "kind", "items": [
                {"type": "object", "items": {"kind": {"type": "literal", "value": "a"}}}
            ]}),
            json!({"kind": "a"}),
            json!({"kind": "zzz"}),
        ),
        (json!({"type": "string"}), json!("hello"), json!(5)),
        (json!({"type": "number"}), json!(4.5), json!("4.5")),
        (json!({"type": "boolean"}), json!(true), json!("true")),
        (json!({"type": "date"}), json!("2024-01-01"), json!(20240101)),
        (
            json!({"type": "file"}),
            json!({"_ref": "/public/val/a.pdf", "_type": "file"}),
            json!("/public/val/a.pdf"),
        ),
        (
            json!({"type": "image"}),
            json!({"_ref": "https://cdn/x.png", "_type": "remote", "metadata": {"width": 1}}),
            json!({"_type": "file"}),
        ),
        (
            json!({"type": "richtext"}),
            json!([{"tag": "p", "children": ["hi"]}]),
            json!({"tag": "p"}),
        ),
        (json!({"type": "literal", "value": "fixed"}), json!("fixed"), json!("other")),
        (
            json!({"type": "keyOf", "path": "/content/authors.val.ts"}),
            json!("alice"),
            json!(true),
        ),
        (json!({"type": "route"}), json!("/blog/first"), json!(["/blog"])),
    ];
    raw.into_iter()
        .map(|(s, ok, bad)| (Schema::from_json(&s).unwrap(), ok, bad))
        .collect()
}

#[test]
fn every_kind_is_covered() {
    let kinds: std::collections::BTreeSet<SchemaKind> = cases().iter().map(|(s, _, _)| s.kind()).collect();
    assert_eq!(kinds.len(), 14);
}

#[test]
fn valid_values_and_null_succeed_for_every_kind() {
    for (schema, ok, _) in cases() {
        let path = ModulePath::root();
        assert!(
            to_shallow_view(&module(), &path, &schema, &ok).is_ok(),
            "{} rejected {ok}",
            schema.kind()
        );
        assert!(to_shallow_view(&module(), &path, &schema, &Value::Null).unwrap().is_null());
    }
}

#[test]
fn invalid_values_are_structural_for_every_kind() {
    for (schema, _, bad) in cases() {
        let err = to_shallow_view(&module(), &ModulePath::root(), &schema, &bad).unwrap_err();
        match err {
            ResolveError::Structural { path, message } => {
                assert_eq!(path.as_str(), "/content/pages.val.ts");
                assert!(!message.is_empty(), "{} gave empty message", schema.kind());
            }
            other => panic!("{} gave {other:?}", schema.kind()),
        }
    }
}

proptest! {
    #[test]
    fn any_string_is_a_valid_string_view(s in any::<String>()) {
        let schema = Schema::from_json(&json!({"type": "string"})).unwrap();
        let view = to_shallow_view(&module(), &ModulePath::root(), &schema, &json!(s)).unwrap();
        prop_assert_eq!(view.to_json(), json!(s));
    }

    #[test]
    fn record_view_has_one_address_per_key(keys in prop::collection::btree_set("[a-z0-9]{1,6}", 0..8)) {
        let schema = Schema::from_json(&json!({"type": "record", "item": {"type": "string"}})).unwrap();
        let value = Value::Object(keys.iter().map(|k| (k.clone(), json!("v"))).collect());
        let view = to_shallow_view(&module(), &ModulePath::root(), &schema, &value).unwrap();
        let json = view.to_json();
        let map = json.as_object().unwrap();
        prop_assert_eq!(map.len(), keys.len());
        for key in &keys {
            let expected = format!("/content/pages.val.ts?p={}", json!(key));
            prop_assert_eq!(map[key].as_str().unwrap(), expected.as_str());
        }
    }
}
