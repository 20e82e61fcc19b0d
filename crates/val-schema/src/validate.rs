//! Full-tree structural validation.

use serde_json::{Map, Value};
use val_path::{ModuleFilePath, ModulePath, Segment};

use crate::schema::{ObjectSchema, Schema, UnionKey};
use crate::shallow::to_shallow_view;
use crate::walk::structural;
use crate::ResolveError;

/// Validate every node of `value` against `schema`, collecting all
/// structural errors instead of stopping at the first.
pub fn validate(module: &ModuleFilePath, schema: &Schema, value: &Value) -> Vec<ResolveError> {
    let mut errors = Vec::new();
    validate_inner(module, &ModulePath::root(), schema, value, &mut errors);
    errors
}

fn validate_inner(
    module: &ModuleFilePath,
    path: &ModulePath,
    schema: &Schema,
    value: &Value,
    errors: &mut Vec<ResolveError>,
) {
    if value.is_null() {
        if !schema.is_optional() {
            errors.push(structural(
                module,
                &path.segments(),
                format!("expected {}, found null on a non-optional field", schema.kind()),
            ));
        }
        return;
    }
    if let Err(err) = to_shallow_view(module, path, schema, value) {
        errors.push(err);
        return;
    }
    match (schema, value) {
        (Schema::Object(obj), Value::Object(map)) => validate_object(module, path, obj, map, errors),
        (Schema::Record(rec), Value::Object(map)) => {
            for (key, v) in map {
                validate_inner(module, &path.child(Segment::Key(key.clone())), &rec.item, v, errors);
            }
        }
        (Schema::Array(arr), Value::Array(items)) => {
            for (idx, v) in items.iter().enumerate() {
                validate_inner(module, &path.child(Segment::Index(idx)), &arr.item, v, errors);
            }
        }
        (Schema::Union(union), Value::Object(map)) => {
            if let UnionKey::Discriminator(key) = &union.key {
                let variant = map
                    .get(key)
                    .and_then(Value::as_str)
                    .and_then(|tag| union.variant(tag));
                if let Some(variant) = variant {
                    validate_object(module, path, variant, map, errors);
                }
            }
        }
        _ => {}
    }
}

fn validate_object(
    module: &ModuleFilePath,
    path: &ModulePath,
    obj: &ObjectSchema,
    map: &Map<String, Value>,
    errors: &mut Vec<ResolveError>,
) {
    for (key, item) in &obj.items {
        let child = path.child(Segment::Key(key.clone()));
        match map.get(key) {
            Some(v) => validate_inner(module, &child, item, v, errors),
            None if item.is_optional() => {}
            None => errors.push(structural(
                module,
                &child.segments(),
                "missing required field (undefined)",
            )),
        }
    }
}
