//! Serialized schema shapes.
//!
//! This is the wire form the schema DSL serializes to. Only what is needed to
//! walk and validate a content tree is modelled; everything else rides along
//! in `options`.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use val_path::ModuleFilePath;

/// Schema kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaKind {
    Object,
    Array,
    Record,
    Union,
    String,
    Number,
    Boolean,
    Date,
    File,
    Image,
    RichText,
    Literal,
    KeyOf,
    Route,
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Record => "record",
            Self::Union => "union",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::File => "file",
            Self::Image => "image",
            Self::RichText => "richtext",
            Self::Literal => "literal",
            Self::KeyOf => "keyOf",
            Self::Route => "route",
        }
    }

    /// File and image nodes hold a reference token instead of inline content.
    pub fn is_file_like(self) -> bool {
        matches!(self, Self::File | Self::Image)
    }

    pub fn is_container(self) -> bool {
        matches!(self, Self::Object | Self::Array | Self::Record | Self::Union)
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub items: IndexMap<String, Schema>,
    #[serde(default)]
    pub opt: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    pub item: Box<Schema>,
    #[serde(default)]
    pub opt: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub item: Box<Schema>,
    #[serde(default)]
    pub opt: bool,
}

/// Discriminator of a union.
///
/// Object unions name the field holding a literal tag; string unions carry a
/// literal schema instead and list literal items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnionKey {
    Discriminator(String),
    Literal(Box<Schema>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionSchema {
    pub key: UnionKey,
    pub items: Vec<Schema>,
    #[serde(default)]
    pub opt: bool,
}

impl UnionSchema {
    /// The object variant whose discriminator literal equals `tag`.
    pub fn variant(&self, tag: &str) -> Option<&ObjectSchema> {
        let UnionKey::Discriminator(key) = &self.key else {
            return None;
        };
        self.items.iter().find_map(|item| match item {
            Schema::Object(obj) => match obj.items.get(key) {
                Some(Schema::Literal(lit)) if lit.value == tag => Some(obj),
                _ => None,
            },
            _ => None,
        })
    }

    /// The literal values of a string union.
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            Schema::Literal(lit) => Some(lit.value.as_str()),
            _ => None,
        })
    }

    pub fn is_string_union(&self) -> bool {
        matches!(self.key, UnionKey::Literal(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringSchema {
    #[serde(default)]
    pub opt: bool,
    #[serde(default)]
    pub raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberSchema {
    #[serde(default)]
    pub opt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooleanSchema {
    #[serde(default)]
    pub opt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateSchema {
    #[serde(default)]
    pub opt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// Shared by file and image nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSchema {
    #[serde(default)]
    pub opt: bool,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichTextSchema {
    #[serde(default)]
    pub opt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralSchema {
    pub value: String,
    #[serde(default)]
    pub opt: bool,
}

/// Key into another module's record or array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyOfSchema {
    /// Module the keys are taken from.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    #[serde(default)]
    pub opt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSchema {
    #[serde(default)]
    pub opt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// The closed set of schema shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Schema {
    Object(ObjectSchema),
    Array(ArraySchema),
    Record(RecordSchema),
    Union(UnionSchema),
    String(StringSchema),
    Number(NumberSchema),
    Boolean(BooleanSchema),
    Date(DateSchema),
    File(FileSchema),
    Image(FileSchema),
    #[serde(rename = "richtext")]
    RichText(RichTextSchema),
    Literal(LiteralSchema),
    KeyOf(KeyOfSchema),
    Route(RouteSchema),
}

impl Schema {
    pub fn kind(&self) -> SchemaKind {
        match self {
            Self::Object(_) => SchemaKind::Object,
            Self::Array(_) => SchemaKind::Array,
            Self::Record(_) => SchemaKind::Record,
            Self::Union(_) => SchemaKind::Union,
            Self::String(_) => SchemaKind::String,
            Self::Number(_) => SchemaKind::Number,
            Self::Boolean(_) => SchemaKind::Boolean,
            Self::Date(_) => SchemaKind::Date,
            Self::File(_) => SchemaKind::File,
            Self::Image(_) => SchemaKind::Image,
            Self::RichText(_) => SchemaKind::RichText,
            Self::Literal(_) => SchemaKind::Literal,
            Self::KeyOf(_) => SchemaKind::KeyOf,
            Self::Route(_) => SchemaKind::Route,
        }
    }

    /// Nullability flag.
    pub fn is_optional(&self) -> bool {
        match self {
            Self::Object(s) => s.opt,
            Self::Array(s) => s.opt,
            Self::Record(s) => s.opt,
            Self::Union(s) => s.opt,
            Self::String(s) => s.opt,
            Self::Number(s) => s.opt,
            Self::Boolean(s) => s.opt,
            Self::Date(s) => s.opt,
            Self::File(s) | Self::Image(s) => s.opt,
            Self::RichText(s) => s.opt,
            Self::Literal(s) => s.opt,
            Self::KeyOf(s) => s.opt,
            Self::Route(s) => s.opt,
        }
    }

    /// Parse a schema from its serialized JSON form.
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Schemas of every module, tagged with the version they were computed at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSet {
    #[serde(default)]
    pub schema_sha: Option<String>,
    pub schemas: BTreeMap<ModuleFilePath, Schema>,
}

impl SchemaSet {
    pub fn get(&self, module: &ModuleFilePath) -> Option<&Schema> {
        self.schemas.get(module)
    }
}
