//! Declared message schemas.
//!
//! Application payloads are JSON values which must match a [MessageSchema] before they are encoded and after they are
//! decoded. The wire encoding is CBOR. Integers are carried as decimal strings and byte strings as `0x`-prefixed hex,
//! so no value ever passes through a floating point representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The name of the schema used for plain `execute` calls.
pub const EXECUTE_SCHEMA_NAME: &str = "universal.execute";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid category `{0}`: expected `<APP>:<SUBTYPE>`")]
    InvalidCategory(String),
    #[error("no schema registered for category `{0}`")]
    UnknownCategory(String),
    #[error("{schema}: missing field `{path}`")]
    MissingField { schema: String, path: String },
    #[error("{schema}: unexpected field `{path}`")]
    UnexpectedField { schema: String, path: String },
    #[error("{schema}: `{path}` should be {expected}")]
    TypeMismatch {
        schema: String,
        path: String,
        expected: &'static str,
    },
    #[error("failed to encode payload: {0}")]
    Encode(String),
    #[error("failed to decode payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Bool,
    /// A non-negative integer of any size, as a decimal string.
    Integer,
    /// `0x`-prefixed hex with an even number of digits.
    Bytes,
    /// A `0x`-prefixed 20 byte hex address.
    Address,
    List { item: Box<FieldKind> },
    Object { fields: Vec<Field> },
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::Integer => "a decimal integer string",
            FieldKind::Bytes => "a 0x-prefixed hex string",
            FieldKind::Address => "a 0x-prefixed 20 byte address",
            FieldKind::List { .. } => "a list",
            FieldKind::Object { .. } => "an object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: name.into(),
            kind,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        MessageSchema {
            name: name.into(),
            fields,
        }
    }

    /// The schema of the payload signed by `execute`.
    pub fn execute() -> Self {
        MessageSchema::new(
            EXECUTE_SCHEMA_NAME,
            vec![
                Field::required("target", FieldKind::Address),
                Field::required("value", FieldKind::Integer),
                Field::required("data", FieldKind::Bytes),
                Field::optional(
                    "message",
                    FieldKind::Object {
                        fields: vec![
                            Field::required("category", FieldKind::String),
                            Field::required("body", FieldKind::Bytes),
                        ],
                    },
                ),
            ],
        )
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        self.validate_object(&self.fields, value, "")
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, SchemaError> {
        self.validate(value)?;
        cbor4ii::serde::to_vec(Vec::new(), value).map_err(|e| SchemaError::Encode(format!("{e:?}")))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, SchemaError> {
        let value: Value = cbor4ii::serde::from_slice(bytes)
            .map_err(|e| SchemaError::Decode(format!("{e:?}")))?;
        self.validate(&value)?;
        Ok(value)
    }

    fn validate_object(
        &self,
        fields: &[Field],
        value: &Value,
        path: &str,
    ) -> Result<(), SchemaError> {
        let Value::Object(map) = value else {
            return Err(self.mismatch(if path.is_empty() { "$" } else { path }, "an object"));
        };

        if let Some(unexpected) = map.keys().find(|k| !fields.iter().any(|f| &f.name == *k)) {
            return Err(SchemaError::UnexpectedField {
                schema: self.name.clone(),
                path: join(path, unexpected),
            });
        }

        for field in fields {
            let field_path = join(path, &field.name);
            match map.get(&field.name) {
                None | Some(Value::Null) if field.optional => {}
                None => {
                    return Err(SchemaError::MissingField {
                        schema: self.name.clone(),
                        path: field_path,
                    });
                }
                Some(v) => self.validate_kind(&field.kind, v, &field_path)?,
            }
        }

        Ok(())
    }

    fn validate_kind(
        &self,
        kind: &FieldKind,
        value: &Value,
        path: &str,
    ) -> Result<(), SchemaError> {
        let ok = match (kind, value) {
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Integer, Value::String(s)) => {
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
            }
            (FieldKind::Bytes, Value::String(s)) => is_hex(s, None),
            (FieldKind::Address, Value::String(s)) => is_hex(s, Some(20)),
            (FieldKind::List { item }, Value::Array(items)) => {
                for (i, v) in items.iter().enumerate() {
                    self.validate_kind(item, v, &format!("{path}[{i}]"))?;
                }
                true
            }
            (FieldKind::Object { fields }, Value::Object(_)) => {
                self.validate_object(fields, value, path)?;
                true
            }
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(self.mismatch(path, kind.describe()))
        }
    }

    fn mismatch(&self, path: &str, expected: &'static str) -> SchemaError {
        SchemaError::TypeMismatch {
            schema: self.name.clone(),
            path: path.to_owned(),
            expected,
        }
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_owned()
    } else {
        format!("{path}.{name}")
    }
}

fn is_hex(s: &str, len_bytes: Option<usize>) -> bool {
    let Some(digits) = s.strip_prefix("0x") else {
        return false;
    };
    digits.len() % 2 == 0
        && digits.chars().all(|c| c.is_ascii_hexdigit())
        && len_bytes.is_none_or(|len| digits.len() == len * 2)
}

/// Check that `category` has the form `<APP>:<SUBTYPE>`, where both parts are non-empty and consist of ASCII
/// alphanumerics, `_` or `-`.
pub fn validate_category(category: &str) -> Result<(), SchemaError> {
    let part_ok = |p: &str| {
        !p.is_empty()
            && p.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    match category.split_once(':') {
        Some((app, subtype)) if part_ok(app) && part_ok(subtype) => Ok(()),
        _ => Err(SchemaError::InvalidCategory(category.to_owned())),
    }
}

/// Application message schemas, keyed by envelope category.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, MessageSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` for `category`, replacing any existing registration.
    pub fn register(
        &mut self,
        category: impl Into<String>,
        schema: MessageSchema,
    ) -> Result<(), SchemaError> {
        let category = category.into();
        validate_category(&category)?;
        self.schemas.insert(category, schema);
        Ok(())
    }

    pub fn get(&self, category: &str) -> Result<&MessageSchema, SchemaError> {
        self.schemas
            .get(category)
            .ok_or_else(|| SchemaError::UnknownCategory(category.to_owned()))
    }
}
