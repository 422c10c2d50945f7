//! Structural shape checks keyed by path prefix.
//!
//! A schema is declared as a JSON value (`{"type":"object", ...}`) and
//! compiled once at open time. Before a write at path `Q`, the engine
//! descends every schema whose prefix `P` prefixes `Q` by the remainder
//! `Q\P` and validates the incoming value against the sub-schema found
//! there. No sub-schema for the remainder means no constraint.

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{KernelError, Result};
use crate::path::is_index_segment;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl SchemaType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "object" => Some(SchemaType::Object),
            "array" => Some(SchemaType::Array),
            "string" => Some(SchemaType::String),
            "number" => Some(SchemaType::Number),
            "boolean" => Some(SchemaType::Boolean),
            "null" => Some(SchemaType::Null),
            _ => None,
        }
    }

    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (SchemaType::Object, Value::Object(_))
                | (SchemaType::Array, Value::Array(_))
                | (SchemaType::String, Value::String(_))
                | (SchemaType::Number, Value::Number(_))
                | (SchemaType::Boolean, Value::Bool(_))
                | (SchemaType::Null, Value::Null)
        )
    }

    fn name(self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
        }
    }
}

/// A compiled schema node.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    kind: Option<SchemaType>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique_items: bool,
    items: Option<Box<Schema>>,
    properties: IndexMap<String, Schema>,
    required: Vec<String>,
    allowed: Option<Vec<Value>>,
}

impl Schema {
    /// Compile a schema declaration. Unknown keys are rejected so a typo'd
    /// constraint does not silently validate everything.
    pub fn compile(decl: &Value) -> Result<Schema> {
        let map = decl.as_object().ok_or_else(|| {
            KernelError::validation("", format!("schema must be an object, got {}", decl.type_name()))
        })?;

        let mut schema = Schema::default();
        for (key, value) in map.iter() {
            match key.as_str() {
                "type" => {
                    let name = value.as_str().ok_or_else(|| bad_decl("type must be a string"))?;
                    schema.kind = Some(
                        SchemaType::parse(name)
                            .ok_or_else(|| bad_decl(format!("unknown type `{name}`")))?,
                    );
                }
                "minLength" => schema.min_length = Some(usize_field(value, "minLength")?),
                "maxLength" => schema.max_length = Some(usize_field(value, "maxLength")?),
                "pattern" => {
                    let text = value
                        .as_str()
                        .ok_or_else(|| bad_decl("pattern must be a string"))?;
                    schema.pattern = Some(
                        Regex::new(text)
                            .map_err(|e| bad_decl(format!("invalid pattern: {e}")))?,
                    );
                }
                "minimum" => schema.minimum = Some(f64_field(value, "minimum")?),
                "maximum" => schema.maximum = Some(f64_field(value, "maximum")?),
                "exclusiveMinimum" => {
                    schema.exclusive_minimum = Some(f64_field(value, "exclusiveMinimum")?)
                }
                "exclusiveMaximum" => {
                    schema.exclusive_maximum = Some(f64_field(value, "exclusiveMaximum")?)
                }
                "minItems" => schema.min_items = Some(usize_field(value, "minItems")?),
                "maxItems" => schema.max_items = Some(usize_field(value, "maxItems")?),
                "uniqueItems" => {
                    schema.unique_items = value
                        .as_bool()
                        .ok_or_else(|| bad_decl("uniqueItems must be a boolean"))?
                }
                "items" => schema.items = Some(Box::new(Schema::compile(value)?)),
                "properties" => {
                    let props = value
                        .as_object()
                        .ok_or_else(|| bad_decl("properties must be an object"))?;
                    for (name, sub) in props.iter() {
                        schema.properties.insert(name.clone(), Schema::compile(sub)?);
                    }
                }
                "required" => {
                    let names = value
                        .as_array()
                        .ok_or_else(|| bad_decl("required must be an array"))?;
                    for name in names {
                        schema.required.push(
                            name.as_str()
                                .ok_or_else(|| bad_decl("required entries must be strings"))?
                                .to_string(),
                        );
                    }
                }
                "enum" => {
                    let options = value
                        .as_array()
                        .ok_or_else(|| bad_decl("enum must be an array"))?;
                    schema.allowed = Some(options.to_vec());
                }
                other => return Err(bad_decl(format!("unknown schema key `{other}`"))),
            }
        }
        Ok(schema)
    }

    /// Sub-schema for a relative path below this node. Object segments go
    /// through `properties`, index segments through `items`.
    pub fn descend(&self, remainder: &[String]) -> Option<&Schema> {
        let mut current = self;
        for segment in remainder {
            current = if let Some(sub) = current.properties.get(segment.as_str()) {
                sub
            } else if is_index_segment(segment) {
                current.items.as_deref()?
            } else {
                return None;
            };
        }
        Some(current)
    }

    /// Validate `value` as the content of `at` (used only for error text).
    pub fn validate(&self, value: &Value, at: &str) -> Result<()> {
        if let Some(kind) = self.kind {
            if !kind.matches(value) {
                return Err(KernelError::validation(
                    at,
                    format!("expected {}, got {}", kind.name(), value.type_name()),
                ));
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return Err(KernelError::validation(at, "value not in enum"));
            }
        }

        match value {
            Value::String(s) => self.validate_string(s, at)?,
            Value::Number(n) => self.validate_number(*n, at)?,
            Value::Array(items) => self.validate_array(items, at)?,
            Value::Object(_) => self.validate_object(value, at)?,
            _ => {}
        }
        Ok(())
    }

    fn validate_string(&self, s: &str, at: &str) -> Result<()> {
        let chars = s.chars().count();
        if let Some(min) = self.min_length {
            if chars < min {
                return Err(KernelError::validation(
                    at,
                    format!("string shorter than minLength {min}"),
                ));
            }
        }
        if let Some(max) = self.max_length {
            if chars > max {
                return Err(KernelError::validation(
                    at,
                    format!("string longer than maxLength {max}"),
                ));
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(s) {
                return Err(KernelError::validation(
                    at,
                    format!("string does not match pattern `{pattern}`"),
                ));
            }
        }
        Ok(())
    }

    fn validate_number(&self, n: f64, at: &str) -> Result<()> {
        if let Some(min) = self.minimum {
            if n < min {
                return Err(KernelError::validation(at, format!("{n} below minimum {min}")));
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                return Err(KernelError::validation(at, format!("{n} above maximum {max}")));
            }
        }
        if let Some(min) = self.exclusive_minimum {
            if n <= min {
                return Err(KernelError::validation(
                    at,
                    format!("{n} not above exclusiveMinimum {min}"),
                ));
            }
        }
        if let Some(max) = self.exclusive_maximum {
            if n >= max {
                return Err(KernelError::validation(
                    at,
                    format!("{n} not below exclusiveMaximum {max}"),
                ));
            }
        }
        Ok(())
    }

    fn validate_array(&self, items: &[Value], at: &str) -> Result<()> {
        if let Some(min) = self.min_items {
            if items.len() < min {
                return Err(KernelError::validation(
                    at,
                    format!("array shorter than minItems {min}"),
                ));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                return Err(KernelError::validation(
                    at,
                    format!("array longer than maxItems {max}"),
                ));
            }
        }
        if self.unique_items {
            for (i, a) in items.iter().enumerate() {
                if items[i + 1..].contains(a) {
                    return Err(KernelError::validation(at, "array items are not unique"));
                }
            }
        }
        if let Some(item_schema) = &self.items {
            for (i, item) in items.iter().enumerate() {
                item_schema.validate(item, &format!("{at}.{i}"))?;
            }
        }
        Ok(())
    }

    fn validate_object(&self, value: &Value, at: &str) -> Result<()> {
        let map = match value.as_object() {
            Some(map) => map,
            None => return Ok(()),
        };
        for name in &self.required {
            if !map.contains_key(name.as_str()) {
                return Err(KernelError::validation(
                    at,
                    format!("missing required key `{name}`"),
                ));
            }
        }
        for (name, sub) in &self.properties {
            if let Some(child) = map.get(name.as_str()) {
                sub.validate(child, &format!("{at}.{name}"))?;
            }
        }
        Ok(())
    }
}

fn bad_decl(reason: impl Into<String>) -> KernelError {
    KernelError::validation("", format!("invalid schema: {}", reason.into()))
}

fn usize_field(value: &Value, key: &str) -> Result<usize> {
    let n = value
        .as_f64()
        .ok_or_else(|| bad_decl(format!("{key} must be a number")))?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(bad_decl(format!("{key} must be a non-negative integer")));
    }
    Ok(n as usize)
}

fn f64_field(value: &Value, key: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| bad_decl(format!("{key} must be a number")))
}
