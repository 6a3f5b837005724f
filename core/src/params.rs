//! Declarative tool parameter schemas.
//!
//! Each tool declares its parameters as a slice of [`ParamSpec`]. The same
//! declaration produces the JSON Schema advertised to clients and validates
//! incoming arguments into a typed [`ToolArgs`] before any query is built.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::error::NagiosError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    /// Unsigned integer with a lower bound. Digit strings are accepted too.
    Integer { min: u64 },
    Boolean,
    /// One value out of a fixed set (matched case-insensitively).
    Enum(&'static [&'static str]),
    /// Zero or more values out of a fixed set. A bare string counts as one.
    EnumList(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Text(&'static str),
    Integer(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    pub default: Option<ParamDefault>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            default: None,
        }
    }

    pub const fn with_default(mut self, default: ParamDefault) -> Self {
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer { min } => json!({ "type": "integer", "minimum": min }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::Enum(allowed) => json!({ "type": "string", "enum": allowed }),
            ParamKind::EnumList(allowed) => json!({
                "type": "array",
                "items": { "type": "string", "enum": allowed },
                "uniqueItems": true
            }),
        };
        schema["description"] = Value::String(self.description.to_string());
        match self.default {
            Some(ParamDefault::Text(text)) => schema["default"] = json!(text),
            Some(ParamDefault::Integer(n)) => schema["default"] = json!(n),
            None => {}
        }
        schema
    }

    fn default_value(&self) -> Option<ArgValue> {
        self.default.map(|default| match default {
            ParamDefault::Text(text) => ArgValue::Text(text.to_string()),
            ParamDefault::Integer(n) => ArgValue::Integer(n),
        })
    }
}

/// JSON Schema (`inputSchema`) for a parameter list.
pub fn input_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    for param in params {
        properties.insert(param.name.to_string(), param.schema());
    }
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name)
        .collect();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Integer(u64),
    Boolean(bool),
    List(Vec<String>),
}

/// Arguments of one tool call, validated against the tool's declaration.
/// Defaults are already applied; absent optional parameters have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    values: BTreeMap<&'static str, ArgValue>,
}

impl ToolArgs {
    pub fn validate(params: &[ParamSpec], raw: &Map<String, Value>) -> Result<Self, NagiosError> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| !params.iter().any(|p| p.name == key.as_str()))
        {
            let expected: Vec<&str> = params.iter().map(|p| p.name).collect();
            let message = if expected.is_empty() {
                "unknown parameter; this tool takes no arguments".to_string()
            } else {
                format!(
                    "unknown parameter; expected one of: {}",
                    expected.join(", ")
                )
            };
            return Err(NagiosError::invalid_argument(unknown.as_str(), message));
        }

        let mut values = BTreeMap::new();
        for param in params {
            let parsed = match raw.get(param.name) {
                None | Some(Value::Null) => None,
                Some(value) => parse_value(param, value)?,
            };
            match parsed.or_else(|| param.default_value()) {
                Some(value) => {
                    values.insert(param.name, value);
                }
                None if param.required => {
                    return Err(NagiosError::invalid_argument(
                        param.name,
                        "missing required parameter",
                    ));
                }
                None => {}
            }
        }
        Ok(Self { values })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// String or enum value.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn required_text(&self, name: &str) -> Result<&str, NagiosError> {
        self.text(name)
            .ok_or_else(|| NagiosError::invalid_argument(name, "missing required parameter"))
    }

    pub fn integer(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ArgValue::List(items)) => Some(items),
            _ => None,
        }
    }
}

fn parse_value(param: &ParamSpec, value: &Value) -> Result<Option<ArgValue>, NagiosError> {
    let name = param.name;
    match param.kind {
        ParamKind::String => match value {
            Value::String(text) if text.trim().is_empty() => Ok(None),
            Value::String(text) => Ok(Some(ArgValue::Text(text.clone()))),
            _ => Err(NagiosError::invalid_argument(name, "must be a string")),
        },
        ParamKind::Integer { min } => {
            let parsed = match value {
                Value::Number(n) => n.as_u64(),
                Value::String(text) => text.trim().parse::<u64>().ok(),
                _ => None,
            };
            match parsed {
                Some(n) if n >= min => Ok(Some(ArgValue::Integer(n))),
                Some(_) => Err(NagiosError::invalid_argument(
                    name,
                    format!("must be at least {min}"),
                )),
                None => Err(NagiosError::invalid_argument(
                    name,
                    "must be a non-negative integer",
                )),
            }
        }
        ParamKind::Boolean => match value {
            Value::Bool(b) => Ok(Some(ArgValue::Boolean(*b))),
            _ => Err(NagiosError::invalid_argument(name, "must be a boolean")),
        },
        ParamKind::Enum(allowed) => match value {
            Value::String(text) if text.trim().is_empty() => Ok(None),
            Value::String(text) => canonical(allowed, text)
                .map(|v| Some(ArgValue::Text(v.to_string())))
                .ok_or_else(|| not_allowed(name, text, allowed)),
            _ => Err(NagiosError::invalid_argument(name, "must be a string")),
        },
        ParamKind::EnumList(allowed) => {
            let items: Vec<&str> = match value {
                Value::String(text) => vec![text.as_str()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str().ok_or_else(|| {
                            NagiosError::invalid_argument(name, "items must be strings")
                        })
                    })
                    .collect::<Result<_, _>>()?,
                _ => {
                    return Err(NagiosError::invalid_argument(
                        name,
                        "must be an array of strings",
                    ));
                }
            };
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for item in items.into_iter().filter(|i| !i.trim().is_empty()) {
                let value = canonical(allowed, item).ok_or_else(|| not_allowed(name, item, allowed))?;
                if !out.iter().any(|existing| existing == value) {
                    out.push(value.to_string());
                }
            }
            Ok((!out.is_empty()).then_some(ArgValue::List(out)))
        }
    }
}

fn canonical(allowed: &'static [&'static str], raw: &str) -> Option<&'static str> {
    let needle = raw.trim();
    allowed
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(needle))
}

fn not_allowed(name: &str, raw: &str, allowed: &[&str]) -> NagiosError {
    NagiosError::invalid_argument(
        name,
        format!("'{raw}' is not one of: {}", allowed.join(", ")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLORS: &[&str] = &["red", "green"];
    const PARAMS: &[ParamSpec] = &[
        ParamSpec::required("name", ParamKind::String, "Name"),
        ParamSpec::optional("limit", ParamKind::Integer { min: 1 }, "Limit")
            .with_default(ParamDefault::Integer(50)),
        ParamSpec::optional("color", ParamKind::Enum(COLORS), "Color"),
        ParamSpec::optional("colors", ParamKind::EnumList(COLORS), "Colors"),
        ParamSpec::optional("verbose", ParamKind::Boolean, "Verbose"),
    ];

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn schema_lists_required_fields_and_forbids_extras() {
        let schema = input_schema(PARAMS);
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["limit"]["default"], json!(50));
        assert_eq!(schema["properties"]["color"]["enum"], json!(["red", "green"]));
        assert_eq!(schema["properties"]["colors"]["type"], json!("array"));
    }

    #[test]
    fn schema_without_required_fields_omits_required_key() {
        let schema = input_schema(&[]);
        assert!(schema.get("required").is_none());
        assert_eq!(schema["properties"], json!({}));
    }

    #[test]
    fn defaults_are_applied_and_optionals_stay_absent() {
        let parsed = ToolArgs::validate(PARAMS, &args(json!({ "name": "srv1" }))).unwrap();
        assert_eq!(parsed.text("name"), Some("srv1"));
        assert_eq!(parsed.integer("limit"), Some(50));
        assert!(!parsed.contains("color"));
        assert!(!parsed.contains("colors"));
        assert_eq!(parsed.flag("verbose"), None);
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let err = ToolArgs::validate(PARAMS, &Map::new()).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "name"));
    }

    #[test]
    fn blank_required_string_counts_as_missing() {
        let err = ToolArgs::validate(PARAMS, &args(json!({ "name": "  " }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "name"));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let err =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "query": "hostlist" }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "query"));
    }

    #[test]
    fn enum_values_are_matched_case_insensitively_and_canonicalized() {
        let parsed = ToolArgs::validate(
            PARAMS,
            &args(json!({ "name": "a", "color": "RED", "colors": ["Green", "green", "red"] })),
        )
        .unwrap();
        assert_eq!(parsed.text("color"), Some("red"));
        assert_eq!(
            parsed.list("colors"),
            Some(&["green".to_string(), "red".to_string()][..])
        );
    }

    #[test]
    fn enum_list_accepts_bare_string() {
        let parsed =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "colors": "red" }))).unwrap();
        assert_eq!(parsed.list("colors"), Some(&["red".to_string()][..]));
    }

    #[test]
    fn enum_value_outside_the_set_is_rejected() {
        let err =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "color": "blue" }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "color"));
        let err = ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "colors": ["red", "blue"] })))
            .unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "colors"));
    }

    #[test]
    fn integers_accept_digit_strings_and_enforce_minimum() {
        let parsed =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "limit": "10" }))).unwrap();
        assert_eq!(parsed.integer("limit"), Some(10));
        let err = ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "limit": 0 }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "limit"));
        let err =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "limit": -3 }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "limit"));
    }

    #[test]
    fn wrong_json_types_are_rejected() {
        let err = ToolArgs::validate(PARAMS, &args(json!({ "name": 7 }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "name"));
        let err =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "verbose": "yes" }))).unwrap_err();
        assert!(matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "verbose"));
    }

    #[test]
    fn null_counts_as_absent() {
        let parsed =
            ToolArgs::validate(PARAMS, &args(json!({ "name": "a", "color": null }))).unwrap();
        assert!(!parsed.contains("color"));
    }
}
