//! Builds the request `parameters` object from `--params` and `--param`.

use serde_json::{Map, Value};

use crate::AppError;

/// Merges the JSON object from `--params` with each `--param KEY=VALUE`.
///
/// Individual parameters are applied after the object, so they win on
/// conflicts. A value that parses as JSON is sent as that JSON value;
/// anything else is sent as a string.
pub(crate) fn build_parameters(params: Option<&str>, pairs: &[String]) -> Result<Value, AppError> {
    let mut object = params.map_or_else(|| Ok(Map::new()), parse_object)?;
    for pair in pairs {
        let (key, value) = parse_pair(pair)?;
        object.insert(key, value);
    }
    Ok(Value::Object(object))
}

fn parse_object(text: &str) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(AppError::InvalidParams(format!(
            "expected an object, got {}",
            kind_of(&other)
        ))),
        Err(error) => Err(AppError::InvalidParams(error.to_string())),
    }
}

fn parse_pair(pair: &str) -> Result<(String, Value), AppError> {
    let Some((raw_key, raw_value)) = pair.split_once('=') else {
        return Err(AppError::InvalidParam(pair.to_owned()));
    };
    let key = raw_key.trim();
    if key.is_empty() {
        return Err(AppError::InvalidParam(pair.to_owned()));
    }
    let value =
        serde_json::from_str(raw_value).unwrap_or_else(|_| Value::String(raw_value.to_owned()));
    Ok((key.to_owned(), value))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
