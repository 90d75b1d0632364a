use serde_json::{Map, Value};

use super::hex_integer::{self, HexIntegerError, INVALID_HEX_MESSAGE};
use crate::error::{FieldErrors, NON_FIELD_ERRORS};
use crate::models::DEVICE_ID_OUT_OF_RANGE_MESSAGE;

pub const NAME_MAX_LENGTH: usize = 255;

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_BLANK: &str = "This field may not be blank.";
const NOT_STRING: &str = "Not a valid string.";
const NOT_INTEGER: &str = "A valid integer is required.";
const NOT_BOOLEAN: &str = "Must be a valid boolean.";

/// Writable device fields after field-level validation.
///
/// An outer `None` means the key was not supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAttrs {
    pub id: Option<i64>,
    pub name: Option<Option<String>>,
    pub registration_id: Option<String>,
    pub device_id: Option<Option<i128>>,
    pub active: Option<bool>,
}

/// Run the per-field rules over a raw request body.
///
/// With `partial` set (PATCH) missing keys are left out; otherwise
/// `registration_id` is required and `active` defaults to true. All field
/// errors are collected before returning.
pub fn parse_attrs(raw: &Value, partial: bool) -> Result<DeviceAttrs, FieldErrors> {
    let Some(data) = raw.as_object() else {
        return Err(FieldErrors::single(
            NON_FIELD_ERRORS,
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                type_name(raw)
            ),
        ));
    };

    let mut errors = FieldErrors::new();
    let mut attrs = DeviceAttrs::default();

    if let Some(value) = data.get("id") {
        match parse_integer(value) {
            Ok(id) => attrs.id = Some(id),
            Err(message) => errors.add("id", message),
        }
    }

    if let Some(value) = data.get("name") {
        match parse_name(value) {
            Ok(name) => attrs.name = Some(name),
            Err(message) => errors.add("name", message),
        }
    }

    match parse_registration_id(data, partial) {
        Ok(registration_id) => attrs.registration_id = registration_id,
        Err(message) => errors.add("registration_id", message),
    }

    if let Some(value) = data.get("device_id") {
        match hex_integer::decode(value) {
            Ok(device_id) => attrs.device_id = Some(device_id),
            Err(HexIntegerError::InvalidFormat) => errors.add("device_id", INVALID_HEX_MESSAGE),
            Err(HexIntegerError::TooLarge) => {
                errors.add("device_id", DEVICE_ID_OUT_OF_RANGE_MESSAGE)
            }
        }
    }

    match data.get("active") {
        Some(value) => match parse_boolean(value) {
            Ok(active) => attrs.active = Some(active),
            Err(message) => errors.add("active", message),
        },
        None if !partial => attrs.active = Some(true),
        None => {}
    }

    if errors.is_empty() {
        Ok(attrs)
    } else {
        Err(errors)
    }
}

fn parse_registration_id(
    data: &Map<String, Value>,
    partial: bool,
) -> Result<Option<String>, &'static str> {
    match data.get("registration_id") {
        None if partial => Ok(None),
        None => Err(REQUIRED),
        Some(value) => {
            let text = parse_string(value)?.ok_or(NOT_NULL)?;
            if text.is_empty() {
                return Err(NOT_BLANK);
            }
            Ok(Some(text))
        }
    }
}

fn parse_name(value: &Value) -> Result<Option<String>, String> {
    let name = parse_string(value).map_err(str::to_string)?;
    if let Some(name) = &name {
        if name.chars().count() > NAME_MAX_LENGTH {
            return Err(format!(
                "Ensure this field has no more than {} characters.",
                NAME_MAX_LENGTH
            ));
        }
    }
    Ok(name)
}

/// Strings are trimmed; numbers are accepted in their textual form.
fn parse_string(value: &Value) -> Result<Option<String>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.trim().to_string())),
        Value::Number(number) => Ok(Some(number.to_string())),
        _ => Err(NOT_STRING),
    }
}

fn parse_integer(value: &Value) -> Result<i64, &'static str> {
    match value {
        Value::Null => Err(NOT_NULL),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or(NOT_INTEGER),
        Value::String(text) => text.trim().parse().map_err(|_| NOT_INTEGER),
        _ => Err(NOT_INTEGER),
    }
}

fn parse_boolean(value: &Value) -> Result<bool, &'static str> {
    match value {
        Value::Null => Err(NOT_NULL),
        Value::Bool(flag) => Ok(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(NOT_BOOLEAN),
        },
        Value::String(text) => match text.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
            _ => Err(NOT_BOOLEAN),
        },
        _ => Err(NOT_BOOLEAN),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
