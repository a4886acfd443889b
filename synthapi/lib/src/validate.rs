//! Validation of caller-supplied arguments against an endpoint's parameters.
//!
//! [`validate`] is a pure function: it performs no I/O and its result
//! depends only on its two inputs.

use std::collections::{BTreeMap, HashMap};

use crate::error::ValidationError;
use crate::types::{ParamType, Parameter};

/// Checks `values` against `schema`, reporting the first offending parameter.
///
/// Checks run in this order:
///
/// 1. every required parameter is present (schema order)
/// 2. every supplied key is declared (key order)
/// 3. each supplied value parses as its declared type, lies within its
///    inclusive `min`/`max` bounds and belongs to its `enum`, if any
///
/// ## Errors
///
/// Returns the [`ValidationError`] for the first failed check.
///
/// ## Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use synthapi_lib::{validate, ParamType, Parameter};
///
/// let schema = vec![
///     Parameter::new("age", ParamType::Integer).with_range(Some(0.0), Some(120.0)),
/// ];
///
/// let mut values = BTreeMap::new();
/// values.insert("age".to_string(), "150".to_string());
///
/// let err = validate(&values, &schema).unwrap_err();
/// assert_eq!(err.to_string(), "age must be <= 120");
/// ```
pub fn validate(
    values: &BTreeMap<String, String>,
    schema: &[Parameter],
) -> Result<(), ValidationError> {
    let lookup: HashMap<&str, &Parameter> =
        schema.iter().map(|p| (p.name.as_str(), p)).collect();

    if let Some(missing) = schema
        .iter()
        .find(|p| p.required && !values.contains_key(&p.name))
    {
        return Err(ValidationError::MissingRequired {
            name: missing.name.clone(),
        });
    }

    if let Some(unknown) = values.keys().find(|k| !lookup.contains_key(k.as_str())) {
        return Err(ValidationError::Unknown {
            name: unknown.clone(),
        });
    }

    for (name, value) in values {
        // Presence was checked above.
        let Some(param) = lookup.get(name.as_str()) else {
            continue;
        };
        check_value(param, value)?;
    }

    Ok(())
}

fn check_value(param: &Parameter, value: &str) -> Result<(), ValidationError> {
    let invalid_type = || ValidationError::InvalidType {
        name: param.name.clone(),
        expected: param.param_type.to_string(),
        value: value.to_string(),
    };

    let numeric = match param.param_type {
        ParamType::Number => {
            let number = value.trim().parse::<f64>().map_err(|_| invalid_type())?;
            if number.is_nan() {
                return Err(invalid_type());
            }
            Some(number)
        }
        ParamType::Integer => Some(parse_integer(value).ok_or_else(invalid_type)?),
        ParamType::Boolean => {
            if !is_boolean_literal(value) {
                return Err(invalid_type());
            }
            None
        }
        _ => None,
    };

    if let Some(number) = numeric {
        let constraints = &param.constraints;
        if let Some(min) = constraints.min
            && number < min
        {
            return Err(ValidationError::BelowMinimum {
                name: param.name.clone(),
                min,
            });
        }
        if let Some(max) = constraints.max
            && number > max
        {
            return Err(ValidationError::AboveMaximum {
                name: param.name.clone(),
                max,
            });
        }
    }

    if !param.constraints.allowed.is_empty() {
        let allowed = param.constraints.allowed_literals();
        if !allowed.iter().any(|a| a == value) {
            return Err(ValidationError::NotInEnum {
                name: param.name.clone(),
                allowed,
            });
        }
    }

    Ok(())
}

/// Integer literals are unbounded; the returned value is only used for
/// range comparison.
fn parse_integer(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix(['+', '-'])
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

fn is_boolean_literal(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "false" | "1" | "0"
    )
}
