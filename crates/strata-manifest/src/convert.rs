use strata_migrate::{FieldType, RecordId, Value};

/// Convert a TOML literal into a [`Value`] of the declared field type.
///
/// Integers widen to floats. `id` fields take a UUID string and `bytes`
/// fields an array of integers in `0..=255`.
pub(crate) fn to_value(literal: &toml::Value, field_type: FieldType) -> Result<Value, String> {
    let mismatch = || format!("expected {field_type}, found {}", literal.type_str());
    match (field_type, literal) {
        (FieldType::Bool, toml::Value::Boolean(b)) => Ok(Value::Bool(*b)),
        (FieldType::Int, toml::Value::Integer(i)) => Ok(Value::Int(*i)),
        (FieldType::Float, toml::Value::Float(f)) => Ok(Value::Float(*f)),
        (FieldType::Float, toml::Value::Integer(i)) => Ok(Value::Float(*i as f64)),
        (FieldType::Text, toml::Value::String(s)) => Ok(Value::Text(s.clone())),
        (FieldType::Id, toml::Value::String(s)) => s
            .parse::<RecordId>()
            .map(Value::Id)
            .map_err(|_| format!("`{s}` is not a valid record id")),
        (FieldType::Bytes, toml::Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                toml::Value::Integer(b) => u8::try_from(*b).map_err(|_| format!("byte {b} out of range")),
                other => Err(format!("expected byte, found {}", other.type_str())),
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(Value::Bytes),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_convert() {
        assert_eq!(
            to_value(&toml::Value::Boolean(true), FieldType::Bool),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            to_value(&toml::Value::Integer(3), FieldType::Float),
            Ok(Value::Float(3.0))
        );
        assert_eq!(
            to_value(&toml::Value::String("hi".into()), FieldType::Text),
            Ok(Value::Text("hi".into()))
        );
    }

    #[test]
    fn bytes_and_ids() {
        let bytes = toml::Value::Array(vec![toml::Value::Integer(1), toml::Value::Integer(255)]);
        assert_eq!(to_value(&bytes, FieldType::Bytes), Ok(Value::Bytes(vec![1, 255])));

        let too_big = toml::Value::Array(vec![toml::Value::Integer(256)]);
        assert!(to_value(&too_big, FieldType::Bytes).is_err());

        let id = RecordId::new_v4();
        assert_eq!(
            to_value(&toml::Value::String(id.to_string()), FieldType::Id),
            Ok(Value::Id(id))
        );
        assert!(to_value(&toml::Value::String("nope".into()), FieldType::Id).is_err());
    }

    #[test]
    fn mismatch_names_both_types() {
        let err = to_value(&toml::Value::String("yes".into()), FieldType::Bool).unwrap_err();
        assert_eq!(err, "expected bool, found string");
    }
}
