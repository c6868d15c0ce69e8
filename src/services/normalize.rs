// Result normalization: backend cell values to JSON-safe structures.
//
// Temporal values render as ISO-8601 text. Fixed-point decimals become
// floats, trading precision for a uniform numeric type in the payload.
use crate::services::database::backend::CellValue;
use serde_json::{Map, Number, Value};

pub fn normalize_cell(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Int(i) => Value::Number(Number::from(*i)),
        CellValue::UInt(u) => Value::Number(Number::from(*u)),
        CellValue::Float(f) => float_value(*f),
        CellValue::Decimal(text) => match text.parse::<f64>() {
            Ok(f) => float_value(f),
            // Unparseable decimals keep their textual form.
            Err(_) => Value::String(text.clone()),
        },
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        CellValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        CellValue::List(items) => Value::Array(items.iter().map(normalize_cell).collect()),
        CellValue::Map(fields) => Value::Object(normalize_mapping(fields)),
    }
}

pub fn normalize_mapping(fields: &[(String, CellValue)]) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, cell)| (name.clone(), normalize_cell(cell)))
        .collect()
}

pub fn normalize_tuple(cells: &[CellValue]) -> Vec<Value> {
    cells.iter().map(normalize_cell).collect()
}

// NaN and infinities have no JSON rendering; they degrade to null.
fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    #[test]
    fn test_decimal_and_date_row() {
        let fields = vec![
            (
                "amount".to_string(),
                CellValue::Decimal("12.50".to_string()),
            ),
            (
                "day".to_string(),
                CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ),
        ];

        let normalized = normalize_mapping(&fields);
        assert_eq!(normalized["amount"], json!(12.5));
        assert_eq!(normalized["day"], json!("2024-01-01"));
    }

    #[test]
    fn test_datetime_renders_iso8601() {
        let dt: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 5)
            .unwrap();
        assert_eq!(
            normalize_cell(&CellValue::DateTime(dt)),
            json!("2024-03-15T10:30:05")
        );
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(normalize_cell(&CellValue::Null), Value::Null);
    }

    #[test]
    fn test_nested_structures_recurse() {
        let cell = CellValue::List(vec![
            CellValue::Map(vec![(
                "inner".to_string(),
                CellValue::Decimal("1.5".to_string()),
            )]),
            CellValue::Int(2),
        ]);

        assert_eq!(normalize_cell(&cell), json!([{"inner": 1.5}, 2]));
    }

    #[test]
    fn test_already_normalized_text_is_untouched() {
        // A pre-rendered ISO date string must survive another pass intact.
        let cell = CellValue::Text("2024-01-01".to_string());
        let once = normalize_cell(&cell);
        assert_eq!(once, json!("2024-01-01"));
    }

    #[test]
    fn test_unparseable_decimal_stays_text() {
        assert_eq!(
            normalize_cell(&CellValue::Decimal("12,50".to_string())),
            json!("12,50")
        );
    }

    #[test]
    fn test_nan_degrades_to_null() {
        assert_eq!(normalize_cell(&CellValue::Float(f64::NAN)), Value::Null);
    }
}
