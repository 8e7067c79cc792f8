//! Strict comparison of a submitted query result against a question's expected rows.
//!
//! Rows are compared by position: row `i` of the actual result must equal row `i`
//! of the expected result. Two results holding the same rows in a different order
//! do not match, so questions whose answer has several rows need an `ORDER BY`.
//!
//! Values are compared by type and value. `1` and `1.0` differ, as do `1` and `"1"`.

use serde_json::Value;

use crate::models::query::ActualResult;
use crate::models::Row;

pub const VALIDATION_PASSED: &str = "Validation passed";

/// Returns true only for a row result that matches `expected` exactly.
/// Absent results and executor errors fail closed.
pub fn validate(actual: Option<&ActualResult>, expected: &[Row]) -> bool {
    match actual.and_then(ActualResult::as_rows) {
        Some(rows) => rows_match(rows, expected),
        None => false,
    }
}

pub fn rows_match(actual: &[Row], expected: &[Row]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(actual_row, expected_row)| row_matches(actual_row, expected_row))
}

fn row_matches(actual: &Row, expected: &Row) -> bool {
    actual.len() == expected.len()
        && expected
            .iter()
            .all(|(column, value)| actual.get(column) == Some(value))
}

/// Human-readable description of the first point where `actual` diverges from
/// `expected`. Advisory only: `validate` alone decides pass or fail.
pub fn diagnose(actual: Option<&ActualResult>, expected: &[Row]) -> String {
    let rows = match actual {
        None => return "No result returned".to_string(),
        Some(ActualResult::Error(message)) => return message.clone(),
        Some(ActualResult::Rows(rows)) => rows,
    };

    if rows.len() != expected.len() {
        return format!(
            "Expected {} row(s), got {} row(s)",
            expected.len(),
            rows.len()
        );
    }

    for (index, (actual_row, expected_row)) in rows.iter().zip(expected).enumerate() {
        if let Some(problem) = describe_row_mismatch(actual_row, expected_row) {
            return if index == 0 {
                problem
            } else {
                format!("Row {}: {}", index + 1, problem)
            };
        }
    }

    VALIDATION_PASSED.to_string()
}

fn describe_row_mismatch(actual: &Row, expected: &Row) -> Option<String> {
    if actual.len() != expected.len() {
        return Some(format!(
            "Expected {} column(s) [{}], got {} column(s) [{}]",
            expected.len(),
            join_columns(expected),
            actual.len(),
            join_columns(actual)
        ));
    }

    for (column, expected_value) in expected {
        let Some(actual_value) = actual.get(column) else {
            return Some(format!("Missing expected column: {}", column));
        };

        if actual_value != expected_value {
            let expected_text = display_scalar(expected_value);
            let actual_text = display_scalar(actual_value);
            if expected_text == actual_text {
                return Some(format!(
                    "Column '{}': expected '{}' ({}), got '{}' ({})",
                    column,
                    expected_text,
                    type_name(expected_value),
                    actual_text,
                    type_name(actual_value)
                ));
            }
            return Some(format!(
                "Column '{}': expected '{}', got '{}'",
                column, expected_text, actual_text
            ));
        }
    }

    None
}

fn join_columns(row: &Row) -> String {
    row.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "real",
        Value::Number(_) => "integer",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    fn actual(value: Value) -> ActualResult {
        ActualResult::Rows(rows(value))
    }

    #[test]
    fn identical_rows_pass() {
        let expected = rows(json!([{"item_name": "Coconut"}]));
        let result = actual(json!([{"item_name": "Coconut"}]));

        assert!(validate(Some(&result), &expected));
        assert_eq!(diagnose(Some(&result), &expected), VALIDATION_PASSED);
    }

    #[test]
    fn empty_results_are_equal() {
        let result = ActualResult::Rows(Vec::new());
        assert!(validate(Some(&result), &[]));
        assert_eq!(diagnose(Some(&result), &[]), VALIDATION_PASSED);
    }

    #[test]
    fn reordered_rows_fail() {
        let expected = rows(json!([{"x": 1}, {"x": 2}]));
        let result = actual(json!([{"x": 2}, {"x": 1}]));

        assert!(!validate(Some(&result), &expected));
        assert_eq!(
            diagnose(Some(&result), &expected),
            "Column 'x': expected '1', got '2'"
        );
    }

    #[test]
    fn column_order_inside_a_row_does_not_matter() {
        let expected = rows(json!([{"a": 1, "b": "two"}]));
        let result = actual(json!([{"b": "two", "a": 1}]));
        assert!(validate(Some(&result), &expected));
    }

    #[test]
    fn absent_and_error_results_fail_closed() {
        let expected = rows(json!([{"x": 1}]));
        assert!(!validate(None, &expected));
        assert!(!validate(None, &[]));

        let error = ActualResult::Error("Only SELECT queries are allowed".to_string());
        assert!(!validate(Some(&error), &[]));
        assert_eq!(
            diagnose(Some(&error), &expected),
            "Only SELECT queries are allowed"
        );
        assert_eq!(diagnose(None, &expected), "No result returned");
    }

    #[test]
    fn row_count_mismatch_is_reported() {
        let expected = rows(json!([{"item_name": "Coconut"}]));
        let result = actual(json!([{"item_name": "Coconut"}, {"item_name": "Banana"}]));

        assert!(!validate(Some(&result), &expected));
        assert_eq!(
            diagnose(Some(&result), &expected),
            "Expected 1 row(s), got 2 row(s)"
        );
    }

    #[test]
    fn extra_column_fails_even_when_expected_columns_match() {
        let expected = rows(json!([{"item_name": "Coconut"}]));
        let result = actual(json!([{"item_name": "Coconut", "id": 1}]));

        assert!(!validate(Some(&result), &expected));
        assert_eq!(
            diagnose(Some(&result), &expected),
            "Expected 1 column(s) [item_name], got 2 column(s) [item_name, id]"
        );
    }

    #[test]
    fn renamed_column_reports_missing_column() {
        let expected = rows(json!([{"item_name": "Coconut"}]));
        let result = actual(json!([{"name": "Coconut"}]));

        assert!(!validate(Some(&result), &expected));
        assert_eq!(
            diagnose(Some(&result), &expected),
            "Missing expected column: item_name"
        );
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let expected = rows(json!([{"item_name": "Coconut"}]));
        let result = actual(json!([{"item_name": "coconut"}]));

        assert!(!validate(Some(&result), &expected));
        assert_eq!(
            diagnose(Some(&result), &expected),
            "Column 'item_name': expected 'Coconut', got 'coconut'"
        );
    }

    #[test]
    fn comparison_is_type_strict() {
        let expected = rows(json!([{"count": 2}]));

        let as_text = actual(json!([{"count": "2"}]));
        assert!(!validate(Some(&as_text), &expected));
        assert_eq!(
            diagnose(Some(&as_text), &expected),
            "Column 'count': expected '2' (integer), got '2' (text)"
        );

        let as_real = actual(json!([{"count": 2.0}]));
        assert!(!validate(Some(&as_real), &expected));
    }

    #[test]
    fn null_matches_only_null() {
        let expected = rows(json!([{"location_used": null}]));
        assert!(validate(
            Some(&actual(json!([{"location_used": null}]))),
            &expected
        ));
        assert!(!validate(
            Some(&actual(json!([{"location_used": "altar"}]))),
            &expected
        ));
    }

    #[test]
    fn divergence_past_first_row_names_the_row() {
        let expected = rows(json!([
            {"department": "Engineering", "count": 2},
            {"department": "HR", "count": 1},
        ]));
        let result = actual(json!([
            {"department": "Engineering", "count": 2},
            {"department": "HR", "count": 3},
        ]));

        assert!(!validate(Some(&result), &expected));
        assert_eq!(
            diagnose(Some(&result), &expected),
            "Row 2: Column 'count': expected '1', got '3'"
        );
    }
}
