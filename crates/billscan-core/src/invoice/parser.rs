//! Parsing of generative-model responses into record fields.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::record::{Category, RecordFields, NOT_AVAILABLE};

use super::rules::patterns::{CODE_FENCE, JSON_OBJECT};

/// Parse a model response into record fields.
///
/// Tolerates markdown code fences and prose around the JSON object. Any
/// failure yields the degraded record instead of an error.
pub fn parse_entities(response: &str, extracted_text: &str) -> RecordFields {
    match try_parse_entities(response, extracted_text) {
        Some(fields) => fields,
        None => {
            warn!(
                response_len = response.len(),
                "Could not parse extraction response, using degraded record"
            );
            debug!("Unparseable response: {}", response);
            RecordFields::degraded(extracted_text)
        }
    }
}

fn try_parse_entities(response: &str, extracted_text: &str) -> Option<RecordFields> {
    let payload = strip_code_fence(response.trim());
    let json = JSON_OBJECT.find(payload)?.as_str();
    let object: Map<String, Value> = serde_json::from_str(json).ok()?;

    Some(RecordFields {
        store_name: text_field(&object, "store_name"),
        date: text_field(&object, "date"),
        bill_no: text_field(&object, "bill_no"),
        total_amount: amount_field(&object, "total_amount"),
        category: object
            .get("category")
            .and_then(Value::as_str)
            .map(Category::from_label)
            .unwrap_or_default(),
        gstin: text_field(&object, "gstin"),
        extracted_text: extracted_text.to_string(),
    })
}

/// Return the content of the first fenced block, or the input unchanged.
fn strip_code_fence(s: &str) -> &str {
    CODE_FENCE
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(s)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(scalar_to_string)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn amount_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(scalar_to_string)
        .unwrap_or_else(|| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_json() {
        let response = r#"{"store_name": "Cafe Mocha", "date": "05/03/2024", "bill_no": "B-17",
            "total_amount": "250.00", "category": "Food", "gstin": "27AAPFU0939F1ZV"}"#;

        let fields = parse_entities(response, "raw text");

        assert_eq!(
            fields,
            RecordFields {
                store_name: "Cafe Mocha".to_string(),
                date: "05/03/2024".to_string(),
                bill_no: "B-17".to_string(),
                total_amount: "250.00".to_string(),
                category: Category::Food,
                gstin: "27AAPFU0939F1ZV".to_string(),
                extracted_text: "raw text".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = "```json\n{\"store_name\": \"Metro\", \"total_amount\": 99.5}\n```";
        let fields = parse_entities(response, "t");
        assert_eq!(fields.store_name, "Metro");
        assert_eq!(fields.total_amount, "99.5");
        assert_eq!(fields.date, NOT_AVAILABLE);
        assert_eq!(fields.category, Category::Others);
    }

    #[test]
    fn test_parse_json_with_surrounding_prose() {
        let response = "Here is the data:\n{\"bill_no\": 42, \"category\": \"travel\"}\nThanks!";
        let fields = parse_entities(response, "t");
        assert_eq!(fields.bill_no, "42");
        assert_eq!(fields.category, Category::Travel);
    }

    #[test]
    fn test_null_and_empty_values_become_placeholders() {
        let response = r#"{"store_name": null, "date": "  ", "total_amount": null, "gstin": ""}"#;
        let fields = parse_entities(response, "t");
        assert_eq!(fields.store_name, NOT_AVAILABLE);
        assert_eq!(fields.date, NOT_AVAILABLE);
        assert_eq!(fields.total_amount, "0");
        assert_eq!(fields.gstin, NOT_AVAILABLE);
    }

    #[test]
    fn test_malformed_response_degrades() {
        assert_eq!(
            parse_entities("I could not read this invoice.", "raw"),
            RecordFields::degraded("raw")
        );
        assert_eq!(
            parse_entities("{\"store_name\": \"Unclosed", "raw"),
            RecordFields::degraded("raw")
        );
        assert_eq!(parse_entities("[1, 2]", "raw"), RecordFields::degraded("raw"));
    }
}
