/// JSON Schema 2020-12定義モジュール。
///
/// 感情分析サービスとの契約をJSON Schemaで定義し、抽出したペイロードを
/// 受け入れる前に実行時検証を行う。
pub(crate) mod emotion;

use serde_json::Value;

/// スキーマ検証結果。
#[derive(Debug)]
pub(crate) struct ValidationResult {
    pub(crate) valid: bool,
    pub(crate) errors: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// JSON Schemaでデータを検証する。
pub(crate) fn validate_json(schema_json: &Value, instance: &Value) -> ValidationResult {
    match jsonschema::validator_for(schema_json) {
        Ok(schema) => {
            if schema.is_valid(instance) {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid(vec!["Validation failed".to_string()])
            }
        }
        Err(e) => ValidationResult::invalid(vec![format!("Schema compilation error: {e}")]),
    }
}
