/// 感情分析レスポンスの契約スキーマ。
///
/// 抽出したJSONオブジェクトがこの契約を満たさない場合、クライアントは
/// 中立のフォールバックレポートに切り替える。
use once_cell::sync::Lazy;
use serde_json::{Value, json};

use super::ValidationResult;

static EMOTION_REPORT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["main_emotion", "confidence"],
        "properties": {
            "main_emotion": {
                "type": "string",
                "enum": ["긍정", "부정", "중립", "positive", "negative", "neutral"]
            },
            "confidence": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "reason": { "type": "string" },
            "key_phrases": {
                "type": "array",
                "items": { "type": "string" }
            }
        }
    })
});

pub(crate) fn validate_report(instance: &Value) -> ValidationResult {
    super::validate_json(&EMOTION_REPORT_SCHEMA, instance)
}

#[cfg(test)]
mod tests {
    use super::validate_report;
    use serde_json::json;

    #[test]
    fn accepts_canonical_report() {
        let report = json!({
            "main_emotion": "긍정",
            "confidence": 0.85,
            "reason": "기쁨과 감사가 주를 이룸",
            "key_phrases": ["즐거웠다", "행복한 하루"]
        });
        assert!(validate_report(&report).valid);
    }

    #[test]
    fn accepts_english_label_alias() {
        let report = json!({ "main_emotion": "negative", "confidence": 0.7 });
        assert!(validate_report(&report).valid);
    }

    #[test]
    fn rejects_unknown_label() {
        let report = json!({ "main_emotion": "기쁨", "confidence": 0.9 });
        assert!(!validate_report(&report).valid);
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let report = json!({ "main_emotion": "중립", "confidence": 1.5 });
        assert!(!validate_report(&report).valid);
    }

    #[test]
    fn rejects_missing_confidence() {
        let report = json!({ "main_emotion": "중립" });
        assert!(!validate_report(&report).valid);
    }
}
