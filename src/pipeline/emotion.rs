/// 保存された感情レポートの正規化と集計。
///
/// `emotion_report`列にはスキーマ移行を経た3種類の形が同居している:
/// 構造化オブジェクト、同じ内容のJSON文字列、そして
/// `emotion_analysis`サブオブジェクトにラベルを持つ旧形式。
/// その曖昧さはこのモジュールの外に漏らさない。
use std::collections::BTreeMap;

use serde_json::Value;

use crate::store::models::EmotionLabel;

const LABEL_KEYS: [&str; 2] = ["main_emotion", "label"];

/// 任意の保存形から主要感情ラベルを取り出す。読めない形は`None`。
#[must_use]
pub(crate) fn main_emotion_of(payload: &Value) -> Option<EmotionLabel> {
    match payload {
        Value::String(raw) => {
            let parsed = serde_json::from_str::<Value>(raw).ok()?;
            label_of_object(&parsed)
        }
        Value::Object(_) => label_of_object(payload),
        _ => None,
    }
}

fn label_of_object(value: &Value) -> Option<EmotionLabel> {
    let object = value.as_object()?;

    for key in LABEL_KEYS {
        if let Some(label) = object
            .get(key)
            .and_then(Value::as_str)
            .and_then(EmotionLabel::parse)
        {
            return Some(label);
        }
    }

    // 旧形式: ネストされたサブオブジェクトにラベルを持つ。
    let nested = object.get("emotion_analysis")?.as_object()?;
    for key in LABEL_KEYS {
        if let Some(label) = nested
            .get(key)
            .and_then(Value::as_str)
            .and_then(EmotionLabel::parse)
        {
            return Some(label);
        }
    }
    None
}

/// ラベル毎の出現数を数える。ラベル無しの項目は数えない
/// （「不明」バケツは作らない）。
#[must_use]
pub(crate) fn count_labels(payloads: &[Option<Value>]) -> BTreeMap<EmotionLabel, i64> {
    let mut counts = BTreeMap::new();
    for payload in payloads.iter().flatten() {
        if let Some(label) = main_emotion_of(payload) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::{count_labels, main_emotion_of};
    use crate::store::models::EmotionLabel;

    #[rstest]
    #[case::structured_object(json!({"main_emotion": "부정", "confidence": 0.8}))]
    #[case::json_string(Value::String(
        "{\"main_emotion\": \"부정\", \"confidence\": 0.8}".to_string()
    ))]
    #[case::legacy_nested(json!({"emotion_analysis": {"label": "부정"}}))]
    #[case::legacy_nested_main_emotion(json!({"emotion_analysis": {"main_emotion": "부정"}}))]
    #[case::english_alias(json!({"label": "negative"}))]
    fn extracts_negative_from_every_storage_shape(#[case] payload: Value) {
        assert_eq!(main_emotion_of(&payload), Some(EmotionLabel::Negative));
    }

    #[rstest]
    #[case::bare_number(json!(42))]
    #[case::bare_array(json!(["부정"]))]
    #[case::unparseable_string(Value::String("not json".to_string()))]
    #[case::object_without_label(json!({"confidence": 0.5}))]
    #[case::unknown_label(json!({"main_emotion": "기쁨"}))]
    fn unreadable_shapes_contribute_nothing(#[case] payload: Value) {
        assert_eq!(main_emotion_of(&payload), None);
    }

    #[test]
    fn count_skips_absent_and_unparseable_entries() {
        let payloads = vec![
            Some(json!({"main_emotion": "긍정"})),
            Some(json!({"main_emotion": "부정"})),
            Some(Value::String("{\"main_emotion\": \"부정\"}".to_string())),
            Some(Value::String("broken".to_string())),
            None,
        ];
        let counts = count_labels(&payloads);
        assert_eq!(counts.get(&EmotionLabel::Positive), Some(&1));
        assert_eq!(counts.get(&EmotionLabel::Negative), Some(&2));
        assert_eq!(counts.get(&EmotionLabel::Neutral), None);
    }
}
