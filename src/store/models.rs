use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 日記の主要感情ラベル。ストア上の正準値は韓国語表記。
///
/// 過去のペイロードには英語表記が混在するため、`parse`は両方を受け付ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) enum EmotionLabel {
    #[serde(rename = "긍정", alias = "positive")]
    Positive,
    #[serde(rename = "부정", alias = "negative")]
    Negative,
    #[serde(rename = "중립", alias = "neutral")]
    Neutral,
}

impl EmotionLabel {
    #[must_use]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Positive => "긍정",
            EmotionLabel::Negative => "부정",
            EmotionLabel::Neutral => "중립",
        }
    }

    /// Lenient parse accepting the Korean canonical values and their
    /// English aliases, ASCII-case-insensitively.
    #[must_use]
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        match trimmed {
            "긍정" => return Some(EmotionLabel::Positive),
            "부정" => return Some(EmotionLabel::Negative),
            "중립" => return Some(EmotionLabel::Neutral),
            _ => {}
        }
        if trimmed.eq_ignore_ascii_case("positive") {
            Some(EmotionLabel::Positive)
        } else if trimmed.eq_ignore_ascii_case("negative") {
            Some(EmotionLabel::Negative)
        } else if trimmed.eq_ignore_ascii_case("neutral") {
            Some(EmotionLabel::Neutral)
        } else {
            None
        }
    }
}

/// 通知チャネル。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum Channel {
    Push,
    Email,
    Sms,
}

impl Channel {
    pub(crate) const ALL: [Channel; 3] = [Channel::Push, Channel::Email, Channel::Sms];

    #[must_use]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Channel::Push => "PUSH",
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
        }
    }

    #[must_use]
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PUSH" => Some(Channel::Push),
            "EMAIL" => Some(Channel::Email),
            "SMS" => Some(Channel::Sms),
            _ => None,
        }
    }
}

/// 感情分析サービスから受け取る構造化レポート。
///
/// `diaries.emotion_report` にはこの形のJSONオブジェクトとして保存される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EmotionReport {
    pub(crate) main_emotion: EmotionLabel,
    pub(crate) confidence: f64,
    #[serde(default)]
    pub(crate) reason: String,
    #[serde(default)]
    pub(crate) key_phrases: Vec<String>,
}

impl EmotionReport {
    /// 抽出・検証に失敗したときのフォールバック値。
    #[must_use]
    pub(crate) fn neutral_fallback(reason: impl Into<String>) -> Self {
        Self {
            main_emotion: EmotionLabel::Neutral,
            confidence: 0.5,
            reason: reason.into(),
            key_phrases: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DiaryRecord {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) emotion_report: Option<Value>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DiaryImage {
    pub(crate) url: String,
    pub(crate) display_order: i32,
}

/// タグ・画像を先読み済みの一件分の投影。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DiaryWithChildren {
    pub(crate) diary: DiaryRecord,
    pub(crate) tags: Vec<String>,
    pub(crate) images: Vec<DiaryImage>,
}

/// 作成リクエストの正規化済み入力。
#[derive(Debug, Clone)]
pub(crate) struct NewDiary {
    pub(crate) user_id: i64,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) emotion_report: Option<Value>,
    pub(crate) tags: Vec<String>,
    pub(crate) images: Vec<String>,
}

/// スカラー項目のみの部分更新。`None` は「変更なし」。
#[derive(Debug, Clone, Default)]
pub(crate) struct DiaryPatch {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) emotion_report: Option<Value>,
}

impl DiaryPatch {
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.emotion_report.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DiaryFilter {
    pub(crate) user_id: Option<i64>,
    pub(crate) label: Option<EmotionLabel>,
    pub(crate) date_from: Option<DateTime<Utc>>,
    pub(crate) date_to: Option<DateTime<Utc>>,
    pub(crate) page: i64,
    pub(crate) page_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotificationDefinition {
    pub(crate) id: i64,
    pub(crate) weekday: i16,
    pub(crate) channel: Channel,
    pub(crate) message: String,
}

/// ユーザー毎に一行だけ保持される「現在の通知」キャッシュの読み出しビュー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotificationAssignment {
    pub(crate) user_id: i64,
    pub(crate) definition_id: i64,
    pub(crate) weekday: i16,
    pub(crate) channel: Channel,
    pub(crate) message: String,
}

/// ターゲティングに必要な最小限のユーザー情報。
///
/// ユーザー本体は認証サービス側の所有物で、ここでは読み取り専用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotificationUser {
    pub(crate) id: i64,
    pub(crate) nickname: String,
    pub(crate) channel: Channel,
    pub(crate) push_token: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) phone_number: Option<String>,
}

/// ターゲティング評価の出力一件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotificationTarget {
    pub(crate) user: NotificationUser,
    pub(crate) message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_parse_accepts_korean_and_english() {
        assert_eq!(EmotionLabel::parse("부정"), Some(EmotionLabel::Negative));
        assert_eq!(
            EmotionLabel::parse(" positive "),
            Some(EmotionLabel::Positive)
        );
        assert_eq!(EmotionLabel::parse("NEUTRAL"), Some(EmotionLabel::Neutral));
        assert_eq!(EmotionLabel::parse("행복"), None);
    }

    #[test]
    fn label_serializes_to_korean() {
        let json = serde_json::to_string(&EmotionLabel::Negative).expect("serialize");
        assert_eq!(json, "\"부정\"");
    }

    #[test]
    fn label_deserializes_english_alias() {
        let label: EmotionLabel = serde_json::from_str("\"positive\"").expect("deserialize");
        assert_eq!(label, EmotionLabel::Positive);
    }

    #[test]
    fn channel_parse_is_case_insensitive() {
        assert_eq!(Channel::parse("push"), Some(Channel::Push));
        assert_eq!(Channel::parse("EMAIL"), Some(Channel::Email));
        assert_eq!(Channel::parse("fax"), None);
    }

    #[test]
    fn report_round_trips_through_json_value() {
        let report = EmotionReport {
            main_emotion: EmotionLabel::Positive,
            confidence: 0.85,
            reason: "기쁨이 주를 이룸".to_string(),
            key_phrases: vec!["행복".to_string()],
        };
        let value = report.to_value();
        assert_eq!(value["main_emotion"], "긍정");
        let back: EmotionReport = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, report);
    }

    #[test]
    fn fallback_report_is_neutral_with_half_confidence() {
        let report = EmotionReport::neutral_fallback("parse failed");
        assert_eq!(report.main_emotion, EmotionLabel::Neutral);
        assert!((report.confidence - 0.5).abs() < f64::EPSILON);
        assert!(report.key_phrases.is_empty());
    }
}
