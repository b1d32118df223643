/// 緩い形式のレスポンス本文からJSONオブジェクトを取り出すユーティリティ。
///
/// 分類サービスはmarkdownのコードフェンスや説明文の中にJSONを
/// 埋め込んで返すことがあるため、最初に現れた整形式のオブジェクトを
/// 波括弧の対応を追って抽出する。
use serde_json::Value;

/// テキスト中の最初の整形式JSONオブジェクトを返す。
///
/// 本文全体が一つのオブジェクトならそのままパースする。そうでなければ
/// `{`の出現位置ごとに、文字列リテラルとエスケープを考慮しつつ対応する
/// `}`までを切り出してパースを試みる。見つからなければ`None`。
#[must_use]
pub(crate) fn extract_first_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let bytes = trimmed.as_bytes();
    let mut start = None;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(index);
                }
                depth += 1;
            }
            b'}' => {
                if let Some(open) = start {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &trimmed[open..=index];
                        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                            if value.is_object() {
                                return Some(value);
                            }
                        }
                        // Malformed candidate: resume scanning after it.
                        start = None;
                    }
                }
            }
            _ => {}
        }
    }

    None
}
