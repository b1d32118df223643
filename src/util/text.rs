/// リスト入力の正規化ユーティリティ。
///
/// タグ名・画像URLの双方で同じ規則を使う:
/// trim、空要素の除去、初出順を保った大文字小文字区別の重複排除。
use std::collections::HashSet;

#[must_use]
pub(crate) fn unique_nonempty_trimmed(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    out
}
