//! Oracle 响应修复 - 业务能力层
//!
//! Oracle 按契约应该只返回一个 JSON 对象，但实际响应可能：
//! - 包在 ``` 代码围栏里（有时带 "json" 语言标签）
//! - 前后夹杂解释性文字
//! - 在字符串字段里再嵌一层 JSON 编码
//!
//! 这里把"修复"表达为一条固定顺序的具名策略链：每个策略要么成功要么
//! 失败，第一个成功者胜出，之后不再尝试。格式错误是**预期情况**而不是
//! 异常情况——本模块对任何输入都不报错，修不出来就返回 `None`，由调用
//! 方决定降级策略。

use serde_json::Value as JsonValue;
use tracing::debug;

/// 单个修复策略：输入预处理后的文本，输出解析成功的 JSON 对象
type RepairStrategy = fn(&str) -> Option<JsonValue>;

/// 修复策略链（固定顺序，第一个成功者胜出）
const REPAIR_CHAIN: &[(&str, RepairStrategy)] = &[
    ("direct", parse_direct),
    ("brace_span", parse_brace_span),
];

/// 从 Oracle 的自由文本响应中提取一个结构化 JSON 对象
///
/// 修复顺序：
/// 1. 预处理：剥掉成对的代码围栏和紧随其后的语言标签
/// 2. 整体直接解析
/// 3. 解析成功后：字符串字段若自身又是包含同名字段的 JSON 对象，解开一层
/// 4. 直接解析失败时：取第一个括号配平的子串单独解析
pub fn extract_structured(raw: &str) -> Option<JsonValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let text = strip_code_fences(trimmed);

    for (name, strategy) in REPAIR_CHAIN {
        if let Some(value) = strategy(text) {
            debug!("修复策略 '{}' 命中", name);
            return Some(unwrap_nested_fields(value));
        }
    }

    debug!("修复链耗尽，响应无法解析 (长度: {} 字符)", raw.len());
    None
}

/// 剥掉成对出现的代码围栏
///
/// 只有首尾都是围栏时才剥；紧跟开围栏的语言标签（如 "json"）一并去掉。
fn strip_code_fences(text: &str) -> &str {
    if !(text.starts_with("```") && text.ends_with("```") && text.len() > 6) {
        return text;
    }

    let inner = text.trim_matches('`').trim();

    if let Some(rest) = inner.strip_prefix("json") {
        if rest.starts_with(|c: char| c.is_whitespace() || c == '{') {
            return rest.trim_start();
        }
    }

    inner
}

/// 策略 1：整体作为一个 JSON 对象直接解析
fn parse_direct(text: &str) -> Option<JsonValue> {
    serde_json::from_str::<JsonValue>(text)
        .ok()
        .filter(JsonValue::is_object)
}

/// 策略 2：取第一个括号配平的子串单独解析
fn parse_brace_span(text: &str) -> Option<JsonValue> {
    let span = balanced_brace_span(text)?;
    serde_json::from_str::<JsonValue>(span)
        .ok()
        .filter(JsonValue::is_object)
}

/// 找到第一个括号配平的 `{...}` 子串
///
/// 扫描时跳过字符串字面量内部的括号（含转义），否则
/// `{"text": "a } b"}` 这类响应会提前配平。
fn balanced_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// 解开一层嵌套编码的字符串字段
///
/// Oracle 偶尔把 `{"feedback": "..."}` 整个再编码成 feedback 字段的
/// 字符串值。若某字符串字段自身能解析为包含同名字段的对象，取内层值。
fn unwrap_nested_fields(mut value: JsonValue) -> JsonValue {
    if let Some(map) = value.as_object_mut() {
        let keys: Vec<String> = map.keys().cloned().collect();
        for key in keys {
            let inner_value = map
                .get(&key)
                .and_then(JsonValue::as_str)
                .and_then(|s| serde_json::from_str::<JsonValue>(s).ok())
                .filter(JsonValue::is_object)
                .and_then(|inner| inner.get(&key).cloned());

            if let Some(inner_value) = inner_value {
                map.insert(key, inner_value);
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clean_json() {
        let value = extract_structured(r#"{"band": 6.5}"#).expect("应能解析");
        assert_eq!(value, json!({"band": 6.5}));
    }

    #[test]
    fn strips_fences_with_language_tag() {
        let raw = "```json\n{\"band\": 6.5}\n```";
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value, json!({"band": 6.5}));
    }

    #[test]
    fn strips_fences_without_language_tag() {
        let raw = "```\n{\"band\": 7.0}\n```";
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value, json!({"band": 7.0}));
    }

    #[test]
    fn keeps_field_starting_with_word_json() {
        // 语言标签只在紧跟围栏时剥掉，对象内容不受影响
        let raw = "```\n{\"json_schema\": 1}\n```";
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value, json!({"json_schema": 1}));
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let raw = "Here is my evaluation:\n{\"band\": 5.5, \"fluency\": 5}\nHope this helps!";
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value["band"], json!(5.5));
    }

    #[test]
    fn brace_scan_ignores_braces_inside_strings() {
        let raw = "noise {\"feedback\": \"use fewer } symbols\", \"band\": 6.0} noise";
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value["band"], json!(6.0));
    }

    #[test]
    fn unwraps_nested_encoded_field() {
        let raw = r#"{"feedback": "{\"feedback\": \"Good structure.\"}"}"#;
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value, json!({"feedback": "Good structure."}));
    }

    #[test]
    fn nested_unwrap_only_applies_to_same_field() {
        // 字符串值虽是 JSON 对象但不含同名字段时保持原样
        let raw = r#"{"feedback": "{\"other\": \"x\"}"}"#;
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value["feedback"], json!("{\"other\": \"x\"}"));
    }

    #[test]
    fn idempotent_on_clean_input() {
        let raw = "```json\n{\"band\": 6.5, \"fluency\": 6}\n```";
        let first = extract_structured(raw).expect("应能解析");
        let reserialized = serde_json::to_string(&first).expect("序列化失败");
        let second = extract_structured(&reserialized).expect("应能再次解析");
        assert_eq!(first, second);
    }

    #[test]
    fn garbage_yields_none_not_error() {
        assert_eq!(extract_structured(""), None);
        assert_eq!(extract_structured("   "), None);
        assert_eq!(extract_structured("I cannot evaluate this."), None);
        assert_eq!(extract_structured("{\"band\": "), None);
        assert_eq!(extract_structured("[1, 2, 3]"), None);
    }

    #[test]
    fn first_balanced_span_wins() {
        let raw = "{\"band\": 6.0} trailing {\"band\": 9.0}";
        let value = extract_structured(raw).expect("应能解析");
        assert_eq!(value["band"], json!(6.0));
    }
}
