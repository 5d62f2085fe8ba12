//! 分数记录与 band 算术
//!
//! band 的约束是全局不变量：落在 [0.0, 9.0]，步长 0.5。
//! Oracle 返回的越界或踩不到步长的值在接受之前先截断再四舍五入
//! （0.5 步长，平半向上取）。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// 口语评分的固定分类集合
pub const SPEAKING_CATEGORIES: [&str; 5] = [
    "fluency",
    "coherence",
    "lexical_resource",
    "grammar",
    "pronunciation",
];

/// 截断到 [0.0, 9.0] 后取最近的 0.5 步长（平半向上取）
pub fn round_to_half_band(x: f64) -> f64 {
    let clamped = x.clamp(0.0, 9.0);
    (clamped * 2.0 + 0.5).floor() / 2.0
}

/// 平半向上取到 1 位小数（用于分类均值）
pub fn round_to_one_decimal(x: f64) -> f64 {
    (x * 10.0 + 0.5).floor() / 10.0
}

/// 单个评测单元的 Oracle 评分记录
///
/// 无论 Oracle 响应修复成功与否，调用方拿到的永远是结构完整的记录；
/// 修复失败时分类与 band 为空，并带一条诊断反馈。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// 分类名 → 子分数
    pub categories: BTreeMap<String, f64>,
    /// band 分数（接受时已满足 [0.0, 9.0] 步长 0.5 的约束）
    pub band: Option<f64>,
    /// 分类名 → 短反馈
    pub feedback: BTreeMap<String, String>,
}

impl ScoreRecord {
    /// 从修复后的 JSON 对象构造分数记录
    ///
    /// - 已知分类中出现的数字字段被接收
    /// - band 在接受前截断并取 0.5 步长
    /// - feedback 接受"分类→文本"对象或单个字符串
    pub fn from_value(value: &JsonValue) -> Self {
        let mut categories = BTreeMap::new();
        for cat in SPEAKING_CATEGORIES {
            if let Some(score) = value.get(cat).and_then(JsonValue::as_f64) {
                categories.insert(cat.to_string(), score);
            }
        }

        let band = value
            .get("band")
            .and_then(JsonValue::as_f64)
            .map(round_to_half_band);

        let mut feedback = BTreeMap::new();
        match value.get("feedback") {
            Some(JsonValue::Object(map)) => {
                for (key, text) in map {
                    if let Some(text) = text.as_str() {
                        feedback.insert(key.clone(), text.to_string());
                    }
                }
            }
            Some(JsonValue::String(text)) => {
                feedback.insert("overall".to_string(), text.clone());
            }
            _ => {}
        }

        Self {
            categories,
            band,
            feedback,
        }
    }

    /// 构造降级记录：分类与 band 为空，附带诊断反馈
    ///
    /// 诊断文本必须说明值是被默认的，部分降级绝不伪装成完整成功。
    pub fn degraded(reason: impl Into<String>) -> Self {
        let mut feedback = BTreeMap::new();
        feedback.insert("error".to_string(), reason.into());
        Self {
            categories: BTreeMap::new(),
            band: None,
            feedback,
        }
    }

    /// 是否为降级记录（没有任何分数信号）
    pub fn is_degraded(&self) -> bool {
        self.categories.is_empty() && self.band.is_none()
    }
}

/// 同一次请求中多条分数记录的聚合结果
///
/// 给定相同输入必须可重算出相同结果（与输入顺序无关）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// 分类名 → 均值（1 位小数）
    pub categories: BTreeMap<String, f64>,
    /// 总 band（分类均值的均值，0.5 步长）
    pub band: Option<f64>,
}

impl AggregateRecord {
    /// 从修复后的 JSON 对象构造聚合记录（联合评分路径）
    pub fn from_value(value: &JsonValue) -> Self {
        let mut categories = BTreeMap::new();
        for cat in SPEAKING_CATEGORIES {
            if let Some(score) = value.get(cat).and_then(JsonValue::as_f64) {
                categories.insert(cat.to_string(), score);
            }
        }

        let band = value
            .get("band")
            .and_then(JsonValue::as_f64)
            .map(round_to_half_band);

        Self { categories, band }
    }

    /// 是否"无可聚合"（合法的终止状态，不是错误）
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.band.is_none()
    }
}

/// 一次提交的最终结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// 最终 band
    pub band: f64,
    /// 考官风格的整体反馈
    pub feedback: String,
    /// 改进建议
    pub improvements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn band_is_always_on_half_steps() {
        for raw in [-3.0, 0.0, 0.2, 0.25, 6.4, 6.75, 8.9, 9.0, 12.5] {
            let band = round_to_half_band(raw);
            assert!((0.0..=9.0).contains(&band), "band {} 越界", band);
            let doubled = band * 2.0;
            assert_eq!(doubled, doubled.floor(), "band {} 不在 0.5 步长上", band);
        }
    }

    #[test]
    fn band_rounding_is_half_up() {
        assert_eq!(round_to_half_band(6.25), 6.5);
        assert_eq!(round_to_half_band(6.24), 6.0);
        assert_eq!(round_to_half_band(6.75), 7.0);
        assert_eq!(round_to_half_band(9.4), 9.0);
        assert_eq!(round_to_half_band(-1.0), 0.0);
    }

    #[test]
    fn one_decimal_rounding_is_half_up() {
        assert_eq!(round_to_one_decimal(6.65), 6.7);
        assert_eq!(round_to_one_decimal(6.64), 6.6);
        assert_eq!(round_to_one_decimal(7.0), 7.0);
    }

    #[test]
    fn from_value_reads_categories_band_and_feedback() {
        let value = json!({
            "fluency": 6,
            "coherence": 7,
            "band": 6.3,
            "feedback": {"fluency": "Generally fluent."},
            "unrelated": "ignored"
        });
        let record = ScoreRecord::from_value(&value);
        assert_eq!(record.categories["fluency"], 6.0);
        assert_eq!(record.categories["coherence"], 7.0);
        assert!(!record.categories.contains_key("grammar"));
        assert_eq!(record.band, Some(6.5));
        assert_eq!(record.feedback["fluency"], "Generally fluent.");
    }

    #[test]
    fn from_value_accepts_plain_string_feedback() {
        let value = json!({"band": 7.0, "feedback": "Good structure."});
        let record = ScoreRecord::from_value(&value);
        assert_eq!(record.feedback["overall"], "Good structure.");
    }

    #[test]
    fn degraded_record_carries_diagnostic() {
        let record = ScoreRecord::degraded("Oracle响应无法修复");
        assert!(record.is_degraded());
        assert!(record.feedback["error"].contains("无法修复"));
    }
}
