//! 分数聚合 - 业务能力层
//!
//! 把同一次请求的多条 ScoreRecord 按固定算术折叠成一条 AggregateRecord。
//! 纯同步计算，无外部依赖；给定相同输入必然得到相同输出，
//! 且与输入顺序无关。
//!
//! 聚合策略（沿用既有口径，见 DESIGN.md）：
//! - 某条记录缺失某个分类时按 0.0 计入均值（"无信号按下限处理"），
//!   而不是把该记录从该分类的均值中剔除
//! - 分类均值取 1 位小数（平半向上取）
//! - 总 band = 取整后分类均值的均值，再取 0.5 步长（平半向上取）

use crate::models::score::{
    round_to_half_band, round_to_one_decimal, AggregateRecord, ScoreRecord, SPEAKING_CATEGORIES,
};
use std::collections::BTreeMap;

/// 聚合多条分数记录
///
/// 空输入返回空的 AggregateRecord——这是"无可聚合"的合法终止状态，
/// 不是错误。
pub fn aggregate_records(records: &[ScoreRecord]) -> AggregateRecord {
    if records.is_empty() {
        return AggregateRecord::default();
    }

    let count = records.len() as f64;
    let mut categories = BTreeMap::new();

    for cat in SPEAKING_CATEGORIES {
        let sum: f64 = records
            .iter()
            .map(|record| record.categories.get(cat).copied().unwrap_or(0.0))
            .sum();
        categories.insert(cat.to_string(), round_to_one_decimal(sum / count));
    }

    let band_mean = categories.values().sum::<f64>() / categories.len() as f64;
    let band = Some(round_to_half_band(band_mean));

    AggregateRecord { categories, band }
}
