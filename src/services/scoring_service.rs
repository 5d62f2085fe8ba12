//! 单元评分服务 - 业务能力层
//!
//! 两项能力：
//! 1. 单元评分：把一个评测单元（题目+答案+评分标准，可带图片）发给
//!    Oracle，返回结构完整的 ScoreRecord——永不报错，修复失败时降级
//! 2. 多任务合并：把 Task 1 / Task 2 的评分按非对称权重合并成最终 band
//!
//! 只处理单个单元 / 单次合并，不出现 Vec<EvaluationUnit>，不关心流程顺序。

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, BusinessError};
use crate::models::score::{round_to_half_band, ScoreRecord};
use crate::models::unit::EvaluationUnit;
use crate::services::llm_service::Oracle;
use crate::services::repair;

/// 答案在图片中时嵌入提示词的哨兵短语
const ANSWER_IN_IMAGE: &str = "[Answer provided in image]";

/// 单元评分服务
pub struct ScoringService {
    oracle: Arc<dyn Oracle>,
}

impl ScoringService {
    /// 创建新的评分服务
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// 评分单个评测单元
    ///
    /// 调用方永远拿到结构完整的 ScoreRecord：
    /// - Oracle 调用失败或响应修复失败 → 降级记录 + 诊断反馈
    /// - band 越界或不在 0.5 步长上 → 截断后取最近步长（平半向上取）
    ///
    /// 有附加图片时，文本指令和图片引用放在**同一次**调用里发出。
    pub async fn score_unit(&self, unit: &EvaluationUnit) -> ScoreRecord {
        let (user_message, imgs) = self.build_unit_messages(unit);

        debug!("评分单元 {}，图片: {}", unit.unit_id, imgs.is_some());

        let response = self
            .oracle
            .complete(&user_message, Some(EXAMINER_SYSTEM_MESSAGE), imgs.as_deref())
            .await;

        match response {
            Ok(raw) => self.record_from_response(&raw, &unit.unit_id),
            Err(e) => {
                warn!("单元 {} 的 Oracle 调用失败: {}", unit.unit_id, e);
                ScoreRecord::degraded(format!(
                    "score defaulted: oracle call failed for {}: {}",
                    unit.unit_id, e
                ))
            }
        }
    }

    /// 评分单段口语转写文本（联合评分降级后的逐单元路径）
    pub async fn score_transcript(&self, unit_id: &str, transcript: &str) -> ScoreRecord {
        let user_message = format!(
            "You are an IELTS Speaking examiner. Return ONLY JSON with keys: \
             fluency, coherence, lexical_resource, grammar, pronunciation, \
             feedback (object), band.\nTranscript: \"{}\"",
            transcript
        );

        debug!("逐单元评分转写文本: {}", unit_id);

        match self.oracle.complete(&user_message, None, None).await {
            Ok(raw) => self.record_from_response(&raw, unit_id),
            Err(e) => {
                warn!("单元 {} 的 Oracle 调用失败: {}", unit_id, e);
                ScoreRecord::degraded(format!(
                    "score defaulted: oracle call failed for {}: {}",
                    unit_id, e
                ))
            }
        }
    }

    /// 合并两个任务的评分为最终 band
    ///
    /// - 两个都可用：交给 Oracle 按"Task 2 约 weight 倍权重"合并，
    ///   响应照常修复 + 截断步长；响应修不出来时退回核心内的确定性
    ///   加权均值（并记录警告）
    /// - 只有一个可用：直接取它的 band，**不调用 Oracle**
    /// - 都不可用：NoValidInput，请求级错误
    ///
    /// "可用"指记录带有已验证的 band（降级记录不算）。
    pub async fn combine(
        &self,
        task1: Option<&ScoreRecord>,
        task2: Option<&ScoreRecord>,
        weight_task2: f64,
    ) -> AppResult<f64> {
        let band1 = task1.and_then(|r| r.band);
        let band2 = task2.and_then(|r| r.band);

        match (band1, band2) {
            (Some(b1), Some(b2)) => {
                let task1_json = serde_json::to_string(task1.unwrap_or(&ScoreRecord::default()))
                    .unwrap_or_default();
                let task2_json = serde_json::to_string(task2.unwrap_or(&ScoreRecord::default()))
                    .unwrap_or_default();

                let user_message = format!(
                    "You are an IELTS examiner. Combine the Task 1 and Task 2 evaluations \
                     into a single final assessment.\n\n\
                     Task 1:\n{}\n\n\
                     Task 2:\n{}\n\n\
                     Rules:\n\
                     - Task 2 is weighted more heavily than Task 1 (about {}x).\n\
                     - Final band must be between 0.0 and 9.0 (step 0.5).\n\n\
                     Return a valid JSON object in this format:\n\
                     {{\"band\": <float 0.0-9.0, step 0.5>}}\n\
                     Rules:\n\
                     - Return ONLY the JSON object\n\
                     - Do not include the word \"json\" anywhere\n\
                     - Do not include line breaks inside JSON\n\
                     - Format example: {{\"band\": 6.5}}",
                    task1_json, task2_json, weight_task2
                );

                debug!("合并两个任务的评分，Task 2 权重约 {}x", weight_task2);

                let oracle_band = match self.oracle.complete(&user_message, None, None).await {
                    Ok(raw) => repair::extract_structured(&raw)
                        .and_then(|v| v.get("band").and_then(JsonValue::as_f64)),
                    Err(e) => {
                        warn!("合并调用失败: {}", e);
                        None
                    }
                };

                match oracle_band {
                    Some(band) => Ok(round_to_half_band(band)),
                    None => {
                        // Oracle 的算术不可用时退回确定性加权均值
                        let fallback =
                            (b1 + weight_task2 * b2) / (1.0 + weight_task2);
                        warn!("合并响应不可用，退回加权均值: {}", fallback);
                        Ok(round_to_half_band(fallback))
                    }
                }
            }
            // 只有一个任务：直接取其 band，不调用 Oracle
            (Some(b1), None) => Ok(b1),
            (None, Some(b2)) => Ok(b2),
            (None, None) => Err(AppError::Business(BusinessError::NoValidInput)),
        }
    }

    /// 构建单元评分的消息
    ///
    /// 返回 (user_message, imgs)
    fn build_unit_messages(&self, unit: &EvaluationUnit) -> (String, Option<Vec<String>>) {
        let answer = unit
            .answer_text
            .as_deref()
            .unwrap_or(ANSWER_IN_IMAGE);

        let rubric_json =
            serde_json::to_string_pretty(&unit.rubric_context).unwrap_or_default();

        let user_message = format!(
            "Evaluate the following IELTS Writing {} answer.\n\
             Question: {}\n\
             Your answer: {}\n\
             Band descriptors to guide scoring: {}\n\
             Return a valid JSON object, exactly in this format:\n\
             {{\"band\": <float 0.0-9.0, step 0.5>}}\n\n\
             Rules:\n\
             - Return ONLY the JSON object\n\
             - Do not include the word \"json\" anywhere\n\
             - Do not include line breaks inside JSON\n\
             - Format example: {{\"band\": 6.5}}",
            unit.unit_id, unit.prompt_text, answer, rubric_json
        );

        let imgs = unit
            .supplementary_media
            .as_ref()
            .map(|b64| vec![format!("data:image/png;base64,{}", b64)]);

        (user_message, imgs)
    }

    /// 把 Oracle 的原始响应修复成分数记录
    ///
    /// 修复失败不报错：返回降级记录，诊断文本说明值被默认。
    fn record_from_response(&self, raw: &str, unit_id: &str) -> ScoreRecord {
        match repair::extract_structured(raw) {
            Some(value) => ScoreRecord::from_value(&value),
            None => {
                warn!("单元 {} 的 Oracle 响应无法修复", unit_id);
                ScoreRecord::degraded(format!(
                    "score defaulted: oracle response for {} could not be repaired into JSON",
                    unit_id
                ))
            }
        }
    }
}

/// 评分 Oracle 的系统消息
const EXAMINER_SYSTEM_MESSAGE: &str = "You are an expert IELTS examiner.";

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 固定响应的假 Oracle，记录调用次数
    struct CannedOracle {
        response: String,
        calls: AtomicUsize,
    }

    impl CannedOracle {
        fn new(response: impl Into<String>) -> Self {
            Self {
                response: response.into(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Oracle for CannedOracle {
        async fn complete(
            &self,
            _user_message: &str,
            _system_message: Option<&str>,
            _imgs: Option<&[String]>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn unit(answer: Option<&str>, media: Option<&str>) -> EvaluationUnit {
        EvaluationUnit::new(
            "task1",
            "Describe the chart.",
            answer.map(str::to_string),
            media.map(str::to_string),
            json!({"task_achievement": "..."}),
        )
    }

    #[tokio::test]
    async fn score_unit_accepts_fenced_band() {
        let oracle = Arc::new(CannedOracle::new("```json\n{\"band\": 6.5}\n```"));
        let service = ScoringService::new(oracle);

        let record = service.score_unit(&unit(Some("An answer."), None)).await;
        assert_eq!(record.band, Some(6.5));
    }

    #[tokio::test]
    async fn score_unit_clamps_out_of_range_band() {
        let oracle = Arc::new(CannedOracle::new(r#"{"band": 11.3}"#));
        let service = ScoringService::new(oracle);

        let record = service.score_unit(&unit(Some("An answer."), None)).await;
        assert_eq!(record.band, Some(9.0));
    }

    #[tokio::test]
    async fn score_unit_degrades_on_unrepairable_response() {
        let oracle = Arc::new(CannedOracle::new("I refuse to answer in JSON."));
        let service = ScoringService::new(oracle);

        let record = service.score_unit(&unit(Some("An answer."), None)).await;
        assert!(record.is_degraded());
        assert!(record.feedback["error"].contains("defaulted"));
    }

    #[tokio::test]
    async fn combine_bypasses_oracle_for_single_task() {
        let oracle = Arc::new(CannedOracle::new(r#"{"band": 1.0}"#));
        let service = ScoringService::new(oracle.clone());

        let task2 = ScoreRecord::from_value(&json!({"band": 7.5}));
        let band = service
            .combine(None, Some(&task2), 2.0)
            .await
            .expect("单任务合并不应失败");

        assert_eq!(band, 7.5);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0, "不应调用 Oracle");
    }

    #[tokio::test]
    async fn combine_with_no_usable_input_is_an_error() {
        let oracle = Arc::new(CannedOracle::new(r#"{"band": 5.0}"#));
        let service = ScoringService::new(oracle);

        let degraded = ScoreRecord::degraded("修复失败");
        let err = service
            .combine(Some(&degraded), None, 2.0)
            .await
            .expect_err("没有可用输入时应报错");
        assert!(matches!(
            err,
            AppError::Business(BusinessError::NoValidInput)
        ));
    }

    #[tokio::test]
    async fn combine_uses_oracle_band_when_both_present() {
        let oracle = Arc::new(CannedOracle::new(r#"{"band": 6.5}"#));
        let service = ScoringService::new(oracle.clone());

        let task1 = ScoreRecord::from_value(&json!({"band": 6.0}));
        let task2 = ScoreRecord::from_value(&json!({"band": 7.0}));
        let band = service
            .combine(Some(&task1), Some(&task2), 2.0)
            .await
            .expect("合并不应失败");

        assert_eq!(band, 6.5);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn combine_falls_back_to_weighted_mean_on_malformed_response() {
        let oracle = Arc::new(CannedOracle::new("not json at all"));
        let service = ScoringService::new(oracle);

        let task1 = ScoreRecord::from_value(&json!({"band": 6.0}));
        let task2 = ScoreRecord::from_value(&json!({"band": 7.5}));
        let band = service
            .combine(Some(&task1), Some(&task2), 2.0)
            .await
            .expect("合并不应失败");

        // (6.0 + 2*7.5) / 3 = 7.0
        assert_eq!(band, 7.0);
    }

    #[tokio::test]
    async fn media_only_unit_uses_sentinel_answer() {
        let oracle = Arc::new(CannedOracle::new(r#"{"band": 6.0}"#));
        let service = ScoringService::new(oracle);
        let unit = unit(None, Some("aGVsbG8="));

        let (message, imgs) = service.build_unit_messages(&unit);
        assert!(message.contains(ANSWER_IN_IMAGE));
        let imgs = imgs.expect("应携带图片");
        assert!(imgs[0].starts_with("data:image/png;base64,"));
    }
}
