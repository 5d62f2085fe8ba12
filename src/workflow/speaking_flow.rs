//! 口语评测流程 - 流程层
//!
//! 核心职责：定义"一次口语提交"的完整处理流程（状态机）
//!
//! 状态流转：
//! `Created → Transcribed → Evaluated（终态）`
//!
//! 1. Created → Transcribed：所有音频单元经 SourceResolver 解析，
//!    互相独立，可并发，顺序无关紧要
//! 2. Transcribed → Evaluated：先尝试**一次**覆盖全部单元的联合
//!    Oracle 调用（按 unit_id 键入的单一结构化响应 + 聚合摘要）。
//!    联合响应格式完整则直接接受（这是优化，不是正确性要求）；
//!    格式错误、缺失、或只有聚合形状没有逐单元明细时，立即降级为
//!    逐单元评分再经聚合器折叠——联合调用绝不重试。

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, BusinessError};
use crate::models::score::{AggregateRecord, ScoreRecord, SPEAKING_CATEGORIES};
use crate::models::unit::{AudioSource, EvaluationUnit};
use crate::services::aggregate::aggregate_records;
use crate::services::llm_service::Oracle;
use crate::services::repair;
use crate::services::scoring_service::ScoringService;
use crate::workflow::source_resolver::SourceResolver;

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// 已创建，未转写
    Created,
    /// 转写完成
    Transcribed,
    /// 评测完成（终态）
    Evaluated,
}

/// 单次请求的流水线状态
///
/// 在请求入口创建，请求出口丢弃；由一次编排调用独占，
/// 绝不跨请求共享，不需要任何锁。
#[derive(Debug)]
pub struct PipelineState {
    pub stage: PipelineStage,
    /// 有序的评测单元
    pub units: Vec<EvaluationUnit>,
    /// unit_id → 转写文本（仅音频单元填入；失败单元为哨兵文本）
    pub transcripts: BTreeMap<String, String>,
    /// unit_id → 分数记录
    pub per_unit: BTreeMap<String, ScoreRecord>,
    /// 聚合结果（填入一次）
    pub aggregate: AggregateRecord,
}

impl PipelineState {
    fn new(units: Vec<EvaluationUnit>) -> Self {
        Self {
            stage: PipelineStage::Created,
            units,
            transcripts: BTreeMap::new(),
            per_unit: BTreeMap::new(),
            aggregate: AggregateRecord::default(),
        }
    }

    fn mark_transcribed(&mut self, transcripts: BTreeMap<String, String>) {
        self.transcripts = transcripts;
        self.stage = PipelineStage::Transcribed;
    }

    fn mark_evaluated(
        &mut self,
        per_unit: BTreeMap<String, ScoreRecord>,
        aggregate: AggregateRecord,
    ) {
        self.per_unit = per_unit;
        self.aggregate = aggregate;
        self.stage = PipelineStage::Evaluated;
    }
}

/// 口语评测流程
///
/// - 编排完整的状态机流转
/// - 不持有请求状态（PipelineState 按请求创建）
/// - 只依赖业务能力（resolver / scoring / oracle）
pub struct SpeakingFlow {
    resolver: SourceResolver,
    scoring: ScoringService,
    oracle: Arc<dyn Oracle>,
}

impl SpeakingFlow {
    /// 创建新的口语评测流程
    pub fn new(resolver: SourceResolver, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            resolver,
            scoring: ScoringService::new(oracle.clone()),
            oracle,
        }
    }

    /// 运行完整流程，返回终态的流水线状态
    ///
    /// `responses` 是有序的 (unit_id, 音频来源) 序列。
    pub async fn run(&self, responses: &[(String, AudioSource)]) -> AppResult<PipelineState> {
        let units = responses
            .iter()
            .map(|(unit_id, _)| {
                EvaluationUnit::new(unit_id.clone(), unit_id.clone(), None, None, JsonValue::Null)
            })
            .collect();
        let mut state = PipelineState::new(units);

        // ---- Created → Transcribed ----
        info!("状态流转: Created → Transcribed ({} 个单元)", responses.len());
        let transcripts = self.transcribe_all(responses).await;
        state.mark_transcribed(transcripts);

        // 空提交是合法终态，不是"缺少转写"错误；
        // 只有确有单元需要转写却一个都没产出时才报错
        if state.transcripts.is_empty() {
            if state.units.is_empty() {
                state.mark_evaluated(BTreeMap::new(), AggregateRecord::default());
                return Ok(state);
            }
            return Err(AppError::Business(BusinessError::NoTranscripts));
        }

        // ---- Transcribed → Evaluated ----
        info!("状态流转: Transcribed → Evaluated");
        let (per_unit, aggregate) = self.evaluate(&state.transcripts).await;
        state.mark_evaluated(per_unit, aggregate);

        Ok(state)
    }

    /// 并发解析全部音频单元
    ///
    /// 单元之间没有顺序依赖；失败的单元得到哨兵转写文本，
    /// 不影响兄弟单元。
    async fn transcribe_all(
        &self,
        responses: &[(String, AudioSource)],
    ) -> BTreeMap<String, String> {
        let futures = responses.iter().map(|(unit_id, source)| async move {
            let transcript = self.resolver.resolve_lossy(source).await;
            (unit_id.clone(), transcript)
        });

        join_all(futures).await.into_iter().collect()
    }

    /// 评测全部转写文本
    ///
    /// 先走联合路径；联合响应不合格则降级为逐单元路径。
    async fn evaluate(
        &self,
        transcripts: &BTreeMap<String, String>,
    ) -> (BTreeMap<String, ScoreRecord>, AggregateRecord) {
        let joint = self.try_joint_evaluation(transcripts).await;

        match joint {
            JointOutcome::Accepted { per_unit, aggregate } => {
                info!("联合评分响应格式完整，直接接受");
                (per_unit, aggregate)
            }
            JointOutcome::AggregateOnly(aggregate) => {
                // 只有聚合形状：保留聚合，但逐单元明细仍需降级补齐
                warn!("联合响应只有聚合形状，降级为逐单元评分");
                let per_unit = self.score_per_unit(transcripts).await;
                (per_unit, aggregate)
            }
            JointOutcome::Rejected => {
                warn!("联合响应缺失或格式错误，降级为逐单元评分（不重试）");
                let per_unit = self.score_per_unit(transcripts).await;
                let records: Vec<ScoreRecord> = per_unit.values().cloned().collect();
                let aggregate = aggregate_records(&records);
                (per_unit, aggregate)
            }
        }
    }

    /// 一次联合 Oracle 调用，覆盖全部单元
    async fn try_joint_evaluation(
        &self,
        transcripts: &BTreeMap<String, String>,
    ) -> JointOutcome {
        let prompt = build_joint_prompt(transcripts);

        let parsed = match self.oracle.complete(&prompt, None, None).await {
            Ok(raw) => repair::extract_structured(&raw),
            Err(e) => {
                warn!("联合评分调用失败: {}", e);
                None
            }
        };

        let Some(value) = parsed else {
            return JointOutcome::Rejected;
        };

        let per_part = value.get("per_part").and_then(JsonValue::as_object);
        let aggregated = value.get("aggregated");

        if let (Some(per_part), Some(aggregated)) = (per_part, aggregated) {
            if !per_part.is_empty() {
                let per_unit = per_part
                    .iter()
                    .map(|(unit_id, obj)| (unit_id.clone(), ScoreRecord::from_value(obj)))
                    .collect();
                return JointOutcome::Accepted {
                    per_unit,
                    aggregate: AggregateRecord::from_value(aggregated),
                };
            }
        }

        // 响应自身就是聚合形状（五个分类直接在顶层）
        if SPEAKING_CATEGORIES
            .iter()
            .all(|cat| value.get(*cat).is_some())
        {
            return JointOutcome::AggregateOnly(AggregateRecord::from_value(&value));
        }

        JointOutcome::Rejected
    }

    /// 逐单元评分（联合路径的降级分支，至多走一次）
    async fn score_per_unit(
        &self,
        transcripts: &BTreeMap<String, String>,
    ) -> BTreeMap<String, ScoreRecord> {
        let mut per_unit = BTreeMap::new();
        for (unit_id, transcript) in transcripts {
            debug!("逐单元评分: {}", unit_id);
            let record = self.scoring.score_transcript(unit_id, transcript).await;
            per_unit.insert(unit_id.clone(), record);
        }
        per_unit
    }
}

/// 联合评分的三种结局
enum JointOutcome {
    /// 格式完整：逐单元明细 + 聚合摘要都齐
    Accepted {
        per_unit: BTreeMap<String, ScoreRecord>,
        aggregate: AggregateRecord,
    },
    /// 只有聚合形状，缺逐单元明细
    AggregateOnly(AggregateRecord),
    /// 缺失或格式错误
    Rejected,
}

/// 构建联合评分提示词（few-shot）
fn build_joint_prompt(transcripts: &BTreeMap<String, String>) -> String {
    let example_six = json!({
        "fluency": 6, "coherence": 6, "lexical_resource": 6,
        "grammar": 6, "pronunciation": 6,
        "feedback": {
            "fluency": "Generally fluent with occasional hesitation.",
            "coherence": "Simple connected ideas.",
            "lexical_resource": "Basic vocabulary but appropriate.",
            "grammar": "Some grammatical errors in complex sentences.",
            "pronunciation": "Mostly intelligible."
        },
        "band": 6.0
    });
    let example_seven = json!({
        "fluency": 7, "coherence": 7, "lexical_resource": 7,
        "grammar": 7, "pronunciation": 7,
        "feedback": {
            "fluency": "Mostly fluent with natural phrasing.",
            "coherence": "Ideas are well connected.",
            "lexical_resource": "Good range and collocations.",
            "grammar": "Accurate grammar overall.",
            "pronunciation": "Clear and easy to understand."
        },
        "band": 7.0
    });

    let parts_lines: Vec<String> = transcripts
        .iter()
        .map(|(unit_id, transcript)| format!("{}: \"{}\"", unit_id, transcript))
        .collect();

    format!(
        "You are an experienced IELTS Speaking examiner.\n\n\
         Evaluate the transcripts below and return EXACTLY one JSON object with keys: per_part, aggregated.\n\n\
         per_part should map each part key (e.g. part_1) to an object with scores \
         (fluency, coherence, lexical_resource, grammar, pronunciation), a 'feedback' object \
         with one-sentence feedback per category, and a 'band' number.\n\n\
         aggregated should contain averaged numeric scores and band. Band must be rounded to nearest 0.5.\n\n\
         Return ONLY the JSON object (no extra text).\n\n\
         FEW-SHOT EXAMPLES:\n\n\
         Transcript: \"I live in a small town. I like to read books and sometimes go cycling.\"\n\
         OutputJSON:\n{}\n\n\
         ---\n\n\
         Transcript: \"Travel broadened my horizons; I learned new cultures and realized how people live differently.\"\n\
         OutputJSON:\n{}\n\n\
         ---\n\n\
         Now evaluate these transcripts. Return ONLY a single JSON object.\n\n\
         Transcripts:\n{}\n\n\
         Instructions: Scores must be integers 0-9. Band = average of five categories rounded to \
         nearest 0.5. Feedback sentences should be short.",
        example_six, example_seven,
        parts_lines.join("\n")
    )
}

/// 格式化终态输出
///
/// 把各单元同一分类的反馈拼成一句，外加聚合分数。
pub fn format_output(test_id: &str, user_id: &str, state: &PipelineState) -> JsonValue {
    let mut feedback_out = BTreeMap::new();
    for cat in SPEAKING_CATEGORIES {
        let parts_texts: Vec<String> = state
            .per_unit
            .iter()
            .filter_map(|(unit_id, record)| {
                record
                    .feedback
                    .get(cat)
                    .map(|text| format!("{}: {}", unit_id, text))
            })
            .collect();
        feedback_out.insert(cat.to_string(), parts_texts.join(" "));
    }

    json!({
        "test_id": test_id,
        "user_id": user_id,
        "transcripts": state.transcripts,
        "score": {
            "band": state.aggregate.band,
            "fluency": state.aggregate.categories.get("fluency"),
            "coherence": state.aggregate.categories.get("coherence"),
            "lexical_resource": state.aggregate.categories.get("lexical_resource"),
            "grammar": state.aggregate.categories.get("grammar"),
            "pronunciation": state.aggregate.categories.get("pronunciation"),
        },
        "feedback": feedback_out,
        "per_unit": state.per_unit,
        "aggregated": state.aggregate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joint_prompt_lists_every_unit() {
        let mut transcripts = BTreeMap::new();
        transcripts.insert("part_1".to_string(), "I live in a city.".to_string());
        transcripts.insert("part_2".to_string(), "My favorite book is...".to_string());

        let prompt = build_joint_prompt(&transcripts);
        assert!(prompt.contains("part_1: \"I live in a city.\""));
        assert!(prompt.contains("part_2: \"My favorite book is...\""));
        assert!(prompt.contains("per_part"));
        assert!(prompt.contains("aggregated"));
    }

    #[test]
    fn format_output_merges_feedback_per_category() {
        let mut state = PipelineState::new(vec![]);
        let mut per_unit = BTreeMap::new();
        per_unit.insert(
            "part_1".to_string(),
            ScoreRecord::from_value(&json!({
                "fluency": 6, "band": 6.0,
                "feedback": {"fluency": "Some hesitation."}
            })),
        );
        per_unit.insert(
            "part_2".to_string(),
            ScoreRecord::from_value(&json!({
                "fluency": 7, "band": 7.0,
                "feedback": {"fluency": "Natural pace."}
            })),
        );
        state.mark_evaluated(per_unit, AggregateRecord::default());

        let output = format_output("t1", "u1", &state);
        let fluency_feedback = output["feedback"]["fluency"].as_str().unwrap();
        assert!(fluency_feedback.contains("part_1: Some hesitation."));
        assert!(fluency_feedback.contains("part_2: Natural pace."));
    }
}
