//! 反馈生成服务 - 业务能力层
//!
//! 两项能力：考官风格的整体反馈、可执行的改进建议。
//! 都是单次 Oracle 调用 + 响应修复；修复失败时用原始文本兜底，
//! 绝不向调用方报错。

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::services::llm_service::Oracle;
use crate::services::repair;

/// 反馈生成服务
pub struct FeedbackService {
    oracle: Arc<dyn Oracle>,
}

impl FeedbackService {
    /// 创建新的反馈服务
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// 生成考官风格的整体反馈
    ///
    /// 修复失败时直接把原始响应文本当作反馈返回（原始文本也为空时
    /// 给固定的失败说明）。
    pub async fn generate_feedback(&self, question: &str, answer: &str, band: f64) -> String {
        let user_message = format!(
            "You are an experienced IELTS examiner. Your task is to provide \
             examiner-style feedback directly to the student in an interactive way (use \"you\").\n\
             The feedback must cover Task 1, Task 2, and an overall comment, referring to the band score.\n\n\
             Question: {}\n\
             Answer: {}\n\
             Band Score: {}\n\n\
             Rules:\n\
             - Feedback must be clear, concise, and examiner-style.\n\
             - Focus on strengths and weaknesses across BOTH tasks.\n\
             - Mention how the band score reflects performance.\n\
             - Write feedback as a single plain text string (no JSON inside).\n\
             - Do not include Markdown formatting, code fences, or the word \"json\".\n\
             - Return ONLY valid JSON in this exact format:\n\n\
             {{\"feedback\": \"Your examiner-style feedback here as one plain string\"}}",
            question, answer, band
        );

        debug!("生成整体反馈，band: {}", band);

        let raw = match self.oracle.complete(&user_message, None, None).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("反馈生成调用失败: {}", e);
                return "Unable to generate feedback.".to_string();
            }
        };

        // 修复链会顺便解开 feedback 字段的一层嵌套编码
        match repair::extract_structured(&raw)
            .and_then(|v| v.get("feedback").and_then(JsonValue::as_str).map(str::to_string))
        {
            Some(feedback) => feedback,
            None => {
                warn!("反馈响应无法修复，使用原始文本兜底");
                let fallback = raw.trim().to_string();
                if fallback.is_empty() {
                    "Unable to generate feedback.".to_string()
                } else {
                    fallback
                }
            }
        }
    }

    /// 生成改进建议列表
    ///
    /// 修复失败时返回单元素列表（原始文本或固定说明）。
    pub async fn generate_improvements(
        &self,
        question: &str,
        answer: &str,
        feedback: &str,
    ) -> Vec<String> {
        let user_message = format!(
            "You are an IELTS writing examiner. Suggest specific and practical improvements \
             the student can make to reach a higher band.\n\n\
             Question: {}\n\
             Answer: {}\n\
             Examiner Feedback: {}\n\n\
             Rules:\n\
             - Address the student directly using \"you\" (e.g., \"You should…\")\n\
             - Improvements must be practical and specific.\n\
             - Give at least 3-5 concrete improvements.\n\
             - Cover areas like task response, coherence, vocabulary, and grammar.\n\
             - Keep each suggestion short (1 sentence max).\n\
             - Return ONLY a JSON object.\n\
             - Do not include Markdown formatting, code fences, or the word \"json\".\n\
             - JSON format must be:\n\
             {{\"improvements\": [\"<improvement 1>\", \"<improvement 2>\", \"<improvement 3>\"]}}",
            question, answer, feedback
        );

        debug!("生成改进建议");

        let raw = match self.oracle.complete(&user_message, None, None).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("改进建议调用失败: {}", e);
                return vec!["No improvements generated".to_string()];
            }
        };

        let improvements = repair::extract_structured(&raw).and_then(|v| {
            v.get("improvements").and_then(JsonValue::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
        });

        match improvements {
            Some(list) if !list.is_empty() => list,
            _ => {
                warn!("改进建议响应无法修复，使用原始文本兜底");
                let fallback = raw.trim().to_string();
                if fallback.is_empty() {
                    vec!["No improvements generated".to_string()]
                } else {
                    vec![fallback]
                }
            }
        }
    }
}
