//! 写作评测流程 - 流程层
//!
//! 核心职责：定义"一次写作提交"的完整处理流程
//!
//! 流程顺序：
//! 1. 校验（考试类型、任务字段完整性）
//! 2. 逐任务评分（Task 1 / Task 2，学术类 Task 1 带图表图片）
//! 3. 合并（Task 2 约 2 倍权重；只有一个任务时直通，不调用 Oracle）
//! 4. 整体反馈 + 改进建议
//!
//! 缺席的任务段落允许跳过；两个任务都不可评分时报 NoValidInput。

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, BusinessError};
use crate::models::score::{FinalResult, ScoreRecord};
use crate::models::submission::{TaskSection, WritingSubmission};
use crate::models::unit::{EvaluationUnit, TaskKind, TestVariant};
use crate::services::feedback_service::FeedbackService;
use crate::services::llm_service::Oracle;
use crate::services::rubric_service::RubricService;
use crate::services::scoring_service::ScoringService;

/// 写作评测流程
pub struct WritingFlow {
    scoring: ScoringService,
    feedback: FeedbackService,
    rubrics: RubricService,
    task2_weight: f64,
}

impl WritingFlow {
    /// 创建新的写作评测流程
    pub fn new(oracle: Arc<dyn Oracle>, rubrics: RubricService, config: &Config) -> Self {
        Self {
            scoring: ScoringService::new(oracle.clone()),
            feedback: FeedbackService::new(oracle),
            rubrics,
            task2_weight: config.task2_weight,
        }
    }

    /// 运行完整流程
    pub async fn run(&self, submission: &WritingSubmission) -> AppResult<FinalResult> {
        let variant = TestVariant::from_str(&submission.test_variant).ok_or_else(|| {
            AppError::Business(BusinessError::InvalidTestVariant {
                variant: submission.test_variant.clone(),
            })
        })?;

        validate_tasks(submission, variant)?;

        // ---- 逐任务评分 ----
        let task1_record = match submission.task1.as_ref().filter(|t| t.answer.is_some()) {
            Some(section) => Some(self.score_task(TaskKind::Task1, variant, section).await?),
            None => None,
        };

        let task2_record = match submission.task2.as_ref().filter(|t| t.answer.is_some()) {
            Some(section) => Some(self.score_task(TaskKind::Task2, variant, section).await?),
            None => None,
        };

        // ---- 合并 ----
        let band = self
            .scoring
            .combine(
                task1_record.as_ref(),
                task2_record.as_ref(),
                self.task2_weight,
            )
            .await?;

        info!("最终 band: {}", band);

        // ---- 反馈与改进建议 ----
        let (combined_question, combined_answer) = combine_texts(submission);

        let feedback = self
            .feedback
            .generate_feedback(&combined_question, &combined_answer, band)
            .await;

        let improvements = self
            .feedback
            .generate_improvements(&combined_question, &combined_answer, &feedback)
            .await;

        Ok(FinalResult {
            band,
            feedback,
            improvements,
        })
    }

    /// 评分单个任务段落
    ///
    /// 评分标准缺失是配置错误，立即向上抛出；
    /// Oracle 层面的失败由 ScoringService 降级吸收。
    async fn score_task(
        &self,
        task: TaskKind,
        variant: TestVariant,
        section: &TaskSection,
    ) -> AppResult<ScoreRecord> {
        let rubric = self.rubrics.get_rubric(task, variant)?;

        let unit = EvaluationUnit::new(
            task.key(),
            section.question.clone(),
            section.answer.clone(),
            section.image_b64.clone(),
            rubric,
        );

        let record = self.scoring.score_unit(&unit).await;
        if record.is_degraded() {
            warn!("任务 {} 的评分被降级", task);
        }
        Ok(record)
    }
}

/// 校验任务字段完整性
///
/// 段落缺席是允许的（合并器处理单任务直通）；
/// 段落存在但字段不完整则报错：
/// - 学术类 Task 1 需要答案和图表图片
/// - 培训类 Task 1 需要答案
/// - Task 2 若存在必须有答案
fn validate_tasks(submission: &WritingSubmission, variant: TestVariant) -> AppResult<()> {
    if let Some(task1) = &submission.task1 {
        if task1.answer.is_none() {
            return Err(missing_field(TaskKind::Task1, "answer"));
        }
        if variant == TestVariant::Academic && task1.image_b64.is_none() {
            return Err(missing_field(TaskKind::Task1, "image"));
        }
    }

    if let Some(task2) = &submission.task2 {
        if task2.answer.is_none() {
            return Err(missing_field(TaskKind::Task2, "answer"));
        }
    }

    Ok(())
}

fn missing_field(task: TaskKind, field: &str) -> AppError {
    AppError::Business(BusinessError::MissingTaskField {
        task: task.key().to_string(),
        field: field.to_string(),
    })
}

/// 拼接两个任务的题目与答案，供反馈生成使用
fn combine_texts(submission: &WritingSubmission) -> (String, String) {
    let mut question = String::new();
    let mut answer = String::new();

    if let Some(task1) = &submission.task1 {
        if let Some(task1_answer) = &task1.answer {
            question.push_str(&format!("Task 1 Question: {}\n", task1.question));
            answer.push_str(&format!("Task 1 Answer: {}\n\n", task1_answer));
        }
    }

    if let Some(task2) = &submission.task2 {
        if let Some(task2_answer) = &task2.answer {
            question.push_str(&format!("Task 2 Question: {}\n", task2.question));
            answer.push_str(&format!("Task 2 Answer: {}\n", task2_answer));
        }
    }

    (question, answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(question: &str, answer: Option<&str>, image: Option<&str>) -> TaskSection {
        TaskSection {
            question: question.to_string(),
            answer: answer.map(str::to_string),
            image_path: None,
            image_b64: image.map(str::to_string),
        }
    }

    fn submission(
        variant: &str,
        task1: Option<TaskSection>,
        task2: Option<TaskSection>,
    ) -> WritingSubmission {
        WritingSubmission {
            test_variant: variant.to_string(),
            task1,
            task2,
            file_path: None,
        }
    }

    #[test]
    fn academic_task1_without_image_is_rejected() {
        let sub = submission(
            "academic",
            Some(section("Describe the chart.", Some("Answer."), None)),
            None,
        );

        let err = validate_tasks(&sub, TestVariant::Academic).expect_err("应报缺字段");
        assert!(matches!(
            err,
            AppError::Business(BusinessError::MissingTaskField { ref field, .. }) if field == "image"
        ));
    }

    #[test]
    fn general_training_task1_needs_no_image() {
        let sub = submission(
            "general training",
            Some(section("Write a letter.", Some("Dear manager..."), None)),
            Some(section("Discuss.", Some("Essay."), None)),
        );

        validate_tasks(&sub, TestVariant::GeneralTraining).expect("培训类无需图片");
    }

    #[test]
    fn present_task_without_answer_is_rejected() {
        let sub = submission(
            "general training",
            None,
            Some(section("Discuss.", None, None)),
        );

        let err = validate_tasks(&sub, TestVariant::GeneralTraining).expect_err("应报缺字段");
        assert!(matches!(
            err,
            AppError::Business(BusinessError::MissingTaskField { ref task, .. }) if task == "task2"
        ));
    }

    #[test]
    fn combined_texts_skip_absent_tasks() {
        let sub = submission(
            "general training",
            None,
            Some(section("Discuss both views.", Some("My essay."), None)),
        );

        let (question, answer) = combine_texts(&sub);
        assert!(!question.contains("Task 1"));
        assert!(question.contains("Task 2 Question: Discuss both views."));
        assert!(answer.contains("Task 2 Answer: My essay."));
    }
}
