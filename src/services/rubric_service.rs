//! 评分标准服务 - 业务能力层
//!
//! 只负责"查 band 描述符"能力，不关心流程
//!
//! 描述符文件在构造时加载一次；缺失的任务/考试类型组合是配置错误，
//! 立即向调用方抛出，不重试、不降级。

use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError};
use crate::models::unit::{TaskKind, TestVariant};
use serde_json::Value as JsonValue;
use std::fs;
use tracing::{debug, info};

/// 评分标准服务
///
/// 职责：
/// - 持有 band 描述符 JSON
/// - 按任务类型（+考试类型）查询对应段落
/// - 对本核心而言描述符内容是不透明的结构化数据
pub struct RubricService {
    rubrics: JsonValue,
}

impl RubricService {
    /// 从配置中的描述符文件创建服务
    pub fn new(config: &Config) -> AppResult<Self> {
        Self::from_path(&config.rubric_path)
    }

    /// 从指定路径加载描述符文件
    pub fn from_path(path: &str) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(ConfigError::RubricParseFailed {
                path: path.to_string(),
                source: Box::new(e),
            })
        })?;

        let rubrics: JsonValue = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(ConfigError::RubricParseFailed {
                path: path.to_string(),
                source: Box::new(e),
            })
        })?;

        info!("评分标准加载成功: {}", path);
        Ok(Self { rubrics })
    }

    /// 直接从 JSON 值构造（测试用）
    pub fn from_value(rubrics: JsonValue) -> Self {
        Self { rubrics }
    }

    /// 查询任务对应的评分标准
    ///
    /// - Task 1 按考试类型细分（academic / general_training）
    /// - Task 2 两种考试类型共用一份
    pub fn get_rubric(&self, task: TaskKind, variant: TestVariant) -> AppResult<JsonValue> {
        debug!("查询评分标准: task={}, variant={}", task, variant);

        let section = match task {
            TaskKind::Task1 => self
                .rubrics
                .get(task.key())
                .and_then(|t| t.get(variant.key())),
            TaskKind::Task2 => self.rubrics.get(task.key()),
        };

        section
            .cloned()
            .ok_or_else(|| AppError::rubric_not_found(task.key(), variant.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_rubrics() -> JsonValue {
        json!({
            "task1": {
                "academic": {"task_achievement": "Covers the requirements of the task."},
                "general_training": {"task_achievement": "Covers the purpose of the letter."}
            },
            "task2": {"task_response": "Addresses all parts of the task."}
        })
    }

    #[test]
    fn task1_rubric_is_split_by_variant() {
        let service = RubricService::from_value(sample_rubrics());

        let academic = service
            .get_rubric(TaskKind::Task1, TestVariant::Academic)
            .expect("应能查到学术类标准");
        assert!(academic["task_achievement"]
            .as_str()
            .unwrap()
            .contains("requirements"));

        let general = service
            .get_rubric(TaskKind::Task1, TestVariant::GeneralTraining)
            .expect("应能查到培训类标准");
        assert!(general["task_achievement"].as_str().unwrap().contains("letter"));
    }

    #[test]
    fn task2_rubric_ignores_variant() {
        let service = RubricService::from_value(sample_rubrics());

        let a = service
            .get_rubric(TaskKind::Task2, TestVariant::Academic)
            .expect("应能查到 Task 2 标准");
        let b = service
            .get_rubric(TaskKind::Task2, TestVariant::GeneralTraining)
            .expect("应能查到 Task 2 标准");
        assert_eq!(a, b);
    }

    #[test]
    fn missing_section_is_a_config_error() {
        let service = RubricService::from_value(json!({"task2": {}}));

        let err = service
            .get_rubric(TaskKind::Task1, TestVariant::Academic)
            .expect_err("缺失的段落应报配置错误");
        assert!(matches!(
            err,
            AppError::Config(ConfigError::RubricNotFound { .. })
        ));
    }
}
