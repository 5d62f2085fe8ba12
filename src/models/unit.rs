//! 评测单元与音频来源
//!
//! `EvaluationUnit` 是整个流水线的基本工作单位：一个可评分的制品
//! （写作任务的题目+答案，或口语某一部分的转写文本）。
//! 构造后不可变，由一次请求的编排流程独占。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Display;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// 写作 Task 1（学术类：图表描述 / 培训类：书信）
    Task1,
    /// 写作 Task 2（议论文）
    Task2,
}

impl TaskKind {
    /// 获取评分标准中使用的键名
    pub fn key(self) -> &'static str {
        match self {
            TaskKind::Task1 => "task1",
            TaskKind::Task2 => "task2",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 考试类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestVariant {
    /// 学术类
    Academic,
    /// 培训类
    GeneralTraining,
}

impl TestVariant {
    /// 获取评分标准中使用的键名
    pub fn key(self) -> &'static str {
        match self {
            TestVariant::Academic => "academic",
            TestVariant::GeneralTraining => "general_training",
        }
    }

    /// 尝试从用户输入解析考试类型
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "academic" => Some(TestVariant::Academic),
            "general training" | "general_training" => Some(TestVariant::GeneralTraining),
            _ => None,
        }
    }
}

impl Display for TestVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 音频来源描述符
///
/// 在边界处一次性解析为带标签的变体，
/// 之后的代码不再需要猜测"这是路径还是 URL"。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudioSource {
    /// 结构化定位对象，携带一个 URL 字段
    Locator {
        audio_url: String,
    },
    /// 字符串形式：本地路径或 http(s) URL，构造时区分
    Raw(String),
}

impl AudioSource {
    /// 规范化为三种形状之一：本地路径 / 远程 URL / 空（不支持）
    ///
    /// 定位对象先抽出其 URL 字段再判断。
    pub fn normalize(&self) -> ResolvedSource<'_> {
        let value = match self {
            AudioSource::Locator { audio_url } => audio_url.as_str(),
            AudioSource::Raw(s) => s.as_str(),
        };

        let value = value.trim();
        if value.is_empty() {
            ResolvedSource::Unsupported
        } else if value.starts_with("http://") || value.starts_with("https://") {
            ResolvedSource::RemoteUrl(value)
        } else {
            ResolvedSource::LocalPath(value)
        }
    }

    /// 用于错误信息的简短描述
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Locator { audio_url } => format!("locator(audio_url={})", audio_url),
            AudioSource::Raw(s) => s.clone(),
        }
    }
}

/// 规范化后的音频来源形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSource<'a> {
    /// 本地文件路径，直接交给转写服务
    LocalPath(&'a str),
    /// 远程 URL，先下载到临时文件再转写
    RemoteUrl(&'a str),
    /// 无法识别的形状
    Unsupported,
}

/// 评测单元
///
/// 一次请求中的一个可评分制品。构造后不可变。
#[derive(Debug, Clone)]
pub struct EvaluationUnit {
    /// 单元标识（如 "task1"、"part_2"）
    pub unit_id: String,
    /// 题目文本
    pub prompt_text: String,
    /// 答案文本（纯音频单元为 None，转写后填入）
    pub answer_text: Option<String>,
    /// 附加媒体（base64 编码的图片，对本核心不透明）
    pub supplementary_media: Option<String>,
    /// 评分标准上下文（由外部评分标准库提供的不透明结构）
    pub rubric_context: JsonValue,
}

impl EvaluationUnit {
    /// 创建新的评测单元
    pub fn new(
        unit_id: impl Into<String>,
        prompt_text: impl Into<String>,
        answer_text: Option<String>,
        supplementary_media: Option<String>,
        rubric_context: JsonValue,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            prompt_text: prompt_text.into(),
            answer_text,
            supplementary_media,
            rubric_context,
        }
    }
}
