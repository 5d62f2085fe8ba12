//! 提交文件数据结构
//!
//! 一个 TOML 文件描述一次提交：写作（两个任务）或口语（若干部分的音频）。

use crate::models::unit::AudioSource;
use serde::Deserialize;
use std::collections::BTreeMap;

/// 一次提交
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    /// 写作提交
    Writing(WritingSubmission),
    /// 口语提交
    Speaking(SpeakingSubmission),
}

impl Submission {
    /// 提交种类的显示名
    pub fn kind_name(&self) -> &'static str {
        match self {
            Submission::Writing(_) => "writing",
            Submission::Speaking(_) => "speaking",
        }
    }
}

/// 写作提交：Task 1 + Task 2
#[derive(Debug, Clone, Deserialize)]
pub struct WritingSubmission {
    /// 考试类型（"academic" / "general training"），在流程层校验
    pub test_variant: String,
    pub task1: Option<TaskSection>,
    pub task2: Option<TaskSection>,
    /// 加载来源文件路径（由加载器填入）
    #[serde(skip)]
    pub file_path: Option<String>,
}

/// 写作提交中的单个任务
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSection {
    pub question: String,
    pub answer: Option<String>,
    /// 图表图片文件路径（仅学术类 Task 1）
    pub image_path: Option<String>,
    /// 图片内容的 base64 编码（由加载器从 image_path 填入）
    #[serde(skip)]
    pub image_b64: Option<String>,
}

/// 口语提交：部分标识 → 音频来源
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakingSubmission {
    pub test_id: String,
    pub user_id: String,
    /// 如 {"part_1": "audio/p1.mp3", "part_2": { audio_url = "https://..." }}
    pub responses: BTreeMap<String, AudioSource>,
    /// 加载来源文件路径（由加载器填入）
    #[serde(skip)]
    pub file_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::unit::ResolvedSource;

    #[test]
    fn parse_writing_submission_toml() {
        let content = r#"
kind = "writing"
test_variant = "academic"

[task1]
question = "The chart below shows the number of students studying abroad."
answer = "The chart illustrates a steady increase."
image_path = "chart.png"

[task2]
question = "Some people think globalization erodes cultures."
answer = "Globalization has both effects."
"#;
        let submission: Submission = toml::from_str(content).expect("应能解析写作提交");
        match submission {
            Submission::Writing(w) => {
                assert_eq!(w.test_variant, "academic");
                let task1 = w.task1.expect("task1 应存在");
                assert_eq!(task1.image_path.as_deref(), Some("chart.png"));
                assert!(task1.image_b64.is_none());
                assert!(w.task2.is_some());
            }
            other => panic!("解析出错误的提交种类: {:?}", other.kind_name()),
        }
    }

    #[test]
    fn parse_speaking_submission_with_mixed_sources() {
        let content = r#"
kind = "speaking"
test_id = "test-7"
user_id = "user-42"

[responses]
part_1 = "audio_files/part_1.mp3"
part_2 = { audio_url = "https://cdn.example.com/part_2.mp3" }
"#;
        let submission: Submission = toml::from_str(content).expect("应能解析口语提交");
        match submission {
            Submission::Speaking(s) => {
                assert_eq!(s.responses.len(), 2);
                assert!(matches!(
                    s.responses["part_1"].normalize(),
                    ResolvedSource::LocalPath(_)
                ));
                assert!(matches!(
                    s.responses["part_2"].normalize(),
                    ResolvedSource::RemoteUrl(_)
                ));
            }
            other => panic!("解析出错误的提交种类: {:?}", other.kind_name()),
        }
    }
}
