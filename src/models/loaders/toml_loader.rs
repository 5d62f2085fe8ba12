use crate::models::submission::Submission;
use anyhow::{Context, Result};
use base64::Engine;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载一次提交
///
/// 写作提交中引用的图表图片（`image_path`，相对提交文件所在目录）
/// 在这里读入并编码为 base64，后续流程不再接触文件系统。
pub async fn load_submission(toml_file_path: &Path) -> Result<Submission> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut submission: Submission = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    let base_dir = toml_file_path.parent().unwrap_or_else(|| Path::new("."));

    match &mut submission {
        Submission::Writing(writing) => {
            writing.file_path = Some(toml_file_path.to_string_lossy().to_string());

            for task in [writing.task1.as_mut(), writing.task2.as_mut()]
                .into_iter()
                .flatten()
            {
                if let Some(image_path) = &task.image_path {
                    let full_path = base_dir.join(image_path);
                    let bytes = fs::read(&full_path)
                        .await
                        .with_context(|| format!("无法读取图片文件: {}", full_path.display()))?;
                    task.image_b64 =
                        Some(base64::engine::general_purpose::STANDARD.encode(bytes));
                }
            }
        }
        Submission::Speaking(speaking) => {
            speaking.file_path = Some(toml_file_path.to_string_lossy().to_string());
        }
    }

    Ok(submission)
}

/// 从文件夹中加载所有 TOML 提交文件
///
/// 单个文件加载失败只记录警告，不影响其他文件。
pub async fn load_all_submissions(folder_path: &str) -> Result<Vec<Submission>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut submissions = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_submission(&path).await {
                Ok(submission) => {
                    tracing::info!("成功加载 {} 提交", submission.kind_name());
                    submissions.push(submission);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(submissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn load_submission_encodes_referenced_image() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");

        let image_path = dir.path().join("chart.png");
        std::fs::File::create(&image_path)
            .and_then(|mut f| f.write_all(b"\x89PNG fake bytes"))
            .expect("写入图片失败");

        let toml_path = dir.path().join("submission.toml");
        std::fs::write(
            &toml_path,
            r#"
kind = "writing"
test_variant = "academic"

[task1]
question = "Describe the chart."
answer = "The chart shows an upward trend."
image_path = "chart.png"

[task2]
question = "Discuss both views."
answer = "Both views have merit."
"#,
        )
        .expect("写入TOML失败");

        let submission = load_submission(&toml_path).await.expect("加载失败");
        match submission {
            Submission::Writing(w) => {
                let task1 = w.task1.expect("task1 应存在");
                let encoded = task1.image_b64.expect("图片应已编码");
                assert!(!encoded.is_empty());
                assert!(w.file_path.is_some());
            }
            _ => panic!("提交种类错误"),
        }
    }

    #[tokio::test]
    async fn load_all_skips_broken_files() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");

        std::fs::write(
            dir.path().join("good.toml"),
            r#"
kind = "speaking"
test_id = "t1"
user_id = "u1"

[responses]
part_1 = "p1.mp3"
"#,
        )
        .expect("写入TOML失败");
        std::fs::write(dir.path().join("broken.toml"), "kind = ???").expect("写入TOML失败");

        let submissions = load_all_submissions(&dir.path().to_string_lossy())
            .await
            .expect("扫描失败");
        assert_eq!(submissions.len(), 1);
    }
}
