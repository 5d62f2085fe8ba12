use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 音频来源解析错误
    Source(SourceError),
    /// 评分 Oracle 错误
    Oracle(OracleError),
    /// 业务逻辑错误
    Business(BusinessError),
    /// 配置错误
    Config(ConfigError),
    /// 文件操作错误
    File(FileError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Source(e) => write!(f, "音频来源错误: {}", e),
            AppError::Oracle(e) => write!(f, "Oracle错误: {}", e),
            AppError::Business(e) => write!(f, "业务错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Source(e) => Some(e),
            AppError::Oracle(e) => Some(e),
            AppError::Business(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 音频来源解析错误
///
/// 只影响单个评测单元：在流程层会被降级为哨兵转写文本，
/// 不会中断兄弟单元的评测。
#[derive(Debug)]
pub enum SourceError {
    /// 来源描述符形状无法识别
    UnsupportedKind {
        descriptor: String,
    },
    /// 远程音频下载失败
    FetchFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 转写服务失败
    TranscriptionFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::UnsupportedKind { descriptor } => {
                write!(f, "无法识别的音频来源: {}", descriptor)
            }
            SourceError::FetchFailed { url, source } => {
                write!(f, "下载音频失败 ({}): {}", url, source)
            }
            SourceError::TranscriptionFailed { path, source } => {
                write!(f, "转写失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::FetchFailed { source, .. }
            | SourceError::TranscriptionFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 评分 Oracle 错误
#[derive(Debug)]
pub enum OracleError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    EmptyContent {
        model: String,
    },
    /// 修复链耗尽，无法从响应中提取结构化记录
    MalformedResponse {
        raw: String,
    },
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::ApiCallFailed { model, source } => {
                write!(f, "Oracle API调用失败 (模型: {}): {}", model, source)
            }
            OracleError::EmptyContent { model } => {
                write!(f, "Oracle返回内容为空 (模型: {})", model)
            }
            OracleError::MalformedResponse { raw } => {
                write!(f, "Oracle响应无法修复为JSON: {}", raw)
            }
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OracleError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 业务逻辑错误
#[derive(Debug)]
pub enum BusinessError {
    /// 两个任务都没有可用结果，合并器无从合并
    NoValidInput,
    /// 考试类型无法识别
    InvalidTestVariant {
        variant: String,
    },
    /// 任务缺少必填字段
    MissingTaskField {
        task: String,
        field: String,
    },
    /// 需要转写的单元存在，但没有产生任何转写文本
    NoTranscripts,
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessError::NoValidInput => write!(f, "没有可评分的任务"),
            BusinessError::InvalidTestVariant { variant } => {
                write!(f, "无法识别的考试类型: {}", variant)
            }
            BusinessError::MissingTaskField { task, field } => {
                write!(f, "任务 {} 缺少必填字段: {}", task, field)
            }
            BusinessError::NoTranscripts => write!(f, "没有可用的转写文本"),
        }
    }
}

impl std::error::Error for BusinessError {}

/// 配置错误
///
/// 配置错误立即向调用方抛出，不重试、不降级。
#[derive(Debug)]
pub enum ConfigError {
    /// 评分标准不存在
    RubricNotFound {
        task: String,
        variant: String,
    },
    /// 评分标准文件解析失败
    RubricParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::RubricNotFound { task, variant } => {
                write!(f, "找不到评分标准: task={}, variant={}", task, variant)
            }
            ConfigError::RubricParseFailed { path, source } => {
                write!(f, "评分标准文件解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::RubricParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. } | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Oracle(OracleError::MalformedResponse {
            raw: err.to_string(),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建"来源形状无法识别"错误
    pub fn unsupported_source(descriptor: impl Into<String>) -> Self {
        AppError::Source(SourceError::UnsupportedKind {
            descriptor: descriptor.into(),
        })
    }

    /// 创建下载失败错误
    pub fn fetch_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Source(SourceError::FetchFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建转写失败错误
    pub fn transcription_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Source(SourceError::TranscriptionFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建 Oracle API 调用错误
    pub fn oracle_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Oracle(OracleError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建评分标准缺失错误
    pub fn rubric_not_found(task: impl Into<String>, variant: impl Into<String>) -> Self {
        AppError::Config(ConfigError::RubricNotFound {
            task: task.into(),
            variant: variant.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
