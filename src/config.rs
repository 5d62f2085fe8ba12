/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 提交文件（TOML）存放目录
    pub submission_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- ASR 配置 ---
    pub asr_api_key: String,
    pub asr_api_base_url: String,
    pub asr_model_id: String,
    /// 远程音频下载超时（秒）
    pub fetch_timeout_secs: u64,
    // --- 评分标准 ---
    /// band 描述符 JSON 文件路径
    pub rubric_path: String,
    /// Task 2 相对 Task 1 的权重
    pub task2_weight: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            submission_folder: "submissions".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.5-flash".to_string(),
            asr_api_key: String::new(),
            asr_api_base_url: "https://api.elevenlabs.io".to_string(),
            asr_model_id: "scribe_v1".to_string(),
            fetch_timeout_secs: 30,
            rubric_path: "data/rubrics/band_descriptors.json".to_string(),
            task2_weight: 2.0,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            submission_folder: std::env::var("SUBMISSION_FOLDER").unwrap_or(default.submission_folder),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            asr_api_key: std::env::var("ASR_API_KEY").unwrap_or(default.asr_api_key),
            asr_api_base_url: std::env::var("ASR_API_BASE_URL").unwrap_or(default.asr_api_base_url),
            asr_model_id: std::env::var("ASR_MODEL_ID").unwrap_or(default.asr_model_id),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.fetch_timeout_secs),
            rubric_path: std::env::var("RUBRIC_PATH").unwrap_or(default.rubric_path),
            task2_weight: std::env::var("TASK2_WEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.task2_weight),
        }
    }
}
