use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::i18n::Language;
use crate::llm::{GoogleLlm, GoogleVisionLlm};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "medicare.toml";

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "MEDICARE_CONFIG";

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    /// HTTP服务配置
    pub server: ServerConfig,

    /// Gemini模型配置
    pub llm: LLMConfig,

    /// Tavily检索配置
    pub tavily: TavilyConfig,

    /// 病历分析配置
    pub analysis: AnalysisConfig,

    /// 对话配置
    pub chat: ChatConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 日志配置
    pub logging: LoggingConfig,

    /// 请求未指定语言时使用的语言
    pub default_language: Language,
}

/// HTTP服务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许的跨域来源，"*"表示任意来源
    pub cors_origins: Vec<String>,
    /// 上传文件大小上限（字节）
    pub max_upload_bytes: usize,
    pub request_timeout_seconds: u64,
}

/// Gemini模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// Google API KEY
    pub api_key: String,

    /// Gemini REST基地址（视觉模型使用）
    pub api_base_url: String,

    /// 高能效模型，用于常规对话与分析
    pub model_efficient: String,

    /// 高质量模型，用于长病历以及efficient失效情况下的兜底
    pub model_powerful: String,

    /// 读取图片与PDF使用的模型
    pub vision_model: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// Tavily检索深度
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl std::fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchDepth::Basic => write!(f, "basic"),
            SearchDepth::Advanced => write!(f, "advanced"),
        }
    }
}

/// Tavily检索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TavilyConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub search_depth: SearchDepth,
    pub max_results: usize,
    /// 是否请求Tavily生成的简答
    pub include_answer: bool,
    /// 限定检索的站点，为空时不限定
    pub include_domains: Vec<String>,
    pub timeout_seconds: u64,
}

/// 病历分析配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 送入模型的病历最大字符数
    pub max_record_chars: usize,
    pub enable_research: bool,
    /// 每次分析生成的检索语句数量
    pub research_queries: usize,
    pub results_per_query: usize,
}

/// 对话配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    /// 每个会话保留的问答轮数
    pub max_history_turns: usize,
    pub max_sessions: usize,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let settings: Settings =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(settings)
    }

    /// 按优先级加载配置：显式路径 > MEDICARE_CONFIG > ./medicare.toml > 默认值，最后叠加环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(env_path) if !env_path.trim().is_empty() => {
                    Self::from_file(Path::new(env_path.trim()))?
                }
                _ => {
                    let default_path = std::env::current_dir()
                        .unwrap_or_else(|_| PathBuf::from("."))
                        .join(DEFAULT_CONFIG_FILE);
                    if default_path.exists() {
                        Self::from_file(&default_path)?
                    } else {
                        Self::default()
                    }
                }
            },
        };

        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数覆盖配置，空值视为未设置
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")) {
            self.llm.api_key = key;
        }
        if let Some(key) = get("TAVILY_API_KEY") {
            self.tavily.api_key = key;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("Invalid PORT value: {}", port))?;
        }
        if let Some(level) = get("MEDICARE_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 进程级配置，首次调用时加载，之后只读
pub fn settings() -> Result<&'static Settings> {
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }
    let loaded = Settings::load(None)?;
    Ok(SETTINGS.get_or_init(|| loaded))
}

/// 根据配置创建文本模型客户端
pub fn load_google_llm(settings: &Settings) -> Result<GoogleLlm> {
    GoogleLlm::new(&settings.llm)
}

/// 根据配置创建视觉模型客户端
pub fn load_google_vision_llm(settings: &Settings) -> Result<GoogleVisionLlm> {
    GoogleVisionLlm::new(&settings.llm)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            request_timeout_seconds: 120,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: String::from("https://generativelanguage.googleapis.com"),
            model_efficient: String::from("gemini-1.5-flash"),
            model_powerful: String::from("gemini-1.5-pro"),
            vision_model: String::from("gemini-1.5-flash"),
            max_tokens: 8192,
            temperature: 0.3,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 120,
        }
    }
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: String::from("https://api.tavily.com"),
            search_depth: SearchDepth::default(),
            max_results: 5,
            include_answer: true,
            include_domains: vec![
                "who.int".to_string(),
                "cdc.gov".to_string(),
                "nih.gov".to_string(),
                "medlineplus.gov".to_string(),
                "mayoclinic.org".to_string(),
                "clevelandclinic.org".to_string(),
                "nhs.uk".to_string(),
                "pasteur.fr".to_string(),
                "has-sante.fr".to_string(),
                "ameli.fr".to_string(),
            ],
            timeout_seconds: 30,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_record_chars: 24_000,
            enable_research: true,
            research_queries: 2,
            results_per_query: 3,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            max_history_turns: 10,
            max_sessions: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".medicare/cache"),
            expire_hours: 24,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            log_file: None,
        }
    }
}
