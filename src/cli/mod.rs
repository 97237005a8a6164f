use anyhow::{Result, anyhow};
use clap::Parser;
use medicare_ai::config::Settings;
use medicare_ai::i18n::Language;
use std::path::PathBuf;

/// Medicare AI - 病历解读、医疗问答与医学资料检索服务
#[derive(Parser, Debug)]
#[command(name = "medicare-ai")]
#[command(
    about = "AI backend for medical record analysis, health chat and medical research, powered by Gemini and Tavily."
)]
#[command(version)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 监听地址
    #[arg(long)]
    pub host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Google API KEY
    #[arg(long)]
    pub google_api_key: Option<String>,

    /// Tavily API KEY
    #[arg(long)]
    pub tavily_api_key: Option<String>,

    /// 高能效模型，用于常规对话与分析
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于长病历以及efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// 读取图片与PDF使用的模型
    #[arg(long)]
    pub vision_model: Option<String>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 日志级别或过滤表达式，如 info、medicare_ai=debug
    #[arg(long)]
    pub log_level: Option<String>,

    /// 请求未指定语言时使用的语言 (en, fr)
    #[arg(long)]
    pub language: Option<String>,

    /// 是否禁用缓存
    #[arg(long)]
    pub no_cache: bool,

    /// 启动前检查Gemini连接
    #[arg(long)]
    pub check_connection: bool,
}

impl Args {
    /// 在配置文件与环境变量之上叠加命令行参数
    pub fn into_settings(self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;

        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(key) = self.google_api_key {
            settings.llm.api_key = key;
        }
        if let Some(key) = self.tavily_api_key {
            settings.tavily.api_key = key;
        }
        if let Some(model_efficient) = self.model_efficient {
            settings.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            settings.llm.model_powerful = model_powerful;
        }
        if let Some(vision_model) = self.vision_model {
            settings.llm.vision_model = vision_model;
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow!("temperature must be between 0.0 and 2.0"));
            }
            settings.llm.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.llm.max_tokens = max_tokens;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if let Some(language) = self.language {
            settings.default_language = language
                .parse::<Language>()
                .map_err(|e| anyhow!(e))?;
        }
        if self.no_cache {
            settings.cache.enabled = false;
        }

        Ok(settings)
    }
}
