//! 外部服务：Gemini生成式模型与Tavily检索
//!
//! 链路只依赖这里定义的两个trait，测试时可替换为mock实现。
//! `gemini_service()`与`tavily_service()`提供进程级共享实例。

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};

use crate::cache::CachePerformanceReport;
use crate::config::settings;
use crate::memory::ChatTurn;
use crate::models::schemas::MedicalAnalysis;

pub mod gemini_service;
pub mod tavily_service;

pub use gemini_service::GeminiService;
pub use tavily_service::TavilyService;

/// 医疗场景使用的语言模型能力
#[async_trait]
pub trait MedicalLanguageModel: Send + Sync {
    /// 单轮补全
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String>;

    /// 带历史的多轮对话
    async fn chat(&self, system_prompt: &str, history: &[ChatTurn], message: &str)
    -> Result<String>;

    /// 结构化提取病历分析结果
    async fn extract_analysis(&self, system_prompt: &str, prompt: &str)
    -> Result<MedicalAnalysis>;

    /// 读取图片或PDF，返回模型输出的原始文本
    async fn read_document(&self, data: &[u8], mime_type: &str, instruction: &str)
    -> Result<String>;

    fn is_configured(&self) -> bool;

    fn model_name(&self) -> String;
}

/// 一次检索请求
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
        }
    }
}

/// 检索命中的单条结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: Option<f64>,
}

/// 检索结果，`answer`为检索服务给出的简答
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub answer: Option<String>,
    pub hits: Vec<SearchHit>,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome>;

    fn is_configured(&self) -> bool;

    /// 结果缓存的统计，没有缓存时为None
    fn cache_report(&self) -> Option<CachePerformanceReport> {
        None
    }
}

static GEMINI_SERVICE: OnceLock<Arc<GeminiService>> = OnceLock::new();
static TAVILY_SERVICE: OnceLock<Arc<TavilyService>> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// 在锁内至多构造一次实例，构造失败时原样返回错误，下次调用会重新尝试
fn get_or_build<T>(cell: &OnceLock<Arc<T>>, build: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
    if let Some(service) = cell.get() {
        return Ok(Arc::clone(service));
    }
    let _guard = INIT_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(service) = cell.get() {
        return Ok(Arc::clone(service));
    }
    let service = Arc::new(build()?);
    Ok(Arc::clone(cell.get_or_init(|| service)))
}

/// 进程级Gemini服务实例
pub fn gemini_service() -> Result<Arc<GeminiService>> {
    get_or_build(&GEMINI_SERVICE, || GeminiService::from_settings(settings()?))
}

/// 进程级Tavily服务实例
pub fn tavily_service() -> Result<Arc<TavilyService>> {
    get_or_build(&TAVILY_SERVICE, || TavilyService::from_settings(settings()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_or_build_runs_once() {
        let cell: OnceLock<Arc<String>> = OnceLock::new();
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok("service".to_string())
        };

        let first = get_or_build(&cell, build).unwrap();
        let second = get_or_build(&cell, build).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_calls_build_once() {
        let cell: OnceLock<Arc<String>> = OnceLock::new();
        let builds = AtomicUsize::new(0);
        let start = std::sync::Barrier::new(4);

        let (cell, builds, start) = (&cell, &builds, &start);
        let services: Vec<Arc<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(move || {
                        start.wait();
                        get_or_build(cell, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok("service".to_string())
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(services.iter().all(|s| Arc::ptr_eq(s, &services[0])));
    }

    #[test]
    fn test_get_or_build_propagates_failure() {
        let cell: OnceLock<Arc<String>> = OnceLock::new();
        let err = get_or_build(&cell, || Err(anyhow::anyhow!("bad config"))).unwrap_err();
        assert_eq!(err.to_string(), "bad config");
        assert!(cell.get().is_none());

        let service = get_or_build(&cell, || Ok("recovered".to_string())).unwrap();
        assert_eq!(service.as_str(), "recovered");
    }
}
