//! Tavily检索客户端

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{CacheManager, CachePerformanceReport};
use crate::config::{CacheConfig, Settings, TavilyConfig};
use crate::error::ServiceError;
use crate::services::{SearchHit, SearchOutcome, SearchQuery, WebSearch};

const CACHE_CATEGORY: &str = "research";

pub struct TavilyService {
    client: Client,
    config: TavilyConfig,
    cache: CacheManager,
}

impl TavilyService {
    pub fn new(config: &TavilyConfig, cache_config: &CacheConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client for Tavily")?;

        Ok(Self {
            client,
            config: config.clone(),
            cache: CacheManager::new(cache_config.clone()),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.tavily, &settings.cache)
    }

    fn endpoint(&self) -> String {
        format!("{}/search", self.config.api_base_url.trim_end_matches('/'))
    }

    /// 影响返回内容的请求参数都计入缓存键
    fn cache_key(&self, query: &SearchQuery) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.config.api_base_url.trim_end_matches('/'),
            query.query.trim().to_lowercase(),
            self.config.search_depth,
            query.max_results,
            self.config.include_answer,
            self.config.include_domains.join(",")
        )
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        let request = TavilyRequest {
            query: query.query.trim(),
            search_depth: self.config.search_depth.to_string(),
            max_results: query.max_results,
            include_answer: self.config.include_answer,
            include_domains: self.config.include_domains.clone(),
            topic: "general",
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Tavily returned an error");
            return Err(ServiceError::Upstream(format!(
                "Tavily returned {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            ))
            .into());
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid Tavily response: {}", e)))?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl WebSearch for TavilyService {
    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        if !self.is_configured() {
            return Err(ServiceError::NotConfigured("TAVILY_API_KEY").into());
        }
        if query.query.trim().is_empty() {
            return Err(ServiceError::invalid("search query is empty").into());
        }

        let cache_key = self.cache_key(query);
        if let Some(cached) = self
            .cache
            .get::<SearchOutcome>(CACHE_CATEGORY, &cache_key)
            .await?
        {
            debug!(query = %query.query, "Tavily result served from cache");
            return Ok(cached);
        }

        let outcome = self.fetch(query).await?;
        debug!(query = %query.query, hits = outcome.hits.len(), "Tavily search completed");

        if let Err(e) = self.cache.set(CACHE_CATEGORY, &cache_key, &outcome).await {
            warn!(error = %e, "failed to cache Tavily result");
        }
        Ok(outcome)
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    fn cache_report(&self) -> Option<CachePerformanceReport> {
        self.cache
            .is_enabled()
            .then(|| self.cache.generate_performance_report())
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: String,
    max_results: usize,
    include_answer: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
    topic: &'static str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
}

impl From<TavilyResponse> for SearchOutcome {
    fn from(response: TavilyResponse) -> Self {
        Self {
            answer: response.answer.filter(|answer| !answer.trim().is_empty()),
            hits: response
                .results
                .into_iter()
                .map(|result| SearchHit {
                    title: result.title,
                    url: result.url,
                    content: result.content,
                    score: result.score,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchDepth;
    use tempfile::TempDir;

    fn service(api_key: &str, cache_dir: &TempDir, cache_enabled: bool) -> TavilyService {
        let config = TavilyConfig {
            api_key: api_key.to_string(),
            // 不可达地址，测试不访问网络
            api_base_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
            ..Default::default()
        };
        let cache = CacheConfig {
            enabled: cache_enabled,
            cache_dir: cache_dir.path().to_path_buf(),
            expire_hours: 1,
        };
        TavilyService::new(&config, &cache).unwrap()
    }

    #[tokio::test]
    async fn test_search_requires_key() {
        let dir = TempDir::new().unwrap();
        let tavily = service("", &dir, false);
        assert!(!tavily.is_configured());

        let err = tavily
            .search(&SearchQuery::new("anemia", 3))
            .await
            .unwrap_err();
        assert!(matches!(
            ServiceError::find(&err),
            Some(ServiceError::NotConfigured("TAVILY_API_KEY"))
        ));
    }

    #[tokio::test]
    async fn test_cached_outcome_is_returned() {
        let dir = TempDir::new().unwrap();
        let tavily = service("key", &dir, true);
        let query = SearchQuery::new("Iron deficiency anemia", 3);
        let outcome = SearchOutcome {
            answer: Some("Low iron reduces hemoglobin.".to_string()),
            hits: vec![SearchHit {
                title: "Anaemia".to_string(),
                url: "https://www.nhs.uk/conditions/anaemia/".to_string(),
                content: "Symptoms and treatment".to_string(),
                score: Some(0.9),
            }],
        };
        tavily
            .cache
            .set(CACHE_CATEGORY, &tavily.cache_key(&query), &outcome)
            .await
            .unwrap();

        let result = tavily.search(&query).await.unwrap();
        assert_eq!(result, outcome);

        let report = tavily.cache_report().unwrap();
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.cache_writes, 1);
        assert_eq!(report.category_stats[CACHE_CATEGORY].hits, 1);
    }

    #[test]
    fn test_no_cache_report_when_disabled() {
        let dir = TempDir::new().unwrap();
        assert!(service("key", &dir, false).cache_report().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_classified() {
        let dir = TempDir::new().unwrap();
        let tavily = service("key", &dir, false);
        let err = tavily
            .search(&SearchQuery::new("anemia", 3))
            .await
            .unwrap_err();
        assert!(matches!(
            ServiceError::find(&err),
            Some(ServiceError::Upstream(_))
        ));
    }

    #[test]
    fn test_cache_key_normalizes_query() {
        let dir = TempDir::new().unwrap();
        let tavily = service("key", &dir, false);
        assert_eq!(
            tavily.cache_key(&SearchQuery::new(" Anemia ", 3)),
            tavily.cache_key(&SearchQuery::new("anemia", 3))
        );
        assert_ne!(
            tavily.cache_key(&SearchQuery::new("anemia", 3)),
            tavily.cache_key(&SearchQuery::new("anemia", 5))
        );
    }

    #[test]
    fn test_cache_key_tracks_answer_and_endpoint() {
        let dir = TempDir::new().unwrap();
        let query = SearchQuery::new("anemia", 3);
        let base = service("key", &dir, true);

        let mut without_answer = service("key", &dir, true);
        without_answer.config.include_answer = false;
        assert_ne!(base.cache_key(&query), without_answer.cache_key(&query));

        let mut other_endpoint = service("key", &dir, true);
        other_endpoint.config.api_base_url = "http://127.0.0.1:10".to_string();
        assert_ne!(base.cache_key(&query), other_endpoint.cache_key(&query));
    }

    #[tokio::test]
    async fn test_entry_cached_without_answer_not_reused() {
        let dir = TempDir::new().unwrap();
        let mut tavily = service("key", &dir, true);
        tavily.config.include_answer = false;
        let query = SearchQuery::new("anemia", 3);
        tavily
            .cache
            .set(CACHE_CATEGORY, &tavily.cache_key(&query), &SearchOutcome::default())
            .await
            .unwrap();

        // 改为请求简答后不再命中旧条目
        tavily.config.include_answer = true;
        let err = tavily.search(&query).await.unwrap_err();
        assert!(matches!(
            ServiceError::find(&err),
            Some(ServiceError::Upstream(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let request = TavilyRequest {
            query: "anemia",
            search_depth: SearchDepth::Advanced.to_string(),
            max_results: 3,
            include_answer: true,
            include_domains: vec!["nih.gov".to_string()],
            topic: "general",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["search_depth"], "advanced");
        assert_eq!(value["include_domains"][0], "nih.gov");

        let request = TavilyRequest {
            include_domains: Vec::new(),
            ..request
        };
        assert!(serde_json::to_value(&request).unwrap().get("include_domains").is_none());
    }

    #[test]
    fn test_response_mapping() {
        let response: TavilyResponse = serde_json::from_str(
            r#"{"answer":"","results":[{"title":"Anemia","url":"https://medlineplus.gov/anemia.html","content":"Overview","score":0.82}]}"#,
        )
        .unwrap();
        let outcome = SearchOutcome::from(response);
        assert!(outcome.answer.is_none());
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].score, Some(0.82));
    }
}
