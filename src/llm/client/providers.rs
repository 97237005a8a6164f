//! Gemini Provider支持模块

use anyhow::Result;
use rig::{
    agent::Agent,
    client::CompletionClient,
    extractor::Extractor,
    providers::gemini::completion::gemini_api_types::{AdditionalParameters, GenerationConfig},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::LLMConfig;

pub type GeminiAgent = Agent<rig::providers::gemini::completion::CompletionModel>;
pub type GeminiExtractor<T> = Extractor<rig::providers::gemini::completion::CompletionModel, T>;

/// Gemini客户端
#[derive(Clone)]
pub struct GeminiProvider {
    client: rig::providers::gemini::Client,
}

impl GeminiProvider {
    /// 根据配置创建客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = rig::providers::gemini::Client::builder(&config.api_key).build()?;
        Ok(Self { client })
    }

    /// Gemini要求请求体里带上generationConfig
    fn additional_params() -> Result<serde_json::Value> {
        let gen_cfg = GenerationConfig::default();
        let cfg = AdditionalParameters::default().with_config(gen_cfg);
        Ok(serde_json::to_value(cfg)?)
    }

    /// 创建Agent
    pub fn create_agent(
        &self,
        model: &str,
        system_prompt: &str,
        config: &LLMConfig,
    ) -> Result<GeminiAgent> {
        let agent = self
            .client
            .agent(model)
            .preamble(system_prompt)
            .max_tokens(config.max_tokens.into())
            .temperature(config.temperature)
            .additional_params(Self::additional_params()?)
            .build();
        Ok(agent)
    }

    /// 创建Extractor
    pub fn create_extractor<T>(
        &self,
        model: &str,
        system_prompt: &str,
        config: &LLMConfig,
    ) -> Result<GeminiExtractor<T>>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let extractor = self
            .client
            .extractor::<T>(model)
            .preamble(system_prompt)
            .max_tokens(config.max_tokens.into())
            .additional_params(Self::additional_params()?)
            .build();
        Ok(extractor)
    }
}
