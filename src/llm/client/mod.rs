//! LLM客户端 - 提供统一的Gemini文本服务接口

use anyhow::Result;
use rand::Rng;
use rig::completion::{Chat, Message, Prompt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    config::LLMConfig,
    error::ServiceError,
    llm::client::utils::evaluate_befitting_model,
    memory::{ChatRole, ChatTurn},
};

mod providers;
pub mod utils;

use providers::GeminiProvider;

/// Gemini文本模型客户端
#[derive(Clone)]
pub struct GoogleLlm {
    config: LLMConfig,
    client: GeminiProvider,
}

impl GoogleLlm {
    /// 创建新的LLM客户端，未配置API KEY时也能创建，调用时才报错
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = GeminiProvider::new(config)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_efficient
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(ServiceError::NotConfigured("GOOGLE_API_KEY").into())
        }
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!(model = %self.config.model_efficient, "checking Gemini connection");
        match self
            .prompt("You are a helpful assistant.", "Reply with the single word: ok")
            .await
        {
            Ok(_) => {
                info!("Gemini connection ok");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Gemini connection failed");
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        attempt = retries,
                        max_attempts = max_retries,
                        error = %err,
                        "Gemini call failed"
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    let jitter = rand::rng().random_range(0..=retry_delay_ms / 4);
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms + jitter)).await;
                }
            }
        }
    }

    /// 先用首选模型重试，仍失败时切换到备选模型
    async fn run_with_fallover<T, F, Fut>(&self, prompt_len: usize, operation: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        self.ensure_configured()?;

        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, prompt_len);
        debug!(model = %befitting_model, "selected Gemini model");

        match self
            .retry_with_backoff(|| operation(befitting_model.clone()))
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => match fallover_model {
                Some(model) => {
                    warn!(
                        failed_model = %befitting_model,
                        fallover_model = %model,
                        error = %err,
                        "switching to fallover model"
                    );
                    self.retry_with_backoff(|| operation(model.clone())).await
                }
                None => Err(err),
            },
        }
    }

    /// 单轮对话
    pub async fn prompt(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let prompt_len = system_prompt.len() + user_prompt.len();
        self.run_with_fallover(prompt_len, |model| async move {
            let agent = self
                .client
                .create_agent(&model, system_prompt, &self.config)?;
            agent.prompt(user_prompt).await.map_err(anyhow::Error::from)
        })
        .await
    }

    /// 带历史的多轮对话
    pub async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String> {
        let chat_history: Vec<Message> = history
            .iter()
            .map(|turn| match turn.role {
                ChatRole::User => Message::user(turn.content.clone()),
                ChatRole::Assistant => Message::assistant(turn.content.clone()),
            })
            .collect();
        let prompt_len = system_prompt.len()
            + message.len()
            + history.iter().map(|turn| turn.content.len()).sum::<usize>();

        self.run_with_fallover(prompt_len, |model| {
            let chat_history = chat_history.clone();
            async move {
                let agent = self
                    .client
                    .create_agent(&model, system_prompt, &self.config)?;
                agent
                    .chat(message, chat_history)
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
        .await
    }

    /// 数据提取方法
    pub async fn extract<T>(&self, system_prompt: &str, user_prompt: &str) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let prompt_len = system_prompt.len() + user_prompt.len();
        self.run_with_fallover(prompt_len, |model| async move {
            let extractor =
                self.client
                    .create_extractor::<T>(&model, system_prompt, &self.config)?;
            extractor
                .extract(user_prompt)
                .await
                .map_err(anyhow::Error::from)
        })
        .await
    }
}
