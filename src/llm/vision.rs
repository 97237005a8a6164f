//! Gemini视觉模型客户端
//!
//! rig的Gemini agent只接收文本提示，读取图片与PDF需要把文件以inline data
//! 的形式放进`generateContent`请求体，这里直接调用REST接口。
//! 请求与响应的数据结构只在本模块内可见。

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{config::LLMConfig, error::ServiceError};

/// Gemini视觉模型客户端
#[derive(Debug, Clone)]
pub struct GoogleVisionLlm {
    client: Client,
    api_base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl GoogleVisionLlm {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client for Gemini vision")?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.vision_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base_url, self.model
        )
    }

    /// 按指令读取文件内容，`json_output`为true时要求模型返回JSON
    pub async fn generate(
        &self,
        instruction: &str,
        data: &[u8],
        mime_type: &str,
        json_output: bool,
    ) -> Result<String> {
        if !self.is_configured() {
            return Err(ServiceError::NotConfigured("GOOGLE_API_KEY").into());
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: instruction.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: BASE64.encode(data),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
                response_mime_type: json_output.then_some("application/json"),
            },
        };

        debug!(
            model = %self.model,
            mime_type,
            bytes = data.len(),
            "sending Gemini vision request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Gemini vision request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Gemini vision returned an error");
            return Err(ServiceError::Upstream(format!(
                "Gemini vision returned {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            ))
            .into());
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid Gemini vision response: {}", e)))?;

        parsed.into_text()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ServiceError::Upstream(format!("Gemini blocked the request: {}", reason)).into());
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::MalformedOutput("no candidates returned".to_string()))?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ServiceError::MalformedOutput(format!(
                "empty response (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
            .into());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uses_vision_model() {
        let config = LLMConfig {
            api_base_url: "https://example.test/".to_string(),
            vision_model: "gemini-vision-test".to_string(),
            ..Default::default()
        };
        let vision = GoogleVisionLlm::new(&config).unwrap();
        assert_eq!(
            vision.endpoint(),
            "https://example.test/v1beta/models/gemini-vision-test:generateContent"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: "read".to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: BASE64.encode(b"png"),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 128,
                response_mime_type: Some("application/json"),
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "read");
        assert_eq!(
            value["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["data"], "cG5n");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 128);
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_response_text_joined() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hemo"},{"text":"globin"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Hemoglobin");
    }

    #[test]
    fn test_blocked_response() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_empty_candidate_is_malformed() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        let err = response.into_text().unwrap_err();
        assert!(matches!(
            ServiceError::find(&err),
            Some(ServiceError::MalformedOutput(msg)) if msg.contains("MAX_TOKENS")
        ));
    }

    #[tokio::test]
    async fn test_generate_without_key() {
        let vision = GoogleVisionLlm::new(&LLMConfig::default()).unwrap();
        let err = vision
            .generate("read", b"data", "image/png", false)
            .await
            .unwrap_err();
        assert!(matches!(
            ServiceError::find(&err),
            Some(ServiceError::NotConfigured(_))
        ));
    }
}
