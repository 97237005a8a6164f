use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Settings, load_google_llm, load_google_vision_llm};
use crate::llm::{GoogleLlm, GoogleVisionLlm};
use crate::memory::ChatTurn;
use crate::models::schemas::MedicalAnalysis;
use crate::services::MedicalLanguageModel;

/// Gemini服务，文本与视觉模型共用同一把API KEY
#[derive(Clone)]
pub struct GeminiService {
    text: GoogleLlm,
    vision: GoogleVisionLlm,
}

impl GeminiService {
    pub fn new(text: GoogleLlm, vision: GoogleVisionLlm) -> Self {
        Self { text, vision }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            load_google_llm(settings)?,
            load_google_vision_llm(settings)?,
        ))
    }
}

#[async_trait]
impl MedicalLanguageModel for GeminiService {
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String> {
        self.text.prompt(system_prompt, prompt).await
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String> {
        self.text.chat(system_prompt, history, message).await
    }

    async fn extract_analysis(&self, system_prompt: &str, prompt: &str) -> Result<MedicalAnalysis> {
        self.text.extract::<MedicalAnalysis>(system_prompt, prompt).await
    }

    async fn read_document(
        &self,
        data: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> Result<String> {
        self.vision.generate(instruction, data, mime_type, true).await
    }

    fn is_configured(&self) -> bool {
        self.text.is_configured() && self.vision.is_configured()
    }

    fn model_name(&self) -> String {
        self.text.model_name().to_string()
    }
}
