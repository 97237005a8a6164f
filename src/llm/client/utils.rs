use crate::config::LLMConfig;

/// 提示词超过该长度时直接使用powerful模型
const EFFICIENT_PROMPT_LIMIT: usize = 32 * 1024;

/// 按提示词长度（字节）选择模型，返回（首选模型，备选模型）
pub fn evaluate_befitting_model(llm_config: &LLMConfig, prompt_len: usize) -> (String, Option<String>) {
    if prompt_len <= EFFICIENT_PROMPT_LIMIT {
        let fallover = if llm_config.model_powerful != llm_config.model_efficient {
            Some(llm_config.model_powerful.clone())
        } else {
            None
        };
        return (llm_config.model_efficient.clone(), fallover);
    }
    (llm_config.model_powerful.clone(), None)
}

/// 按字符截断文本，返回截断后的文本以及是否发生了截断
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (text[..byte_index].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// 从模型回复中取出JSON对象，兼容```json代码块包裹以及前后夹杂说明文字的情况
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
