use serde::{Deserialize, Serialize};

/// 回复语言
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[serde(rename = "en")]
    #[default]
    English,
    #[serde(rename = "fr")]
    French,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::English => write!(f, "en"),
            Language::French => write!(f, "fr"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" | "anglais" => Ok(Language::English),
            "fr" | "french" | "français" | "francais" => Ok(Language::French),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

impl Language {
    /// 获取语言的描述性名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::French => "Français",
        }
    }

    /// 获取语言的提示词指令
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            Language::English => {
                "Respond in English, using clear and accurate language a patient can understand."
            }
            Language::French => {
                "Répondez en français, dans un langage clair et précis qu'un patient peut comprendre."
            }
        }
    }

    pub fn disclaimer(&self) -> &'static str {
        match self {
            Language::English => {
                "For informational purposes only. Always consult a qualified healthcare professional."
            }
            Language::French => {
                "À titre informatif uniquement. Consultez toujours un professionnel de santé qualifié."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_str() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::English);
        assert_eq!("FR".parse::<Language>().unwrap(), Language::French);
        assert_eq!("Français".parse::<Language>().unwrap(), Language::French);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_serde_codes() {
        assert_eq!(serde_json::to_string(&Language::French).unwrap(), "\"fr\"");
        let lang: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(lang, Language::English);
        assert_eq!(Language::default(), Language::English);
    }

    #[test]
    fn test_disclaimer_is_localized() {
        assert!(Language::French.disclaimer().contains("professionnel"));
        assert!(Language::English.disclaimer().contains("professional"));
        assert_eq!(Language::French.to_string(), "fr");
    }
}
