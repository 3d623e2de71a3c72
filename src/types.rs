use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EmotionTag {
    #[default]
    Neutral,
    Happy,
    Sad,
    Reflective,
    Embarrassed,
    Possessive,
    Sarcastic,
}

impl EmotionTag {
    /// Sprite label understood by the presentation layer
    pub fn label(&self) -> &'static str {
        match self {
            EmotionTag::Neutral => "normal",
            EmotionTag::Happy => "feliz",
            EmotionTag::Sad => "triste",
            EmotionTag::Reflective => "refletindo",
            EmotionTag::Embarrassed => "desconcertada",
            EmotionTag::Possessive => "ciumenta",
            EmotionTag::Sarcastic => "sádica",
        }
    }
}

impl Display for EmotionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestOptions {
    pub model: String,
    pub prompt: String,
    pub streaming: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Wire body of `POST /api/generate`
#[derive(Debug, Serialize)]
pub(crate) struct GenerateBody<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl<'a> From<&'a RequestOptions> for GenerateBody<'a> {
    fn from(options: &'a RequestOptions) -> Self {
        GenerateBody {
            model: &options.model,
            prompt: &options.prompt,
            stream: options.streaming,
            options: Some(GenerateOptions {
                temperature: options.temperature,
                max_tokens: options.max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyOrigin {
    Backend,
    Cache,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokensUsage(pub u32);

impl Display for TokensUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reply {
    pub text: String,
    pub emotion: EmotionTag,
    pub origin: ReplyOrigin,
    pub tokens: Option<TokensUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompanionEvent {
    Fragment(String),
    Emotion(EmotionTag),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_serializes_with_lowercase_role() {
        let json = serde_json::to_string(&ConversationTurn::agent("oi")).unwrap();
        assert_eq!(json, r#"{"role":"agent","content":"oi"}"#);
    }

    #[test]
    fn generate_body_nests_sampling_options() {
        let options = RequestOptions {
            model: "mistral".to_string(),
            prompt: "hello".to_string(),
            streaming: true,
            temperature: 0.5,
            max_tokens: 10,
        };
        let value = serde_json::to_value(GenerateBody::from(&options)).unwrap();
        assert_eq!(value["model"], "mistral");
        assert_eq!(value["stream"], true);
        assert_eq!(value["options"]["temperature"], 0.5);
        assert_eq!(value["options"]["max_tokens"], 10);
    }
}
