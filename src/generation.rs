//! Text generation behind the chat and classification paths.
//!
//! One backend today (`openai` chat completions) plus `disabled`. The retry
//! policy mirrors the embedding client: bounded attempts with exponential
//! backoff on 429/5xx and network errors, immediate failure on other 4xx.

use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{CoreError, CoreResult};

/// Answer verbosity requested by the caller. Each level maps to a token cap
/// and a style instruction in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    Brief,
    Balanced,
    Detailed,
}

impl ResponseLength {
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s.to_lowercase().as_str() {
            "brief" => Ok(Self::Brief),
            "balanced" => Ok(Self::Balanced),
            "detailed" => Ok(Self::Detailed),
            other => Err(CoreError::InvalidInput(format!(
                "unknown response length: {}. Use brief, balanced, or detailed.",
                other
            ))),
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Brief => 512,
            Self::Balanced => 1024,
            Self::Detailed => 2048,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Brief => "Answer in 2-3 concise sentences.",
            Self::Balanced => "Answer in a focused paragraph or two.",
            Self::Detailed => "Answer thoroughly, covering all relevant details from the context.",
        }
    }
}

impl Default for ResponseLength {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Build the grounded-answer prompt from assembled context.
pub fn build_answer_prompt(question: &str, context: &str, length: ResponseLength) -> String {
    format!(
        "You are a financial document assistant. Answer the question using only \
the provided context. If the context does not contain the answer, say so \
rather than guessing. Cite sources by filename when relevant.\n\n\
{}\n\n\
Context:\n{}\n\n\
Question: {}",
        length.instruction(),
        context,
        question
    )
}

/// Run a single completion against the configured provider.
pub async fn generate(
    config: &GenerationConfig,
    prompt: &str,
    max_tokens: u32,
) -> CoreResult<String> {
    match config.provider.as_str() {
        "openai" => generate_openai(config, prompt, max_tokens).await,
        "disabled" => Err(CoreError::GenerationUnavailable(
            "generation provider is disabled".to_string(),
        )),
        other => Err(CoreError::GenerationUnavailable(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

async fn generate_openai(
    config: &GenerationConfig,
    prompt: &str,
    max_tokens: u32,
) -> CoreResult<String> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| CoreError::GenerationUnavailable("OPENAI_API_KEY not set".to_string()))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| CoreError::GenerationUnavailable("generation.model required".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CoreError::GenerationUnavailable(e.to_string()))?;

    let body = serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "max_tokens": max_tokens,
        "temperature": 0.2,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| CoreError::GenerationUnavailable(e.to_string()))?;
                    let text = json["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    if text.is_empty() {
                        return Err(CoreError::GenerationUnavailable(
                            "empty completion".to_string(),
                        ));
                    }
                    return Ok(text);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(format!("completions API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                return Err(CoreError::GenerationUnavailable(format!(
                    "completions API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(e.to_string());
                continue;
            }
        }
    }

    Err(CoreError::GenerationUnavailable(
        last_err.unwrap_or_else(|| "generation failed after retries".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_length() {
        assert_eq!(ResponseLength::parse("Brief").unwrap(), ResponseLength::Brief);
        assert_eq!(
            ResponseLength::parse("DETAILED").unwrap(),
            ResponseLength::Detailed
        );
        assert!(ResponseLength::parse("verbose").is_err());
    }

    #[test]
    fn test_token_caps_are_tiered() {
        assert_eq!(ResponseLength::Brief.max_tokens(), 512);
        assert_eq!(ResponseLength::Balanced.max_tokens(), 1024);
        assert_eq!(ResponseLength::Detailed.max_tokens(), 2048);
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_answer_prompt(
            "How much was spent on travel?",
            "[Context 1]\nSource: stmt.txt\nContent: flight booking 450.00",
            ResponseLength::Brief,
        );
        assert!(prompt.contains("flight booking 450.00"));
        assert!(prompt.contains("How much was spent on travel?"));
        assert!(prompt.contains("2-3 concise sentences"));
    }

    #[tokio::test]
    async fn test_disabled_provider_fails_typed() {
        let config = GenerationConfig::default();
        let err = generate(&config, "hello", 64).await.unwrap_err();
        assert!(matches!(err, CoreError::GenerationUnavailable(_)));
    }
}
