//! Chat client abstraction and the two prompt shapes.
//!
//! [`ChatClient`] is the seam to the external language-model service:
//! role-tagged messages in, free text out. It is invoked with exactly two
//! prompt shapes — a closed two-label classification (temperature 0, tiny
//! token budget) and an open-ended answer (system prompt plus optional
//! document context and history).
//!
//! [`HttpChatClient`] implements the trait against an OpenAI-compatible
//! `/chat/completions` endpoint with the same bounded-timeout,
//! backoff-retry policy as the embedding client.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result, Service};

/// System prompt for the open-ended answer shape.
const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Answer questions clearly and concisely.\n\
If context from documents is provided, use it to answer the question accurately.\n\
If no context is provided, use your general knowledge.\n\
Always be professional and helpful.";

/// Which pipeline stage a request serves; determines the error's service
/// tag and the sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Classification,
    Generation,
}

impl Purpose {
    pub fn service(self) -> Service {
        match self {
            Purpose::Classification => Service::Classification,
            Purpose::Generation => Service::Generation,
        }
    }
}

/// One role-tagged prompt message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// A fully composed request for the language-model service.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub purpose: Purpose,
    pub messages: Vec<PromptMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// The closed two-label judgment: does this query need the document
    /// collection, or general knowledge?
    pub fn classification(query: &str, conversation_context: &str) -> Self {
        let prompt = format!(
            "You are a query classifier. Determine if the following query requires searching \
             the private document collection or can be answered with general knowledge.\n\n\
             The document collection contains information about:\n\
             - HR policies (leave, benefits, code of conduct)\n\
             - Product FAQs and features\n\
             - Security policies\n\
             - Employee onboarding\n\
             - Technical API documentation\n\n\
             Query: {query}\n\n\
             {conversation_context}\n\
             Respond with ONLY one word: \"DOCUMENT\" if it needs the document collection, \
             or \"DIRECT\" if it's general knowledge.\n"
        );

        Self {
            purpose: Purpose::Classification,
            messages: vec![PromptMessage::new("user", prompt)],
            temperature: 0.0,
            max_tokens: 10,
        }
    }

    /// The open-ended answer shape, optionally grounded in document context.
    pub fn answer(
        query: &str,
        document_context: Option<&str>,
        conversation_context: &str,
    ) -> Self {
        let user_message = match document_context {
            Some(context) => format!(
                "Context from the document collection:\n{context}\n\n\
                 Question: {query}\n\n\
                 Please answer based on the provided context. If the context doesn't contain \
                 relevant information, say so."
            ),
            None => query.to_string(),
        };

        let mut messages = vec![PromptMessage::new("system", ANSWER_SYSTEM_PROMPT)];
        if !conversation_context.is_empty() {
            messages.push(PromptMessage::new("user", conversation_context));
        }
        messages.push(PromptMessage::new("user", user_message));

        Self {
            purpose: Purpose::Generation,
            messages,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

/// External language-model service: a composed request in, free text out.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Chat client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl HttpChatClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.chat_model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let service = request.purpose.service();
        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
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
                            .map_err(|e| Error::external(service, e.to_string()))?;
                        return parse_chat_response(&json, service);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("HTTP {}: {}", status, body_text));
                        continue;
                    }

                    return Err(Error::external(
                        service,
                        format!("HTTP {}: {}", status, body_text),
                    ));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(Error::external(
            service,
            last_err.unwrap_or_else(|| "chat completion failed after retries".to_string()),
        ))
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value, service: Service) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::external(service, "response missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_shape() {
        let request = ChatRequest::classification("What is the leave policy?", "");
        assert_eq!(request.purpose, Purpose::Classification);
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 10);
        assert_eq!(request.messages.len(), 1);
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("What is the leave policy?"));
        assert!(prompt.contains("DOCUMENT"));
        assert!(prompt.contains("DIRECT"));
    }

    #[test]
    fn test_answer_grounded_shape() {
        let request = ChatRequest::answer(
            "How many days?",
            Some("[1] Leave policy grants 15 days annually."),
            "Previous conversation:\nuser: hi\n",
        );
        assert_eq!(request.purpose, Purpose::Generation);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[1].content.contains("Previous conversation"));
        assert!(request.messages[2].content.contains("15 days annually"));
        assert!(request.messages[2].content.contains("How many days?"));
    }

    #[test]
    fn test_answer_direct_shape_omits_context_block() {
        let request = ChatRequest::answer("What is 2+2?", None, "");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content, "What is 2+2?");
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  4  "}}]
        });
        let text = parse_chat_response(&json, Service::Generation).unwrap();
        assert_eq!(text, "4");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&json, Service::Generation).is_err());
    }
}
