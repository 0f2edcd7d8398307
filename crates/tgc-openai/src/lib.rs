//! Comment generator over an OpenAI-compatible `chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tgc_core::{
    errors::Error,
    generation::{CommentGenerator, CommentRequest},
    Result,
};

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NeuroClient {
    url: String,
    token: String,
    model: String,
    prompt: String,
    http: reqwest::Client,
}

impl NeuroClient {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "http client with timeout unavailable, using defaults");
                reqwest::Client::new()
            });
        Self {
            url: url.into(),
            token: token.into(),
            model: model.into(),
            prompt: prompt.into(),
            http,
        }
    }

    fn body<'a>(&'a self, req: &'a CommentRequest) -> ChatBody<'a> {
        let mut content = vec![ContentPart::Text {
            text: format!("{}{}", self.prompt, req.text),
        }];
        if let Some(url) = req.image.as_deref() {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            });
        }
        ChatBody {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        }
    }
}

/// First choice's text; zero choices is a non-retryable failure.
fn first_choice(resp: ChatResponse) -> Result<String> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Generation("empty choices".to_string()))?;
    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl CommentGenerator for NeuroClient {
    async fn generate(&self, req: &CommentRequest) -> Result<String> {
        tracing::debug!(model = %self.model, with_image = req.image.is_some(), "requesting comment");

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&self.body(req))
            .send()
            .await
            .map_err(|e| Error::External(format!("neuro request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, "neuro endpoint returned an error");
            return Err(Error::External(format!(
                "neuro status {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("neuro json error: {e}")))?;
        let text = first_choice(parsed)?;
        tracing::info!(chars = text.chars().count(), "comment generated");
        Ok(text)
    }
}
