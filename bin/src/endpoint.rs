use connections_solver::{
    Completion, InferenceError, Prompt, SamplingConfig, TextGenerator, TokenUsage,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Resolves an endpoint name to a chat completions URL: `groq`, `oai`, or the base URL of any
/// OpenAI-compatible API.
pub fn chat_completions_url(endpoint: &str) -> String {
    match endpoint {
        "groq" => GROQ_URL.to_string(),
        "oai" | "openai" => OPENAI_URL.to_string(),
        url if url.ends_with("/chat/completions") => url.to_string(),
        url => format!("{}/v1/chat/completions", url.trim_end_matches('/')),
    }
}

/// The environment variable that holds the API key for the given endpoint, by default.
pub fn default_api_key_env(endpoint: &str) -> &'static str {
    match endpoint {
        "groq" => "GROQ_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// A text generator backed by an OpenAI-compatible chat completions API.
pub struct ChatEndpoint {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatEndpoint {
    pub fn new(endpoint: &str, model: &str, api_key: String) -> ChatEndpoint {
        ChatEndpoint {
            client: Client::new(),
            url: chat_completions_url(endpoint),
            api_key,
            model: model.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl TextGenerator for ChatEndpoint {
    async fn generate(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &prompt.user,
        });
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| InferenceError::Transport(error.to_string()))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(InferenceError::Quota);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|error| InferenceError::MalformedResponse(error.to_string()))?;
        completion(reply)
    }
}

fn completion(reply: ChatResponse) -> Result<Completion, InferenceError> {
    let usage = reply
        .usage
        .map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
        .unwrap_or_default();
    let text = reply
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| InferenceError::MalformedResponse("the reply had no content".to_string()))?;
    Ok(Completion { text, usage })
}
