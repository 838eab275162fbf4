use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AutoQuestError, Result};

/// Formatting rules and worked examples sent with every fallback question.
/// `{context}` and `{question}` are filled in by [`render_prompt`].
pub const INSTRUCTION_TEMPLATE: &str = r#"
You are an assistant that fills out job application forms.

Follow these rules strictly:

1. If the question lists options (for example Yes/No, locations or skill levels), pick exactly one option from that list and copy its text exactly.
2. Never make up an option that is not listed.
3. If no options are listed and the question asks about experience, answer only "3" or "4".
4. For any other open question, give a short professional answer of at most 15 words.
5. Do not add labels, explanations or formatting. Return only the answer.

Examples:
Q: How many years of experience do you have with Python?
A: 4

Q: Are you comfortable with W2?
Yes
No
A: Yes

Q: What is your proficiency in English?
None
Conversational
Professional
Native
A: Professional

Q: Describe your experience with cloud architecture.
A: 4 years of experience designing scalable AWS infrastructure.

Now answer the following using the context.

Context:
{context}

Question: {question}

Answer:
"#;

pub fn render_prompt(instructions: &str, question: &str) -> String {
    instructions
        .replace("{context}", "")
        .replace("{question}", question)
}

/// Last-resort answer source: a single-shot completion with no memory
/// between calls.
#[async_trait]
pub trait GenerativeFallback: Send + Sync {
    async fn complete(&self, instructions: &str, question: &str) -> Result<String>;

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TaggedModel>,
}

#[derive(Debug, Deserialize)]
struct TaggedModel {
    name: String,
}

/// Completions from a local Ollama instance through `/api/generate`.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, temperature: f32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerativeFallback for OllamaGenerator {
    async fn complete(&self, instructions: &str, question: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt: render_prompt(instructions, question),
                stream: false,
                options: GenerateOptions {
                    temperature: self.temperature,
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AutoQuestError::Model(format!(
                "generative model {} returned status {}",
                self.model,
                response.status()
            )));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let unavailable =
            |reason: String| AutoQuestError::BackendUnavailable(format!("{}: {reason}", self.model));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("status {}", response.status())));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if tags.models.iter().any(|m| model_matches(&m.name, &self.model)) {
            Ok(())
        } else {
            Err(unavailable("model not installed".to_string()))
        }
    }
}

// Ollama lists "mistral" as "mistral:latest".
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted
        || listed
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_question_with_empty_context() {
        let q = "Are you comfortable with W2?\nYes\nNo";
        let prompt = render_prompt(INSTRUCTION_TEMPLATE, q);

        assert!(prompt.contains(&format!("Question: {q}\n")));
        assert!(prompt.contains("Context:\n\n"));
        assert!(!prompt.contains("{question}"));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn model_names_match_with_tag_suffix() {
        assert!(model_matches("mistral", "mistral"));
        assert!(model_matches("mistral:latest", "mistral"));
        assert!(model_matches("mistral:7b", "mistral:7b"));
        assert!(!model_matches("mistral-nemo:latest", "mistral"));
        assert!(!model_matches("llama3:latest", "mistral"));
    }

    #[test]
    fn generate_response_ignores_extra_fields() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"model":"mistral","response":"Yes","done":true,"eval_count":3}"#,
        )
        .unwrap();
        assert_eq!(body.response, "Yes");
    }
}
