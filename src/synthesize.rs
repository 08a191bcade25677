//! Grounded answer synthesis.
//!
//! Builds a bounded prompt from the retrieved chunk texts and the user's
//! question, then calls the generative model at low temperature so the
//! answer stays faithful to the supplied context. The model is instructed
//! to emit [`OUT_OF_CONTEXT_ANSWER`] verbatim when the context does not
//! contain the answer — downstream code and tests match on that exact
//! string, so it is a contract, not a suggestion.
//!
//! Every failure mode of the generation call (network, auth, quota,
//! malformed response) is converted into an `"An error occurred: ..."`
//! string: the chat surface always receives something displayable.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::GenerationConfig;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The exact phrase the model must produce when the retrieved context
/// cannot answer the question.
pub const OUT_OF_CONTEXT_ANSWER: &str = "answer is not available in the context";

/// Assemble the grounding prompt from retrieved passages and the question.
pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    let context_block = contexts.join("\n\n");
    format!(
        "Answer the question as detailed as possible from the provided context, \
         make sure to provide all the details. If the answer is not in the provided \
         context just say, \"{OUT_OF_CONTEXT_ANSWER}\", don't provide the wrong answer.\n\n\
         Context:\n{context_block}\n\n\
         Question:\n{question}\n\n\
         Answer:\n"
    )
}

/// Produce a grounded answer for `question` from `contexts`.
///
/// Never fails: errors come back as a user-visible string prefixed with
/// `"An error occurred: "`.
pub async fn generate_answer(
    config: &GenerationConfig,
    api_key: &str,
    question: &str,
    contexts: &[String],
) -> String {
    let prompt = build_prompt(question, contexts);
    match call_gemini(config, api_key, &prompt).await {
        Ok(text) => text,
        Err(e) => format!("An error occurred: {e:#}"),
    }
}

/// Call the Gemini `generateContent` endpoint with retry/backoff.
///
/// Retry policy matches the embedding client: 429 and 5xx retry with
/// exponential backoff, 401/403 and other 4xx fail immediately.
async fn call_gemini(config: &GenerationConfig, api_key: &str, prompt: &str) -> Result<String> {
    if api_key.is_empty() {
        bail!("Gemini API key is required for generation");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let url = format!("{}/models/{}:generateContent", GEMINI_API_BASE, config.model);

    let body = serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "temperature": config.temperature,
        },
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_generation_response(&json);
                }

                if status.as_u16() == 401 || status.as_u16() == 403 {
                    let body_text = response.text().await.unwrap_or_default();
                    bail!(
                        "Gemini generation authentication failed ({}): {}",
                        status,
                        body_text
                    );
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(if status.as_u16() == 429 {
                        anyhow::anyhow!("Gemini generation quota exhausted (429): {}", body_text)
                    } else {
                        anyhow::anyhow!("Gemini API error {}: {}", status, body_text)
                    });
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("Gemini API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
}

/// Extract the first candidate's text parts from a generateContent
/// response.
fn parse_generation_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Malformed generation response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        bail!("Malformed generation response: no text parts");
    }

    Ok(text.trim().to_string())
}
