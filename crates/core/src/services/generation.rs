//! Question generation seam and validation.
//!
//! The engine treats generation as an opaque call: topic, difficulty and
//! count in, candidate questions out. Every candidate is validated before
//! anything is persisted.

use std::time::Duration;

use async_trait::async_trait;
use quizflow_common::config::GenerationConfig;
use quizflow_common::{AppError, AppResult};
use quizflow_db::models::{Difficulty, Quiz};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Input to a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub topic: String,
    pub difficulty: Difficulty,
    pub count: u32,
}

impl From<&Quiz> for GenerationRequest {
    fn from(quiz: &Quiz) -> Self {
        Self {
            topic: quiz.topic.clone(),
            difficulty: quiz.difficulty,
            count: quiz.total_questions,
        }
    }
}

/// A question as returned by a generator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_answer_in_options"))]
pub struct GeneratedQuestion {
    #[validate(length(min = 1))]
    pub question_text: String,
    #[validate(length(min = 1))]
    pub options: Vec<String>,
    #[validate(length(min = 1))]
    pub correct_answer: String,
}

fn validate_answer_in_options(question: &GeneratedQuestion) -> Result<(), ValidationError> {
    if question.question_text.trim().is_empty() {
        return Err(ValidationError::new("blank_question_text"));
    }
    if question.options.iter().any(|o| o.trim().is_empty()) {
        return Err(ValidationError::new("blank_option"));
    }
    if !question.options.contains(&question.correct_answer) {
        return Err(ValidationError::new("correct_answer_not_in_options"));
    }
    Ok(())
}

/// Reject the whole batch if any question is malformed.
///
/// Returns the first offending index (zero-based) with the reason.
pub fn validate_questions(questions: &[GeneratedQuestion]) -> AppResult<()> {
    if questions.is_empty() {
        return Err(AppError::InvalidQuestionStructure {
            index: 0,
            reason: "generator returned no questions".to_string(),
        });
    }

    for (index, question) in questions.iter().enumerate() {
        question
            .validate()
            .map_err(|e| AppError::InvalidQuestionStructure {
                index,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// External question generation.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Produce candidate questions. Failure is reported, never papered over.
    async fn generate(&self, request: &GenerationRequest) -> AppResult<Vec<GeneratedQuestion>>;
}

/// Generator backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiQuestionGenerator {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiQuestionGenerator {
    /// Build from configuration. Fails when no API key is configured.
    pub fn from_config(config: &GenerationConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Config("generation.api_key is not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    fn prompt(request: &GenerationRequest) -> String {
        format!(
            "Generate {count} multiple choice questions about {topic} with {difficulty} difficulty.\n\
            Each question has exactly 4 options and exactly one correct answer, \
            and correct_answer must repeat one option verbatim.\n\
            Return only JSON of the form \
            {{\"questions\": [{{\"question_text\": \"...\", \"options\": [\"...\"], \"correct_answer\": \"...\"}}]}}",
            count = request.count,
            topic = request.topic,
            difficulty = request.difficulty,
        )
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct QuestionPayload {
    questions: Vec<GeneratedQuestion>,
}

/// Parse the model's reply, tolerating a surrounding Markdown code fence.
fn parse_questions(content: &str) -> AppResult<Vec<GeneratedQuestion>> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map_or(trimmed, |rest| rest.trim_end().trim_end_matches("```"))
        .trim();

    serde_json::from_str::<QuestionPayload>(body)
        .map(|payload| payload.questions)
        .map_err(|e| AppError::ExternalService(format!("Invalid generator output: {e}")))
}

#[async_trait]
impl QuestionGenerator for OpenAiQuestionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<Vec<GeneratedQuestion>> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": Self::prompt(request)}
            ],
            "temperature": 0.7,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Generator request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Generator API error: {status} - {body}"
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse generator response: {e}"))
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ExternalService("Generator returned no choices".to_string()))?
            .message
            .content;

        let questions = parse_questions(&content)?;
        tracing::debug!(
            topic = %request.topic,
            requested = request.count,
            returned = questions.len(),
            "Questions generated"
        );
        Ok(questions)
    }
}
