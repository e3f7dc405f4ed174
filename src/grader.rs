use crate::error::GradingError;
use crate::models::{Question, ValidationResult};
use crate::session::{FinishPlan, GradingItem};
use futures::future::{join_all, BoxFuture};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Remote judge of answers. Implementations own prompt wording, transport and timeouts;
/// the session only sees a verdict or a failure.
pub trait GradingClient: Send + Sync {
    fn validate_one(
        &self,
        question: &Question,
        selected_option_index: usize,
    ) -> BoxFuture<'static, Result<ValidationResult, GradingError>>;

    /// One verdict per graded item, matched by question id. Items missing from the
    /// reply could not be graded.
    fn validate_batch(&self, items: &[GradingItem]) -> BoxFuture<'static, Result<Vec<ValidationResult>, GradingError>>;
}

/// Runs every batch group of `plan` concurrently and merges the verdicts by id.
/// A failed group is logged and contributes nothing.
pub async fn grade_plan(grader: &dyn GradingClient, plan: &FinishPlan) -> HashMap<String, ValidationResult> {
    let outcomes = join_all(plan.batches.iter().map(|batch| grader.validate_batch(batch))).await;

    let mut results = HashMap::new();
    for (group, (batch, outcome)) in plan.batches.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(verdicts) => {
                for verdict in verdicts {
                    match verdict.id.clone() {
                        Some(id) if plan.answered.contains(&id) => {
                            results.insert(id, verdict);
                        }
                        other => debug!(group, id = ?other, "ignoring verdict for unknown question"),
                    }
                }
            }
            Err(err) => warn!(group, size = batch.len(), "batch grading failed: {}", err),
        }
    }
    results
}

/// Offline grader. Questions listed in the answer key are graded against it;
/// any other question treats its first option as correct.
#[derive(Clone, Default)]
pub struct MockGradingClient {
    answer_key: HashMap<String, String>,
}

impl MockGradingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, question_text: impl Into<String>, correct_option: impl Into<String>) -> Self {
        self.answer_key.insert(question_text.into(), correct_option.into());
        self
    }

    fn verdict(&self, question: &Question, selected: Option<usize>) -> ValidationResult {
        let correct_index = self
            .answer_key
            .get(&question.question_text)
            .and_then(|text| question.options.iter().position(|o| o == text))
            .unwrap_or(0);
        let is_correct = selected == Some(correct_index);
        let correct_text = question.options.get(correct_index).cloned().unwrap_or_default();
        ValidationResult {
            id: Some(question.id.clone()),
            is_correct,
            correct_option_index: correct_index,
            explanation: format!("The expected answer is \"{}\".", correct_text),
            reasoning_for_incorrect: (!is_correct).then(|| "The selected option does not match the answer key.".to_string()),
        }
    }
}

impl GradingClient for MockGradingClient {
    fn validate_one(
        &self,
        question: &Question,
        selected_option_index: usize,
    ) -> BoxFuture<'static, Result<ValidationResult, GradingError>> {
        let mut verdict = self.verdict(question, Some(selected_option_index));
        verdict.id = None;
        Box::pin(async move { Ok(verdict) })
    }

    fn validate_batch(&self, items: &[GradingItem]) -> BoxFuture<'static, Result<Vec<ValidationResult>, GradingError>> {
        let verdicts: Vec<_> = items
            .iter()
            .map(|item| self.verdict(&item.question, item.selected_option_index))
            .collect();
        Box::pin(async move { Ok(verdicts) })
    }
}

/// JSON Schemas every model reply must satisfy before it is trusted.
#[derive(Clone)]
pub struct ResponseContracts {
    single: Arc<Value>,
    batch: Arc<Value>,
}

impl ResponseContracts {
    pub fn load() -> anyhow::Result<Self> {
        let single: Value = serde_json::from_str(include_str!("../contracts/grading_single.schema.json"))?;
        let batch: Value = serde_json::from_str(include_str!("../contracts/grading_batch.schema.json"))?;
        // fail at start-up rather than on the first request
        jsonschema::draft202012::new(&single).map_err(|e| anyhow::anyhow!("single schema: {}", e))?;
        jsonschema::draft202012::new(&batch).map_err(|e| anyhow::anyhow!("batch schema: {}", e))?;
        Ok(Self {
            single: Arc::new(single),
            batch: Arc::new(batch),
        })
    }

    fn check(schema: &Value, instance: &Value) -> Result<(), GradingError> {
        let compiled = jsonschema::draft202012::new(schema).map_err(|e| GradingError::Schema(e.to_string()))?;
        let issues: Vec<String> = compiled
            .iter_errors(instance)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(GradingError::Schema(issues.join("; ")))
        }
    }

    pub fn decode_single(&self, raw: &str) -> Result<ValidationResult, GradingError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::check(&self.single, &value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn decode_batch(&self, raw: &str) -> Result<Vec<ValidationResult>, GradingError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::check(&self.batch, &value)?;
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Clone)]
pub struct GeminiGradingClient {
    pub http: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub contracts: ResponseContracts,
}

impl GeminiGradingClient {
    pub fn from_env(contracts: ResponseContracts) -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var("API_KEY").ok().filter(|v| !v.trim().is_empty()))?;
        let base_url = std::env::var("GEMINI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        Some(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
            contracts,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn generate(&self, prompt: String, response_schema: Value) -> BoxFuture<'static, Result<String, GradingError>> {
        let http = self.http.clone();
        let url = self.endpoint();
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let body = json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": response_schema
                }
            });
            let request = http.post(&url).header("x-goog-api-key", api_key).json(&body).send();
            let response = tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| GradingError::Timeout)??;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GradingError::Upstream {
                    status: status.as_u16(),
                    body,
                });
            }

            let payload: GenerateResponse = response.json().await?;
            let text = payload
                .candidates
                .into_iter()
                .filter_map(|c| c.content)
                .flat_map(|c| c.parts)
                .find_map(|p| p.text)
                .unwrap_or_default();
            let cleaned = strip_code_fence(&text);
            if cleaned.is_empty() {
                return Err(GradingError::EmptyResponse);
            }
            Ok(cleaned)
        })
    }
}

impl GradingClient for GeminiGradingClient {
    fn validate_one(
        &self,
        question: &Question,
        selected_option_index: usize,
    ) -> BoxFuture<'static, Result<ValidationResult, GradingError>> {
        let reply = self.generate(single_prompt(question, selected_option_index), single_response_schema());
        let contracts = self.contracts.clone();
        let option_count = question.options.len();

        Box::pin(async move {
            let verdict = contracts.decode_single(&reply.await?)?;
            if verdict.correct_option_index >= option_count {
                return Err(GradingError::Schema(format!(
                    "correctOptionIndex {} out of range",
                    verdict.correct_option_index
                )));
            }
            Ok(verdict)
        })
    }

    fn validate_batch(&self, items: &[GradingItem]) -> BoxFuture<'static, Result<Vec<ValidationResult>, GradingError>> {
        if items.is_empty() {
            return Box::pin(async { Ok(Vec::new()) });
        }
        let reply = self.generate(batch_prompt(items), batch_response_schema());
        let contracts = self.contracts.clone();
        let option_counts: HashMap<String, usize> = items
            .iter()
            .map(|i| (i.question.id.clone(), i.question.options.len()))
            .collect();

        Box::pin(async move {
            let verdicts = contracts.decode_batch(&reply.await?)?;
            Ok(verdicts
                .into_iter()
                .filter(|v| {
                    let in_range = v
                        .id
                        .as_ref()
                        .and_then(|id| option_counts.get(id))
                        .is_some_and(|len| v.correct_option_index < *len);
                    if !in_range {
                        warn!(id = ?v.id, "dropping unusable batch verdict");
                    }
                    in_range
                })
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn lettered_options(question: &Question) -> String {
    (0..question.options.len())
        .filter_map(|i| question.option_label(i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_answer(question: &Question, selected: Option<usize>) -> String {
    selected
        .and_then(|i| question.option_label(i))
        .unwrap_or_else(|| "No answer provided (Skipped)".to_string())
}

pub fn single_prompt(question: &Question, selected_option_index: usize) -> String {
    format!(
        "Question: {}\nMy Answer: {}\nOptions:\n{}\n\n\
         Judge my answer against the options above. If it is correct, confirm it and explain why. \
         If it is wrong, give the index of the correct option (0 for A, 1 for B, ...) and explain \
         the mistake. Also explain why the other options are wrong.",
        question.question_text,
        describe_answer(question, Some(selected_option_index)),
        lettered_options(question),
    )
}

pub fn batch_prompt(items: &[GradingItem]) -> String {
    let blocks = items
        .iter()
        .map(|item| {
            format!(
                "ID: {}\nQuestion: {}\nMy Answer: {}\nOptions:\n{}",
                item.question.id,
                item.question.question_text,
                describe_answer(&item.question, item.selected_option_index),
                lettered_options(&item.question),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n----------------\n\n");
    format!(
        "You are grading a quiz of {} questions. For each one decide whether my answer is correct; \
         a skipped question is incorrect. Always return its ID, the index of the correct option \
         (0 for A, 1 for B, ...) and a short explanation.\n\nQuestions:\n{}",
        items.len(),
        blocks
    )
}

fn verdict_properties() -> Value {
    json!({
        "id": { "type": "STRING" },
        "isCorrect": { "type": "BOOLEAN" },
        "correctOptionIndex": { "type": "INTEGER" },
        "explanation": { "type": "STRING" },
        "reasoningForIncorrect": { "type": "STRING" }
    })
}

fn single_response_schema() -> Value {
    let mut properties = verdict_properties();
    if let Some(map) = properties.as_object_mut() {
        map.remove("id");
    }
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": ["isCorrect", "correctOptionIndex", "explanation"]
    })
}

fn batch_response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": verdict_properties(),
            "required": ["id", "isCorrect", "correctOptionIndex", "explanation"]
        }
    })
}
