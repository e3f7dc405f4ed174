use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuizMode {
    #[default]
    Standard,
    Challenge,
}

/// One parsed multiple-choice item. Option order is the presentation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub raw_original: String,
}

impl Question {
    /// `A. first option` style label used when describing answers to the grader.
    pub fn option_label(&self, index: usize) -> Option<String> {
        let text = self.options.get(index)?;
        let letter = char::from_u32('A' as u32 + index as u32).unwrap_or('?');
        Some(format!("{}. {}", letter, text))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Idle,
    Validating,
    Validated,
    Error,
}

/// Verdict returned by a grading client for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub is_correct: bool,
    pub correct_option_index: usize,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_for_incorrect: Option<String>,
}

/// Per-session progress wrapper around a [`Question`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(flatten)]
    pub question: Question,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_selected_option_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_for_incorrect: Option<String>,
    pub status: ValidationStatus,
}

impl AnswerRecord {
    pub fn new(question: Question) -> Self {
        Self {
            question,
            user_selected_option_index: None,
            correct_option_index: None,
            is_correct: None,
            is_skipped: None,
            explanation: None,
            reasoning_for_incorrect: None,
            status: ValidationStatus::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.question.id
    }

    pub fn is_answered(&self) -> bool {
        self.user_selected_option_index.is_some()
    }

    pub fn apply_verdict(&mut self, result: &ValidationResult) {
        self.status = ValidationStatus::Validated;
        self.is_correct = Some(result.is_correct);
        self.is_skipped = Some(false);
        self.correct_option_index = Some(result.correct_option_index);
        self.explanation = Some(result.explanation.clone());
        self.reasoning_for_incorrect = result.reasoning_for_incorrect.clone();
    }

    /// Skipped questions never reach the grader, so no explanation is attached.
    pub fn mark_skipped(&mut self) {
        self.status = ValidationStatus::Validated;
        self.is_correct = Some(false);
        self.is_skipped = Some(true);
        self.correct_option_index = None;
        self.explanation = None;
        self.reasoning_for_incorrect = None;
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.question.clone());
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GradeResult {
    pub grade: &'static str,
    pub explanation: &'static str,
    pub color: &'static str,
}

/// Snapshot produced once per finish.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub score: f64,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub skipped_count: usize,
    /// Answered questions whose batch group failed; they carry no verdict.
    pub ungraded_count: usize,
    pub total: usize,
    pub grade_details: GradeResult,
    pub finished_at: DateTime<Utc>,
}
