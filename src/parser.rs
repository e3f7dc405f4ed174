//! Extraction of poll questions from exported bot chat logs.
//!
//! A log is a run of messages, each opened by a timestamped bot header
//! (`Soal UAS Bot, [date]`). A message that carries a `[ Poll : title ]`
//! marker followed by one option per line becomes a [`Question`]; any other
//! message is ignored.

use crate::models::Question;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Soal UAS Bot, \[.*?\]").unwrap());
static POLL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[\s*Poll\s*:\s*(.*?)\s*\]").unwrap());

struct PollBlock {
    question_text: String,
    options: Vec<String>,
}

/// Parses `text` with the thread-local RNG. Never fails; malformed chunks are dropped.
pub fn parse_quiz_text(text: &str) -> Vec<Question> {
    parse_quiz_text_with_rng(text, &mut rand::thread_rng())
}

pub fn parse_quiz_text_with_rng<R: Rng + ?Sized>(text: &str, rng: &mut R) -> Vec<Question> {
    let batch: u32 = rng.gen();
    let mut questions = Vec::new();
    let mut chunks_seen = 0usize;

    for (index, chunk) in HEADER_RE.split(text).enumerate() {
        if chunk.trim().is_empty() {
            continue;
        }
        chunks_seen += 1;
        let Some(mut block) = extract_block(chunk) else {
            debug!(chunk = index, "skipping chunk without a usable poll");
            continue;
        };
        block.options.shuffle(rng);
        questions.push(Question {
            id: format!("q-{}-{:08x}", index, batch),
            question_text: block.question_text,
            options: block.options,
            raw_original: chunk.trim().to_string(),
        });
    }

    questions.shuffle(rng);
    info!(chunks = chunks_seen, questions = questions.len(), "parsed quiz text");
    questions
}

fn extract_block(chunk: &str) -> Option<PollBlock> {
    let caps = POLL_RE.captures(chunk)?;
    let marker = caps.get(0)?;
    let question_text = caps.get(1)?.as_str().trim().to_string();

    // Whatever trails the closing bracket on the marker line is not an option.
    let tail = chunk[marker.end()..]
        .split_once('\n')
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let options: Vec<String> = tail.lines().filter_map(clean_option).collect();
    if options.is_empty() {
        return None;
    }
    Some(PollBlock { question_text, options })
}

/// Strips one leading `-` marker. A line holding only the marker is skipped rather
/// than kept as an empty option, so no question ever offers a blank choice.
fn clean_option(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let cleaned = trimmed
        .strip_prefix('-')
        .map(str::trim_start)
        .unwrap_or(trimmed);
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
