pub mod config;
pub mod error;
pub mod grader;
pub mod grading;
pub mod handlers;
pub mod models;
pub mod parser;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws_protocol;

use std::sync::Arc;

pub fn build_state(config: &config::AppConfig) -> anyhow::Result<state::AppState> {
    let contracts = grader::ResponseContracts::load()?;
    let grader: Arc<dyn grader::GradingClient> = if let Some(real) = grader::GeminiGradingClient::from_env(contracts) {
        tracing::info!(model = %real.model, "grading with gemini");
        Arc::new(real)
    } else {
        tracing::warn!("no GEMINI_API_KEY set, grading with the offline mock");
        Arc::new(grader::MockGradingClient::new())
    };
    Ok(state::AppState::new(grader, config.session))
}
