use quiz_solver::{build_state, config::AppConfig, routes::build_router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env();
    let state = build_state(&config)?;
    let app = build_router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        challenge_seconds = config.session.challenge_seconds,
        challenge_questions = config.session.challenge_question_count,
        batch_size = config.session.batch_size,
        "quiz solver listening on {}",
        addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
