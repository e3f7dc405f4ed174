use std::net::SocketAddr;

pub const DEFAULT_CHALLENGE_SECONDS: u64 = 7200;
pub const DEFAULT_CHALLENGE_QUESTION_COUNT: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Knobs that shape a single quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub challenge_seconds: u64,
    pub challenge_question_count: usize,
    pub batch_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            challenge_seconds: DEFAULT_CHALLENGE_SECONDS,
            challenge_question_count: DEFAULT_CHALLENGE_QUESTION_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let host = lookup("BACKEND_HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("BACKEND_PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(8080);

        let session = SessionConfig {
            challenge_seconds: parsed("CHALLENGE_TIME_SECONDS").unwrap_or(DEFAULT_CHALLENGE_SECONDS),
            challenge_question_count: parsed("CHALLENGE_QUESTION_COUNT")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_CHALLENGE_QUESTION_COUNT),
            batch_size: parsed("GRADING_BATCH_SIZE")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_BATCH_SIZE)
                .max(1),
        };

        Self { host, port, session }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
