pub mod checks;
pub mod context;
pub mod domain;
pub mod engine;
pub mod error;
pub mod explain;
pub mod extract;
pub mod ingest;
pub mod insights;
pub mod report;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }
}
