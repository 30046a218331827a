use anyhow::Context;
use clap::Parser;
use shelfwatch_core::checks::CheckRegistry;
use shelfwatch_core::context::BusinessContext;
use shelfwatch_core::engine::AnalyticsEngine;
use shelfwatch_core::explain::{self, ExplanationClient};
use shelfwatch_core::ingest::table;
use shelfwatch_core::{config::Settings, report};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shelfwatch_worker")]
struct Args {
    /// Unified CSV: inventory snapshot rows plus sales rows.
    #[arg(long)]
    input: PathBuf,

    /// Optional separate sales CSV (legacy two-file mode); rows are merged
    /// into the unified table before analysis.
    #[arg(long)]
    sales: Option<PathBuf>,

    /// Industry context to analyze under.
    #[arg(long, default_value = "retail")]
    industry: String,

    /// Business name shown in the report header.
    #[arg(long, default_value = "Business")]
    business_name: String,

    /// Output format: text (rendered report) or json (raw insights).
    #[arg(long, default_value = "text")]
    format: String,

    /// Write output to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Rewrite insight explanations with Anthropic (wording only; falls
    /// back to template explanations on any failure).
    #[arg(long)]
    rewrite_explanations: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, &args).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "analysis run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let mut input = table::read_table_file(&args.input)?;
    if let Some(sales_path) = &args.sales {
        input.extend(table::read_table_file(sales_path)?);
    }

    let context = BusinessContext::for_industry(&args.industry)?;
    let engine = AnalyticsEngine::new(context, CheckRegistry::with_defaults());

    let insights = engine.analyze(&input)?;
    tracing::info!(
        rows = input.len(),
        insights = insights.len(),
        industry = %args.industry,
        "analysis complete"
    );

    let rendered = match args.format.as_str() {
        "json" => serde_json::to_string_pretty(&insights)
            .context("failed to serialize insights to JSON")?,
        "text" => {
            let generated_at = chrono::Utc::now();
            let rewritten = if args.rewrite_explanations && !insights.is_empty() {
                match rewrite(settings, &args.business_name, &insights).await {
                    Ok(texts) => Some(texts),
                    Err(err) => {
                        sentry_anyhow::capture_anyhow(&err);
                        tracing::warn!(
                            error = %err,
                            "explanation rewrite failed; using template explanations"
                        );
                        None
                    }
                }
            } else {
                None
            };

            match rewritten {
                Some(texts) => report::generate_with_explanations(
                    &insights,
                    &texts,
                    &args.business_name,
                    generated_at,
                )?,
                None => report::generate(&insights, &args.business_name, generated_at),
            }
        }
        other => anyhow::bail!("unsupported format '{other}' (expected 'text' or 'json')"),
    };

    match &args.output {
        Some(path) => std::fs::write(path, &rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn rewrite(
    settings: &Settings,
    business_name: &str,
    insights: &[shelfwatch_core::domain::insight::Insight],
) -> anyhow::Result<Vec<String>> {
    let client = explain::anthropic::AnthropicClient::from_settings(settings)?;
    let input = explain::RewriteInput::try_new(business_name, insights)?;
    client.rewrite_explanations(input).await
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
