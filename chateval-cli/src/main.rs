// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Chateval CLI
//!
//! Runs an evaluation of an HTTP chat endpoint over a JSON Lines dataset and
//! prints the summarized metrics and the per-row result table.

use anyhow::{Context, Result};
use chateval_core::{
    CredentialSettings, EnvTokenProvider, EvaluatorErrorPolicy, ModelConfig, RunSettings,
    DEFAULT_EVALUATION_MODEL, DEFAULT_EVALUATION_NAME,
};
use chateval_evals::{EvaluationRunner, HttpTarget, Metric, RunRequest, Target};
use clap::builder::PossibleValuesParser;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chateval")]
#[command(about = "Evaluate a chat endpoint against a dataset", long_about = None)]
struct Cli {
    /// JSON Lines dataset; every row needs a `chat_input` field
    #[arg(long)]
    evaluation_data_path: PathBuf,

    /// Name recorded for this run [default: eval-sdk-dev]
    #[arg(long)]
    evaluation_name: Option<String>,

    /// Judge model deployment [default: gpt-35-turbo]
    #[arg(long, env = "AZURE_OPENAI_CHAT_DEPLOYMENT")]
    evaluation_model: Option<String>,

    /// Metrics to compute
    #[arg(
        long,
        required = true,
        num_args = 1..,
        value_parser = PossibleValuesParser::new(Metric::names())
    )]
    metrics: Vec<String>,

    /// Chat endpoint under evaluation
    #[arg(long, env = "CHATEVAL_TARGET_URL")]
    target_url: Option<String>,

    /// Write result rows here as JSON Lines
    #[arg(long)]
    output_path: Option<PathBuf>,

    /// TOML settings file with `[model]` and `[run]` sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,
}

/// Flags merged over the settings file
#[derive(Debug, PartialEq)]
struct Invocation {
    evaluation_name: String,
    deployment: String,
    target_url: String,
    output_path: Option<PathBuf>,
    studio_base_url: Option<String>,
    error_policy: EvaluatorErrorPolicy,
}

impl Invocation {
    fn resolve(cli: &Cli, settings: &RunSettings) -> Result<Self> {
        let target_url = cli
            .target_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .context("No target endpoint: pass --target-url or set CHATEVAL_TARGET_URL")?;

        Ok(Self {
            evaluation_name: cli
                .evaluation_name
                .clone()
                .or_else(|| settings.run.evaluation_name.clone())
                .unwrap_or_else(|| DEFAULT_EVALUATION_NAME.to_string()),
            deployment: cli
                .evaluation_model
                .clone()
                .or_else(|| settings.model.deployment.clone())
                .unwrap_or_else(|| DEFAULT_EVALUATION_MODEL.to_string()),
            target_url,
            output_path: cli
                .output_path
                .clone()
                .or_else(|| settings.run.output_path.clone()),
            studio_base_url: settings.run.studio_base_url.clone(),
            error_policy: settings.run.on_evaluator_error,
        })
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,reqwest=error,hyper=error"
    } else {
        "info,reqwest=error,hyper=error"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before parsing; clap reads `env` fallbacks then.
    let env_file = dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Some(path) = &env_file {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let settings = match &cli.config {
        Some(path) => RunSettings::from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => RunSettings::default(),
    };
    let invocation = Invocation::resolve(&cli, &settings)?;
    debug!(?invocation, "Resolved invocation");

    let model_config = ModelConfig::resolve(
        invocation.deployment.clone(),
        &settings.model,
        &CredentialSettings::from_env(),
        Some(&EnvTokenProvider),
    )
    .context("Failed to configure the judge model")?;
    info!(
        deployment = %model_config.deployment,
        endpoint = %model_config.endpoint,
        "Judge model configured"
    );

    let runner = EvaluationRunner::from_model_config(&model_config)?
        .with_error_policy(invocation.error_policy)
        .with_studio_base_url(invocation.studio_base_url.clone());
    let target: Arc<dyn Target> = Arc::new(HttpTarget::new(invocation.target_url.clone()));

    let mut request = RunRequest::new(
        invocation.evaluation_name.clone(),
        cli.evaluation_data_path.clone(),
        cli.metrics.iter().cloned(),
    );
    request.output_path = invocation.output_path.clone();

    let (result, table) = runner
        .evaluate(target, &request)
        .await
        .with_context(|| format!("Evaluation `{}` failed", invocation.evaluation_name))?;

    println!("-----Summarized Metrics-----");
    println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    println!("-----Tabular Result-----");
    print!("{table}");
    if let Some(url) = &result.studio_url {
        println!("View evaluation results in AI Studio: {url}");
    }
    if let Some(path) = &invocation.output_path {
        println!("✓ Results written to {}", path.display());
    }

    Ok(())
}
