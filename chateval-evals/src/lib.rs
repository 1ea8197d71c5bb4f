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

//! # Chateval Evaluation Framework
//!
//! Evaluates a conversational target against a dataset of prompts.
//!
//! ## Features
//!
//! - **Metric registry**: a closed, static table binding each metric's
//!   evaluator arguments to dataset fields, target output fields or literals
//! - **Built-in evaluators**: coherence, fluency, groundedness, relevance,
//!   similarity (LLM-as-judge), token F1, composite QA, latency
//! - **Latency instrumentation**: opt-in wrapper that times only the target call
//! - **Tabular results**: one row per dataset record, JSON Lines output
//!
//! ## Example
//!
//! ```rust,ignore
//! use chateval_evals::{EvaluationRunner, HttpTarget, RunRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = EvaluationRunner::from_model_config(&model_config)?;
//!     let target = Arc::new(HttpTarget::new("http://localhost:8080/chat"));
//!
//!     let request = RunRequest::new("nightly", "data/eval.jsonl", ["coherence", "latency"]);
//!     let (result, table) = runner.evaluate(target, &request).await?;
//!     println!("{:?}", result.metrics);
//!     println!("{table}");
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chateval_core::{ConfigError, DatasetError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod binding;
pub mod evaluators;
pub mod latency;
pub mod llm_client;
pub mod registry;
pub mod runner;
pub mod table;
pub mod target;

pub use binding::{resolve_arguments, Binding, Source};
pub use chateval_core::{EvalScores, MetricValue};
pub use latency::{instrument, LatencyTarget, LATENCY_FIELD};
pub use llm_client::{AzureOpenAIClient, LLMClient, LLMError, LLMResponse, TokenUsage};
pub use registry::{
    descriptor, resolve_metrics, Metric, MetricDescriptor, MetricPlan, PlannedMetric,
};
pub use runner::{EvaluationResult, EvaluationRunner, RunRequest};
pub use table::{materialize, ResultTable};
pub use target::{FnTarget, HttpTarget, Target, TargetError};

/// Arguments handed to an evaluator, keyed by argument name
pub type EvalArgs = BTreeMap<String, Value>;

/// Core trait that all evaluators must implement
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Unique identifier for this evaluator (e.g., "coherence_v1")
    fn id(&self) -> &str;

    /// Argument names this evaluator reads; every one must be bound
    fn required_args(&self) -> &[&'static str];

    /// Score a single row from its bound arguments
    async fn evaluate(&self, args: &EvalArgs) -> Result<EvalScores, EvalError>;

    /// Metadata about this evaluator (name, version, costs, etc.)
    fn metadata(&self) -> EvaluatorMetadata;
}

/// Metadata about an evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorMetadata {
    /// Human-readable name
    pub name: String,

    /// Version string (e.g., "1.0.0")
    pub version: String,

    /// Description of what this evaluator does
    pub description: String,

    /// Whether the evaluator calls the judge model
    pub uses_judge: bool,

    /// Tags for categorization
    pub tags: Vec<String>,
}

/// Errors that can occur during evaluation
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Row {row}: metric `{metric}` needs `{argument}` from {binding}, which is missing")]
    MissingField {
        row: usize,
        metric: String,
        argument: String,
        binding: String,
    },

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Row {row}: target failed: {source}")]
    TargetFailed {
        row: usize,
        #[source]
        source: TargetError,
    },

    #[error("Row {row}: evaluator `{metric}` failed: {source}")]
    EvaluatorFailed {
        row: usize,
        metric: String,
        #[source]
        source: Box<EvalError>,
    },

    #[error("LLM client error: {0}")]
    LLMClientError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LLMError> for EvalError {
    fn from(err: LLMError) -> Self {
        EvalError::LLMClientError(err.to_string())
    }
}

/// Read an argument as text. Lists (e.g. retrieved context chunks) are
/// joined with newlines; other non-string values use their JSON form.
pub fn arg_text(args: &EvalArgs, name: &str) -> Result<String, EvalError> {
    let value = args
        .get(name)
        .ok_or_else(|| EvalError::MissingArgument(name.to_string()))?;

    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    })
}
