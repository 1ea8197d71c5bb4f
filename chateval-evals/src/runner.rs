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

//! Evaluation orchestration
//!
//! [`EvaluationRunner`] resolves the requested metrics, prepares the target
//! and drives the run: rows are processed one at a time, in dataset order.
//! For each row the target is called once, then every evaluator once with
//! its bound arguments.

use chateval_core::{Dataset, EvalScores, EvaluatorErrorPolicy, ModelConfig, ResultRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::binding::resolve_arguments;
use crate::llm_client::{AzureOpenAIClient, LLMClient};
use crate::registry::{resolve_metrics, MetricPlan};
use crate::table::{materialize, ResultTable};
use crate::target::Target;
use crate::EvalError;

/// What to evaluate
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub evaluation_name: String,
    pub data_path: PathBuf,
    pub metrics: Vec<String>,
    /// Write the result rows here as JSON Lines when set
    pub output_path: Option<PathBuf>,
}

impl RunRequest {
    pub fn new<I, S>(
        evaluation_name: impl Into<String>,
        data_path: impl Into<PathBuf>,
        metrics: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            evaluation_name: evaluation_name.into(),
            data_path: data_path.into(),
            metrics: metrics.into_iter().map(Into::into).collect(),
            output_path: None,
        }
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub evaluation_name: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// One row per dataset record, in dataset order
    pub rows: Vec<ResultRow>,
    /// Mean of each numeric score, keyed `<metric>.<score>`
    pub metrics: BTreeMap<String, f64>,
    pub studio_url: Option<String>,
}

/// Running mean per score column
#[derive(Default)]
struct MetricAggregator {
    sums: BTreeMap<String, (f64, usize)>,
}

impl MetricAggregator {
    fn record(&mut self, metric: &str, scores: &EvalScores) {
        for (name, value) in scores {
            if let Some(v) = value.as_f64() {
                let entry = self.sums.entry(format!("{metric}.{name}")).or_insert((0.0, 0));
                entry.0 += v;
                entry.1 += 1;
            }
        }
    }

    fn finish(self) -> BTreeMap<String, f64> {
        self.sums
            .into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect()
    }
}

/// Drives evaluation runs against one judge model
pub struct EvaluationRunner {
    llm_client: Arc<dyn LLMClient>,
    error_policy: EvaluatorErrorPolicy,
    studio_base_url: Option<String>,
}

impl EvaluationRunner {
    pub fn new(llm_client: Arc<dyn LLMClient>) -> Self {
        Self {
            llm_client,
            error_policy: EvaluatorErrorPolicy::default(),
            studio_base_url: None,
        }
    }

    /// Runner backed by an Azure OpenAI judge deployment
    pub fn from_model_config(config: &ModelConfig) -> Result<Self, EvalError> {
        let client = AzureOpenAIClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn with_error_policy(mut self, policy: EvaluatorErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Base URL of the report viewer; runs link to `<base>/runs/<run_id>`
    pub fn with_studio_base_url(mut self, url: Option<String>) -> Self {
        self.studio_base_url = url;
        self
    }

    /// Run the evaluation and materialize the result table, writing it to
    /// `request.output_path` when one is set.
    pub async fn evaluate(
        &self,
        target: Arc<dyn Target>,
        request: &RunRequest,
    ) -> Result<(EvaluationResult, ResultTable), EvalError> {
        let result = self.run(target, request).await?;
        let table = materialize(&result, request.output_path.as_deref())?;
        Ok((result, table))
    }

    /// Resolve metrics, load the dataset and run every row.
    ///
    /// Metric names are checked before the dataset is read or the target is
    /// called.
    pub async fn run(
        &self,
        target: Arc<dyn Target>,
        request: &RunRequest,
    ) -> Result<EvaluationResult, EvalError> {
        let plan = resolve_metrics(request.metrics.as_slice(), &self.llm_client)?;

        info!(
            "Running evaluation name={} on dataset {}",
            request.evaluation_name,
            request.data_path.display()
        );

        let dataset = Dataset::from_jsonl_path(&request.data_path)?;
        self.run_dataset(target, &request.evaluation_name, &plan, &dataset)
            .await
    }

    /// Run an already-resolved plan over an in-memory dataset
    pub async fn run_dataset(
        &self,
        target: Arc<dyn Target>,
        evaluation_name: &str,
        plan: &MetricPlan,
        dataset: &Dataset,
    ) -> Result<EvaluationResult, EvalError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let target = plan.prepare_target(target);

        debug!(config = ?plan.evaluator_config(), "Resolved evaluator bindings");
        info!(
            %run_id,
            rows = dataset.len(),
            metrics = ?plan.names(),
            "Evaluation started"
        );

        let mut aggregator = MetricAggregator::default();
        let mut rows = Vec::with_capacity(dataset.len());

        for (index, data) in dataset.rows().iter().enumerate() {
            let output = target
                .invoke(data)
                .await
                .map_err(|source| EvalError::TargetFailed { row: index, source })?;

            let mut row_scores: Vec<(&str, EvalScores)> =
                Vec::with_capacity(plan.metrics().len());
            for planned in plan.metrics() {
                let metric = planned.metric.as_str();
                let args = resolve_arguments(index, metric, planned.bindings, data, &output)?;

                match planned.evaluator.evaluate(&args).await {
                    Ok(scores) => {
                        aggregator.record(metric, &scores);
                        row_scores.push((metric, scores));
                    }
                    Err(err) => match self.error_policy {
                        EvaluatorErrorPolicy::Abort => {
                            return Err(EvalError::EvaluatorFailed {
                                row: index,
                                metric: metric.to_string(),
                                source: Box::new(err),
                            });
                        }
                        EvaluatorErrorPolicy::Skip => {
                            warn!(
                                row = index,
                                metric,
                                error = %err,
                                "Evaluator failed; score left empty"
                            );
                        }
                    },
                }
            }

            debug!(row = index, "Row evaluated");
            rows.push(ResultRow::assemble(
                data,
                &output,
                row_scores.iter().map(|(metric, scores)| (*metric, scores)),
            ));
        }

        let metrics = aggregator.finish();
        let studio_url = self
            .studio_base_url
            .as_deref()
            .map(|base| format!("{}/runs/{}", base.trim_end_matches('/'), run_id));

        info!(%run_id, rows = rows.len(), "Evaluation finished");

        Ok(EvaluationResult {
            evaluation_name: evaluation_name.to_string(),
            run_id,
            started_at,
            rows,
            metrics,
            studio_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LLMError, LLMResponse, TokenUsage};
    use crate::target::{FnTarget, TargetError};
    use async_trait::async_trait;
    use chateval_core::{DatasetRow, TargetOutput};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedJudge {
        reply: &'static str,
    }

    #[async_trait]
    impl LLMClient for FixedJudge {
        async fn evaluate(&self, _prompt: String) -> Result<LLMResponse, LLMError> {
            Ok(LLMResponse {
                content: self.reply.to_string(),
                usage: TokenUsage::default(),
                model: "fixed-judge".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "fixed-judge"
        }
    }

    fn runner(reply: &'static str) -> EvaluationRunner {
        EvaluationRunner::new(Arc::new(FixedJudge { reply }))
    }

    fn dataset(rows: &[Value]) -> Dataset {
        Dataset::new(
            rows.iter()
                .map(|value| {
                    let Value::Object(fields) = value.clone() else {
                        panic!("row must be an object");
                    };
                    DatasetRow::new(fields).unwrap()
                })
                .collect(),
        )
    }

    fn counting_target(calls: Arc<AtomicUsize>, delay: Duration) -> Arc<dyn Target> {
        Arc::new(FnTarget::new(move |_row: DatasetRow| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok::<_, TargetError>(TargetOutput::from_reply("Hello"))
            }
        }))
    }

    fn echo_target() -> Arc<dyn Target> {
        Arc::new(FnTarget::new(|row: DatasetRow| async move {
            let prompt = row.chat_input().unwrap_or_default().to_string();
            Ok::<_, TargetError>(TargetOutput::from_reply(prompt))
        }))
    }

    fn plan(runner: &EvaluationRunner, names: &[&str]) -> MetricPlan {
        resolve_metrics(names, &runner.llm_client).unwrap()
    }

    #[tokio::test]
    async fn test_latency_metric_times_each_row() {
        let runner = runner("{}");
        let calls = Arc::new(AtomicUsize::new(0));
        let target = counting_target(calls.clone(), Duration::from_millis(100));
        let data = dataset(&[json!({"chat_input": "Hi"}), json!({"chat_input": "Bye"})]);

        let result = runner
            .run_dataset(target, "latency-run", &plan(&runner, &["latency"]), &data)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.rows.len(), 2);
        for (row, prompt) in result.rows.iter().zip(["Hi", "Bye"]) {
            assert_eq!(row.get("inputs.chat_input"), Some(&json!(prompt)));
            assert_eq!(row.get("outputs.reply"), Some(&json!("Hello")));

            let latency = row.get("outputs.latency").and_then(Value::as_f64).unwrap();
            assert!(latency >= 0.1, "latency {latency} below target sleep");
            assert_eq!(row.get("outputs.latency.latency"), row.get("outputs.latency"));
        }
        assert!(result.metrics["latency.latency"] >= 0.1);
    }

    #[tokio::test]
    async fn test_rows_follow_dataset_order() {
        let runner = runner("{}");
        let f1 = plan(&runner, &["f1score"]);

        for size in [0usize, 1, 5] {
            let rows: Vec<Value> = (0..size)
                .map(|i| {
                    let prompt = format!("prompt {i}");
                    json!({"chat_input": prompt, "ground_truth": prompt})
                })
                .collect();
            let result = runner
                .run_dataset(echo_target(), "order", &f1, &dataset(&rows))
                .await
                .unwrap();

            assert_eq!(result.rows.len(), size);
            for (i, row) in result.rows.iter().enumerate() {
                let expected = format!("prompt {i}");
                assert_eq!(row.get("inputs.chat_input"), Some(&json!(expected)));
                assert_eq!(row.get("outputs.reply"), Some(&json!(expected)));
                assert_eq!(row.get("outputs.f1score.f1_score"), Some(&json!(1.0)));
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_metric_never_calls_target() {
        let runner = runner("{}");
        let calls = Arc::new(AtomicUsize::new(0));
        let target = counting_target(calls.clone(), Duration::ZERO);

        let request = RunRequest::new("bad", "/nonexistent/data.jsonl", ["coherence", "bleu"]);
        let err = runner.run(target.clone(), &request).await.unwrap_err();
        assert!(matches!(err, EvalError::UnknownMetric(name) if name == "bleu"));

        let request = RunRequest::new("chat", "/nonexistent/data.jsonl", ["chat"]);
        let err = runner.run(target, &request).await.unwrap_err();
        assert!(matches!(err, EvalError::UnknownMetric(name) if name == "chat"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_ground_truth_fails_run() {
        let runner = runner("{}");
        let data = dataset(&[
            json!({"chat_input": "Hi", "ground_truth": "Hi"}),
            json!({"chat_input": "Bye"}),
        ]);

        let err = runner
            .run_dataset(echo_target(), "f1", &plan(&runner, &["f1score"]), &data)
            .await
            .unwrap_err();

        match err {
            EvalError::MissingField { row, metric, argument, binding } => {
                assert_eq!(row, 1);
                assert_eq!(metric, "f1score");
                assert_eq!(argument, "ground_truth");
                assert_eq!(binding, "${data.ground_truth}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_target_failure_aborts() {
        let runner = runner("{}");
        let target: Arc<dyn Target> = Arc::new(FnTarget::new(|_row: DatasetRow| async move {
            Err::<TargetOutput, _>(TargetError::Failed("upstream down".to_string()))
        }));
        let data = dataset(&[json!({"chat_input": "Hi"})]);

        let err = runner
            .run_dataset(target, "down", &plan(&runner, &["latency"]), &data)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::TargetFailed { row: 0, .. }));
    }

    #[tokio::test]
    async fn test_judge_scores_are_aggregated() {
        let runner = runner(r#"{"score": 4, "reason": "Clear."}"#);
        let data = dataset(&[json!({"chat_input": "Hi"}), json!({"chat_input": "Bye"})]);

        let result = runner
            .run_dataset(echo_target(), "judge", &plan(&runner, &["coherence", "fluency"]), &data)
            .await
            .unwrap();

        let row = &result.rows[0];
        assert_eq!(row.get("outputs.coherence.gpt_coherence"), Some(&json!(4.0)));
        assert_eq!(row.get("outputs.coherence.gpt_coherence_reason"), Some(&json!("Clear.")));
        assert_eq!(row.get("outputs.fluency.gpt_fluency"), Some(&json!(4.0)));

        assert_eq!(result.metrics["coherence.gpt_coherence"], 4.0);
        assert_eq!(result.metrics["fluency.gpt_fluency"], 4.0);
        assert!(!result.metrics.contains_key("coherence.gpt_coherence_reason"));
    }

    #[tokio::test]
    async fn test_evaluator_error_policy() {
        let data = dataset(&[json!({"chat_input": "Hi"})]);

        let abort = runner("not json");
        let err = abort
            .run_dataset(echo_target(), "abort", &plan(&abort, &["coherence"]), &data)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::EvaluatorFailed { row: 0, ref metric, .. } if metric == "coherence"
        ));

        let skip = runner("not json").with_error_policy(EvaluatorErrorPolicy::Skip);
        let result = skip
            .run_dataset(echo_target(), "skip", &plan(&skip, &["coherence", "latency"]), &data)
            .await
            .unwrap();

        let row = &result.rows[0];
        assert!(row.get("outputs.coherence.gpt_coherence").is_none());
        assert!(row.get("outputs.latency.latency").is_some());
        assert!(!result.metrics.contains_key("coherence.gpt_coherence"));
    }

    #[tokio::test]
    async fn test_studio_url_and_run_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"chat_input": "Hi"}}"#).unwrap();

        let studio_runner = runner("{}").with_studio_base_url(Some("https://studio.example/".to_string()));
        let request = RunRequest::new("from-file", file.path(), ["latency"]);
        let result = studio_runner.run(echo_target(), &request).await.unwrap();

        assert_eq!(result.evaluation_name, "from-file");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(
            result.studio_url,
            Some(format!("https://studio.example/runs/{}", result.run_id))
        );

        let without = runner("{}").run(echo_target(), &request).await.unwrap();
        assert!(without.studio_url.is_none());
    }
}
