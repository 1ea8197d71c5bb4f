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

//! Metric registry: the closed set of metrics and their argument bindings
//!
//! Each [`MetricDescriptor`] says which evaluator to build for a metric and
//! where each of its arguments comes from. The table is static; resolving a
//! request only looks entries up, builds the evaluators and decides whether
//! the target needs latency instrumentation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::binding::{Binding, Source};
use crate::evaluators::{F1ScoreEvaluator, FieldEvaluator, QAEvaluator, RatingEvaluator};
use crate::latency;
use crate::llm_client::LLMClient;
use crate::target::Target;
use crate::{EvalError, Evaluator};

/// Every metric name the CLI accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Coherence,
    F1Score,
    Fluency,
    Groundedness,
    Relevance,
    Similarity,
    Qa,
    /// Accepted by the command line but has no registered evaluator
    Chat,
    Latency,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Coherence,
        Metric::F1Score,
        Metric::Fluency,
        Metric::Groundedness,
        Metric::Relevance,
        Metric::Similarity,
        Metric::Qa,
        Metric::Chat,
        Metric::Latency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Coherence => "coherence",
            Metric::F1Score => "f1score",
            Metric::Fluency => "fluency",
            Metric::Groundedness => "groundedness",
            Metric::Relevance => "relevance",
            Metric::Similarity => "similarity",
            Metric::Qa => "qa",
            Metric::Chat => "chat",
            Metric::Latency => "latency",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Metric::as_str).collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| EvalError::UnknownMetric(s.to_string()))
    }
}

type BuildEvaluator = fn(&Arc<dyn LLMClient>) -> Arc<dyn Evaluator>;

/// Registry entry for one metric
pub struct MetricDescriptor {
    pub metric: Metric,
    /// One entry per evaluator argument
    pub bindings: &'static [Binding],
    /// The target must be wrapped with latency measurement
    pub instruments_latency: bool,
    build: BuildEvaluator,
}

impl MetricDescriptor {
    pub fn build(&self, llm_client: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
        (self.build)(llm_client)
    }

    /// Bindings in their `${source.field}` text form, keyed by argument
    pub fn binding_map(&self) -> BTreeMap<String, String> {
        self.bindings
            .iter()
            .map(|b| (b.argument.to_string(), b.source.to_string()))
            .collect()
    }
}

fn build_coherence(llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(RatingEvaluator::coherence(llm.clone()))
}

fn build_fluency(llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(RatingEvaluator::fluency(llm.clone()))
}

fn build_groundedness(llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(RatingEvaluator::groundedness(llm.clone()))
}

fn build_relevance(llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(RatingEvaluator::relevance(llm.clone()))
}

fn build_similarity(llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(RatingEvaluator::similarity(llm.clone()))
}

fn build_qa(llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(QAEvaluator::new(llm.clone()))
}

fn build_f1(_llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(F1ScoreEvaluator::new())
}

fn build_latency(_llm: &Arc<dyn LLMClient>) -> Arc<dyn Evaluator> {
    Arc::new(FieldEvaluator::latency())
}

const QUESTION: Binding = Binding::new("question", Source::data("chat_input"));
const ANSWER: Binding = Binding::new("answer", Source::target("reply"));
const CONTEXT: Binding = Binding::new("context", Source::target("context"));
const GROUND_TRUTH: Binding = Binding::new("ground_truth", Source::data("ground_truth"));
const LATENCY: Binding = Binding::new("latency", Source::target(latency::LATENCY_FIELD));

static REGISTRY: &[MetricDescriptor] = &[
    MetricDescriptor {
        metric: Metric::Coherence,
        bindings: &[QUESTION, ANSWER],
        instruments_latency: false,
        build: build_coherence,
    },
    MetricDescriptor {
        metric: Metric::F1Score,
        bindings: &[ANSWER, GROUND_TRUTH],
        instruments_latency: false,
        build: build_f1,
    },
    MetricDescriptor {
        metric: Metric::Fluency,
        bindings: &[QUESTION, ANSWER],
        instruments_latency: false,
        build: build_fluency,
    },
    MetricDescriptor {
        metric: Metric::Groundedness,
        bindings: &[ANSWER, CONTEXT],
        instruments_latency: false,
        build: build_groundedness,
    },
    MetricDescriptor {
        metric: Metric::Relevance,
        bindings: &[QUESTION, ANSWER, CONTEXT],
        instruments_latency: false,
        build: build_relevance,
    },
    MetricDescriptor {
        metric: Metric::Similarity,
        bindings: &[QUESTION, ANSWER, GROUND_TRUTH],
        instruments_latency: false,
        build: build_similarity,
    },
    MetricDescriptor {
        metric: Metric::Qa,
        bindings: &[QUESTION, ANSWER, CONTEXT, GROUND_TRUTH],
        instruments_latency: false,
        build: build_qa,
    },
    MetricDescriptor {
        metric: Metric::Latency,
        bindings: &[LATENCY],
        instruments_latency: true,
        build: build_latency,
    },
];

/// Registry entry for `metric`, or `None` for metrics without an evaluator
pub fn descriptor(metric: Metric) -> Option<&'static MetricDescriptor> {
    REGISTRY.iter().find(|d| d.metric == metric)
}

/// Look a metric up by name; unknown and unregistered names both fail
pub fn lookup(name: &str) -> Result<&'static MetricDescriptor, EvalError> {
    let metric: Metric = name.parse()?;
    descriptor(metric).ok_or_else(|| EvalError::UnknownMetric(name.to_string()))
}

/// One resolved metric: its evaluator and bindings
#[derive(Clone)]
pub struct PlannedMetric {
    pub metric: Metric,
    pub evaluator: Arc<dyn Evaluator>,
    pub bindings: &'static [Binding],
}

/// Everything a run needs to know about the requested metrics
pub struct MetricPlan {
    metrics: Vec<PlannedMetric>,
    instrument_latency: bool,
}

impl MetricPlan {
    /// Metrics in request order
    pub fn metrics(&self) -> &[PlannedMetric] {
        &self.metrics
    }

    pub fn requires_latency(&self) -> bool {
        self.instrument_latency
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.metric.as_str()).collect()
    }

    /// Wrap the target with latency measurement if any metric needs it.
    /// Safe to call more than once.
    pub fn prepare_target(&self, target: Arc<dyn Target>) -> Arc<dyn Target> {
        if self.instrument_latency {
            latency::instrument(target)
        } else {
            target
        }
    }

    /// Combined binding configuration, metric → argument → source
    pub fn evaluator_config(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.metrics
            .iter()
            .map(|m| {
                let bindings = m
                    .bindings
                    .iter()
                    .map(|b| (b.argument.to_string(), b.source.to_string()))
                    .collect();
                (m.metric.as_str().to_string(), bindings)
            })
            .collect()
    }
}

/// Resolve requested metric names into a plan.
///
/// Every name is validated before any evaluator is built, so a bad request
/// fails before the dataset is touched. Repeated names are collapsed.
pub fn resolve_metrics<S: AsRef<str>>(
    names: &[S],
    llm_client: &Arc<dyn LLMClient>,
) -> Result<MetricPlan, EvalError> {
    if names.is_empty() {
        return Err(EvalError::InvalidInput(
            "At least one metric is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();
    for name in names {
        let descriptor = lookup(name.as_ref())?;
        if seen.insert(descriptor.metric) {
            descriptors.push(descriptor);
        } else {
            warn!(metric = name.as_ref(), "Metric requested more than once; ignoring repeat");
        }
    }

    let instrument_latency = descriptors.iter().any(|d| d.instruments_latency);
    let metrics = descriptors
        .into_iter()
        .map(|d| PlannedMetric {
            metric: d.metric,
            evaluator: d.build(llm_client),
            bindings: d.bindings,
        })
        .collect();

    Ok(MetricPlan {
        metrics,
        instrument_latency,
    })
}
