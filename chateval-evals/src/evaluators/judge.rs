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

//! LLM-as-judge rating evaluators
//!
//! Each rating asks the judge model for a 1-5 score on one quality aspect and
//! reports it as `gpt_<aspect>`, with the judge's reason as
//! `gpt_<aspect>_reason` when one is given.

use crate::llm_client::LLMClient;
use crate::{arg_text, EvalArgs, EvalError, EvalScores, Evaluator, EvaluatorMetadata, MetricValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Lowest and highest score the judge may return
pub const RATING_SCALE: (f64, f64) = (1.0, 5.0);

/// The quality aspect a [`RatingEvaluator`] scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingKind {
    Coherence,
    Fluency,
    Groundedness,
    Relevance,
    Similarity,
}

impl RatingKind {
    pub fn id(&self) -> &'static str {
        match self {
            RatingKind::Coherence => "coherence_v1",
            RatingKind::Fluency => "fluency_v1",
            RatingKind::Groundedness => "groundedness_v1",
            RatingKind::Relevance => "relevance_v1",
            RatingKind::Similarity => "similarity_v1",
        }
    }

    /// Name of the score this rating produces
    pub fn score_key(&self) -> &'static str {
        match self {
            RatingKind::Coherence => "gpt_coherence",
            RatingKind::Fluency => "gpt_fluency",
            RatingKind::Groundedness => "gpt_groundedness",
            RatingKind::Relevance => "gpt_relevance",
            RatingKind::Similarity => "gpt_similarity",
        }
    }

    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            RatingKind::Coherence | RatingKind::Fluency => &["question", "answer"],
            RatingKind::Groundedness => &["answer", "context"],
            RatingKind::Relevance => &["question", "answer", "context"],
            RatingKind::Similarity => &["question", "answer", "ground_truth"],
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            RatingKind::Coherence => {
                "Rate the COHERENCE of the ANSWER. Coherence measures how well all the sentences \
fit together and sound natural as a whole. Consider the overall quality of the answer \
and whether it reads as one well-organized response to the QUESTION."
            }
            RatingKind::Fluency => {
                "Rate the FLUENCY of the ANSWER. Fluency measures the quality of individual \
sentences: whether they are well-written and grammatically correct. Consider the \
quality of individual sentences when rating, not their relevance to the QUESTION."
            }
            RatingKind::Groundedness => {
                "Rate how GROUNDED the ANSWER is in the CONTEXT. An answer is grounded when every \
claim it makes can be inferred from the CONTEXT. Give the lowest score when the \
answer contradicts or goes beyond the CONTEXT, the highest when it is fully supported."
            }
            RatingKind::Relevance => {
                "Rate the RELEVANCE of the ANSWER. Relevance measures how well the ANSWER addresses \
the main aspects of the QUESTION, based on the CONTEXT. Consider whether all and only \
the important aspects are covered."
            }
            RatingKind::Similarity => {
                "Rate the SIMILARITY between the ANSWER and the GROUND TRUTH for the given QUESTION. \
Similarity measures how closely the ANSWER matches the GROUND TRUTH in meaning, \
regardless of wording."
            }
        }
    }

    fn label(arg: &str) -> &'static str {
        match arg {
            "question" => "QUESTION",
            "answer" => "ANSWER",
            "context" => "CONTEXT",
            "ground_truth" => "GROUND TRUTH",
            _ => "INPUT",
        }
    }
}

/// Judge-backed 1-5 rating of one quality aspect
pub struct RatingEvaluator {
    kind: RatingKind,
    llm_client: Arc<dyn LLMClient>,
}

impl RatingEvaluator {
    pub fn new(kind: RatingKind, llm_client: Arc<dyn LLMClient>) -> Self {
        Self { kind, llm_client }
    }

    pub fn coherence(llm_client: Arc<dyn LLMClient>) -> Self {
        Self::new(RatingKind::Coherence, llm_client)
    }

    pub fn fluency(llm_client: Arc<dyn LLMClient>) -> Self {
        Self::new(RatingKind::Fluency, llm_client)
    }

    pub fn groundedness(llm_client: Arc<dyn LLMClient>) -> Self {
        Self::new(RatingKind::Groundedness, llm_client)
    }

    pub fn relevance(llm_client: Arc<dyn LLMClient>) -> Self {
        Self::new(RatingKind::Relevance, llm_client)
    }

    pub fn similarity(llm_client: Arc<dyn LLMClient>) -> Self {
        Self::new(RatingKind::Similarity, llm_client)
    }

    pub fn kind(&self) -> RatingKind {
        self.kind
    }

    fn build_prompt(&self, args: &EvalArgs) -> Result<String, EvalError> {
        let mut prompt = String::from(self.kind.instructions());
        prompt.push_str("\n\nUse an integer scale from 1 (very poor) to 5 (excellent).\n");

        for arg in self.kind.required_args() {
            let text = arg_text(args, arg)?;
            prompt.push_str(&format!("\n{}:\n{}\n", RatingKind::label(arg), text));
        }

        prompt.push_str(
            "\nRespond in JSON format:\n{\n  \"score\": <integer 1-5>,\n  \"reason\": \"one sentence\"\n}",
        );
        Ok(prompt)
    }
}

/// Read the judge's score, accepting numbers or numeric strings
fn parse_score(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl Evaluator for RatingEvaluator {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn required_args(&self) -> &[&'static str] {
        self.kind.required_args()
    }

    async fn evaluate(&self, args: &EvalArgs) -> Result<EvalScores, EvalError> {
        let prompt = self.build_prompt(args)?;
        let response = self.llm_client.evaluate(prompt).await?;

        let json = response.as_json().map_err(|e| {
            EvalError::LLMClientError(format!("Failed to parse rating JSON: {}", e))
        })?;

        let score = parse_score(&json["score"])
            .ok_or_else(|| EvalError::LLMClientError("Missing score in rating".to_string()))?;

        let (low, high) = RATING_SCALE;
        if !(low..=high).contains(&score) {
            return Err(EvalError::LLMClientError(format!(
                "Rating {} outside {}-{}",
                score, low, high
            )));
        }
        debug!(evaluator = self.id(), score, "judge rating received");

        let mut scores = EvalScores::new();
        scores.insert(self.kind.score_key().to_string(), MetricValue::Float(score));
        if let Some(reason) = json["reason"].as_str() {
            scores.insert(
                format!("{}_reason", self.kind.score_key()),
                MetricValue::String(reason.to_string()),
            );
        }
        Ok(scores)
    }

    fn metadata(&self) -> EvaluatorMetadata {
        EvaluatorMetadata {
            name: format!("{:?} Rating", self.kind),
            version: "1.0.0".to_string(),
            description: self.kind.instructions().to_string(),
            uses_judge: true,
            tags: vec!["llm-judge".to_string(), "quality".to_string()],
        }
    }
}
