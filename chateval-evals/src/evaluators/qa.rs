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

//! Composite question-answering evaluator
//!
//! Runs every rating plus F1 against one set of arguments and merges their
//! scores, so a single `qa` metric yields several score columns.

use crate::evaluators::f1::F1ScoreEvaluator;
use crate::evaluators::judge::{RatingEvaluator, RatingKind};
use crate::llm_client::LLMClient;
use crate::{EvalArgs, EvalError, EvalScores, Evaluator, EvaluatorMetadata};
use async_trait::async_trait;
use std::sync::Arc;

pub struct QAEvaluator {
    parts: Vec<Box<dyn Evaluator>>,
}

impl QAEvaluator {
    pub fn new(llm_client: Arc<dyn LLMClient>) -> Self {
        let ratings = [
            RatingKind::Groundedness,
            RatingKind::Relevance,
            RatingKind::Coherence,
            RatingKind::Fluency,
            RatingKind::Similarity,
        ];

        let mut parts: Vec<Box<dyn Evaluator>> = ratings
            .into_iter()
            .map(|kind| {
                Box::new(RatingEvaluator::new(kind, llm_client.clone())) as Box<dyn Evaluator>
            })
            .collect();
        parts.push(Box::new(F1ScoreEvaluator::new()));

        Self { parts }
    }
}

#[async_trait]
impl Evaluator for QAEvaluator {
    fn id(&self) -> &str {
        "qa_v1"
    }

    fn required_args(&self) -> &[&'static str] {
        &["question", "answer", "context", "ground_truth"]
    }

    async fn evaluate(&self, args: &EvalArgs) -> Result<EvalScores, EvalError> {
        let mut scores = EvalScores::new();

        for part in &self.parts {
            let part_args: EvalArgs = part
                .required_args()
                .iter()
                .filter_map(|name| args.get(*name).map(|v| (name.to_string(), v.clone())))
                .collect();
            scores.extend(part.evaluate(&part_args).await?);
        }

        Ok(scores)
    }

    fn metadata(&self) -> EvaluatorMetadata {
        EvaluatorMetadata {
            name: "QA".to_string(),
            version: "1.0.0".to_string(),
            description: "Groundedness, relevance, coherence, fluency, similarity and F1 in one pass."
                .to_string(),
            uses_judge: true,
            tags: vec!["llm-judge".to_string(), "composite".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LLMError, LLMResponse, TokenUsage};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJudge {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMClient for CountingJudge {
        async fn evaluate(&self, _prompt: String) -> Result<LLMResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LLMResponse {
                content: r#"{"score": 3}"#.to_string(),
                usage: TokenUsage::default(),
                model: "mock-model".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    #[tokio::test]
    async fn test_qa_merges_all_scores() {
        let judge = Arc::new(CountingJudge {
            calls: AtomicUsize::new(0),
        });
        let evaluator = QAEvaluator::new(judge.clone());

        let mut args = EvalArgs::new();
        args.insert("question".to_string(), json!("Capital of France?"));
        args.insert("answer".to_string(), json!("Paris"));
        args.insert("context".to_string(), json!("Paris is the capital of France."));
        args.insert("ground_truth".to_string(), json!("Paris"));

        let scores = evaluator.evaluate(&args).await.unwrap();

        let keys: Vec<&str> = scores.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "f1_score",
                "gpt_coherence",
                "gpt_fluency",
                "gpt_groundedness",
                "gpt_relevance",
                "gpt_similarity"
            ]
        );
        assert_eq!(scores["f1_score"].as_f64(), Some(1.0));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 5);
    }
}
