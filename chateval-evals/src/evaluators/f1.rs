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

//! Token-overlap F1 between an answer and its ground truth
//!
//! Deterministic and local: no judge call. Text is normalized the usual
//! reading-comprehension way before comparison (lowercase, punctuation and
//! English articles removed, whitespace collapsed).

use crate::{arg_text, EvalArgs, EvalError, EvalScores, Evaluator, EvaluatorMetadata, MetricValue};
use async_trait::async_trait;
use std::collections::HashMap;

/// Computes `f1_score` from token overlap
#[derive(Debug, Default)]
pub struct F1ScoreEvaluator;

impl F1ScoreEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Normalize and split text into tokens
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
            .collect::<String>()
            .split_whitespace()
            .filter(|token| !matches!(*token, "a" | "an" | "the"))
            .map(str::to_string)
            .collect()
    }

    /// F1 of clipped token overlap; 0.0 when nothing is shared
    pub fn f1(answer: &str, ground_truth: &str) -> f64 {
        let answer_tokens = Self::tokenize(answer);
        let truth_tokens = Self::tokenize(ground_truth);

        let mut truth_counts: HashMap<&str, usize> = HashMap::new();
        for token in &truth_tokens {
            *truth_counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut common = 0usize;
        for token in &answer_tokens {
            if let Some(count) = truth_counts.get_mut(token.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    common += 1;
                }
            }
        }

        if common == 0 {
            return 0.0;
        }

        let precision = common as f64 / answer_tokens.len() as f64;
        let recall = common as f64 / truth_tokens.len() as f64;
        2.0 * precision * recall / (precision + recall)
    }
}

#[async_trait]
impl Evaluator for F1ScoreEvaluator {
    fn id(&self) -> &str {
        "f1score_v1"
    }

    fn required_args(&self) -> &[&'static str] {
        &["answer", "ground_truth"]
    }

    async fn evaluate(&self, args: &EvalArgs) -> Result<EvalScores, EvalError> {
        let answer = arg_text(args, "answer")?;
        let ground_truth = arg_text(args, "ground_truth")?;

        let mut scores = EvalScores::new();
        scores.insert(
            "f1_score".to_string(),
            MetricValue::Float(Self::f1(&answer, &ground_truth)),
        );
        Ok(scores)
    }

    fn metadata(&self) -> EvaluatorMetadata {
        EvaluatorMetadata {
            name: "F1 Score".to_string(),
            version: "1.0.0".to_string(),
            description: "Token-overlap F1 between the answer and the ground truth.".to_string(),
            uses_judge: false,
            tags: vec!["reference".to_string(), "deterministic".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokenize_normalizes() {
        assert_eq!(
            F1ScoreEvaluator::tokenize("The capital, of France!"),
            vec!["capital", "of", "france"]
        );
    }

    #[test]
    fn test_f1_values() {
        assert_eq!(F1ScoreEvaluator::f1("Paris", "paris."), 1.0);
        assert_eq!(F1ScoreEvaluator::f1("London", "Paris"), 0.0);
        assert_eq!(F1ScoreEvaluator::f1("", "Paris"), 0.0);

        // 2 shared tokens, 5 answer tokens, 2 truth tokens: P=0.4, R=1.0
        let score = F1ScoreEvaluator::f1("it is in paris france", "Paris, France");
        assert!((score - 2.0 * 0.4 * 1.0 / 1.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_reports_f1_score() {
        let mut args = EvalArgs::new();
        args.insert("answer".to_string(), json!("The answer is Paris"));
        args.insert("ground_truth".to_string(), json!("Paris"));

        let scores = F1ScoreEvaluator::new().evaluate(&args).await.unwrap();
        let f1 = scores["f1_score"].as_f64().unwrap();
        assert!((f1 - 0.5).abs() < 1e-9);
    }
}
