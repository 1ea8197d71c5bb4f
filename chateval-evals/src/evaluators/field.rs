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

//! Pass-through evaluator that reports a bound field as its score
//!
//! Used for signals the target run already measured, such as latency.

use crate::{EvalArgs, EvalError, EvalScores, Evaluator, EvaluatorMetadata, MetricValue};
use async_trait::async_trait;

/// Reports the argument named after the metric unchanged
pub struct FieldEvaluator {
    id: String,
    field: &'static str,
    required: [&'static str; 1],
}

impl FieldEvaluator {
    pub fn new(field: &'static str) -> Self {
        Self {
            id: format!("{field}_v1"),
            field,
            required: [field],
        }
    }

    pub fn latency() -> Self {
        Self::new(crate::latency::LATENCY_FIELD)
    }
}

#[async_trait]
impl Evaluator for FieldEvaluator {
    fn id(&self) -> &str {
        &self.id
    }

    fn required_args(&self) -> &[&'static str] {
        &self.required
    }

    async fn evaluate(&self, args: &EvalArgs) -> Result<EvalScores, EvalError> {
        let value = args
            .get(self.field)
            .cloned()
            .ok_or_else(|| EvalError::MissingArgument(self.field.to_string()))?;

        let mut scores = EvalScores::new();
        scores.insert(self.field.to_string(), MetricValue::from(value));
        Ok(scores)
    }

    fn metadata(&self) -> EvaluatorMetadata {
        EvaluatorMetadata {
            name: format!("Field `{}`", self.field),
            version: "1.0.0".to_string(),
            description: "Reports a measured field of the target output as a metric.".to_string(),
            uses_judge: false,
            tags: vec!["passthrough".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_latency_passthrough() {
        let evaluator = FieldEvaluator::latency();
        assert_eq!(evaluator.id(), "latency_v1");
        assert_eq!(evaluator.required_args(), &["latency"]);

        let mut args = EvalArgs::new();
        args.insert("latency".to_string(), json!(0.125));

        let scores = evaluator.evaluate(&args).await.unwrap();
        assert_eq!(scores["latency"], MetricValue::Float(0.125));
    }

    #[tokio::test]
    async fn test_missing_field() {
        let result = FieldEvaluator::new("tokens").evaluate(&EvalArgs::new()).await;
        assert!(matches!(result, Err(EvalError::MissingArgument(_))));
    }
}
