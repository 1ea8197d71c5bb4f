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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::dataset::DatasetRow;

/// Column prefix for dataset fields in a result row
pub const INPUTS_PREFIX: &str = "inputs.";

/// Column prefix for target output fields and evaluator scores
pub const OUTPUTS_PREFIX: &str = "outputs.";

/// Type-safe metric values for evaluation outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Json(Value),
}

impl MetricValue {
    /// Numeric view used for aggregation. Booleans and strings are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            MetricValue::Int(v) => Some(*v as f64),
            MetricValue::Json(v) => v.as_f64(),
            MetricValue::Bool(_) | MetricValue::String(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Int(v) => Value::from(*v),
            MetricValue::Bool(v) => Value::Bool(*v),
            MetricValue::String(v) => Value::String(v.clone()),
            MetricValue::Json(v) => v.clone(),
        }
    }
}

impl From<Value> for MetricValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) if n.is_i64() => MetricValue::Int(n.as_i64().unwrap_or_default()),
            Value::Number(n) => match n.as_f64() {
                Some(v) => MetricValue::Float(v),
                None => MetricValue::Json(Value::Number(n)),
            },
            Value::Bool(b) => MetricValue::Bool(b),
            Value::String(s) => MetricValue::String(s),
            other => MetricValue::Json(other),
        }
    }
}

/// Scores produced by one evaluator for one row, keyed by score name
pub type EvalScores = BTreeMap<String, MetricValue>;

/// Record returned by the target for one dataset row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetOutput {
    fields: Map<String, Value>,
}

impl TargetOutput {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Output carrying just a reply
    pub fn from_reply(reply: impl Into<String>) -> Self {
        Self::default().with_field("reply", Value::String(reply.into()))
    }

    /// Return a copy of this output with `name` set to `value`
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn reply(&self) -> Option<&str> {
        self.fields.get("reply").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// One row of the evaluation result: inputs, outputs and scores flattened
///
/// Keys follow `inputs.<field>`, `outputs.<field>` and
/// `outputs.<metric>.<score>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow {
    columns: BTreeMap<String, Value>,
}

impl ResultRow {
    /// Assemble a row from the dataset record, the target output and the
    /// per-metric scores, in that order.
    pub fn assemble<'a>(
        data: &DatasetRow,
        output: &TargetOutput,
        scores: impl IntoIterator<Item = (&'a str, &'a EvalScores)>,
    ) -> Self {
        let mut columns = BTreeMap::new();

        for (name, value) in data.fields() {
            columns.insert(format!("{INPUTS_PREFIX}{name}"), value.clone());
        }
        for (name, value) in output.fields() {
            columns.insert(format!("{OUTPUTS_PREFIX}{name}"), value.clone());
        }
        for (metric, metric_scores) in scores {
            for (score_name, value) in metric_scores {
                columns.insert(
                    format!("{OUTPUTS_PREFIX}{metric}.{score_name}"),
                    value.to_json(),
                );
            }
        }

        Self { columns }
    }

    pub fn from_columns(columns: BTreeMap<String, Value>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
