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

//! Chateval Core
//!
//! Data model shared by the evaluation harness: dataset rows, target outputs,
//! result rows, metric values, and judge/run configuration.

pub mod config;
pub mod dataset;
pub mod eval_result;

pub use config::{
    ConfigError, Credential, CredentialSettings, EnvTokenProvider, EvaluatorErrorPolicy,
    ModelConfig, ModelSettings, RunOptions, RunSettings, StaticTokenProvider, TokenProvider,
    COGNITIVE_SERVICES_SCOPE, DEFAULT_API_VERSION, DEFAULT_EVALUATION_MODEL,
    DEFAULT_EVALUATION_NAME,
};
pub use dataset::{Dataset, DatasetError, DatasetRow, RowError, PROMPT_FIELD};
pub use eval_result::{
    EvalScores, MetricValue, ResultRow, TargetOutput, INPUTS_PREFIX, OUTPUTS_PREFIX,
};
