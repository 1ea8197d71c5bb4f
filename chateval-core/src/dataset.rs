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

//! Evaluation datasets loaded from JSON Lines files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Field every dataset row must carry: the prompt sent to the target.
pub const PROMPT_FIELD: &str = "chat_input";

/// Errors raised while loading a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Line {line}: expected a JSON object")]
    NotAnObject { line: usize },

    #[error("Line {line}: {source}")]
    InvalidRow {
        line: usize,
        #[source]
        source: RowError,
    },
}

/// Why a record cannot be used as a dataset row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing required field `chat_input`")]
    MissingPrompt,

    #[error("field `chat_input` must be a string")]
    PromptNotString,
}

/// A single record of the evaluation dataset
///
/// Rows are read-only once loaded. Values keep their JSON type so the target
/// receives exactly what the file contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetRow {
    fields: Map<String, Value>,
}

impl DatasetRow {
    /// Build a row, rejecting records whose prompt is absent or not a string
    pub fn new(fields: Map<String, Value>) -> Result<Self, RowError> {
        match fields.get(PROMPT_FIELD) {
            None => return Err(RowError::MissingPrompt),
            Some(Value::String(_)) => {}
            Some(_) => return Err(RowError::PromptNotString),
        }
        Ok(Self { fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The prompt text. Always present for rows built through [`DatasetRow::new`].
    pub fn chat_input(&self) -> Option<&str> {
        self.fields.get(PROMPT_FIELD).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// An ordered collection of dataset rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn new(rows: Vec<DatasetRow>) -> Self {
        Self { rows }
    }

    /// Load a JSON Lines file; one object per non-blank line
    pub fn from_jsonl_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_jsonl_str(&content)
    }

    /// Parse JSON Lines content. Line numbers in errors are 1-based.
    pub fn from_jsonl_str(content: &str) -> Result<Self, DatasetError> {
        let mut rows = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(trimmed).map_err(|source| DatasetError::Json {
                line: line_no,
                source,
            })?;

            let Value::Object(fields) = value else {
                return Err(DatasetError::NotAnObject { line: line_no });
            };

            let row = DatasetRow::new(fields).map_err(|source| DatasetError::InvalidRow {
                line: line_no,
                source,
            })?;
            rows.push(row);
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
