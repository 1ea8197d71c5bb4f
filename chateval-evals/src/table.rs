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

//! Tabular view of an evaluation run
//!
//! One row per dataset record. Columns are the union of all row keys, in the
//! order they are first seen; a row without a column reads as empty.

use chateval_core::ResultRow;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::runner::EvaluationResult;
use crate::EvalError;

/// Widest cell rendered by the text view before truncation
const MAX_CELL_WIDTH: usize = 40;

/// Result rows with a stable column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn from_rows(rows: Vec<ResultRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for column in row.columns() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row`, `column`; `None` when the row lacks that column
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// All values of one column, `Value::Null` where a row lacks it
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Serialize as JSON Lines: one compact object per row, newline terminated
    pub fn to_jsonl(&self) -> Result<String, EvalError> {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<(), EvalError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_jsonl()?)?;
        Ok(())
    }

    /// Read back a table written by [`ResultTable::to_jsonl`]
    pub fn from_jsonl_str(content: &str) -> Result<Self, EvalError> {
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<ResultRow>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rows(rows))
    }
}

fn cell_text(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let text = text.replace('\n', " ");
    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return writeln!(f, "(no rows)");
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| self.columns.iter().map(|c| cell_text(row.get(c))).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, width)| format!("{name:<width$}"))
            .collect();
        writeln!(f, "{}", header.join(" | ").trim_end())?;

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-"))?;

        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            writeln!(f, "{}", line.join(" | ").trim_end())?;
        }
        Ok(())
    }
}

/// Build the result table for a run, writing it as JSON Lines when
/// `output_path` is given.
pub fn materialize(
    result: &EvaluationResult,
    output_path: Option<&Path>,
) -> Result<ResultTable, EvalError> {
    let table = ResultTable::from_rows(result.rows.clone());

    if let Some(path) = output_path {
        table.write_jsonl(path)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            "Wrote evaluation results"
        );
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn row(value: Value) -> ResultRow {
        serde_json::from_value(value).unwrap()
    }

    fn result(rows: Vec<ResultRow>) -> EvaluationResult {
        EvaluationResult {
            evaluation_name: "table".to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            rows,
            metrics: BTreeMap::new(),
            studio_url: None,
        }
    }

    #[test]
    fn test_columns_union_in_first_seen_order() {
        let table = ResultTable::from_rows(vec![
            row(json!({"inputs.chat_input": "Hi", "outputs.reply": "Hello"})),
            row(json!({
                "inputs.chat_input": "Bye",
                "outputs.latency": 0.2,
                "outputs.reply": "Ciao",
            })),
        ]);

        assert_eq!(
            table.columns(),
            &["inputs.chat_input", "outputs.reply", "outputs.latency"]
        );
        assert_eq!(table.get(1, "outputs.latency"), Some(&json!(0.2)));
        assert_eq!(table.get(0, "outputs.latency"), None);
        assert_eq!(table.column("outputs.latency"), vec![Value::Null, json!(0.2)]);
    }

    #[test]
    fn test_jsonl_is_one_line_per_row() {
        let table = ResultTable::from_rows(vec![
            row(json!({"inputs.chat_input": "Hi"})),
            row(json!({"inputs.chat_input": "Bye"})),
        ]);
        let jsonl = table.to_jsonl().unwrap();

        assert_eq!(
            jsonl,
            "{\"inputs.chat_input\":\"Hi\"}\n{\"inputs.chat_input\":\"Bye\"}\n"
        );
        assert_eq!(ResultTable::from_jsonl_str(&jsonl).unwrap(), table);
        assert_eq!(ResultTable::default().to_jsonl().unwrap(), "");
    }

    #[test]
    fn test_materialize_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("out.jsonl");
        let run = result(vec![row(json!({"inputs.chat_input": "Hi", "outputs.reply": "Hello"}))]);

        let table = materialize(&run, Some(path.as_path())).unwrap();
        assert_eq!(table.len(), 1);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(ResultTable::from_jsonl_str(&written).unwrap(), table);

        let in_memory = materialize(&run, None).unwrap();
        assert_eq!(in_memory, table);
    }

    #[test]
    fn test_text_rendering() {
        let table = ResultTable::from_rows(vec![row(json!({
            "inputs.chat_input": "Hi",
            "outputs.reply": "x".repeat(60),
        }))]);
        let text = table.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("inputs.chat_input | outputs.reply"));
        assert!(lines[2].ends_with("..."));
        assert_eq!(ResultTable::default().to_string(), "(no rows)\n");
    }
}
