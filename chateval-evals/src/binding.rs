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

//! Argument bindings: where each evaluator argument comes from
//!
//! A binding names one evaluator argument and its [`Source`]: a field of the
//! dataset row (`${data.field}`), a field of the target output
//! (`${target.field}`), or a literal value.

use chateval_core::{DatasetRow, TargetOutput};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

use crate::{EvalArgs, EvalError};

/// Where a bound argument's value is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Data(Cow<'static, str>),
    Target(Cow<'static, str>),
    Literal(Cow<'static, str>),
}

impl Source {
    pub const fn data(field: &'static str) -> Self {
        Source::Data(Cow::Borrowed(field))
    }

    pub const fn target(field: &'static str) -> Self {
        Source::Target(Cow::Borrowed(field))
    }

    pub const fn literal(value: &'static str) -> Self {
        Source::Literal(Cow::Borrowed(value))
    }

    /// Parse the `${data.field}` / `${target.field}` reference syntax.
    /// Anything else is taken as a literal.
    pub fn parse(reference: &str) -> Self {
        let inner = reference
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'));

        match inner {
            Some(path) => {
                if let Some(field) = path.strip_prefix("data.") {
                    Source::Data(Cow::Owned(field.to_string()))
                } else if let Some(field) = path.strip_prefix("target.") {
                    Source::Target(Cow::Owned(field.to_string()))
                } else {
                    Source::Literal(Cow::Owned(reference.to_string()))
                }
            }
            None => Source::Literal(Cow::Owned(reference.to_string())),
        }
    }

    /// Look the value up for one row. JSON `null` counts as absent.
    pub fn resolve(&self, data: &DatasetRow, output: &TargetOutput) -> Option<Value> {
        let value = match self {
            Source::Data(field) => data.get(field).cloned(),
            Source::Target(field) => output.get(field).cloned(),
            Source::Literal(value) => Some(Value::String(value.to_string())),
        };
        value.filter(|v| !v.is_null())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Data(field) => write!(f, "${{data.{field}}}"),
            Source::Target(field) => write!(f, "${{target.{field}}}"),
            Source::Literal(value) => f.write_str(value),
        }
    }
}

/// One evaluator argument and where it is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub argument: &'static str,
    pub source: Source,
}

impl Binding {
    pub const fn new(argument: &'static str, source: Source) -> Self {
        Self { argument, source }
    }
}

/// Build the evaluator arguments for one row.
///
/// Every binding must resolve; the first absent field fails the row with
/// [`EvalError::MissingField`] rather than scoring against an empty value.
pub fn resolve_arguments(
    row_index: usize,
    metric: &str,
    bindings: &[Binding],
    data: &DatasetRow,
    output: &TargetOutput,
) -> Result<EvalArgs, EvalError> {
    let mut args = EvalArgs::new();

    for binding in bindings {
        let value = binding
            .source
            .resolve(data, output)
            .ok_or_else(|| EvalError::MissingField {
                row: row_index,
                metric: metric.to_string(),
                argument: binding.argument.to_string(),
                binding: binding.source.to_string(),
            })?;
        args.insert(binding.argument.to_string(), value);
    }

    Ok(args)
}
