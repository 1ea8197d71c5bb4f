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

//! Latency instrumentation for targets
//!
//! [`instrument`] wraps a target so every output carries a `latency` field:
//! wall-clock seconds spent inside the wrapped target call, and nothing else.

use async_trait::async_trait;
use chateval_core::{DatasetRow, TargetOutput};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::target::{Target, TargetError};

/// Output field carrying the measured latency in seconds
pub const LATENCY_FIELD: &str = "latency";

/// Target decorator that times the inner target call
pub struct LatencyTarget {
    inner: Arc<dyn Target>,
}

impl LatencyTarget {
    pub fn new(inner: Arc<dyn Target>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Target for LatencyTarget {
    async fn invoke(&self, row: &DatasetRow) -> Result<TargetOutput, TargetError> {
        let start = Instant::now();
        let output = self.inner.invoke(row).await?;
        let elapsed = start.elapsed().as_secs_f64();

        // A latency reported by the target itself is kept as-is.
        if output.get(LATENCY_FIELD).is_some() {
            debug!("Target already reports latency; measured {:.3}s ignored", elapsed);
            return Ok(output);
        }

        let latency = serde_json::Number::from_f64(elapsed)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        Ok(output.with_field(LATENCY_FIELD, latency))
    }

    fn is_latency_instrumented(&self) -> bool {
        true
    }
}

/// Wrap `target` with latency measurement. Already-instrumented targets are
/// returned unchanged, so applying this twice times the call once.
pub fn instrument(target: Arc<dyn Target>) -> Arc<dyn Target> {
    if target.is_latency_instrumented() {
        target
    } else {
        Arc::new(LatencyTarget::new(target))
    }
}
