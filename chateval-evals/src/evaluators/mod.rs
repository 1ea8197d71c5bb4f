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

//! Built-in evaluators for the registered metrics

pub mod f1;
pub mod field;
pub mod judge;
pub mod qa;

pub use f1::F1ScoreEvaluator;
pub use field::FieldEvaluator;
pub use judge::{RatingEvaluator, RatingKind, RATING_SCALE};
pub use qa::QAEvaluator;
