//! Parsed command intents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five operations of the command grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Set,
    Increase,
    Decrease,
    Multiply,
    Toggle,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Set,
        Operation::Increase,
        Operation::Decrease,
        Operation::Multiply,
        Operation::Toggle,
    ];

    /// Keyword used for this operation in the strict grammar.
    pub fn keyword(self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Increase => "increase",
            Operation::Decrease => "decrease",
            Operation::Multiply => "multiply",
            Operation::Toggle => "toggle",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.keyword().eq_ignore_ascii_case(word))
    }

    /// Compute the new value of a field currently at `current`.
    ///
    /// Percentage operands are relative to `current`; `DECREASE` never goes
    /// below zero and `TOGGLE` always yields exactly `0.0` or `1.0`.
    pub fn apply(self, current: f64, operand: f64, is_percentage: bool) -> f64 {
        let ratio = operand / 100.0;
        let next = match (self, is_percentage) {
            (Operation::Set, false) => operand,
            (Operation::Set, true) => current * ratio,
            (Operation::Increase, false) => current + operand,
            (Operation::Increase, true) => current * (1.0 + ratio),
            (Operation::Decrease, false) => current - operand,
            (Operation::Decrease, true) => current * (1.0 - ratio),
            (Operation::Multiply, false) => current * operand,
            (Operation::Multiply, true) => current * ratio,
            (Operation::Toggle, _) => {
                if operand != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        next.max(0.0)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One parsed instruction.  Consumed once by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Canonical registry key (e.g. `"rpm"`, `"sprinkler"`).
    pub parameter_key: String,
    pub operation: Operation,
    pub operand: f64,
    pub operand_is_percentage: bool,
    /// The line this intent was parsed from.
    pub raw_phrase: String,
}

impl Intent {
    /// The value this intent asks for, given the field's current value.
    pub fn target_from(&self, current: f64) -> f64 {
        self.operation
            .apply(current, self.operand, self.operand_is_percentage)
    }
}
