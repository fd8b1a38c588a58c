use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};

/// Lifecycle state of the current sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressState {
    Active,
    Finished,
    Interrupted,
    Error,
}

impl ProgressState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressState::Active => "ACTIVE",
            ProgressState::Finished => "FINISHED",
            ProgressState::Interrupted => "INTERRUPTED",
            ProgressState::Error => "ERROR",
        }
    }

    /// States that end a run and are announced to the host.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressState::Active)
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(ProgressState::Active),
            "FINISHED" => Ok(ProgressState::Finished),
            "INTERRUPTED" => Ok(ProgressState::Interrupted),
            "ERROR" => Ok(ProgressState::Error),
            other => Err(ValidationError::InvalidInput(format!(
                "unknown progress state '{other}'"
            ))
            .into()),
        }
    }
}

/// Anything a caller may report as progress.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressInput {
    Percent(f64),
    State(ProgressState),
    Failure(String),
}

impl From<f64> for ProgressInput {
    fn from(value: f64) -> Self {
        ProgressInput::Percent(value)
    }
}

impl From<ProgressState> for ProgressInput {
    fn from(state: ProgressState) -> Self {
        ProgressInput::State(state)
    }
}

impl From<&Error> for ProgressInput {
    fn from(err: &Error) -> Self {
        ProgressInput::Failure(err.to_string())
    }
}

/// The persisted `{value, error, state}` triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProgress {
    pub value: Option<f64>,
    pub error: Option<String>,
    pub state: Option<ProgressState>,
}

impl StoredProgress {
    pub fn classify(input: ProgressInput) -> Self {
        match input {
            ProgressInput::Percent(value) if value.is_finite() => {
                let value = value.clamp(0.0, 100.0);
                let state = if value >= 100.0 {
                    ProgressState::Finished
                } else {
                    ProgressState::Active
                };
                Self {
                    value: Some(value),
                    error: None,
                    state: Some(state),
                }
            }
            ProgressInput::Percent(value) => Self {
                value: None,
                error: Some(format!("invalid progress value {value}")),
                state: Some(ProgressState::Error),
            },
            ProgressInput::State(state) => Self {
                value: (state == ProgressState::Finished).then_some(100.0),
                error: None,
                state: Some(state),
            },
            ProgressInput::Failure(message) => Self {
                value: None,
                error: Some(message),
                state: Some(ProgressState::Error),
            },
        }
    }

    /// No error, state ACTIVE and a finite progress below 100.
    pub fn is_sync_in_progress(&self) -> bool {
        self.error.is_none()
            && self.state == Some(ProgressState::Active)
            && self.value.is_some_and(|v| v.is_finite() && v < 100.0)
    }
}

/// What observers see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub value: Option<f64>,
    pub error: Option<String>,
    pub state: Option<ProgressState>,
    pub sync_started_at: Option<i64>,
    pub spent_time: Option<i64>,
    pub left_time: Option<i64>,
}

impl ProgressSnapshot {
    pub fn is_sync_in_progress(&self) -> bool {
        StoredProgress {
            value: self.value,
            error: self.error.clone(),
            state: self.state,
        }
        .is_sync_in_progress()
    }
}
