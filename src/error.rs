use std::fmt;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GribError {
    #[error("unsupported {provider} model: {name} (supported: {})", .supported.join(", "))]
    UnsupportedModel {
        provider: String,
        name: String,
        supported: Vec<String>,
    },

    #[error("model {model} is not published for the {hour:02}Z run")]
    UnpublishedRunHour { model: String, hour: u32 },

    #[error("invalid parameter list: {0}")]
    InvalidParameterList(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}, expected {expected}")]
    Status {
        url: String,
        status: u16,
        expected: u16,
    },

    #[error("reading response body failed: {0}")]
    BodyRead(String),

    #[error("index unavailable: {0}")]
    Index(String),

    #[error("index has no entry for {param} at {height}")]
    IndexEntryMissing { param: String, height: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("regrid failed: {0}")]
    Regrid(String),

    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

impl GribError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GribError::Http(_) | GribError::Status { .. } | GribError::BodyRead(_)
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GribError::UnsupportedModel { .. }
                | GribError::UnpublishedRunHour { .. }
                | GribError::InvalidParameterList(_)
                | GribError::InvalidConfig(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Index,
    Download,
    Move,
}

impl Stage {
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Index => "[IDX]",
            Stage::Download => "[DL]",
            Stage::Move => "[MOVE]",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub stage: Stage,
    pub url: String,
    pub param: Option<String>,
    pub step: u32,
    pub message: String,
}

impl UnitFailure {
    pub fn new(stage: Stage, url: &str, param: Option<&str>, step: u32, err: GribError) -> Self {
        Self {
            stage,
            url: url.to_string(),
            param: param.map(str::to_string),
            step,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step {:03}", self.stage.tag(), self.step)?;
        if let Some(param) = &self.param {
            write!(f, " {param}")?;
        }
        write!(f, ": {} ({})", self.message, self.url)
    }
}
