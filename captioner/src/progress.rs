//! Progress observation. Sinks only watch; they cannot change the job.

use std::fmt;

use tracing::{info, warn};

use crate::types::Warning;

/// A pipeline checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Transcribing,
    CaptionsBuilt,
    Composited,
    Sequenced,
    Exported,
}

impl Stage {
    /// Overall completion when the stage is reached.
    pub fn percent(self) -> u8 {
        match self {
            Stage::Loaded => 10,
            Stage::Transcribing => 20,
            Stage::CaptionsBuilt => 40,
            Stage::Composited => 60,
            Stage::Sequenced => 80,
            Stage::Exported => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Loaded => "source loaded",
            Stage::Transcribing => "transcribing",
            Stage::CaptionsBuilt => "captions built",
            Stage::Composited => "composited",
            Stage::Sequenced => "outro sequenced",
            Stage::Exported => "exported",
        };
        f.write_str(label)
    }
}

/// Something the user should hear about mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Warning(Warning),
    Failed { stage: String, cause: String },
}

pub trait ProgressSink {
    fn stage(&self, stage: Stage, percent: u8);
    fn message(&self, notice: Notice);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&self, _stage: Stage, _percent: u8) {}
    fn message(&self, _notice: Notice) {}
}

/// Forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn stage(&self, stage: Stage, percent: u8) {
        info!(%stage, percent, "progress");
    }

    fn message(&self, notice: Notice) {
        match notice {
            Notice::Warning(w) => warn!("{w}"),
            Notice::Failed { stage, cause } => warn!(%stage, %cause, "job failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages_increase() {
        let stages = [
            Stage::Loaded,
            Stage::Transcribing,
            Stage::CaptionsBuilt,
            Stage::Composited,
            Stage::Sequenced,
            Stage::Exported,
        ];
        let percents: Vec<u8> = stages.iter().map(|s| s.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Stage::Exported.percent(), 100);
    }
}
