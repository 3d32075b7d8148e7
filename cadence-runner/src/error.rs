use std::fmt;

use thiserror::Error;

use crate::audio::AudioError;
use crate::compositor::PresentError;
use crate::vsync::VsyncError;

/// One failed operation, tagged with the step that failed.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("invalid loop settings: {0}")]
    Settings(String),

    #[error("failed to create the event loop: {0}")]
    EventLoop(String),

    #[error("failed to create the window: {0}")]
    CreateWindow(String),

    #[error("failed to create the drawing surface: {0}")]
    CreateSurface(String),

    #[error("failed to open audio output: {0}")]
    OpenAudio(AudioError),

    #[error("failed to pause audio output: {0}")]
    PauseAudio(AudioError),

    #[error("failed to restart audio output: {0}")]
    RestartAudio(AudioError),

    #[error("failed to prepare audio slot: {0}")]
    PrepareAudio(AudioError),

    #[error("failed to unprepare audio slot: {0}")]
    UnprepareAudio(AudioError),

    #[error("failed to write audio slot: {0}")]
    WriteAudio(AudioError),

    #[error("failed to read the playback position: {0}")]
    AudioPosition(AudioError),

    #[error("audio stream fault: {0}")]
    AudioFault(String),

    #[error("failed to present the viewport: {0}")]
    Present(PresentError),

    #[error("failed to start the vsync thread: {0}")]
    SpawnVsync(String),

    #[error("vsync thread stopped: {0}")]
    Vsync(VsyncError),

    #[error("failed to stop the vsync thread: {0}")]
    StopVsync(VsyncError),

    #[error("failed to reset audio output: {0}")]
    ResetAudio(AudioError),

    #[error("failed to close audio output: {0}")]
    CloseAudio(AudioError),
}

/// Everything that went wrong during one run of the loop, in the order it was
/// discovered. The first cause is the one that ended the loop.
#[derive(Debug)]
pub struct LoopError {
    causes: Vec<Failure>,
}

impl LoopError {
    /// Returns `None` when there is nothing to report.
    pub fn from_causes(causes: Vec<Failure>) -> Option<Self> {
        if causes.is_empty() {
            None
        } else {
            Some(Self { causes })
        }
    }

    pub fn causes(&self) -> &[Failure] {
        &self.causes
    }

    pub fn first(&self) -> &Failure {
        &self.causes[0]
    }

    pub fn push(&mut self, failure: Failure) {
        self.causes.push(failure);
    }
}

/// Adds `failure` after whatever `outcome` already reports.
pub fn append_failure(outcome: Result<(), LoopError>, failure: Failure) -> Result<(), LoopError> {
    match outcome {
        Ok(()) => Err(failure.into()),
        Err(mut err) => {
            err.push(failure);
            Err(err)
        }
    }
}

impl From<Failure> for LoopError {
    fn from(failure: Failure) -> Self {
        Self { causes: vec![failure] }
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, rest) = match self.causes.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        write!(f, "{first}.")?;
        if !rest.is_empty() {
            write!(f, "  Additionally: ")?;
            for (i, cause) in rest.iter().enumerate() {
                if i > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{cause}")?;
            }
            write!(f, ".")?;
        }
        Ok(())
    }
}

impl std::error::Error for LoopError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cause_renders_alone() {
        let err = LoopError::from(Failure::AudioFault("device unplugged".into()));
        assert_eq!(err.to_string(), "audio stream fault: device unplugged.");
    }

    #[test]
    fn additional_causes_are_appended_in_order() {
        let err = LoopError::from_causes(vec![
            Failure::Settings("rows must be at least 1".into()),
            Failure::CloseAudio(AudioError::Closed),
            Failure::ResetAudio(AudioError::Closed),
        ])
        .unwrap();
        let text = err.to_string();
        assert!(text.starts_with("invalid loop settings: rows must be at least 1."));
        let close = text.find("failed to close").unwrap();
        let reset = text.find("failed to reset").unwrap();
        assert!(close < reset);
        assert!(matches!(err.first(), Failure::Settings(_)));
    }

    #[test]
    fn late_failure_joins_the_report() {
        let clean = append_failure(Ok(()), Failure::EventLoop("display lost".into())).unwrap_err();
        assert_eq!(clean.causes().len(), 1);

        let failed = Err(LoopError::from(Failure::AudioFault("unplugged".into())));
        let err = append_failure(failed, Failure::EventLoop("display lost".into())).unwrap_err();
        assert!(matches!(err.first(), Failure::AudioFault(_)));
        assert!(matches!(err.causes()[1], Failure::EventLoop(_)));
    }

    #[test]
    fn no_causes_is_not_an_error() {
        assert!(LoopError::from_causes(Vec::new()).is_none());
    }
}
