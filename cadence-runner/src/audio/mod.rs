mod clock;
mod device;
mod ring;

pub use clock::{elapsed_samples, PlaybackClock};
pub use device::CpalSink;
pub use ring::{buffer_count, RingBuffer, SlotState, TickScheduler};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("{0}")]
    Open(String),

    #[error("slot {0} does not exist")]
    NoSuchSlot(usize),

    #[error("slot {slot} is already prepared")]
    AlreadyPrepared { slot: usize },

    #[error("slot {slot} was not prepared")]
    NotPrepared { slot: usize },

    #[error("slot {slot} is still playing")]
    StillPlaying { slot: usize },

    #[error("slot {got} finished while slot {expected} was due")]
    OutOfOrder { expected: usize, got: usize },

    #[error("slot {slot} holds {len} samples, expected {expected}")]
    SlotLength { slot: usize, len: usize, expected: usize },

    #[error("queue is full ({free} samples free, {needed} needed)")]
    QueueFull { free: usize, needed: usize },

    #[error("stream control failed: {0}")]
    Control(String),

    #[error("audio output is closed")]
    Closed,
}

/// A device that plays fixed-size slots of interleaved stereo samples in the order
/// they are written, and reports each slot once it has been played.
///
/// A slot goes `prepare` -> `write` -> (played) -> `unprepare`. The playback
/// position counts stereo frames and wraps at 2^32.
pub trait AudioSink {
    fn prepare(&mut self, slot: usize, len: usize) -> Result<(), AudioError>;

    fn write(&mut self, slot: usize, samples: &[f32]) -> Result<(), AudioError>;

    fn unprepare(&mut self, slot: usize) -> Result<(), AudioError>;

    fn position(&self) -> Result<u32, AudioError>;

    fn pause(&mut self) -> Result<(), AudioError>;

    fn restart(&mut self) -> Result<(), AudioError>;

    /// Stops playback, drops everything queued and rewinds the position to zero.
    fn reset(&mut self) -> Result<(), AudioError>;

    fn close(&mut self) -> Result<(), AudioError>;
}
