use strum::{ Display, EnumIter, IntoStaticStr };

use crate::error::PlaybackError;

/// What a transport command did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// The transition ran
    Succeeded,
    /// Inside the debounce interval; the command runs once the interval ends
    Throttled,
    /// Nothing to do (empty queue, already in the requested state, queue boundary)
    NoOp,
    /// Issued from inside another transition on the same thread; runs right
    /// after it finishes
    Deferred,
}

/// Result of every transport command. Only media failures are errors.
pub type CommandResult = Result<Outcome, PlaybackError>;

/// Playback state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Why playback stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    UserInitiated,
    QueueCleared,
    EndOfQueue,
    StopAfterCurrent,
    QueueExhausted,
    /// Auto-advance could not load the next track
    MediaUnavailable,
}

/// Debounced transport commands. Each key has its own interval and timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommandKey {
    PlayPause,
    Next,
    Previous,
}
