use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::track::TrackRef;

/// Failure reported by an audio backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("media not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode media: {0}")]
    Decode(String),

    #[error("audio output device error: {0}")]
    Device(String),
}

/// The only error a transport command surfaces.
///
/// Playback state is unchanged when this is returned.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("media unavailable for {track}: {source}")]
    MediaUnavailable {
        track: TrackRef,
        #[source]
        source: BackendError,
    },
}

impl PlaybackError {
    pub fn track(&self) -> &TrackRef {
        match self {
            PlaybackError::MediaUnavailable { track, .. } => track,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
