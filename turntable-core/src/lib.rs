pub mod backend;
pub mod commands;
pub mod config;
pub mod debounce;
pub mod error;
pub mod library;
pub mod metadata;
pub mod player;
pub mod queue;
pub mod shuffle;
pub mod timer;
pub mod track;

pub use backend::{ AudioBackend, MemoryBackend, SimulatedBackend };
pub use commands::{ CommandKey, CommandResult, Outcome, PlaybackStatus, StopReason };
pub use config::PlayerConfig;
pub use error::{ BackendError, ConfigError, PlaybackError };
pub use player::{ Player, PlayerBuilder, PlayerSnapshot };
pub use queue::QueueStore;
pub use track::{ TrackMetadata, TrackRef };

#[cfg(feature = "rodio")]
pub use backend::RodioBackend;
