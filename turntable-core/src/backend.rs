//! Audio output seam.
//!
//! The player drives an [`AudioBackend`] and never decodes anything itself.
//! Backends report the end of a track through the callback registered with
//! [`AudioBackend::on_end_reached`], from whatever thread they like.

use std::path::Path;
use std::sync::Arc;
use std::time::{ Duration, Instant };

use parking_lot::Mutex;

use crate::error::BackendError;
use crate::metadata::{ LoftyResolver, MetadataResolver };
use crate::timer::{ ThreadTimer, Timer, TimerHandle };
use crate::track::TrackRef;

#[cfg(feature = "rodio")]
pub use self::rodio_backend::RodioBackend;

pub type EndCallback = Arc<dyn Fn() + Send + Sync + 'static>;

pub trait AudioBackend: Send {
    /// Load `track`, replacing whatever was loaded. Playback is paused
    /// afterwards.
    fn set_media(&mut self, track: &TrackRef) -> Result<(), BackendError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn position_ms(&self) -> u64;
    fn duration_ms(&self) -> Option<u64>;
    /// Register the end-of-track notification. Replaces any earlier one.
    fn on_end_reached(&mut self, callback: EndCallback);
}

fn check_readable(path: &Path) -> Result<(), BackendError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(BackendError::NotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(BackendError::NotFound(path.to_path_buf()))
        }
        Err(source) => Err(BackendError::Unreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// =================================================================================
//  IN-MEMORY BACKEND
// =================================================================================

/// Calls received by a [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    SetMedia(TrackRef),
    Play,
    Pause,
    Stop,
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<BackendCall>,
    failing: Vec<TrackRef>,
    loaded: Option<TrackRef>,
    on_end: Option<EndCallback>,
}

/// Backend without audio output that records every call.
///
/// Clones share state, so a caller can keep one clone to inspect calls and
/// to simulate the end of a track after handing another to the player.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set_media` fail for `track`
    pub fn fail_on(&self, track: impl Into<TrackRef>) {
        self.state.lock().failing.push(track.into());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Tracks passed to `set_media`, in order
    pub fn loaded_tracks(&self) -> Vec<TrackRef> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::SetMedia(track) => Some(track.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn loaded(&self) -> Option<TrackRef> {
        self.state.lock().loaded.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// The end-of-track callback currently registered
    pub fn end_callback(&self) -> Option<EndCallback> {
        self.state.lock().on_end.clone()
    }

    /// Invoke the end-of-track callback as the audio thread would
    pub fn finish_track(&self) {
        // Cloned out so the callback can call back into this backend
        let callback = self.state.lock().on_end.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl AudioBackend for MemoryBackend {
    fn set_media(&mut self, track: &TrackRef) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::SetMedia(track.clone()));
        if state.failing.contains(track) {
            return Err(BackendError::Decode(format!("refusing to load {}", track)));
        }
        state.loaded = Some(track.clone());
        Ok(())
    }

    fn play(&mut self) {
        self.state.lock().calls.push(BackendCall::Play);
    }

    fn pause(&mut self) {
        self.state.lock().calls.push(BackendCall::Pause);
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Stop);
        state.loaded = None;
    }

    fn position_ms(&self) -> u64 {
        0
    }

    fn duration_ms(&self) -> Option<u64> {
        None
    }

    fn on_end_reached(&mut self, callback: EndCallback) {
        self.state.lock().on_end = Some(callback);
    }
}

// =================================================================================
//  SIMULATED BACKEND
// =================================================================================

/// Backend that "plays" a track by letting its probed duration elapse.
///
/// Useful headless: the queue advances at real speed, no device needed.
pub struct SimulatedBackend {
    resolver: Box<dyn MetadataResolver>,
    timer: Arc<dyn Timer>,
    duration: Option<Duration>,
    /// Playback time accumulated before the last pause
    elapsed: Duration,
    started: Option<Instant>,
    end_timer: Option<TimerHandle>,
    on_end: Option<EndCallback>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::with_parts(Box::new(LoftyResolver::new()), Arc::new(ThreadTimer::new()))
    }

    pub fn with_parts(resolver: Box<dyn MetadataResolver>, timer: Arc<dyn Timer>) -> Self {
        Self {
            resolver,
            timer,
            duration: None,
            elapsed: Duration::ZERO,
            started: None,
            end_timer: None,
            on_end: None,
        }
    }

    fn played(&self) -> Duration {
        self.elapsed + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn halt(&mut self) {
        self.elapsed = self.played();
        self.started = None;
        self.end_timer = None;
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for SimulatedBackend {
    fn set_media(&mut self, track: &TrackRef) -> Result<(), BackendError> {
        check_readable(track.path())?;
        let metadata = self
            .resolver
            .resolve(track)
            .ok_or_else(|| BackendError::Decode(format!("unrecognized media {}", track)))?;

        self.halt();
        self.elapsed = Duration::ZERO;
        self.duration = Some(Duration::from_secs_f32(metadata.duration.max(0.0)));
        log::debug!("Simulating {} ({:.1}s)", track, metadata.duration);
        Ok(())
    }

    fn play(&mut self) {
        let Some(duration) = self.duration else {
            return;
        };
        if self.started.is_some() {
            return;
        }

        let remaining = duration.saturating_sub(self.elapsed);
        self.started = Some(Instant::now());
        if let Some(callback) = self.on_end.clone() {
            self.end_timer = Some(self.timer.schedule(remaining, Box::new(move || callback())));
        }
    }

    fn pause(&mut self) {
        self.halt();
    }

    fn stop(&mut self) {
        self.halt();
        self.elapsed = Duration::ZERO;
        self.duration = None;
    }

    fn position_ms(&self) -> u64 {
        let played = self.played();
        let played = self.duration.map_or(played, |d| played.min(d));
        played.as_millis() as u64
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration.map(|d| d.as_millis() as u64)
    }

    fn on_end_reached(&mut self, callback: EndCallback) {
        self.on_end = Some(callback);
    }
}

// =================================================================================
//  RODIO BACKEND
// =================================================================================

#[cfg(feature = "rodio")]
mod rodio_backend {
    use std::fs::File;
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::{ Sender, bounded };
    use rodio::{ Decoder, OutputStreamBuilder, Sink, Source, source::EmptyCallback };

    use super::{ AudioBackend, EndCallback, check_readable };
    use crate::error::BackendError;
    use crate::track::TrackRef;

    /// Plays through the default output device.
    ///
    /// The output stream lives on its own thread for as long as the backend
    /// exists; only the `Sink` is shared with the caller.
    pub struct RodioBackend {
        sink: Sink,
        duration: Option<Duration>,
        on_end: Option<EndCallback>,
        _shutdown: Sender<()>,
    }

    impl RodioBackend {
        pub fn new() -> Result<Self, BackendError> {
            let (sink_tx, sink_rx) = bounded::<Result<Sink, BackendError>>(1);
            let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

            thread::Builder::new()
                .name("turntable-output".to_string())
                .spawn(move || {
                    let stream = match OutputStreamBuilder::open_default_stream() {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = sink_tx.send(Err(BackendError::Device(e.to_string())));
                            return;
                        }
                    };
                    let sink = Sink::connect_new(stream.mixer());
                    sink.pause();
                    if sink_tx.send(Ok(sink)).is_err() {
                        return;
                    }
                    // Keep the stream alive until the backend is dropped
                    let _ = shutdown_rx.recv();
                    drop(stream);
                })
                .map_err(|e| BackendError::Device(e.to_string()))?;

            let sink = sink_rx
                .recv()
                .map_err(|_| BackendError::Device("output thread exited".to_string()))??;

            Ok(Self {
                sink,
                duration: None,
                on_end: None,
                _shutdown: shutdown_tx,
            })
        }
    }

    impl AudioBackend for RodioBackend {
        fn set_media(&mut self, track: &TrackRef) -> Result<(), BackendError> {
            check_readable(track.path())?;
            let file = File::open(track.path()).map_err(|source| BackendError::Unreadable {
                path: track.path().to_path_buf(),
                source,
            })?;
            let decoder = Decoder::try_from(file).map_err(|e| BackendError::Decode(e.to_string()))?;

            // clear() drops the previous track together with its end callback
            self.sink.clear();
            self.duration = decoder.total_duration();
            self.sink.append(decoder);
            if let Some(callback) = self.on_end.clone() {
                self.sink.append(EmptyCallback::new(Box::new(move || callback())));
            }
            Ok(())
        }

        fn play(&mut self) {
            self.sink.play();
        }

        fn pause(&mut self) {
            self.sink.pause();
        }

        fn stop(&mut self) {
            self.sink.clear();
            self.duration = None;
        }

        fn position_ms(&self) -> u64 {
            self.sink.get_pos().as_millis() as u64
        }

        fn duration_ms(&self) -> Option<u64> {
            self.duration.map(|d| d.as_millis() as u64)
        }

        fn on_end_reached(&mut self, callback: EndCallback) {
            self.on_end = Some(callback);
        }
    }
}
