//! Playback coordinator.
//!
//! Every playback-affecting operation, including the backend's asynchronous
//! end-of-track notification and trailing debounce executions, runs under one
//! reentrant lock. A transition, once started, runs to completion before the
//! next one begins.
//!
//! Reentrancy: a command issued from inside a running transition on the same
//! thread (for example a backend that reports end-of-track synchronously from
//! `play()`) is queued and applied right after the running transition, and the
//! nested call returns [`Outcome::Deferred`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{ Arc, Weak };
use std::time::Instant;

use parking_lot::ReentrantMutex;
use strum::IntoEnumIterator;

use crate::backend::{ AudioBackend, EndCallback };
use crate::commands::{ CommandKey, CommandResult, Outcome, PlaybackStatus, StopReason };
use crate::config::PlayerConfig;
use crate::debounce::{ Admission, DebounceGate, TimerId };
use crate::error::PlaybackError;
use crate::library::CurrentView;
use crate::queue::QueueStore;
use crate::timer::{ ThreadTimer, Timer };
use crate::track::TrackRef;

/// Read-only copy of the player state, for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub status: PlaybackStatus,
    /// Track the backend has loaded; the queue pointer may have moved away
    pub now_playing: Option<TrackRef>,
    pub queue: Vec<TrackRef>,
    pub current_index: usize,
    pub loop_enabled: bool,
    pub shuffle_enabled: bool,
    pub stop_after_current: bool,
    pub last_stop_reason: Option<StopReason>,
}

impl PlayerSnapshot {
    pub fn current(&self) -> Option<&TrackRef> {
        self.queue.get(self.current_index)
    }
}

#[derive(Debug)]
enum Transport {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    /// Carries the load generation the signal belongs to, if known
    TrackEnded(Option<u64>),
    Trailing(CommandKey, TimerId),
    PopulateAndPlay(Vec<TrackRef>, usize),
    PlayIndex(usize),
    ClearQueue,
    ToggleLoop,
    ToggleShuffle,
    ToggleStopAfterCurrent,
    Shutdown,
}

struct Core {
    state: RefCell<PlayerState>,
    deferred: RefCell<VecDeque<Transport>>,
    published: RefCell<PlayerSnapshot>,
}

struct Shared {
    core: ReentrantMutex<Core>,
}

/// Handle to the playback coordinator. Clones share the same player.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

pub struct PlayerBuilder {
    backend: Box<dyn AudioBackend>,
    timer: Arc<dyn Timer>,
    config: PlayerConfig,
    queue: Option<QueueStore>,
    view: Option<Box<dyn CurrentView>>,
}

impl PlayerBuilder {
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from an existing queue instead of an empty one
    pub fn queue(mut self, queue: QueueStore) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn view(mut self, view: Box<dyn CurrentView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn build(self) -> Player {
        let PlayerBuilder { mut backend, timer, config, queue, view } = self;

        let default_interval = config.debounce.interval(CommandKey::Next);
        let gate = CommandKey::iter().fold(DebounceGate::new(timer, default_interval), |gate, key| {
            gate.with_interval(key, config.debounce.interval(key))
        });

        let mut queue = queue.unwrap_or_default();
        if config.playback.shuffle_enabled {
            queue.set_shuffle(true);
        }

        let shared = Arc::new_cyclic(|me: &Weak<Shared>| {
            backend.on_end_reached(end_callback(me, 0));

            let state = PlayerState {
                queue,
                backend,
                gate,
                view,
                status: PlaybackStatus::Stopped,
                loop_enabled: config.playback.loop_enabled,
                stop_after_current: false,
                last_stop_reason: None,
                loaded: None,
                generation: 0,
                me: me.clone(),
            };
            let published = state.snapshot();

            Shared {
                core: ReentrantMutex::new(Core {
                    state: RefCell::new(state),
                    deferred: RefCell::new(VecDeque::new()),
                    published: RefCell::new(published),
                }),
            }
        });

        Player { shared }
    }
}

impl Player {
    pub fn builder(backend: impl AudioBackend + 'static) -> PlayerBuilder {
        PlayerBuilder {
            backend: Box::new(backend),
            timer: Arc::new(ThreadTimer::new()),
            config: PlayerConfig::default(),
            queue: None,
            view: None,
        }
    }

    pub fn new(backend: impl AudioBackend + 'static, config: PlayerConfig) -> Self {
        Self::builder(backend).config(config).build()
    }

    // ==============================================
    // Transport
    // ==============================================

    pub fn play(&self) -> CommandResult {
        self.dispatch(Transport::Play)
    }

    pub fn pause(&self) -> CommandResult {
        self.dispatch(Transport::Pause)
    }

    /// Debounced toggle between playing and paused
    pub fn play_pause(&self) -> CommandResult {
        self.dispatch(Transport::PlayPause)
    }

    pub fn stop(&self) -> CommandResult {
        self.dispatch(Transport::Stop)
    }

    /// Debounced skip forward
    pub fn next(&self) -> CommandResult {
        self.dispatch(Transport::Next)
    }

    /// Debounced skip backward
    pub fn previous(&self) -> CommandResult {
        self.dispatch(Transport::Previous)
    }

    /// Called when the backend reaches the end of the loaded track.
    pub fn track_ended(&self) {
        self.end_of_track(None);
    }

    fn end_of_track(&self, generation: Option<u64>) {
        if let Err(e) = self.dispatch(Transport::TrackEnded(generation)) {
            log::warn!("Auto-advance failed: {}", e);
        }
    }

    /// Replace the queue with `items` and play from `start_index`
    pub fn populate_and_play(&self, items: Vec<TrackRef>, start_index: usize) -> CommandResult {
        self.dispatch(Transport::PopulateAndPlay(items, start_index))
    }

    /// Jump to the queue position `index` and play it
    pub fn play_index(&self, index: usize) -> CommandResult {
        self.dispatch(Transport::PlayIndex(index))
    }

    pub fn clear_queue(&self) -> CommandResult {
        self.dispatch(Transport::ClearQueue)
    }

    /// Flip loop mode and return the new value
    pub fn toggle_loop(&self) -> bool {
        let _ = self.dispatch(Transport::ToggleLoop);
        self.loop_enabled()
    }

    /// Flip shuffle and return the new value
    pub fn toggle_shuffle(&self) -> bool {
        let _ = self.dispatch(Transport::ToggleShuffle);
        self.shuffle_enabled()
    }

    /// Flip the one-shot "stop after this track" flag and return the new value
    pub fn toggle_stop_after_current(&self) -> bool {
        let _ = self.dispatch(Transport::ToggleStopAfterCurrent);
        self.stop_after_current()
    }

    /// Cancel pending debounce timers and stop the backend
    pub fn shutdown(&self) {
        let _ = self.dispatch(Transport::Shutdown);
    }

    // ==============================================
    // Queue access
    // ==============================================

    /// Run a queue operation under the player lock.
    ///
    /// Returns `None` when called from inside a running transition on the same
    /// thread, where the queue cannot be touched.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut QueueStore) -> R) -> Option<R> {
        self.with_state(|state| f(&mut state.queue))
    }

    /// Replace the view `play` falls back to when the queue is empty.
    /// Returns `false` when called from inside a running transition.
    pub fn set_view(&self, view: Box<dyn CurrentView>) -> bool {
        self.with_state(|state| state.view = Some(view)).is_some()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PlayerState) -> R) -> Option<R> {
        let core = self.shared.core.lock();
        let Ok(mut state) = core.state.try_borrow_mut() else {
            log::warn!("Player state access from inside a transition refused");
            return None;
        };
        let result = f(&mut state);
        *core.published.borrow_mut() = state.snapshot();
        Some(result)
    }

    // ==============================================
    // Queries
    // ==============================================

    /// State as of the last completed transition
    pub fn snapshot(&self) -> PlayerSnapshot {
        let core = self.shared.core.lock();
        let snapshot = core.published.borrow().clone();
        snapshot
    }

    fn read<R>(&self, f: impl FnOnce(&PlayerSnapshot) -> R) -> R {
        let core = self.shared.core.lock();
        let published = core.published.borrow();
        f(&published)
    }

    pub fn status(&self) -> PlaybackStatus {
        self.read(|s| s.status)
    }

    pub fn is_playing(&self) -> bool {
        self.status() == PlaybackStatus::Playing
    }

    pub fn loop_enabled(&self) -> bool {
        self.read(|s| s.loop_enabled)
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.read(|s| s.shuffle_enabled)
    }

    pub fn stop_after_current(&self) -> bool {
        self.read(|s| s.stop_after_current)
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.read(|s| s.last_stop_reason)
    }

    /// Track the queue pointer names
    pub fn current_track(&self) -> Option<TrackRef> {
        self.read(|s| s.current().cloned())
    }

    /// Track loaded in the backend, if any
    pub fn now_playing(&self) -> Option<TrackRef> {
        self.read(|s| s.now_playing.clone())
    }

    /// Playback position of the backend, `0` while a transition is running
    pub fn position_ms(&self) -> u64 {
        let core = self.shared.core.lock();
        let position = core.state.try_borrow().map(|s| s.backend.position_ms()).unwrap_or(0);
        position
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let core = self.shared.core.lock();
        let duration = core.state.try_borrow().ok().and_then(|s| s.backend.duration_ms());
        duration
    }

    // ==============================================
    // Dispatch
    // ==============================================

    fn dispatch(&self, op: Transport) -> CommandResult {
        let core = self.shared.core.lock();
        let Ok(mut state) = core.state.try_borrow_mut() else {
            log::debug!("{:?} issued during a transition, deferred", op);
            core.deferred.borrow_mut().push_back(op);
            return Ok(Outcome::Deferred);
        };

        let result = state.apply(op);

        loop {
            let next = core.deferred.borrow_mut().pop_front();
            let Some(next) = next else {
                break;
            };
            if let Err(e) = state.apply(next) {
                log::warn!("Deferred command failed: {}", e);
            }
        }

        *core.published.borrow_mut() = state.snapshot();
        result
    }
}

struct PlayerState {
    queue: QueueStore,
    backend: Box<dyn AudioBackend>,
    gate: DebounceGate<CommandKey>,
    view: Option<Box<dyn CurrentView>>,
    status: PlaybackStatus,
    loop_enabled: bool,
    stop_after_current: bool,
    last_stop_reason: Option<StopReason>,
    loaded: Option<TrackRef>,
    generation: u64,
    me: Weak<Shared>,
}

impl PlayerState {
    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            status: self.status,
            now_playing: self.loaded.clone(),
            queue: self.queue.items().to_vec(),
            current_index: self.queue.current_index(),
            loop_enabled: self.loop_enabled,
            shuffle_enabled: self.queue.shuffle_enabled(),
            stop_after_current: self.stop_after_current,
            last_stop_reason: self.last_stop_reason,
        }
    }

    fn apply(&mut self, op: Transport) -> CommandResult {
        match op {
            Transport::Play => self.play(),
            Transport::Pause => self.pause(),
            Transport::Stop => self.stop(StopReason::UserInitiated),
            Transport::PlayPause => self.debounced(CommandKey::PlayPause),
            Transport::Next => self.debounced(CommandKey::Next),
            Transport::Previous => self.debounced(CommandKey::Previous),
            Transport::TrackEnded(generation) => self.track_ended(generation),
            Transport::Trailing(key, id) => {
                self.gate.fire(key, id, Instant::now());
                log::debug!("Trailing {} runs", key);
                self.run(key)
            }
            Transport::PopulateAndPlay(items, start_index) => self.populate_and_play(items, start_index),
            Transport::PlayIndex(index) => self.play_index(index),
            Transport::ClearQueue => {
                self.stop(StopReason::QueueCleared)?;
                self.queue.clear();
                Ok(Outcome::Succeeded)
            }
            Transport::ToggleLoop => {
                self.loop_enabled = !self.loop_enabled;
                log::debug!("Loop {}", if self.loop_enabled { "on" } else { "off" });
                Ok(Outcome::Succeeded)
            }
            Transport::ToggleShuffle => {
                let enabled = self.queue.toggle_shuffle();
                log::debug!("Shuffle {}", if enabled { "on" } else { "off" });
                Ok(Outcome::Succeeded)
            }
            Transport::ToggleStopAfterCurrent => {
                self.stop_after_current = !self.stop_after_current;
                Ok(Outcome::Succeeded)
            }
            Transport::Shutdown => {
                self.gate.reset();
                self.stop(StopReason::UserInitiated)
            }
        }
    }

    fn debounced(&mut self, key: CommandKey) -> CommandResult {
        let me = self.me.clone();
        let admission = self.gate.submit(key, Instant::now(), move |id| {
            let Some(shared) = me.upgrade() else {
                return;
            };
            if let Err(e) = (Player { shared }).dispatch(Transport::Trailing(key, id)) {
                log::warn!("Trailing {} failed: {}", key, e);
            }
        });

        match admission {
            Admission::Immediate => self.run(key),
            Admission::Trailing { .. } => Ok(Outcome::Throttled),
        }
    }

    fn run(&mut self, key: CommandKey) -> CommandResult {
        match key {
            CommandKey::PlayPause => {
                if self.status == PlaybackStatus::Playing {
                    self.pause()
                } else {
                    self.play()
                }
            }
            CommandKey::Next => self.advance(),
            CommandKey::Previous => self.retreat(),
        }
    }

    // ==============================================
    // Transitions
    // ==============================================

    fn play(&mut self) -> CommandResult {
        match self.status {
            PlaybackStatus::Playing => Ok(Outcome::NoOp),
            PlaybackStatus::Paused => {
                self.backend.play();
                self.status = PlaybackStatus::Playing;
                log::info!("Resumed");
                Ok(Outcome::Succeeded)
            }
            PlaybackStatus::Stopped => {
                if self.queue.is_empty() {
                    if let Some(view) = &self.view {
                        let tracks = view.tracks();
                        log::debug!("Queue empty, taking {} tracks from the current view", tracks.len());
                        self.queue.populate_and_play(tracks, view.selected());
                    }
                }
                if self.queue.is_empty() {
                    return Ok(Outcome::NoOp);
                }
                self.load_and_play()
            }
        }
    }

    fn pause(&mut self) -> CommandResult {
        if self.status != PlaybackStatus::Playing {
            return Ok(Outcome::NoOp);
        }
        self.backend.pause();
        self.status = PlaybackStatus::Paused;
        log::info!("Paused");
        Ok(Outcome::Succeeded)
    }

    fn stop(&mut self, reason: StopReason) -> CommandResult {
        if self.status == PlaybackStatus::Stopped {
            return Ok(Outcome::NoOp);
        }
        self.backend.stop();
        self.status = PlaybackStatus::Stopped;
        self.loaded = None;
        self.last_stop_reason = Some(reason);
        log::info!("Stopped ({})", reason);
        Ok(Outcome::Succeeded)
    }

    fn load_and_play(&mut self) -> CommandResult {
        let Some(track) = self.queue.current().cloned() else {
            return Ok(Outcome::NoOp);
        };
        // End signals from earlier loads carry an older generation
        let generation = self.generation + 1;
        self.backend.on_end_reached(end_callback(&self.me, generation));
        if let Err(source) = self.backend.set_media(&track) {
            log::warn!("Cannot load {}: {}", track, source);
            self.backend.on_end_reached(end_callback(&self.me, self.generation));
            return Err(PlaybackError::MediaUnavailable { track, source });
        }
        self.generation = generation;
        self.loaded = Some(track.clone());
        self.backend.play();
        self.status = PlaybackStatus::Playing;
        log::info!("Playing {}", track);
        Ok(Outcome::Succeeded)
    }

    /// Play whatever the queue now points at; undo the navigation if it
    /// cannot be loaded.
    fn play_navigated(&mut self, before: QueueStore) -> CommandResult {
        let result = self.load_and_play();
        if result.is_err() {
            self.queue = before;
        }
        result
    }

    fn advance(&mut self) -> CommandResult {
        if self.queue.is_empty() {
            return Ok(Outcome::NoOp);
        }
        let before = self.queue.clone();
        let len = self.queue.len();
        let current = self.queue.current_index();

        if self.loop_enabled && !self.queue.shuffle_enabled() {
            // A single track just plays again
            self.queue.move_current_to_end();
        } else {
            let next = match self.queue.next_index(current, len) {
                Some(next) => next,
                None if self.loop_enabled => self.restart_shuffle(current, Direction::Forward),
                None => return self.stop(StopReason::EndOfQueue),
            };
            self.queue.set_current(next);
        }
        self.play_navigated(before)
    }

    fn retreat(&mut self) -> CommandResult {
        if self.queue.is_empty() {
            return Ok(Outcome::NoOp);
        }
        let before = self.queue.clone();
        let len = self.queue.len();
        let current = self.queue.current_index();

        if self.loop_enabled && !self.queue.shuffle_enabled() {
            self.queue.move_last_to_beginning();
        } else {
            let previous = match self.queue.previous_index(current, len) {
                Some(previous) => previous,
                None if self.loop_enabled => self.restart_shuffle(current, Direction::Backward),
                None => return Ok(Outcome::NoOp),
            };
            self.queue.set_current(previous);
        }
        self.play_navigated(before)
    }

    /// Draw a fresh shuffled order once the current one is used up and pick
    /// its first (or last) track, avoiding an immediate repeat.
    fn restart_shuffle(&mut self, current: usize, direction: Direction) -> usize {
        self.queue.invalidate_shuffle();
        let order = self.queue.shuffled_order();
        let ends: Vec<usize> = match direction {
            Direction::Forward => order.iter().take(2).copied().collect(),
            Direction::Backward => order.iter().rev().take(2).copied().collect(),
        };
        match ends.as_slice() {
            [first, second, ..] if *first == current => *second,
            [first, ..] => *first,
            [] => current,
        }
    }

    fn track_ended(&mut self, generation: Option<u64>) -> CommandResult {
        if generation.is_some_and(|g| g != self.generation) {
            log::debug!("End of an earlier load ({:?}), ignored", generation);
            return Ok(Outcome::NoOp);
        }
        if self.status != PlaybackStatus::Playing {
            log::debug!("End of track while {}, ignored", self.status);
            return Ok(Outcome::NoOp);
        }

        if self.stop_after_current {
            self.stop_after_current = false;
            return self.stop(StopReason::StopAfterCurrent);
        }

        let result = self.continue_after_end();
        if result.is_err() {
            // nothing is left playing and no further end signal will come
            self.stop(StopReason::MediaUnavailable)?;
        }
        result
    }

    fn continue_after_end(&mut self) -> CommandResult {
        // The queue may have been edited since the finished track was loaded
        let finished_at_pointer = self.loaded.is_some() && self.queue.current() == self.loaded.as_ref();
        if !finished_at_pointer {
            if self.queue.is_empty() {
                return self.stop(StopReason::EndOfQueue);
            }
            log::debug!("Finished track no longer at the pointer, playing the pointer");
            return self.load_and_play();
        }

        if self.loop_enabled {
            return self.advance();
        }

        let index = self.queue.current_index();
        if self.queue.remove_at(index).is_none() || self.queue.is_empty() {
            return self.stop(StopReason::EndOfQueue);
        }
        if index >= self.queue.len() {
            // the finished track was the last one
            return self.stop(StopReason::QueueExhausted);
        }
        self.load_and_play()
    }

    fn populate_and_play(&mut self, items: Vec<TrackRef>, start_index: usize) -> CommandResult {
        if self.queue.populate_and_play(items, start_index).is_none() {
            self.stop(StopReason::QueueCleared)?;
            return Ok(Outcome::NoOp);
        }
        self.load_and_play()
    }

    fn play_index(&mut self, index: usize) -> CommandResult {
        let before = self.queue.clone();
        if !self.queue.set_current(index) {
            return Ok(Outcome::NoOp);
        }
        self.play_navigated(before)
    }
}

/// End-of-track notification tagged with the load it belongs to
fn end_callback(me: &Weak<Shared>, generation: u64) -> EndCallback {
    let me = me.clone();
    Arc::new(move || {
        if let Some(shared) = me.upgrade() {
            (Player { shared }).end_of_track(Some(generation));
        }
    })
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ BackendCall, MemoryBackend };
    use crate::config::DebounceConfig;
    use crate::error::BackendError;
    use crate::timer::ManualTimer;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn tracks(names: &[&str]) -> Vec<TrackRef> {
        names.iter().map(|n| TrackRef::from(*n)).collect()
    }

    fn names(player: &Player) -> Vec<String> {
        player.snapshot().queue.iter().map(|t| t.to_string()).collect()
    }

    fn no_debounce() -> PlayerConfig {
        PlayerConfig {
            debounce: DebounceConfig {
                play_pause_ms: 0,
                next_ms: 0,
                previous_ms: 0,
            },
            ..Default::default()
        }
    }

    struct Harness {
        player: Player,
        backend: MemoryBackend,
        timer: Arc<ManualTimer>,
    }

    fn harness(config: PlayerConfig, queue: &[&str], start: usize) -> Harness {
        let backend = MemoryBackend::new();
        let timer = ManualTimer::new();
        let mut store = QueueStore::with_seed(11);
        store.populate_and_play(tracks(queue), start);

        let player = Player::builder(backend.clone())
            .config(config)
            .timer(timer.clone())
            .queue(store)
            .build();
        Harness { player, backend, timer }
    }

    #[test]
    fn carousel_next_rotates_queue() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        assert!(h.player.toggle_loop());
        assert_eq!(h.player.play().unwrap(), Outcome::Succeeded);

        let mut now_playing = Vec::new();
        for expected in [["t2", "t3", "t1"], ["t3", "t1", "t2"], ["t1", "t2", "t3"]] {
            assert_eq!(h.player.next().unwrap(), Outcome::Succeeded);
            assert_eq!(names(&h.player), expected);
            assert_eq!(h.player.snapshot().current_index, 0);
            now_playing.push(h.player.current_track().unwrap().to_string());
        }
        assert_eq!(now_playing, ["t2", "t3", "t1"]);

        let loaded: Vec<String> = h.backend.loaded_tracks().iter().map(|t| t.to_string()).collect();
        assert_eq!(loaded, ["t1", "t2", "t3", "t1"]);
    }

    #[test]
    fn carousel_previous_brings_tail_to_front() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.player.toggle_loop();
        h.player.play().unwrap();

        h.player.previous().unwrap();
        assert_eq!(names(&h.player), ["t3", "t1", "t2"]);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t3")));
    }

    #[test]
    fn populate_with_nothing_is_a_noop() {
        let h = harness(no_debounce(), &[], 0);
        assert_eq!(h.player.populate_and_play(Vec::new(), 0).unwrap(), Outcome::NoOp);

        let snapshot = h.player.snapshot();
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.current_index, 0);
        assert_eq!(snapshot.status, PlaybackStatus::Stopped);
        assert!(h.backend.calls().is_empty());
    }

    #[test]
    fn last_track_ending_stops_at_end_of_queue() {
        let h = harness(no_debounce(), &["t1"], 0);
        h.player.play().unwrap();

        h.backend.finish_track();

        let snapshot = h.player.snapshot();
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.current_index, 0);
        assert_eq!(snapshot.status, PlaybackStatus::Stopped);
        assert_eq!(snapshot.last_stop_reason, Some(StopReason::EndOfQueue));
    }

    #[test]
    fn track_end_without_loop_consumes_and_continues() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 1);
        h.player.play().unwrap();

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t1", "t3"]);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t3")));
        assert!(h.player.is_playing());

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t1"]);
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::QueueExhausted));
    }

    #[test]
    fn track_end_with_loop_advances_carousel() {
        let h = harness(no_debounce(), &["t1", "t2"], 0);
        h.player.toggle_loop();
        h.player.play().unwrap();

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t2", "t1"]);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t2")));
    }

    #[test]
    fn track_end_after_pointer_moved_plays_the_pointer() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.player.play().unwrap();
        h.player.with_queue(|q| q.remove_at(0)).unwrap();
        assert_eq!(h.player.now_playing(), Some(TrackRef::from("t1")));

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t2", "t3"]);
        assert_eq!(h.player.now_playing(), Some(TrackRef::from("t2")));
        assert!(h.player.is_playing());

        // rotated away from the loaded track
        h.player.with_queue(|q| q.move_current_to_end()).unwrap();
        assert_eq!(names(&h.player), ["t3", "t2"]);
        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t3", "t2"]);
        assert_eq!(h.player.now_playing(), Some(TrackRef::from("t3")));
    }

    #[test]
    fn track_end_with_emptied_queue_stops() {
        let h = harness(no_debounce(), &["t1"], 0);
        h.player.play().unwrap();
        h.player.with_queue(|q| q.clear()).unwrap();

        h.backend.finish_track();
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::EndOfQueue));
    }

    #[test]
    fn unloadable_next_track_stops_auto_advance() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.backend.fail_on("t2");
        h.player.play().unwrap();

        h.backend.finish_track();
        let snapshot = h.player.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Stopped);
        assert_eq!(snapshot.last_stop_reason, Some(StopReason::MediaUnavailable));
        assert_eq!(snapshot.now_playing, None);
        assert_eq!(names(&h.player), ["t2", "t3"]);

        // same with loop on: the carousel is left where it was
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.backend.fail_on("t2");
        h.player.toggle_loop();
        h.player.play().unwrap();

        h.backend.finish_track();
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::MediaUnavailable));
        assert_eq!(names(&h.player), ["t1", "t2", "t3"]);
    }

    #[test]
    fn end_signal_from_an_earlier_load_is_ignored() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.player.play().unwrap();
        let t1_end = h.backend.end_callback().unwrap();

        // the user skips while t1's end signal is in flight
        h.player.next().unwrap();
        t1_end();
        assert_eq!(names(&h.player), ["t1", "t2", "t3"]);
        assert_eq!(h.player.now_playing(), Some(TrackRef::from("t2")));
        assert!(h.player.is_playing());

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t1", "t3"]);
        assert_eq!(h.player.now_playing(), Some(TrackRef::from("t3")));
    }

    #[test]
    fn failed_skip_keeps_the_loaded_track_end_signal() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.backend.fail_on("t3");
        h.player.play_index(1).unwrap();
        assert!(h.player.next().is_err());

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t1", "t3"]);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::MediaUnavailable));
    }

    #[test]
    fn stale_track_end_is_ignored() {
        let h = harness(no_debounce(), &["t1", "t2"], 0);
        h.player.play().unwrap();
        h.player.stop().unwrap();

        h.backend.finish_track();
        assert_eq!(names(&h.player), ["t1", "t2"]);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::UserInitiated));
    }

    #[test]
    fn stop_after_current_is_one_shot() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.player.toggle_loop();
        h.player.play().unwrap();
        assert!(h.player.toggle_stop_after_current());

        h.backend.finish_track();
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::StopAfterCurrent));
        assert!(!h.player.stop_after_current());
        assert_eq!(names(&h.player), ["t1", "t2", "t3"]);

        h.player.play().unwrap();
        h.backend.finish_track();
        assert!(h.player.is_playing());
    }

    #[test]
    fn linear_boundaries() {
        let h = harness(no_debounce(), &["t1", "t2"], 0);
        h.player.play().unwrap();

        assert_eq!(h.player.previous().unwrap(), Outcome::NoOp);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t1")));

        assert_eq!(h.player.next().unwrap(), Outcome::Succeeded);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t2")));

        assert_eq!(h.player.next().unwrap(), Outcome::Succeeded);
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::EndOfQueue));
        assert_eq!(names(&h.player), ["t1", "t2"]);
    }

    #[test]
    fn unavailable_media_leaves_state_unchanged() {
        let h = harness(no_debounce(), &["t1", "t2", "t3"], 0);
        h.backend.fail_on("t2");
        h.player.play().unwrap();

        let err = h.player.next().unwrap_err();
        assert!(matches!(
            &err,
            PlaybackError::MediaUnavailable { source: BackendError::Decode(_), .. }
        ));
        assert_eq!(err.track(), &TrackRef::from("t2"));
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t1")));
        assert!(h.player.is_playing());

        // stopped player stays stopped
        let h = harness(no_debounce(), &["bad"], 0);
        h.backend.fail_on("bad");
        assert!(h.player.play().is_err());
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn play_pause_and_resume() {
        let h = harness(no_debounce(), &["t1"], 0);
        assert_eq!(h.player.pause().unwrap(), Outcome::NoOp);

        h.player.play_pause().unwrap();
        assert!(h.player.is_playing());
        h.player.play_pause().unwrap();
        assert_eq!(h.player.status(), PlaybackStatus::Paused);
        assert_eq!(h.player.play().unwrap(), Outcome::Succeeded);

        assert_eq!(h.backend.calls(), [
            BackendCall::SetMedia(TrackRef::from("t1")),
            BackendCall::Play,
            BackendCall::Pause,
            BackendCall::Play,
        ]);
    }

    #[test]
    fn rapid_next_runs_once_now_and_once_trailing() {
        let h = harness(PlayerConfig::default(), &["t1", "t2", "t3", "t4", "t5"], 0);
        h.player.play().unwrap();

        let outcomes: Vec<Outcome> = (0..5).map(|_| h.player.next().unwrap()).collect();
        assert_eq!(outcomes[0], Outcome::Succeeded);
        assert!(outcomes[1..].iter().all(|o| *o == Outcome::Throttled));
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t2")));
        assert_eq!(h.timer.pending(), 1);

        assert_eq!(h.timer.fire_all(), 1);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t3")));
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn debounce_keys_do_not_interfere() {
        let h = harness(PlayerConfig::default(), &["t1", "t2", "t3"], 0);
        h.player.play().unwrap();

        assert_eq!(h.player.next().unwrap(), Outcome::Succeeded);
        assert_eq!(h.player.previous().unwrap(), Outcome::Succeeded);
        assert_eq!(h.player.play_pause().unwrap(), Outcome::Succeeded);
        assert_eq!(h.player.status(), PlaybackStatus::Paused);
        assert_eq!(h.player.play_pause().unwrap(), Outcome::Throttled);

        h.timer.fire_all();
        assert!(h.player.is_playing());
    }

    #[test]
    fn trailing_timer_after_player_dropped_is_harmless() {
        let h = harness(PlayerConfig::default(), &["t1", "t2", "t3"], 0);
        h.player.next().unwrap();
        h.player.next().unwrap();
        let timer = Arc::clone(&h.timer);
        drop(h);

        // dropping the player cancelled the pending timer
        assert_eq!(timer.pending(), 0);
        // even a late firing finds no player to act on
        assert_eq!(timer.fire_all_ignoring_cancellation(), 1);
    }

    #[test]
    fn shuffled_loop_never_runs_dry() {
        let h = harness(no_debounce(), &["a", "b", "c", "d"], 0);
        h.player.toggle_loop();
        assert!(h.player.toggle_shuffle());
        h.player.play().unwrap();

        let mut previous = h.player.current_track();
        for _ in 0..20 {
            assert_eq!(h.player.next().unwrap(), Outcome::Succeeded);
            let current = h.player.current_track();
            assert_ne!(current, previous);
            previous = current;
        }
        assert!(h.player.is_playing());
        assert_eq!(names(&h.player), ["a", "b", "c", "d"]);

        for _ in 0..20 {
            assert_eq!(h.player.previous().unwrap(), Outcome::Succeeded);
        }
        assert!(h.player.is_playing());
    }

    #[test]
    fn shuffled_without_loop_stops_after_every_track() {
        let h = harness(no_debounce(), &["a", "b", "c", "d"], 0);
        h.player.toggle_shuffle();
        let order = h.player.with_queue(|q| q.shuffled_order().to_vec()).unwrap();
        h.player.play_index(order[0]).unwrap();

        for expected in &order[1..] {
            h.player.next().unwrap();
            assert_eq!(h.player.snapshot().current_index, *expected);
        }
        h.player.next().unwrap();
        assert_eq!(h.player.last_stop_reason(), Some(StopReason::EndOfQueue));
    }

    struct ListView(Vec<TrackRef>);

    impl CurrentView for ListView {
        fn tracks(&self) -> Vec<TrackRef> {
            self.0.clone()
        }

        fn selected(&self) -> usize {
            1
        }
    }

    #[test]
    fn play_on_empty_queue_uses_current_view() {
        let backend = MemoryBackend::new();
        let player = Player::builder(backend.clone())
            .config(no_debounce())
            .timer(ManualTimer::new())
            .view(Box::new(ListView(tracks(&["v1", "v2"]))))
            .build();

        assert_eq!(player.play().unwrap(), Outcome::Succeeded);
        assert_eq!(names(&player), ["v1", "v2"]);
        assert_eq!(player.current_track(), Some(TrackRef::from("v2")));

        let bare = Player::builder(MemoryBackend::new()).timer(ManualTimer::new()).build();
        assert_eq!(bare.play().unwrap(), Outcome::NoOp);
        assert!(bare.set_view(Box::new(ListView(tracks(&["w1", "w2"])))));
        assert_eq!(bare.play().unwrap(), Outcome::Succeeded);
        assert_eq!(bare.current_track(), Some(TrackRef::from("w2")));
    }

    #[test]
    fn clear_queue_stops() {
        let h = harness(no_debounce(), &["t1", "t2"], 0);
        h.player.play().unwrap();
        h.player.clear_queue().unwrap();

        let snapshot = h.player.snapshot();
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.last_stop_reason, Some(StopReason::QueueCleared));
        assert_eq!(h.player.current_track(), None);
    }

    #[test]
    fn queue_edits_go_through_the_lock() {
        let h = harness(no_debounce(), &["t1", "t2"], 1);
        h.player.with_queue(|q| q.insert_after_current(tracks(&["x"]))).unwrap();
        h.player.with_queue(|q| q.reorder(0, 2)).unwrap();

        assert_eq!(names(&h.player), ["t2", "x", "t1"]);
        assert_eq!(h.player.current_track(), Some(TrackRef::from("t2")));
    }

    /// Reports end-of-track synchronously from the first `play()` call.
    struct EagerBackend {
        inner: MemoryBackend,
        fired: bool,
    }

    impl AudioBackend for EagerBackend {
        fn set_media(&mut self, track: &TrackRef) -> Result<(), BackendError> {
            self.inner.set_media(track)
        }

        fn play(&mut self) {
            self.inner.play();
            if !self.fired {
                self.fired = true;
                self.inner.finish_track();
            }
        }

        fn pause(&mut self) {
            self.inner.pause();
        }

        fn stop(&mut self) {
            self.inner.stop();
        }

        fn position_ms(&self) -> u64 {
            self.inner.position_ms()
        }

        fn duration_ms(&self) -> Option<u64> {
            self.inner.duration_ms()
        }

        fn on_end_reached(&mut self, callback: crate::backend::EndCallback) {
            self.inner.on_end_reached(callback);
        }
    }

    #[test]
    fn reentrant_track_end_is_applied_after_the_transition() {
        let inner = MemoryBackend::new();
        let mut store = QueueStore::with_seed(1);
        store.populate_and_play(tracks(&["t1", "t2"]), 0);
        let player = Player::builder(EagerBackend { inner: inner.clone(), fired: false })
            .config(no_debounce())
            .timer(ManualTimer::new())
            .queue(store)
            .build();

        assert_eq!(player.play().unwrap(), Outcome::Succeeded);

        // t1 "ended" while it was being started; the end was applied afterwards
        assert_eq!(names(&player), ["t2"]);
        assert_eq!(player.current_track(), Some(TrackRef::from("t2")));
        assert!(player.is_playing());
        assert_eq!(inner.loaded_tracks(), tracks(&["t1", "t2"]));
    }

    #[test]
    fn concurrent_commands_keep_queue_consistent() {
        let h = harness(no_debounce(), &["a", "b", "c", "d", "e", "f"], 0);
        h.player.toggle_loop();
        h.player.play().unwrap();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let player = h.player.clone();
                let backend = h.backend.clone();
                thread::spawn(move || {
                    for step in 0..200 {
                        match (worker + step) % 5 {
                            0 => {
                                let _ = player.next();
                            }
                            1 => {
                                let _ = player.previous();
                            }
                            2 => backend.finish_track(),
                            3 => {
                                player.with_queue(|q| q.reorder(step % 6, (step * 7) % 6));
                            }
                            _ => {
                                let _ = player.toggle_shuffle();
                            }
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = h.player.snapshot();
        assert_eq!(snapshot.queue.len(), 6);
        assert!(snapshot.current_index < 6);
        assert!(h.player.is_playing());
    }

    #[test]
    fn shutdown_cancels_pending_commands() {
        let h = harness(PlayerConfig::default(), &["t1", "t2", "t3"], 0);
        h.player.play().unwrap();
        h.player.next().unwrap();
        assert_eq!(h.player.next().unwrap(), Outcome::Throttled);

        h.player.shutdown();
        assert_eq!(h.timer.pending(), 0);
        assert_eq!(h.player.status(), PlaybackStatus::Stopped);
    }
}
