use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::library::ExistenceCheck;
use crate::metadata::MetadataResolver;
use crate::shuffle::shuffled_positions;
use crate::track::TrackRef;

/// The playback queue.
///
/// Holds the ordered tracks, the pointer to the current one and the shuffle
/// state. `current_index` is always a valid position while the queue has
/// items, and `0` when it is empty.
///
/// Operations on indices that do not exist are silent no-ops: the queue is
/// driven from a UI whose displayed state may lag behind.
#[derive(Debug, Clone)]
pub struct QueueStore {
    items: Vec<TrackRef>,
    current_index: usize,
    shuffle_enabled: bool,
    /// Materialized permutation of `0..items.len()`; `None` until needed again
    /// after any structural change.
    shuffled_order: Option<Vec<usize>>,
    rng: StdRng,
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Queue whose shuffle orders are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            items: Vec::new(),
            current_index: 0,
            shuffle_enabled: false,
            shuffled_order: None,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[TrackRef] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&TrackRef> {
        self.items.get(index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Get current track
    pub fn current(&self) -> Option<&TrackRef> {
        self.items.get(self.current_index)
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    // ==============================================
    // Structural edits
    // ==============================================

    /// Replace the whole queue and point at `start_index` (clamped).
    ///
    /// Returns the track to play, or `None` when `items` is empty.
    pub fn populate_and_play(&mut self, items: Vec<TrackRef>, start_index: usize) -> Option<TrackRef> {
        self.items = items;
        self.current_index = if self.items.is_empty() {
            0
        } else {
            start_index.min(self.items.len() - 1)
        };
        self.invalidate_shuffle();
        self.current().cloned()
    }

    /// Splice `items` right after the current track. The pointer keeps
    /// referring to the same track. On an empty queue this is an append.
    pub fn insert_after_current(&mut self, items: Vec<TrackRef>) {
        if items.is_empty() {
            return;
        }
        if self.items.is_empty() {
            self.add_to_end(items);
            return;
        }
        let at = self.current_index + 1;
        self.items.splice(at..at, items);
        self.invalidate_shuffle();
    }

    /// Append to the tail. The pointer is untouched.
    pub fn add_to_end(&mut self, items: Vec<TrackRef>) {
        if items.is_empty() {
            return;
        }
        self.items.extend(items);
        self.invalidate_shuffle();
    }

    /// Remove the track at `index`, returning it.
    ///
    /// Removing the current track leaves the pointer on whatever moved into
    /// its place, or on the new last track when the tail was removed.
    pub fn remove_at(&mut self, index: usize) -> Option<TrackRef> {
        if index >= self.items.len() {
            log::debug!("remove_at({}) ignored, queue has {} items", index, self.items.len());
            return None;
        }

        let removed = self.items.remove(index);
        if self.items.is_empty() {
            self.current_index = 0;
        } else if index < self.current_index {
            self.current_index -= 1;
        } else if self.current_index >= self.items.len() {
            self.current_index = self.items.len() - 1;
        }
        self.invalidate_shuffle();
        Some(removed)
    }

    /// Move the track at `from` so that it ends up at `to`.
    ///
    /// The pointer keeps referring to the same logical track. Returns `false`
    /// (and changes nothing) when either index is out of range.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.items.len();
        if from >= len || to >= len {
            log::debug!("reorder({}, {}) ignored, queue has {} items", from, to, len);
            return false;
        }
        if from == to {
            return true;
        }

        let track = self.items.remove(from);
        self.items.insert(to, track);

        let current = self.current_index;
        self.current_index = if from == current {
            to
        } else if from < current && to >= current {
            current - 1
        } else if from > current && to <= current {
            current + 1
        } else {
            current
        };
        self.invalidate_shuffle();
        true
    }

    /// Carousel step forward: the current track goes to the tail and the one
    /// after it becomes the head. The pointer ends at `0`.
    pub fn move_current_to_end(&mut self) -> bool {
        if self.items.len() <= 1 {
            return false;
        }
        self.rotate_current_to_front();
        self.items.rotate_left(1);
        self.current_index = 0;
        self.invalidate_shuffle();
        true
    }

    /// Carousel step backward: the tail track becomes the head. The pointer
    /// ends at `0`.
    pub fn move_last_to_beginning(&mut self) -> bool {
        if self.items.len() <= 1 {
            return false;
        }
        self.rotate_current_to_front();
        self.items.rotate_right(1);
        self.current_index = 0;
        self.invalidate_shuffle();
        true
    }

    // Keeps the cyclic order, so the carousel continues from the current track
    fn rotate_current_to_front(&mut self) {
        if self.current_index > 0 {
            self.items.rotate_left(self.current_index);
            self.current_index = 0;
        }
    }

    /// Point at `index`. Returns `false` for an out-of-range index.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.current_index = index;
        true
    }

    /// Clear all items from queue
    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = 0;
        self.invalidate_shuffle();
    }

    // ==============================================
    // Shuffle
    // ==============================================

    /// Flip shuffle and return the new state
    pub fn toggle_shuffle(&mut self) -> bool {
        self.set_shuffle(!self.shuffle_enabled);
        self.shuffle_enabled
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle_enabled = enabled;
        self.invalidate_shuffle();
    }

    /// The shuffled traversal order, generated on first use after any change
    /// and then reused until the next one.
    pub fn shuffled_order(&mut self) -> &[usize] {
        let len = self.items.len();
        let rng = &mut self.rng;
        self.shuffled_order
            .get_or_insert_with(|| shuffled_positions(len, rng))
    }

    /// Drop the memoized order so the next traversal draws a fresh one
    pub fn invalidate_shuffle(&mut self) {
        self.shuffled_order = None;
    }

    // ==============================================
    // Traversal
    // ==============================================

    /// Position after `index` in a queue of `len` tracks, or `None` at the end.
    ///
    /// Follows the shuffled order when shuffle is enabled. Never wraps.
    pub fn next_index(&mut self, index: usize, len: usize) -> Option<usize> {
        self.step(index, len, Direction::Forward)
    }

    /// Position before `index`, or `None` at the start. Never wraps.
    pub fn previous_index(&mut self, index: usize, len: usize) -> Option<usize> {
        self.step(index, len, Direction::Backward)
    }

    fn step(&mut self, index: usize, len: usize, direction: Direction) -> Option<usize> {
        if index >= len {
            return None;
        }

        if !self.shuffle_enabled {
            return match direction {
                Direction::Forward => (index + 1 < len).then_some(index + 1),
                Direction::Backward => index.checked_sub(1),
            };
        }

        if len != self.items.len() {
            log::debug!("shuffled step with stale length {} (queue has {})", len, self.items.len());
            return None;
        }
        let order = self.shuffled_order();
        let pos = order.iter().position(|&i| i == index)?;
        match direction {
            Direction::Forward => order.get(pos + 1).copied(),
            Direction::Backward => pos.checked_sub(1).map(|p| order[p]),
        }
    }

    // ==============================================
    // Lookups
    // ==============================================

    /// Tracks whose resolved metadata contains `text` (case-insensitive),
    /// in queue order. A blank query matches everything.
    pub fn search(&self, text: &str, resolver: &dyn MetadataResolver) -> Vec<(usize, TrackRef)> {
        let needle = text.trim().to_lowercase();
        self.items
            .iter()
            .enumerate()
            .filter(|(_, track)| {
                needle.is_empty()
                    || resolver.resolve(track).is_some_and(|meta| meta.matches(&needle))
            })
            .map(|(i, track)| (i, track.clone()))
            .collect()
    }

    /// Append the dropped paths that exist as playable media, in order.
    /// Returns how many were added.
    pub fn process_dropped_paths(&mut self, paths: Vec<PathBuf>, check: &dyn ExistenceCheck) -> usize {
        let accepted: Vec<TrackRef> = paths
            .into_iter()
            .filter(|path| {
                let ok = check.exists(path);
                if !ok {
                    log::debug!("Dropped path {:?} skipped", path);
                }
                ok
            })
            .map(TrackRef::from)
            .collect();
        let count = accepted.len();
        self.add_to_end(accepted);
        count
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}
