use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle to a playable item.
///
/// The queue never looks inside a `TrackRef`; collaborators resolve it to
/// audio and metadata. Cloning is cheap and the referenced path never changes
/// once the track is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    path: Arc<Path>,
}

impl TrackRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self {
            path: Arc::from(path.into_boxed_path()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used when no tag title exists
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }
}

impl From<PathBuf> for TrackRef {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&str> for TrackRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Descriptive data for a track, as resolved by a [`MetadataResolver`].
///
/// [`MetadataResolver`]: crate::metadata::MetadataResolver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    /// Track title (falls back to the file stem)
    pub title: Option<String>,
    /// Artist (if many then separated by semicolon)
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// Duration in seconds
    pub duration: f32,
    /// Audio format (mp3, flac, wav, ogg, etc)
    pub format: String,
}

impl TrackMetadata {
    /// Case-insensitive substring match over the descriptive fields.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.artist, &self.album, &self.genre]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

impl Display for TrackMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mins = (self.duration / 60.0).floor() as u64;
        let secs = (self.duration % 60.0).floor() as u64;
        let title = self.title.as_deref().unwrap_or("Unknown Title");
        let artist = self.artist.as_deref().unwrap_or("Unknown Artist");

        write!(f, "{} - {} [{:02}:{:02}]", title, artist, mins, secs)?;
        if let Some(album) = &self.album {
            write!(f, " ({})", album)?;
        }
        Ok(())
    }
}
