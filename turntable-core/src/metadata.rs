use std::path::Path;

use lofty::{ file::{ AudioFile, TaggedFileExt }, probe::Probe, tag::Accessor };

use crate::track::{ TrackMetadata, TrackRef };

/// Resolves a track to descriptive metadata.
///
/// Used for search and diagnostics only; nothing in the queue depends on the
/// answer.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, track: &TrackRef) -> Option<TrackMetadata>;
}

/// Reads tags and stream properties from the file with `lofty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyResolver;

impl LoftyResolver {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataResolver for LoftyResolver {
    fn resolve(&self, track: &TrackRef) -> Option<TrackMetadata> {
        let path = track.path();
        let tagged_file = match Probe::open(path).and_then(|p| p.read()) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("Failed to read metadata for {}: {}", track, e);
                return None;
            }
        };

        let mut metadata = TrackMetadata {
            duration: tagged_file.properties().duration().as_secs_f32(),
            format: file_extension(path),
            ..Default::default()
        };

        if let Some(tag) = tagged_file.primary_tag() {
            metadata.title = tag.title().map(|s| s.to_string());
            metadata.artist = tag.artist().map(|s| s.to_string());
            metadata.album = tag.album().map(|s| s.to_string());
            metadata.genre = tag.genre().map(|s| s.to_string());
        }

        if metadata.title.is_none() {
            metadata.title = track.stem().map(|s| s.to_string());
        }

        Some(metadata)
    }
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}
