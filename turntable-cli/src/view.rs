use turntable_core::metadata::MetadataResolver;
use turntable_core::{ PlaybackStatus, PlayerSnapshot, TrackRef };

/// Title from the tags, else the file name
pub fn track_label(track: &TrackRef, resolver: &dyn MetadataResolver) -> String {
    resolver
        .resolve(track)
        .and_then(|meta| {
            let title = meta.title?;
            Some(match meta.artist {
                Some(artist) => format!("{} - {}", title, artist),
                None => title,
            })
        })
        .unwrap_or_else(|| {
            track
                .path()
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        })
}

pub fn format_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

pub fn print_queue(snapshot: &PlayerSnapshot, resolver: &dyn MetadataResolver) {
    if snapshot.queue.is_empty() {
        println!("Queue is empty. Use 'add <path>' to fill it.");
        return;
    }

    println!("Queue ({} tracks)", snapshot.queue.len());
    for (i, track) in snapshot.queue.iter().enumerate() {
        let prefix = if i == snapshot.current_index { "▶" } else { " " };
        println!("{} {:>3}  {}", prefix, i, track_label(track, resolver));
    }
}

pub fn print_matches(matches: &[(usize, TrackRef)], resolver: &dyn MetadataResolver) {
    if matches.is_empty() {
        println!("No matches.");
    }
    for (i, track) in matches {
        println!("  {:>3}  {}", i, track_label(track, resolver));
    }
}

pub fn status_line(
    snapshot: &PlayerSnapshot,
    position_ms: u64,
    duration_ms: Option<u64>,
    resolver: &dyn MetadataResolver,
) -> String {
    let track = match (snapshot.status, snapshot.now_playing.as_ref()) {
        (PlaybackStatus::Stopped, _) | (_, None) => match snapshot.last_stop_reason {
            Some(reason) => format!("stopped ({})", reason),
            None => "stopped".to_string(),
        },
        (status, Some(track)) => {
            let total = duration_ms.map(format_time).unwrap_or_else(|| "--:--".to_string());
            format!(
                "{} {} [{} / {}]",
                status,
                track_label(track, resolver),
                format_time(position_ms),
                total
            )
        }
    };

    format!(
        "{}  | loop {} | shuffle {}{}",
        track,
        on_off(snapshot.loop_enabled),
        on_off(snapshot.shuffle_enabled),
        if snapshot.stop_after_current { " | stopping after this track" } else { "" }
    )
}
