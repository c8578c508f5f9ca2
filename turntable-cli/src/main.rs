use std::fs::canonicalize;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{ Receiver, RecvTimeoutError };

use turntable_core::library::{ DirectoryView, ExistenceCheck, FsExistence, list_directory };
use turntable_core::metadata::{ LoftyResolver, MetadataResolver };
use turntable_core::{ CommandResult, Outcome, Player, PlayerBuilder, PlayerConfig, SimulatedBackend, TrackRef };

mod input;
mod view;

use input::Command;

/// Terminal audio player with a carousel-style playback queue
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TURNTABLE_CONFIG")]
    config: Option<PathBuf>,

    /// Start with loop (carousel) mode on
    #[arg(long = "loop")]
    loop_enabled: bool,

    /// Start with shuffle on
    #[arg(long)]
    shuffle: bool,

    /// Queue position to start playing from
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Advance through tracks on a timer instead of playing audio
    #[arg(long)]
    simulate: bool,

    /// Files or directories to queue
    paths: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Starting turntable");

    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    config.playback.loop_enabled |= args.loop_enabled;
    config.playback.shuffle_enabled |= args.shuffle;

    let check = config.existence_check();
    let mut builder = builder(&args)?.config(config);
    if let Some(dir) = browse_dir(&args.paths) {
        log::info!("Browsing {}", dir.display());
        builder = builder.view(Box::new(DirectoryView::new(dir, check.clone())));
    }
    let player = builder.build();

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    input::spawn_reader(cmd_tx).context("Failed to start input thread")?;

    setup_initial_queue(&player, &args, &check);

    let resolver = LoftyResolver::new();
    println!("{}", input::help_text());
    run(&player, cmd_rx, &resolver, &check);

    player.shutdown();
    Ok(())
}

#[cfg(feature = "rodio")]
fn builder(args: &Args) -> anyhow::Result<PlayerBuilder> {
    if args.simulate {
        return Ok(Player::builder(SimulatedBackend::new()));
    }
    let backend = turntable_core::RodioBackend::new().context("Failed to open audio output")?;
    Ok(Player::builder(backend))
}

#[cfg(not(feature = "rodio"))]
fn builder(args: &Args) -> anyhow::Result<PlayerBuilder> {
    if !args.simulate {
        log::warn!("Built without audio output, simulating playback");
    }
    Ok(Player::builder(SimulatedBackend::new()))
}

/// Directory shown as the current view: the first path if it is a
/// directory, else its parent.
fn browse_dir(paths: &[PathBuf]) -> Option<PathBuf> {
    let first = paths.first()?;
    let path = canonicalize(first).unwrap_or_else(|_| first.clone());
    if path.is_dir() {
        Some(path)
    } else {
        path.parent().map(Path::to_path_buf)
    }
}

/// Files stay as given, directories are replaced by their playable files.
fn expand_paths(paths: Vec<PathBuf>, check: &FsExistence) -> Vec<PathBuf> {
    paths
        .into_iter()
        .flat_map(|path| {
            if !path.is_dir() {
                return vec![path];
            }
            list_directory(&path, check).unwrap_or_else(|e| {
                log::warn!("Cannot list {}: {}", path.display(), e);
                Vec::new()
            })
        })
        .collect()
}

fn setup_initial_queue(player: &Player, args: &Args, check: &FsExistence) {
    if args.paths.is_empty() {
        return;
    }

    let tracks: Vec<TrackRef> = expand_paths(args.paths.clone(), check)
        .into_iter()
        .filter(|path| check.is_playable(path))
        .map(TrackRef::from)
        .collect();
    log::info!("Adding {} files to queue from CLI", tracks.len());
    report(player.populate_and_play(tracks, args.start));
}

fn run(player: &Player, commands: Receiver<Command>, resolver: &dyn MetadataResolver, check: &FsExistence) {
    let mut shown = player.now_playing();

    loop {
        match commands.recv_timeout(Duration::from_millis(250)) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(command, player, resolver, check),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Input closed");
                break;
            }
        }

        // Auto-advance happens behind our back
        let now = player.now_playing();
        if now != shown {
            if let Some(track) = &now {
                println!("▶ {}", view::track_label(track, resolver));
            }
            shown = now;
        }
    }
}

fn execute(command: Command, player: &Player, resolver: &dyn MetadataResolver, check: &FsExistence) {
    let result = match command {
        Command::Play => player.play(),
        Command::Pause => player.pause(),
        Command::Toggle => player.play_pause(),
        Command::Stop => player.stop(),
        Command::Next => player.next(),
        Command::Previous => player.previous(),
        Command::Loop => {
            println!("loop {}", if player.toggle_loop() { "on" } else { "off" });
            return;
        }
        Command::Shuffle => {
            println!("shuffle {}", if player.toggle_shuffle() { "on" } else { "off" });
            return;
        }
        Command::StopAfter => {
            let armed = player.toggle_stop_after_current();
            println!("{}", if armed { "stopping after this track" } else { "continuing after this track" });
            return;
        }
        Command::Add(paths) => {
            let paths = expand_paths(paths, check);
            let added = player.with_queue(|q| q.process_dropped_paths(paths, check)).unwrap_or(0);
            println!("added {} tracks", added);
            return;
        }
        Command::Insert(paths) => {
            let tracks: Vec<TrackRef> = expand_paths(paths, check)
                .into_iter()
                .filter(|path| check.exists(path))
                .map(TrackRef::from)
                .collect();
            let count = tracks.len();
            player.with_queue(|q| q.insert_after_current(tracks));
            println!("inserted {} tracks", count);
            return;
        }
        Command::Remove(index) => {
            match player.with_queue(|q| q.remove_at(index)).flatten() {
                Some(track) => println!("removed {}", view::track_label(&track, resolver)),
                None => println!("no track at {}", index),
            }
            return;
        }
        Command::Move(from, to) => {
            if player.with_queue(|q| q.reorder(from, to)) != Some(true) {
                println!("cannot move {} to {}", from, to);
            }
            return;
        }
        Command::Jump(index) => player.play_index(index),
        Command::ToTail => {
            player.with_queue(|q| q.move_current_to_end());
            view::print_queue(&player.snapshot(), resolver);
            return;
        }
        Command::ToHead => {
            player.with_queue(|q| q.move_last_to_beginning());
            view::print_queue(&player.snapshot(), resolver);
            return;
        }
        Command::Clear => player.clear_queue(),
        Command::List => {
            view::print_queue(&player.snapshot(), resolver);
            return;
        }
        Command::Find(text) => {
            let matches = player.with_queue(|q| q.search(&text, resolver)).unwrap_or_default();
            view::print_matches(&matches, resolver);
            return;
        }
        Command::Status => {
            let line = view::status_line(&player.snapshot(), player.position_ms(), player.duration_ms(), resolver);
            println!("{}", line);
            return;
        }
        Command::Help => {
            println!("{}", input::help_text());
            return;
        }
        Command::Quit => return,
    };
    report(result);
}

fn report(result: CommandResult) {
    match result {
        Ok(Outcome::Throttled) => log::debug!("Command throttled"),
        Ok(Outcome::NoOp) => println!("nothing to do"),
        Ok(_) => {}
        Err(e) => eprintln!("error: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directories_expand_to_playable_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp3", "a.flac", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let loose = PathBuf::from("loose.ogg");

        let expanded = expand_paths(vec![dir.path().to_path_buf(), loose.clone()], &FsExistence::default());
        assert_eq!(expanded, [dir.path().join("a.flac"), dir.path().join("b.mp3"), loose]);
    }

    #[test]
    fn browse_dir_of_a_file_is_its_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"").unwrap();

        let expected = canonicalize(dir.path()).unwrap();
        assert_eq!(browse_dir(&[file]), Some(expected.clone()));
        assert_eq!(browse_dir(&[dir.path().to_path_buf()]), Some(expected));
        assert_eq!(browse_dir(&[]), None);
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["turntable", "--loop", "--start", "2", "a.mp3", "b.mp3"]).unwrap();
        assert!(args.loop_enabled);
        assert!(!args.shuffle);
        assert_eq!(args.start, 2);
        assert_eq!(args.paths.len(), 2);
    }
}
