use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;

use anyhow::{ Context, anyhow, bail };
use crossbeam_channel::Sender;
use strum::{ EnumIter, EnumString, IntoEnumIterator };

/// First word of an input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Verb {
    #[strum(serialize = "play")]
    Play,
    #[strum(serialize = "pause")]
    Pause,
    #[strum(serialize = "t", serialize = "toggle")]
    Toggle,
    #[strum(serialize = "s", serialize = "stop")]
    Stop,
    #[strum(serialize = "n", serialize = "next")]
    Next,
    #[strum(serialize = "p", serialize = "prev", serialize = "previous")]
    Previous,
    #[strum(serialize = "l", serialize = "loop")]
    Loop,
    #[strum(serialize = "r", serialize = "shuffle")]
    Shuffle,
    #[strum(serialize = "a", serialize = "after")]
    StopAfter,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "insert")]
    Insert,
    #[strum(serialize = "rm", serialize = "remove")]
    Remove,
    #[strum(serialize = "mv", serialize = "move")]
    Move,
    #[strum(serialize = "j", serialize = "jump")]
    Jump,
    #[strum(serialize = "tail")]
    ToTail,
    #[strum(serialize = "head")]
    ToHead,
    #[strum(serialize = "clear")]
    Clear,
    #[strum(serialize = "ls", serialize = "queue")]
    List,
    #[strum(serialize = "find", serialize = "/")]
    Find,
    #[strum(serialize = "status", serialize = "?")]
    Status,
    #[strum(serialize = "h", serialize = "help")]
    Help,
    #[strum(serialize = "q", serialize = "quit")]
    Quit,
}

impl Verb {
    fn usage(self) -> &'static str {
        match self {
            Verb::Play => "play                 start or resume",
            Verb::Pause => "pause                pause",
            Verb::Toggle => "t, toggle            play/pause",
            Verb::Stop => "s, stop              stop",
            Verb::Next => "n, next              next track",
            Verb::Previous => "p, prev              previous track",
            Verb::Loop => "l, loop              toggle loop (carousel)",
            Verb::Shuffle => "r, shuffle           toggle shuffle",
            Verb::StopAfter => "a, after             stop after the current track",
            Verb::Add => "add <path>...        append files or directories",
            Verb::Insert => "insert <path>...     queue right after the current track",
            Verb::Remove => "rm <index>           remove from the queue",
            Verb::Move => "mv <from> <to>       reorder the queue",
            Verb::Jump => "j, jump <index>      play a queue position",
            Verb::ToTail => "tail                 move the current track to the end",
            Verb::ToHead => "head                 bring the last track to the front",
            Verb::Clear => "clear                stop and empty the queue",
            Verb::List => "ls, queue            show the queue",
            Verb::Find => "find <text>          search titles, artists, albums",
            Verb::Status => "status               show what is playing",
            Verb::Help => "h, help              this list",
            Verb::Quit => "q, quit              exit",
        }
    }
}

pub fn help_text() -> String {
    Verb::iter().map(|verb| format!("  {}\n", verb.usage())).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Previous,
    Loop,
    Shuffle,
    StopAfter,
    Add(Vec<PathBuf>),
    Insert(Vec<PathBuf>),
    Remove(usize),
    Move(usize, usize),
    Jump(usize),
    ToTail,
    ToHead,
    Clear,
    List,
    Find(String),
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    let Some(word) = line.split_whitespace().next() else {
        return Ok(None);
    };
    let rest = line[word.len()..].trim();
    let verb = Verb::from_str(word).map_err(|_| anyhow!("unknown command {:?}, try 'help'", word))?;

    let command = match verb {
        Verb::Play => Command::Play,
        Verb::Pause => Command::Pause,
        Verb::Toggle => Command::Toggle,
        Verb::Stop => Command::Stop,
        Verb::Next => Command::Next,
        Verb::Previous => Command::Previous,
        Verb::Loop => Command::Loop,
        Verb::Shuffle => Command::Shuffle,
        Verb::StopAfter => Command::StopAfter,
        Verb::Add => Command::Add(paths(rest)?),
        Verb::Insert => Command::Insert(paths(rest)?),
        Verb::Remove => Command::Remove(index(rest)?),
        Verb::Move => {
            let mut parts = rest.split_whitespace();
            let (Some(from), Some(to), None) = (parts.next(), parts.next(), parts.next()) else {
                bail!("usage: mv <from> <to>");
            };
            Command::Move(index(from)?, index(to)?)
        }
        Verb::Jump => Command::Jump(index(rest)?),
        Verb::ToTail => Command::ToTail,
        Verb::ToHead => Command::ToHead,
        Verb::Clear => Command::Clear,
        Verb::List => Command::List,
        Verb::Find => Command::Find(rest.to_string()),
        Verb::Status => Command::Status,
        Verb::Help => Command::Help,
        Verb::Quit => Command::Quit,
    };
    Ok(Some(command))
}

fn paths(rest: &str) -> anyhow::Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!("expected at least one path");
    }
    Ok(paths)
}

fn index(word: &str) -> anyhow::Result<usize> {
    word.trim()
        .parse()
        .with_context(|| format!("expected a queue position, got {:?}", word))
}

/// Read stdin on its own thread and forward parsed commands.
///
/// The channel disconnects when stdin closes.
pub fn spawn_reader(tx: Sender<Command>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("turntable-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("Failed to read input: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(command)) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{e:#}"),
                }
            }
        })
}
