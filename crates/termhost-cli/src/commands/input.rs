//! Console command parsing

use std::path::PathBuf;

/// Lines of history requested by `replay` when no count is given
const DEFAULT_REPLAY_LINES: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Spawn { id: String, cwd: Option<PathBuf> },
    Write { id: String, data: String },
    Resize { id: String, cols: u16, rows: u16 },
    Kill { id: String, reason: Option<String> },
    Trash { id: String },
    Restore { id: String },
    List { project: Option<String> },
    Info { id: String },
    State { id: String },
    Replay { id: String, max_lines: u32 },
    KillProject { project: String },
    Stats { project: String },
    Project { id: String, path: Option<PathBuf> },
    PauseAll,
    ResumeAll,
    Sleep,
    Wake,
    Health,
    Crashes,
    Help,
    Quit,
}

pub const HELP: &str = "\
spawn <id> [cwd]            create a shell session
write <id> <text>           send input (\\n, \\r, \\t escapes; Enter appended)
resize <id> <cols> <rows>   resize a session
kill <id> [reason]          close a session
trash <id> | restore <id>   move a session to or from the trash
list [project]              list sessions known to the backend
info <id> | state <id>      session details | serialized screen state
replay <id> [lines]         re-emit scrollback
kill-project <project>      close every session of a project
stats <project>             per-project counters
project <id> [path]         select the active project
pause | resume              pause or resume all terminal output
sleep | wake                suspend or resume heartbeats around system sleep
health | crashes            supervisor status | recent crash records
quit";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let mut args = rest.split_whitespace();

        let command = match verb {
            "spawn" => Self::Spawn {
                id: required(args.next(), "id")?,
                cwd: args.next().map(PathBuf::from),
            },
            "write" => {
                let (id, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: write <id> <text>".to_string())?;
                Self::Write {
                    id: id.to_string(),
                    data: format!("{}\r", unescape(text.trim_start())),
                }
            }
            "resize" => Self::Resize {
                id: required(args.next(), "id")?,
                cols: number(args.next(), "cols")?,
                rows: number(args.next(), "rows")?,
            },
            "kill" => {
                let id = required(args.next(), "id")?;
                let reason: Vec<&str> = args.collect();
                Self::Kill {
                    id,
                    reason: (!reason.is_empty()).then(|| reason.join(" ")),
                }
            }
            "trash" => Self::Trash {
                id: required(args.next(), "id")?,
            },
            "restore" => Self::Restore {
                id: required(args.next(), "id")?,
            },
            "list" | "ls" => Self::List {
                project: args.next().map(str::to_string),
            },
            "info" => Self::Info {
                id: required(args.next(), "id")?,
            },
            "state" => Self::State {
                id: required(args.next(), "id")?,
            },
            "replay" => Self::Replay {
                id: required(args.next(), "id")?,
                max_lines: match args.next() {
                    Some(raw) => number(Some(raw), "lines")?,
                    None => DEFAULT_REPLAY_LINES,
                },
            },
            "kill-project" => Self::KillProject {
                project: required(args.next(), "project")?,
            },
            "stats" => Self::Stats {
                project: required(args.next(), "project")?,
            },
            "project" => Self::Project {
                id: required(args.next(), "project id")?,
                path: args.next().map(PathBuf::from),
            },
            "pause" => Self::PauseAll,
            "resume" => Self::ResumeAll,
            "sleep" => Self::Sleep,
            "wake" => Self::Wake,
            "health" => Self::Health,
            "crashes" => Self::Crashes,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };
        Ok(command)
    }
}

fn required(value: Option<&str>, name: &str) -> Result<String, String> {
    value
        .map(str::to_string)
        .ok_or_else(|| format!("missing <{name}>"))
}

fn number<T: std::str::FromStr>(value: Option<&str>, name: &str) -> Result<T, String> {
    let raw = value.ok_or_else(|| format!("missing <{name}>"))?;
    raw.parse()
        .map_err(|_| format!("<{name}> must be a number, got '{raw}'"))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('e') => out.push('\u{1b}'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
