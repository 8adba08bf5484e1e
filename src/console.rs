use std::path::PathBuf;

/// One line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Stop,
    Record(PathBuf),
    StopRecord,
    Shot(PathBuf),
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };

        let command = match (name, arg) {
            ("play", "") | ("record", "") | ("shot", "") => {
                anyhow::bail!("`{}` needs an argument", name)
            }
            ("play", url) => Command::Play(url.to_string()),
            ("record", path) => Command::Record(PathBuf::from(path)),
            ("shot", path) => Command::Shot(PathBuf::from(path)),
            ("stop", "") => Command::Stop,
            ("stop-record", "") => Command::StopRecord,
            ("quit", "") | ("exit", "") => Command::Quit,
            _ => anyhow::bail!("unknown command: {}", line),
        };
        Ok(Some(command))
    }
}

pub const HELP: &str =
    "commands: play <url> | stop | record <path> | stop-record | shot <path> | quit";
