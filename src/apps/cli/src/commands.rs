//! REPL input parsing

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Attach(PathBuf),
    Detach(String),
    /// 1-based index among user turns.
    Edit { index: usize, text: String },
    Regenerate,
    Cancel,
    Clear,
    History,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  <text>              ask the assistant
  /attach <path>      attach a PDF, Word or text file to the next message
  /detach <filename>  drop a pending attachment
  /edit <n> <text>    rewrite your n-th message and ask again
  /regen              regenerate the last reply
  /cancel             stop the current request
  /clear              start over
  /history            print the conversation
  /help               show this help
  /quit               exit";

/// `Ok(None)` for blank input.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "attach" => {
            if args.is_empty() {
                bail!("usage: /attach <path>");
            }
            Command::Attach(PathBuf::from(args))
        }
        "detach" => {
            if args.is_empty() {
                bail!("usage: /detach <filename>");
            }
            Command::Detach(args.to_string())
        }
        "edit" => {
            let (index, text) = args
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: /edit <n> <text>"))?;
            let index: usize = index
                .parse()
                .map_err(|_| anyhow!("invalid message number: {}", index))?;
            if index == 0 {
                bail!("message numbers start at 1");
            }
            Command::Edit {
                index,
                text: text.trim().to_string(),
            }
        }
        "regen" | "regenerate" => Command::Regenerate,
        "cancel" | "stop" => Command::Cancel,
        "clear" => Command::Clear,
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command: /{} (try /help)", other),
    };
    Ok(Some(command))
}
