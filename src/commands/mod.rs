//! Slash commands typed at the chat prompt.
//!
//! Parsing is pure: [`process_input`] turns a line into either a message to
//! send or a [`ChatCommand`] for the chat loop to run against the session.

mod registry;

pub use registry::{all_commands, find_command, Command, CommandInvocation};

use std::path::PathBuf;

use crate::core::backend::BackendId;
use crate::core::live::devices::AudioFiles;
use crate::core::message::Modification;
use crate::core::profile::Gender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    /// Regenerate a model message; `None` targets the newest one.
    Regenerate {
        number: Option<usize>,
        modification: Option<Modification>,
    },
    Edit {
        number: usize,
        text: String,
    },
    Copy(Option<usize>),
    /// `None` toggles to the other backend.
    Backend(Option<BackendId>),
    ContentPolicy {
        unfiltered: bool,
    },
    Search(String),
    Attach(Vec<PathBuf>),
    /// `None` clears the whole tray.
    Detach(Option<usize>),
    Gallery,
    /// Talk through the machine's devices, or through WAV files when set.
    Voice(AudioFiles),
    Profile {
        name: String,
        gender: Gender,
    },
    Reset,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    ProcessAsMessage(String),
    Run(ChatCommand),
    /// The command exists but its arguments did not parse.
    Usage(&'static str),
}

pub fn process_input(input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match find_command(command_name) {
        Some(command) => (command.handler)(CommandInvocation {
            name: command.name,
            args,
        }),
        None => CommandResult::ProcessAsMessage(input.to_string()),
    }
}

pub fn help_text() -> String {
    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:<28} {}\n", command.usage, command.help));
    }
    help
}

fn parse_number(arg: &str) -> Option<usize> {
    arg.parse().ok().filter(|number| *number > 0)
}

pub(super) fn handle_help(_invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Run(ChatCommand::Help)
}

pub(super) fn handle_regenerate(invocation: CommandInvocation<'_>) -> CommandResult {
    let modification = match invocation.name {
        "shorter" => Some(Modification::Shorter),
        "longer" => Some(Modification::Longer),
        _ => None,
    };
    let number = match invocation.args {
        "" => None,
        arg => match parse_number(arg) {
            Some(number) => Some(number),
            None => return CommandResult::Usage("Usage: /regen|/shorter|/longer [message number]"),
        },
    };
    CommandResult::Run(ChatCommand::Regenerate {
        number,
        modification,
    })
}

pub(super) fn handle_edit(invocation: CommandInvocation<'_>) -> CommandResult {
    let mut parts = invocation.args.splitn(2, ' ');
    let number = parts.next().and_then(parse_number);
    let text = parts.next().unwrap_or("").trim();
    match number {
        Some(number) if !text.is_empty() => CommandResult::Run(ChatCommand::Edit {
            number,
            text: text.to_string(),
        }),
        _ => CommandResult::Usage("Usage: /edit <message number> <new text>"),
    }
}

pub(super) fn handle_copy(invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.args {
        "" => CommandResult::Run(ChatCommand::Copy(None)),
        arg => match parse_number(arg) {
            Some(number) => CommandResult::Run(ChatCommand::Copy(Some(number))),
            None => CommandResult::Usage("Usage: /copy [message number]"),
        },
    }
}

pub(super) fn handle_backend(invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.args {
        "" => CommandResult::Run(ChatCommand::Backend(None)),
        arg => match BackendId::try_from(arg) {
            Ok(backend) => CommandResult::Run(ChatCommand::Backend(Some(backend))),
            Err(_) => CommandResult::Usage("Usage: /backend [primary|alternate]"),
        },
    }
}

pub(super) fn handle_nsfw(invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.args.to_ascii_lowercase().as_str() {
        "on" => CommandResult::Run(ChatCommand::ContentPolicy { unfiltered: true }),
        "off" => CommandResult::Run(ChatCommand::ContentPolicy { unfiltered: false }),
        _ => CommandResult::Usage("Usage: /nsfw on|off"),
    }
}

pub(super) fn handle_search(invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::Usage("Usage: /search <text>");
    }
    CommandResult::Run(ChatCommand::Search(invocation.args.to_string()))
}

pub(super) fn handle_attach(invocation: CommandInvocation<'_>) -> CommandResult {
    let paths: Vec<PathBuf> = invocation
        .args
        .split_whitespace()
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        return CommandResult::Usage("Usage: /attach <file> [file...]");
    }
    CommandResult::Run(ChatCommand::Attach(paths))
}

pub(super) fn handle_detach(invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.args {
        "" => CommandResult::Run(ChatCommand::Detach(None)),
        arg => match parse_number(arg) {
            Some(number) => CommandResult::Run(ChatCommand::Detach(Some(number))),
            None => CommandResult::Usage("Usage: /detach [attachment number]"),
        },
    }
}

pub(super) fn handle_gallery(_invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Run(ChatCommand::Gallery)
}

pub(super) fn handle_voice(invocation: CommandInvocation<'_>) -> CommandResult {
    let parts: Vec<&str> = invocation.args.split_whitespace().collect();
    match parts.as_slice() {
        [] => CommandResult::Run(ChatCommand::Voice(AudioFiles::default())),
        [input, output] => CommandResult::Run(ChatCommand::Voice(AudioFiles {
            input: Some(PathBuf::from(input)),
            output: Some(PathBuf::from(output)),
        })),
        _ => CommandResult::Usage("Usage: /voice [<input.wav> <output.wav>]"),
    }
}

pub(super) fn handle_profile(invocation: CommandInvocation<'_>) -> CommandResult {
    let Some((name, gender)) = invocation.args.rsplit_once(' ') else {
        return CommandResult::Usage("Usage: /profile <name> <male|female>");
    };
    match (name.trim(), Gender::try_from(gender)) {
        (name, Ok(gender)) if !name.is_empty() => CommandResult::Run(ChatCommand::Profile {
            name: name.to_string(),
            gender,
        }),
        _ => CommandResult::Usage("Usage: /profile <name> <male|female>"),
    }
}

pub(super) fn handle_reset(_invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Run(ChatCommand::Reset)
}

pub(super) fn handle_quit(_invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Run(ChatCommand::Quit)
}

#[cfg(test)]
mod tests;
