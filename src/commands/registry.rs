use super::CommandResult;

pub type CommandHandler = fn(CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    /// Canonical name of the matched command.
    pub name: &'static str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands().iter().find(|command| {
        command.name.eq_ignore_ascii_case(name)
            || command
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    })
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        aliases: &["?"],
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "regen",
        aliases: &["regenerate", "retry"],
        usage: "/regen [n]",
        help: "Regenerate a reply (default: the newest).",
        handler: super::handle_regenerate,
    },
    Command {
        name: "shorter",
        aliases: &[],
        usage: "/shorter [n]",
        help: "Regenerate a reply, asking for a shorter answer.",
        handler: super::handle_regenerate,
    },
    Command {
        name: "longer",
        aliases: &[],
        usage: "/longer [n]",
        help: "Regenerate a reply, asking for a more detailed answer.",
        handler: super::handle_regenerate,
    },
    Command {
        name: "edit",
        aliases: &[],
        usage: "/edit <n> <text>",
        help: "Rewrite one of your messages and regenerate the reply.",
        handler: super::handle_edit,
    },
    Command {
        name: "copy",
        aliases: &[],
        usage: "/copy [n]",
        help: "Print a message's raw text.",
        handler: super::handle_copy,
    },
    Command {
        name: "backend",
        aliases: &["model"],
        usage: "/backend [primary|alternate]",
        help: "Switch backend; each keeps its own history.",
        handler: super::handle_backend,
    },
    Command {
        name: "nsfw",
        aliases: &[],
        usage: "/nsfw on|off",
        help: "Turn the primary backend's content filter off or on.",
        handler: super::handle_nsfw,
    },
    Command {
        name: "search",
        aliases: &["find"],
        usage: "/search <text>",
        help: "Search the visible conversation.",
        handler: super::handle_search,
    },
    Command {
        name: "attach",
        aliases: &[],
        usage: "/attach <file...>",
        help: "Stage files for the next message.",
        handler: super::handle_attach,
    },
    Command {
        name: "detach",
        aliases: &[],
        usage: "/detach [n]",
        help: "Remove one staged file, or all of them.",
        handler: super::handle_detach,
    },
    Command {
        name: "gallery",
        aliases: &[],
        usage: "/gallery",
        help: "List images and videos in the conversation, newest first.",
        handler: super::handle_gallery,
    },
    Command {
        name: "voice",
        aliases: &[],
        usage: "/voice [in.wav out.wav]",
        help: "Talk out loud, or from a recording into a file.",
        handler: super::handle_voice,
    },
    Command {
        name: "profile",
        aliases: &[],
        usage: "/profile <name> <gender>",
        help: "Change your name and gender.",
        handler: super::handle_profile,
    },
    Command {
        name: "reset",
        aliases: &[],
        usage: "/reset",
        help: "Forget both conversations and your profile.",
        handler: super::handle_reset,
    },
    Command {
        name: "quit",
        aliases: &["exit"],
        usage: "/quit",
        help: "Leave jamchat.",
        handler: super::handle_quit,
    },
];
