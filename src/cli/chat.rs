//! Line-oriented chat REPL.

use std::error::Error;
use std::future::Future;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::cli::{open_session, voice};
use crate::commands::{help_text, process_input, ChatCommand, CommandResult};
use crate::core::attachments::StagedAttachment;
use crate::core::backend::BackendId;
use crate::core::config::Config;
use crate::core::profile::Gender;
use crate::core::session::{ChatSession, EditOutcome, SessionEvent};
use crate::ui::terminal::TerminalRenderer;
use crate::ui::view::ConversationView;

const GALLERY_PREVIEW: usize = 64;

type Input = Lines<BufReader<Stdin>>;
type Renderer = TerminalRenderer<io::Stdout>;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run_chat(config: Config, backend: Option<BackendId>) -> Result<(), Box<dyn Error>> {
    let assistant_name = config.assistant_name.clone();
    let (mut session, mut events) = open_session(config)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = TerminalRenderer::new(
        io::stdout(),
        assistant_name,
        session.profile().display_name(),
    );

    if let Some(backend) = backend {
        session.switch_backend(backend);
        drain(&mut events, &mut renderer)?;
    }
    if !session.profile().is_complete() && !onboard(&mut session, &mut input, &mut renderer).await? {
        return Ok(());
    }

    let stop = session.stop_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    renderer.render_all(&ConversationView::of(&session))?;
    loop {
        prompt(session.active_backend())?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        let flow = match process_input(&line) {
            CommandResult::ProcessAsMessage(text) => {
                drive(session.send(&text), &mut events, &mut renderer).await?;
                Flow::Continue
            }
            CommandResult::Usage(usage) => {
                renderer.notice(usage)?;
                Flow::Continue
            }
            CommandResult::Run(command) => {
                execute(command, &mut session, &mut events, &mut renderer, &mut input).await?
            }
        };
        drain(&mut events, &mut renderer)?;
        if flow == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn prompt(backend: BackendId) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{backend}> ")?;
    stdout.flush()
}

/// Runs a session operation while printing its events as they arrive.
pub(crate) async fn drive<F: Future>(
    operation: F,
    events: &mut UnboundedReceiver<SessionEvent>,
    renderer: &mut Renderer,
) -> io::Result<F::Output> {
    tokio::pin!(operation);
    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => renderer.handle(&event)?,
            output = &mut operation => {
                drain(events, renderer)?;
                return Ok(output);
            }
        }
    }
}

fn drain<W: Write>(
    events: &mut UnboundedReceiver<SessionEvent>,
    renderer: &mut TerminalRenderer<W>,
) -> io::Result<()> {
    while let Ok(event) = events.try_recv() {
        renderer.handle(&event)?;
    }
    Ok(())
}

/// Forgets everything, greeting with the cleared profile's name.
fn reset_conversation<W: Write>(
    session: &mut ChatSession,
    events: &mut UnboundedReceiver<SessionEvent>,
    renderer: &mut TerminalRenderer<W>,
) -> io::Result<()> {
    session.reset();
    renderer.set_user_name(session.profile().display_name());
    drain(events, renderer)
}

/// Asks for the name and gender the persona needs. Returns `false` when
/// input ended first.
async fn onboard(
    session: &mut ChatSession,
    input: &mut Input,
    renderer: &mut Renderer,
) -> io::Result<bool> {
    renderer.notice("Welcome to jamchat! Let's get to know each other.")?;

    let name = loop {
        renderer.notice("What should I call you?")?;
        match input.next_line().await? {
            Some(line) if !line.trim().is_empty() => break line.trim().to_string(),
            Some(_) => continue,
            None => return Ok(false),
        }
    };
    let gender = loop {
        renderer.notice("Are you male or female? (m/f)")?;
        match input.next_line().await? {
            Some(line) => match Gender::try_from(line.as_str()) {
                Ok(gender) => break gender,
                Err(_) => continue,
            },
            None => return Ok(false),
        }
    };

    session.set_profile(&name, gender);
    renderer.set_user_name(name);
    Ok(true)
}

async fn execute(
    command: ChatCommand,
    session: &mut ChatSession,
    events: &mut UnboundedReceiver<SessionEvent>,
    renderer: &mut Renderer,
    input: &mut Input,
) -> io::Result<Flow> {
    let view = ConversationView::of(session);
    match command {
        ChatCommand::Help => renderer.notice(&help_text())?,
        ChatCommand::Regenerate {
            number,
            modification,
        } => {
            let target = number
                .or_else(|| view.last_model_number())
                .and_then(|number| view.message(number));
            let allowed = target.is_some_and(|message| {
                message.actions.regenerate && (modification.is_none() || message.actions.modify)
            });
            match target {
                Some(message) if allowed => {
                    let id = message.id.clone();
                    drive(session.regenerate(&id, modification), events, renderer).await?;
                }
                _ => renderer.notice("That message can't be regenerated.")?,
            }
        }
        ChatCommand::Edit { number, text } => match view.message(number) {
            Some(message) if message.actions.edit => {
                let id = message.id.clone();
                let outcome =
                    drive(session.edit_user_entry(&id, &text), events, renderer).await?;
                match outcome {
                    EditOutcome::Unchanged => renderer.notice("Nothing changed.")?,
                    EditOutcome::NotFound => renderer.notice("That message is gone.")?,
                    EditOutcome::Edited(_) => {}
                }
            }
            _ => renderer.notice("That message can't be edited.")?,
        },
        ChatCommand::Copy(number) => {
            let text = number
                .or_else(|| view.last_model_number())
                .and_then(|number| view.message(number))
                .filter(|message| message.actions.copy)
                .and_then(|message| message.text.clone());
            match text {
                Some(text) => renderer.notice(&text)?,
                None => renderer.notice("Nothing to copy.")?,
            }
        }
        ChatCommand::Backend(target) => {
            let target = target.unwrap_or(match session.active_backend() {
                BackendId::Primary => BackendId::Alternate,
                BackendId::Alternate => BackendId::Primary,
            });
            if !session.switch_backend(target) {
                renderer.notice(&format!("Already using the {target} backend."))?;
            }
        }
        ChatCommand::ContentPolicy { unfiltered } => {
            session.set_content_policy(unfiltered);
            let state = if unfiltered { "off" } else { "on" };
            renderer.notice(&format!("Content filter {state}."))?;
        }
        ChatCommand::Search(query) => {
            let hits = session.search(&query);
            renderer.render_search(&query, &hits)?;
        }
        ChatCommand::Attach(paths) => {
            let batch: Result<Vec<_>, _> = paths
                .iter()
                .map(|path| StagedAttachment::from_path(path))
                .collect();
            match batch.and_then(|batch| session.stage_attachments(batch)) {
                Ok(()) => {}
                Err(err) => renderer.notice(&err.to_string())?,
            }
        }
        ChatCommand::Detach(None) => session.clear_attachments(),
        ChatCommand::Detach(Some(number)) => {
            if session.remove_attachment(number - 1).is_none() {
                renderer.notice("No such attachment.")?;
            }
        }
        ChatCommand::Gallery => {
            let gallery = session.media_gallery();
            if gallery.is_empty() {
                renderer.notice("No images or videos yet.")?;
            }
            for (index, url) in gallery.iter().enumerate() {
                let preview: String = url.chars().take(GALLERY_PREVIEW).collect();
                renderer.notice(&format!("{}. {preview}...", index + 1))?;
            }
        }
        ChatCommand::Voice(files) => {
            match voice::converse(session, events, renderer, &files).await? {
                Ok(summary) => renderer.notice(&voice::summary_line(&summary, &files))?,
                Err(err) => renderer.notice(&err.to_string())?,
            }
        }
        ChatCommand::Profile { name, gender } => {
            session.set_profile(&name, gender);
            renderer.set_user_name(name.trim());
            renderer.notice("Profile updated.")?;
        }
        ChatCommand::Reset => {
            reset_conversation(session, events, renderer)?;
            if !onboard(session, input, renderer).await? {
                return Ok(Flow::Quit);
            }
            renderer.render_all(&ConversationView::of(session))?;
        }
        ChatCommand::Quit => return Ok(Flow::Quit),
    }
    debug!("command finished");
    Ok(Flow::Continue)
}
