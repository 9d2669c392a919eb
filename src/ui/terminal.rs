//! Plain-text renderer for the interactive chat.
//!
//! Session events arrive while a turn is in flight, so the renderer keeps
//! its own list of visible ids to number messages without borrowing the
//! session.

use std::io::{self, Write};

use crate::core::backend::BackendId;
use crate::core::message::{Entry, Role};
use crate::core::search::SearchHit;
use crate::core::session::SessionEvent;
use crate::ui::view::{project, ConversationView, MessageView};

pub struct TerminalRenderer<W: Write> {
    out: W,
    assistant_name: String,
    user_name: String,
    ids: Vec<String>,
    backend: BackendId,
    revealing: Option<String>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, assistant_name: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            out,
            assistant_name: assistant_name.into(),
            user_name: user_name.into(),
            ids: Vec::new(),
            backend: BackendId::default(),
            revealing: None,
        }
    }

    pub fn set_user_name(&mut self, user_name: impl Into<String>) {
        self.user_name = user_name.into();
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints the whole visible conversation.
    pub fn render_all(&mut self, view: &ConversationView) -> io::Result<()> {
        self.backend = view.backend;
        self.ids = view.messages.iter().map(|m| m.id.clone()).collect();
        self.revealing = None;

        writeln!(self.out, "── {} ──", view.backend)?;
        if let Some(welcome) = &view.welcome {
            writeln!(self.out, "{welcome}")?;
        }
        for message in &view.messages {
            self.write_message(message)?;
        }
        self.out.flush()
    }

    pub fn handle(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::EntryAdded(entry) | SessionEvent::EntryUpdated(entry) => {
                self.finish_reveal()?;
                let message = self.view_of(entry);
                self.write_message(&message)?;
            }
            SessionEvent::EntryRemoved { .. } => {}
            SessionEvent::Pending { .. } => {
                writeln!(self.out, "{} is typing...", self.assistant_name)?;
            }
            SessionEvent::RevealStarted(entry) => {
                self.finish_reveal()?;
                let number = self.number_for(&entry.id);
                write!(self.out, "[{number}] {}: ", self.assistant_name)?;
                self.revealing = Some(entry.id.clone());
            }
            SessionEvent::RevealChunk { id, text } => {
                if self.revealing.as_deref() == Some(id.as_str()) {
                    write!(self.out, "{text}")?;
                }
            }
            SessionEvent::RevealFinished { id, completed } => {
                if self.revealing.as_deref() == Some(id.as_str()) {
                    if !completed {
                        write!(self.out, " [stopped]")?;
                    }
                    self.finish_reveal()?;
                }
            }
            SessionEvent::HistoryReplaced { backend, entries } => {
                self.finish_reveal()?;
                let view = ConversationView {
                    backend: *backend,
                    welcome: entries
                        .is_empty()
                        .then(|| format!("Hi, {}!", self.user_name)),
                    messages: project(entries, *backend),
                };
                self.render_all(&view)?;
            }
            SessionEvent::AttachmentsChanged { staged } => match staged {
                0 => writeln!(self.out, "(no attachments staged)")?,
                n => writeln!(self.out, "({n} attachment(s) staged)")?,
            },
            SessionEvent::Status(Some(status)) => {
                self.finish_reveal()?;
                writeln!(self.out, "· {status}")?;
            }
            SessionEvent::Status(None) => {}
        }
        self.out.flush()
    }

    pub fn render_search(&mut self, query: &str, hits: &[SearchHit]) -> io::Result<()> {
        if hits.is_empty() {
            writeln!(self.out, "No messages match \"{query}\".")?;
            return self.out.flush();
        }
        for hit in hits {
            let number = self.number_for(&hit.id);
            let speaker = self.speaker(hit.role).to_string();
            writeln!(
                self.out,
                "[{number}] {speaker}: {}",
                highlight(&hit.snippet, hit)
            )?;
        }
        self.out.flush()
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        self.finish_reveal()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn finish_reveal(&mut self) -> io::Result<()> {
        if self.revealing.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn number_for(&mut self, id: &str) -> usize {
        match self.ids.iter().position(|known| known == id) {
            Some(index) => index + 1,
            None => {
                self.ids.push(id.to_string());
                self.ids.len()
            }
        }
    }

    fn view_of(&mut self, entry: &Entry) -> MessageView {
        let number = self.number_for(&entry.id);
        MessageView::from_entry(entry, number, self.backend)
    }

    fn speaker(&self, role: Role) -> &str {
        match role {
            Role::User => self.user_name.as_str(),
            Role::Model => self.assistant_name.as_str(),
        }
    }

    fn write_message(&mut self, message: &MessageView) -> io::Result<()> {
        let mut header = format!("[{}] {}", message.number, self.speaker(message.role));
        if message.from_audio {
            header.push_str(" (voice)");
        }
        if let Some(modification) = message.modification {
            header.push_str(&format!(" ({})", modification.as_str()));
        }
        write!(self.out, "{header}: ")?;

        let media: Vec<_> = message.media.iter().map(|kind| kind.label()).collect();
        if !media.is_empty() {
            write!(self.out, "<{}> ", media.join(", "))?;
        }
        writeln!(self.out, "{}", message.text.as_deref().unwrap_or_default())?;

        let labels = message.actions.labels();
        if !labels.is_empty() && message.role.is_model() {
            writeln!(self.out, "    /{} {}", labels.join(" /"), message.number)?;
        }
        Ok(())
    }
}

/// Wraps each match in `*...*`.
fn highlight(snippet: &str, hit: &SearchHit) -> String {
    let mut out = String::with_capacity(snippet.len() + hit.matches.len() * 2);
    let mut cursor = 0;
    for range in &hit.matches {
        if range.start < cursor || range.end > snippet.len() {
            continue;
        }
        out.push_str(&snippet[cursor..range.start]);
        out.push('*');
        out.push_str(&snippet[range.clone()]);
        out.push('*');
        cursor = range.end;
    }
    out.push_str(&snippet[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{EntryStatus, Modification};
    use crate::core::prompt::STOPPED_TEXT;

    fn renderer() -> TerminalRenderer<Vec<u8>> {
        TerminalRenderer::new(Vec::new(), "Dzhem", "Velly")
    }

    fn output(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn empty_history_shows_welcome() {
        let mut renderer = renderer();
        renderer
            .handle(&SessionEvent::HistoryReplaced {
                backend: BackendId::Alternate,
                entries: Vec::new(),
            })
            .unwrap();
        assert_eq!(output(renderer), "── alternate ──\nHi, Velly!\n");
    }

    #[test]
    fn revealed_reply_is_numbered_after_prompt() {
        let mut renderer = renderer();
        let prompt = Entry::user_text("u1", "hi");
        let reply = Entry::model_text("m1", "hello");
        for event in [
            SessionEvent::EntryAdded(prompt),
            SessionEvent::Pending { id: "m1".into() },
            SessionEvent::RevealStarted(reply),
            SessionEvent::RevealChunk {
                id: "m1".into(),
                text: "hel".into(),
            },
            SessionEvent::RevealChunk {
                id: "m1".into(),
                text: "lo".into(),
            },
            SessionEvent::RevealFinished {
                id: "m1".into(),
                completed: false,
            },
        ] {
            renderer.handle(&event).unwrap();
        }
        assert_eq!(
            output(renderer),
            "[1] Velly: hi\nDzhem is typing...\n[2] Dzhem: hello [stopped]\n"
        );
    }

    #[test]
    fn placeholders_and_modified_replies_render_in_place() {
        let mut renderer = renderer();
        let view = ConversationView {
            backend: BackendId::Primary,
            welcome: None,
            messages: project(
                &[
                    Entry::user_text("u1", "q"),
                    Entry {
                        modification: Some(Modification::Shorter),
                        ..Entry::model_text("m1", "short")
                    },
                ],
                BackendId::Primary,
            ),
        };
        renderer.render_all(&view).unwrap();
        renderer
            .handle(&SessionEvent::EntryUpdated(Entry::placeholder(
                "m1",
                EntryStatus::Stopped,
                STOPPED_TEXT,
            )))
            .unwrap();

        let text = output(renderer);
        assert!(text.contains("[2] Dzhem (shorter): short\n    /regen /shorter /longer /copy 2\n"));
        assert!(text.ends_with("[2] Dzhem: Generation stopped.\n    /regen 2\n"));
    }

    #[test]
    fn search_hits_are_highlighted() {
        let mut renderer = renderer();
        let hit = SearchHit {
            id: "m1".into(),
            role: Role::Model,
            snippet: "a Cat and a cat".into(),
            matches: vec![2..5, 12..15],
        };
        renderer.render_search("cat", &[hit]).unwrap();
        assert_eq!(output(renderer), "[1] Dzhem: a *Cat* and a *cat*\n");
    }
}
