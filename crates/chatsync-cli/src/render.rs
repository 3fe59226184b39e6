//! Plain text rendering of the session.

use std::io::{self, Write};

use chatsync_client::{ConnectionState, Environment, Session, SessionState};

/// Write the directory and the newest `limit` timeline entries to `out`.
pub fn render<E: Environment>(session: &Session<E>, out: &mut impl Write, limit: usize) -> io::Result<()> {
    match session.state() {
        SessionState::Bootstrapping => return writeln!(out, "== loading =="),
        SessionState::LoggedOut => return writeln!(out, "== logged out (/quit to leave) =="),
        SessionState::Ready => {},
    }

    let who = session.identity().map_or("?", |identity| identity.username.as_str());
    let link = match session.connection_state() {
        ConnectionState::Connected => "connected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Reconnecting => "reconnecting",
        ConnectionState::Disconnected => "offline",
    };
    writeln!(out, "== {who} ({link}) ==")?;

    let directory = session.directory();
    if directory.is_empty() {
        writeln!(out, "  (no conversations, /new starts one)")?;
    }
    for conversation in directory.conversations() {
        let marker = if session.selected() == Some(conversation.id) { '>' } else { ' ' };
        writeln!(out, "{marker} [{}] {}", conversation.id, conversation.display_name)?;
    }

    let Some(selected) = session.selected() else {
        return Ok(());
    };
    writeln!(out, "-- {selected} --")?;

    let timeline = session.timeline();
    if timeline.is_empty() && timeline.is_loading() {
        writeln!(out, "  loading...")?;
    }
    let mut recent: Vec<_> = timeline.messages().take(limit).collect();
    recent.reverse();
    for message in recent {
        write!(
            out,
            "  {} {}: {}",
            message.timestamp.format("%H:%M"),
            message.sender_username(),
            message.content
        )?;
        match &message.attachment_url {
            Some(url) => writeln!(out, " [attachment: {url}]")?,
            None => writeln!(out)?,
        }
    }
    Ok(())
}
