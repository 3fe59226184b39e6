//! Line commands read from stdin.

use chatsync_client::{SessionEvent, proto::ConversationId};

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/open <id>`: select a conversation.
    Open(ConversationId),
    /// `/new`: create a conversation.
    New,
    /// `/logout`: end the session and discard the token.
    Logout,
    /// `/quit`: leave the client.
    Quit,
    /// Any other text: send it to the selected conversation.
    Say(String),
    /// Not understood; the hint is shown to the user.
    Invalid(String),
}

impl Command {
    /// Session event for this command, if it maps to one.
    pub fn into_event<I>(self) -> Option<SessionEvent<I>> {
        match self {
            Self::Open(conversation_id) => Some(SessionEvent::Select { conversation_id }),
            Self::New => Some(SessionEvent::CreateConversation),
            Self::Logout => Some(SessionEvent::Logout),
            Self::Say(content) => Some(SessionEvent::Send { content }),
            Self::Quit | Self::Invalid(_) => None,
        }
    }
}

/// Parse one line. Blank lines yield `None`.
///
/// A leading `//` sends the rest of the line, slash included, as text.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(text) = line.strip_prefix("//") {
        return Some(Command::Say(format!("/{text}")));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_owned()));
    };

    let mut parts = rest.split_whitespace();
    let command = match (parts.next(), parts.next(), parts.next()) {
        (Some("open"), Some(id), None) => match id.parse() {
            Ok(id) => Command::Open(ConversationId(id)),
            Err(_) => Command::Invalid(format!("not a conversation id: {id}")),
        },
        (Some("open"), ..) => Command::Invalid("usage: /open <id>".to_owned()),
        (Some("new"), None, None) => Command::New,
        (Some("logout"), None, None) => Command::Logout,
        (Some("quit" | "exit"), None, None) => Command::Quit,
        _ => Command::Invalid(format!("unknown command: /{rest}")),
    };
    Some(command)
}
