//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Conversation ids in a directory are unique.
pub struct UniqueConversationIds;

impl Invariant for UniqueConversationIds {
    fn name(&self) -> &'static str {
        "unique_conversation_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let mut seen = HashSet::new();
            for conversation in &session.conversations {
                if !seen.insert(conversation.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {}: conversation {} listed twice",
                            session.id, conversation.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// At most one placeholder conversation is listed.
pub struct SinglePlaceholder;

impl Invariant for SinglePlaceholder {
    fn name(&self) -> &'static str {
        "single_placeholder"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let placeholders: Vec<_> =
                session.conversations.iter().filter(|c| c.is_placeholder).map(|c| c.id).collect();
            if placeholders.len() > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("session {}: placeholders {placeholders:?}", session.id),
                });
            }
        }
        Ok(())
    }
}

/// The selected conversation exists in the directory.
///
/// Prevents the UI from showing a selection that isn't listed.
pub struct SelectedInDirectory;

impl Invariant for SelectedInDirectory {
    fn name(&self) -> &'static str {
        "selected_in_directory"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            if let Some(selected) = session.selected
                && !session.conversations.iter().any(|c| c.id == selected)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: selected {} not in {:?}",
                        session.id,
                        selected,
                        session.conversations.iter().map(|c| c.id).collect::<Vec<_>>()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The timeline belongs to the selected conversation.
///
/// Messages of one conversation are never shown under another.
pub struct TimelineMatchesSelection;

impl Invariant for TimelineMatchesSelection {
    fn name(&self) -> &'static str {
        "timeline_matches_selection"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            if session.timeline_conversation != session.selected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: timeline of {:?} while {:?} is selected",
                        session.id, session.timeline_conversation, session.selected
                    ),
                });
            }
            if session.selected.is_none() && session.timeline_len > 0 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: {} messages with nothing selected",
                        session.id, session.timeline_len
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A name derived from content never changes and never reverts.
pub struct NamesNeverRevert;

impl Invariant for NamesNeverRevert {
    fn name(&self) -> &'static str {
        "names_never_revert"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            for (id, history) in &session.name_history {
                let named: Vec<_> = history.iter().skip_while(|name| name.is_none()).collect();
                if let Some(first) = named.first()
                    && named.iter().any(|name| name != first)
                {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("session {}: conversation {id} names {history:?}", session.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The broker holds at most one per-conversation subscription per link.
pub struct SingleConversationSubscription;

impl Invariant for SingleConversationSubscription {
    fn name(&self) -> &'static str {
        "single_conversation_subscription"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for link in &state.broker.links {
            let live: Vec<_> =
                link.destinations.iter().filter(|d| d.starts_with("/conversation/")).collect();
            if live.len() > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("link {}: subscribed to {live:?}", link.handle),
                });
            }
        }
        Ok(())
    }
}
