//! Subscription controller.
//!
//! Maps the selected conversation to exactly one per-conversation topic
//! subscription, and keeps one standing subscription to the identity's
//! creation feed.
//!
//! The controller records what *should* be subscribed independently of the
//! link. While disconnected, changes are only recorded; on every transition
//! into `Connected` the recorded state is re-applied, because the broker
//! forgets subscriptions when a link drops.

use std::fmt;

use chatsync_proto::{ConversationId, Identity, Outbound, Topic};

/// Client-allocated subscription identifier (`sub-N` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Parse the wire form `sub-N`.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix("sub-")?.parse().ok().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Where a delivery on a subscription belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Live message for a conversation.
    Conversation(ConversationId),
    /// Creation notification.
    Creations,
}

/// Broker operations produced by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Subscribe `subscription` to `topic`.
    Subscribe {
        /// Identifier of the new subscription.
        subscription: SubscriptionId,
        /// Topic to subscribe to.
        topic: Topic,
    },
    /// Drop `subscription`.
    Unsubscribe {
        /// Subscription to drop.
        subscription: SubscriptionId,
    },
    /// Publish a fire-and-forget action.
    Publish(Outbound),
}

/// Subscription controller state machine.
#[derive(Debug, Default)]
pub struct Subscriptions {
    connected: bool,
    next_id: u64,
    active: Option<ConversationId>,
    conversation_sub: Option<(SubscriptionId, ConversationId)>,
    creation_feed: Option<Identity>,
    creation_sub: Option<SubscriptionId>,
}

impl Subscriptions {
    /// Create a controller with nothing attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `conversation` the one conversation with a live subscription.
    ///
    /// The previous topic is unsubscribed before the new one is subscribed,
    /// within the returned action list. Setting the current conversation
    /// again is a no-op.
    pub fn set_active_conversation(
        &mut self,
        conversation: Option<ConversationId>,
    ) -> Vec<SubscriptionAction> {
        if self.active == conversation {
            return Vec::new();
        }
        self.active = conversation;

        if !self.connected {
            tracing::debug!(?conversation, "not connected, subscription deferred");
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some((subscription, _)) = self.conversation_sub.take() {
            actions.push(SubscriptionAction::Unsubscribe { subscription });
        }
        if let Some(id) = conversation {
            actions.push(self.subscribe_conversation(id));
        }
        actions
    }

    /// Attach the standing creation feed of `identity`.
    ///
    /// Subscribes and then registers for creation notices. Attaching the
    /// same identity again is a no-op.
    pub fn attach_creation_feed(&mut self, identity: &Identity) -> Vec<SubscriptionAction> {
        if self.creation_feed.as_ref() == Some(identity) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(subscription) = self.creation_sub.take()
            && self.connected
        {
            actions.push(SubscriptionAction::Unsubscribe { subscription });
        }
        self.creation_feed = Some(identity.clone());

        if self.connected {
            actions.extend(self.subscribe_creation_feed());
        }
        actions
    }

    /// Link became `Connected`: re-apply everything recorded.
    pub fn on_connected(&mut self) -> Vec<SubscriptionAction> {
        self.connected = true;
        // Ids from a previous link are meaningless to the broker now.
        self.creation_sub = None;
        self.conversation_sub = None;

        let mut actions = self.subscribe_creation_feed();
        if let Some(id) = self.active {
            actions.push(self.subscribe_conversation(id));
        }
        actions
    }

    /// Link left `Connected`. The broker dropped every subscription.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.creation_sub = None;
        self.conversation_sub = None;
    }

    /// Tear down both subscriptions and forget what was recorded.
    pub fn detach_all(&mut self) -> Vec<SubscriptionAction> {
        let mut actions = Vec::new();
        if self.connected {
            if let Some((subscription, _)) = self.conversation_sub {
                actions.push(SubscriptionAction::Unsubscribe { subscription });
            }
            if let Some(subscription) = self.creation_sub {
                actions.push(SubscriptionAction::Unsubscribe { subscription });
            }
        }
        self.conversation_sub = None;
        self.creation_sub = None;
        self.active = None;
        self.creation_feed = None;
        actions
    }

    /// Resolve a delivery's subscription to its destination.
    ///
    /// Returns `None` for subscriptions no longer held.
    pub fn route(&self, subscription: SubscriptionId) -> Option<Route> {
        match self.conversation_sub {
            Some((sub, id)) if sub == subscription => return Some(Route::Conversation(id)),
            _ => {},
        }
        (self.creation_sub == Some(subscription)).then_some(Route::Creations)
    }

    fn subscribe_conversation(&mut self, id: ConversationId) -> SubscriptionAction {
        let subscription = self.allocate();
        self.conversation_sub = Some((subscription, id));
        tracing::debug!(%subscription, conversation_id = %id, "subscribing to conversation");
        SubscriptionAction::Subscribe { subscription, topic: Topic::Conversation(id) }
    }

    fn subscribe_creation_feed(&mut self) -> Vec<SubscriptionAction> {
        let Some(identity) = &self.creation_feed else {
            return Vec::new();
        };
        let topic = Topic::ConversationCreated { username: identity.username.clone() };
        let subscription = self.allocate();
        self.creation_sub = Some(subscription);
        tracing::debug!(%subscription, %topic, "subscribing to creation feed");
        vec![
            SubscriptionAction::Subscribe { subscription, topic },
            SubscriptionAction::Publish(Outbound::SubscribeCreations),
        ]
    }

    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    /// Conversation whose topic should be subscribed.
    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.active
    }

    /// Live per-conversation subscription, if any.
    pub fn conversation_subscription(&self) -> Option<SubscriptionId> {
        self.conversation_sub.map(|(sub, _)| sub)
    }

    /// Live creation-feed subscription, if any.
    pub fn creation_subscription(&self) -> Option<SubscriptionId> {
        self.creation_sub
    }

    /// Whether the controller believes the link is connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
