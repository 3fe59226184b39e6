//! HTTP collaborators.
//!
//! Every request reads the bearer token from the [`CredentialStore`] at call
//! time, so a logout that clears the store also stops later requests.

use std::sync::Arc;

use chatsync_proto::{ConversationSummary, HistoryPage, Identity, Message};
use reqwest::header::AUTHORIZATION;
use url::Url;

use super::TransportError;
use crate::{credential::CredentialStore, timeline::HistoryRequest};

const WHO_AM_I: &str = "auth/who-am-i";
const MY_CONVERSATIONS: &str = "api/chat-rooms/my";
const CREATE_CONVERSATION: &str = "api/chat-rooms/chat-ai";
const HISTORY_SORT: &str = "timestamp,desc";

/// Request/response client for identity, snapshot, history and creation.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    store: Arc<dyn CredentialStore>,
}

impl HttpBackend {
    /// Client for the API at `base_url`.
    pub fn new(base_url: &str, store: Arc<dyn CredentialStore>) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client: reqwest::Client::new(), base, store })
    }

    /// Resolve the identity behind the stored credential.
    pub async fn resolve_identity(&self) -> Result<Identity, TransportError> {
        let response = self
            .client
            .post(self.url(WHO_AM_I)?)
            .header(AUTHORIZATION, self.bearer()?)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch the conversation snapshot, oldest first.
    pub async fn fetch_snapshot(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        let response = self
            .client
            .get(self.url(MY_CONVERSATIONS)?)
            .header(AUTHORIZATION, self.bearer()?)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch one history page, newest first.
    pub async fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<Message>, TransportError> {
        let path = format!("api/chat-messages/{}", request.conversation_id);
        let response = self
            .client
            .get(self.url(&path)?)
            .header(AUTHORIZATION, self.bearer()?)
            .query(&[
                ("page", request.page.to_string()),
                ("size", request.size.to_string()),
                ("sort", HISTORY_SORT.to_owned()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let page: HistoryPage<Message> = response.json().await?;
        Ok(page.content)
    }

    /// Ask the server to create a conversation. The response body is
    /// ignored; the conversation is announced on the creation feed.
    pub async fn request_creation(&self) -> Result<(), TransportError> {
        self.client
            .post(self.url(CREATE_CONVERSATION)?)
            .header(AUTHORIZATION, self.bearer()?)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base.join(path).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: path.to_owned(),
            reason: e.to_string(),
        })
    }

    fn bearer(&self) -> Result<String, TransportError> {
        self.store.load().map(|c| c.bearer()).ok_or(TransportError::MissingCredential)
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend").field("base", &self.base.as_str()).finish_non_exhaustive()
    }
}
