//! Navigation driver capability.
//!
//! A [`NavigationDriver`] opens [`DriverSession`]s; a session loads one page
//! at a time and hands back the rendered HTML once its [`WaitPolicy`] is
//! satisfied. Selector evaluation then happens locally through
//! [`crate::dom`], so nothing DOM-shaped ever crosses an `.await`.
//!
//! Sessions are scoped to a pipeline phase. Callers open one at phase start
//! and must call [`DriverSession::close`] on every exit path; see
//! [`crate::pipeline`] for the pattern.
//!
//! [`HttpDriver`] is the bundled implementation: a plain `reqwest` fetch.
//! It performs no script execution, so a page counts as loaded once the
//! response body has been read in full, whichever wait policy is requested.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NavigationError;

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitPolicy {
    #[default]
    Load,
    DomContentLoaded,
}

/// The HTML snapshot of a loaded page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
}

/// One browsing session. Used by a single worker, one page at a time.
#[async_trait]
pub trait DriverSession: Send {
    /// Load `url`. `timeout = None` waits indefinitely.
    async fn goto(
        &mut self,
        url: &str,
        wait: WaitPolicy,
        timeout: Option<Duration>,
    ) -> Result<RenderedPage, NavigationError>;

    /// Release the session. Idempotent.
    async fn close(&mut self);
}

#[async_trait]
pub trait NavigationDriver: Send + Sync {
    async fn open(&self) -> anyhow::Result<Box<dyn DriverSession>>;
}

/// Fetches pages over HTTP without rendering.
pub struct HttpDriver {
    user_agent: String,
}

impl HttpDriver {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl NavigationDriver for HttpDriver {
    async fn open(&self) -> anyhow::Result<Box<dyn DriverSession>> {
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        tracing::debug!("Opened HTTP navigation session");
        Ok(Box::new(HttpSession {
            client: Some(client),
        }))
    }
}

struct HttpSession {
    client: Option<reqwest::Client>,
}

impl HttpSession {
    async fn fetch(client: &reqwest::Client, url: &str) -> Result<RenderedPage, NavigationError> {
        let network = |e: reqwest::Error| NavigationError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = client.get(url).send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(NavigationError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let html = response.text().await.map_err(network)?;
        Ok(RenderedPage { html })
    }
}

#[async_trait]
impl DriverSession for HttpSession {
    async fn goto(
        &mut self,
        url: &str,
        wait: WaitPolicy,
        timeout: Option<Duration>,
    ) -> Result<RenderedPage, NavigationError> {
        let Some(client) = &self.client else {
            return Err(NavigationError::Network {
                url: url.to_string(),
                message: "session is closed".to_string(),
            });
        };
        tracing::debug!(url, ?wait, ?timeout, "Navigating");

        match timeout {
            Some(after) => tokio::time::timeout(after, Self::fetch(client, url))
                .await
                .map_err(|_| NavigationError::Timeout {
                    url: url.to_string(),
                    after,
                })?,
            None => Self::fetch(client, url).await,
        }
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!("Closed HTTP navigation session");
        }
    }
}
