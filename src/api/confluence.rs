//! Confluence client. Only page reads are supported.

use serde_json::Value;
use tracing::{info, instrument};

use super::auth::Auth;
use super::error::Result;
use super::session::{CookieJar, Product, Session};
use super::transport::{segment, Transport, TransportOptions};

/// Base path of the Confluence prototype REST API.
const API: &str = "rest/prototype/latest";

/// A Confluence client sharing the cookie and session handling of [`super::JiraClient`].
#[derive(Debug)]
pub struct ConfluenceClient {
    transport: Transport,
    session: Session,
}

impl ConfluenceClient {
    pub fn new(
        base_url: &str,
        auth: Auth,
        jar: CookieJar,
        options: &TransportOptions,
    ) -> Result<Self> {
        let transport = Transport::new(base_url, options)?;
        info!("Confluence client for {}", transport.base_url());
        Ok(Self {
            transport,
            session: Session::new(Product::Confluence, auth, jar),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_credentials(&mut self, auth: Auth) {
        self.session.set_credentials(auth);
    }

    pub async fn ensure_authenticated(&mut self) -> Result<()> {
        self.session.ensure_authenticated(&self.transport).await
    }

    /// Fetch a page (title, body, metadata) by its numeric id.
    #[instrument(skip(self))]
    pub async fn get_page(&mut self, id: &str) -> Result<Value> {
        self.transport
            .get(&mut self.session, &format!("{}/content/{}", API, segment(id)))
            .await
    }
}
