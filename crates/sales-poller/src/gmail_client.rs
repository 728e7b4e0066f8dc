//! Gmail API client for finding and reading sale emails.

use anyhow::{Context, Result};
use google_gmail1::api::{Message, MessagePart, Scope};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::path::Path;

use crate::mailbox::{MailMessage, Mailbox};

const GMAIL_READONLY: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Largest page the messages.list endpoint accepts
const MAX_PAGE_SIZE: u32 = 500;

/// Client for interacting with Gmail API
pub struct GmailMailbox {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailMailbox {
    /// Authenticate with the installed-app flow and build the client.
    ///
    /// Tokens are cached at `token_cache`; an access token is requested here
    /// so credential problems surface before any message is processed.
    pub async fn new(credentials_path: &Path, token_cache: &Path) -> Result<Self> {
        let secret = google_gmail1::yup_oauth2::read_application_secret(credentials_path)
            .await
            .context("Failed to read OAuth credentials")?;

        let auth = google_gmail1::yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            google_gmail1::yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(token_cache)
        .build()
        .await
        .context("Failed to build authenticator")?;

        auth.token(&[GMAIL_READONLY])
            .await
            .context("Failed to obtain Gmail access token")?;

        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Self { hub })
    }

    fn parse_message(message: Message) -> MailMessage {
        let id = message.id.clone().unwrap_or_default();
        let subject = message
            .payload
            .as_ref()
            .and_then(|p| p.headers.as_ref())
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|h| h.name.as_deref() == Some("Subject"))
                    .and_then(|h| h.value.clone())
            })
            .unwrap_or_else(|| "No Subject".to_string());

        let (body_text, body_html) = Self::extract_bodies(&message);

        MailMessage {
            id,
            subject,
            body_text,
            body_html,
        }
    }

    fn extract_bodies(message: &Message) -> (Option<String>, Option<String>) {
        let payload = match message.payload.as_ref() {
            Some(p) => p,
            None => return (None, None),
        };

        let mut text_body = None;
        let mut html_body = None;

        if let Some(decoded) = Self::decode_part(payload) {
            match payload.mime_type.as_deref() {
                Some("text/html") => html_body = Some(decoded),
                _ => text_body = Some(decoded),
            }
        }

        if let Some(parts) = &payload.parts {
            Self::extract_bodies_from_parts(parts, &mut text_body, &mut html_body);
        }

        (text_body, html_body)
    }

    fn extract_bodies_from_parts(
        parts: &[MessagePart],
        text_body: &mut Option<String>,
        html_body: &mut Option<String>,
    ) {
        for part in parts {
            match part.mime_type.as_deref() {
                Some("text/plain") if text_body.is_none() => {
                    *text_body = Self::decode_part(part);
                }
                Some("text/html") if html_body.is_none() => {
                    *html_body = Self::decode_part(part);
                }
                Some(mime) if mime.starts_with("multipart/") => {
                    if let Some(nested_parts) = &part.parts {
                        Self::extract_bodies_from_parts(nested_parts, text_body, html_body);
                    }
                }
                _ => {}
            }
        }
    }

    fn decode_part(part: &MessagePart) -> Option<String> {
        let data = part.body.as_ref()?.data.as_ref()?;
        String::from_utf8(data.to_vec()).ok()
    }
}

impl Mailbox for GmailMailbox {
    async fn search(&self, filter: &str, max_results: u32) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_results.saturating_sub(ids.len() as u32);
            if remaining == 0 {
                break;
            }

            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(filter)
                .max_results(remaining.min(MAX_PAGE_SIZE))
                .add_scope(Scope::Readonly);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, response) = call.doit().await.context("Failed to list messages")?;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!("Gmail search '{}' matched {} messages", filter, ids.len());
        Ok(ids)
    }

    async fn fetch(&self, message_id: &str) -> Result<MailMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", message_id)
            .format("full")
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .with_context(|| format!("Failed to get message {}", message_id))?;

        Ok(Self::parse_message(message))
    }
}
