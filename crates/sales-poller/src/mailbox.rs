use anyhow::Result;

/// A message as fetched from the mailbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

impl MailMessage {
    /// HTML body when present, otherwise the plain text body
    pub fn body(&self) -> &str {
        self.body_html
            .as_deref()
            .or(self.body_text.as_deref())
            .unwrap_or("")
    }
}

/// Read access to a mailbox
#[allow(async_fn_in_trait)]
pub trait Mailbox {
    /// Ids of messages matching `filter`, newest first, at most `max_results`
    async fn search(&self, filter: &str, max_results: u32) -> Result<Vec<String>>;

    async fn fetch(&self, message_id: &str) -> Result<MailMessage>;
}
