use crate::error::{Result, StreamError};
use crate::stream::Stream;

/// Forwards string tokens while assembling the full text seen so far
pub struct TokenStream {
    inner: Stream<String>,
    text: String,
}

impl TokenStream {
    pub fn new(inner: Stream<String>) -> Self {
        Self {
            inner,
            text: String::new(),
        }
    }

    pub async fn recv(&mut self) -> Option<String> {
        let token = self.inner.recv().await?;
        self.text.push_str(&token);
        Some(token)
    }

    pub fn full_text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.inner.error()
    }

    /// Read the remaining tokens and return the assembled text
    pub async fn drain(mut self) -> Result<String> {
        while self.recv().await.is_some() {}
        self.inner.check()?;
        Ok(self.text)
    }
}

impl From<Stream<String>> for TokenStream {
    fn from(inner: Stream<String>) -> Self {
        Self::new(inner)
    }
}
