//! Streaming primitives: the lazy token sequence produced by
//! `execute_streaming` and consumed by streaming nodes.
//!
//! A [`TokenStream`] is finite and non-restartable: it ends with a normal
//! close or an error, and dropping the consumer closes the underlying
//! transport (the producer's sends start failing immediately). Tokens arrive
//! in transport order.

mod markdown;
mod structured;

pub use markdown::{MarkdownHandler, MarkdownParser};
pub use structured::{Section, SectionDecoder};

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Producer half of a token stream, held by an executor.
#[derive(Clone, Debug)]
pub struct TokenSender {
    tx: mpsc::Sender<Result<String, LlmError>>,
}

impl TokenSender {
    /// Emits one text fragment. Returns `false` when the consumer is gone
    /// (the transport should stop producing).
    pub async fn send(&self, token: impl Into<String>) -> bool {
        self.tx.send(Ok(token.into())).await.is_ok()
    }

    /// Terminates the stream with an error.
    pub async fn fail(&self, error: LlmError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// True once the consumer dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Lazy, finite sequence of text fragments in arrival order.
pub struct TokenStream {
    rx: mpsc::Receiver<Result<String, LlmError>>,
    cancellation: Option<CancellationToken>,
}

impl TokenStream {
    /// Creates a connected (sender, stream) pair.
    pub fn channel(buffer: usize) -> (TokenSender, TokenStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            TokenSender { tx },
            TokenStream {
                rx,
                cancellation: None,
            },
        )
    }

    /// A pre-filled finite stream, mostly useful for stubs and tests.
    pub fn from_tokens<I, S>(tokens: I) -> TokenStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity is sized to the token count; try_send cannot fail here.
            let _ = tx.try_send(Ok(item));
        }
        TokenStream {
            rx,
            cancellation: None,
        }
    }

    /// Binds the stream to a cancellation token: once cancelled, the stream
    /// ends and the transport is closed.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Next fragment, or `None` on normal end.
    pub async fn next_token(&mut self) -> Option<Result<String, LlmError>> {
        if self.cancelled() {
            self.rx.close();
            return None;
        }
        match self.cancellation.clone() {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    self.rx.close();
                    None
                }
                item = self.rx.recv() => item,
            },
            None => self.rx.recv().await,
        }
    }

    /// Drains the stream, concatenating all fragments.
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(item) = self.next_token().await {
            text.push_str(&item?);
        }
        Ok(text)
    }

    fn cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

impl Stream for TokenStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled() {
            self.rx.close();
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}
