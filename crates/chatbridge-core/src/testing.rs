//! In-memory gateway doubles for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates that need a scripted gateway.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::delivery::FileAttachment;
use crate::envelope::RawMessage;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{Gateway, GatewayEvents, Outbound};

// =============================================================================
// Recording Outbound
// =============================================================================

/// Outbound that records every text send and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(u64, String)>>,
    files: Mutex<Vec<(u64, Option<String>, FileAttachment)>>,
    failure: Option<GatewayError>,
    fail_after: usize,
}

impl RecordingOutbound {
    /// Every send fails with `err`.
    pub fn failing(err: GatewayError) -> Self {
        Self::failing_after(0, err)
    }

    /// The first `n` sends succeed, the rest fail with `err`.
    pub fn failing_after(n: usize, err: GatewayError) -> Self {
        Self {
            failure: Some(err),
            fail_after: n,
            ..Self::default()
        }
    }

    /// `(channel_id, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().clone()
    }

    /// Sent texts only.
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    /// Uploaded files.
    pub fn files(&self) -> Vec<(u64, Option<String>, FileAttachment)> {
        self.files.lock().clone()
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(&self, channel_id: u64, text: &str) -> GatewayResult<()> {
        let mut sent = self.sent.lock();
        if let Some(err) = &self.failure {
            if sent.len() >= self.fail_after {
                return Err(err.clone());
            }
        }
        sent.push((channel_id, text.to_string()));
        Ok(())
    }

    async fn send_file(
        &self,
        channel_id: u64,
        content: Option<&str>,
        file: &FileAttachment,
    ) -> GatewayResult<()> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        self.files
            .lock()
            .push((channel_id, content.map(str::to_string), file.clone()));
        Ok(())
    }
}

// =============================================================================
// Scripted Gateway
// =============================================================================

/// How a scripted session ends after becoming ready.
#[derive(Debug, Clone)]
pub enum SessionEnd {
    /// The connection drops with an error.
    Drop(GatewayError),
    /// `connect` returns `Ok` on its own.
    CloseCleanly,
    /// The session stays up until [`Gateway::close`] is called.
    AwaitClose,
}

/// One scripted `connect` call.
#[derive(Debug, Clone)]
pub enum Session {
    /// `connect` fails immediately.
    Fail(GatewayError),
    /// Signals ready, delivers `messages`, then ends as `end` says.
    Ready {
        identity: u64,
        messages: Vec<RawMessage>,
        end: SessionEnd,
    },
}

impl Session {
    /// A ready session with no messages that waits to be closed.
    pub fn serve(identity: u64) -> Self {
        Self::Ready {
            identity,
            messages: Vec::new(),
            end: SessionEnd::AwaitClose,
        }
    }
}

/// A gateway that plays back a script of sessions.
///
/// Once the script runs out every further `connect` fails with a connection
/// error.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<Session>>,
    rejected: HashSet<String>,
    outbound: RecordingOutbound,
    events: Mutex<Option<Arc<dyn GatewayEvents>>>,
    closed: CancellationToken,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a session to the script.
    pub fn session(self, session: Session) -> Self {
        self.script.lock().push_back(session);
        self
    }

    /// Makes `connect` fail with an authentication error for `credential`.
    pub fn reject_credential(mut self, credential: impl Into<String>) -> Self {
        self.rejected.insert(credential.into());
        self
    }

    /// Sends through the gateway fail with `err`.
    pub fn failing_sends(mut self, err: GatewayError) -> Self {
        self.outbound = RecordingOutbound::failing(err);
        self
    }

    /// Delivers a message through the callbacks of the current session.
    pub async fn deliver(&self, message: RawMessage) {
        let events = self.events.lock().clone();
        if let Some(events) = events {
            events.on_message(message).await;
        }
    }

    pub fn sent(&self) -> Vec<(u64, String)> {
        self.outbound.sent()
    }

    pub fn texts(&self) -> Vec<String> {
        self.outbound.texts()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Outbound for MockGateway {
    async fn send_text(&self, channel_id: u64, text: &str) -> GatewayResult<()> {
        self.outbound.send_text(channel_id, text).await
    }

    async fn send_file(
        &self,
        channel_id: u64,
        content: Option<&str>,
        file: &FileAttachment,
    ) -> GatewayResult<()> {
        self.outbound.send_file(channel_id, content, file).await
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn connect(
        &self,
        credential: &str,
        events: Arc<dyn GatewayEvents>,
    ) -> GatewayResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.rejected.contains(credential) {
            return Err(GatewayError::Authentication("Improper token has been passed.".into()));
        }

        let next = self.script.lock().pop_front();
        let Some(session) = next else {
            return Err(GatewayError::connection("no scripted session"));
        };

        match session {
            Session::Fail(err) => Err(err),
            Session::Ready {
                identity,
                messages,
                end,
            } => {
                *self.events.lock() = Some(events.clone());
                events.on_ready(identity).await;
                for message in messages {
                    events.on_message(message).await;
                }
                match end {
                    SessionEnd::Drop(err) => Err(err),
                    SessionEnd::CloseCleanly => Ok(()),
                    SessionEnd::AwaitClose => {
                        self.closed.cancelled().await;
                        Ok(())
                    }
                }
            }
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }
}
