//! Session orchestration: one call, one session, one card.
//!
//! Creates a session, follows its event stream until it ends, and turns the
//! idea produced by the structured-generation node into a [`CardResult`].
//! The stream is torn down on every exit path. Nothing is retried here; a
//! caller that wants another attempt calls again and gets a fresh session.

use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use reqwest::Url;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::card::build_card;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::idea_from_state;
use crate::model::{CardResult, GenerateRequest, IdeaRecord, SessionId};
use crate::session::SessionClient;
use crate::stream::{EventStreamClient, StreamObserver};
use crate::telemetry::metrics;
use crate::telemetry::session::{record_outcome, record_state_transition, start_session_span};

/// Node whose completion carries the structured idea.
pub const PRODUCER_NODE: &str = "generate_structured";

/// How long teardown may take before the stream task is left to finish alone.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Produces cards, one generation session per call.
pub struct Generator {
    sessions: SessionClient,
    ws_base: Url,
    api_token: Option<SecretString>,
    session_timeout: Option<Duration>,
}

impl Generator {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            sessions: SessionClient::new(config)?,
            ws_base: config.websocket_base()?,
            api_token: config.api_token.clone(),
            session_timeout: config.session_timeout,
        })
    }

    /// Override the session deadline. `None` waits for the backend forever.
    pub fn session_timeout(mut self, limit: Option<Duration>) -> Self {
        self.session_timeout = limit;
        self
    }

    /// Generate the `next_id`-th card.
    ///
    /// Resolves once the backend completes the session with a structured
    /// idea. Fails with the backend's message on an `error` event, with
    /// [`Error::ResultNotFound`] when the session completes without an idea,
    /// and with [`Error::StreamTransport`] / [`Error::Timeout`] when the
    /// stream breaks or the deadline passes.
    pub async fn next_card(&self, request: &GenerateRequest, next_id: u64) -> Result<CardResult> {
        let started = Instant::now();
        let session_id = self.sessions.create_session(request).await?;
        metrics::sessions_created().add(1, &[]);

        let span = start_session_span(&session_id);
        let result = self.follow(&session_id).instrument(span.clone()).await;

        let outcome = outcome_label(&result);
        record_outcome(&span, outcome);
        metrics::sessions_finished().add(1, &[KeyValue::new("outcome", outcome)]);
        metrics::session_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("outcome", outcome)],
        );

        match result {
            Ok(idea) => {
                let card = build_card(idea, next_id, &request.macro_themes);
                info!(
                    session_id = %session_id,
                    card_id = card.id,
                    beats = card.beats.len(),
                    "card generated"
                );
                Ok(card)
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "generation failed");
                Err(e)
            }
        }
    }

    /// Connect, start, and collect until the stream ends, then tear down.
    async fn follow(&self, session_id: &SessionId) -> Result<IdeaRecord> {
        let mut stream =
            EventStreamClient::new(&self.ws_base, session_id).with_token(self.api_token.clone());
        stream.connect();
        record_state_transition(&Span::current(), "idle", "connecting");

        let run = run_session(&mut stream);
        let result = match self.session_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(Error::Timeout(limit))),
            None => run.await,
        };

        let from = stream.state().as_str();
        stream.disconnect();
        record_state_transition(&Span::current(), from, "closed");
        if tokio::time::timeout(CLOSE_GRACE, stream.closed()).await.is_err() {
            warn!("event stream did not finish closing in time");
        }
        result
    }
}

async fn run_session(stream: &mut EventStreamClient) -> Result<IdeaRecord> {
    stream.wait_open().await?;
    record_state_transition(&Span::current(), "connecting", "open");
    stream.start();

    let mut collector = IdeaCollector::default();
    stream.observe(&mut collector).await;
    collector.finish()
}

fn outcome_label(result: &Result<IdeaRecord>) -> &'static str {
    match result {
        Ok(_) => "card",
        Err(Error::ResultNotFound) => "not_found",
        Err(Error::Protocol(_)) => "protocol_error",
        Err(Error::Timeout(_)) => "timeout",
        Err(_) => "transport_error",
    }
}

/// Observer that keeps the latest idea seen from [`PRODUCER_NODE`] and
/// settles on the first terminal event.
#[derive(Debug, Default)]
pub struct IdeaCollector {
    candidate: Option<IdeaRecord>,
    outcome: Option<Result<IdeaRecord>>,
    tokens: usize,
}

impl IdeaCollector {
    /// The idea cached so far, if any.
    pub fn candidate(&self) -> Option<&IdeaRecord> {
        self.candidate.as_ref()
    }

    /// How the session ended. A stream that closed without a terminal
    /// event counts as a transport failure.
    pub fn finish(self) -> Result<IdeaRecord> {
        self.outcome.unwrap_or_else(|| {
            Err(Error::StreamTransport(
                "stream closed before generation completed".to_string(),
            ))
        })
    }

    fn settle(&mut self, outcome: Result<IdeaRecord>) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }
}

impl StreamObserver for IdeaCollector {
    fn on_ready(&mut self, message: Option<&str>) {
        debug!(message, "backend acknowledged stream");
    }

    fn on_token(&mut self, _chunk: &str, node: Option<&str>) {
        self.tokens += 1;
        if self.tokens == 1 {
            debug!(node, "first token received");
        }
    }

    fn on_node_complete(&mut self, node: Option<&str>, state: &Value) {
        if node != Some(PRODUCER_NODE) {
            debug!(node, "ignoring node completion");
            return;
        }
        // Each producer completion replaces what an earlier one left.
        self.candidate = idea_from_state(state);
        debug!(found = self.candidate.is_some(), "producer node completed");
    }

    fn on_complete(&mut self, message: Option<&str>) {
        debug!(message, tokens = self.tokens, "generation complete");
        let outcome = self.candidate.take().ok_or(Error::ResultNotFound);
        self.settle(outcome);
    }

    fn on_error(&mut self, error: Error) {
        warn!(error = %error, "generation stream reported an error");
        self.settle(Err(error));
    }
}
