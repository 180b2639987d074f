//! APM client: transactions, spans and captured errors.
//!
//! # Responsibilities
//! - Start once at process start with a fixed configuration
//! - Hand out request-scoped transaction and span handles
//! - Record outcomes and captured errors through a [`Reporter`]
//!
//! # Design Decisions
//! - Handles end on `end()` or on drop, exactly once
//! - A span borrows its transaction, so it cannot outlive it
//! - Outcome is set at most once; later calls are ignored
//! - Error capture is best effort and cannot fail

use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ApmConfig;
use crate::observability::metrics;

/// Terminal result of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unknown,
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Unknown => "unknown",
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub outcome: Outcome,
    pub duration: Duration,
    pub spans: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub transaction_id: Uuid,
    pub name: String,
    pub kind: String,
    pub subtype: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub message: String,
    pub crash: bool,
    pub transaction_id: Option<Uuid>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Request details attached to a captured error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub transaction_id: Option<Uuid>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Unhandled failure surfaced by the request supervisor.
    pub crash: bool,
}

impl ErrorContext {
    pub fn for_transaction(transaction: &Transaction) -> Self {
        Self {
            transaction_id: Some(transaction.id()),
            ..Self::default()
        }
    }
}

/// Destination for finished transactions, spans and errors.
pub trait Reporter: Send + Sync {
    fn transaction(&self, record: &TransactionRecord);
    fn span(&self, record: &SpanRecord);
    fn error(&self, record: &ErrorRecord);
}

/// Emits records as structured tracing events, so they reach every log sink.
pub struct TracingReporter {
    service: String,
    environment: String,
}

impl TracingReporter {
    pub fn new(config: &ApmConfig) -> Self {
        Self {
            service: config.service_name.clone(),
            environment: config.environment.clone(),
        }
    }
}

impl Reporter for TracingReporter {
    fn transaction(&self, record: &TransactionRecord) {
        metrics::record_transaction(&record.name, record.outcome.as_str());
        tracing::info!(
            target: "apm",
            service = %self.service,
            environment = %self.environment,
            transaction.id = %record.id,
            transaction.name = %record.name,
            transaction.kind = %record.kind,
            transaction.outcome = record.outcome.as_str(),
            transaction.spans = record.spans,
            duration_ms = record.duration.as_secs_f64() * 1000.0,
            "transaction ended"
        );
    }

    fn span(&self, record: &SpanRecord) {
        tracing::info!(
            target: "apm",
            service = %self.service,
            transaction.id = %record.transaction_id,
            span.name = %record.name,
            span.kind = %record.kind,
            span.subtype = %record.subtype,
            duration_ms = record.duration.as_secs_f64() * 1000.0,
            "span ended"
        );
    }

    fn error(&self, record: &ErrorRecord) {
        metrics::record_error_captured();
        tracing::error!(
            target: "apm",
            service = %self.service,
            environment = %self.environment,
            error.id = %record.id,
            error.crash = record.crash,
            transaction.id = ?record.transaction_id,
            http.method = record.method.as_deref(),
            http.path = record.path.as_deref(),
            http.headers = ?record.headers,
            http.body = record.body.as_deref(),
            "{}",
            record.message
        );
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct MemoryReporter {
    transactions: Mutex<Vec<TransactionRecord>>,
    spans: Mutex<Vec<SpanRecord>>,
    errors: Mutex<Vec<ErrorRecord>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        lock(&self.transactions).clone()
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        lock(&self.spans).clone()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        lock(&self.errors).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Reporter for MemoryReporter {
    fn transaction(&self, record: &TransactionRecord) {
        lock(&self.transactions).push(record.clone());
    }

    fn span(&self, record: &SpanRecord) {
        lock(&self.spans).push(record.clone());
    }

    fn error(&self, record: &ErrorRecord) {
        lock(&self.errors).push(record.clone());
    }
}

/// The process APM client.
pub struct ApmClient {
    config: ApmConfig,
    reporter: Arc<dyn Reporter>,
}

impl ApmClient {
    /// Start the agent with the tracing reporter.
    pub fn start(config: ApmConfig) -> Self {
        let reporter = Arc::new(TracingReporter::new(&config));
        Self::with_reporter(config, reporter)
    }

    pub fn with_reporter(config: ApmConfig, reporter: Arc<dyn Reporter>) -> Self {
        tracing::debug!(
            service = %config.service_name,
            server_url = %config.server_url,
            environment = %config.environment,
            capture_body = ?config.capture_body,
            capture_headers = config.capture_headers,
            capture_exceptions = config.capture_exceptions,
            secret_token = config.secret_token.is_some(),
            sample_rate = config.transaction_sample_rate,
            "APM agent started"
        );
        Self { config, reporter }
    }

    pub fn config(&self) -> &ApmConfig {
        &self.config
    }

    pub fn start_transaction(&self, name: &str, kind: &str) -> Transaction {
        let rate = self.config.transaction_sample_rate.clamp(0.0, 1.0);
        let sampled = rand::thread_rng().gen_bool(rate);
        Transaction {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: kind.to_string(),
            sampled,
            outcome: Outcome::Unknown,
            started: Instant::now(),
            spans: Mutex::new(0),
            reporter: self.reporter.clone(),
            ended: false,
        }
    }

    /// Report an error. Crashes are dropped when exception capture is off;
    /// headers and body are dropped unless their capture is on.
    pub fn capture_error(&self, error: &(dyn std::error::Error + 'static), context: ErrorContext) {
        if context.crash && !self.config.capture_exceptions {
            return;
        }
        let headers = if self.config.capture_headers {
            context.headers
        } else {
            Vec::new()
        };
        let body = context.body.filter(|_| self.config.capture_body.for_errors());
        self.reporter.error(&ErrorRecord {
            id: Uuid::new_v4(),
            message: error.to_string(),
            crash: context.crash,
            transaction_id: context.transaction_id,
            method: context.method,
            path: context.path,
            headers,
            body,
        });
    }
}

/// One logical unit of request work.
pub struct Transaction {
    id: Uuid,
    name: String,
    kind: String,
    sampled: bool,
    outcome: Outcome,
    started: Instant,
    spans: Mutex<u32>,
    reporter: Arc<dyn Reporter>,
    ended: bool,
}

impl Transaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Set the terminal outcome. Returns false if one was already set.
    pub fn set_outcome(&mut self, outcome: Outcome) -> bool {
        if self.outcome != Outcome::Unknown || outcome == Outcome::Unknown {
            return false;
        }
        self.outcome = outcome;
        true
    }

    pub fn start_span(&self, name: &str, kind: &str, subtype: &str) -> Span<'_> {
        *lock(&self.spans) += 1;
        Span {
            transaction: self,
            name: name.to_string(),
            kind: kind.to_string(),
            subtype: subtype.to_string(),
            started: Instant::now(),
            ended: false,
        }
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if !self.sampled {
            return;
        }
        self.reporter.transaction(&TransactionRecord {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            outcome: self.outcome,
            duration: self.started.elapsed(),
            spans: *lock(&self.spans),
        });
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.finish();
    }
}

/// A sub-operation of a transaction, such as one outbound call.
pub struct Span<'t> {
    transaction: &'t Transaction,
    name: String,
    kind: String,
    subtype: String,
    started: Instant,
    ended: bool,
}

impl Span<'_> {
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if !self.transaction.sampled {
            return;
        }
        self.transaction.reporter.span(&SpanRecord {
            transaction_id: self.transaction.id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            subtype: self.subtype.clone(),
            duration: self.started.elapsed(),
        });
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
