//! Network event tracing
//!
//! A [`Trace`] is the narrow sink the tracing decorators append to. The
//! caller creates one per logical measurement, attaches it to the
//! [`Context`](crate::Context) of each call, and reads the collected
//! [`NetworkEvent`]s once the measurement is over. Primitives only append.
//!
//! Event and field names are serialized as-is into measurement results, so
//! they are part of the output format.

use serde::{Serialize, Serializer};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Sink for network events. Must tolerate concurrent appends.
pub trait Trace: Send + Sync {
    fn record(&self, event: NetworkEvent);
}

/// Trace that drops every event. Used when no trace is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;

impl Trace for NoopTrace {
    fn record(&self, _event: NetworkEvent) {}
}

/// Kind of network event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ResolveStart,
    ResolveDone,
    ConnectStart,
    ConnectDone,
    TlsHandshakeStart,
    TlsHandshakeDone,
    QuicHandshakeStart,
    QuicHandshakeDone,
}

impl EventKind {
    pub fn is_start(&self) -> bool {
        matches!(
            self,
            EventKind::ResolveStart
                | EventKind::ConnectStart
                | EventKind::TlsHandshakeStart
                | EventKind::QuicHandshakeStart
        )
    }
}

/// A timestamped network event
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEvent {
    pub kind: EventKind,
    /// Wall clock time the event was created
    #[serde(serialize_with = "serialize_unix_time")]
    pub time: SystemTime,
    /// Time since the trace was created, filled in by the trace
    #[serde(serialize_with = "serialize_secs")]
    pub t: Duration,
    /// Monotonic creation time
    #[serde(skip)]
    pub at: Instant,
    /// Duration of the operation, on done events
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_secs"
    )]
    pub elapsed: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiated_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl NetworkEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            time: SystemTime::now(),
            t: Duration::ZERO,
            at: Instant::now(),
            elapsed: None,
            network: None,
            address: None,
            hostname: None,
            addresses: Vec::new(),
            remote_address: None,
            sni: None,
            alpn: Vec::new(),
            negotiated_protocol: None,
            tls_version: None,
            cipher_suite: None,
            failure: None,
        }
    }

    /// Create a done event for an operation that started at `started`
    pub fn done(kind: EventKind, started: Instant) -> Self {
        let mut event = Self::new(kind);
        event.elapsed = Some(event.at.saturating_duration_since(started));
        event
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Record the outcome of an operation: the failure string for errors.
    pub fn with_outcome<T>(mut self, result: &crate::Result<T>) -> Self {
        if let Err(err) = result {
            self.failure = Some(err.to_string());
        }
        self
    }
}

/// In-memory trace of one measurement
#[derive(Debug)]
pub struct MeasurementTrace {
    zero: Instant,
    events: Mutex<Vec<NetworkEvent>>,
}

impl MeasurementTrace {
    pub fn new() -> Self {
        Self::with_zero_time(Instant::now())
    }

    /// Create a trace whose relative times count from `zero`
    pub fn with_zero_time(zero: Instant) -> Self {
        Self {
            zero,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn zero_time(&self) -> Instant {
        self.zero
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<NetworkEvent> {
        self.lock().clone()
    }

    /// Remove and return the events recorded so far
    pub fn take_events(&self) -> Vec<NetworkEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<NetworkEvent>> {
        // A panicking appender cannot leave the vector half-written.
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MeasurementTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace for MeasurementTrace {
    fn record(&self, mut event: NetworkEvent) {
        event.t = event.at.saturating_duration_since(self.zero);
        self.lock().push(event);
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

fn serialize_opt_secs<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_f64(value.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

fn serialize_unix_time<S: Serializer>(
    value: &SystemTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let secs = value
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    serializer.serialize_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_relative_time() {
        let trace = MeasurementTrace::new();
        std::thread::sleep(Duration::from_millis(5));
        trace.record(NetworkEvent::new(EventKind::ConnectStart));

        let events = trace.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].t >= Duration::from_millis(5));
    }

    #[test]
    fn test_done_event_elapsed() {
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(2));
        let event = NetworkEvent::done(EventKind::ConnectDone, started);
        assert!(event.elapsed.unwrap() >= Duration::from_millis(2));
        assert!(!event.kind.is_start());
    }

    #[test]
    fn test_concurrent_appends() {
        let trace = Arc::new(MeasurementTrace::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let trace = trace.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        trace.record(NetworkEvent::new(EventKind::ResolveStart));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(trace.len(), 800);
        assert_eq!(trace.take_events().len(), 800);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let event = NetworkEvent::done(EventKind::TlsHandshakeDone, Instant::now())
            .with_address("1.1.1.1:443");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "tls_handshake_done");
        assert_eq!(value["address"], "1.1.1.1:443");
        assert!(value["t"].is_f64());
        assert!(value["elapsed"].is_f64());
        assert!(value.get("failure").is_none());
        assert!(value.get("at").is_none());
    }
}
