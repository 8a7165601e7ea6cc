// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection gate: opens one transport session per operation and guarantees
// it is closed exactly once, whichever way the operation exits.
//
// The gate never retries and never shares a session.  Sessions come from a
// `Connector`, which is the seam between the protocol layer and the network
// (`transport::NetConnector`) or a scripted fake in tests.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{Diagnostic, ServerEndpoint, StatusCode};

use crate::codec::RequestBody;

/// Reply to a file transfer (GET) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReply {
    /// HTTP status of the transfer.
    pub status: u16,
    /// Server's `Last-Modified`, if sent.
    pub last_modified: Option<DateTime<Utc>>,
}

/// An open session able to carry one request.
///
/// Failures are reported as the [`Diagnostic`] describing them, captured
/// before the method returns.
pub trait Session: Send {
    /// POST `body` to `resource` and return the raw IPP body of the reply.
    /// A missing or non-200 reply is an error.
    fn exchange(
        &mut self,
        resource: &str,
        body: &mut RequestBody,
    ) -> std::result::Result<Vec<u8>, Diagnostic>;

    /// GET `resource`, conditional on `if_modified_since`.  The body of a 200
    /// reply is streamed into `sink`; other statuses are returned as-is.
    fn fetch(
        &mut self,
        resource: &str,
        if_modified_since: Option<DateTime<Utc>>,
        sink: &mut dyn Write,
    ) -> std::result::Result<FetchReply, Diagnostic>;

    /// Release the session.  Best-effort; never fails.
    fn close(&mut self);
}

/// Opens sessions to a server endpoint.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> std::result::Result<Box<dyn Session>, Diagnostic>;
}

/// Opens connections to the configured server on demand.
#[derive(Clone)]
pub struct ConnectionGate {
    endpoint: Arc<ServerEndpoint>,
    connector: Arc<dyn Connector>,
}

impl ConnectionGate {
    pub fn new(endpoint: Arc<ServerEndpoint>, connector: Arc<dyn Connector>) -> Self {
        Self { endpoint, connector }
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// Open a fresh connection.  Fails with [`SpoolgateError::Connection`]
    /// carrying the diagnostic of the failed attempt.
    pub fn connect(&self) -> Result<Connection> {
        match self.connector.connect(&self.endpoint) {
            Ok(session) => {
                debug!(server = %self.endpoint, "connection opened");
                Ok(Connection {
                    session,
                    closed: false,
                })
            }
            Err(diagnostic) => {
                warn!(server = %self.endpoint, %diagnostic, "connection failed");
                Err(SpoolgateError::Connection {
                    host: self.endpoint.host.clone(),
                    port: self.endpoint.port,
                    diagnostic,
                })
            }
        }
    }

    /// Close a connection.  Equivalent to dropping it.
    pub fn close(&self, mut connection: Connection) {
        connection.close();
    }
}

/// An open connection, exclusively owned by the operation that opened it.
///
/// Closed on drop if not closed explicitly; the session's `close` runs once.
pub struct Connection {
    session: Box<dyn Session>,
    closed: bool,
}

impl Connection {
    /// Send an encoded IPP request; see [`Session::exchange`].
    pub fn exchange(
        &mut self,
        resource: &str,
        body: &mut RequestBody,
    ) -> std::result::Result<Vec<u8>, Diagnostic> {
        if self.closed {
            return Err(closed_diagnostic());
        }
        self.session.exchange(resource, body)
    }

    /// Conditional file transfer; see [`Session::fetch`].
    pub fn fetch(
        &mut self,
        resource: &str,
        if_modified_since: Option<DateTime<Utc>>,
        sink: &mut dyn Write,
    ) -> std::result::Result<FetchReply, Diagnostic> {
        if self.closed {
            return Err(closed_diagnostic());
        }
        self.session.fetch(resource, if_modified_since, sink)
    }

    /// Close the connection.  Safe to call any number of times.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.close();
            debug!("connection closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn closed_diagnostic() -> Diagnostic {
    Diagnostic::new(StatusCode::SERVER_ERROR_INTERNAL, "connection already closed")
}

/// Scripted connector and session used by the unit tests of every operation.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// What one connect attempt does.
    pub enum Script {
        /// Connecting fails with this diagnostic.
        Refuse(Diagnostic),
        /// Connect succeeds; the exchange returns this.
        Reply(std::result::Result<Vec<u8>, Diagnostic>),
        /// Connect succeeds; a fetch writes `body` and returns `status`.
        File {
            status: u16,
            body: Vec<u8>,
            last_modified: Option<DateTime<Utc>>,
        },
    }

    #[derive(Default)]
    pub struct Counters {
        pub connects: AtomicUsize,
        pub closes: AtomicUsize,
        pub refused: AtomicUsize,
        pub requests: Mutex<Vec<Vec<u8>>>,
        pub resources: Mutex<Vec<String>>,
    }

    pub struct FakeConnector {
        scripts: Mutex<VecDeque<Script>>,
        pub counters: Arc<Counters>,
    }

    impl FakeConnector {
        pub fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                counters: Arc::new(Counters::default()),
            })
        }

        pub fn connects(&self) -> usize {
            self.counters.connects.load(Ordering::SeqCst)
        }

        pub fn closes(&self) -> usize {
            self.counters.closes.load(Ordering::SeqCst)
        }

        /// Successful connects (each must be matched by one close).
        pub fn opened(&self) -> usize {
            self.connects() - self.counters.refused.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<Vec<u8>> {
            self.counters.requests.lock().unwrap().last().cloned()
        }

        pub fn resources(&self) -> Vec<String> {
            self.counters.resources.lock().unwrap().clone()
        }
    }

    impl Connector for FakeConnector {
        fn connect(
            &self,
            _endpoint: &ServerEndpoint,
        ) -> std::result::Result<Box<dyn Session>, Diagnostic> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("no script left for this connect");
            if let Script::Refuse(diagnostic) = script {
                self.counters.refused.fetch_add(1, Ordering::SeqCst);
                return Err(diagnostic);
            }
            Ok(Box::new(FakeSession {
                script: Some(script),
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    struct FakeSession {
        script: Option<Script>,
        counters: Arc<Counters>,
    }

    impl Session for FakeSession {
        fn exchange(
            &mut self,
            resource: &str,
            body: &mut RequestBody,
        ) -> std::result::Result<Vec<u8>, Diagnostic> {
            self.counters.resources.lock().unwrap().push(resource.to_string());
            let mut sent = Vec::new();
            body.write_to(&mut sent).unwrap();
            self.counters.requests.lock().unwrap().push(sent);
            match self.script.take() {
                Some(Script::Reply(reply)) => reply,
                _ => panic!("session was not scripted for an exchange"),
            }
        }

        fn fetch(
            &mut self,
            resource: &str,
            _if_modified_since: Option<DateTime<Utc>>,
            sink: &mut dyn Write,
        ) -> std::result::Result<FetchReply, Diagnostic> {
            self.counters.resources.lock().unwrap().push(resource.to_string());
            match self.script.take() {
                Some(Script::File {
                    status,
                    body,
                    last_modified,
                }) => {
                    sink.write_all(&body).unwrap();
                    Ok(FetchReply {
                        status,
                        last_modified,
                    })
                }
                _ => panic!("session was not scripted for a fetch"),
            }
        }

        fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use spoolgate_core::types::EncryptionMode;

    use super::fake::{FakeConnector, Script};
    use super::*;

    fn endpoint() -> Arc<ServerEndpoint> {
        Arc::new(ServerEndpoint::new("print.example.com", 631, EncryptionMode::Never))
    }

    #[test]
    fn refused_connect_carries_diagnostic() {
        let connector = FakeConnector::new(vec![Script::Refuse(Diagnostic::new(
            StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE,
            "Connection refused",
        ))]);
        let gate = ConnectionGate::new(endpoint(), connector.clone());

        match gate.connect() {
            Err(SpoolgateError::Connection {
                host,
                port,
                diagnostic,
            }) => {
                assert_eq!(host, "print.example.com");
                assert_eq!(port, 631);
                assert_eq!(diagnostic.message, "Connection refused");
            }
            _ => panic!("expected a connection error"),
        }
        assert_eq!(connector.closes(), 0);
    }

    #[test]
    fn close_is_idempotent_and_drop_does_not_double_close() {
        let connector = FakeConnector::new(vec![Script::Reply(Ok(Vec::new()))]);
        let gate = ConnectionGate::new(endpoint(), connector.clone());

        let mut connection = gate.connect().unwrap();
        connection.close();
        connection.close();
        assert!(connection.is_closed());
        drop(connection);
        assert_eq!(connector.closes(), 1);
    }

    #[test]
    fn drop_closes_unclosed_connection() {
        let connector = FakeConnector::new(vec![Script::Reply(Ok(Vec::new()))]);
        let gate = ConnectionGate::new(endpoint(), connector.clone());
        {
            let _connection = gate.connect().unwrap();
        }
        assert_eq!(connector.closes(), 1);
    }

    #[test]
    fn exchange_after_close_fails_without_touching_session() {
        let connector = FakeConnector::new(vec![Script::Reply(Ok(Vec::new()))]);
        let gate = ConnectionGate::new(endpoint(), connector.clone());

        let mut connection = gate.connect().unwrap();
        connection.close();
        let mut body = RequestBody::new(Vec::new());
        assert!(connection.exchange("/", &mut body).is_err());
        assert!(connector.last_request().is_none());
        gate.close(connection);
        assert_eq!(connector.closes(), 1);
    }
}
