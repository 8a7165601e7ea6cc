// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network sessions: TCP, local domain sockets, and TLS.
//
// Encryption follows the endpoint's mode:
//   - Never:       plain stream
//   - IfRequested: plain stream; a `426 Upgrade Required` reply reconnects,
//                  upgrades to TLS and sends the request once more
//   - Always:      TLS from the first byte
//   - Required:    plain connect, `OPTIONS *` with `Upgrade: TLS`,
//                  expect 101, then TLS on the same socket
//
// Each session carries one HTTP exchange (two when upgraded on request).
// Blocking std I/O with socket timeouts; callers on an async runtime go
// through `AsyncCupsClient`.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;
use tracing::{debug, info, instrument};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{Diagnostic, EncryptionMode, ServerEndpoint, StatusCode};

use crate::codec::RequestBody;
use crate::connection::{Connector, FetchReply, Session};
use crate::http;

/// Largest IPP reply body accepted from a server.
pub const MAX_IPP_REPLY_BYTES: u64 = 8 * 1024 * 1024;

/// HTTP status a server sends to demand encryption (RFC 2817 §4.2).
const UPGRADE_REQUIRED: u16 = 426;

/// A byte stream a session can run over.
trait Stream: Read + Write + Send {
    /// Best-effort orderly shutdown.
    fn close_stream(&mut self);
}

impl Stream for TcpStream {
    fn close_stream(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

#[cfg(unix)]
impl Stream for std::os::unix::net::UnixStream {
    fn close_stream(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

impl Stream for StreamOwned<ClientConnection, TcpStream> {
    fn close_stream(&mut self) {
        self.conn.send_close_notify();
        let _ = self.conn.complete_io(&mut self.sock);
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}

/// Opens streams.  Shared by the connector and its sessions, which need it
/// again to reconnect when a server asks for TLS.
#[derive(Clone)]
struct Dialer {
    timeout: Duration,
    tls: Arc<ClientConfig>,
}

impl Dialer {
    fn open_tcp(&self, endpoint: &ServerEndpoint) -> io::Result<TcpStream> {
        let addrs = (endpoint.host.as_str(), endpoint.port).to_socket_addrs()?;
        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", endpoint.host),
        );
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(%addr, "TCP connected");
                    return Ok(stream);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    #[cfg(unix)]
    fn open_local(&self, path: &str) -> io::Result<Box<dyn Stream>> {
        let stream = std::os::unix::net::UnixStream::connect(path)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(Box::new(stream))
    }

    #[cfg(not(unix))]
    fn open_local(&self, path: &str) -> io::Result<Box<dyn Stream>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("local sockets are not supported here: {path}"),
        ))
    }

    fn wrap_tls(&self, host: &str, tcp: TcpStream) -> io::Result<Box<dyn Stream>> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let conn = ClientConnection::new(Arc::clone(&self.tls), name).map_err(io::Error::other)?;
        let mut stream = StreamOwned::new(conn, tcp);
        // Finish the handshake now so TLS failures surface as connect errors.
        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock)?;
        }
        debug!(host, "TLS established");
        Ok(Box::new(stream))
    }

    /// `OPTIONS *` asking for TLS, then the handshake on the same socket.
    fn upgrade(
        &self,
        endpoint: &ServerEndpoint,
        mut tcp: TcpStream,
    ) -> io::Result<Box<dyn Stream>> {
        http::write_tls_upgrade(&mut tcp, &endpoint.authority())?;
        let head = http::read_head(&mut BufReader::new(&mut tcp))?;
        if head.status != 101 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("server refused TLS upgrade: {} {}", head.status, head.reason),
            ));
        }
        self.wrap_tls(&endpoint.host, tcp)
    }

    fn open(&self, endpoint: &ServerEndpoint) -> io::Result<Box<dyn Stream>> {
        if endpoint.is_local_socket() {
            return self.open_local(&endpoint.host);
        }
        let tcp = self.open_tcp(endpoint)?;
        match endpoint.encryption {
            EncryptionMode::Never | EncryptionMode::IfRequested => Ok(Box::new(tcp)),
            EncryptionMode::Always => self.wrap_tls(&endpoint.host, tcp),
            EncryptionMode::Required => self.upgrade(endpoint, tcp),
        }
    }
}

/// Connector that opens real network sessions.
pub struct NetConnector {
    dialer: Dialer,
}

impl NetConnector {
    /// Trust the bundled web PKI roots only.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_ca_file(timeout, None)
    }

    /// Trust the bundled web PKI roots plus every certificate in the PEM
    /// file `ca_file`.
    pub fn with_ca_file(timeout: Duration, ca_file: Option<&Path>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        if let Some(path) = ca_file {
            let added = add_ca_file(&mut roots, path)?;
            info!(path = %path.display(), certificates = added, "trusting extra CA certificates");
        }

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| SpoolgateError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            dialer: Dialer {
                timeout,
                tls: Arc::new(config),
            },
        })
    }
}

/// Add each certificate of a PEM bundle as a trust anchor.
fn add_ca_file(roots: &mut RootCertStore, path: &Path) -> Result<usize> {
    let unreadable =
        |e: &dyn std::fmt::Display| SpoolgateError::Tls(format!("CA file {}: {e}", path.display()));

    let mut added = 0;
    for cert in CertificateDer::pem_file_iter(path).map_err(|e| unreadable(&e))? {
        let cert = cert.map_err(|e| unreadable(&e))?;
        roots.add(cert).map_err(|e| unreadable(&e))?;
        added += 1;
    }
    if added == 0 {
        return Err(unreadable(&"no certificates found"));
    }
    Ok(added)
}

impl Connector for NetConnector {
    #[instrument(skip(self), fields(server = %endpoint))]
    fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> std::result::Result<Box<dyn Session>, Diagnostic> {
        let stream = self.dialer.open(endpoint).map_err(|e| {
            Diagnostic::new(StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE, e.to_string())
        })?;
        Ok(Box::new(NetSession {
            dialer: self.dialer.clone(),
            endpoint: endpoint.clone(),
            host: endpoint.authority(),
            stream,
            upgraded: false,
        }))
    }
}

/// One HTTP exchange over an open stream.
struct NetSession {
    dialer: Dialer,
    endpoint: ServerEndpoint,
    /// Value of the `Host` header.
    host: String,
    stream: Box<dyn Stream>,
    upgraded: bool,
}

impl NetSession {
    /// A 426 can still be honoured: plain TCP in if-requested mode, not yet
    /// upgraded.
    fn may_upgrade(&self) -> bool {
        self.endpoint.encryption == EncryptionMode::IfRequested
            && !self.endpoint.is_local_socket()
            && !self.upgraded
    }

    /// Replace the stream with a fresh TLS one after the server asked for
    /// encryption.
    fn switch_to_tls(&mut self) -> std::result::Result<(), Diagnostic> {
        info!(server = %self.endpoint, "server requires encryption, upgrading to TLS");
        self.stream.close_stream();
        let tcp = self.dialer.open_tcp(&self.endpoint).map_err(io_diagnostic)?;
        self.stream = self
            .dialer
            .upgrade(&self.endpoint, tcp)
            .map_err(io_diagnostic)?;
        self.upgraded = true;
        Ok(())
    }

    /// One POST.  `None` when the server answered 426 and the session may
    /// still upgrade.
    fn post(
        &mut self,
        resource: &str,
        body: &mut RequestBody,
    ) -> std::result::Result<Option<Vec<u8>>, Diagnostic> {
        http::write_ipp_post(&mut self.stream, &self.host, resource, body)
            .map_err(io_diagnostic)?;

        let may_upgrade = self.may_upgrade();
        let mut reader = BufReader::new(&mut self.stream);
        let head = http::read_head(&mut reader).map_err(io_diagnostic)?;
        if head.status == UPGRADE_REQUIRED && may_upgrade {
            return Ok(None);
        }
        if head.status != 200 {
            return Err(http_diagnostic(head.status, &head.reason));
        }
        let mut reply = Vec::new();
        http::read_body_capped(&mut reader, &head, &mut reply, MAX_IPP_REPLY_BYTES)
            .map_err(io_diagnostic)?;
        debug!(bytes = reply.len(), "IPP reply received");
        Ok(Some(reply))
    }

    /// One GET.  `None` as for [`post`](Self::post).
    fn get(
        &mut self,
        resource: &str,
        if_modified_since: Option<DateTime<Utc>>,
        sink: &mut dyn Write,
    ) -> std::result::Result<Option<FetchReply>, Diagnostic> {
        http::write_get(&mut self.stream, &self.host, resource, if_modified_since)
            .map_err(io_diagnostic)?;

        let may_upgrade = self.may_upgrade();
        let mut reader = BufReader::new(&mut self.stream);
        let head = http::read_head(&mut reader).map_err(io_diagnostic)?;
        if head.status == UPGRADE_REQUIRED && may_upgrade {
            return Ok(None);
        }
        if head.status == 200 {
            let written = http::read_body(&mut reader, &head, sink).map_err(io_diagnostic)?;
            debug!(bytes = written, resource, "file received");
        }
        Ok(Some(FetchReply {
            status: head.status,
            last_modified: head.last_modified(),
        }))
    }
}

impl Session for NetSession {
    fn exchange(
        &mut self,
        resource: &str,
        body: &mut RequestBody,
    ) -> std::result::Result<Vec<u8>, Diagnostic> {
        if let Some(reply) = self.post(resource, body)? {
            return Ok(reply);
        }
        self.switch_to_tls()?;
        self.post(resource, body)?
            .ok_or_else(|| http_diagnostic(UPGRADE_REQUIRED, "Upgrade Required"))
    }

    fn fetch(
        &mut self,
        resource: &str,
        if_modified_since: Option<DateTime<Utc>>,
        sink: &mut dyn Write,
    ) -> std::result::Result<FetchReply, Diagnostic> {
        if let Some(reply) = self.get(resource, if_modified_since, sink)? {
            return Ok(reply);
        }
        self.switch_to_tls()?;
        self.get(resource, if_modified_since, sink)?
            .ok_or_else(|| http_diagnostic(UPGRADE_REQUIRED, "Upgrade Required"))
    }

    fn close(&mut self) {
        let _ = self.stream.flush();
        self.stream.close_stream();
    }
}

fn io_diagnostic(err: io::Error) -> Diagnostic {
    let status = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => StatusCode::CLIENT_ERROR_TIMEOUT,
        io::ErrorKind::InvalidData => StatusCode::SERVER_ERROR_INTERNAL,
        _ => StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE,
    };
    Diagnostic::new(status, err.to_string())
}

fn http_diagnostic(status: u16, reason: &str) -> Diagnostic {
    let ipp = http::ipp_status_for_http(status).unwrap_or(StatusCode::SERVER_ERROR_INTERNAL);
    Diagnostic::new(ipp, format!("HTTP {status} {reason}"))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::thread;

    use super::*;

    fn connector() -> NetConnector {
        NetConnector::new(Duration::from_secs(5)).unwrap()
    }

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    /// Read one request head and its `Content-Length` body.
    fn read_request(socket: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0u8; 512];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let text = String::from_utf8_lossy(&request).into_owned();
        let head_len = text.find("\r\n\r\n").map_or(text.len(), |i| i + 4);
        let content_length = text
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut remaining = (head_len + content_length).saturating_sub(request.len());
        while remaining > 0 {
            let n = socket.read(&mut buf[..remaining.min(512)]).unwrap();
            if n == 0 {
                break;
            }
            remaining -= n;
        }
        text[..head_len].to_string()
    }

    /// Serve one canned reply per connection; returns the port and the
    /// request heads seen.
    fn serve(replies: Vec<&'static [u8]>) -> (u16, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for reply in replies {
                let (mut socket, _) = listener.accept().unwrap();
                seen.push(read_request(&mut socket));
                socket.write_all(reply).unwrap();
            }
            seen
        });
        (port, handle)
    }

    fn post_to(endpoint: &ServerEndpoint) -> std::result::Result<Vec<u8>, Diagnostic> {
        let mut session = connector().connect(endpoint)?;
        let mut body = RequestBody::new(b"\x02\x00".to_vec());
        let reply = session.exchange("/", &mut body);
        session.close();
        reply
    }

    #[test]
    fn refused_port_yields_service_unavailable() {
        // Bind then drop to find a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let endpoint = ServerEndpoint::new("127.0.0.1", port, EncryptionMode::Never);
        let diagnostic = connector().connect(&endpoint).err().unwrap();
        assert_eq!(diagnostic.status, StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE);
    }

    #[test]
    fn required_mode_sends_upgrade_and_fails_without_101() {
        let (port, server) = serve(vec![b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n"]);

        let endpoint = ServerEndpoint::new("127.0.0.1", port, EncryptionMode::Required);
        let diagnostic = connector().connect(&endpoint).err().unwrap();
        assert!(diagnostic.message.contains("refused TLS upgrade"));

        let seen = server.join().unwrap();
        assert!(seen[0].starts_with("OPTIONS * HTTP/1.1\r\n"));
        assert!(seen[0].contains("Upgrade: TLS/1.2"));
    }

    #[test]
    fn if_requested_mode_answers_426_with_an_upgrade() {
        let (port, server) = serve(vec![
            b"HTTP/1.1 426 Upgrade Required\r\nUpgrade: TLS/1.2\r\nContent-Length: 0\r\n\r\n",
            b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ]);

        let endpoint = ServerEndpoint::new("127.0.0.1", port, EncryptionMode::IfRequested);
        let diagnostic = post_to(&endpoint).unwrap_err();
        assert!(diagnostic.message.contains("refused TLS upgrade"));

        let seen = server.join().unwrap();
        assert!(seen[0].starts_with("POST / HTTP/1.1\r\n"));
        assert!(seen[1].starts_with("OPTIONS * HTTP/1.1\r\n"));
    }

    #[test]
    fn never_mode_reports_426_without_reconnecting() {
        let (port, server) = serve(vec![
            b"HTTP/1.1 426 Upgrade Required\r\nUpgrade: TLS/1.2\r\nContent-Length: 0\r\n\r\n",
        ]);

        let endpoint = ServerEndpoint::new("127.0.0.1", port, EncryptionMode::Never);
        let diagnostic = post_to(&endpoint).unwrap_err();
        assert_eq!(diagnostic.message, "HTTP 426 Upgrade Required");
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn oversized_reply_is_refused() {
        let (port, server) = serve(vec![
            b"HTTP/1.1 200 OK\r\nContent-Type: application/ipp\r\n\
              Content-Length: 999999999\r\n\r\n",
        ]);

        let endpoint = ServerEndpoint::new("127.0.0.1", port, EncryptionMode::Never);
        let diagnostic = post_to(&endpoint).unwrap_err();
        assert_eq!(diagnostic.status, StatusCode::SERVER_ERROR_INTERNAL);
        assert!(diagnostic.message.contains("exceeds"));
        server.join().unwrap();
    }

    #[test]
    fn ca_file_certificates_are_loaded() {
        let mut roots = RootCertStore::empty();
        assert_eq!(add_ca_file(&mut roots, &fixture("ca.pem")).unwrap(), 1);
        assert_eq!(roots.len(), 1);
        let ca = fixture("ca.pem");
        assert!(NetConnector::with_ca_file(Duration::from_secs(5), Some(&ca)).is_ok());
    }

    #[test]
    fn ca_file_without_certificates_is_a_tls_error() {
        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            NetConnector::with_ca_file(Duration::from_secs(5), Some(empty.path())),
            Err(SpoolgateError::Tls(_))
        ));
        assert!(matches!(
            NetConnector::with_ca_file(
                Duration::from_secs(5),
                Some(Path::new("/nonexistent/spoolgate/ca.pem"))
            ),
            Err(SpoolgateError::Tls(_))
        ));
    }

    #[test]
    fn non_200_ipp_reply_maps_http_status() {
        let diagnostic = http_diagnostic(401, "Unauthorized");
        assert_eq!(diagnostic.status, StatusCode::CLIENT_ERROR_NOT_AUTHENTICATED);
        assert_eq!(diagnostic.message, "HTTP 401 Unauthorized");
    }
}
