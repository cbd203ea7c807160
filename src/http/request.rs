//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::net::SocketAddr;

use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request plus the addressing facts the server knows about it.
///
/// The peer address is what the panel's allow-list is checked against, so a
/// request that never had one attached (e.g. built by hand in a test) is
/// treated as coming from an unknown client.
///
/// # Examples
///
/// ```
/// use debug_panel::http::Request;
/// use debug_panel::http::request::join_origin;
///
/// let raw = b"GET /page?tab=sql HTTP/1.1\r\nHost: example.com:8000\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
/// let request = request.with_remote_addr("127.0.0.1:50000".parse().unwrap());
///
/// assert_eq!(request.path(), "/page");
/// assert_eq!(request.query_string(), Some("tab=sql"));
/// assert_eq!(request.remote_ip().map(|ip| ip.to_string()), Some("127.0.0.1".into()));
/// assert_eq!(
///     join_origin(&request.origin(), "/__debug__/data/1.5"),
///     "http://example.com:8000/__debug__/data/1.5"
/// );
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the request and the offset at which its body begins in `buf`.
    /// The body itself is left in `buf`; the caller frames it with
    /// [`content_length`](Self::content_length).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] when the header block is not complete yet.
    /// - [`RequestError::Parse`] when the data is malformed.
    /// - [`RequestError::MissingField`] when method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>()
        {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.append(header.name, value);
            }
        }


        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                remote_addr: None,
                local_addr: None,
            },
            body_offset,
        ))
    }

    /// Attaches the address of the client that sent this request.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Attaches the server-side address the request arrived on.
    #[must_use]
    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string, without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The originating IP address, if the server recorded one.
    pub fn remote_ip(&self) -> Option<std::net::IpAddr> {
        self.remote_addr.map(|addr| addr.ip())
    }

    /// Returns the local socket address the request arrived on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The authority clients used to reach us.
    ///
    /// Prefers the `Host` header, then the local socket address, and finally
    /// `localhost`.
    pub fn host(&self) -> String {
        if let Some(host) = self.headers.get("host").map(str::trim).filter(|h| !h.is_empty()) {
            return host.to_owned();
        }
        match self.local_addr {
            Some(addr) => addr.to_string(),
            None => "localhost".to_owned(),
        }
    }

    /// Scheme and authority, e.g. `http://example.com:8000`.
    pub fn origin(&self) -> String {
        format!("http://{}", self.host())
    }

    /// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close, unless a
    /// `Connection` header says otherwise.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the parsed `Content-Length`, if present and valid.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

/// Joins an origin such as `http://host:port` with a path.
pub fn join_origin(origin: &str, path: &str) -> String {
    format!("{}/{}", origin.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version, 1);
        assert_eq!(offset, raw.len());
        assert!(req.remote_ip().is_none());
    }

    #[test]
    fn query_is_split_off_the_path() {
        let raw = b"GET /search?q=rust+lang&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust+lang&page=2"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn absolute_uri_uses_host_header() {
        let raw = b"GET / HTTP/1.1\r\nHost: app.test:8080\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(
            join_origin(&req.origin(), "/__debug__/data/1.25"),
            "http://app.test:8080/__debug__/data/1.25"
        );
    }

    #[test]
    fn absolute_uri_falls_back_to_local_addr() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let req = req.with_local_addr("10.0.0.5:9000".parse().unwrap());
        assert_eq!(join_origin(&req.origin(), "x"), "http://10.0.0.5:9000/x");
    }

    #[test]
    fn absolute_uri_last_resort_is_localhost() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(join_origin(&req.origin(), "/a"), "http://localhost/a");
    }

    #[test]
    fn remote_ip_comes_from_attached_peer() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let req = req.with_remote_addr("192.168.1.9:4242".parse().unwrap());
        assert_eq!(req.remote_ip(), Some("192.168.1.9".parse().unwrap()));
    }

    #[test]
    fn keep_alive_rules() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());
        let (req, _) =
            Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }
}
