//! Request boundary
//!
//! The streaming core only needs a handful of things from a request: method,
//! path, one or two headers and a credential check. [`Request`] is that
//! contract; [`HttpRequest`] is a minimal head parser implementing it for the
//! built-in server.
//!
//! Headers are only retrievable once declared interesting (or when they are
//! always retained, like `Authorization`). Routing declares what it needs
//! while deciding whether it handles a request.

use std::net::SocketAddr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{RequestError, Result};

/// Headers retrievable without being declared interesting
const ALWAYS_RETAINED: &[&str] = &["Authorization", "Host"];

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    /// Parse a method token (case-sensitive, as on the wire)
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "PATCH" => Some(Method::Patch),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }

    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the streaming core needs from a parsed request
pub trait Request {
    /// Request method
    fn method(&self) -> Method;

    /// Path without query string
    fn url(&self) -> &str;

    /// HTTP minor version (0 or 1)
    fn version(&self) -> u8;

    /// Header value by case-insensitive name, if retained
    fn header(&self, name: &str) -> Option<&str>;

    /// Ask for `name` to be retained for this request
    fn add_interesting_header(&mut self, name: &str);

    /// Check the request's credentials
    fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// Parsed request head
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: String,
    query: Option<String>,
    version: u8,
    headers: Vec<(String, String)>,
    interesting: Vec<String>,
    peer_addr: Option<SocketAddr>,
}

impl HttpRequest {
    /// Parse a request head (request line plus header lines)
    pub fn parse(head: &[u8]) -> std::result::Result<Self, RequestError> {
        let text = std::str::from_utf8(head).map_err(|_| RequestError::InvalidEncoding)?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(RequestError::BadRequestLine(request_line.to_owned()));
        };

        let method = Method::parse(method)
            .ok_or_else(|| RequestError::UnsupportedMethod(method.to_owned()))?;

        let version = match version {
            "HTTP/1.0" => 0,
            "HTTP/1.1" => 1,
            _ => return Err(RequestError::BadRequestLine(request_line.to_owned())),
        };

        if !target.starts_with('/') {
            return Err(RequestError::BadRequestLine(request_line.to_owned()));
        }
        let (url, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };

        let mut headers = Vec::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RequestError::BadHeader(line.to_owned()))?;
            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }

        Ok(Self {
            method,
            url,
            query,
            version,
            headers,
            interesting: Vec::new(),
            peer_addr: None,
        })
    }

    /// Attach the remote address
    pub fn with_peer(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Remote address, when known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Raw query string
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn is_retained(&self, name: &str) -> bool {
        ALWAYS_RETAINED
            .iter()
            .copied()
            .chain(self.interesting.iter().map(String::as_str))
            .any(|retained| retained.eq_ignore_ascii_case(name))
    }
}

impl Request for HttpRequest {
    fn method(&self) -> Method {
        self.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn header(&self, name: &str) -> Option<&str> {
        if !self.is_retained(name) {
            return None;
        }
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn add_interesting_header(&mut self, name: &str) {
        if !self.is_retained(name) {
            self.interesting.push(name.to_owned());
        }
    }

    fn authenticate(&self, username: &str, password: &str) -> bool {
        let Some(value) = self.header("Authorization") else {
            return false;
        };
        let Some((scheme, encoded)) = value.split_once(' ') else {
            return false;
        };
        if !scheme.eq_ignore_ascii_case("Basic") {
            return false;
        }

        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        match std::str::from_utf8(&decoded).ok().and_then(|s| s.split_once(':')) {
            Some((user, pass)) => user == username && pass == password,
            None => false,
        }
    }
}

/// Read from `reader` until a complete request head has arrived
///
/// Returns the head including its terminating blank line. Bytes after the
/// head (a request body) are discarded.
pub async fn read_request_head<R>(reader: &mut R, max_len: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024.min(max_len));
    let mut scanned: usize = 0;

    loop {
        // Resume the search a few bytes back in case the terminator straddles reads
        let from = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(pos) = buf[from..]
            .windows(HEAD_TERMINATOR.len())
            .position(|window| window == HEAD_TERMINATOR)
        {
            let end = from + pos + HEAD_TERMINATOR.len();
            return Ok(buf.split_to(end).freeze());
        }
        scanned = buf.len();

        if buf.len() >= max_len {
            return Err(RequestError::HeadTooLarge(max_len).into());
        }

        if reader.read_buf(&mut buf).await? == 0 {
            return Err(RequestError::Incomplete.into());
        }
    }
}
