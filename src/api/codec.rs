//! Request-line parsing and response framing.
//!
//! ```text
//! GET /fan/set?value=40 HTTP/1.1\r\n      request line
//! Host: 10.0.0.5\r\n                      headers (skipped)
//! \r\n                                    separator
//!
//! HTTP/1.0 200 OK\r\n                     status line
//! Content-Type: application/json\r\n      one header
//! \r\n
//! {"parameters":{..},"response":{..},"status":200}   body, 128-byte chunks
//! ```

use core::fmt;

/// Bytes written per body chunk.
pub const CHUNK_SIZE: usize = 128;

/// Longest request line accepted.
pub const MAX_REQUEST_LINE: usize = 1024;

/// Headers are read and discarded; at most this many are accepted.
pub const MAX_HEADERS: usize = 32;

/// A parsed request line.  The method and protocol are kept for logging
/// only; routing looks at the path and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
    /// Decoded `key=value` pairs in request order.  Values stay strings.
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The line is not `METHOD TARGET PROTO`.
    Malformed,
    /// The line exceeds [`MAX_REQUEST_LINE`].
    TooLong,
    /// A header line exceeds [`MAX_REQUEST_LINE`], or there are more than
    /// [`MAX_HEADERS`] of them.
    HeadersTooLarge,
    /// A `%xx` escape is truncated or not valid UTF-8 once decoded.
    BadEscape,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed request line"),
            Self::TooLong => write!(f, "request line too long"),
            Self::HeadersTooLarge => write!(f, "request headers too large"),
            Self::BadEscape => write!(f, "invalid percent escape"),
        }
    }
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() > MAX_REQUEST_LINE {
            return Err(RequestError::TooLong);
        }
        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(proto), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(RequestError::Malformed);
        };
        if method.is_empty() || !proto.starts_with("HTTP/") {
            return Err(RequestError::Malformed);
        }

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Ok(Self {
            method: method.to_owned(),
            path: percent_decode(path)?,
            query: parse_query(query)?,
        })
    }
}

/// Split `a=1&b=two` into decoded pairs.  A key without `=` maps to an
/// empty value; empty segments are skipped.
pub fn parse_query(query: &str) -> Result<Vec<(String, String)>, RequestError> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (k, v) = segment.split_once('=').unwrap_or((segment, ""));
            Ok((percent_decode(k)?, percent_decode(v)?))
        })
        .collect()
}

/// Decode `%xx` escapes and `+` as a space.
pub fn percent_decode(text: &str) -> Result<String, RequestError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).ok_or(RequestError::BadEscape)?;
                let hi = hex_value(hex[0]).ok_or(RequestError::BadEscape)?;
                let lo = hex_value(hex[1]).ok_or(RequestError::BadEscape)?;
                out.push((hi << 4) | lo);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| RequestError::BadEscape)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Response status codes the router produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::InternalError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "BAD REQUEST",
            Self::NotFound => "PAGE NOT FOUND",
            Self::InternalError => "INTERNAL SERVER ERROR",
        }
    }
}

/// Content types a response can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Json,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Json => "application/json",
        }
    }
}

/// Status line, the content-type header and the blank separator.
pub fn response_head(status: Status, content_type: ContentType) -> String {
    format!(
        "HTTP/1.0 {} {}\r\nContent-Type: {}\r\n\r\n",
        status.code(),
        status.reason(),
        content_type.as_str()
    )
}

/// Escape text for an HTML fragment.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
