//! HTTP form codec for location and emergency reports
//!
//! Every report travels as a one-shot HTTP/1.1 POST:
//! ```text
//! POST <path> HTTP/1.1\r\n
//! Host: <host>\r\n
//! Content-Type: application/x-www-form-urlencoded\r\n
//! Content-Length: <body bytes>\r\n
//! Connection: close\r\n
//! \r\n
//! device_id=<id>&user_id=<id>[&lat=<±d.dddddd>&lng=<±d.dddddd>]
//! ```
//!
//! Identifiers are written verbatim, not percent-encoded.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{DeviceIdentity, Fix, NetworkEndpoint};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Maximum request size (16 KB) accepted by the decoder
pub const MAX_REQUEST_SIZE: usize = 16 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors that can occur while decoding a report request
#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("Request too large: {0} bytes (max: {MAX_REQUEST_SIZE})")]
    RequestTooLarge(usize),

    #[error("Request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("Malformed header: {0:?}")]
    MalformedHeader(String),

    #[error("Missing or invalid Content-Length")]
    InvalidContentLength,

    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Invalid coordinate {field}: {value:?}")]
    InvalidCoordinate { field: &'static str, value: String },
}

/// Form body of a routine location report
pub fn routine_body(identity: &DeviceIdentity, fix: &Fix) -> String {
    format!(
        "device_id={}&user_id={}&lat={:.6}&lng={:.6}",
        identity.device_id, identity.user_id, fix.latitude, fix.longitude
    )
}

/// Form body of an emergency alert. Identity only, coordinates are never sent.
pub fn emergency_body(identity: &DeviceIdentity) -> String {
    format!(
        "device_id={}&user_id={}",
        identity.device_id, identity.user_id
    )
}

/// Wrap a form body into a complete POST request
pub fn encode_post(host_header: &str, path: &str, body: &str) -> Bytes {
    let head = format!(
        "POST {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Content-Type: {FORM_CONTENT_TYPE}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );

    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(body.as_bytes());
    buf.freeze()
}

/// A fully encoded report, ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedReport {
    pub path: String,
    pub body: String,
    pub request: Bytes,
}

/// Builds report requests for one device and endpoint
#[derive(Debug, Clone)]
pub struct ReportEncoder {
    identity: DeviceIdentity,
    endpoint: NetworkEndpoint,
}

impl ReportEncoder {
    pub fn new(identity: DeviceIdentity, endpoint: NetworkEndpoint) -> Self {
        Self { identity, endpoint }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn endpoint(&self) -> &NetworkEndpoint {
        &self.endpoint
    }

    /// Encode a routine location report
    pub fn encode_routine(&self, fix: &Fix) -> EncodedReport {
        self.encode(&self.endpoint.routine_path, routine_body(&self.identity, fix))
    }

    /// Encode an emergency alert
    pub fn encode_emergency(&self) -> EncodedReport {
        self.encode(&self.endpoint.emergency_path, emergency_body(&self.identity))
    }

    fn encode(&self, path: &str, body: String) -> EncodedReport {
        let request = encode_post(&self.endpoint.host_header(), path, &body);
        EncodedReport {
            path: path.to_string(),
            body,
            request,
        }
    }
}

/// A decoded HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct PostRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl PostRequest {
    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_str(&self) -> Result<&str, CodecError> {
        std::str::from_utf8(&self.body).map_err(|_| CodecError::InvalidEncoding)
    }
}

struct RequestHead {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    content_length: usize,
}

fn parse_head(head: &[u8]) -> Result<RequestHead, CodecError> {
    let text = std::str::from_utf8(head).map_err(|_| CodecError::InvalidEncoding)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None) => (method, path, version),
        _ => return Err(CodecError::MalformedRequestLine(request_line.to_string())),
    };
    if !version.starts_with("HTTP/") {
        return Err(CodecError::MalformedRequestLine(request_line.to_string()));
    }

    let mut headers = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader(line.to_string()))?;
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    let content_length = match headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
    {
        Some((_, value)) => value
            .parse::<usize>()
            .map_err(|_| CodecError::InvalidContentLength)?,
        None => 0,
    };

    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        headers,
        content_length,
    })
}

/// Try to decode one complete request from a buffer
///
/// Returns:
/// - `Ok(Some(request))` if a complete request was decoded and consumed
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<PostRequest>, CodecError> {
    let head_end = match buf
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
    {
        Some(pos) => pos,
        None if buf.len() > MAX_REQUEST_SIZE => {
            return Err(CodecError::RequestTooLarge(buf.len()));
        }
        None => return Ok(None),
    };

    let head = parse_head(&buf[..head_end])?;
    let head_len = head_end + HEAD_TERMINATOR.len();
    if head.content_length > MAX_REQUEST_SIZE {
        return Err(CodecError::RequestTooLarge(head.content_length));
    }
    let total_len = head_len + head.content_length;

    if total_len > MAX_REQUEST_SIZE {
        return Err(CodecError::RequestTooLarge(total_len));
    }
    if buf.len() < total_len {
        return Ok(None);
    }

    let _ = buf.split_to(head_len);
    let body = buf.split_to(head.content_length).freeze();

    Ok(Some(PostRequest {
        method: head.method,
        path: head.path,
        headers: head.headers,
        body,
    }))
}

/// Streaming decoder for requests arriving in arbitrary chunks
#[derive(Debug, Default)]
pub struct RequestDecoder {
    buffer: BytesMut,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Call repeatedly until it returns `Ok(None)` to drain all complete requests
    pub fn decode_next(&mut self) -> Result<Option<PostRequest>, CodecError> {
        decode(&mut self.buffer)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// A report as seen by the receiving side
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Location { identity: DeviceIdentity, fix: Fix },
    Emergency { identity: DeviceIdentity },
}

impl Report {
    /// Parse a form body. A body without coordinates is an emergency alert.
    pub fn from_form(body: &str) -> Result<Self, CodecError> {
        let fields: Vec<(&str, &str)> = body
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .collect();

        let field = |name: &'static str| {
            fields
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
        };
        let required = |name: &'static str| field(name).ok_or(CodecError::MissingField(name));

        let identity = DeviceIdentity::new(required("device_id")?, required("user_id")?);

        if field("lat").is_none() && field("lng").is_none() {
            return Ok(Report::Emergency { identity });
        }

        let coordinate = |name: &'static str| -> Result<f64, CodecError> {
            let value = required(name)?;
            value.parse::<f64>().map_err(|_| CodecError::InvalidCoordinate {
                field: name,
                value: value.to_string(),
            })
        };

        Ok(Report::Location {
            identity,
            fix: Fix::new(coordinate("lat")?, coordinate("lng")?),
        })
    }

    pub fn from_request(request: &PostRequest) -> Result<Self, CodecError> {
        Self::from_form(request.body_str()?)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            Report::Location { identity, .. } | Report::Emergency { identity } => identity,
        }
    }
}
