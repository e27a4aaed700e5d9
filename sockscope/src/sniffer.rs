//! HTTP/1.x prefix classification. Only the first line and a few headers
//! are ever looked at, bodies are never parsed.

use sockscope_common::{consts::MIN_HTTP_SIZE, http::PacketType, trace::TpInfo};

const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

const TRACEPARENT: &[u8] = b"traceparent:";

/// Classifies a buffer from its first bytes
pub fn classify(buf: &[u8]) -> PacketType {
    if buf.len() < MIN_HTTP_SIZE {
        return PacketType::Unknown;
    }

    if buf.starts_with(b"HTTP/1.") {
        return PacketType::Response;
    }

    if method(buf).is_some() {
        return PacketType::Request;
    }

    PacketType::Unknown
}

/// Method of a request line, it must be followed by a space
pub fn method(buf: &[u8]) -> Option<&'static str> {
    METHODS.into_iter().find(|m| {
        buf.starts_with(m.as_bytes()) && buf.get(m.len()) == Some(&b' ')
    })
}

/// Target of a request line, possibly truncated by the capture
pub fn path(buf: &[u8]) -> Option<String> {
    let m = method(buf)?;
    let rest = &buf[m.len() + 1..];
    let end = rest
        .iter()
        .position(|&b| b == b' ' || b == b'\r' || b == b'\n')
        .unwrap_or(rest.len());
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Status code of a response line
pub fn status(buf: &[u8]) -> Option<u16> {
    if !buf.starts_with(b"HTTP/1.") {
        return None;
    }
    // HTTP/1.x SSS
    let code = buf.get(9..12)?;
    std::str::from_utf8(code).ok()?.parse().ok()
}

/// W3C trace context carried by a `traceparent` request header. The
/// parent span of the returned context is the span id of the header.
pub fn traceparent(buf: &[u8]) -> Option<TpInfo> {
    let start = buf
        .windows(TRACEPARENT.len())
        .position(|w| w.eq_ignore_ascii_case(TRACEPARENT))?
        + TRACEPARENT.len();

    let value = buf[start..]
        .split(|&b| b == b'\r' || b == b'\n')
        .next()?;
    let value = std::str::from_utf8(value).ok()?.trim();

    // 00-<trace id>-<parent id>-<flags>
    let mut parts = value.split('-');
    let (_version, trace_id, parent_id, flags) =
        (parts.next()?, parts.next()?, parts.next()?, parts.next()?);

    let mut tp = TpInfo::default();
    hex::decode_to_slice(trace_id, &mut tp.trace_id).ok()?;
    hex::decode_to_slice(parent_id, &mut tp.parent_id).ok()?;
    tp.flags = u8::from_str_radix(flags, 16).ok()?;
    Some(tp)
}
