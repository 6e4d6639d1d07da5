//! Captured payload encoding.
//!
//! A payload is one metadata line followed by the raw HTTP message:
//!
//! ```text
//! 1 8e1b0f3c2a 1700000000000000000\n
//! GET /index.html HTTP/1.1\r\n
//! Host: example.com\r\n
//! \r\n
//! ```

use bytes::Bytes;

/// Separator between payloads in a capture file.
pub const PAYLOAD_SEPARATOR: &str = "\n🐵🙈🙉\n";

const HTTP_METHODS: [&[u8]; 9] = [
    b"GET", b"POST", b"PUT", b"DELETE", b"PATCH", b"HEAD", b"OPTIONS", b"CONNECT", b"TRACE",
];

/// Kind tag carried as the first metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Request,
    Response,
    ReplayedResponse,
}

impl PayloadKind {
    /// The tag byte written on the wire.
    pub fn tag(self) -> u8 {
        match self {
            PayloadKind::Request => b'1',
            PayloadKind::Response => b'2',
            PayloadKind::ReplayedResponse => b'3',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'1' => Some(PayloadKind::Request),
            b'2' => Some(PayloadKind::Response),
            b'3' => Some(PayloadKind::ReplayedResponse),
            _ => None,
        }
    }
}

fn header_len(payload: &[u8]) -> Option<usize> {
    payload.iter().position(|&b| b == b'\n')
}

/// Split the metadata line into its space separated fields.
pub fn meta(payload: &[u8]) -> Vec<&[u8]> {
    let line = match header_len(payload) {
        Some(end) => &payload[..end],
        None => &[][..],
    };
    line.split(|&b| b == b' ').collect()
}

/// Everything after the metadata line.
pub fn body(payload: &[u8]) -> &[u8] {
    match header_len(payload) {
        Some(end) => &payload[end + 1..],
        None => payload,
    }
}

/// True when the payload carries a captured request.
pub fn is_request_payload(payload: &[u8]) -> bool {
    payload.first().copied().and_then(PayloadKind::from_tag) == Some(PayloadKind::Request)
}

/// True when the body starts with an HTTP request line.
pub fn is_http_request(body: &[u8]) -> bool {
    HTTP_METHODS.iter().any(|method| {
        body.len() > method.len() && body.starts_with(method) && body[method.len()] == b' '
    })
}

/// Build the metadata line that precedes a payload body.
pub fn header(kind: PayloadKind, id: &[u8], timing: i64, latency: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(id.len() + 48);
    out.push(kind.tag());
    out.push(b' ');
    out.extend_from_slice(id);
    out.extend_from_slice(format!(" {} {}\n", timing, latency).as_bytes());
    out
}

/// Status code from a raw `HTTP/x.y NNN ...` response.
pub fn response_status(response: &[u8]) -> Option<u16> {
    if response.len() < 12 || !response.starts_with(b"HTTP/") {
        return None;
    }
    std::str::from_utf8(&response[9..12]).ok()?.parse().ok()
}

/// Split a capture file into its payloads, skipping empty fragments.
pub fn split_capture(capture: &[u8]) -> Vec<Bytes> {
    let separator = PAYLOAD_SEPARATOR.as_bytes();
    let mut payloads = Vec::new();
    let mut rest = capture;

    while let Some(at) = find(rest, separator) {
        if at > 0 {
            payloads.push(Bytes::copy_from_slice(&rest[..at]));
        }
        rest = &rest[at + separator.len()..];
    }
    if !rest.is_empty() && rest != &b"\n"[..] {
        payloads.push(Bytes::copy_from_slice(rest));
    }
    payloads
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a `Transfer-Encoding: chunked` body. Returns `None` when the
/// framing is broken.
pub fn decode_chunked(mut body: &[u8]) -> Option<Bytes> {
    let mut out = Vec::with_capacity(body.len());
    loop {
        let line_end = find(body, b"\r\n")?;
        let size_field = std::str::from_utf8(&body[..line_end]).ok()?;
        // Chunk extensions follow a ';'.
        let size_hex = size_field.split(';').next()?.trim();
        let size = usize::from_str_radix(size_hex, 16).ok()?;
        body = &body[line_end + 2..];

        if size == 0 {
            return Some(Bytes::from(out));
        }
        let chunk_end = size.checked_add(2)?;
        if body.len() < chunk_end {
            return None;
        }
        out.extend_from_slice(&body[..size]);
        body = &body[chunk_end..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &[u8] = b"1 abc123 1700000000\nGET /ping HTTP/1.1\r\nHost: a\r\n\r\n";

    #[test]
    fn splits_meta_and_body() {
        let fields = meta(REQUEST);
        assert_eq!(fields, vec![&b"1"[..], &b"abc123"[..], &b"1700000000"[..]]);
        assert!(body(REQUEST).starts_with(b"GET /ping"));
    }

    #[test]
    fn missing_newline_yields_short_meta() {
        assert_eq!(meta(b"1 abc123").len(), 1);
        assert_eq!(body(b"no header"), &b"no header"[..]);
    }

    #[test]
    fn request_filter() {
        assert!(is_request_payload(REQUEST));
        assert!(!is_request_payload(b"2 abc123 1\nHTTP/1.1 200 OK\r\n\r\n"));
        assert!(!is_request_payload(b""));
    }

    #[test]
    fn http_shape() {
        assert!(is_http_request(b"POST /x HTTP/1.1\r\n"));
        assert!(is_http_request(b"DELETE /x HTTP/1.1\r\n"));
        assert!(!is_http_request(b"GETX / HTTP/1.1\r\n"));
        assert!(!is_http_request(b"HTTP/1.1 200 OK\r\n"));
        assert!(!is_http_request(b"GET"));
    }

    #[test]
    fn header_layout() {
        let h = header(PayloadKind::ReplayedResponse, b"abc123", 42, 7);
        assert_eq!(h, b"3 abc123 42 7\n".to_vec());
        assert_eq!(PayloadKind::from_tag(h[0]), Some(PayloadKind::ReplayedResponse));
    }

    #[test]
    fn status_extraction() {
        assert_eq!(response_status(b"HTTP/1.1 404 Not Found\r\n\r\n"), Some(404));
        assert_eq!(response_status(b"HTTP/1.1 20"), None);
        assert_eq!(response_status(b""), None);
        assert_eq!(response_status(b"garbage garbage"), None);
    }

    #[test]
    fn capture_file_split() {
        let capture = format!(
            "1 a 1\nGET / HTTP/1.1\r\n\r\n{sep}1 b 2\nGET /b HTTP/1.1\r\n\r\n{sep}",
            sep = PAYLOAD_SEPARATOR
        );
        let payloads = split_capture(capture.as_bytes());
        assert_eq!(payloads.len(), 2);
        assert_eq!(meta(&payloads[1])[1], &b"b"[..]);
    }

    #[test]
    fn chunked_bodies() {
        let decoded = decode_chunked(b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n").unwrap();
        assert_eq!(&decoded[..], b"Wikipedia");
        assert!(decode_chunked(b"ff\r\nshort\r\n").is_none());
    }

    #[test]
    fn oversized_chunk_length_is_rejected() {
        assert!(decode_chunked(b"ffffffffffffffff\r\nab\r\n0\r\n\r\n").is_none());
        assert!(decode_chunked(b"fffffffffffffffe\r\nab\r\n0\r\n\r\n").is_none());
    }
}
