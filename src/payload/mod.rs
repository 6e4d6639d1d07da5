//! Wire codec for captured traffic.
//!
//! # Data Flow
//! ```text
//! raw capture bytes
//!     → is_request_payload (kind filter at the intake gate)
//!     → meta (kind, correlation id, timestamp)
//!     → body → is_http_request (shape check before dispatch)
//!
//! replayed response
//!     → header(ReplayedResponse, id, start, rtt) + raw response
//! ```

pub mod codec;

pub use codec::{
    body, decode_chunked, header, is_http_request, is_request_payload, meta, response_status,
    split_capture, PayloadKind, PAYLOAD_SEPARATOR,
};
