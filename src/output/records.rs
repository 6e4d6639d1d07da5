//! Records produced by senders.

use bytes::Bytes;
use chrono::{DateTime, Local};
use std::time::Duration;

use crate::payload::{self, PayloadKind};

/// Column header of the result log.
pub const RESULT_HEADER: [&str; 4] = ["STATUS", "START_TIME", "DURATION", "UNIX_TS"];

/// Summary row written for every dispatch attempt, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Status code of the final response, `None` when nothing came back.
    pub status: Option<u16>,
    pub started_at: DateTime<Local>,
    pub duration: Duration,
}

impl ResultRecord {
    /// Encode as `[STATUS, START_TIME, DURATION(µs), UNIX_TS(ns)]`.
    pub fn to_row(&self) -> [String; 4] {
        let status = match self.status {
            Some(code) => format!("{:03}", code),
            None => "000".to_string(),
        };
        [
            status,
            self.started_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            self.duration.as_micros().to_string(),
            self.started_at
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string(),
        ]
    }
}

/// A replayed response correlated to the captured request that caused it.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub id: Bytes,
    pub payload: Bytes,
    pub round_trip: Duration,
    /// Start of the exchange, unix nanoseconds.
    pub started_at: i64,
}

impl ResponseRecord {
    /// Metadata line framing this response for downstream consumers.
    pub fn header(&self) -> Vec<u8> {
        payload::header(
            PayloadKind::ReplayedResponse,
            &self.id,
            self.started_at,
            self.round_trip.as_nanos() as i64,
        )
    }

    /// Header followed by the raw response.
    pub fn frame(&self) -> Vec<u8> {
        let mut out = self.header();
        out.extend_from_slice(&self.payload);
        out
    }
}
