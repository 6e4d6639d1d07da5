//! Single writer for completed-request results.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::output::records::ResultRecord;
use crate::sink::ResultSink;

/// Drains the result queue into every attached sink, one row at a time.
pub struct ResultSerializer {
    sinks: Vec<Box<dyn ResultSink>>,
    records: mpsc::Receiver<ResultRecord>,
}

impl ResultSerializer {
    pub fn new(sinks: Vec<Box<dyn ResultSink>>, records: mpsc::Receiver<ResultRecord>) -> Self {
        Self { sinks, records }
    }

    /// Run on a dedicated blocking thread. The handle resolves to the number
    /// of rows written once every producer has gone away.
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::task::spawn_blocking(move || self.run())
    }

    fn run(mut self) -> u64 {
        tracing::debug!(sinks = self.sinks.len(), "Result serializer started");
        let mut written = 0u64;

        while let Some(record) = self.records.blocking_recv() {
            let row = record.to_row();
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.write_row(&row).and_then(|_| sink.flush()) {
                    tracing::warn!(error = %e, "Failed to write result row");
                }
            }
            written += 1;
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.flush() {
                tracing::warn!(error = %e, "Failed to flush result sink");
            }
        }
        tracing::debug!(rows = written, "Result serializer stopped");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{SinkError, TsvSink};
    use chrono::Local;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Write target shared with the test body.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl ResultSink for Broken {
        fn write_row(&mut self, _row: &[String]) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn record(status: u16) -> ResultRecord {
        ResultRecord {
            status: Some(status),
            started_at: Local::now(),
            duration: Duration::from_micros(status as u64),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_never_interleave() {
        let buf = SharedBuf::default();
        let sink = TsvSink::from_writer(buf.clone()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        let handle = ResultSerializer::new(vec![Box::new(sink)], rx).spawn();

        let mut producers = Vec::new();
        for p in 0..8u16 {
            let tx = tx.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..50u16 {
                    tx.send(record(100 + p * 50 + i)).await.unwrap();
                }
            }));
        }
        drop(tx);
        for p in producers {
            p.await.unwrap();
        }

        assert_eq!(handle.await.unwrap(), 400);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 401);
        assert!(lines[1..].iter().all(|l| l.split('\t').count() == 4));
    }

    #[tokio::test]
    async fn failing_sink_does_not_stop_others() {
        let buf = SharedBuf::default();
        let good = TsvSink::from_writer(buf.clone()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        let handle = ResultSerializer::new(vec![Box::new(Broken), Box::new(good)], rx).spawn();

        tx.send(record(200)).await.unwrap();
        tx.send(record(503)).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("\n503\t"));
    }
}
