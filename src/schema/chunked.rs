//! Background readers feeding rows through a bounded queue
//!
//! File sources parse on a worker thread and hand rows over in chunks.
//! The queue holds at most `queue_depth` chunks, so a slow consumer
//! throttles the reader. Both sides watch the query's cancellation token.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, ErrorCode, Result};
use crate::schema::{CancellationToken, NamedRow, RowResolver, RowSource, SourceContext};
use crate::types::Value;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

type Chunk = Vec<Vec<Value>>;

// ============================================================================
// Producer Side
// ============================================================================

/// Handle the reader thread pushes rows into
pub struct ChunkSink {
    tx: SyncSender<Result<Chunk>>,
    chunk: Chunk,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl ChunkSink {
    /// Queue one row. Returns false once the reader should stop, either
    /// because the query was cancelled or the consumer went away.
    pub fn push(&mut self, values: Vec<Value>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.chunk.push(values);
        if self.chunk.len() >= self.chunk_size {
            return self.flush();
        }
        true
    }

    fn flush(&mut self) -> bool {
        if self.chunk.is_empty() {
            return true;
        }
        let chunk = std::mem::replace(&mut self.chunk, Vec::with_capacity(self.chunk_size));
        self.tx.send(Ok(chunk)).is_ok()
    }

    fn fail(self, err: Error) {
        // receiver may already be gone; nothing left to report to
        let _ = self.tx.send(Err(err));
    }
}

/// Run `produce` on a worker thread and expose its rows as a [`RowSource`]
pub fn spawn_reader<F>(
    label: &str,
    ordinals: Arc<HashMap<String, usize>>,
    ctx: &SourceContext,
    produce: F,
) -> Result<RowSource>
where
    F: FnOnce(&mut ChunkSink) -> Result<()> + Send + 'static,
{
    let (tx, rx) = sync_channel(ctx.queue_depth.max(1));
    let mut sink = ChunkSink {
        tx,
        chunk: Vec::with_capacity(ctx.chunk_size.max(1)),
        chunk_size: ctx.chunk_size.max(1),
        cancel: ctx.cancel.clone(),
    };

    let thread_label = label.to_string();
    thread::Builder::new()
        .name(format!("tabql-{}", label))
        .spawn(move || match produce(&mut sink) {
            Ok(()) => {
                sink.flush();
                tracing::debug!(target: "tabql::source", "{}: reader finished", thread_label);
            }
            Err(err) => {
                tracing::debug!(target: "tabql::source", "{}: reader failed: {}", thread_label, err);
                sink.fail(err);
            }
        })
        .map_err(|e| {
            Error::with_message(ErrorCode::Source, format!("cannot start reader: {}", e))
        })?;

    Ok(Box::new(ChunkedRows {
        rx,
        current: Vec::new().into_iter(),
        ordinals,
        cancel: ctx.cancel.clone(),
        done: false,
    }))
}

// ============================================================================
// Consumer Side
// ============================================================================

struct ChunkedRows {
    rx: Receiver<Result<Chunk>>,
    current: std::vec::IntoIter<Vec<Value>>,
    ordinals: Arc<HashMap<String, usize>>,
    cancel: CancellationToken,
    done: bool,
}

impl Iterator for ChunkedRows {
    type Item = Result<Box<dyn RowResolver>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(values) = self.current.next() {
                let row = NamedRow::new(Arc::clone(&self.ordinals), values);
                return Some(Ok(Box::new(row)));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.cancel.check() {
                self.done = true;
                return Some(Err(err));
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(chunk)) => self.current = chunk.into_iter(),
                Ok(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaTable;
    use crate::types::ColumnType;

    fn ordinals() -> Arc<HashMap<String, usize>> {
        SchemaTable::new(vec![("N", ColumnType::Integer)]).ordinals()
    }

    fn ctx(chunk_size: usize, queue_depth: usize) -> SourceContext {
        SourceContext {
            cancel: CancellationToken::new(),
            chunk_size,
            queue_depth,
        }
    }

    #[test]
    fn test_rows_arrive_in_order_across_chunks() {
        let source = spawn_reader("numbers", ordinals(), &ctx(3, 1), |sink| {
            for i in 0..10 {
                if !sink.push(vec![Value::Integer(i)]) {
                    break;
                }
            }
            Ok(())
        })
        .unwrap();

        let values: Vec<_> = source
            .map(|row| row.unwrap().get("N").unwrap())
            .collect();
        assert_eq!(values, (0..10).map(Value::Integer).collect::<Vec<_>>());
    }

    #[test]
    fn test_reader_error_is_delivered_after_rows() {
        let mut source = spawn_reader("failing", ordinals(), &ctx(1, 1), |sink| {
            sink.push(vec![Value::Integer(1)]);
            Err(Error::with_message(ErrorCode::Source, "bad line 2"))
        })
        .unwrap();

        assert!(source.next().unwrap().is_ok());
        let err = source.next().unwrap().err().unwrap();
        assert_eq!(err.message, "bad line 2");
        assert!(source.next().is_none());
    }

    #[test]
    fn test_cancellation_stops_consumer() {
        let context = ctx(1, 1);
        let cancel = context.cancel.clone();
        let mut source = spawn_reader("endless", ordinals(), &context, |sink| {
            let mut i = 0;
            while sink.push(vec![Value::Integer(i)]) {
                i += 1;
            }
            Ok(())
        })
        .unwrap();

        assert!(source.next().unwrap().is_ok());
        cancel.cancel();
        let mut saw_cancel = false;
        for item in source.by_ref() {
            if let Err(err) = item {
                assert_eq!(err.code, ErrorCode::Cancelled);
                saw_cancel = true;
                break;
            }
        }
        assert!(saw_cancel);
    }
}
