// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming Manager (component F): per-execution event fan-out with
//! buffered history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Wire-format event discriminant (spec §3, §4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    ExecutionStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepSkipped,
    ProgressUpdate,
    Log,
    Error,
    ExecutionCompleted,
    ExecutionFailed,
}

impl StreamEventType {
    /// Whether this event marks the stream terminal (spec §4.6).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ExecutionCompleted | Self::ExecutionFailed)
    }
}

/// A single streamed event (spec §6 wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event: StreamEventType,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl StreamEvent {
    pub fn new(event: StreamEventType, execution_id: impl Into<String>, data: Value) -> Self {
        Self {
            event,
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// The channel a subscriber reads from. Closed automatically once the
/// stream's backlog has been replayed past its terminal event.
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

const DEFAULT_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct ExecutionStream {
    buffer: parking_lot::RwLock<std::collections::VecDeque<StreamEvent>>,
    subscribers: parking_lot::RwLock<Vec<mpsc::UnboundedSender<StreamEvent>>>,
    terminal: AtomicBool,
    terminal_at: parking_lot::RwLock<Option<std::time::Instant>>,
    capacity: usize,
}

impl ExecutionStream {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: parking_lot::RwLock::new(std::collections::VecDeque::with_capacity(capacity)),
            subscribers: parking_lot::RwLock::new(Vec::new()),
            terminal: AtomicBool::new(false),
            terminal_at: parking_lot::RwLock::new(None),
            capacity,
        }
    }

    /// Appends to the ring buffer and pushes to every live subscriber.
    /// A subscriber whose channel is closed is dropped silently — one
    /// dead receiver must never affect delivery to the others.
    fn push(&self, event: StreamEvent) {
        {
            let mut buffer = self.buffer.write();
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }
        if event.event.is_terminal() {
            self.terminal.store(true, Ordering::SeqCst);
            *self.terminal_at.write() = Some(std::time::Instant::now());
        }
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Registers a new subscriber, replaying the full backlog first. If
    /// the stream is already terminal, the channel is closed immediately
    /// after the replay (spec §4.6 "late subscribers").
    fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog: Vec<StreamEvent> = self.buffer.read().iter().cloned().collect();
        for event in backlog {
            if tx.send(event).is_err() {
                return rx;
            }
        }
        if self.terminal.load(Ordering::SeqCst) {
            // Dropping `tx` closes the channel once the replay above has
            // been delivered; the receiver drains it then sees `None`.
            return rx;
        }
        self.subscribers.write().push(tx);
        rx
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        match *self.terminal_at.read() {
            Some(at) => at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Per-execution event fan-out registry (spec §4.6).
///
/// `broadcast` is the stream's single writer; subscribers may drain their
/// channel concurrently but always observe one execution's events in
/// issue order, since each subscriber's `UnboundedSender` preserves FIFO
/// delivery and `push` appends to the buffer before fan-out.
pub struct StreamingManager {
    streams: DashMap<String, Arc<ExecutionStream>>,
    buffer_capacity: usize,
    ttl: Duration,
}

impl StreamingManager {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_capacity_and_ttl(buffer_capacity: usize, ttl: Duration) -> Self {
        Self {
            streams: DashMap::new(),
            buffer_capacity,
            ttl,
        }
    }

    fn stream_for(&self, execution_id: &str) -> Arc<ExecutionStream> {
        self.streams
            .entry(execution_id.to_string())
            .or_insert_with(|| Arc::new(ExecutionStream::new(self.buffer_capacity)))
            .clone()
    }

    /// Appends `event` to its execution's stream, creating the stream on
    /// first use.
    pub fn broadcast(&self, event: StreamEvent) {
        let stream = self.stream_for(&event.execution_id);
        stream.push(event);
    }

    /// Subscribes to an execution's stream, replaying its buffered
    /// history first. Creates the stream if it does not exist yet (a
    /// subscriber may arrive before the first event).
    pub fn subscribe(&self, execution_id: &str) -> EventReceiver {
        self.stream_for(execution_id).subscribe()
    }

    /// Drops the registry entry for `execution_id` outright, regardless
    /// of TTL. Used by callers that know an execution's stream will
    /// never be read again.
    pub fn unsubscribe_all(&self, execution_id: &str) {
        self.streams.remove(execution_id);
    }

    /// Removes closed streams whose terminal event is older than the
    /// configured TTL. Intended to be called periodically by the host
    /// process; never invoked automatically from `broadcast`/`subscribe`.
    pub fn reap_expired(&self) {
        self.streams.retain(|_, stream| !stream.is_stale(self.ttl));
    }

    pub fn is_terminal(&self, execution_id: &str) -> bool {
        self.streams
            .get(execution_id)
            .map(|s| s.terminal.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Default for StreamingManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: StreamEventType, exec: &str) -> StreamEvent {
        StreamEvent::new(kind, exec, json!({}))
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let mgr = StreamingManager::new();
        let mut rx = mgr.subscribe("exec-1");
        mgr.broadcast(event(StreamEventType::ExecutionStarted, "exec-1"));
        mgr.broadcast(event(StreamEventType::StepStarted, "exec-1"));
        mgr.broadcast(event(StreamEventType::StepCompleted, "exec-1"));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.event, StreamEventType::ExecutionStarted);
        assert_eq!(second.event, StreamEventType::StepStarted);
        assert_eq!(third.event, StreamEventType::StepCompleted);
    }

    #[tokio::test]
    async fn late_subscriber_gets_full_replay_then_closes() {
        let mgr = StreamingManager::new();
        mgr.broadcast(event(StreamEventType::ExecutionStarted, "exec-2"));
        mgr.broadcast(event(StreamEventType::StepCompleted, "exec-2"));
        mgr.broadcast(event(StreamEventType::ExecutionCompleted, "exec-2"));

        let mut rx = mgr.subscribe("exec-2");
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.event, StreamEventType::ExecutionStarted);
        assert_eq!(second.event, StreamEventType::StepCompleted);
        assert_eq!(third.event, StreamEventType::ExecutionCompleted);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn ring_buffer_discards_oldest_past_capacity() {
        let mgr = StreamingManager::with_capacity_and_ttl(2, DEFAULT_TTL);
        mgr.broadcast(event(StreamEventType::Log, "exec-3"));
        mgr.broadcast(event(StreamEventType::Log, "exec-3"));
        mgr.broadcast(event(StreamEventType::StepCompleted, "exec-3"));

        let mut rx = mgr.subscribe("exec-3");
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, StreamEventType::Log);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, StreamEventType::StepCompleted);
    }

    #[test]
    fn a_dead_subscriber_does_not_block_others() {
        let mgr = StreamingManager::new();
        let rx1 = mgr.subscribe("exec-4");
        drop(rx1);
        let mut rx2 = mgr.subscribe("exec-4");
        mgr.broadcast(event(StreamEventType::Log, "exec-4"));
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn reap_expired_leaves_fresh_streams_alone() {
        let mgr = StreamingManager::with_capacity_and_ttl(10, Duration::from_secs(3600));
        mgr.broadcast(event(StreamEventType::ExecutionCompleted, "exec-5"));
        mgr.reap_expired();
        assert!(mgr.is_terminal("exec-5"));
    }
}
