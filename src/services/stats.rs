use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

/// Operational counters, updated atomically from every connection and
/// dispatch path.
///
/// The live struct holds atomics and is deliberately neither `Clone` nor
/// `Copy`; duplicating it by value would fork the counters. Share it behind
/// an `Arc` and read it through [`Stats::snapshot`].
#[derive(Default)]
pub struct Stats {
    connections: AtomicI64,
    total_connections: AtomicI64,
    total_messages: AtomicI64,
    connect_errors: AtomicI64,
    message_errors: AtomicI64,
    closing_connections: AtomicI64,
}

/// Point-in-time copy of the counters. Consistency is per counter; a
/// snapshot taken during updates may mix counter generations.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections: i64,
    pub total_connections: i64,
    pub total_messages: i64,
    pub connect_errors: i64,
    pub message_errors: i64,
    pub closing_connections: i64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn connect_event(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnect_event(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connect_error_event(&self) {
        self.connect_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_event(&self) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_error_event(&self) {
        self.message_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A close callback went in flight.
    pub fn closing_event(&self) {
        self.closing_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A close callback finished, successfully or not.
    pub fn closed_event(&self) {
        self.closing_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connections(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn closing_connections(&self) -> i64 {
        self.closing_connections.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            total_messages: self.total_messages.load(Ordering::Relaxed),
            connect_errors: self.connect_errors.load(Ordering::Relaxed),
            message_errors: self.message_errors.load(Ordering::Relaxed),
            closing_connections: self.closing_connections.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Tab-separated dump, one `name\tvalue` line per counter.
    pub fn to_tsv(&self) -> String {
        format!(
            "connections\t{}\ntotal_connections\t{}\ntotal_messages\t{}\nconnect_errors\t{}\nmessage_errors\t{}\nclosing_connections\t{}\n",
            self.connections,
            self.total_connections,
            self.total_messages,
            self.connect_errors,
            self.message_errors,
            self.closing_connections,
        )
    }
}
