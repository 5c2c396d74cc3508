// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Pool of idle upstream connections, keyed by `(host, port)`.
//!
//! A fixed slot array under one mutex; critical sections are O(capacity).
//! Sockets are only reused within a freshness window — an idle origin
//! connection that has sat too long is assumed dead and closed on the spot.
//! There is no liveness probe; a reused socket that the peer has since
//! closed surfaces as a failed send at next use.

use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct ConnectionPool {
    slots: Mutex<Vec<Option<Idle>>>,
    max_idle_age: Duration,
}

struct Idle {
    stream: TcpStream,
    host: String,
    port: u16,
    returned_at: Instant,
}

impl ConnectionPool {
    pub fn new(capacity: usize, max_idle_age: Duration) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(slots),
            max_idle_age,
        }
    }

    /// Takes a fresh idle connection to `(host, port)` out of the pool.
    /// Stale matches are closed and their slots freed. Never blocks beyond
    /// the mutex; `None` means the caller should dial a new connection.
    pub fn acquire(&self, host: &str, port: u16) -> Option<TcpStream> {
        let mut slots = self.slots.lock().unwrap();
        let now = Instant::now();
        for slot in slots.iter_mut() {
            let matches = slot
                .as_ref()
                .map(|idle| idle.host == host && idle.port == port)
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let idle = slot.take().unwrap();
            if now.duration_since(idle.returned_at) < self.max_idle_age {
                trace!("reusing pooled connection to {}:{}", host, port);
                return Some(idle.stream);
            }
            // too old; dropping the socket closes it and leaves the slot free
            trace!("discarding stale pooled connection to {}:{}", host, port);
        }
        None
    }

    /// Returns a connection to the first free slot, or closes it when the
    /// pool is full.
    pub fn release(&self, stream: TcpStream, host: &str, port: u16) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(Idle {
                    stream,
                    host: host.to_string(),
                    port,
                    returned_at: Instant::now(),
                });
                return;
            }
        }
        trace!("pool full, closing connection to {}:{}", host, port);
    }

    /// Closes every pooled connection. Called during shutdown.
    pub fn drain(&self) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn idle_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}
