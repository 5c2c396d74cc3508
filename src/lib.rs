// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A forwarding HTTP/1.1 proxy with a shared in-memory LRU response cache.
//!
//! The process runs one acceptor thread, a fixed pool of worker threads
//! draining a bounded queue of accepted clients, and an admin thread that
//! reports statistics. Workers serve GET responses out of the cache when
//! possible and otherwise fetch from the origin, streaming the response to
//! the client while capturing it for insertion. Idle origin connections are
//! kept in a pool and reused within a freshness window.

#[macro_use]
extern crate log;

pub mod admission;
pub mod cache;
pub mod common;
pub mod config;
pub mod error;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod response;
pub mod stats;

mod admin;
mod listener;
mod worker;

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::admin::Admin;
use crate::admission::Admission;
use crate::cache::Cache;
use crate::common::{Sender, Signal};
use crate::config::ProxyConfig;
use crate::listener::Listener;
use crate::pool::ConnectionPool;
use crate::stats::Stats;
use crate::worker::Worker;

const THREAD_PREFIX: &str = "hoard";

/// A structure which represents a proxy instance which is not yet running.
pub struct ProxyBuilder {
    listener: Listener,
    workers: Vec<Worker>,
    admin: Admin,
    pool: Arc<ConnectionPool>,
}

/// A structure which represents a running proxy.
///
/// Note: for a long-running daemon, be sure to call `wait()` on this
/// structure to block the process until the threads terminate. For use within
/// tests, be sure to call `shutdown()` to terminate the threads and block
/// until termination.
pub struct Proxy {
    threads: Vec<JoinHandle<()>>,
    signal_senders: Vec<Sender<Signal>>,
    pool: Arc<ConnectionPool>,
}

impl Default for ProxyBuilder {
    fn default() -> Self {
        let config = Arc::new(ProxyConfig::default());
        Self::new(config)
    }
}

impl ProxyBuilder {
    /// Creates a new `ProxyBuilder` from the given config.
    ///
    /// This function will terminate the program execution if there are any
    /// issues encountered while initializing the components.
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        let stats = Arc::new(Stats::new());
        let cache = Arc::new(Cache::new(
            config.cache().max_total_bytes(),
            config.cache().max_entry_bytes(),
            stats.clone(),
        ));
        let pool = Arc::new(ConnectionPool::new(
            config.pool().capacity(),
            config.pool().idle_max_age(),
        ));
        let admission = Arc::new(Admission::new(config.server().max_clients()));

        let (session_sender, session_receiver) =
            crossbeam_channel::bounded(config.server().queue_depth());

        let workers = (0..config.worker().threads())
            .map(|id| {
                Worker::new(
                    id,
                    config.clone(),
                    cache.clone(),
                    pool.clone(),
                    stats.clone(),
                    admission.clone(),
                    session_receiver.clone(),
                )
            })
            .collect();

        let listener = Listener::new(&config, session_sender, admission).unwrap_or_else(|e| {
            error!("{}", e);
            std::process::exit(1);
        });

        let admin = Admin::new(config.admin().stats_interval(), stats, cache);

        ProxyBuilder {
            listener,
            workers,
            admin,
            pool,
        }
    }

    /// Converts the `ProxyBuilder` to a running `Proxy` by spawning the
    /// threads for each component. Returns a `Proxy` which may be used to
    /// block until the threads have exited or trigger a shutdown.
    pub fn spawn(self) -> Proxy {
        // get signal senders for each component
        let mut signal_senders = vec![self.listener.signal_sender()];
        for worker in &self.workers {
            signal_senders.push(worker.signal_sender());
        }
        signal_senders.push(self.admin.signal_sender());

        // temporary bindings to prevent borrow-checker issues
        let mut listener = self.listener;
        let mut admin = self.admin;

        // spawn a thread for each component
        let mut threads = vec![std::thread::Builder::new()
            .name(format!("{}_listener", THREAD_PREFIX))
            .spawn(move || listener.run())
            .unwrap()];
        for (id, mut worker) in self.workers.into_iter().enumerate() {
            threads.push(
                std::thread::Builder::new()
                    .name(format!("{}_worker{}", THREAD_PREFIX, id))
                    .spawn(move || worker.run())
                    .unwrap(),
            );
        }
        threads.push(
            std::thread::Builder::new()
                .name(format!("{}_admin", THREAD_PREFIX))
                .spawn(move || admin.run())
                .unwrap(),
        );

        Proxy {
            threads,
            signal_senders,
            pool: self.pool,
        }
    }
}

impl Proxy {
    /// Attempts to gracefully shutdown the `Proxy` by sending a shutdown to
    /// each thread and then waiting to join those threads. In-flight requests
    /// are allowed to complete.
    ///
    /// This function will block until all threads have terminated.
    pub fn shutdown(self) {
        for sender in &self.signal_senders {
            if sender.send(Signal::Shutdown).is_err() {
                warn!("error sending shutdown signal to thread");
            }
        }

        // wait and join all threads, then close any idle upstream sockets
        let pool = self.pool.clone();
        self.wait();
        pool.drain();
    }

    /// Will block until all threads terminate. This should be used to keep
    /// the process alive while the child threads run.
    pub fn wait(self) {
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}
