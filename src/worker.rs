// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Long-lived worker threads draining the accept queue.

use crossbeam_channel::{select, Receiver};

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::admission::Admission;
use crate::cache::Cache;
use crate::common::{Queue, Sender, Signal};
use crate::config::ProxyConfig;
use crate::handler;
use crate::pool::ConnectionPool;
use crate::stats::Stats;

/// One accepted client, created by the listener and consumed by exactly one
/// worker.
pub struct WorkItem {
    pub session: TcpStream,
    pub peer: SocketAddr,
}

/// A `Worker` pulls accepted sessions off the shared queue and runs each one
/// through the request handler.
pub struct Worker {
    id: usize,
    config: Arc<ProxyConfig>,
    cache: Arc<Cache>,
    pool: Arc<ConnectionPool>,
    stats: Arc<Stats>,
    admission: Arc<Admission>,
    session_receiver: Receiver<WorkItem>,
    signal_queue: Queue<Signal>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        config: Arc<ProxyConfig>,
        cache: Arc<Cache>,
        pool: Arc<ConnectionPool>,
        stats: Arc<Stats>,
        admission: Arc<Admission>,
        session_receiver: Receiver<WorkItem>,
    ) -> Self {
        Self {
            id,
            config,
            cache,
            pool,
            stats,
            admission,
            session_receiver,
            signal_queue: Queue::new(128),
        }
    }

    pub fn signal_sender(&self) -> Sender<Signal> {
        self.signal_queue.sender()
    }

    /// Runs the `Worker` in a loop, blocking until either a session or a
    /// signal arrives.
    pub fn run(&mut self) {
        let signal_receiver = self.signal_queue.receiver();
        loop {
            select! {
                recv(self.session_receiver) -> item => {
                    match item {
                        Ok(item) => self.dispatch(item),
                        // all senders gone; nothing left to serve
                        Err(_) => return,
                    }
                }
                recv(signal_receiver) -> signal => {
                    match signal {
                        Ok(Signal::Shutdown) | Err(_) => {
                            self.drain();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, item: WorkItem) {
        trace!("worker {} handling session: {}", self.id, item.peer);
        handler::handle(
            item.session,
            &self.cache,
            &self.pool,
            &self.stats,
            &self.config,
        );
        self.admission.release();
    }

    /// Serves whatever was already queued at shutdown before exiting.
    fn drain(&self) {
        while let Ok(item) = self.session_receiver.try_recv() {
            self.dispatch(item);
        }
    }
}
