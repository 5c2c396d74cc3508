// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The admin thread: reports the statistics block on a fixed interval and
//! once more on shutdown.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::common::{Queue, Sender, Signal};
use crate::stats::Stats;

pub struct Admin {
    interval: Duration,
    stats: Arc<Stats>,
    cache: Arc<Cache>,
    signal_queue: Queue<Signal>,
}

impl Admin {
    pub fn new(interval: Duration, stats: Arc<Stats>, cache: Arc<Cache>) -> Self {
        Self {
            interval,
            stats,
            cache,
            signal_queue: Queue::new(128),
        }
    }

    pub fn signal_sender(&self) -> Sender<Signal> {
        self.signal_queue.sender()
    }

    /// Runs the `Admin` in a loop, waking on the report interval or on a
    /// signal, whichever comes first.
    pub fn run(&mut self) {
        loop {
            match self.signal_queue.recv_timeout(self.interval) {
                Ok(Signal::Shutdown) => {
                    self.report();
                    return;
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    self.report();
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    return;
                }
            }
        }
    }

    fn report(&self) {
        info!("{}", self.stats.snapshot(self.cache.total_bytes()));
    }
}
