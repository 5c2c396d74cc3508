// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Acceptor thread: owns the listening socket, applies the admission cap,
//! and moves accepted clients onto the work queue.

use socket2::{Domain, Protocol, SockRef, Socket, Type};

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::admission::Admission;
use crate::common::{Queue, Sender, Signal};
use crate::config::ProxyConfig;
use crate::response::{self, Status};
use crate::worker::WorkItem;

// idle wait between empty accept rounds; also bounds shutdown latency
const ACCEPT_PARK: Duration = Duration::from_millis(100);

pub struct Listener {
    addr: SocketAddr,
    listener: TcpListener,
    admission: Arc<Admission>,
    session_sender: crossbeam_channel::Sender<WorkItem>,
    signal_queue: Queue<Signal>,
}

impl Listener {
    /// Binds the proxy socket with `SO_REUSEADDR` and `SO_KEEPALIVE` and a
    /// listen backlog equal to the work-queue depth.
    pub fn new(
        config: &Arc<ProxyConfig>,
        session_sender: crossbeam_channel::Sender<WorkItem>,
        admission: Arc<Admission>,
    ) -> Result<Self, std::io::Error> {
        let addr = config.server().socket_addr().map_err(|e| {
            error!("{}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Bad listen address")
        })?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_keepalive(true)?;
        socket.bind(&addr.into())?;
        socket.listen(config.server().queue_depth() as i32)?;
        // non-blocking accept so the loop can observe shutdown signals
        socket.set_nonblocking(true)?;

        Ok(Self {
            addr,
            listener: socket.into(),
            admission,
            session_sender,
            signal_queue: Queue::new(128),
        })
    }

    pub fn signal_sender(&self) -> Sender<Signal> {
        self.signal_queue.sender()
    }

    /// Runs the `Listener` in a loop, accepting new sessions and moving them
    /// to the work queue.
    pub fn run(&mut self) {
        info!("running listener on: {}", self.addr);

        loop {
            match self.listener.accept() {
                Ok((session, peer)) => self.admit(session, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_PARK);
                }
                Err(e) => {
                    error!("error accepting connection: {}", e);
                }
            }

            while let Ok(signal) = self.signal_queue.try_recv() {
                match signal {
                    Signal::Shutdown => {
                        return;
                    }
                }
            }
        }
    }

    fn admit(&self, mut session: TcpStream, peer: SocketAddr) {
        // the listener is non-blocking; its accepted sockets must not be
        let _ = session.set_nonblocking(false);
        let _ = SockRef::from(&session).set_keepalive(true);

        if !self.admission.try_acquire() {
            debug!("refusing session {}: at client capacity", peer);
            response::send_error(&mut session, Status::ServiceUnavailable);
            return;
        }

        trace!("accepted new session: {}", peer);
        if self.session_sender.send(WorkItem { session, peer }).is_err() {
            error!("error sending session to worker");
            self.admission.release();
        }
    }
}
