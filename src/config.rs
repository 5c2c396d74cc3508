// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Proxy configuration. Each section has compile-time defaults which may be
//! overridden from a TOML file; the listen port may additionally be overridden
//! on the command line.

use serde::{Deserialize, Serialize};

use std::io::Read;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

// constants to define default values
const SERVER_PORT: u16 = 8080;
const SERVER_MAX_CLIENTS: usize = 1200;
const SERVER_QUEUE_DEPTH: usize = 2000;

const WORKER_THREADS: usize = 50;

const CACHE_MAX_TOTAL_BYTES: usize = 200 * (1 << 20);
const CACHE_MAX_ENTRY_BYTES: usize = 10 * (1 << 20);

const POOL_CAPACITY: usize = 100;
const POOL_IDLE_MAX_AGE_SECS: u64 = 60;

const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 30;

const SOCKIO_BUFFER_SIZE: usize = 8192;

const ADMIN_STATS_INTERVAL_SECS: u64 = 60;

// helper functions
fn port() -> u16 {
    SERVER_PORT
}

fn max_clients() -> usize {
    SERVER_MAX_CLIENTS
}

fn queue_depth() -> usize {
    SERVER_QUEUE_DEPTH
}

fn threads() -> usize {
    WORKER_THREADS
}

fn max_total_bytes() -> usize {
    CACHE_MAX_TOTAL_BYTES
}

fn max_entry_bytes() -> usize {
    CACHE_MAX_ENTRY_BYTES
}

fn capacity() -> usize {
    POOL_CAPACITY
}

fn idle_max_age_secs() -> u64 {
    POOL_IDLE_MAX_AGE_SECS
}

fn connect_timeout_secs() -> u64 {
    UPSTREAM_CONNECT_TIMEOUT_SECS
}

fn buffer_size() -> usize {
    SOCKIO_BUFFER_SIZE
}

fn stats_interval_secs() -> u64 {
    ADMIN_STATS_INTERVAL_SECS
}

// struct definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Server {
    #[serde(default = "port")]
    port: u16,
    #[serde(default = "max_clients")]
    max_clients: usize,
    #[serde(default = "queue_depth")]
    queue_depth: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Worker {
    #[serde(default = "threads")]
    threads: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Cache {
    #[serde(default = "max_total_bytes")]
    max_total_bytes: usize,
    #[serde(default = "max_entry_bytes")]
    max_entry_bytes: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Pool {
    #[serde(default = "capacity")]
    capacity: usize,
    #[serde(default = "idle_max_age_secs")]
    idle_max_age_secs: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Upstream {
    #[serde(default = "connect_timeout_secs")]
    connect_timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Sockio {
    #[serde(default = "buffer_size")]
    buffer_size: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Admin {
    #[serde(default = "stats_interval_secs")]
    stats_interval_secs: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProxyConfig {
    #[serde(default)]
    server: Server,
    #[serde(default)]
    worker: Worker,
    #[serde(default)]
    cache: Cache,
    #[serde(default)]
    pool: Pool,
    #[serde(default)]
    upstream: Upstream,
    #[serde(default)]
    sockio: Sockio,
    #[serde(default)]
    admin: Admin,
}

// implementation
impl Server {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn set_max_clients(&mut self, max_clients: usize) {
        self.max_clients = max_clients;
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("0.0.0.0:{}", self.port).parse()
    }
}

impl Worker {
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads;
    }
}

impl Cache {
    pub fn max_total_bytes(&self) -> usize {
        self.max_total_bytes
    }

    pub fn max_entry_bytes(&self) -> usize {
        self.max_entry_bytes
    }

    pub fn set_max_total_bytes(&mut self, bytes: usize) {
        self.max_total_bytes = bytes;
    }

    pub fn set_max_entry_bytes(&mut self, bytes: usize) {
        self.max_entry_bytes = bytes;
    }
}

impl Pool {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn idle_max_age(&self) -> Duration {
        Duration::from_secs(self.idle_max_age_secs)
    }
}

impl Upstream {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Sockio {
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl Admin {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl ProxyConfig {
    pub fn load(file: &str) -> Result<ProxyConfig, std::io::Error> {
        let mut file = std::fs::File::open(file)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        match toml::from_str(&content) {
            Ok(t) => Ok(t),
            Err(e) => {
                error!("{}", e);
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "Error parsing config",
                ))
            }
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub fn sockio(&self) -> &Sockio {
        &self.sockio
    }

    pub fn admin(&self) -> &Admin {
        &self.admin
    }
}

// trait implementations
impl Default for Server {
    fn default() -> Self {
        Self {
            port: port(),
            max_clients: max_clients(),
            queue_depth: queue_depth(),
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self { threads: threads() }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            max_total_bytes: max_total_bytes(),
            max_entry_bytes: max_entry_bytes(),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            capacity: capacity(),
            idle_max_age_secs: idle_max_age_secs(),
        }
    }
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            connect_timeout_secs: connect_timeout_secs(),
        }
    }
}

impl Default for Sockio {
    fn default() -> Self {
        Self {
            buffer_size: buffer_size(),
        }
    }
}

impl Default for Admin {
    fn default() -> Self {
        Self {
            stats_interval_secs: stats_interval_secs(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: Default::default(),
            worker: Default::default(),
            cache: Default::default(),
            pool: Default::default(),
            upstream: Default::default(),
            sockio: Default::default(),
            admin: Default::default(),
        }
    }
}
