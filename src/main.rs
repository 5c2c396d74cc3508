// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#[macro_use]
extern crate log;

use backtrace::Backtrace;
use signal_hook::consts::{SIGINT, SIGTERM};

use hoard::config::ProxyConfig;
use hoard::ProxyBuilder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        error!("{}", s);
        println!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "proxy".to_string());
    let port = match (args.next(), args.next()) {
        (Some(arg), None) => match arg.parse::<u16>() {
            Ok(port) => port,
            Err(_) => usage(&program),
        },
        _ => usage(&program),
    };

    let mut config = ProxyConfig::default();
    config.server_mut().set_port(port);
    let config = Arc::new(config);

    info!("starting proxy server on port {}", port);
    info!("worker threads: {}", config.worker().threads());
    info!("max concurrent clients: {}", config.server().max_clients());
    info!(
        "cache size: {} MB",
        config.cache().max_total_bytes() / (1024 * 1024)
    );
    info!(
        "max cache entry size: {} MB",
        config.cache().max_entry_bytes() / (1024 * 1024)
    );
    info!("queue depth: {}", config.server().queue_depth());

    // SIGINT/SIGTERM flip the flag; the main thread then drives shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, shutdown.clone())
            .expect("Failed to register signal handler");
    }

    let proxy = ProxyBuilder::new(config).spawn();

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("received shutdown signal, shutting down gracefully");
    proxy.shutdown();
    info!("shutdown complete");
}

fn usage(program: &str) -> ! {
    println!("Usage: {} <port>", program);
    std::process::exit(1);
}
