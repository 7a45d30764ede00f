/*
* Copyright 2019 Comcast Cable Communications Management, LLC
*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
* http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific language governing permissions and
* limitations under the License.
*
* SPDX-License-Identifier: Apache-2.0
*/

//! CLI entry point: parse arguments, install the SIGINT/SIGTERM handler
//! that flips `is_running`, build the `sim` backend (the `dpdk` feature's
//! real backend is wired in behind that flag), and run the forwarder
//! until shutdown.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use l2xfwd::config::TimingProfile;
use l2xfwd::mbuf::{FramePool, DEFAULT_CAPACITY, DEFAULT_HEADROOM};
use l2xfwd::net::MacAddr;
use l2xfwd::orchestrator::{self, ForwarderConfig};
use l2xfwd::sim::SimPort;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Userspace run-to-completion L2 packet forwarder.
#[derive(Parser)]
#[command(name = "l2xfwd")]
#[command(version = VERSION)]
#[command(about = "Receive, rewrite, and retransmit Ethernet frames across paired ports")]
struct Args {
    /// Requested receive queue count per port.
    #[arg(short = 'q', long = "queues")]
    req_rx_queue_count: Option<u16>,

    /// Forward only traffic received on this port (otherwise every probed port is served).
    #[arg(short = 'p', long = "port")]
    rx_port: Option<u16>,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use the slower retry/poll timing constants, useful when observing
    /// behaviour interactively instead of under load.
    #[arg(long)]
    slow_motion: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let req_rx_queue_count = args.req_rx_queue_count.unwrap_or(l2xfwd::config::DEF_RX_QUEUE_COUNT);
    if req_rx_queue_count > l2xfwd::config::MAX_RX_QUEUE_PER_PORT {
        bail!("wrong usage: bad argument value (q)");
    }

    let pool = FramePool::new(DEFAULT_CAPACITY, DEFAULT_HEADROOM);

    // The real NIC bring-up is an external collaborator's job; this demo
    // binary always runs against the in-memory `sim` backend so it can
    // be exercised without hardware. A real deployment behind the `dpdk`
    // feature would build a `dpdk_backend::DpdkPort` here instead, after
    // `rte_eal_init`.
    let port = Arc::new(
        SimPort::new(pool.clone())
            .with_port(0, MacAddr::random(&mut rand::thread_rng()))
            .with_port(1, MacAddr::random(&mut rand::thread_rng())),
    );

    let is_running = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&is_running)?;

    let timing = if args.slow_motion { TimingProfile::slow_motion() } else { TimingProfile::fast() };
    let config = ForwarderConfig {
        req_rx_queue_count,
        rx_port_number: args.rx_port,
        timing,
    };

    let lcore_ids: Vec<usize> = (1..=4).collect();

    orchestrator::run_forwarder(port, &lcore_ids, pool, config, is_running)
        .context("forwarder run failed")?;

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();
}

fn install_signal_handlers(is_running: &Arc<AtomicBool>) -> Result<()> {
    // `signal_hook::flag::register` sets its flag true on receipt; this
    // engine's convention is the opposite (`is_running` starts true and
    // clears on shutdown), so a dedicated flag is raised by the signal
    // and a small watcher thread translates it into clearing `is_running`.
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("failed to register SIGTERM handler")?;

    let is_running = Arc::clone(is_running);
    std::thread::spawn(move || loop {
        if shutdown.load(std::sync::atomic::Ordering::Acquire) {
            is_running.store(false, std::sync::atomic::Ordering::Release);
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    Ok(())
}
