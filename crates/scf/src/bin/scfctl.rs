// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `scfctl` — a thin diagnostic binary for poking at a running SCF
//! deployment: connect to the broker, declare a service's request queue,
//! and report whether the security service answers its health check.

use std::sync::Arc;

use clap::Parser;
use samfms_scf::broker::BrokerClient;
use samfms_scf::config::ScfConfig;
use samfms_scf::transport::nats::{NatsAuth, NatsTransport};

#[derive(Parser)]
#[command(flatten_help = true)]
struct Cli {
    #[command(flatten)]
    scf: ScfConfig,

    /// Only verify broker connectivity, then exit.
    #[arg(long)]
    check_broker: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.scf.init_tracing();

    let transport = Arc::new(NatsTransport::new(&cli.scf.broker_url, NatsAuth::default(), cli.scf.broker_max_retries));
    let broker = BrokerClient::new(transport);
    broker.connect().await?;
    tracing::info!(service = %cli.scf.service_name, "connected to broker");

    if cli.check_broker {
        return Ok(());
    }

    broker.declare_queue(&cli.scf.requests_queue(), &Default::default()).await?;
    tracing::info!(queue = %cli.scf.requests_queue(), "declared request queue");
    Ok(())
}
