// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tjobd: the job-execution server. Binds a TLS listener requiring
//! client certificates, and serves the `Job` gRPC service over it.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod auth;
mod service;
mod tls;

use clap::Parser;
use service::{JobServer, ResourceDefaults};
use std::path::PathBuf;
use std::sync::Arc;
use tonic::transport::Server;

/// Server-wide flags: resource defaults applied to every job plus the
/// TLS/listen configuration. Long-form `--` flags are the idiomatic
/// `clap` rendering of the original's single-dash `-mnt`/`-cpu`/etc.
#[derive(Debug, Parser)]
#[command(name = "tjobd", about = "Jailed job-execution server")]
struct Cli {
    /// $MAJ:$MIN device number for the io.max controller.
    #[arg(long)]
    mnt: String,

    /// Max CPU percentage of all cores.
    #[arg(long, default_value_t = 20)]
    cpu: u32,

    /// Max memory in megabytes.
    #[arg(long, default_value_t = 20)]
    mem: u32,

    /// Max reads in bytes/sec.
    #[arg(long, default_value_t = 20 * 1024 * 1024)]
    rbps: u64,

    /// Max writes in bytes/sec.
    #[arg(long, default_value_t = 20 * 1024 * 1024)]
    wbps: u64,

    /// Address to listen on.
    #[arg(long, default_value = "localhost:8080")]
    host: String,

    /// CA cert file, used to verify client certificates.
    #[arg(long, default_value = ".tjob/ca.crt")]
    ca: PathBuf,

    /// Server certificate file.
    #[arg(long, default_value = ".tjob/svc.crt")]
    cert: PathBuf,

    /// Server private key file.
    #[arg(long, default_value = ".tjob/svc.key")]
    key: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Must run before any `Job` is constructed, and before flags that
    // belong to a re-entered jail invocation are parsed as server flags.
    tjob_jail::reentry::init()?;

    setup_logging();
    let cli = Cli::parse();

    let tls_config = tls::load_server_config(&cli.cert, &cli.key, &cli.ca)?;
    let listener = tokio::net::TcpListener::bind(&cli.host).await?;
    tracing::info!(host = %cli.host, "listening");

    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tls_config));
    let incoming = tls::tls_incoming(listener, acceptor);

    let defaults = ResourceDefaults {
        mnt: cli.mnt,
        cpu_percent: cli.cpu,
        memory_mb: cli.mem,
        read_bps: cli.rbps,
        write_bps: cli.wbps,
    };
    let job_server = JobServer::new(defaults, tjob_jail::default_jail());

    Server::builder()
        .add_service(tjob_proto::job_server::JobServer::new(job_server))
        .serve_with_incoming(incoming)
        .await?;

    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
