use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;
use forkdns::{setup_logging, Args, Dispatcher, DnsServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging(args.log_file.as_deref())?;

    let config = args
        .dispatcher_config()
        .context("failed to load the dispatcher configuration")?;
    let dispatcher = Arc::new(Dispatcher::new(config).context("failed to instantiate the dispatcher")?);

    let mut server = DnsServer::new(args.bind, dispatcher)
        .await
        .context("failed to instantiate the DNS server")?
        .with_tcp_idle_timeout(Duration::from_millis(args.tcp_idle_timeout));

    server.add_workers(args.workers as usize).await;

    server.block_until_completion().await
}
