use chrono::Utc;
use clap::Parser;
use log::info;
use remote_chart::{Collector, CollectorConfig, Record, ReplyServer, ServerConfig, ServerState};
use tokio_util::sync::CancellationToken;

/// Samples a demo signal and serves it to one remote chart client
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listening address, `*` for all interfaces
    #[arg(long)]
    host: Option<String>,

    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Sampling interval in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,
}

fn demo_sample() -> Result<Record, String> {
    let seconds = Utc::now().timestamp_millis() as f64 / 1000.0;
    Ok(Record::from([("a", seconds % 10.0), ("b", 1.0)]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut server_config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    let mut collector_config = CollectorConfig::from_env();
    if let Some(interval_ms) = cli.interval_ms {
        collector_config.interval_ms = interval_ms;
    }

    let mut collector = Collector::from_config(demo_sample, &collector_config);
    collector.start()?;

    let finish = CancellationToken::new();
    let cancel = CancellationToken::new();
    let handler = collector.reader().handler(finish.clone());
    let server = ReplyServer::bind(&server_config, handler).await?;
    info!(
        "serving on {} every {}ms; Ctrl-C ends the stream",
        server.local_addr()?,
        collector_config.interval_ms
    );

    let state = server.watch_state();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt received, ending stream");
        finish.cancel();
        if *state.borrow() == ServerState::Idle {
            shutdown.cancel();
            return;
        }
        // A second interrupt gives up on the client.
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let outcome = server.serve(cancel).await;
    let report = collector.stop().await?;
    info!("collector finished: {}", serde_json::to_string(&report)?);
    outcome?;
    Ok(())
}
