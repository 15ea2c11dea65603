use clap::Parser;
use log::info;
use remote_chart::chart::DEFAULT_WINDOW;
use remote_chart::{BlockingRequestClient, ChartWindow, ClientConfig};

/// Pulls records from a remote chart server until it ends the stream
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Rows kept per field in the chart window
    #[arg(short, long, default_value_t = DEFAULT_WINDOW)]
    window: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let mut window = ChartWindow::new(cli.window);
    let mut records = BlockingRequestClient::connect(&config)?.into_records();
    info!("connected to {}", config.connect_addr());

    for record in records.by_ref() {
        let record = record?;
        let index = window.rows();
        if window.push(&record) {
            info!("y limits now {:?}", window.y_limits());
        }
        println!("{:>6} {}", index, serde_json::to_string(&record)?);
    }

    info!(
        "stream ended after {} records ({} fields)",
        records.next_index(),
        window.fields().count()
    );
    Ok(())
}
