use clap::{App, Arg};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, Level};
use uhfscan::server::serve;
use uhfscan::{ReaderDevice, SimulatedReader};

const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "2022";
const DEFAULT_LATENCY_MS: &str = "50";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("uhfscan-simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🧪 Simulated UHF reader served over TCP")
        .arg(
            Arg::with_name("bind")
                .short("b")
                .long("bind")
                .value_name("ADDR")
                .help("Address to listen on")
                .takes_value(true)
                .default_value(DEFAULT_BIND),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Port to listen on")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("latency")
                .short("l")
                .long("latency")
                .value_name("MS")
                .help("Simulated scan time per inventory poll")
                .takes_value(true)
                .default_value(DEFAULT_LATENCY_MS),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_max_level(if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO })
        .init();

    let bind = matches.value_of("bind").unwrap_or(DEFAULT_BIND);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let latency: u64 = matches.value_of("latency").unwrap_or(DEFAULT_LATENCY_MS).parse()?;

    println!("🧪 UHF Reader Simulator");
    println!("=======================");

    let device: Arc<dyn ReaderDevice> =
        Arc::new(SimulatedReader::demo().with_address(bind).with_poll_latency(Duration::from_millis(latency)));
    let listener = TcpListener::bind((bind, port)).await?;
    println!("{} Listening on {}:{} (Press Ctrl+C to stop)", "🌐".bright_blue(), bind, port);

    tokio::select! {
        result = serve(listener, device) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    println!("{} Simulator stopped", "🛑".bright_red());
    Ok(())
}
