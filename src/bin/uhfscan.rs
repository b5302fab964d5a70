use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{warn, Level};
use uhfscan::config::Config;
use uhfscan::{ChannelPlan, NetworkReader, TagEvent, TagRecord, UhfReader};

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let matches = App::new("uhfscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("📡 Continuous multi-antenna UHF RFID inventory")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file (falls back to $UHFSCAN_CONFIG)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Reader address, overrides the config file")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Reader port, overrides the config file")
                .takes_value(true)
                .global(true)
                .validator(|v| match v.parse::<u16>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Port must be a number between 0 and 65535".into()),
                }),
        )
        .arg(
            Arg::with_name("antennas")
                .short("a")
                .long("antennas")
                .value_name("COUNT")
                .help("Number of antenna ports on the reader")
                .takes_value(true)
                .global(true)
                .validator(|v| match v.parse::<usize>() {
                    Ok(n) if (1..=16).contains(&n) => Ok(()),
                    _ => Err("Antenna count must be between 1 and 16".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("inventory")
                .about("🏷️  Run continuous inventory until Ctrl+C (default)"),
        )
        .subcommand(SubCommand::with_name("info").about("📊 Show reader information"))
        .subcommand(
            SubCommand::with_name("power")
                .about("🔋 Set reader output power")
                .arg(
                    Arg::with_name("dbm")
                        .help("Power in dBm (0-33)")
                        .required(true)
                        .validator(|v| match v.parse::<u8>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Power must be a number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("antenna")
                .about("📶 Enable or disable one antenna")
                .arg(
                    Arg::with_name("position")
                        .help("One-based antenna number")
                        .required(true)
                        .validator(|v| match v.parse::<u8>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Antenna must be a number".into()),
                        }),
                )
                .arg(
                    Arg::with_name("state")
                        .help("Antenna state")
                        .required(true)
                        .possible_values(&["on", "off", "enable", "disable"]),
                )
                .arg(
                    Arg::with_name("temporary")
                        .long("temporary")
                        .help("Do not persist the change across reader restarts"),
                ),
        )
        .subcommand(
            SubCommand::with_name("resolve")
                .about("🧮 Resolve a MHz window against the band registry (offline)")
                .arg(Arg::with_name("min").help("Lower bound in MHz").required(true))
                .arg(Arg::with_name("max").help("Upper bound in MHz").required(true)),
        )
        .get_matches();

    let (name, sub_matches) = matches.subcommand();
    let option = |key: &str| -> Option<String> {
        sub_matches
            .and_then(|sub| sub.value_of(key))
            .or_else(|| matches.value_of(key))
            .map(str::to_string)
    };
    let flag = |key: &str| sub_matches.map_or(false, |sub| sub.is_present(key)) || matches.is_present(key);

    let mut config = Config::load(option("config").as_deref().map(Path::new))?;
    if let Some(host) = option("host") {
        config.device.ip = host;
    }
    if let Some(port) = option("port") {
        config.device.port = port.parse()?;
    }
    if let Some(antennas) = option("antennas") {
        config.device.antennas.num = antennas.parse()?;
    }
    if flag("verbose") {
        config.device.verbose = true;
    }

    tracing_subscriber::fmt()
        .with_max_level(if config.device.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let ("resolve", Some(sub)) = (name, sub_matches) {
        return handle_resolve(sub);
    }

    if config.device.verbose {
        println!("{} {}:{}", "Connecting to".dimmed(), config.device.ip, config.device.port);
    }

    let device = Arc::new(NetworkReader::new(&config.device.ip, config.device.port)?);
    let reader = UhfReader::new(
        device,
        ChannelPlan::regulatory(),
        config.device.antennas.num,
        config.device.inventory.to_params()?,
    )?;
    reader.connect()?;

    let result = apply_startup_settings(&reader, &config).and_then(|_| match (name, sub_matches) {
        ("info", _) => handle_info(&reader),
        ("power", Some(sub)) => handle_power(&reader, sub),
        ("antenna", Some(sub)) => handle_antenna(&reader, sub),
        _ => handle_inventory(&reader, &config),
    });

    reader.close()?;
    result
}

fn apply_startup_settings(reader: &UhfReader, config: &Config) -> Result<(), Box<dyn Error>> {
    reader.set_power(config.device.power)?;
    reader.set_beep(config.device.beep)?;
    for (&position, &enabled) in &config.device.antennas.map {
        if let Err(e) = reader.set_antenna(position, enabled, true) {
            warn!(position, "Skipping antenna setting: {}", e);
        }
    }
    Ok(())
}

fn handle_inventory(reader: &UhfReader, config: &Config) -> Result<(), Box<dyn Error>> {
    let frequency = &config.device.frequency;
    let plan = reader.hop_plan(&frequency.specs, frequency.interval)?;

    println!("{}", "📡 Channel plan".bright_blue().bold());
    for selection in plan.selections() {
        println!("   {}", selection.to_string().bright_white());
    }
    if plan.hopping_enabled() {
        println!("   {} every {} ms", "hopping".bright_cyan(), plan.interval().as_millis());
    }
    println!("{} (Press Ctrl+C to stop)", "🏷️  Inventory running".bright_green());

    let mut events = reader.subscribe();
    reader.start(plan)?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                event = events.recv() => match event {
                    Ok(TagEvent::Read { record, first_seen }) => print_tag(&record, first_seen),
                    Ok(TagEvent::Stopped) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Tag display fell behind, events dropped");
                    }
                },
            }
        }
    });

    reader.stop();

    let mut epcs: Vec<String> = reader.snapshot_buffer().into_iter().collect();
    epcs.sort();
    println!();
    println!("{} {} distinct tag(s)", "📦".bright_blue(), epcs.len().to_string().bright_white().bold());
    for epc in epcs {
        println!("   {}", epc.bright_cyan());
    }
    Ok(())
}

fn print_tag(record: &TagRecord, first_seen: bool) {
    let marker = if first_seen { "NEW".bright_green().bold() } else { "   ".normal() };
    println!(
        "{} {}  ant {}  {} dBm",
        marker,
        record.epc.bright_white(),
        record.antenna.to_string().bright_cyan(),
        record.rssi.to_string().yellow()
    );
}

fn handle_info(reader: &UhfReader) -> Result<(), Box<dyn Error>> {
    let info = reader.info()?;
    let power = info.power.map_or_else(|| "per antenna".to_string(), |dbm| format!("{} dBm", dbm));
    let band = reader
        .channel_plan()
        .band(info.band)
        .map_or_else(|| format!("{}", info.band), |band| format!("{} ({})", band.id(), band.name()));
    let antennas: Vec<String> = info.antennas.iter().map(u8::to_string).collect();

    println!("{}", "📊 Reader".bright_blue().bold());
    println!("   {:<10} {}", "Serial", info.serial.bright_white());
    println!("   {:<10} {}", "Firmware", info.version.bright_white());
    println!("   {:<10} {}", "Power", power.bright_white());
    println!("   {:<10} {}", "Band", band.bright_white());
    println!("   {:<10} {}..={}", "Channels", info.min_index, info.max_index);
    println!("   {:<10} {}", "Beep", if info.beep_enabled { "on".green() } else { "off".red() });
    println!("   {:<10} {} ({:#06x})", "Antennas", antennas.join(", ").bright_cyan(), info.antenna_mask);
    Ok(())
}

fn handle_power(reader: &UhfReader, matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    let dbm: u8 = matches.value_of("dbm").unwrap_or_default().parse()?;
    reader.set_power(dbm)?;
    println!("{} {} set to {}", "✅".green(), "Power".bright_white(), format!("{} dBm", dbm).bright_cyan());
    Ok(())
}

fn handle_antenna(reader: &UhfReader, matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    let position: u8 = matches.value_of("position").unwrap_or_default().parse()?;
    let enabled = normalize_state(matches.value_of("state").unwrap_or_default());
    let persist = !matches.is_present("temporary");

    reader.set_antenna(position, enabled, persist)?;
    println!(
        "{} {} {} {}",
        "✅".green(),
        format!("Antenna {}", position).bright_white(),
        if enabled { "enabled".green() } else { "disabled".red() },
        (if persist { "" } else { "(temporary)" }).dimmed()
    );
    Ok(())
}

fn handle_resolve(matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    let min: f64 = matches.value_of("min").unwrap_or_default().parse()?;
    let max: f64 = matches.value_of("max").unwrap_or_default().parse()?;
    let selection = ChannelPlan::regulatory().resolve_by_range(min, max)?;

    println!("{} {}", "✅".green(), selection.to_string().bright_white());
    println!("   {} {}", "Band".dimmed(), selection.band().name().bright_cyan());
    for (offset, mhz) in selection.frequencies().enumerate() {
        println!("   n={:<3} {:.3} MHz", usize::from(selection.min_index()) + offset, mhz);
    }
    Ok(())
}

fn normalize_state(state: &str) -> bool {
    matches!(state, "on" | "enable")
}
