use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};
use colored::*;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use deimos::{Credential, EngineConfig, Orchestrator, OrchestratorError};

fn cli() -> Command {
    Command::new("deimos")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scalable outbound TCP connection orchestrator")
        .arg(
            Arg::new("target")
                .help("Target to connect to, as ip:port")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("count")
                .short('c')
                .long("count")
                .help("Total connections to launch")
                .default_value("100"),
        )
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .help("Source address to bind, as ip or ip=capacity (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-connections")
                .short('m')
                .long("max-connections")
                .help("Connection slot pool size (defaults to --count)"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .help("Connect timeout in milliseconds")
                .default_value("3000"),
        )
        .arg(
            Arg::new("username")
                .short('u')
                .long("username")
                .help("Username tag carried per connection")
                .default_value(""),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .help("Password tag carried per connection")
                .default_value(""),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Load engine configuration from a TOML file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the final snapshot as JSON")
                .action(ArgAction::SetTrue),
        )
}

/// Parse `ip` or `ip=capacity`
fn parse_source(spec: &str, default_capacity: usize) -> anyhow::Result<(Ipv4Addr, usize)> {
    match spec.split_once('=') {
        Some((ip, cap)) => Ok((
            ip.parse().context("invalid source address")?,
            cap.parse().context("invalid source capacity")?,
        )),
        None => Ok((
            spec.parse().context("invalid source address")?,
            default_capacity,
        )),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let matches = cli().get_matches();

    let target: SocketAddrV4 = matches
        .get_one::<String>("target")
        .expect("required arg")
        .parse()
        .context("target must be ip:port")?;
    let count: usize = matches.get_one::<String>("count").unwrap().parse()?;
    let timeout: u64 = matches.get_one::<String>("timeout").unwrap().parse()?;
    let max_connections: usize = match matches.get_one::<String>("max-connections") {
        Some(v) => v.parse()?,
        None => count,
    };
    let json = matches.get_flag("json");
    let credential = Credential::new(
        matches.get_one::<String>("username").unwrap().clone(),
        matches.get_one::<String>("password").unwrap().clone(),
    );

    let config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::new(max_connections).with_connect_timeout(timeout),
    };
    let connect_timeout = config.timeout_duration();

    let mut orchestrator = Orchestrator::new(config)?;

    match matches.get_many::<String>("source") {
        Some(specs) => {
            for spec in specs {
                let (addr, capacity) = parse_source(spec, count)?;
                orchestrator.register_source(addr, capacity)?;
            }
        }
        None => {
            // Unspecified wildcard source: the OS picks the local address.
            orchestrator.register_source(Ipv4Addr::UNSPECIFIED, count)?;
        }
    }

    if !json {
        println!(
            "{} launching {} connections toward {}",
            "[~]".bright_blue(),
            count.to_string().bright_cyan(),
            target.to_string().bright_cyan()
        );
    }

    let started = Instant::now();
    let mut launched = 0usize;
    let mut rejected = 0usize;

    while launched + rejected < count {
        match orchestrator.start_connection(target, credential.clone()) {
            Ok(()) => launched += 1,
            Err(OrchestratorError::NoCapacity) | Err(OrchestratorError::PoolExhausted) => {
                // Saturated: let in-flight connections resolve, then retry.
                orchestrator.process_events(Duration::from_millis(50))?;
            }
            Err(e) if e.is_preflight() => {
                log::warn!("Connection rejected pre-flight: {}", e);
                rejected += 1;
            }
            Err(e) => bail!(e),
        }
    }

    // Drain until every launch resolves. The deadline guards against a
    // reactor that stops making progress.
    let deadline = Instant::now() + connect_timeout + Duration::from_secs(5);
    while orchestrator.active_connections() > 0 && Instant::now() < deadline {
        orchestrator.process_events(Duration::from_millis(100))?;
    }
    orchestrator.shutdown();

    let snapshot = orchestrator.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let elapsed = started.elapsed();
    println!();
    println!(
        "{} finished in {:.2}s",
        "[~]".bright_blue(),
        elapsed.as_secs_f64()
    );
    println!(
        "    attempts:   {}",
        snapshot.stats.total_attempts.to_string().bright_cyan()
    );
    println!(
        "    successful: {}",
        snapshot.stats.successful.to_string().bright_green()
    );
    println!(
        "    failed:     {}",
        snapshot.stats.failed.to_string().bright_red()
    );
    println!(
        "    timed out:  {}",
        snapshot.stats.timed_out.to_string().bright_yellow()
    );
    if rejected > 0 {
        println!("    rejected pre-flight: {}", rejected.to_string().bright_red());
    }
    for source in &snapshot.sources {
        println!(
            "    source {}: {}/{} active",
            source.addr, source.active, source.capacity
        );
    }

    Ok(())
}
