use anyhow::Context;
use clap::{Parser, Subcommand};
use delonghikit::console::{describe_changes, ConsoleCommand, HELP};
use delonghikit::{
    default_config_path, init_logging_with, list_ports, Config, DeviceState, Engine, LogFormat,
    ProtocolVersion, TransportSelection,
};
use delonghikit_core::types::{thread_safe, ThreadSafe};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Console for De'Longhi appliance bridges
#[derive(Parser, Debug)]
#[command(name = "delonghikit")]
#[command(about = "Talk to a De'Longhi appliance bridge over serial")]
#[command(version)]
struct Args {
    /// Config file (.toml or .json); defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(short, long)]
    baud: Option<u32>,

    /// Appliance protocol version (v1 or v2), overrides the config file
    #[arg(long)]
    protocol: Option<ProtocolVersion>,

    /// Send a poll every N milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Print state snapshots as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List serial ports the bridge could be attached to
    ListPorts,
    /// Write the effective configuration to the config file
    SaveConfig,
}

fn load_config(args: &Args) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().ok(),
    };

    let mut config = match &path {
        Some(path) if args.config.is_some() => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        Some(path) => Config::load_or_default(path)?,
        None => Config::default(),
    };

    if let Some(port) = &args.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.connection.baud_rate = baud;
    }
    if let Some(version) = args.protocol {
        config.protocol.version = version;
    }
    config.validate()?;

    Ok((config, path))
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

fn print_state(state: &DeviceState, json: bool) {
    if json {
        match serde_json::to_string(state) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Cannot serialize state: {}", e),
        }
        return;
    }

    let empty = DeviceState::default();
    for line in describe_changes(&empty, state) {
        println!("{} {}", timestamp(), line);
    }
}

/// Run a blocking engine call off the runtime threads; serial writes can
/// take up to the configured write timeout.
async fn blocking<F>(engine: &Engine, call: F) -> delonghikit::Result<()>
where
    F: FnOnce(&Engine) -> delonghikit::Result<()> + Send + 'static,
{
    let engine = engine.clone();
    match tokio::task::spawn_blocking(move || call(&engine)).await {
        Ok(result) => result,
        Err(e) => Err(delonghikit::Error::Other(format!("engine task failed: {}", e))),
    }
}

async fn run_console(engine: Engine, args: &Args) -> anyhow::Result<()> {
    let previous: ThreadSafe<DeviceState> = thread_safe(engine.device_state());
    let json = args.json;
    let _sub = engine.subscribe(move |state| {
        let mut previous = previous.lock();
        if json {
            print_state(state, true);
        } else {
            for line in describe_changes(&previous, state) {
                println!("{} {}", timestamp(), line);
            }
        }
        *previous = state.clone();
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = args
        .poll_interval_ms
        .filter(|ms| *ms > 0)
        .map(|ms| tokio::time::interval(Duration::from_millis(ms)));

    eprintln!("Connected to {} (type 'help' for commands)", engine.config().serial.port);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = ConsoleCommand::parse(&line) else { continue };
                match command {
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Help => eprintln!("{}", HELP),
                    ConsoleCommand::State => print_state(&engine.device_state(), json),
                    other => {
                        if let Err(e) = blocking(&engine, move |engine| other.execute(engine)).await {
                            eprintln!("error: {}", e);
                        }
                    }
                }
            }
            _ = async {
                match ticker.as_mut() {
                    Some(ticker) => { ticker.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Err(e) = blocking(&engine, Engine::poll).await {
                    tracing::warn!("Periodic poll failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    engine.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging_with(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    })?;

    tracing::info!("DelonghiKit v{}", delonghikit::VERSION);

    match args.command {
        Some(CliCommand::ListPorts) => {
            for port in list_ports()? {
                println!("{}\t{}", port.port_name, port.description);
            }
            Ok(())
        }
        Some(CliCommand::SaveConfig) => {
            let (config, path) = load_config(&args)?;
            let path = path.context("no config path; pass --config")?;
            config.save_to_file(&path)?;
            println!("Saved {}", path.display());
            Ok(())
        }
        None => {
            let (config, _) = load_config(&args)?;
            let engine = Engine::new(config.engine_config());
            engine
                .init(TransportSelection::Default)
                .with_context(|| format!("opening {}", config.connection.port))?;
            run_console(engine, &args).await
        }
    }
}
