use std::io::{self, BufRead};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xytek_flow::input::handle_line;
use xytek_flow::interface::InterfaceMode;
use xytek_flow::worker::{TransportConfig, WorkerCommand, WorkerEvent, spawn_worker};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "XY-TEK ultrasonic flow sensor monitor")]
struct Args {
    /// Serial port path (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Modbus device address
    #[arg(short, long)]
    address: Option<u8>,

    /// Poll interval in milliseconds
    #[arg(short = 'i', long, default_value_t = 100)]
    poll_interval: u64,

    /// Response timeout in milliseconds
    #[arg(short, long, default_value_t = 200)]
    timeout: u64,

    /// Device interface
    #[arg(short = 'I', long, value_enum, default_value_t = InterfaceMode::Serial)]
    interface: InterfaceMode,

    /// Disable write commands
    #[arg(short = 'r', long, default_value_t = false)]
    read_only: bool,

    /// Enable temperature sampling and include it in the poll rotation
    #[arg(short = 'T', long, default_value_t = false)]
    temperature: bool,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_transport_config(&args)?;
    let read_only = config.read_only;

    let (command_tx, command_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();

    let worker = spawn_worker(config, command_rx, event_tx);
    spawn_stdin_reader(read_only, command_tx.clone());
    info!("commands: reset, zero, quit");

    let mut connected = None;
    let mut exit_error: Option<eyre::Report> = None;

    for event in &event_rx {
        match event {
            WorkerEvent::Readings(readings) => println!("{readings}"),
            WorkerEvent::Connection(ok) => {
                if connected != Some(ok) {
                    if ok {
                        info!("sensor responding");
                    } else {
                        warn!("sensor not responding");
                    }
                    connected = Some(ok);
                }
            }
            WorkerEvent::CommandResult(command, ok) => {
                if ok {
                    info!(?command, "command acknowledged");
                } else {
                    error!(?command, "command failed");
                }
            }
            WorkerEvent::Error(err) => {
                exit_error = Some(err.wrap_err("sensor connection failed"));
                break;
            }
        }
    }

    command_tx.send(WorkerCommand::Terminate).ok();
    worker.join().ok();

    if let Some(err) = exit_error {
        return Err(err);
    }

    Ok(())
}

fn spawn_stdin_reader(read_only: bool, command_tx: Sender<WorkerCommand>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match handle_line(&line, read_only, &command_tx) {
                Ok(false) => {}
                Ok(true) | Err(_) => break,
            }
        }
    });
}

fn resolve_transport_config(args: &Args) -> eyre::Result<TransportConfig> {
    let interface = {
        #[cfg(debug_assertions)]
        {
            resolve_interface_mode(args)
        }
        #[cfg(not(debug_assertions))]
        {
            resolve_interface_mode(args)?
        }
    };
    let baud = args.baud.unwrap_or(interface.default_baud());
    let address = args.address.unwrap_or(interface.default_address());

    let port = if interface.needs_port() {
        Some(
            args.port
                .clone()
                .ok_or_else(|| eyre::eyre!("serial port required unless using simulation interface"))?,
        )
    } else {
        None
    };

    Ok(TransportConfig {
        port,
        baud,
        address,
        poll_interval: Duration::from_millis(args.poll_interval),
        response_timeout: Duration::from_millis(args.timeout),
        read_only: args.read_only,
        temperature: args.temperature,
        interface,
    })
}

#[cfg(debug_assertions)]
fn resolve_interface_mode(args: &Args) -> InterfaceMode {
    args.interface
}

#[cfg(not(debug_assertions))]
fn resolve_interface_mode(args: &Args) -> eyre::Result<InterfaceMode> {
    if args.interface == InterfaceMode::Simulation {
        return Err(eyre::eyre!(
            "simulation interface is only available in debug builds"
        ));
    }
    Ok(args.interface)
}
