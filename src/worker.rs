use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{self, WrapErr};
use tracing::{info, warn};

use crate::backend::build_transport;
use crate::data::Readings;
use crate::driver::{Delay, SensorDriver};
use crate::interface::InterfaceMode;
use crate::poll::{PollScheduler, PollTarget};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    ResetVolume,
    ZeroCalibration,
    Terminate,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Readings(Readings),
    Connection(bool),
    CommandResult(WorkerCommand, bool),
    Error(eyre::Report),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub port: Option<String>,
    pub baud: u32,
    pub address: u8,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub read_only: bool,
    pub temperature: bool,
    pub interface: InterfaceMode,
}

impl TransportConfig {
    pub fn rotation(&self) -> Vec<PollTarget> {
        let mut rotation = vec![PollTarget::FlowRate, PollTarget::VolumeNet];
        if self.temperature {
            rotation.push(PollTarget::Temperature);
        }
        rotation
    }
}

pub fn spawn_worker(
    config: TransportConfig,
    command_rx: Receiver<WorkerCommand>,
    event_tx: Sender<WorkerEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let result = build_transport(&config)
            .wrap_err("open transport")
            .and_then(|transport| {
                let mut driver = SensorDriver::new(transport);
                run_worker_loop(&config, &mut driver, &command_rx, &event_tx)
            });

        if let Err(err) = result {
            let _ = event_tx.send(WorkerEvent::Error(err));
        }
    })
}

pub fn run_worker_loop<T: Transport, D: Delay>(
    config: &TransportConfig,
    driver: &mut SensorDriver<T, D>,
    command_rx: &Receiver<WorkerCommand>,
    event_tx: &Sender<WorkerEvent>,
) -> eyre::Result<()> {
    let mut scheduler = PollScheduler::new(config.rotation())
        .ok_or_else(|| eyre::eyre!("poll rotation is empty"))?;
    let started = Instant::now();

    match driver.search_device() {
        Ok(_) if driver.device_found() => {}
        Ok(tag) => warn!(tag = format_args!("0x{tag:08X}"), "device answered with foreign tag"),
        Err(err) => warn!(%err, "device search failed"),
    }
    if config.temperature
        && !config.read_only
        && let Err(err) = driver.enable_temperature()
    {
        warn!(%err, "could not enable temperature sampling");
    }

    loop {
        match command_rx.recv_timeout(config.poll_interval) {
            Ok(WorkerCommand::Terminate) => break,
            Ok(command) if config.read_only => {
                info!(?command, "ignored in read-only mode");
            }
            Ok(command @ WorkerCommand::ResetVolume) => {
                let ok = driver.reset_volume().is_ok();
                event_tx.send(WorkerEvent::CommandResult(command, ok)).ok();
            }
            Ok(command @ WorkerCommand::ZeroCalibration) => {
                let ok = driver.zero_calibration().is_ok();
                event_tx.send(WorkerEvent::CommandResult(command, ok)).ok();
            }
            Err(RecvTimeoutError::Timeout) => {
                let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let (_, ok) = scheduler.tick(driver, now_ms);
                event_tx.send(WorkerEvent::Readings(driver.readings())).ok();
                event_tx.send(WorkerEvent::Connection(ok)).ok();
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(eyre::eyre!("command channel closed"));
            }
        }
    }

    Ok(())
}
