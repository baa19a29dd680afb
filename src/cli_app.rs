// cli_app.rs
use std::{
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, Capabilities},
    poller_worker::{self, WorkerHandle},
    status::{StatusReporter, StatusSnapshot},
    virtual_pad::probe_virtual_controller,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(2);

/// Console interface: no settings editing, just the polling loop and a
/// periodic status line until Ctrl+C.
pub struct CliApp {
    worker: Option<WorkerHandle>,
    status: StatusReporter,
    // Kept alive so the worker's config receiver stays open.
    _config_tx: watch::Sender<AppConfig>,
}

impl CliApp {
    pub fn new() -> anyhow::Result<Self> {
        let caps = Capabilities {
            virtual_controller: match probe_virtual_controller() {
                Ok(()) => true,
                Err(e) => {
                    warn!("{e}");
                    false
                }
            },
        };

        let mut cfg = AppConfig::load_or_default();
        cfg.validate(caps);

        println!("G29 to Roblox Bridge - console mode");
        println!("----------------------------------------");
        println!("Control mode: {}", cfg.control_mode);
        println!("  {}", cfg.control_mode.description());
        println!("Steering deadzone: {}", cfg.steering_deadzone);
        println!("Steering sensitivity: {}", cfg.steering_sensitivity);
        println!("Invert steering: {}", cfg.invert_steering);
        if !cfg.target_window.is_empty() {
            println!("Only sending input to windows titled '{}'", cfg.target_window);
        }
        if !caps.virtual_controller {
            println!("Virtual Xbox controller unavailable (ViGEmBus not installed)");
        }

        let (config_tx, config_rx) = watch::channel(cfg.clone());
        let (status_tx, status) =
            StatusReporter::channel(StatusSnapshot::stopped(cfg.control_mode, caps));
        let worker = poller_worker::spawn(config_rx, status_tx, caps)?;

        Ok(Self {
            worker: Some(worker),
            status,
            _config_tx: config_tx,
        })
    }

    /// Blocks until Ctrl+C, then stops the polling loop.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let Some(worker) = self.worker.take() else {
            anyhow::bail!("polling thread already stopped");
        };

        let r = worker.running_flag();
        ctrlc::set_handler(move || {
            if r.load(Ordering::SeqCst) {
                println!("\nCtrl+C pressed. Stopping...");
                r.store(false, Ordering::SeqCst);
            } else {
                println!("\nCtrl+C pressed again. Already stopping.");
            }
        })?;

        println!("Bridge running. Press Ctrl+C to stop.");

        let mut last_report = Instant::now();
        while !worker.is_finished() {
            thread::sleep(Duration::from_millis(100));
            if last_report.elapsed() >= STATUS_INTERVAL {
                last_report = Instant::now();
                let snap = self.status.latest();
                info!(
                    mode = %snap.mode,
                    connected = snap.device_connected,
                    steering = snap.input.steering,
                    throttle = snap.input.throttle,
                    brake = snap.input.brake,
                    "status"
                );
            }
        }

        worker.join();
        println!("\n{}", self.status.latest().describe());
        println!("Stopped.");
        Ok(())
    }
}
