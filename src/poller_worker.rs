// poller_worker.rs
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    config::{AppConfig, Capabilities, ControlMode},
    constants::TICK_INTERVAL,
    device::{GilrsWheel, RawDeviceState, WheelSource},
    dispatcher::Dispatcher,
    error::VirtualControllerError,
    focus,
    output::{EnigoInjector, InputInjector, NoopInjector, OutputSink},
    status::{StatusSender, StatusSnapshot},
    transform::{NormalizedInput, transform},
    virtual_pad::{self, VirtualPad},
};

/// Plugs in a virtual pad on demand, from the polling thread.
pub type PadFactory = Box<dyn FnMut() -> Result<Box<dyn VirtualPad>, VirtualControllerError>>;

/// True when bindings differ enough that keys held under the old ones must be
/// let go.
fn key_layout_changed(old: &AppConfig, new: &AppConfig) -> bool {
    old.throttle_key != new.throttle_key
        || old.brake_key != new.brake_key
        || old.steer_left_key != new.steer_left_key
        || old.steer_right_key != new.steer_right_key
        || old.dpad_keys != new.dpad_keys
        || old.button_mappings != new.button_mappings
}

/// Runs the read → transform → dispatch loop at a fixed rate.
pub struct PollerWorker<W: WheelSource> {
    wheel: Option<W>,
    device_name: Option<String>,
    device_ok: bool,
    dispatcher: Dispatcher,
    cfg: AppConfig,
    config_rx: watch::Receiver<AppConfig>,
    status_tx: StatusSender,
    running: Arc<AtomicBool>,
    pad_factory: PadFactory,
    focus: fn(&str) -> bool,
    injecting: bool,
    tick: u64,
}

impl<W: WheelSource> PollerWorker<W> {
    pub fn new(
        wheel: Option<W>,
        dispatcher: Dispatcher,
        mut config_rx: watch::Receiver<AppConfig>,
        status_tx: StatusSender,
        running: Arc<AtomicBool>,
        pad_factory: PadFactory,
    ) -> Self {
        let cfg = config_rx.borrow_and_update().clone();
        let device_name = wheel.as_ref().map(|w| w.name().to_string());
        Self {
            device_ok: wheel.is_some(),
            wheel,
            device_name,
            dispatcher,
            cfg,
            config_rx,
            status_tx,
            running,
            pad_factory,
            focus: focus::target_window_active,
            injecting: true,
            tick: 0,
        }
    }

    #[cfg(test)]
    fn with_focus(mut self, focus: fn(&str) -> bool) -> Self {
        self.focus = focus;
        self
    }

    /// Apply a config published by the UI since the last tick.
    fn sync_config(&mut self) {
        if !self.config_rx.has_changed().unwrap_or(false) {
            return;
        }
        let next = self.config_rx.borrow_and_update().clone();
        if let Some(wheel) = self.wheel.as_mut() {
            wheel.configure(next.axis_map, next.pedals_rest_high);
        }

        // Release with the old bindings before they are replaced.
        if next.control_mode != self.dispatcher.mode() {
            self.dispatcher.set_mode(next.control_mode, &self.cfg);
        } else if key_layout_changed(&self.cfg, &next) {
            self.dispatcher.idle(&self.cfg);
        }
        self.cfg = next;
    }

    /// Connect the virtual pad the first time it is needed.
    fn ensure_pad(&mut self) {
        if self.dispatcher.mode() != ControlMode::VirtualController
            || self.dispatcher.has_pad()
            || !self.dispatcher.capabilities().virtual_controller
        {
            return;
        }
        match (self.pad_factory)() {
            Ok(pad) => {
                info!("Virtual Xbox controller connected");
                self.dispatcher.attach_pad(pad);
            }
            Err(e) => {
                error!("Failed to create virtual controller: {e}");
                self.dispatcher.virtual_controller_failed(&self.cfg);
            }
        }
    }

    fn poll_wheel(&mut self) -> Option<RawDeviceState> {
        let wheel = self.wheel.as_mut()?;
        match wheel.poll() {
            Ok(raw) => {
                if !self.device_ok {
                    info!("Wheel '{}' reconnected", wheel.name());
                    self.device_ok = true;
                }
                Some(raw)
            }
            Err(e) => {
                if self.device_ok {
                    warn!("Error reading wheel, sending neutral input: {e}");
                    self.device_ok = false;
                }
                None
            }
        }
    }

    /// One full read → transform → dispatch → publish cycle.
    pub fn tick_once(&mut self) {
        self.sync_config();
        self.ensure_pad();

        let (raw, input) = match self.poll_wheel() {
            Some(raw) => (raw, transform(&raw, &self.cfg)),
            None => (
                RawDeviceState::at_rest(self.cfg.pedals_rest_high),
                NormalizedInput::neutral(),
            ),
        };

        let injecting = (self.focus)(&self.cfg.target_window);
        if injecting {
            self.dispatcher.tick(&input, &self.cfg);
        } else if self.injecting {
            info!("Target window lost focus, releasing input");
            self.dispatcher.idle(&self.cfg);
        }
        self.injecting = injecting;
        self.tick += 1;

        self.publish(true, raw, input);
    }

    fn publish(&self, running: bool, raw: RawDeviceState, input: NormalizedInput) {
        let snapshot = StatusSnapshot {
            running,
            mode: self.dispatcher.mode(),
            capabilities: self.dispatcher.capabilities(),
            device_name: self.device_name.clone(),
            device_connected: self.wheel.is_some() && self.device_ok,
            injecting: running && self.injecting,
            raw,
            input,
            pad: self.dispatcher.pad_report(),
            mouse_offset: self.dispatcher.mouse_offset(),
            tick: self.tick,
        };
        self.status_tx.send_replace(Arc::new(snapshot));
    }

    /// Release everything and tell the UI the loop has stopped.
    pub fn shutdown(&mut self) {
        self.dispatcher.idle(&self.cfg);
        self.publish(
            false,
            RawDeviceState::at_rest(self.cfg.pedals_rest_high),
            NormalizedInput::neutral(),
        );
    }

    pub fn run(&mut self) {
        info!("Polling loop started ({} ms tick)", TICK_INTERVAL.as_millis());
        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick_once();
            if let Some(rest) = TICK_INTERVAL.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        self.shutdown();
        info!("Polling loop stopped after {} ticks", self.tick);
    }
}

/// Owns the polling thread. Dropping it stops and joins the loop.
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the loop to exit without signalling it.
    pub fn join(mut self) {
        self.join_thread();
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Polling thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_thread();
    }
}

/// Start the polling thread. Wheel, injector and virtual pad are created on
/// that thread since none of the backends are `Send`.
pub fn spawn(
    config_rx: watch::Receiver<AppConfig>,
    status_tx: StatusSender,
    caps: Capabilities,
) -> std::io::Result<WorkerHandle> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let handle = thread::Builder::new()
        .name("g29-poller".into())
        .spawn(move || {
            let cfg = config_rx.borrow().clone();

            let wheel = match GilrsWheel::open(cfg.axis_map, cfg.pedals_rest_high) {
                Ok(wheel) => Some(wheel),
                Err(e) => {
                    warn!("G29 wheel not available: {e}");
                    None
                }
            };

            let injector: Box<dyn InputInjector> = match EnigoInjector::new() {
                Ok(injector) => Box::new(injector),
                Err(e) => {
                    error!("Mouse/keyboard injection unavailable: {e}");
                    Box::new(NoopInjector)
                }
            };

            let dispatcher =
                Dispatcher::new(cfg.control_mode, caps, OutputSink::new(injector, None));
            let mut worker = PollerWorker::new(
                wheel,
                dispatcher,
                config_rx,
                status_tx,
                flag,
                Box::new(virtual_pad::connect),
            );
            worker.run();
        })?;

    Ok(WorkerHandle {
        running,
        handle: Some(handle),
    })
}
