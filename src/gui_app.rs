use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use eframe::{App as EguiApp, egui};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    config::{AppConfig, Capabilities, ControlMode, PedalAxis},
    constants::bounds,
    error::VirtualControllerError,
    output::KeyName,
    poller_worker::{self, WorkerHandle},
    status::{StatusReporter, StatusSnapshot},
    virtual_pad::{self, Stick, probe_virtual_controller},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Control,
    Configuration,
    Status,
}

fn probe_capabilities() -> Capabilities {
    Capabilities {
        virtual_controller: match probe_virtual_controller() {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                false
            }
        },
    }
}

/// Text buffers for the four key fields, committed on focus loss.
struct KeyBuffers {
    throttle: String,
    brake: String,
    left: String,
    right: String,
}

impl KeyBuffers {
    fn from_config(cfg: &AppConfig) -> Self {
        Self {
            throttle: cfg.throttle_key.to_string(),
            brake: cfg.brake_key.to_string(),
            left: cfg.steer_left_key.to_string(),
            right: cfg.steer_right_key.to_string(),
        }
    }
}

/// Single-line key field. Returns true when `key` was replaced.
fn key_field(ui: &mut egui::Ui, label: &str, buffer: &mut String, key: &mut KeyName) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(format!("{label}:"));
        let resp = ui.add(egui::TextEdit::singleline(buffer).desired_width(60.0));
        if resp.lost_focus() {
            match buffer.parse::<KeyName>() {
                Ok(parsed) => {
                    changed = parsed != *key;
                    *key = parsed;
                }
                Err(e) => warn!("Ignoring key binding: {e}"),
            }
            *buffer = key.to_string();
        }
    });
    changed
}

pub struct GuiApp {
    cfg: AppConfig,
    caps: Capabilities,
    tab: Tab,
    keys: KeyBuffers,
    config_tx: watch::Sender<AppConfig>,
    status: StatusReporter,
    worker: Option<WorkerHandle>,
    self_test: Option<JoinHandle<Result<(), VirtualControllerError>>>,
    message: String,
}

impl GuiApp {
    pub fn new() -> Self {
        let caps = probe_capabilities();
        let mut cfg = AppConfig::load_or_default();
        cfg.validate(caps);

        let (config_tx, _) = watch::channel(cfg.clone());
        let (_, status) = StatusReporter::channel(StatusSnapshot::stopped(cfg.control_mode, caps));

        Self {
            keys: KeyBuffers::from_config(&cfg),
            cfg,
            caps,
            tab: Tab::Control,
            config_tx,
            status,
            worker: None,
            self_test: None,
            message: String::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (status_tx, status) =
            StatusReporter::channel(StatusSnapshot::stopped(self.cfg.control_mode, self.caps));
        match poller_worker::spawn(self.config_tx.subscribe(), status_tx, self.caps) {
            Ok(worker) => {
                info!("Started in {} mode", self.cfg.control_mode);
                self.worker = Some(worker);
                self.status = status;
                self.message = "Interface running".into();
            }
            Err(e) => {
                error!("Failed to start polling thread: {e}");
                self.message = "Failed to start".into();
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            info!("Interface stopped");
            self.message = "Interface stopped".into();
        }
    }

    /// Re-probe the virtual controller driver and reopen the wheel.
    fn reconnect(&mut self) {
        let was_running = self.is_running();
        self.stop();
        self.caps = probe_capabilities();
        self.cfg.validate(self.caps);
        self.push_config();
        if was_running {
            self.start();
        }
        self.message = if self.caps.virtual_controller {
            "Reconnected, virtual controller available".into()
        } else {
            "Reconnected, virtual controller unavailable".into()
        };
    }

    fn push_config(&mut self) {
        self.config_tx.send_replace(self.cfg.clone());
    }

    fn save(&mut self) {
        self.message = match self.cfg.save() {
            Ok(()) => "Configuration saved".into(),
            Err(e) => {
                error!("Error saving configuration: {e}");
                "Error saving configuration".into()
            }
        };
    }

    fn start_self_test(&mut self) {
        if self.self_test.is_some() {
            return;
        }
        self.message = "Testing virtual controller...".into();
        match thread::Builder::new()
            .name("pad-self-test".into())
            .spawn(virtual_pad::self_test)
        {
            Ok(handle) => self.self_test = Some(handle),
            Err(e) => {
                error!("Failed to start controller test: {e}");
                self.message = "Virtual controller test failed".into();
            }
        }
    }

    fn poll_self_test(&mut self) {
        if !self.self_test.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        let Some(handle) = self.self_test.take() else {
            return;
        };
        self.message = match handle.join() {
            Ok(Ok(())) => "Virtual controller test completed".into(),
            Ok(Err(e)) => format!("Virtual controller test failed: {e}"),
            Err(_) => "Virtual controller test panicked".into(),
        };
    }

    /// Adopt a capability the polling loop found missing, so the option is
    /// greyed out instead of silently doing nothing.
    fn sync_capabilities(&mut self) {
        let snap = self.status.latest();
        if snap.running && self.caps.virtual_controller && !snap.capabilities.virtual_controller {
            warn!("Virtual controller reported unavailable by the polling loop");
            self.caps = snap.capabilities;
            self.message = "Virtual controller unavailable, choose another mode".into();
        }
    }

    fn control_tab(&mut self, ui: &mut egui::Ui) {
        ui.heading("Control Mode");
        let mut changed = false;
        for mode in ControlMode::ALL {
            let enabled = mode != ControlMode::VirtualController || self.caps.virtual_controller;
            let resp = ui.add_enabled(
                enabled,
                egui::RadioButton::new(self.cfg.control_mode == mode, mode.to_string()),
            );
            if resp.clicked() && self.cfg.control_mode != mode {
                self.cfg.control_mode = mode;
                changed = true;
            }
            ui.weak(mode.description());
            if !enabled {
                ui.colored_label(egui::Color32::RED, "Requires the ViGEmBus driver");
            }
        }
        if changed {
            self.push_config();
        }

        ui.separator();
        let running = self.is_running();
        ui.label(if running {
            format!("Status: Running - {}", self.status.latest().mode)
        } else {
            "Status: Stopped".to_string()
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!running, egui::Button::new("Start Interface"))
                .clicked()
            {
                self.start();
            }
            if ui
                .add_enabled(running, egui::Button::new("Stop Interface"))
                .clicked()
            {
                self.stop();
            }
            if ui.button("Reconnect").clicked() {
                self.reconnect();
            }
            if ui
                .add_enabled(
                    self.caps.virtual_controller && self.self_test.is_none(),
                    egui::Button::new("Test Virtual Controller"),
                )
                .clicked()
            {
                self.start_self_test();
            }
        });
        if !self.message.is_empty() {
            ui.label(&self.message);
        }
    }

    fn config_tab(&mut self, ui: &mut egui::Ui) {
        let cfg = &mut self.cfg;
        let mut changed = false;
        let mut save = false;

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.heading("Steering");
            changed |= ui
                .add(
                    egui::Slider::new(&mut cfg.steering_sensitivity, bounds::STEERING_SENSITIVITY)
                        .text("Sensitivity"),
                )
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut cfg.steering_deadzone, bounds::DEADZONE).text("Deadzone"))
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut cfg.steering_curve_exponent, bounds::CURVE_EXPONENT)
                        .text("Curve"),
                )
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut cfg.steering_range_degrees, bounds::STEERING_RANGE_DEG)
                        .text("Range")
                        .suffix("°"),
                )
                .changed();
            changed |= ui
                .checkbox(&mut cfg.invert_steering, "Invert Steering")
                .changed();

            ui.separator();
            ui.heading("Mouse Steering");
            changed |= ui
                .add(
                    egui::Slider::new(&mut cfg.mouse_sensitivity, bounds::MOUSE_SENSITIVITY)
                        .text("Mouse Sensitivity"),
                )
                .changed();
            changed |= ui
                .checkbox(&mut cfg.mouse_return_center, "Auto-center Mouse")
                .changed();
            changed |= ui
                .add_enabled(
                    cfg.mouse_return_center,
                    egui::Slider::new(&mut cfg.mouse_return_speed, bounds::RETURN_SPEED)
                        .text("Return Speed"),
                )
                .changed();

            ui.separator();
            ui.heading("Pedals");
            changed |= ui
                .add(egui::Slider::new(&mut cfg.pedal_deadzone, bounds::DEADZONE).text("Deadzone"))
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut cfg.pedal_curve_exponent, bounds::CURVE_EXPONENT)
                        .text("Curve"),
                )
                .changed();
            changed |= ui
                .checkbox(&mut cfg.swap_brake_clutch, "Swap Brake & Clutch Pedals")
                .changed();

            ui.separator();
            ui.heading("Key Mappings (Keyboard/Hybrid Mode)");
            let keys = &mut self.keys;
            changed |= key_field(ui, "Throttle", &mut keys.throttle, &mut cfg.throttle_key);
            changed |= key_field(ui, "Brake", &mut keys.brake, &mut cfg.brake_key);
            changed |= key_field(ui, "Steer Left", &mut keys.left, &mut cfg.steer_left_key);
            changed |= key_field(ui, "Steer Right", &mut keys.right, &mut cfg.steer_right_key);

            ui.separator();
            ui.heading("Advanced");
            changed |= ui
                .checkbox(&mut cfg.keyboard_steering_lfo, "Use LFO (rapid tapping)")
                .changed();
            changed |= ui
                .add_enabled(
                    cfg.keyboard_steering_lfo,
                    egui::Slider::new(&mut cfg.keyboard_steering_frequency, bounds::LFO_FREQUENCY)
                        .text("LFO Frequency")
                        .suffix(" Hz"),
                )
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(
                        &mut cfg.controller_steering_range,
                        bounds::CONTROLLER_RANGE,
                    )
                    .text("Controller Steering Range"),
                )
                .changed();
            ui.horizontal(|ui| {
                ui.label("Virtual Controller Stick:");
                changed |= ui
                    .radio_value(&mut cfg.controller_stick, Stick::Left, "Left Stick")
                    .changed();
                changed |= ui
                    .radio_value(&mut cfg.controller_stick, Stick::Right, "Right Stick")
                    .changed();
            });
            ui.horizontal(|ui| {
                ui.label("Throttle/Brake Axis:");
                changed |= ui
                    .radio_value(
                        &mut cfg.controller_pedal_axis,
                        PedalAxis::Triggers,
                        "Triggers (RT/LT)",
                    )
                    .changed();
                changed |= ui
                    .radio_value(&mut cfg.controller_pedal_axis, PedalAxis::StickY, "Stick Y")
                    .changed();
            });
            ui.horizontal(|ui| {
                ui.label("Target Window:");
                changed |= ui
                    .add(egui::TextEdit::singleline(&mut cfg.target_window).desired_width(120.0))
                    .changed();
            });

            ui.separator();
            save = ui.button("Save Configuration").clicked();
        });

        if changed {
            self.push_config();
        }
        if save {
            self.save();
        }
    }

    fn status_tab(&self, ui: &mut egui::Ui) {
        let snap = self.status.latest();

        ui.heading("Pedal Positions");
        for (label, value) in [
            ("Throttle", snap.input.throttle),
            ("Brake", snap.input.brake),
            ("Clutch", snap.input.clutch),
        ] {
            ui.add(egui::ProgressBar::new(value).text(format!("{label}: {value:.2}")));
        }
        // Steering bar is centered at half width.
        ui.add(
            egui::ProgressBar::new((snap.input.steering + 1.0) / 2.0)
                .text(format!("Steering: {:+.2}", snap.input.steering)),
        );

        if snap.mode == ControlMode::VirtualController {
            ui.separator();
            ui.heading("Virtual Xbox Controller");
            ui.label(format!(
                "Left Stick  X: {:+.2}, Y: {:+.2}",
                snap.pad.left_x, snap.pad.left_y
            ));
            ui.label(format!(
                "Right Stick X: {:+.2}, Y: {:+.2}",
                snap.pad.right_x, snap.pad.right_y
            ));
            ui.add(
                egui::ProgressBar::new(snap.pad.left_trigger)
                    .text(format!("Left Trigger (Brake): {:.2}", snap.pad.left_trigger)),
            );
            ui.add(
                egui::ProgressBar::new(snap.pad.right_trigger)
                    .text(format!("Right Trigger (Gas): {:.2}", snap.pad.right_trigger)),
            );
        }

        ui.separator();
        ui.monospace(snap.describe());
    }
}

impl EguiApp for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_self_test();
        self.sync_capabilities();

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Control, "Control");
                ui.selectable_value(&mut self.tab, Tab::Configuration, "Configuration");
                ui.selectable_value(&mut self.tab, Tab::Status, "Status");
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("G29 to Roblox Interface");
            ui.separator();
            match self.tab {
                Tab::Control => self.control_tab(ui),
                Tab::Configuration => self.config_tab(ui),
                Tab::Status => self.status_tab(ui),
            }
        });

        ctx.request_repaint_after(Duration::from_millis(16));
    }
}
