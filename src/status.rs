//! Read-only view of the polling loop for the UI.
//!
//! The poller publishes a fresh [`StatusSnapshot`] every tick over a watch
//! channel; the UI only ever borrows the latest one.

use std::{fmt::Write as _, sync::Arc};

use tokio::sync::watch;

use crate::{
    config::{Capabilities, ControlMode},
    device::RawDeviceState,
    transform::NormalizedInput,
    virtual_pad::PadReport,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub running: bool,
    pub mode: ControlMode,
    pub capabilities: Capabilities,
    pub device_name: Option<String>,
    pub device_connected: bool,
    pub injecting: bool,
    pub raw: RawDeviceState,
    pub input: NormalizedInput,
    pub pad: PadReport,
    pub mouse_offset: i64,
    pub tick: u64,
}

impl StatusSnapshot {
    pub fn stopped(mode: ControlMode, capabilities: Capabilities) -> Self {
        Self {
            running: false,
            mode,
            capabilities,
            device_name: None,
            device_connected: false,
            injecting: false,
            raw: RawDeviceState::at_rest(true),
            input: NormalizedInput::neutral(),
            pad: PadReport::default(),
            mouse_offset: 0,
            tick: 0,
        }
    }

    /// Multi-line summary for the status panel and the console interface.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Mode: {}", self.mode);
        match (&self.device_name, self.device_connected) {
            (Some(name), true) => {
                let _ = writeln!(out, "Wheel: {name}");
            }
            (Some(name), false) => {
                let _ = writeln!(out, "Wheel: {name} (disconnected, sending neutral input)");
            }
            (None, _) => {
                let _ = writeln!(out, "Wheel Status: Not Connected");
            }
        }
        if !self.capabilities.virtual_controller {
            let _ = writeln!(out, "Virtual controller: unavailable");
        }
        if self.running && !self.injecting {
            let _ = writeln!(out, "Target window not focused, input paused");
        }
        let _ = writeln!(
            out,
            "Steering: {:+.3} (raw {})",
            self.input.steering, self.raw.steering
        );
        let _ = writeln!(
            out,
            "Throttle: {:.3}  Brake: {:.3}  Clutch: {:.3}",
            self.input.throttle, self.input.brake, self.input.clutch
        );

        let pressed: Vec<String> = (0..32u8)
            .filter(|b| self.raw.is_pressed(*b))
            .map(|b| b.to_string())
            .collect();
        if pressed.is_empty() {
            let _ = writeln!(out, "No buttons pressed");
        } else {
            let _ = writeln!(out, "Buttons: {}", pressed.join(", "));
        }

        match self.mode {
            ControlMode::Mouse | ControlMode::Hybrid => {
                let _ = writeln!(out, "Mouse offset: {} px", self.mouse_offset);
            }
            ControlMode::VirtualController if !self.capabilities.virtual_controller => {
                let _ = writeln!(out, "Virtual controller not connected, no output");
            }
            ControlMode::VirtualController => {
                let _ = writeln!(
                    out,
                    "Pad LX {:+.2} LY {:+.2} RX {:+.2} RY {:+.2} LT {:.2} RT {:.2}",
                    self.pad.left_x,
                    self.pad.left_y,
                    self.pad.right_x,
                    self.pad.right_y,
                    self.pad.left_trigger,
                    self.pad.right_trigger
                );
            }
            ControlMode::Keyboard => {}
        }
        out
    }
}

pub type StatusSender = watch::Sender<Arc<StatusSnapshot>>;

/// Cheap, cloneable handle on the latest published snapshot.
#[derive(Clone)]
pub struct StatusReporter {
    rx: watch::Receiver<Arc<StatusSnapshot>>,
}

impl StatusReporter {
    pub fn channel(initial: StatusSnapshot) -> (StatusSender, Self) {
        let (tx, rx) = watch::channel(Arc::new(initial));
        (tx, Self { rx })
    }

    pub fn latest(&self) -> Arc<StatusSnapshot> {
        self.rx.borrow().clone()
    }
}
