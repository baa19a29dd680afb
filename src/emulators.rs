//! Per-mode output strategies.
//!
//! Each emulator turns a [`NormalizedInput`] into injected events on an
//! [`OutputSink`]. The dispatcher calls exactly one of them per tick.

use std::time::Instant;

use tracing::{debug, warn};

use crate::{
    config::{AppConfig, PedalAxis},
    constants::{
        LFO_FACTOR_SPAN, LFO_MIN_FACTOR, MOUSE_DELTA_SCALE, MOUSE_MOVE_THRESHOLD,
        MOUSE_NEUTRAL_BAND, MOUSE_SMOOTHING, PEDAL_PRESS_THRESHOLD,
    },
    device::Dpad,
    output::{KeyName, OutputSink},
    transform::NormalizedInput,
    virtual_pad::{PadReport, Stick},
};

pub trait OutputEmulator {
    fn apply(&mut self, input: &NormalizedInput, cfg: &AppConfig, sink: &mut OutputSink);

    /// Called when the dispatcher switches away from this emulator. Must
    /// leave nothing held.
    fn deactivate(&mut self, cfg: &AppConfig, sink: &mut OutputSink);
}

/// Edge detection for wheel buttons and the d-pad.
#[derive(Debug, Default)]
struct ButtonTracker {
    last_buttons: u32,
    last_dpad: Dpad,
}

/// What a wheel button turns into in the current mode.
enum Routed {
    Key(KeyName),
    Pad(crate::virtual_pad::PadButton),
}

impl ButtonTracker {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn route(
        &mut self,
        input: &NormalizedInput,
        cfg: &AppConfig,
        sink: &mut OutputSink,
        mut pad: Option<&mut PadReport>,
    ) {
        let changed = self.last_buttons ^ input.buttons;
        for bit in (0..32u8).filter(|b| changed & (1 << b) != 0) {
            let pressed = input.buttons & (1 << bit) != 0;
            let Some(binding) = cfg.binding_for(bit) else {
                continue;
            };
            let routed = match (pad.is_some(), binding.pad_button(), binding.key()) {
                (true, Some(button), _) => Routed::Pad(button),
                (_, _, Some(key)) => Routed::Key(key),
                _ => continue,
            };
            match routed {
                Routed::Key(key) => sink.set_key(key, pressed),
                Routed::Pad(button) => {
                    if let Some(report) = pad.as_deref_mut() {
                        report.set_button(button, pressed);
                    }
                }
            }
            if pressed {
                debug!("Button {bit} pressed -> {}", binding.action);
            }
        }
        self.last_buttons = input.buttons;

        let keys = cfg.dpad_keys;
        let dirs = [
            (input.dpad.up, self.last_dpad.up, keys.up),
            (input.dpad.down, self.last_dpad.down, keys.down),
            (input.dpad.left, self.last_dpad.left, keys.left),
            (input.dpad.right, self.last_dpad.right, keys.right),
        ];
        for (now, was, key) in dirs {
            if now != was {
                sink.set_key(key, now);
            }
        }
        self.last_dpad = input.dpad;
    }
}

fn route_pedal_keys(input: &NormalizedInput, cfg: &AppConfig, sink: &mut OutputSink) {
    sink.set_key(cfg.throttle_key, input.throttle > PEDAL_PRESS_THRESHOLD);
    sink.set_key(cfg.brake_key, input.brake > PEDAL_PRESS_THRESHOLD);
}

fn release_mode_keys(cfg: &AppConfig, sink: &mut OutputSink) {
    for key in [
        cfg.throttle_key,
        cfg.brake_key,
        cfg.steer_left_key,
        cfg.steer_right_key,
    ] {
        sink.release(key);
    }
}

/// Synthetic mouse displacement not yet returned to center, in pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CenteringState {
    offset: i64,
}

impl CenteringState {
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn record(&mut self, dx: i32) {
        self.offset += i64::from(dx);
    }

    /// Remove `speed` of the residual offset and return the corrective move.
    /// At least one pixel is corrected while any offset remains.
    pub fn step(&mut self, speed: f32) -> i32 {
        if self.offset == 0 {
            return 0;
        }
        let mut correction = -((self.offset as f64) * f64::from(speed.clamp(0.0, 1.0))).round() as i64;
        if correction == 0 {
            correction = -self.offset.signum();
        }
        self.offset += correction;
        correction as i32
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// Steering as relative horizontal mouse motion, pedals as keys.
#[derive(Debug, Default)]
pub struct MouseEmulator {
    velocity: f32,
    centering: CenteringState,
    buttons: ButtonTracker,
}

impl MouseEmulator {
    pub fn centering(&self) -> &CenteringState {
        &self.centering
    }

    fn steer(&mut self, steering: f32, cfg: &AppConfig, sink: &mut OutputSink) {
        let target = steering * cfg.mouse_sensitivity;
        self.velocity += (target - self.velocity) * MOUSE_SMOOTHING;

        if self.velocity.abs() > MOUSE_MOVE_THRESHOLD {
            let dx = (self.velocity * MOUSE_DELTA_SCALE) as i32;
            sink.move_mouse(dx);
            self.centering.record(dx);
        } else if cfg.mouse_return_center && steering.abs() < MOUSE_NEUTRAL_BAND {
            let dx = self.centering.step(cfg.mouse_return_speed);
            sink.move_mouse(dx);
        }
    }
}

impl OutputEmulator for MouseEmulator {
    fn apply(&mut self, input: &NormalizedInput, cfg: &AppConfig, sink: &mut OutputSink) {
        self.steer(input.steering, cfg, sink);
        route_pedal_keys(input, cfg, sink);
        self.buttons.route(input, cfg, sink, None);
    }

    fn deactivate(&mut self, cfg: &AppConfig, sink: &mut OutputSink) {
        release_mode_keys(cfg, sink);
        self.velocity = 0.0;
        self.centering.reset();
        self.buttons.reset();
    }
}

/// Mouse steering with keyboard pedals. Behaves exactly like
/// [`MouseEmulator`]; only the label differs.
#[derive(Debug, Default)]
pub struct HybridEmulator {
    inner: MouseEmulator,
}

impl HybridEmulator {
    pub fn mouse(&self) -> &MouseEmulator {
        &self.inner
    }
}

impl OutputEmulator for HybridEmulator {
    fn apply(&mut self, input: &NormalizedInput, cfg: &AppConfig, sink: &mut OutputSink) {
        self.inner.apply(input, cfg, sink);
    }

    fn deactivate(&mut self, cfg: &AppConfig, sink: &mut OutputSink) {
        self.inner.deactivate(cfg, sink);
    }
}

/// Steering as left/right keys, either held or tapped.
#[derive(Debug, Default)]
pub struct KeyboardEmulator {
    last_toggle: Option<Instant>,
    tap_down: bool,
    buttons: ButtonTracker,
}

impl KeyboardEmulator {
    fn steer(&mut self, steering: f32, cfg: &AppConfig, sink: &mut OutputSink) {
        let (left, right) = (cfg.steer_left_key, cfg.steer_right_key);
        if steering.abs() < cfg.keyboard_steer_threshold || steering == 0.0 {
            sink.release(left);
            sink.release(right);
            return;
        }
        let (toward, away) = if steering > 0.0 {
            (right, left)
        } else {
            (left, right)
        };

        if !cfg.keyboard_steering_lfo {
            sink.press(toward);
            sink.release(away);
            return;
        }

        // Tap faster the harder the wheel is turned.
        let frequency =
            cfg.keyboard_steering_frequency * (LFO_MIN_FACTOR + steering.abs() * LFO_FACTOR_SPAN);
        let period = 1.0 / frequency;
        let due = self
            .last_toggle
            .is_none_or(|t| sink.now.duration_since(t).as_secs_f32() >= period);
        if !due {
            return;
        }
        self.last_toggle = Some(sink.now);
        self.tap_down = !self.tap_down;
        if self.tap_down {
            sink.press(toward);
            sink.release(away);
        } else {
            sink.release(left);
            sink.release(right);
        }
    }
}

impl OutputEmulator for KeyboardEmulator {
    fn apply(&mut self, input: &NormalizedInput, cfg: &AppConfig, sink: &mut OutputSink) {
        self.steer(input.steering, cfg, sink);
        route_pedal_keys(input, cfg, sink);
        self.buttons.route(input, cfg, sink, None);
    }

    fn deactivate(&mut self, cfg: &AppConfig, sink: &mut OutputSink) {
        release_mode_keys(cfg, sink);
        self.last_toggle = None;
        self.tap_down = false;
        self.buttons.reset();
    }
}

/// Steering and pedals as analog axes on a virtual Xbox controller.
#[derive(Debug, Default)]
pub struct VirtualControllerEmulator {
    report: PadReport,
    buttons: ButtonTracker,
    warned_missing: bool,
}

impl VirtualControllerEmulator {
    pub fn report(&self) -> &PadReport {
        &self.report
    }
}

impl OutputEmulator for VirtualControllerEmulator {
    fn apply(&mut self, input: &NormalizedInput, cfg: &AppConfig, sink: &mut OutputSink) {
        if !sink.has_pad() {
            if !self.warned_missing {
                warn!("Virtual controller not connected!");
                self.warned_missing = true;
            }
            return;
        }

        let steering = (input.steering * cfg.controller_steering_range).clamp(-1.0, 1.0);
        let (idle, stick) = match cfg.controller_stick {
            Stick::Left => (Stick::Right, Stick::Left),
            Stick::Right => (Stick::Left, Stick::Right),
        };
        self.report.set_stick(idle, 0.0, 0.0);
        match cfg.controller_pedal_axis {
            PedalAxis::Triggers => {
                self.report.set_stick(stick, steering, 0.0);
                self.report.set_triggers(input.brake, input.throttle);
            }
            PedalAxis::StickY => {
                self.report
                    .set_stick(stick, steering, input.throttle - input.brake);
                self.report.set_triggers(0.0, 0.0);
            }
        }

        self.buttons.route(input, cfg, sink, Some(&mut self.report));

        if let Some(pad) = sink.pad() {
            if let Err(e) = pad.commit(&self.report) {
                warn!("Error updating virtual controller: {e}");
            }
        }
    }

    fn deactivate(&mut self, _cfg: &AppConfig, sink: &mut OutputSink) {
        self.report = PadReport::default();
        self.buttons.reset();
        self.warned_missing = false;
        sink.reset_pad();
    }
}
