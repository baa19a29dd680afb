use std::time::Instant;

use tracing::{info, warn};

use crate::{
    config::{AppConfig, Capabilities, ControlMode},
    emulators::{
        HybridEmulator, KeyboardEmulator, MouseEmulator, OutputEmulator,
        VirtualControllerEmulator,
    },
    output::OutputSink,
    transform::NormalizedInput,
    virtual_pad::{PadReport, VirtualPad},
};

/// Resolve the mode to start in. The only automatic transition: a saved
/// virtual controller mode falls back to mouse when the driver is missing.
pub fn startup_mode(requested: ControlMode, caps: Capabilities) -> ControlMode {
    if requested == ControlMode::VirtualController && !caps.virtual_controller {
        ControlMode::Mouse
    } else {
        requested
    }
}

#[derive(Default)]
struct Emulators {
    mouse: MouseEmulator,
    keyboard: KeyboardEmulator,
    controller: VirtualControllerEmulator,
    hybrid: HybridEmulator,
}

impl Emulators {
    fn get(&mut self, mode: ControlMode) -> &mut dyn OutputEmulator {
        match mode {
            ControlMode::Mouse => &mut self.mouse,
            ControlMode::VirtualController => &mut self.controller,
            ControlMode::Keyboard => &mut self.keyboard,
            ControlMode::Hybrid => &mut self.hybrid,
        }
    }
}

/// Routes each tick's input to the emulator for the active mode.
pub struct Dispatcher {
    mode: ControlMode,
    caps: Capabilities,
    sink: OutputSink,
    emulators: Emulators,
    ticked: bool,
}

impl Dispatcher {
    pub fn new(mode: ControlMode, caps: Capabilities, sink: OutputSink) -> Self {
        let mode = startup_mode(mode, caps);
        info!("Control mode: {mode}");
        Self {
            mode,
            caps,
            sink,
            emulators: Emulators::default(),
            ticked: false,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Switch modes; takes effect on the next [`Dispatcher::tick`]. Returns the
    /// mode actually in effect.
    pub fn set_mode(&mut self, mode: ControlMode, cfg: &AppConfig) -> ControlMode {
        if mode == self.mode {
            return self.mode;
        }
        if mode == ControlMode::VirtualController && !self.caps.virtual_controller {
            warn!("Virtual controller unavailable, staying in {}", self.mode);
            return self.mode;
        }
        self.idle(cfg);
        info!("Control mode changed: {} -> {mode}", self.mode);
        self.mode = mode;
        self.mode
    }

    /// Mark the virtual controller as gone, e.g. when the pad could not be
    /// plugged in on the polling thread. Only before the first tick does this
    /// change the mode; later the controller emulator just stays idle.
    pub fn virtual_controller_failed(&mut self, cfg: &AppConfig) {
        if self.mode == ControlMode::VirtualController {
            self.idle(cfg);
            if self.ticked {
                warn!("Virtual controller unavailable, controller output paused");
            } else {
                warn!("Virtual controller unavailable, falling back to mouse steering");
                self.mode = ControlMode::Mouse;
            }
        }
        self.caps.virtual_controller = false;
        self.sink.detach_pad();
    }

    pub fn has_pad(&self) -> bool {
        self.sink.has_pad()
    }

    pub fn attach_pad(&mut self, pad: Box<dyn VirtualPad>) {
        self.sink.attach_pad(pad);
    }

    /// Hand one tick of input to the active emulator, and only that one.
    pub fn tick(&mut self, input: &NormalizedInput, cfg: &AppConfig) {
        self.sink.now = Instant::now();
        self.ticked = true;
        self.emulators
            .get(self.mode)
            .apply(input, cfg, &mut self.sink);
    }

    /// Release everything held and neutralize the pad.
    pub fn idle(&mut self, cfg: &AppConfig) {
        self.emulators
            .get(self.mode)
            .deactivate(cfg, &mut self.sink);
        self.sink.release_all();
    }

    /// Residual synthetic mouse offset of the active mouse-style emulator.
    pub fn mouse_offset(&self) -> i64 {
        match self.mode {
            ControlMode::Hybrid => self.emulators.hybrid.mouse().centering().offset(),
            _ => self.emulators.mouse.centering().offset(),
        }
    }

    pub fn pad_report(&self) -> PadReport {
        *self.emulators.controller.report()
    }

    #[cfg(test)]
    fn sink(&self) -> &OutputSink {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        output::{
            testing::{Injected, Recorder},
            KeyName,
        },
        virtual_pad::testing::PadRecorder,
    };

    const WITH_PAD: Capabilities = Capabilities {
        virtual_controller: true,
    };
    const NO_PAD: Capabilities = Capabilities {
        virtual_controller: false,
    };

    fn dispatcher(mode: ControlMode, caps: Capabilities) -> (Dispatcher, Recorder, PadRecorder) {
        let rec = Recorder::default();
        let pad = PadRecorder::default();
        let pad_box: Option<Box<dyn crate::virtual_pad::VirtualPad>> = if caps.virtual_controller {
            Some(Box::new(pad.clone()))
        } else {
            None
        };
        let sink = OutputSink::new(Box::new(rec.clone()), pad_box);
        (Dispatcher::new(mode, caps, sink), rec, pad)
    }

    fn turning(steering: f32) -> NormalizedInput {
        NormalizedInput {
            steering,
            throttle: 0.5,
            ..NormalizedInput::neutral()
        }
    }

    fn moves(events: &[Injected]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, Injected::Move(_)))
            .count()
    }

    fn key_presses(events: &[Injected]) -> Vec<KeyName> {
        events
            .iter()
            .filter_map(|e| match e {
                Injected::Key(k, true) => Some(*k),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn startup_without_driver_falls_back_to_mouse() {
        assert_eq!(
            startup_mode(ControlMode::VirtualController, NO_PAD),
            ControlMode::Mouse
        );
        assert_eq!(
            startup_mode(ControlMode::VirtualController, WITH_PAD),
            ControlMode::VirtualController
        );
        assert_eq!(startup_mode(ControlMode::Keyboard, NO_PAD), ControlMode::Keyboard);

        let (d, _, _) = dispatcher(ControlMode::VirtualController, NO_PAD);
        assert_eq!(d.mode(), ControlMode::Mouse);
        assert!(!d.capabilities().virtual_controller);
    }

    #[test]
    fn mouse_mode_only_drives_the_mouse_path() {
        let cfg = AppConfig::default();
        let (mut d, rec, pad) = dispatcher(ControlMode::Mouse, WITH_PAD);
        for _ in 0..5 {
            d.tick(&turning(0.8), &cfg);
        }
        let events = rec.take();
        assert!(moves(&events) > 0);
        assert_eq!(key_presses(&events), vec![cfg.throttle_key]);
        assert!(pad.take().is_empty());
    }

    #[test]
    fn hybrid_mode_matches_mouse_mode() {
        let cfg = AppConfig::default();
        let (mut mouse, mouse_rec, _) = dispatcher(ControlMode::Mouse, NO_PAD);
        let (mut hybrid, hybrid_rec, _) = dispatcher(ControlMode::Hybrid, NO_PAD);
        for s in [0.2, 0.9, 0.9, -0.4, 0.0, 0.0] {
            mouse.tick(&turning(s), &cfg);
            hybrid.tick(&turning(s), &cfg);
        }
        assert_eq!(mouse_rec.take(), hybrid_rec.take());
        assert_eq!(mouse.mouse_offset(), hybrid.mouse_offset());
    }

    #[test]
    fn keyboard_mode_only_drives_keys() {
        let cfg = AppConfig::default();
        let (mut d, rec, pad) = dispatcher(ControlMode::Keyboard, WITH_PAD);
        d.tick(&turning(0.6), &cfg);

        let events = rec.take();
        assert_eq!(moves(&events), 0);
        assert!(pad.take().is_empty());
        assert!(d.sink().is_held(cfg.steer_right_key));
        assert!(!d.sink().is_held(cfg.steer_left_key));
    }

    #[test]
    fn virtual_controller_mode_only_drives_the_pad() {
        let cfg = AppConfig::default();
        let (mut d, rec, pad) = dispatcher(ControlMode::VirtualController, WITH_PAD);
        d.tick(&turning(0.6), &cfg);
        d.tick(&turning(0.6), &cfg);

        assert!(rec.take().is_empty());
        assert_eq!(pad.take().len(), 2);
        assert_eq!(d.pad_report().left_x, 0.6);
    }

    #[test]
    fn mode_change_releases_previous_keys_and_applies_next_tick() {
        let cfg = AppConfig::default();
        let (mut d, rec, pad) = dispatcher(ControlMode::Keyboard, WITH_PAD);
        d.tick(&turning(0.6), &cfg);
        assert!(d.sink().is_held(cfg.steer_right_key));
        rec.take();

        assert_eq!(
            d.set_mode(ControlMode::VirtualController, &cfg),
            ControlMode::VirtualController
        );
        assert!(!d.sink().is_held(cfg.steer_right_key));
        assert!(!d.sink().is_held(cfg.throttle_key));
        let released = rec.take();
        assert!(released.contains(&Injected::Key(cfg.steer_right_key, false)));
        assert!(pad.take().is_empty());

        d.tick(&turning(0.6), &cfg);
        assert_eq!(pad.take().len(), 1);
        assert!(rec.take().is_empty());
    }

    #[test]
    fn switching_to_missing_virtual_controller_is_refused() {
        let cfg = AppConfig::default();
        let (mut d, _, _) = dispatcher(ControlMode::Keyboard, NO_PAD);
        assert_eq!(
            d.set_mode(ControlMode::VirtualController, &cfg),
            ControlMode::Keyboard
        );
    }

    #[test]
    fn pad_failure_before_the_first_tick_falls_back_to_mouse() {
        let cfg = AppConfig::default();
        let (mut d, _, _) = dispatcher(ControlMode::VirtualController, WITH_PAD);
        d.virtual_controller_failed(&cfg);
        assert_eq!(d.mode(), ControlMode::Mouse);
        assert!(!d.capabilities().virtual_controller);
    }

    #[test]
    fn losing_the_pad_mid_session_keeps_the_mode() {
        let cfg = AppConfig::default();
        let (mut d, rec, pad) = dispatcher(ControlMode::VirtualController, WITH_PAD);
        d.tick(&turning(0.3), &cfg);
        pad.take();

        d.virtual_controller_failed(&cfg);
        assert_eq!(d.mode(), ControlMode::VirtualController);
        assert!(!d.capabilities().virtual_controller);
        assert!(!d.has_pad());
        // Only neutral reports on the way out.
        let commits = pad.take();
        assert!(!commits.is_empty());
        assert!(commits.iter().all(|r| *r == PadReport::default()));

        d.tick(&turning(0.3), &cfg);
        assert!(pad.take().is_empty());
        assert!(rec.take().is_empty());
    }
}
