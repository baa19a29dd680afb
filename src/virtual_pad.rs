//! Virtual Xbox 360 controller over the ViGEmBus driver.
//!
//! Only Windows has a backend; elsewhere the capability probe reports the
//! controller as unavailable and the dispatcher never selects it.

use std::{fmt, str::FromStr, thread, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    constants::{PAD_STICK_MAX, PAD_TRIGGER_MAX},
    error::VirtualControllerError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadButton {
    A,
    B,
    X,
    Y,
    Lb,
    Rb,
    Start,
    Back,
}

impl PadButton {
    /// XUSB button bit, as laid out in the XInput gamepad report.
    pub fn mask(self) -> u16 {
        match self {
            PadButton::Start => 0x0010,
            PadButton::Back => 0x0020,
            PadButton::Lb => 0x0100,
            PadButton::Rb => 0x0200,
            PadButton::A => 0x1000,
            PadButton::B => 0x2000,
            PadButton::X => 0x4000,
            PadButton::Y => 0x8000,
        }
    }
}

impl FromStr for PadButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" => Ok(PadButton::A),
            "b" => Ok(PadButton::B),
            "x" => Ok(PadButton::X),
            "y" => Ok(PadButton::Y),
            "lb" => Ok(PadButton::Lb),
            "rb" => Ok(PadButton::Rb),
            "start" => Ok(PadButton::Start),
            "back" => Ok(PadButton::Back),
            _ => Err(format!("unknown controller button '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stick {
    #[default]
    Left,
    Right,
}

impl fmt::Display for Stick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stick::Left => f.write_str("Left Stick"),
            Stick::Right => f.write_str("Right Stick"),
        }
    }
}

/// The full analog/digital state written to the pad on each commit.
/// Sticks are in [-1, 1], triggers in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PadReport {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub buttons: u16,
}

impl PadReport {
    pub fn set_stick(&mut self, stick: Stick, x: f32, y: f32) {
        let (x, y) = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
        match stick {
            Stick::Left => (self.left_x, self.left_y) = (x, y),
            Stick::Right => (self.right_x, self.right_y) = (x, y),
        }
    }

    pub fn set_triggers(&mut self, left: f32, right: f32) {
        self.left_trigger = left.clamp(0.0, 1.0);
        self.right_trigger = right.clamp(0.0, 1.0);
    }

    pub fn set_button(&mut self, button: PadButton, pressed: bool) {
        if pressed {
            self.buttons |= button.mask();
        } else {
            self.buttons &= !button.mask();
        }
    }

    pub fn stick_raw(value: f32) -> i16 {
        (value.clamp(-1.0, 1.0) * PAD_STICK_MAX).round() as i16
    }

    pub fn trigger_raw(value: f32) -> u8 {
        (value.clamp(0.0, 1.0) * PAD_TRIGGER_MAX).round() as u8
    }
}

/// A connected virtual gamepad.
pub trait VirtualPad {
    /// Send `report` to the driver.
    fn commit(&mut self, report: &PadReport) -> Result<(), VirtualControllerError>;

    fn reset(&mut self) -> Result<(), VirtualControllerError> {
        self.commit(&PadReport::default())
    }
}

#[cfg(windows)]
mod vigem {
    use vigem_client::{Client, TargetId, XButtons, XGamepad, Xbox360Wired};

    use super::{PadReport, VirtualPad};
    use crate::error::VirtualControllerError;

    pub struct ViGEmPad {
        target: Xbox360Wired<Client>,
    }

    impl ViGEmPad {
        pub fn connect() -> Result<Self, VirtualControllerError> {
            let client = Client::connect()
                .map_err(|e| VirtualControllerError::Unavailable(e.to_string()))?;
            let mut target = Xbox360Wired::new(client, TargetId::XBOX360_WIRED);
            target
                .plugin()
                .map_err(|e| VirtualControllerError::Driver(e.to_string()))?;
            target
                .wait_ready()
                .map_err(|e| VirtualControllerError::Driver(e.to_string()))?;
            Ok(Self { target })
        }
    }

    impl VirtualPad for ViGEmPad {
        fn commit(&mut self, report: &PadReport) -> Result<(), VirtualControllerError> {
            let gamepad = XGamepad {
                buttons: XButtons { raw: report.buttons },
                left_trigger: PadReport::trigger_raw(report.left_trigger),
                right_trigger: PadReport::trigger_raw(report.right_trigger),
                thumb_lx: PadReport::stick_raw(report.left_x),
                thumb_ly: PadReport::stick_raw(report.left_y),
                thumb_rx: PadReport::stick_raw(report.right_x),
                thumb_ry: PadReport::stick_raw(report.right_y),
            };
            self.target
                .update(&gamepad)
                .map_err(|e| VirtualControllerError::Driver(e.to_string()))
        }
    }

    impl Drop for ViGEmPad {
        fn drop(&mut self) {
            let _ = self.reset();
            let _ = self.target.unplug();
        }
    }

    pub fn probe() -> Result<(), VirtualControllerError> {
        Client::connect()
            .map(drop)
            .map_err(|e| VirtualControllerError::Unavailable(e.to_string()))
    }
}

/// Plug in a new virtual controller.
pub fn connect() -> Result<Box<dyn VirtualPad>, VirtualControllerError> {
    #[cfg(windows)]
    {
        Ok(Box::new(vigem::ViGEmPad::connect()?))
    }
    #[cfg(not(windows))]
    {
        Err(VirtualControllerError::Unavailable(
            "ViGEmBus is only available on Windows".into(),
        ))
    }
}

/// One-shot check whether the driver is installed. Called at startup and on
/// explicit reconnect, never from the polling loop.
pub fn probe_virtual_controller() -> Result<(), VirtualControllerError> {
    #[cfg(windows)]
    {
        vigem::probe()
    }
    #[cfg(not(windows))]
    {
        Err(VirtualControllerError::Unavailable(
            "ViGEmBus is only available on Windows".into(),
        ))
    }
}

/// Sweep the left stick and pulse both triggers so the pad shows up as active
/// in the OS game controller panel.
pub fn run_self_test(pad: &mut dyn VirtualPad) -> Result<(), VirtualControllerError> {
    info!("Testing virtual controller steering...");
    let mut report = PadReport::default();
    for _ in 0..5 {
        for (x, hold_ms) in [(0.5, 200), (0.0, 100), (-0.5, 200), (0.0, 100)] {
            report.set_stick(Stick::Left, x, 0.0);
            pad.commit(&report)?;
            thread::sleep(Duration::from_millis(hold_ms));
        }
    }

    info!("Testing virtual controller triggers...");
    for (left, right) in [(0.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
        report.set_triggers(left, right);
        pad.commit(&report)?;
        thread::sleep(Duration::from_millis(500));
    }

    pad.reset()?;
    info!("Virtual controller test completed");
    Ok(())
}

/// Connect a temporary pad and run [`run_self_test`] on it.
pub fn self_test() -> Result<(), VirtualControllerError> {
    let mut pad = connect()?;
    let result = run_self_test(pad.as_mut());
    if let Err(e) = &result {
        warn!("Virtual controller test failed: {e}");
    }
    result
}
