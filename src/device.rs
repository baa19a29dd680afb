//! Wheel polling through gilrs.

use gilrs::{Button, GamepadId, Gilrs};
use tracing::{debug, info};

use crate::{
    config::AxisMap,
    constants::{RAW_AXIS_MAX, WHEEL_NAME_HINTS},
    error::DeviceError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dpad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// One poll's worth of wheel state, in device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDeviceState {
    pub steering: i16,
    pub throttle: i16,
    pub brake: i16,
    pub clutch: i16,
    /// Bit `n` set while wheel button `n` is held.
    pub buttons: u32,
    pub dpad: Dpad,
}

impl RawDeviceState {
    /// Wheel centered, pedals released.
    pub fn at_rest(pedals_rest_high: bool) -> Self {
        let pedal = if pedals_rest_high { i16::MAX } else { i16::MIN };
        Self {
            steering: 0,
            throttle: pedal,
            brake: pedal,
            clutch: pedal,
            buttons: 0,
            dpad: Dpad::default(),
        }
    }

    pub fn is_pressed(&self, button: u8) -> bool {
        button < 32 && self.buttons & (1 << button) != 0
    }
}

/// Quantize a backend axis value in [-1, 1] to device units.
pub fn quantize_axis(value: f32) -> i16 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * RAW_AXIS_MAX).round() as i16
}

// Linux reports joystick buttons from BTN_JOYSTICK upward.
#[cfg(target_os = "linux")]
const BUTTON_CODE_BASE: u32 = 0x120;
#[cfg(not(target_os = "linux"))]
const BUTTON_CODE_BASE: u32 = 0;

/// Native axis or button number carried in the low half of a backend code.
/// gilrs only lists codes that have produced an event, so elements are
/// looked up by this number rather than by position.
fn native_index(code: u32) -> u32 {
    code & 0xFFFF
}

/// Value of device axis `index`, if that axis has reported yet.
fn axis_value(axes: &[(u32, f32)], index: usize) -> Option<i16> {
    axes.iter()
        .find(|(code, _)| native_index(*code) as usize == index)
        .map(|(_, v)| quantize_axis(*v))
}

/// Bit `n` set for every held button whose native number is `n`.
fn button_bits(buttons: &[(u32, bool)]) -> u32 {
    buttons
        .iter()
        .filter(|(_, pressed)| *pressed)
        .filter_map(|(code, _)| native_index(*code).checked_sub(BUTTON_CODE_BASE))
        .filter(|n| *n < 32)
        .fold(0u32, |acc, n| acc | (1 << n))
}

pub trait WheelSource {
    /// Non-blocking read of the current wheel state.
    fn poll(&mut self) -> Result<RawDeviceState, DeviceError>;
    fn name(&self) -> &str;

    /// Pick up axis layout changes from a new config.
    fn configure(&mut self, _axis_map: AxisMap, _pedals_rest_high: bool) {}
}

pub struct GilrsWheel {
    gilrs: Gilrs,
    id: GamepadId,
    name: String,
    axis_map: AxisMap,
    pedals_rest_high: bool,
}

fn is_wheel_name(name: &str) -> bool {
    let name = name.to_lowercase();
    WHEEL_NAME_HINTS.iter().any(|hint| name.contains(hint))
}

impl GilrsWheel {
    /// Find the first connected G29/Logitech wheel.
    pub fn open(axis_map: AxisMap, pedals_rest_high: bool) -> Result<Self, DeviceError> {
        let gilrs = Gilrs::new().map_err(|e| DeviceError::Init(e.to_string()))?;
        let (id, name) = gilrs
            .gamepads()
            .find(|(_, pad)| is_wheel_name(pad.name()))
            .map(|(id, pad)| (id, pad.name().to_string()))
            .ok_or(DeviceError::Unavailable)?;

        info!("Found G29 wheel: {name} (id {id:?})");
        Ok(Self {
            gilrs,
            id,
            name,
            axis_map,
            pedals_rest_high,
        })
    }
}

impl WheelSource for GilrsWheel {
    fn poll(&mut self) -> Result<RawDeviceState, DeviceError> {
        // Draining events is what keeps gilrs' cached state current.
        while let Some(ev) = self.gilrs.next_event() {
            if ev.id == self.id {
                debug!("Wheel event: {:?}", ev.event);
            }
        }

        let pad = self
            .gilrs
            .connected_gamepad(self.id)
            .ok_or_else(|| DeviceError::Disconnected(self.name.clone()))?;

        let state = pad.state();
        let axes: Vec<(u32, f32)> = state
            .axes()
            .map(|(code, data)| (code.into_u32(), data.value()))
            .collect();
        let buttons: Vec<(u32, bool)> = state
            .buttons()
            .map(|(code, data)| (code.into_u32(), data.is_pressed()))
            .collect();

        let rest = RawDeviceState::at_rest(self.pedals_rest_high);
        let axis = |index: usize, fallback: i16| axis_value(&axes, index).unwrap_or(fallback);

        Ok(RawDeviceState {
            steering: axis(self.axis_map.steering, rest.steering),
            throttle: axis(self.axis_map.throttle, rest.throttle),
            brake: axis(self.axis_map.brake, rest.brake),
            clutch: axis(self.axis_map.clutch, rest.clutch),
            buttons: button_bits(&buttons),
            dpad: Dpad {
                up: pad.is_pressed(Button::DPadUp),
                down: pad.is_pressed(Button::DPadDown),
                left: pad.is_pressed(Button::DPadLeft),
                right: pad.is_pressed(Button::DPadRight),
            },
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, axis_map: AxisMap, pedals_rest_high: bool) {
        self.axis_map = axis_map;
        self.pedals_rest_high = pedals_rest_high;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_covers_the_full_range() {
        assert_eq!(quantize_axis(0.0), 0);
        assert_eq!(quantize_axis(1.0), i16::MAX);
        assert_eq!(quantize_axis(-1.0), -i16::MAX);
        assert_eq!(quantize_axis(5.0), i16::MAX);
        assert_eq!(quantize_axis(f32::NAN), 0);
    }

    #[test]
    fn wheel_names_are_matched_case_insensitively() {
        assert!(is_wheel_name("Logitech G29 Driving Force Racing Wheel"));
        assert!(is_wheel_name("G29 Driving Force"));
        assert!(!is_wheel_name("Xbox Wireless Controller"));
    }

    #[test]
    fn button_bits_are_indexed_from_zero() {
        let state = RawDeviceState {
            buttons: 0b1001,
            ..RawDeviceState::at_rest(true)
        };
        assert!(state.is_pressed(0));
        assert!(!state.is_pressed(1));
        assert!(state.is_pressed(3));
        assert!(!state.is_pressed(40));
    }

    const AXIS_KIND: u32 = 3 << 16;
    const BUTTON_KIND: u32 = 1 << 16;

    #[test]
    fn axes_are_read_by_device_number_not_by_arrival() {
        // Steering and brake have moved, throttle has not.
        let axes = [(AXIS_KIND | 2, -1.0), (AXIS_KIND, 0.5)];
        let map = AxisMap::default();
        assert_eq!(axis_value(&axes, map.steering), Some(quantize_axis(0.5)));
        assert_eq!(axis_value(&axes, map.throttle), None);
        assert_eq!(axis_value(&axes, map.brake), Some(-i16::MAX));
        assert_eq!(axis_value(&axes, map.clutch), None);
    }

    #[test]
    fn button_bits_follow_the_button_code() {
        let code = |n: u32| BUTTON_KIND | (BUTTON_CODE_BASE + n);
        assert_eq!(button_bits(&[(code(5), true)]), 1 << 5);

        // A second button appearing does not renumber the first.
        let held = [(code(0), false), (code(5), true), (code(2), true)];
        assert_eq!(button_bits(&held), (1 << 5) | (1 << 2));

        assert_eq!(button_bits(&[(code(40), true)]), 0);
    }

    #[test]
    fn at_rest_puts_pedals_at_the_released_end() {
        assert_eq!(RawDeviceState::at_rest(true).throttle, i16::MAX);
        assert_eq!(RawDeviceState::at_rest(false).brake, i16::MIN);
    }
}
