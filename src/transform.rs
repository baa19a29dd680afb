//! Raw wheel state to normalized control signals.
//!
//! Everything here is a pure function of `(RawDeviceState, AppConfig)`.

use crate::{
    config::AppConfig,
    constants::{RAW_AXIS_MAX, WHEEL_HARDWARE_RANGE_DEG},
    device::{Dpad, RawDeviceState},
};

/// Steering in [-1, 1], pedals in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedInput {
    pub steering: f32,
    pub throttle: f32,
    pub brake: f32,
    pub clutch: f32,
    pub buttons: u32,
    pub dpad: Dpad,
}

impl NormalizedInput {
    pub fn neutral() -> Self {
        Self::default()
    }
}

fn unit(raw: i16) -> f32 {
    (raw as f32 / RAW_AXIS_MAX).clamp(-1.0, 1.0)
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

/// Zero inside `deadzone`, outside it the remaining range is stretched back
/// to the full [-1, 1] with the sign preserved.
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    let deadzone = deadzone.clamp(0.0, 0.99);
    if value.abs() < deadzone || value == 0.0 {
        return 0.0;
    }
    let magnitude = ((value.abs() - deadzone) / (1.0 - deadzone)).clamp(0.0, 1.0);
    value.signum() * magnitude
}

/// Raise the magnitude to `exponent`, keeping the sign.
pub fn apply_curve(value: f32, exponent: f32) -> f32 {
    if exponent == 1.0 {
        return value;
    }
    value.signum() * value.abs().powf(exponent)
}

pub fn normalize_steering(raw: i16, cfg: &AppConfig) -> f32 {
    // Deadzone works on the physical wheel angle, the lock only afterwards.
    let v = apply_deadzone(unit(raw), cfg.steering_deadzone);
    let lock = (WHEEL_HARDWARE_RANGE_DEG / cfg.steering_range_degrees).max(1.0);
    let v = (v * finite_or_zero(lock)).clamp(-1.0, 1.0);
    let v = apply_curve(v, cfg.steering_curve_exponent) * cfg.steering_sensitivity;
    let v = finite_or_zero(v).clamp(-1.0, 1.0);
    if cfg.invert_steering && v != 0.0 { -v } else { v }
}

pub fn normalize_pedal(raw: i16, cfg: &AppConfig) -> f32 {
    let v = unit(raw);
    let pressed = if cfg.pedals_rest_high {
        (1.0 - v) / 2.0
    } else {
        (1.0 + v) / 2.0
    };
    let p = apply_deadzone(pressed.clamp(0.0, 1.0), cfg.pedal_deadzone);
    finite_or_zero(apply_curve(p, cfg.pedal_curve_exponent)).clamp(0.0, 1.0)
}

pub fn transform(raw: &RawDeviceState, cfg: &AppConfig) -> NormalizedInput {
    let mut brake = normalize_pedal(raw.brake, cfg);
    let mut clutch = normalize_pedal(raw.clutch, cfg);
    if cfg.swap_brake_clutch {
        std::mem::swap(&mut brake, &mut clutch);
    }

    NormalizedInput {
        steering: normalize_steering(raw.steering, cfg),
        throttle: normalize_pedal(raw.throttle, cfg),
        brake,
        clutch,
        buttons: raw.buttons,
        dpad: raw.dpad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg_with_deadzone(deadzone: f32) -> AppConfig {
        AppConfig {
            steering_deadzone: deadzone,
            ..AppConfig::default()
        }
    }

    fn deadzone_raw_bound(deadzone: f32) -> i16 {
        // Largest raw magnitude still strictly inside the band.
        ((deadzone * RAW_AXIS_MAX).floor() as i16 - 1).max(0)
    }

    #[test]
    fn centered_wheel_with_ten_percent_deadzone_is_neutral() {
        assert_eq!(normalize_steering(0, &cfg_with_deadzone(0.10)), 0.0);
    }

    #[test]
    fn full_right_lock_is_one() {
        let cfg = AppConfig {
            steering_sensitivity: 1.0,
            invert_steering: false,
            ..AppConfig::default()
        };
        assert_eq!(normalize_steering(i16::MAX, &cfg), 1.0);
        assert_eq!(normalize_steering(i16::MIN, &cfg), -1.0);
    }

    #[test]
    fn deadzone_rescales_the_remaining_range() {
        assert_eq!(apply_deadzone(0.05, 0.1), 0.0);
        assert!((apply_deadzone(0.55, 0.1) - 0.5).abs() < 1e-6);
        assert!((apply_deadzone(-0.55, 0.1) + 0.5).abs() < 1e-6);
        assert_eq!(apply_deadzone(1.0, 0.1), 1.0);
    }

    #[test]
    fn smaller_steering_range_reaches_full_lock_earlier() {
        let cfg = AppConfig {
            steering_range_degrees: 450.0,
            steering_deadzone: 0.0,
            ..AppConfig::default()
        };
        let half = i16::MAX / 2;
        assert!((normalize_steering(half, &cfg) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn deadzone_holds_with_a_reduced_steering_range() {
        let cfg = AppConfig {
            steering_range_degrees: 450.0,
            ..cfg_with_deadzone(0.10)
        };
        // 8% of full scale, inside the 10% band.
        assert_eq!(normalize_steering(2621, &cfg), 0.0);
        assert_eq!(normalize_steering(-2621, &cfg), 0.0);
        assert!(normalize_steering(4000, &cfg) > 0.0);
    }

    #[test]
    fn curve_exponent_softens_small_inputs() {
        let cfg = AppConfig {
            steering_curve_exponent: 2.0,
            steering_deadzone: 0.0,
            ..AppConfig::default()
        };
        let half = normalize_steering(i16::MAX / 2, &cfg);
        assert!((half - 0.25).abs() < 1e-3, "got {half}");
    }

    #[test]
    fn g29_pedals_rest_high_and_press_low() {
        let cfg = AppConfig {
            pedal_deadzone: 0.0,
            ..AppConfig::default()
        };
        assert_eq!(normalize_pedal(i16::MAX, &cfg), 0.0);
        assert_eq!(normalize_pedal(i16::MIN, &cfg), 1.0);
        assert!((normalize_pedal(0, &cfg) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn swap_brake_clutch_exchanges_the_pedals() {
        let raw = RawDeviceState {
            brake: i16::MIN,
            ..RawDeviceState::at_rest(true)
        };
        let cfg = AppConfig {
            swap_brake_clutch: true,
            ..AppConfig::default()
        };
        let input = transform(&raw, &cfg);
        assert_eq!(input.brake, 0.0);
        assert_eq!(input.clutch, 1.0);
    }

    #[test]
    fn resting_wheel_transforms_to_neutral() {
        let input = transform(&RawDeviceState::at_rest(true), &AppConfig::default());
        assert_eq!(input, NormalizedInput::neutral());
    }

    proptest! {
        #[test]
        fn prop_inside_deadzone_is_exactly_neutral(
            deadzone in 0.01f32..0.5,
            frac in 0.0f32..1.0,
            negative in any::<bool>(),
            range in 180.0f32..=900.0,
        ) {
            let bound = deadzone_raw_bound(deadzone);
            let mut raw = (bound as f32 * frac) as i16;
            if negative { raw = -raw; }
            let cfg = AppConfig {
                steering_range_degrees: range,
                ..cfg_with_deadzone(deadzone)
            };
            prop_assert_eq!(normalize_steering(raw, &cfg), 0.0);
        }

        #[test]
        fn prop_outputs_stay_in_range(
            raw in any::<[i16; 4]>(),
            sensitivity in 0.1f32..3.0,
            exponent in 0.2f32..5.0,
            deadzone in 0.0f32..0.5,
            range in 180.0f32..900.0,
            rest_high in any::<bool>(),
        ) {
            let cfg = AppConfig {
                steering_sensitivity: sensitivity,
                steering_curve_exponent: exponent,
                steering_deadzone: deadzone,
                steering_range_degrees: range,
                pedal_curve_exponent: exponent,
                pedal_deadzone: deadzone,
                pedals_rest_high: rest_high,
                ..AppConfig::default()
            };
            let state = RawDeviceState {
                steering: raw[0],
                throttle: raw[1],
                brake: raw[2],
                clutch: raw[3],
                ..RawDeviceState::at_rest(rest_high)
            };
            let input = transform(&state, &cfg);
            prop_assert!((-1.0..=1.0).contains(&input.steering));
            for pedal in [input.throttle, input.brake, input.clutch] {
                prop_assert!((0.0..=1.0).contains(&pedal));
            }
        }

        #[test]
        fn prop_invert_negates_sign_only(raw in any::<i16>(), sensitivity in 0.1f32..3.0) {
            let plain = AppConfig {
                steering_sensitivity: sensitivity,
                ..AppConfig::default()
            };
            let inverted = AppConfig {
                invert_steering: true,
                ..plain.clone()
            };
            let a = normalize_steering(raw, &plain);
            let b = normalize_steering(raw, &inverted);
            prop_assert_eq!(a, -b);
            if a != 0.0 {
                prop_assert_eq!(a.signum(), -b.signum());
            }
        }
    }
}
