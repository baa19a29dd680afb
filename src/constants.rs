use std::time::Duration;

// Polling
pub const TICK_INTERVAL: Duration = Duration::from_millis(16);

// Device discovery, matched against the lowercased gamepad name
pub const WHEEL_NAME_HINTS: &[&str] = &["g29", "logitech"];

// Raw axis range
pub const RAW_AXIS_MAX: f32 = i16::MAX as f32;
pub const WHEEL_HARDWARE_RANGE_DEG: f32 = 900.0;

// Pedal key threshold (normalized)
pub const PEDAL_PRESS_THRESHOLD: f32 = 0.1;

// Mouse steering
pub const MOUSE_SMOOTHING: f32 = 0.3;
pub const MOUSE_MOVE_THRESHOLD: f32 = 0.1;
pub const MOUSE_DELTA_SCALE: f32 = 10.0;
pub const MOUSE_NEUTRAL_BAND: f32 = 0.05;

// Keyboard steering LFO, tap rate multiplier spans 0.5x..2x
pub const LFO_MIN_FACTOR: f32 = 0.5;
pub const LFO_FACTOR_SPAN: f32 = 1.5;

// Virtual pad ranges
pub const PAD_STICK_MAX: f32 = i16::MAX as f32;
pub const PAD_TRIGGER_MAX: f32 = u8::MAX as f32;

// Config slider bounds
pub mod bounds {
    use std::ops::RangeInclusive;

    pub const STEERING_SENSITIVITY: RangeInclusive<f32> = 0.1..=3.0;
    pub const DEADZONE: RangeInclusive<f32> = 0.0..=0.5;
    pub const CURVE_EXPONENT: RangeInclusive<f32> = 0.2..=5.0;
    pub const STEERING_RANGE_DEG: RangeInclusive<f32> = 180.0..=900.0;
    pub const MOUSE_SENSITIVITY: RangeInclusive<f32> = 0.5..=10.0;
    pub const RETURN_SPEED: RangeInclusive<f32> = 0.01..=1.0;
    pub const STEER_THRESHOLD: RangeInclusive<f32> = 0.0..=0.9;
    pub const LFO_FREQUENCY: RangeInclusive<f32> = 5.0..=30.0;
    pub const CONTROLLER_RANGE: RangeInclusive<f32> = 0.1..=1.0;
}
