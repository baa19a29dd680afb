use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, path::PathBuf};
use tracing::{info, warn};

use crate::{
    constants::bounds,
    error::ConfigError,
    output::KeyName,
    virtual_pad::{PadButton, Stick},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    #[serde(rename = "mouse")]
    Mouse,
    #[serde(rename = "virtual_xbox")]
    VirtualController,
    #[serde(rename = "keyboard")]
    Keyboard,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl ControlMode {
    pub const ALL: [ControlMode; 4] = [
        ControlMode::Mouse,
        ControlMode::VirtualController,
        ControlMode::Keyboard,
        ControlMode::Hybrid,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ControlMode::Mouse => "Smooth analog steering via mouse movement",
            ControlMode::VirtualController => {
                "Creates virtual gamepad for native controller support"
            }
            ControlMode::Keyboard => "A/D keys for steering (less smooth)",
            ControlMode::Hybrid => "Mouse steering + keyboard pedals",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlMode::Mouse => "Mouse Steering (Analog)",
            ControlMode::VirtualController => "Virtual Xbox Controller",
            ControlMode::Keyboard => "Keyboard (A/D keys)",
            ControlMode::Hybrid => "Hybrid (Mouse + Keyboard)",
        })
    }
}

/// How pedals reach the virtual controller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PedalAxis {
    /// Throttle on the right trigger, brake on the left.
    #[default]
    Triggers,
    /// `throttle - brake` on the Y axis of the steering stick.
    StickY,
}

/// Device axis index for each wheel control, in the order the backend
/// reports them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct AxisMap {
    pub steering: usize,
    pub throttle: usize,
    pub brake: usize,
    pub clutch: usize,
}

impl Default for AxisMap {
    fn default() -> Self {
        Self {
            steering: 0,
            throttle: 1,
            brake: 2,
            clutch: 3,
        }
    }
}

/// A wheel button bound to a key, or in virtual controller mode to a pad
/// button when `action` names one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ButtonBinding {
    pub button: u8,
    pub action: String,
}

impl ButtonBinding {
    fn new(button: u8, action: &str) -> Self {
        Self {
            button,
            action: action.into(),
        }
    }

    pub fn key(&self) -> Option<KeyName> {
        self.action.parse().ok()
    }

    pub fn pad_button(&self) -> Option<PadButton> {
        self.action.parse().ok()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DpadKeys {
    pub up: KeyName,
    pub down: KeyName,
    pub left: KeyName,
    pub right: KeyName,
}

impl Default for DpadKeys {
    fn default() -> Self {
        Self {
            up: KeyName::Char('1'),
            down: KeyName::Char('2'),
            left: KeyName::Char('3'),
            right: KeyName::Char('4'),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub control_mode: ControlMode,

    // Steering
    pub steering_sensitivity: f32,
    pub steering_deadzone: f32,
    pub steering_curve_exponent: f32,
    pub steering_range_degrees: f32,
    pub invert_steering: bool,

    // Mouse
    pub mouse_sensitivity: f32,
    pub mouse_return_center: bool,
    pub mouse_return_speed: f32,

    // Pedals
    pub pedal_deadzone: f32,
    pub pedal_curve_exponent: f32,
    pub pedals_rest_high: bool,
    pub swap_brake_clutch: bool,

    // Keyboard
    pub throttle_key: KeyName,
    pub brake_key: KeyName,
    pub steer_left_key: KeyName,
    pub steer_right_key: KeyName,
    pub keyboard_steer_threshold: f32,
    pub keyboard_steering_lfo: bool,
    pub keyboard_steering_frequency: f32,

    // Virtual controller
    pub controller_steering_range: f32,
    pub controller_stick: Stick,
    pub controller_pedal_axis: PedalAxis,

    /// Only inject while the foreground window title contains this
    /// (case-insensitive). Empty disables the check.
    pub target_window: String,

    pub axis_map: AxisMap,
    pub button_mappings: Vec<ButtonBinding>,
    pub dpad_keys: DpadKeys,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::Mouse,
            steering_sensitivity: 1.0,
            steering_deadzone: 0.05,
            steering_curve_exponent: 1.0,
            steering_range_degrees: 900.0,
            invert_steering: false,
            mouse_sensitivity: 3.0,
            mouse_return_center: true,
            mouse_return_speed: 0.05,
            pedal_deadzone: 0.02,
            pedal_curve_exponent: 1.0,
            pedals_rest_high: true,
            swap_brake_clutch: false,
            throttle_key: KeyName::Char('w'),
            brake_key: KeyName::Char('s'),
            steer_left_key: KeyName::Char('a'),
            steer_right_key: KeyName::Char('d'),
            keyboard_steer_threshold: 0.02,
            keyboard_steering_lfo: false,
            keyboard_steering_frequency: 10.0,
            controller_steering_range: 1.0,
            controller_stick: Stick::Left,
            controller_pedal_axis: PedalAxis::Triggers,
            target_window: "roblox".into(),
            axis_map: AxisMap::default(),
            button_mappings: default_button_mappings(),
            dpad_keys: DpadKeys::default(),
        }
    }
}

fn default_button_mappings() -> Vec<ButtonBinding> {
    vec![
        ButtonBinding::new(0, "space"), // cross, handbrake
        ButtonBinding::new(1, "space"), // square
        ButtonBinding::new(2, "c"),     // circle
        ButtonBinding::new(3, "r"),     // triangle, look behind
        ButtonBinding::new(4, "e"),     // right paddle, shift up
        ButtonBinding::new(5, "q"),     // left paddle, shift down
        ButtonBinding::new(6, "r"),     // R2
        ButtonBinding::new(7, "f"),     // L2
        ButtonBinding::new(8, "tab"),   // share
        ButtonBinding::new(9, "esc"),   // options
        ButtonBinding::new(10, "ctrl"), // R3
        ButtonBinding::new(11, "shift"), // L3
        ButtonBinding::new(23, "f"),    // ignition
        ButtonBinding::new(24, "esc"),  // PS button
    ]
}

/// Runtime capabilities, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub virtual_controller: bool,
}

fn config_path() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("com", "G29Bridge", "G29Bridge")
        .map(|d| d.config_dir().join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let txt = fs::read_to_string(path)?;
        let mut cfg: Self = toml::from_str(&txt)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load the config, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        match config_path() {
            Ok(path) => Self::load_or_default_from(&path),
            Err(e) => {
                warn!("Error loading configuration, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn load_or_default_from(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Error loading configuration, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Clamp every tunable into its slider range and drop bindings that name
    /// neither a key nor a controller button.
    pub fn sanitize(&mut self) {
        fn clamp(v: &mut f32, range: std::ops::RangeInclusive<f32>, fallback: f32) {
            *v = if v.is_finite() {
                v.clamp(*range.start(), *range.end())
            } else {
                fallback
            };
        }

        let d = Self::default();
        clamp(&mut self.steering_sensitivity, bounds::STEERING_SENSITIVITY, d.steering_sensitivity);
        clamp(&mut self.steering_deadzone, bounds::DEADZONE, d.steering_deadzone);
        clamp(&mut self.steering_curve_exponent, bounds::CURVE_EXPONENT, d.steering_curve_exponent);
        clamp(&mut self.steering_range_degrees, bounds::STEERING_RANGE_DEG, d.steering_range_degrees);
        clamp(&mut self.mouse_sensitivity, bounds::MOUSE_SENSITIVITY, d.mouse_sensitivity);
        clamp(&mut self.mouse_return_speed, bounds::RETURN_SPEED, d.mouse_return_speed);
        clamp(&mut self.pedal_deadzone, bounds::DEADZONE, d.pedal_deadzone);
        clamp(&mut self.pedal_curve_exponent, bounds::CURVE_EXPONENT, d.pedal_curve_exponent);
        clamp(&mut self.keyboard_steer_threshold, bounds::STEER_THRESHOLD, d.keyboard_steer_threshold);
        clamp(&mut self.keyboard_steering_frequency, bounds::LFO_FREQUENCY, d.keyboard_steering_frequency);
        clamp(&mut self.controller_steering_range, bounds::CONTROLLER_RANGE, d.controller_steering_range);

        self.button_mappings.retain(|b| {
            let ok = b.key().is_some() || b.pad_button().is_some();
            if !ok {
                warn!("Dropping binding for button {}: unknown action '{}'", b.button, b.action);
            }
            ok
        });
    }

    /// Force a mode the current machine can actually drive.
    pub fn validate(&mut self, caps: Capabilities) {
        if self.control_mode == ControlMode::VirtualController && !caps.virtual_controller {
            warn!("Virtual Xbox mode requested but not available, falling back to mouse steering");
            self.control_mode = ControlMode::Mouse;
        }
    }

    pub fn binding_for(&self, button: u8) -> Option<&ButtonBinding> {
        self.button_mappings.iter().find(|b| b.button == button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("g29-bridge-test-{}-{name}", std::process::id()))
            .join("config.toml")
    }

    #[test]
    fn missing_file_loads_defaults() {
        let cfg = AppConfig::load_from(&temp_path("missing")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error_and_falls_back_to_defaults() {
        let path = temp_path("malformed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "control_mode = [this is not toml").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let cfg = AppConfig::load_or_default_from(&path);
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.control_mode, ControlMode::Mouse);
        assert_eq!(cfg.steering_deadzone, 0.05);
        assert_eq!(cfg.throttle_key, KeyName::Char('w'));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn wrongly_typed_fields_fall_back_to_defaults() {
        let path = temp_path("wrong-type");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "steering_deadzone = \"wide\"\nthrottle_key = \"not a key\"\n").unwrap();

        assert_eq!(AppConfig::load_or_default_from(&path), AppConfig::default());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unreadable_path_falls_back_to_defaults() {
        // A directory where the file should be is an io error, not a panic.
        let path = temp_path("is-a-dir");
        fs::create_dir_all(&path).unwrap();

        assert_eq!(AppConfig::load_or_default_from(&path), AppConfig::default());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn save_then_load_preserves_edits() {
        let path = temp_path("save");
        let mut cfg = AppConfig::default();
        cfg.control_mode = ControlMode::Keyboard;
        cfg.steering_deadzone = 0.1;
        cfg.controller_stick = Stick::Right;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn partial_file_fills_remaining_fields_with_defaults() {
        let cfg: AppConfig = toml::from_str("control_mode = \"hybrid\"\n").unwrap();
        assert_eq!(cfg.control_mode, ControlMode::Hybrid);
        assert_eq!(cfg.mouse_sensitivity, 3.0);
        assert_eq!(cfg.button_mappings.len(), 14);
    }

    #[test]
    fn sanitize_clamps_and_drops_unknown_actions() {
        let mut cfg = AppConfig {
            steering_deadzone: 4.0,
            mouse_return_speed: f32::NAN,
            button_mappings: vec![
                ButtonBinding::new(0, "space"),
                ButtonBinding::new(1, "lb"),
                ButtonBinding::new(2, "not-a-key"),
            ],
            ..AppConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.steering_deadzone, 0.5);
        assert_eq!(cfg.mouse_return_speed, 0.05);
        assert_eq!(cfg.button_mappings.len(), 2);
    }

    #[test]
    fn validate_falls_back_to_mouse_without_virtual_controller() {
        let mut cfg = AppConfig {
            control_mode: ControlMode::VirtualController,
            ..AppConfig::default()
        };
        cfg.validate(Capabilities {
            virtual_controller: true,
        });
        assert_eq!(cfg.control_mode, ControlMode::VirtualController);

        cfg.validate(Capabilities {
            virtual_controller: false,
        });
        assert_eq!(cfg.control_mode, ControlMode::Mouse);
    }

    #[test]
    fn mode_names_match_the_config_file_format() {
        let cfg: AppConfig = toml::from_str("control_mode = \"virtual_xbox\"").unwrap();
        assert_eq!(cfg.control_mode, ControlMode::VirtualController);
        let text = toml::to_string(&AppConfig::default()).unwrap();
        assert!(text.contains("control_mode = \"mouse\""));
        assert!(text.contains("[[button_mappings]]"));
    }
}
