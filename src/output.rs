//! OS-level mouse and keyboard injection.

use std::{collections::HashSet, fmt, str::FromStr, time::Instant};

use enigo::{Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::OutputError, virtual_pad::VirtualPad};

/// A keyboard key as written in the config file: a single character or one of
/// the named keys below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyName {
    Char(char),
    Space,
    Ctrl,
    Shift,
    Tab,
    Esc,
    Enter,
}

impl FromStr for KeyName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let key = match lower.as_str() {
            "space" => KeyName::Space,
            "ctrl" | "control" => KeyName::Ctrl,
            "shift" => KeyName::Shift,
            "tab" => KeyName::Tab,
            "esc" | "escape" => KeyName::Esc,
            "enter" | "return" => KeyName::Enter,
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_whitespace() => KeyName::Char(c),
                    _ => return Err(format!("unknown key '{s}'")),
                }
            }
        };
        Ok(key)
    }
}

impl TryFrom<String> for KeyName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyName> for String {
    fn from(key: KeyName) -> Self {
        key.to_string()
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyName::Char(c) => write!(f, "{c}"),
            KeyName::Space => f.write_str("space"),
            KeyName::Ctrl => f.write_str("ctrl"),
            KeyName::Shift => f.write_str("shift"),
            KeyName::Tab => f.write_str("tab"),
            KeyName::Esc => f.write_str("esc"),
            KeyName::Enter => f.write_str("enter"),
        }
    }
}

impl KeyName {
    fn to_enigo(self) -> Key {
        match self {
            KeyName::Char(c) => Key::Unicode(c),
            KeyName::Space => Key::Space,
            KeyName::Ctrl => Key::Control,
            KeyName::Shift => Key::Shift,
            KeyName::Tab => Key::Tab,
            KeyName::Esc => Key::Escape,
            KeyName::Enter => Key::Return,
        }
    }
}

/// Relative mouse movement and key events.
pub trait InputInjector {
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), OutputError>;
    fn key(&mut self, key: KeyName, pressed: bool) -> Result<(), OutputError>;
}

pub struct EnigoInjector {
    enigo: Enigo,
}

impl EnigoInjector {
    pub fn new() -> Result<Self, OutputError> {
        let enigo =
            Enigo::new(&Settings::default()).map_err(|e| OutputError::Injection(e.to_string()))?;
        Ok(Self { enigo })
    }
}

impl InputInjector for EnigoInjector {
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), OutputError> {
        self.enigo
            .move_mouse(dx, dy, Coordinate::Rel)
            .map_err(|e| OutputError::Injection(e.to_string()))
    }

    fn key(&mut self, key: KeyName, pressed: bool) -> Result<(), OutputError> {
        let direction = if pressed {
            Direction::Press
        } else {
            Direction::Release
        };
        self.enigo
            .key(key.to_enigo(), direction)
            .map_err(|e| OutputError::Injection(e.to_string()))
    }
}

/// Drops every event. Stands in when the OS refuses an injection backend so
/// the virtual controller path keeps working.
pub struct NoopInjector;

impl InputInjector for NoopInjector {
    fn move_relative(&mut self, _dx: i32, _dy: i32) -> Result<(), OutputError> {
        Ok(())
    }

    fn key(&mut self, _key: KeyName, _pressed: bool) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Everything an emulator may write to during one tick.
///
/// Keys are de-duplicated: a key is only pressed when not already held and
/// only released when held, so emulators can re-assert state every tick.
pub struct OutputSink {
    injector: Box<dyn InputInjector>,
    pad: Option<Box<dyn VirtualPad>>,
    held: HashSet<KeyName>,
    pub now: Instant,
}

impl OutputSink {
    pub fn new(injector: Box<dyn InputInjector>, pad: Option<Box<dyn VirtualPad>>) -> Self {
        Self {
            injector,
            pad,
            held: HashSet::new(),
            now: Instant::now(),
        }
    }

    pub fn has_pad(&self) -> bool {
        self.pad.is_some()
    }

    pub fn pad(&mut self) -> Option<&mut (dyn VirtualPad + 'static)> {
        self.pad.as_deref_mut()
    }

    pub fn is_held(&self, key: KeyName) -> bool {
        self.held.contains(&key)
    }

    pub fn press(&mut self, key: KeyName) {
        if self.is_held(key) {
            return;
        }
        match self.injector.key(key, true) {
            Ok(()) => {
                self.held.insert(key);
            }
            Err(e) => warn!("Error pressing key {key}: {e}"),
        }
    }

    pub fn release(&mut self, key: KeyName) {
        if !self.is_held(key) {
            return;
        }
        if let Err(e) = self.injector.key(key, false) {
            warn!("Error releasing key {key}: {e}");
        }
        self.held.remove(&key);
    }

    /// Press when `down`, release otherwise.
    pub fn set_key(&mut self, key: KeyName, down: bool) {
        if down {
            self.press(key);
        } else {
            self.release(key);
        }
    }

    pub fn move_mouse(&mut self, dx: i32) {
        if dx == 0 {
            return;
        }
        if let Err(e) = self.injector.move_relative(dx, 0) {
            warn!("Mouse movement error: {e}");
        }
    }

    pub fn release_all(&mut self) {
        let held: Vec<KeyName> = self.held.iter().copied().collect();
        for key in held {
            self.release(key);
        }
        debug!("Released all held keys");
    }

    /// Neutralize the pad, if one is attached.
    pub fn reset_pad(&mut self) {
        if let Some(pad) = self.pad.as_deref_mut() {
            if let Err(e) = pad.reset() {
                warn!("Error resetting virtual controller: {e}");
            }
        }
    }

    pub fn attach_pad(&mut self, pad: Box<dyn VirtualPad>) {
        self.pad = Some(pad);
    }

    /// Drop the pad handle after neutralizing it.
    pub fn detach_pad(&mut self) {
        self.reset_pad();
        self.pad = None;
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.release_all();
        self.reset_pad();
    }
}
