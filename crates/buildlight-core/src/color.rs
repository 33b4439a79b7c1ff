//! Colors and the status palette

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::BuildStatus;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ColorError {
    #[error("Color must look like #rrggbb, got {0:?}")]
    InvalidFormat(String),
}

/// 24-bit RGB color, written as `#rrggbb` in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);
    pub const GREEN: Rgb = Rgb::new(0x00, 0xff, 0x00);
    pub const RED: Rgb = Rgb::new(0xff, 0x00, 0x00);
    pub const AMBER: Rgb = Rgb::new(0xff, 0xbf, 0x00);
    pub const MAGENTA: Rgb = Rgb::new(0xff, 0x00, 0xff);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional)
    pub fn parse(s: &str) -> Result<Self, ColorError> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::InvalidFormat(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColorError::InvalidFormat(s.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::str::FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_string()
    }
}

/// Color shown for each build status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    #[serde(default = "default_connecting")]
    pub connecting: Rgb,
    #[serde(default = "default_passed")]
    pub passed: Rgb,
    #[serde(default = "default_failed")]
    pub failed: Rgb,
    #[serde(default = "default_updating")]
    pub updating: Rgb,
    /// Shown while a device is being (re)enumerated
    #[serde(default = "default_off")]
    pub off: Rgb,
}

fn default_connecting() -> Rgb {
    Rgb::AMBER
}

fn default_passed() -> Rgb {
    Rgb::GREEN
}

fn default_failed() -> Rgb {
    Rgb::RED
}

fn default_updating() -> Rgb {
    Rgb::MAGENTA
}

fn default_off() -> Rgb {
    Rgb::BLACK
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            connecting: default_connecting(),
            passed: default_passed(),
            failed: default_failed(),
            updating: default_updating(),
            off: default_off(),
        }
    }
}

impl Palette {
    pub fn color_for(&self, status: BuildStatus) -> Rgb {
        match status {
            BuildStatus::Connecting => self.connecting,
            BuildStatus::Passed => self.passed,
            BuildStatus::Failed => self.failed,
            BuildStatus::Updating => self.updating,
        }
    }
}
