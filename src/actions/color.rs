//! Color arguments shared by the `set_*_color` actions

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Three-channel color as sent by the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parse the `"r, g, b"` form written to display properties
    pub fn from_triplet(value: &str) -> Option<Self> {
        let mut channels = value.split(',').map(|c| c.trim().parse::<u8>());
        let red = channels.next()?.ok()?;
        let green = channels.next()?.ok()?;
        let blue = channels.next()?.ok()?;
        if channels.next().is_some() {
            return None;
        }
        Some(Self { red, green, blue })
    }

    /// JSON schema for the argument object
    pub fn schema() -> Value {
        let channel = |name: &str| {
            json!({
                "type": "integer",
                "minimum": 0,
                "maximum": 255,
                "description": format!("{name} channel")
            })
        };
        json!({
            "type": "object",
            "required": ["red", "green", "blue"],
            "properties": {
                "red": channel("Red"),
                "green": channel("Green"),
                "blue": channel("Blue")
            }
        })
    }
}

/// Renders as `"r, g, b"`
impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.red, self.green, self.blue)
    }
}
