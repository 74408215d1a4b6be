//! Terminal display surface
//!
//! Color properties set by actions are mirrored to the terminal as 24-bit
//! background and foreground colors.

use crate::actions::{DisplaySurface, Rgb, BACKGROUND_PROPERTY, FOREGROUND_PROPERTY};
use crossterm::style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::{execute, Command};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

pub struct TerminalDisplay {
    properties: Mutex<BTreeMap<String, String>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalDisplay {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            properties: Mutex::new(BTreeMap::new()),
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Current property values, sorted by name
    pub fn properties(&self) -> Vec<(String, String)> {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Restore the terminal's default colors
    pub fn reset(&self) {
        self.emit(ResetColor);
    }

    fn emit(&self, command: impl Command) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = execute!(out, command) {
            tracing::warn!(error = %e, "Failed to write terminal color");
        }
    }
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb {
        r: rgb.red,
        g: rgb.green,
        b: rgb.blue,
    }
}

impl DisplaySurface for TerminalDisplay {
    fn set_property(&self, name: &str, value: &str) {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());

        let Some(rgb) = Rgb::from_triplet(value) else {
            tracing::debug!(name, value, "Non-color property, not applied to terminal");
            return;
        };
        match name {
            BACKGROUND_PROPERTY => self.emit(SetBackgroundColor(to_color(rgb))),
            FOREGROUND_PROPERTY => self.emit(SetForegroundColor(to_color(rgb))),
            _ => tracing::debug!(name, "Unknown display property"),
        }
    }
}
