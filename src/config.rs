use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyboardSize {
    Sm,
    Md,
    #[default]
    Lg,
    Xl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// Presentation options. Read by the host UI only; the evaluator and the
/// progress store never look at them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub dark_mode: bool,
    pub keyboard_size: KeyboardSize,
    pub sound_enabled: bool,
    pub show_key_hints: bool,
    pub show_finger_hints: bool,
    pub font_size: FontSize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            keyboard_size: KeyboardSize::Lg,
            sound_enabled: true,
            show_key_hints: true,
            show_finger_hints: true,
            font_size: FontSize::Medium,
        }
    }
}

pub const PREFERENCE_KEYS: [&str; 6] = [
    "darkMode",
    "keyboardSize",
    "soundEnabled",
    "showKeyHints",
    "showFingerHints",
    "fontSize",
];

impl Preferences {
    /// Sets one option by its persisted key, e.g. `("fontSize", "large")`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || Error::InvalidPreference {
            key: key.to_string(),
            value: value.to_string(),
        };
        let flag = || value.parse::<bool>().map_err(|_| invalid());
        let variant = || serde_json::Value::String(value.to_lowercase());

        match key {
            "darkMode" => self.dark_mode = flag()?,
            "soundEnabled" => self.sound_enabled = flag()?,
            "showKeyHints" => self.show_key_hints = flag()?,
            "showFingerHints" => self.show_finger_hints = flag()?,
            "keyboardSize" => {
                self.keyboard_size = serde_json::from_value(variant()).map_err(|_| invalid())?
            }
            "fontSize" => {
                self.font_size = serde_json::from_value(variant()).map_err(|_| invalid())?
            }
            _ => return Err(Error::UnknownPreference(key.to_string())),
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("darkMode", self.dark_mode.to_string()),
            ("keyboardSize", self.keyboard_size.to_string()),
            ("soundEnabled", self.sound_enabled.to_string()),
            ("showKeyHints", self.show_key_hints.to_string()),
            ("showFingerHints", self.show_finger_hints.to_string()),
            ("fontSize", self.font_size.to_string()),
        ]
    }
}
