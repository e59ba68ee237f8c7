//! Accent color handling and the CSS custom properties derived from it.

use crate::color::{generate_gradient_colors, hex_to_hsl, parse_hex, shade_hex, ColorError, Hsl};
use crate::persist::PersistQueue;
use crate::storage::{KeyValueStore, ACCENT_COLOR_KEY};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_ACCENT_COLOR: &str = "#6750a4";

const LIGHT_DELTA: f64 = 20.0;
const DARK_DELTA: f64 = -20.0;

/// Everything derived from one accent color. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub primary: String,
    pub primary_light: Hsl,
    pub primary_dark: Hsl,
    pub gradients: [Hsl; 6],
}

impl Palette {
    pub fn from_accent(accent: &str) -> Result<Self, ColorError> {
        Ok(Self::from_hsl(accent, hex_to_hsl(accent)?))
    }

    /// `primary` is the accent as the user picked it; `base` is its HSL form.
    pub fn from_hsl(primary: &str, base: Hsl) -> Self {
        let shifted = |delta: f64| Hsl::new(base.h, base.s, (base.l + delta).clamp(0.0, 100.0));
        Self {
            primary: primary.to_string(),
            primary_light: shifted(LIGHT_DELTA),
            primary_dark: shifted(DARK_DELTA),
            gradients: generate_gradient_colors(base),
        }
    }

    /// `(name, value)` pairs in emission order.
    pub fn css_variables(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("--primary-color".to_string(), self.primary.clone()),
            ("--primary-light".to_string(), self.primary_light.to_string()),
            ("--primary-dark".to_string(), self.primary_dark.to_string()),
        ];
        vars.extend(
            self.gradients
                .iter()
                .enumerate()
                .map(|(ix, color)| (format!("--gradient-{}", ix + 1), color.to_string())),
        );
        vars
    }

    pub fn to_css(&self) -> String {
        let mut css = String::from(":root {\n");
        for (name, value) in self.css_variables() {
            let _ = writeln!(css, "  {name}: {value};");
        }
        css.push('}');
        css.push('\n');
        css
    }
}

/// Presentation layer receiving theme variables.
pub trait ThemeSink {
    fn set_property(&mut self, name: &str, value: &str);
}

/// Collects properties in order; the last write to a name wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CssVariables {
    entries: Vec<(String, String)>,
}

impl CssVariables {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

impl ThemeSink for CssVariables {
    fn set_property(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }
}

/// Settings-popup preview: the accent fading into a darker shade.
pub fn preview_background(accent: &str) -> Result<String, ColorError> {
    parse_hex(accent)?;
    let shade = shade_hex(accent, DARK_DELTA)?;
    Ok(format!(
        "linear-gradient(135deg, {accent} 0%, {shade} 100%)"
    ))
}

/// Reads the stored accent, falling back to [`DEFAULT_ACCENT_COLOR`].
pub fn load_accent_color(store: &dyn KeyValueStore) -> String {
    match store.get(ACCENT_COLOR_KEY) {
        Ok(Some(Value::String(color))) if parse_hex(&color).is_ok() => color,
        Ok(Some(other)) => {
            warn!(value = %other, "stored accent color malformed, using default");
            DEFAULT_ACCENT_COLOR.to_string()
        }
        Ok(None) => DEFAULT_ACCENT_COLOR.to_string(),
        Err(err) => {
            warn!(error = %err, "failed to read accent color, using default");
            DEFAULT_ACCENT_COLOR.to_string()
        }
    }
}

pub struct ThemeEngine {
    accent: String,
    palette: Palette,
    persist: Arc<PersistQueue>,
}

impl ThemeEngine {
    pub fn new(accent: &str, persist: Arc<PersistQueue>) -> Result<Self, ColorError> {
        Ok(Self {
            accent: accent.to_string(),
            palette: Palette::from_accent(accent)?,
            persist,
        })
    }

    pub fn load(store: &dyn KeyValueStore, persist: Arc<PersistQueue>) -> Self {
        let accent = load_accent_color(store);
        match Palette::from_accent(&accent) {
            Ok(palette) => Self {
                accent,
                palette,
                persist,
            },
            Err(err) => {
                warn!(error = %err, "accent color rejected, using default");
                Self::with_default(persist)
            }
        }
    }

    fn with_default(persist: Arc<PersistQueue>) -> Self {
        let base = hex_to_hsl(DEFAULT_ACCENT_COLOR).unwrap_or(Hsl::new(0.0, 0.0, 50.0));
        Self {
            accent: DEFAULT_ACCENT_COLOR.to_string(),
            palette: Palette::from_hsl(DEFAULT_ACCENT_COLOR, base),
            persist,
        }
    }

    pub fn accent_color(&self) -> &str {
        &self.accent
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Validates and adopts a new accent, pushes the variables to `sink`,
    /// and requests persistence of the accent.
    pub fn apply_accent_color(
        &mut self,
        color: &str,
        sink: &mut dyn ThemeSink,
    ) -> Result<&Palette, ColorError> {
        let palette = Palette::from_accent(color)?;
        debug!(accent = %color, "applying accent color");
        self.accent = color.to_string();
        self.palette = palette;
        self.emit(sink);
        self.persist
            .write(ACCENT_COLOR_KEY, Value::String(self.accent.clone()));
        Ok(&self.palette)
    }

    /// Pushes the current variables without touching storage.
    pub fn emit(&self, sink: &mut dyn ThemeSink) {
        for (name, value) in self.palette.css_variables() {
            sink.set_property(&name, &value);
        }
    }

    pub fn reload(&mut self, store: &dyn KeyValueStore) {
        let accent = load_accent_color(store);
        if let Ok(palette) = Palette::from_accent(&accent) {
            self.accent = accent;
            self.palette = palette;
        }
    }
}
