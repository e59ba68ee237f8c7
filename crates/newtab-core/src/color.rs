//! Hex/HSL conversion and the color derivations built on it.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorError {
    #[error("invalid color format: {0:?} (expected #rrggbb)")]
    InvalidFormat(String),
}

/// An HSL triple: hue in degrees, saturation and lightness in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    pub fn new(h: f64, s: f64, l: f64) -> Self {
        Self { h, s, l }
    }

    pub fn to_hex(&self) -> String {
        let (r, g, b) = hsl_to_rgb(self.h / 360.0, self.s / 100.0, self.l / 100.0);
        let channel = |value: f64| (value * 255.0).round().clamp(0.0, 255.0) as u8;
        format!("#{}", hex::encode([channel(r), channel(g), channel(b)]))
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsl({}, {}%, {}%)", self.h, self.s, self.l)
    }
}

/// Parses `#rrggbb` into its three channels.
pub fn parse_hex(hex: &str) -> Result<[u8; 3], ColorError> {
    let invalid = || ColorError::InvalidFormat(hex.to_string());
    let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
    if digits.len() != 6 {
        return Err(invalid());
    }
    let mut rgb = [0u8; 3];
    hex::decode_to_slice(digits, &mut rgb).map_err(|_| invalid())?;
    Ok(rgb)
}

pub fn is_hex_color(value: &str) -> bool {
    parse_hex(value).is_ok()
}

pub fn hex_to_hsl(hex: &str) -> Result<Hsl, ColorError> {
    let [r, g, b] = parse_hex(hex)?;
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return Ok(Hsl::new(0.0, 0.0, l * 100.0));
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    } / 6.0;

    Ok(Hsl::new(h * 360.0, s * 100.0, l * 100.0))
}

pub fn hsl_to_hex(hsl: Hsl) -> String {
    hsl.to_hex()
}

// h, s, l in [0, 1]
fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h * 6.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;

    let (r, g, b) = if h < 1.0 / 6.0 {
        (c, x, 0.0)
    } else if h < 2.0 / 6.0 {
        (x, c, 0.0)
    } else if h < 3.0 / 6.0 {
        (0.0, c, x)
    } else if h < 4.0 / 6.0 {
        (0.0, x, c)
    } else if h < 5.0 / 6.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}

/// Shifts the lightness of `hex` by `percent_delta` points, clamped to
/// [0, 100]. The result is HSL, not hex.
pub fn adjust_lightness(hex: &str, percent_delta: f64) -> Result<Hsl, ColorError> {
    let hsl = hex_to_hsl(hex)?;
    let l = (hsl.l + percent_delta).clamp(0.0, 100.0);
    Ok(Hsl::new(hsl.h, hsl.s, l))
}

/// Scales every RGB channel by `1 + percent / 100` and returns hex.
pub fn shade_hex(hex: &str, percent: f64) -> Result<String, ColorError> {
    let factor = 1.0 + percent / 100.0;
    let rgb = parse_hex(hex)?.map(|channel| {
        (f64::from(channel) * factor).round().clamp(0.0, 255.0) as u8
    });
    Ok(format!("#{}", hex::encode(rgb)))
}

/// Rolling hash over UTF-16 code units. Only the shift operand is truncated
/// to a signed 32-bit value; the sum is carried at full width, so the result
/// may leave the i32 range for longer names.
pub fn string_hash(input: &str) -> i64 {
    input.encode_utf16().fold(0i64, |hash, unit| {
        let shifted = i64::from((hash as i32) << 5);
        i64::from(unit).wrapping_add(shifted.wrapping_sub(hash))
    })
}

/// Deterministic tile color for a name.
pub fn generate_color_from_string(input: &str) -> Hsl {
    let hash = string_hash(input).unsigned_abs();
    let hue = hash % 360;
    let saturation = 60 + hash % 40;
    let lightness = 45 + hash % 20;
    Hsl::new(hue as f64, saturation as f64, lightness as f64)
}

/// (hue offset, saturation floor, saturation delta, lightness floor, lightness delta)
const GRADIENT_STOPS: [(f64, f64, f64, f64, f64); 6] = [
    (30.0, 40.0, -20.0, 40.0, -10.0),
    (60.0, 40.0, -10.0, 35.0, -15.0),
    (120.0, 50.0, 0.0, 45.0, -5.0),
    (180.0, 45.0, -15.0, 40.0, -10.0),
    (240.0, 50.0, -5.0, 45.0, 0.0),
    (300.0, 40.0, -20.0, 50.0, 5.0),
];

pub const GRADIENT_HUE_OFFSETS: [f64; 6] = [30.0, 60.0, 120.0, 180.0, 240.0, 300.0];

/// Six gradient stops derived from a base color. Index order maps to fixed
/// visual roles (`--gradient-1` .. `--gradient-6`).
pub fn generate_gradient_colors(base: Hsl) -> [Hsl; 6] {
    GRADIENT_STOPS.map(|(offset, s_floor, s_delta, l_floor, l_delta)| {
        Hsl::new(
            (base.h + offset) % 360.0,
            s_floor.max(base.s + s_delta),
            l_floor.max(base.l + l_delta),
        )
    })
}
