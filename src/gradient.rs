//! Gradient tables used to color fading paint.
//!
//! A gradient maps a point's age (0 = freshly drawn, 255 = about to be erased) onto an
//! RGB color by interpolating between two or three color stops. Tables are static
//! configuration: the built-in one is embedded in the binary, and a user table can be
//! loaded from a TOML file at startup.

use crate::error::{FloatError, Result};
use rand::Rng;
use ratatui::style::Color;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const BUILTIN_GRADIENTS: &str = include_str!("../assets/gradients.toml");

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or the short `#rgb` form (each digit scaled by 17).
    pub fn from_hex(input: &str) -> Option<Self> {
        let digits = input.strip_prefix('#')?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            6 => Some(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => Some(Self::new(
                channel(&digits[0..1])? * 17,
                channel(&digits[1..2])? * 17,
                channel(&digits[2..3])? * 17,
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Rgb> for Color {
    fn from(rgb: Rgb) -> Self {
        Color::Rgb(rgb.r, rgb.g, rgb.b)
    }
}

/// Color stops of a gradient. Only two- and three-stop gradients exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stops {
    Two([Rgb; 2]),
    Three([Rgb; 3]),
}

/// A named gradient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientSpec {
    name: String,
    stops: Stops,
}

impl GradientSpec {
    pub fn new(name: impl Into<String>, stops: Stops) -> Self {
        Self {
            name: name.into(),
            stops,
        }
    }

    /// Build a gradient from hex color strings, validating the stop count.
    pub fn from_hex(name: &str, colors: &[impl AsRef<str>]) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(FloatError::invalid_gradient(name, "name must not be empty"));
        }

        let parsed = colors
            .iter()
            .map(|c| {
                Rgb::from_hex(c.as_ref()).ok_or_else(|| {
                    FloatError::invalid_gradient(
                        name,
                        format!("'{}' is not a #rgb or #rrggbb color", c.as_ref()),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let stops = match parsed.as_slice() {
            [a, b] => Stops::Two([*a, *b]),
            [a, b, c] => Stops::Three([*a, *b, *c]),
            other => {
                return Err(FloatError::invalid_gradient(
                    name,
                    format!("expected 2 or 3 colors, got {}", other.len()),
                ))
            }
        };

        Ok(Self::new(name, stops))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Color of this gradient at `age` on a 0-256 scale.
    ///
    /// Three-stop gradients spend the first half of the range on the first segment and
    /// the second half on the second segment, each at double speed.
    pub fn point(&self, age: u8) -> Rgb {
        let age = f64::from(age);
        match &self.stops {
            Stops::Two([a, b]) => lerp(*a, *b, age),
            Stops::Three([a, b, c]) => {
                if age < 128.0 {
                    lerp(*a, *b, age * 2.0)
                } else {
                    lerp(*b, *c, (age - 128.0) * 2.0)
                }
            }
        }
    }
}

fn lerp(from: Rgb, to: Rgb, x: f64) -> Rgb {
    let d = x / 256.0;
    let channel = |a: u8, b: u8| {
        let a = f64::from(a);
        (a + d * (f64::from(b) - a)) as u8
    };
    Rgb::new(
        channel(from.r, to.r),
        channel(from.g, to.g),
        channel(from.b, to.b),
    )
}

#[derive(Debug, Deserialize)]
struct GradientFile {
    #[serde(default)]
    gradient: Vec<GradientEntry>,
}

#[derive(Debug, Deserialize)]
struct GradientEntry {
    name: String,
    colors: Vec<String>,
}

/// Ordered, non-empty list of gradients sessions pick from.
#[derive(Debug, Clone)]
pub struct GradientTable {
    gradients: Vec<Arc<GradientSpec>>,
}

impl GradientTable {
    pub fn new(gradients: Vec<GradientSpec>) -> Result<Self> {
        if gradients.is_empty() {
            return Err(FloatError::invalid_gradient(
                "<table>",
                "at least one gradient is required",
            ));
        }
        Ok(Self {
            gradients: gradients.into_iter().map(Arc::new).collect(),
        })
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_GRADIENTS)
    }

    /// Load a table from a TOML file of `[[gradient]]` entries.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FloatError::invalid_gradient(
                "<table>",
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: GradientFile = toml::from_str(contents)
            .map_err(|e| FloatError::invalid_gradient("<table>", e.to_string()))?;

        let gradients = file
            .gradient
            .iter()
            .map(|entry| GradientSpec::from_hex(&entry.name, entry.colors.as_slice()))
            .collect::<Result<Vec<_>>>()?;

        Self::new(gradients)
    }

    pub fn len(&self) -> usize {
        self.gradients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gradients.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<GradientSpec>> {
        self.gradients.iter().find(|g| g.name() == name).cloned()
    }

    /// Pick a gradient uniformly at random.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Arc<GradientSpec> {
        let index = rng.gen_range(0..self.gradients.len());
        Arc::clone(&self.gradients[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_stop() -> GradientSpec {
        GradientSpec::from_hex("test", &["#ff0000", "#0000ff"]).unwrap()
    }

    fn three_stop() -> GradientSpec {
        GradientSpec::from_hex("test", &["#000000", "#808080", "#ffffff"]).unwrap()
    }

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(Rgb::from_hex("#1a2B3c"), Some(Rgb::new(0x1a, 0x2b, 0x3c)));
        assert_eq!(Rgb::from_hex("#fa0"), Some(Rgb::new(255, 170, 0)));
        assert_eq!(Rgb::from_hex("1a2b3c"), None);
        assert_eq!(Rgb::from_hex("#12345"), None);
        assert_eq!(Rgb::from_hex("#+f+f+f"), None);
        assert_eq!(Rgb::from_hex("#gg0000"), None);
    }

    #[test]
    fn two_stop_endpoints() {
        let g = two_stop();
        assert_eq!(g.point(0), Rgb::new(255, 0, 0));
        // 128/256 of the way: 255 - 127.5 truncates to 127
        assert_eq!(g.point(128), Rgb::new(127, 0, 127));
        assert_eq!(g.point(255), Rgb::new(0, 0, 254));
    }

    #[test]
    fn three_stop_hits_middle_stop_at_128() {
        let g = three_stop();
        assert_eq!(g.point(0), Rgb::new(0, 0, 0));
        assert_eq!(g.point(64), Rgb::new(64, 64, 64));
        assert_eq!(g.point(128), Rgb::new(128, 128, 128));
        assert_eq!(g.point(192), Rgb::new(191, 191, 191));
    }

    #[test]
    fn rejects_wrong_stop_count() {
        let err = GradientSpec::from_hex("solo", &["#fff"]).unwrap_err();
        assert!(matches!(err, FloatError::InvalidGradientSpec { .. }));

        let err = GradientSpec::from_hex("quad", &["#fff", "#000", "#fff", "#000"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid gradient 'quad': expected 2 or 3 colors, got 4"
        );
    }

    #[test]
    fn builtin_table_is_valid() {
        let table = GradientTable::builtin().unwrap();
        assert!(!table.is_empty());
        assert!(table.get("Mono").is_some());
    }

    #[test]
    fn table_rejects_bad_entries() {
        let err = GradientTable::from_toml_str(
            r##"
            [[gradient]]
            name = "Broken"
            colors = ["#zzzzzz", "#000"]
            "##,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Broken"));

        let err = GradientTable::from_toml_str("").unwrap_err();
        assert!(matches!(err, FloatError::InvalidGradientSpec { .. }));
    }

    #[test]
    fn load_reads_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "[[gradient]]\nname = \"Only\"\ncolors = [\"#fff\", \"#000\"]\n",
        )
        .unwrap();

        let table = GradientTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 1);

        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(table.random(&mut rng).name(), "Only");
    }

    #[test]
    fn random_covers_every_entry() {
        let table = GradientTable::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(table.random(&mut rng).name().to_string());
        }
        assert_eq!(seen.len(), table.len());
    }

    fn rgb() -> impl Strategy<Value = Rgb> {
        (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Rgb::new(r, g, b))
    }

    proptest! {
        #[test]
        fn two_stop_follows_linear_formula(a in rgb(), b in rgb(), age in any::<u8>()) {
            let g = GradientSpec::new("p", Stops::Two([a, b]));
            let expected = |x: u8, y: u8| {
                let x = f64::from(x);
                (x + (f64::from(age) / 256.0) * (f64::from(y) - x)) as u8
            };
            prop_assert_eq!(g.point(0), a);
            prop_assert_eq!(
                g.point(age),
                Rgb::new(expected(a.r, b.r), expected(a.g, b.g), expected(a.b, b.b))
            );
        }

        #[test]
        fn two_stop_is_monotone_per_channel(a in rgb(), b in rgb(), age in 0u8..255) {
            let g = GradientSpec::new("p", Stops::Two([a, b]));
            let (now, next) = (g.point(age), g.point(age + 1));
            let towards = |from: u8, to: u8, x: u8, y: u8| {
                if to >= from { y >= x } else { y <= x }
            };
            prop_assert!(towards(a.r, b.r, now.r, next.r));
            prop_assert!(towards(a.g, b.g, now.g, next.g));
            prop_assert!(towards(a.b, b.b, now.b, next.b));
        }

        #[test]
        fn three_stop_second_half_uses_last_segment(
            a in rgb(), b in rgb(), c in rgb(), age in 128u8..=255
        ) {
            let three = GradientSpec::new("p", Stops::Three([a, b, c]));
            let tail = GradientSpec::new("q", Stops::Two([b, c]));
            prop_assert_eq!(three.point(128), b);
            prop_assert_eq!(three.point(age), tail.point((age - 128) * 2));
        }
    }
}
