//! Value to colour mapping.

use crate::types::Color;

/// Maps a normalised value to a fill colour.
///
/// The ratio is `value / max` and is usually within [0, 1], but callers do not
/// clamp it; implementations decide what out-of-range ratios look like.
pub trait Palette: Send + Sync {
    fn color(&self, ratio: f64) -> Color;
}

impl<F> Palette for F
where
    F: Fn(f64) -> Color + Send + Sync,
{
    fn color(&self, ratio: f64) -> Color {
        self(ratio)
    }
}

/// Stops of the price-paid scale, cheapest first.
pub const PRICE_PAID_STOPS: &[&str] = &[
    "#665191", "#a05195", "#d45087", "#f95d6a", "#ff7c43", "#ffa600", "#dfbd0c", "#becf36",
    "#9bdd5f", "#76e889", "#4cf0b4", "#14f7dc", "#00fbff", "#00fbff", "#4ffaff", "#74f9ff",
    "#91f8ff", "#aaf7ff", "#c0f5ff", "#d3f4ff", "#e3f4ff",
];

/// Evenly spaced colour stops with linear RGB interpolation between them.
///
/// Ratios are clamped to [0, 1]; NaN maps to the first stop.
#[derive(Debug, Clone)]
pub struct Gradient {
    stops: Vec<Color>,
}

impl Gradient {
    /// Builds a gradient from at least one stop.
    pub fn new(stops: Vec<Color>) -> Option<Self> {
        if stops.is_empty() {
            return None;
        }
        Some(Self { stops })
    }

    /// The default 21-stop price-paid scale.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricemap::{Color, Gradient, Palette};
    ///
    /// let palette = Gradient::price_paid();
    /// assert_eq!(palette.color(0.0), Color::rgb(0x66, 0x51, 0x91));
    /// assert_eq!(palette.color(0.5).to_string(), "#4cf0b4");
    /// ```
    pub fn price_paid() -> Self {
        let stops = PRICE_PAID_STOPS
            .iter()
            .filter_map(|hex| Color::from_hex(hex))
            .collect();
        Self { stops }
    }

    pub fn stops(&self) -> &[Color] {
        &self.stops
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::price_paid()
    }
}

impl Palette for Gradient {
    fn color(&self, ratio: f64) -> Color {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        let pos = ratio * (self.stops.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let t = pos - lo as f64;
        let (a, b) = (self.stops[lo], self.stops[hi]);
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
        Color::rgb(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_and_clamping() {
        let palette = Gradient::price_paid();
        assert_eq!(palette.stops().len(), 21);
        assert_eq!(palette.color(1.0).to_string(), "#e3f4ff");
        assert_eq!(palette.color(7.5), palette.color(1.0));
        assert_eq!(palette.color(-1.0), palette.color(0.0));
        assert_eq!(palette.color(f64::NAN), palette.color(0.0));
    }

    #[test]
    fn interpolates_between_stops() {
        let palette = Gradient::new(vec![Color::rgb(0, 0, 0), Color::rgb(200, 100, 50)]).unwrap();
        assert_eq!(palette.color(0.5), Color::rgb(100, 50, 25));
        assert_eq!(palette.color(0.25), Color::rgb(50, 25, 13));
    }

    #[test]
    fn single_stop_is_constant() {
        let palette = Gradient::new(vec![Color::rgb(1, 2, 3)]).unwrap();
        assert_eq!(palette.color(0.7), Color::rgb(1, 2, 3));
        assert!(Gradient::new(Vec::new()).is_none());
    }

    #[test]
    fn closures_are_palettes() {
        let grey = |ratio: f64| {
            let v = (ratio * 255.0) as u8;
            Color::rgb(v, v, v)
        };
        assert_eq!(grey.color(1.0), Color::rgb(255, 255, 255));
    }
}
