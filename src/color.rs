//! Packed RGBA color value type.
//!
//! One `u32` per pixel, red in the low byte, alpha in the high byte. This
//! is the same word layout the project file stores on disk, so pixel
//! buffers serialize without per-channel shuffling.

/// 32-bit RGBA color, 8 bits per channel. Red occupies bits 0..8, green
/// 8..16, blue 16..24, alpha 24..32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub u32);

/// Fully transparent black, the canvas clear value.
pub const TRANSPARENT: Color = Color(0);

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color((r as u32) | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24)
    }

    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    #[inline]
    pub fn r(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    #[inline]
    pub fn g(self) -> u8 {
        (self.0 >> 8 & 0xff) as u8
    }

    #[inline]
    pub fn b(self) -> u8 {
        (self.0 >> 16 & 0xff) as u8
    }

    #[inline]
    pub fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Color(self.0 & 0x00ff_ffff | (a as u32) << 24)
    }

    #[inline]
    pub fn is_transparent(self) -> bool {
        self.a() == 0
    }

    /// Raw packed word, as stored in pixel buffers and project files.
    #[inline]
    pub fn word(self) -> u32 {
        self.0
    }

    /// Channel array in RGBA order, for handing off to `image` buffers.
    #[inline]
    pub fn channels(self) -> [u8; 4] {
        [self.r(), self.g(), self.b(), self.a()]
    }

    /// Alpha-over compositing: `self` drawn on top of `dst`.
    ///
    /// Straight (non-premultiplied) alpha; integer arithmetic throughout
    /// so the result is deterministic across platforms.
    pub fn blend_over(self, dst: Color) -> Color {
        let sa = self.a() as u32;
        if sa == 255 {
            return self;
        }
        if sa == 0 {
            return dst;
        }
        let da = dst.a() as u32;
        // out_a in 0..=255*255 scale while mixing channels
        let inv = 255 - sa;
        let out_a = sa * 255 + da * inv; // scaled by 255
        if out_a == 0 {
            return TRANSPARENT;
        }
        let ch = |s: u8, d: u8| -> u8 {
            let num = s as u32 * sa * 255 + d as u32 * da * inv;
            ((num + out_a / 2) / out_a) as u8
        };
        Color::new(
            ch(self.r(), dst.r()),
            ch(self.g(), dst.g()),
            ch(self.b(), dst.b()),
            ((out_a + 127) / 255) as u8,
        )
    }

    /// Convert to HSL. Hue in degrees `[0, 360)`, saturation and
    /// lightness in `[0, 1]`. Alpha is carried through unchanged by
    /// [`Color::from_hsl`].
    pub fn to_hsl(self) -> (f32, f32, f32) {
        let r = self.r() as f32 / 255.0;
        let g = self.g() as f32 / 255.0;
        let b = self.b() as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) * 0.5;
        if max == min {
            return (0.0, 0.0, l);
        }
        let d = max - min;
        let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (h * 60.0, s, l)
    }

    /// Build an opaque color from HSL components (see [`Color::to_hsl`]).
    pub fn from_hsl(h: f32, s: f32, l: f32) -> Self {
        let h = h.rem_euclid(360.0) / 360.0;
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);
        if s == 0.0 {
            let v = (l * 255.0).round() as u8;
            return Color::opaque(v, v, v);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let hue = |mut t: f32| -> f32 {
            if t < 0.0 {
                t += 1.0;
            }
            if t > 1.0 {
                t -= 1.0;
            }
            if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            }
        };
        Color::opaque(
            (hue(h + 1.0 / 3.0) * 255.0).round() as u8,
            (hue(h) * 255.0).round() as u8,
            (hue(h - 1.0 / 3.0) * 255.0).round() as u8,
        )
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`. Returns `None` on malformed
    /// input so text fields can reject the edit and keep their old value.
    pub fn parse(s: &str) -> Option<Color> {
        let hex = s.trim().strip_prefix('#')?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            3 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                let e = |n: u32| ((n & 0xf) * 17) as u8;
                Some(Color::opaque(e(v >> 8), e(v >> 4), e(v)))
            }
            6 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Color::opaque((v >> 16) as u8, (v >> 8) as u8, v as u8))
            }
            8 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Color::new(
                    (v >> 24) as u8,
                    (v >> 16) as u8,
                    (v >> 8) as u8,
                    v as u8,
                ))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Color {
    /// `#RRGGBB` for opaque colors, `#RRGGBBAA` otherwise.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.a() == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", self.r(), self.g(), self.b())
        } else {
            write!(
                f,
                "#{:02X}{:02X}{:02X}{:02X}",
                self.r(),
                self.g(),
                self.b(),
                self.a()
            )
        }
    }
}

impl std::fmt::Debug for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Color({self})")
    }
}
