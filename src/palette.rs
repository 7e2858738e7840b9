// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Color gradients and the lookup tables the workers plot with.

/// An RGB triple with every channel in `[0, 1]`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RenderColor {
    /// Red channel.
    pub red: f64,
    /// Green channel.
    pub green: f64,
    /// Blue channel.
    pub blue: f64,
}

impl RenderColor {
    /// A color from 8-bit channels.
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        RenderColor {
            red: f64::from(r) / 255.0,
            green: f64::from(g) / 255.0,
            blue: f64::from(b) / 255.0,
        }
    }

    fn lerp(self, other: RenderColor, t: f64) -> RenderColor {
        RenderColor {
            red: self.red + (other.red - self.red) * t,
            green: self.green + (other.green - self.green) * t,
            blue: self.blue + (other.blue - self.blue) * t,
        }
    }
}

/// Number of entries in a render palette.
pub const PALETTE_RESOLUTION: usize = 256;

/// A color gradient.  Key colors are spread evenly over `[0, 1]` and
/// linearly interpolated in between.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    keys: Vec<RenderColor>,
}

impl Palette {
    /// A gradient through the given key colors.  An empty list yields
    /// plain white.
    pub fn new(keys: Vec<RenderColor>) -> Self {
        if keys.is_empty() {
            return Palette {
                keys: vec![RenderColor::from_rgb8(255, 255, 255)],
            };
        }
        Palette { keys }
    }

    /// Black through red and yellow to white.
    pub fn fire() -> Self {
        Palette::new(vec![
            RenderColor::from_rgb8(0, 0, 0),
            RenderColor::from_rgb8(180, 20, 0),
            RenderColor::from_rgb8(255, 160, 0),
            RenderColor::from_rgb8(255, 255, 200),
        ])
    }

    /// Deep blue through cyan to pale green.
    pub fn ocean() -> Self {
        Palette::new(vec![
            RenderColor::from_rgb8(10, 20, 90),
            RenderColor::from_rgb8(0, 120, 200),
            RenderColor::from_rgb8(60, 220, 220),
            RenderColor::from_rgb8(200, 255, 190),
        ])
    }

    /// Maps a color index in `[0, 1]` to a color.  Indices outside the
    /// range are clamped; NaN resolves to the first key.
    pub fn resolve(&self, index: f64) -> RenderColor {
        let last = self.keys.len() - 1;
        if last == 0 || index.is_nan() {
            return self.keys[0];
        }
        let pos = num::clamp(index, 0.0, 1.0) * last as f64;
        let lo = pos.floor() as usize;
        if lo >= last {
            return self.keys[last];
        }
        self.keys[lo].lerp(self.keys[lo + 1], pos - lo as f64)
    }

    /// Samples the gradient into a lookup table of `resolution`
    /// entries.  Done once per pass; the table is shared read-only by
    /// every worker.
    pub fn create_render_palette(&self, resolution: usize) -> RenderPalette {
        let resolution = resolution.max(2);
        let scale = (resolution - 1) as f64;
        RenderPalette {
            colors: (0..resolution)
                .map(|i| self.resolve(i as f64 / scale))
                .collect(),
            index_scale: scale,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::fire()
    }
}

/// A precomputed table of colors indexed by a float color index.
#[derive(Clone, Debug)]
pub struct RenderPalette {
    colors: Vec<RenderColor>,
    index_scale: f64,
}

impl RenderPalette {
    /// The entry nearest to `index`, clamped into the table.
    #[inline]
    pub fn color_at(&self, index: f64) -> RenderColor {
        let i = (index * self.index_scale + 0.5) as isize;
        let i = num::clamp(i, 0, self.colors.len() as isize - 1) as usize;
        self.colors[i]
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Never true for a table built by [`Palette::create_render_palette`].
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
