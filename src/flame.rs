// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The scene: xforms, palette, camera, output geometry and quality
//! settings.  A `Flame` is handed to the renderer fully formed; each
//! worker thread gets its own deep copy.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{RenderError, Result};
use crate::palette::Palette;
use crate::variation::{TransformContext, Variation};
use crate::variations;

/// A point in fractal space, carrying its running color index.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct XYZPoint {
    /// x coordinate.
    pub x: f64,
    /// y coordinate.
    pub y: f64,
    /// z coordinate; only the 3D camera looks at it.
    pub z: f64,
    /// Color index in `[0, 1]`.
    pub color: f64,
}

impl XYZPoint {
    /// A point with color index 0.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        XYZPoint { x, y, z, color: 0.0 }
    }

    /// `x² + y²`
    #[inline]
    pub fn sumsq(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Distance from the origin in the xy plane.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.sumsq().sqrt()
    }

    /// `atan2(x, y)`, the angle flame variations traditionally use.
    #[inline]
    pub fn atan(&self) -> f64 {
        self.x.atan2(self.y)
    }

    /// `atan2(y, x)`
    #[inline]
    pub fn atan_yx(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// `x / r`
    #[inline]
    pub fn sin_a(&self) -> f64 {
        self.x / (self.radius() + f64::MIN_POSITIVE)
    }

    /// `y / r`
    #[inline]
    pub fn cos_a(&self) -> f64 {
        self.y / (self.radius() + f64::MIN_POSITIVE)
    }

    /// True when every coordinate is a finite number.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// A random point in the square `[-1, 1]²` with a random color.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        XYZPoint {
            x: 2.0 * rng.gen::<f64>() - 1.0,
            y: 2.0 * rng.gen::<f64>() - 1.0,
            z: 0.0,
            color: rng.gen::<f64>(),
        }
    }
}

/// A 2D affine map: `x' = a·x + b·y + c`, `y' = d·x + e·y + f`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine {
    /// x from x.
    pub a: f64,
    /// x from y.
    pub b: f64,
    /// x offset.
    pub c: f64,
    /// y from x.
    pub d: f64,
    /// y from y.
    pub e: f64,
    /// y offset.
    pub f: f64,
}

impl Affine {
    /// The identity map.
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    /// Builds a map from its six coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Affine { a, b, c, d, e, f }
    }

    /// Uniform scale followed by a translation.
    pub fn scale_translate(scale: f64, dx: f64, dy: f64) -> Self {
        Affine::new(scale, 0.0, dx, 0.0, scale, dy)
    }

    #[inline]
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

impl Default for Affine {
    fn default() -> Self {
        Affine::IDENTITY
    }
}

/// Whether an xform's output is plotted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DrawMode {
    /// Always plotted.
    Normal,
    /// Iterated but never plotted.
    Hidden,
    /// Plotted with probability `opacity`.
    Opaque,
}

/// A variation together with its weight inside an xform.
#[derive(Clone, Debug)]
pub struct VariationInstance {
    /// The transform.
    pub variation: Box<dyn Variation>,
    /// How much of it is added into the result.
    pub amount: f64,
}

/// One weighted transform of the scene: an affine map followed by a
/// weighted sum of variations.
#[derive(Clone, Debug)]
pub struct XForm {
    /// Relative probability of this xform being chosen.
    pub weight: f64,
    /// Pre-variation affine map.
    pub coefficients: Affine,
    /// Optional affine map applied to the variation sum.
    pub post: Option<Affine>,
    /// The variations, summed.  With none, the affine result passes
    /// through unchanged.
    pub variations: Vec<VariationInstance>,
    /// The color index this xform pulls points towards.
    pub color: f64,
    /// How far, in `[0, 1]`, the running color moves towards `color`
    /// on each application.
    pub color_speed: f64,
    /// Plot probability for [`DrawMode::Opaque`].
    pub opacity: f64,
    /// Plotting behavior.
    pub draw_mode: DrawMode,
    /// Multipliers on the weights of the xform chosen *after* this one,
    /// indexed by target xform.  Missing entries count as 1.
    pub modified_weights: Vec<f64>,
}

impl XForm {
    /// An xform with the given weight and affine map and no variations.
    pub fn new(weight: f64, coefficients: Affine) -> Self {
        XForm {
            weight,
            coefficients,
            post: None,
            variations: Vec::new(),
            color: 0.0,
            color_speed: 0.5,
            opacity: 1.0,
            draw_mode: DrawMode::Normal,
            modified_weights: Vec::new(),
        }
    }

    /// Adds a variation.
    pub fn with_variation(mut self, variation: Box<dyn Variation>, amount: f64) -> Self {
        self.variations.push(VariationInstance { variation, amount });
        self
    }

    /// Sets the target color index and blending speed.
    pub fn with_color(mut self, color: f64, speed: f64) -> Self {
        self.color = color;
        self.color_speed = speed;
        self
    }

    /// Applies the xform to `src`.  The variation sum is accumulated
    /// into a fresh point, so `src` is never seen half-updated.
    pub fn transform_point(&self, ctx: &mut TransformContext<'_>, src: &XYZPoint) -> XYZPoint {
        let (ax, ay) = self.coefficients.apply(src.x, src.y);
        let affine = XYZPoint {
            x: ax,
            y: ay,
            z: src.z,
            color: src.color,
        };

        let mut out = XYZPoint {
            color: src.color * (1.0 - self.color_speed) + self.color * self.color_speed,
            ..XYZPoint::default()
        };
        if self.variations.is_empty() {
            out.x = affine.x;
            out.y = affine.y;
            out.z = affine.z;
        } else {
            for v in &self.variations {
                v.variation.transform(ctx, &affine, &mut out, v.amount);
            }
        }

        if let Some(post) = &self.post {
            let (px, py) = post.apply(out.x, out.y);
            out.x = px;
            out.y = py;
        }
        out
    }

    /// Whether the point produced by this xform gets plotted.
    #[inline]
    pub fn should_plot<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        match self.draw_mode {
            DrawMode::Normal => true,
            DrawMode::Hidden => false,
            DrawMode::Opaque => rng.gen::<f64>() <= self.opacity,
        }
    }
}

/// A complete scene.
#[derive(Clone, Debug)]
pub struct Flame {
    /// The transforms of the chaos game.
    pub xforms: Vec<XForm>,
    /// Applied to a copy of each point just before plotting; never fed
    /// back into the iteration.
    pub final_xform: Option<XForm>,
    /// The color gradient.
    pub palette: Palette,
    /// Pass `z` through planar variations.
    pub preserve_z: bool,

    /// Nominal output width in pixels.  A render takes its size from
    /// its `RenderInfo`; see `RenderInfo::for_flame`.
    pub width: u32,
    /// Nominal output height in pixels.
    pub height: u32,
    /// Pixels per fractal-space unit at zoom 1.
    pub pixels_per_unit: f64,

    /// Zoom, a plain multiplier on `pixels_per_unit`.
    pub cam_zoom: f64,
    /// View center, x.
    pub centre_x: f64,
    /// View center, y.
    pub centre_y: f64,
    /// Rotation of the view in degrees.
    pub cam_roll: f64,
    /// 3D yaw in degrees.
    pub cam_yaw: f64,
    /// 3D pitch in degrees.
    pub cam_pitch: f64,
    /// Strength of the perspective divide.
    pub cam_perspective: f64,
    /// Depth of field blur amount.
    pub cam_dof: f64,
    /// Depth of the focal plane.
    pub cam_z: f64,

    /// Samples per raster cell.
    pub sample_density: f64,
    /// Spatial oversampling factor, `1..=6`.
    pub spatial_oversample: u32,
    /// Number of independent color passes, `1..=10`.
    pub color_oversample: u32,
    /// Radius of the density estimation kernel, in output pixels.
    pub spatial_filter_radius: f64,
    /// Display gamma.
    pub gamma: f64,
    /// Densities below this are brightened linearly instead of by the
    /// gamma curve.
    pub gamma_threshold: f64,
    /// How much of the gamma curve is applied to the density rather
    /// than to the individual channels.
    pub vibrancy: f64,
    /// Overall brightness.
    pub brightness: f64,
    /// Contrast of the log density scale.
    pub contrast: f64,
    /// Background color.
    pub background: [u8; 3],
}

impl Default for Flame {
    fn default() -> Self {
        Flame {
            xforms: Vec::new(),
            final_xform: None,
            palette: Palette::default(),
            preserve_z: false,
            width: 800,
            height: 600,
            pixels_per_unit: 200.0,
            cam_zoom: 1.0,
            centre_x: 0.0,
            centre_y: 0.0,
            cam_roll: 0.0,
            cam_yaw: 0.0,
            cam_pitch: 0.0,
            cam_perspective: 0.0,
            cam_dof: 0.0,
            cam_z: 0.0,
            sample_density: 100.0,
            spatial_oversample: 1,
            color_oversample: 1,
            spatial_filter_radius: 0.75,
            gamma: 4.0,
            gamma_threshold: 0.04,
            vibrancy: 1.0,
            brightness: 4.0,
            contrast: 1.0,
            background: [0, 0, 0],
        }
    }
}

impl Flame {
    /// The Sierpinski triangle: three half-scale linear maps.
    pub fn sierpinski() -> Self {
        let half = |dx, dy, color| {
            XForm::new(1.0, Affine::scale_translate(0.5, dx, dy))
                .with_variation(Box::new(variations::Linear), 1.0)
                .with_color(color, 0.5)
        };
        Flame {
            xforms: vec![
                half(-0.5, -0.5, 0.0),
                half(0.5, -0.5, 0.5),
                half(0.0, 0.5, 1.0),
            ],
            pixels_per_unit: 250.0,
            ..Flame::default()
        }
    }

    /// A spiral galaxy of julia and spherical arms.
    pub fn spiral() -> Self {
        let arm = XForm::new(
            1.0,
            Affine::new(0.6, -0.52, 0.1, 0.52, 0.6, 0.0),
        )
        .with_variation(Box::new(variations::Linear), 0.6)
        .with_variation(Box::new(variations::Swirl), 0.4)
        .with_color(0.1, 0.4);
        let core = XForm::new(
            0.6,
            Affine::new(-0.35, 0.2, 0.4, -0.2, -0.35, -0.3),
        )
        .with_variation(Box::new(variations::Julia), 0.8)
        .with_variation(Box::new(variations::Spherical), 0.2)
        .with_color(0.9, 0.6);
        let halo = XForm::new(0.3, Affine::scale_translate(0.8, 0.0, 0.2))
            .with_variation(Box::new(variations::Sinusoidal), 1.0)
            .with_color(0.5, 0.8);
        Flame {
            xforms: vec![arm, core, halo],
            palette: Palette::ocean(),
            pixels_per_unit: 180.0,
            ..Flame::default()
        }
    }

    /// Builds the weighted selection tables of this scene: one global
    /// table and, per xform, the table of which xform follows it.
    pub fn weight_tables(&self) -> Result<WeightTables> {
        WeightTables::new(&self.xforms)
    }
}

fn sanitize(w: f64) -> f64 {
    if w.is_finite() && w > 0.0 {
        w
    } else {
        0.0
    }
}

/// Cumulative selection tables for choosing the next xform.
///
/// Built once per scene copy; never shared between workers.
#[derive(Clone, Debug)]
pub struct WeightTables {
    global: WeightedIndex<f64>,
    following: Vec<Option<WeightedIndex<f64>>>,
}

impl WeightTables {
    fn new(xforms: &[XForm]) -> Result<Self> {
        let weights: Vec<f64> = xforms.iter().map(|x| sanitize(x.weight)).collect();
        let global = WeightedIndex::new(&weights).map_err(|_| RenderError::NoDrawableXForm)?;
        let following = xforms
            .iter()
            .map(|from| {
                if from.modified_weights.is_empty() {
                    return None;
                }
                let row: Vec<f64> = weights
                    .iter()
                    .enumerate()
                    .map(|(to, w)| {
                        w * sanitize(from.modified_weights.get(to).cloned().unwrap_or(1.0))
                    })
                    .collect();
                WeightedIndex::new(&row).ok()
            })
            .collect();
        Ok(WeightTables { global, following })
    }

    /// Picks the first xform.
    #[inline]
    pub fn first<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.global.sample(rng)
    }

    /// Picks the xform to apply after `previous`.
    #[inline]
    pub fn next<R: Rng + ?Sized>(&self, previous: usize, rng: &mut R) -> usize {
        match self.following.get(previous) {
            Some(Some(table)) => table.sample(rng),
            _ => self.global.sample(rng),
        }
    }
}
