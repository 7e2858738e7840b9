// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small catalog of variations.
//!
//! Enough to build interesting flames and to exercise the renderer;
//! anything else can be registered from outside the crate.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{RenderError, Result};
use crate::flame::XYZPoint;
use crate::variation::{TransformContext, Variation, VariationFactory};

const SMALL_EPSILON: f64 = 1.0e-300;
const EPSILON: f64 = 1.0e-10;

/// Generates a parameterless variation: the unit struct, its registry
/// name and its transform body.
macro_rules! variation {
    ($(#[$doc:meta])* $ty:ident, $name:expr,
     |$ctx:ident, $p:ident, $out:ident, $amount:ident| $body:block) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $ty;

        impl Variation for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn transform(
                &self,
                $ctx: &mut TransformContext<'_>,
                $p: &XYZPoint,
                $out: &mut XYZPoint,
                $amount: f64,
            ) $body

            fn box_clone(&self) -> Box<dyn Variation> {
                Box::new(*self)
            }
        }
    };
}

#[inline]
fn carry_z(ctx: &TransformContext<'_>, p: &XYZPoint, out: &mut XYZPoint, amount: f64) {
    if ctx.preserve_z {
        out.z += amount * p.z;
    }
}

variation!(
    /// The identity, scaled.  Carries z unconditionally.
    Linear, "linear",
    |_ctx, p, out, amount| {
        out.x += amount * p.x;
        out.y += amount * p.y;
        out.z += amount * p.z;
    }
);

variation!(
    /// `(sin x, sin y)`
    Sinusoidal, "sinusoidal",
    |ctx, p, out, amount| {
        out.x += amount * p.x.sin();
        out.y += amount * p.y.sin();
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Inversion in the unit circle.
    Spherical, "spherical",
    |ctx, p, out, amount| {
        let r = amount / (p.sumsq() + SMALL_EPSILON);
        out.x += r * p.x;
        out.y += r * p.y;
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Rotation by the squared radius.
    Swirl, "swirl",
    |ctx, p, out, amount| {
        let r2 = p.sumsq();
        let (s, c) = r2.sin_cos();
        out.x += amount * (s * p.x - c * p.y);
        out.y += amount * (c * p.x + s * p.y);
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// `((x - y)(x + y) / r, 2xy / r)`
    Horseshoe, "horseshoe",
    |ctx, p, out, amount| {
        let r = amount / (p.radius() + SMALL_EPSILON);
        out.x += (p.x - p.y) * (p.x + p.y) * r;
        out.y += 2.0 * p.x * p.y * r;
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Angle and radius as cartesian coordinates.
    Polar, "polar",
    |ctx, p, out, amount| {
        out.x += amount * p.atan() / PI;
        out.y += amount * (p.radius() - 1.0);
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Square root in the complex plane, picking one of the two roots
    /// at random.
    Julia, "julia",
    |ctx, p, out, amount| {
        let mut a = 0.5 * p.atan_yx();
        if ctx.random_below(2) == 1 {
            a += PI;
        }
        let r = amount * p.sumsq().sqrt().sqrt();
        out.x += r * a.cos();
        out.y += r * a.sin();
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Spiral arms wound by the radius.
    Spiral, "spiral",
    |ctx, p, out, amount| {
        let r = p.radius() + SMALL_EPSILON;
        let (sinr, cosr) = r.sin_cos();
        let r = amount / r;
        out.x += (p.cos_a() + sinr) * r;
        out.y += (p.sin_a() - cosr) * r;
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Complex exponential.
    Exp, "exp",
    |ctx, p, out, amount| {
        let e = p.x.exp();
        let (s, c) = p.y.sin_cos();
        out.x += amount * e * c;
        out.y += amount * e * s;
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Complex tangent.
    Tan, "tan",
    |ctx, p, out, amount| {
        let (tansin, tancos) = (2.0 * p.x).sin_cos();
        let tansinh = (2.0 * p.y).sinh();
        let tancosh = (2.0 * p.y).cosh();
        let tanden = 1.0 / (tancos + tancosh);
        out.x += amount * tanden * tansin;
        out.y += amount * tanden * tansinh;
        carry_z(ctx, p, out, amount);
    }
);

variation!(
    /// Quaternion hyperbolic cosine; uses all three coordinates.
    Coshq, "coshq",
    |_ctx, p, out, amount| {
        let abs_v = p.y.hypot(p.z);
        let (s, c) = abs_v.sin_cos();
        let sh = p.x.sinh();
        let ch = p.x.cosh();
        let k = amount * sh * s / (abs_v + SMALL_EPSILON);
        out.x += amount * ch * c;
        out.y += k * p.y;
        out.z += k * p.z;
    }
);

variation!(
    /// Elliptic coordinates, reflected at random across the x axis.
    Elliptic, "elliptic",
    |ctx, p, out, amount| {
        let tmp = p.sumsq() + 1.0;
        let x2 = 2.0 * p.x;
        let xmax = 0.5 * ((tmp + x2).sqrt() + (tmp - x2).sqrt());
        let a = p.x / xmax;
        let b = (1.0 - a * a).max(0.0).sqrt();
        let ssx = (xmax - 1.0).max(0.0).sqrt();
        let w = amount / FRAC_PI_2;
        out.x += w * a.atan2(b);
        let l = w * (xmax + ssx).ln();
        if ctx.random() < 0.5 {
            out.y += l;
        } else {
            out.y -= l;
        }
        carry_z(ctx, p, out, amount);
    }
);

/// Folds the plane into a checkerboard of rectangles.
#[derive(Clone, Copy, Debug)]
pub struct Rectangles {
    x: f64,
    y: f64,
}

impl Default for Rectangles {
    fn default() -> Self {
        Rectangles { x: 1.0, y: 1.0 }
    }
}

impl Variation for Rectangles {
    fn name(&self) -> &'static str {
        "rectangles"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["x", "y"]
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        match name {
            "x" => Some(self.x),
            "y" => Some(self.y),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "x" => self.x = value,
            "y" => self.y = value,
            _ => {
                return Err(RenderError::UnknownParameter {
                    variation: self.name().to_string(),
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn transform(
        &self,
        ctx: &mut TransformContext<'_>,
        p: &XYZPoint,
        out: &mut XYZPoint,
        amount: f64,
    ) {
        out.x += amount * fold(p.x, self.x);
        out.y += amount * fold(p.y, self.y);
        carry_z(ctx, p, out, amount);
    }

    fn box_clone(&self) -> Box<dyn Variation> {
        Box::new(*self)
    }
}

fn fold(v: f64, size: f64) -> f64 {
    if size.abs() < EPSILON {
        v
    } else {
        (2.0 * (v / size).floor() + 1.0) * size - v
    }
}

/// A fan whose blade width and offset are tunable.
#[derive(Clone, Copy, Debug)]
pub struct Fan2 {
    x: f64,
    y: f64,
}

impl Default for Fan2 {
    fn default() -> Self {
        Fan2 { x: 0.5, y: 1.2 }
    }
}

impl Variation for Fan2 {
    fn name(&self) -> &'static str {
        "fan2"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["x", "y"]
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        match name {
            "x" => Some(self.x),
            "y" => Some(self.y),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "x" => self.x = value,
            "y" => self.y = value,
            _ => {
                return Err(RenderError::UnknownParameter {
                    variation: self.name().to_string(),
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn transform(
        &self,
        ctx: &mut TransformContext<'_>,
        p: &XYZPoint,
        out: &mut XYZPoint,
        amount: f64,
    ) {
        let r = p.radius();
        let angle = if p.x.abs() > EPSILON || p.y.abs() > EPSILON {
            p.atan()
        } else {
            0.0
        };
        let dy = self.y;
        let dx = PI * (self.x * self.x) + EPSILON;
        let dx2 = dx * 0.5;
        let t = angle + dy - ((angle + dy) / dx).trunc() * dx;
        let a = if t > dx2 { angle - dx2 } else { angle + dx2 };
        out.x += amount * r * a.sin();
        out.y += amount * r * a.cos();
        carry_z(ctx, p, out, amount);
    }

    fn box_clone(&self) -> Box<dyn Variation> {
        Box::new(*self)
    }
}

fn factory<V: Variation + Default + 'static>() -> Box<dyn Variation> {
    Box::new(V::default())
}

/// Factories for every variation in this module.
pub const BUILTIN: &[VariationFactory] = &[
    factory::<Linear>,
    factory::<Sinusoidal>,
    factory::<Spherical>,
    factory::<Swirl>,
    factory::<Horseshoe>,
    factory::<Polar>,
    factory::<Julia>,
    factory::<Spiral>,
    factory::<Exp>,
    factory::<Tan>,
    factory::<Coshq>,
    factory::<Elliptic>,
    factory::<Rectangles>,
    factory::<Fan2>,
];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn apply(v: &dyn Variation, p: XYZPoint, preserve_z: bool) -> XYZPoint {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut ctx = TransformContext::new(&mut rng, preserve_z);
        let mut out = XYZPoint::default();
        v.transform(&mut ctx, &p, &mut out, 1.0);
        out
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn linear_is_the_identity() {
        let p = XYZPoint::new(0.3, -0.7, 0.2);
        let out = apply(&Linear, p, false);
        assert_eq!((out.x, out.y, out.z), (0.3, -0.7, 0.2));
    }

    #[test]
    fn contributions_accumulate() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut ctx = TransformContext::new(&mut rng, false);
        let p = XYZPoint::new(1.0, 2.0, 0.0);
        let mut out = XYZPoint::default();
        Linear.transform(&mut ctx, &p, &mut out, 0.5);
        Linear.transform(&mut ctx, &p, &mut out, 0.25);
        assert!(close(out.x, 0.75));
        assert!(close(out.y, 1.5));
    }

    #[test]
    fn spherical_inverts_radius() {
        let out = apply(&Spherical, XYZPoint::new(2.0, 0.0, 0.0), false);
        assert!(close(out.x, 0.5));
        assert!(close(out.y, 0.0));
        let origin = apply(&Spherical, XYZPoint::default(), false);
        assert!(origin.x.is_finite());
    }

    #[test]
    fn julia_lands_on_a_square_root() {
        let out = apply(&Julia, XYZPoint::new(0.0, 4.0, 0.0), false);
        let r = (out.x * out.x + out.y * out.y).sqrt();
        assert!(close(r, 2.0));
    }

    #[test]
    fn preserve_z_only_when_asked() {
        let p = XYZPoint::new(0.1, 0.2, 3.0);
        assert_eq!(apply(&Sinusoidal, p, false).z, 0.0);
        assert!(close(apply(&Sinusoidal, p, true).z, 3.0));
    }

    #[test]
    fn rectangles_with_zero_size_pass_through() {
        let mut rect = Rectangles::default();
        rect.set_parameter("x", 0.0).unwrap();
        rect.set_parameter("y", 0.0).unwrap();
        let out = apply(&rect, XYZPoint::new(0.4, -0.6, 0.0), false);
        assert!(close(out.x, 0.4));
        assert!(close(out.y, -0.6));
    }

    #[test]
    fn fan2_preserves_radius() {
        let p = XYZPoint::new(0.3, 0.4, 0.0);
        let out = apply(&Fan2::default(), p, false);
        let r = (out.x * out.x + out.y * out.y).sqrt();
        assert!(close(r, 0.5));
    }

    #[test]
    fn every_builtin_has_a_distinct_name() {
        let mut names: Vec<&str> = BUILTIN.iter().map(|f| f().name()).collect();
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
    }
}
