#![warn(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fractal flame renderer
//!
//! A fractal flame is the attractor of an iterated function system:
//! a handful of weighted transforms, each an affine map followed by a
//! blend of nonlinear "variations".  Start anywhere, keep applying a
//! randomly chosen transform, and the point wanders over the attractor.
//! Plot every place it visits into a histogram, and the histogram is
//! the picture.
//!
//! The histogram is then tone mapped.  Raw counts span many orders of
//! magnitude, so each pixel's brightness is the logarithm of its count.
//! Sparse areas are smoothed with a filter that widens where samples
//! are scarce, and the result is gamma corrected and composited over
//! the background.  Oversampling renders larger, or several times,
//! and averages the results back down.
//!
//! ```no_run
//! use flamerender::{Flame, FlameRenderer, RenderInfo};
//!
//! let mut renderer = FlameRenderer::new(Flame::sierpinski());
//! let rendered = renderer.render_flame(&RenderInfo::new(800, 600)).unwrap();
//! rendered.image.unwrap().save("sierpinski.png").unwrap();
//! ```

extern crate crossbeam;
extern crate failure;
extern crate image;
extern crate itertools;
extern crate num;
extern crate num_cpus;
extern crate rand;
extern crate tracing;

pub mod camera;
pub mod density;
pub mod error;
pub mod flame;
pub mod gamma;
pub mod iterate;
pub mod oversample;
pub mod palette;
pub mod raster;
pub mod renderer;
pub mod variation;
pub mod variations;

pub use error::{RenderError, Result};
pub use flame::{Affine, DrawMode, Flame, XForm, XYZPoint};
pub use iterate::{EntropySource, RandomSource, SeededSource};
pub use palette::{Palette, RenderColor};
pub use renderer::{
    FlameRenderer, ProgressUpdater, RenderInfo, RenderedFlame, RendererConfig,
};
pub use variation::{Variation, VariationRegistry};
