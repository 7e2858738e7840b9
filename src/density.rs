// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Log density estimation.
//!
//! Turns raw cell counts into a perceptual intensity per output pixel,
//! `k1 · log10(1 + count · k2)`, and blends the color sums with the
//! same weights.  The full path is an adaptive low-pass filter: the
//! sparser the neighborhood of a pixel, the wider the Gaussian kernel
//! that gathers it, which approximates variable-bandwidth kernel
//! density estimation with a handful of precomputed kernels.  The
//! simple path, for very low sample densities, reads only the pixel's
//! own cell.

use crossbeam::thread::ScopedJoinHandle;
use itertools::iproduct;

use crate::error::{RenderError, Result};
use crate::flame::Flame;
use crate::raster::{Raster, RasterCell};

/// Gaussian support, in standard deviations.
pub const FILTER_CUTOFF: f64 = 1.8;

/// No kernel is ever wider than this.
pub const MAX_FILTER_WIDTH: usize = 25;

/// Number of density buckets that get a widened kernel.
pub const ADAPTIVE_LEVELS: usize = 4;

/// Up to this sample density only the simple path is used.
pub const SIMPLE_DENSITY_LIMIT: f64 = 10.0;

const MAX_BASE_WIDTH: usize = MAX_FILTER_WIDTH - 2 * ADAPTIVE_LEVELS;
const PRECALC_LOG_ARRAY_SIZE: usize = 512;

/// Width of the base kernel for a filter radius given in output pixels.
/// Always odd, at least 1.
pub fn noise_filter_size(radius: f64, spatial_oversample: u32) -> usize {
    if !(radius > 0.0) {
        return 1;
    }
    let fw = 2.0 * FILTER_CUTOFF * radius * f64::from(spatial_oversample.max(1));
    let mut size = fw as usize + 1;
    if size % 2 == 0 {
        size += 1;
    }
    size.min(MAX_BASE_WIDTH)
}

/// Raster border needed by the widest kernel for this radius.
pub fn border_width(radius: f64, spatial_oversample: u32) -> usize {
    (noise_filter_size(radius, spatial_oversample) - 1) / 2 + ADAPTIVE_LEVELS
}

/// Which kernel a cell with `count` samples is filtered with: 0 is the
/// widest, [`ADAPTIVE_LEVELS`] is the base kernel.
#[inline]
pub fn density_level(count: u64) -> usize {
    if count == 0 {
        return 0;
    }
    let log2 = (63 - count.leading_zeros()) as usize;
    log2.min(ADAPTIVE_LEVELS)
}

/// A normalized square Gaussian kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterKernel {
    size: usize,
    weights: Vec<f64>,
}

impl FilterKernel {
    /// A Gaussian of odd width `size`, cut off at [`FILTER_CUTOFF`]
    /// standard deviations at its edge.
    pub fn gaussian(size: usize) -> Self {
        let size = if size % 2 == 0 { size + 1 } else { size };
        if size == 1 {
            return FilterKernel {
                size,
                weights: vec![1.0],
            };
        }
        let half = ((size - 1) / 2) as f64;
        let mut weights: Vec<f64> = iproduct!(0..size, 0..size)
            .map(|(i, j)| {
                let dy = (i as f64 - half) / half * FILTER_CUTOFF;
                let dx = (j as f64 - half) / half * FILTER_CUTOFF;
                (-2.0 * (dx * dx + dy * dy)).exp()
            })
            .collect();
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        FilterKernel { size, weights }
    }

    /// Width and height.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Weight at `(row, column)`.
    #[inline]
    pub fn weight(&self, row: usize, column: usize) -> f64 {
        self.weights[row * self.size + column]
    }
}

/// Filtered density and color of one output pixel, before gamma.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LogDensityPoint {
    /// Log-scaled red.
    pub red: f64,
    /// Log-scaled green.
    pub green: f64,
    /// Log-scaled blue.
    pub blue: f64,
    /// Log-scaled sample density.
    pub intensity: f64,
}

impl LogDensityPoint {
    #[inline]
    fn add(&mut self, cell: &RasterCell, weight: f64, log_scale: f64) {
        let s = weight * log_scale;
        self.red += s * cell.red();
        self.green += s * cell.green();
        self.blue += s * cell.blue();
        self.intensity += s * cell.count() as f64;
    }
}

/// The density estimation filter of one pass.
#[derive(Clone, Debug)]
pub struct LogDensityFilter {
    kernels: Vec<FilterKernel>,
    border: usize,
    k1: f64,
    k2: f64,
    precalc_log: Vec<f64>,
}

impl LogDensityFilter {
    /// Sets up the filter for an image of the given (oversampled)
    /// size.  `flame` must already carry the zoom of the pass.
    pub fn new(flame: &Flame, spatial_oversample: u32, image_width: usize, image_height: usize) -> Self {
        let base = noise_filter_size(flame.spatial_filter_radius, spatial_oversample);
        let kernels = (0..=ADAPTIVE_LEVELS)
            .map(|level| FilterKernel::gaussian(base + 2 * (ADAPTIVE_LEVELS - level)))
            .collect();

        let contrast = if flame.contrast > 0.0 { flame.contrast } else { 1.0 };
        let k1 = contrast * flame.brightness * 268.0 / 256.0;
        let ppu = flame.pixels_per_unit * flame.cam_zoom;
        let area = (image_width as f64 * image_height as f64) / (ppu * ppu);
        let denominator = contrast * area * flame.sample_density;
        let k2 = if denominator.is_finite() && denominator > 0.0 {
            1.0 / denominator
        } else {
            1.0
        };

        let mut filter = LogDensityFilter {
            kernels,
            border: border_width(flame.spatial_filter_radius, spatial_oversample),
            k1,
            k2,
            precalc_log: Vec::new(),
        };
        filter.precalc_log = (0..PRECALC_LOG_ARRAY_SIZE as u64)
            .map(|count| filter.compute_log_scale(count))
            .collect();
        filter
    }

    /// Border the raster must carry for this filter.
    pub fn border(&self) -> usize {
        self.border
    }

    /// Width of the base kernel.
    pub fn noise_filter_size(&self) -> usize {
        self.kernels[ADAPTIVE_LEVELS].size()
    }

    fn compute_log_scale(&self, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let c = count as f64;
        self.k1 * (1.0 + c * self.k2).log10() / c
    }

    /// Per-sample scale for a cell with `count` samples.
    #[inline]
    pub fn log_scale(&self, count: u64) -> f64 {
        match self.precalc_log.get(count as usize) {
            Some(scale) => *scale,
            None => self.compute_log_scale(count),
        }
    }

    /// Adaptive filtering of output pixel `(x, y)`.
    pub fn transform_point(&self, raster: &Raster, x: usize, y: usize) -> LogDensityPoint {
        let cx = x + raster.border();
        let cy = y + raster.border();
        let level = density_level(raster.cell(cx, cy).count());
        let kernel = &self.kernels[level];
        let size = kernel.size();
        if size == 1 {
            return self.transform_point_simple(raster, x, y);
        }
        let half = (size - 1) / 2;
        let mut point = LogDensityPoint::default();
        for (i, j) in iproduct!(0..size, 0..size) {
            let cell = raster.cell(cx + j - half, cy + i - half);
            let count = cell.count();
            if count > 0 {
                point.add(cell, kernel.weight(i, j), self.log_scale(count));
            }
        }
        point
    }

    /// Output pixel `(x, y)` from its own cell only.
    pub fn transform_point_simple(&self, raster: &Raster, x: usize, y: usize) -> LogDensityPoint {
        let cell = raster.cell(x + raster.border(), y + raster.border());
        let mut point = LogDensityPoint::default();
        let count = cell.count();
        if count > 0 {
            point.add(cell, 1.0, self.log_scale(count));
        }
        point
    }

    /// Filters every pixel of a `width` × `height` image, row major.
    ///
    /// Rows are split into contiguous bands, one per thread, each
    /// written by its own thread.  Every pixel only reads the raster,
    /// so the result does not depend on `threads`.
    pub fn filter_raster(
        &self,
        raster: &Raster,
        width: usize,
        height: usize,
        simple: bool,
        threads: usize,
    ) -> Result<Vec<LogDensityPoint>> {
        let mut points = vec![LogDensityPoint::default(); width * height];
        if points.is_empty() {
            return Ok(points);
        }
        let bands = threads.max(1).min(height);
        let rows_per_band = (height + bands - 1) / bands;

        let outcome = crossbeam::scope(|spawner| {
            let handles: Vec<ScopedJoinHandle<()>> = points
                .chunks_mut(rows_per_band * width)
                .enumerate()
                .map(|(band, chunk)| {
                    spawner.spawn(move |_| {
                        let first_row = band * rows_per_band;
                        for (offset, point) in chunk.iter_mut().enumerate() {
                            let x = offset % width;
                            let y = first_row + offset / width;
                            *point = if simple {
                                self.transform_point_simple(raster, x, y)
                            } else {
                                self.transform_point(raster, x, y)
                            };
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        });

        let joined = outcome.map_err(|payload| RenderError::from_panic(0, payload.as_ref()))?;
        for (band, result) in joined.into_iter().enumerate() {
            if let Err(payload) = result {
                return Err(RenderError::from_panic(band, payload.as_ref()));
            }
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Pixel;
    use crate::palette::RenderColor;

    fn filter_for(radius: f64, w: usize, h: usize) -> LogDensityFilter {
        let flame = Flame {
            spatial_filter_radius: radius,
            width: w as u32,
            height: h as u32,
            ..Flame::default()
        };
        LogDensityFilter::new(&flame, 1, w, h)
    }

    #[test]
    fn filter_sizes_are_odd_and_bounded() {
        assert_eq!(noise_filter_size(0.0, 1), 1);
        assert_eq!(noise_filter_size(-1.0, 1), 1);
        assert_eq!(noise_filter_size(0.75, 1), 3);
        assert_eq!(noise_filter_size(1.0, 1), 5);
        assert_eq!(noise_filter_size(0.75, 2), 7);
        assert_eq!(noise_filter_size(100.0, 6), MAX_BASE_WIDTH);
        assert_eq!(border_width(0.0, 1), ADAPTIVE_LEVELS);
        assert!(2 * border_width(100.0, 6) + 1 <= MAX_FILTER_WIDTH);
    }

    #[test]
    fn kernels_are_normalized_and_peak_in_the_middle() {
        let k = FilterKernel::gaussian(7);
        let total: f64 = iproduct!(0..7, 0..7).map(|(i, j)| k.weight(i, j)).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(k.weight(3, 3) > k.weight(3, 4));
        assert!((k.weight(0, 1) - k.weight(1, 0)).abs() < 1e-15);
        assert_eq!(FilterKernel::gaussian(1).weight(0, 0), 1.0);
    }

    #[test]
    fn density_levels_widen_sparse_cells() {
        assert_eq!(density_level(0), 0);
        assert_eq!(density_level(1), 0);
        assert_eq!(density_level(3), 1);
        assert_eq!(density_level(4), 2);
        assert_eq!(density_level(15), 3);
        assert_eq!(density_level(16), ADAPTIVE_LEVELS);
        assert_eq!(density_level(1 << 40), ADAPTIVE_LEVELS);
    }

    #[test]
    fn log_scale_is_zero_for_empty_cells_and_matches_past_the_table() {
        let filter = filter_for(0.0, 8, 8);
        assert_eq!(filter.log_scale(0), 0.0);
        let big = PRECALC_LOG_ARRAY_SIZE as u64 + 10;
        assert!((filter.log_scale(big) - filter.compute_log_scale(big)).abs() < 1e-15);
        assert!(filter.log_scale(2) > 0.0);
    }

    #[test]
    fn a_lone_sample_spreads_only_through_the_adaptive_path() {
        let filter = filter_for(0.0, 12, 12);
        let raster = Raster::new(12, 12, filter.border());
        let b = raster.border();
        raster.add_sample(Pixel(4 + b, 4 + b), RenderColor::from_rgb8(255, 255, 255));

        let own = filter.transform_point_simple(&raster, 4, 4);
        assert!(own.intensity > 0.0);
        assert_eq!(filter.transform_point_simple(&raster, 5, 4).intensity, 0.0);

        let spread = filter.transform_point(&raster, 5, 4);
        assert!(spread.intensity > 0.0);
        assert!(spread.intensity < own.intensity);
        assert_eq!(filter.transform_point(&raster, 10, 10).intensity, 0.0);
    }

    #[test]
    fn dense_cells_with_no_radius_use_their_own_cell() {
        let filter = filter_for(0.0, 3, 3);
        let raster = Raster::new(3, 3, filter.border());
        let b = raster.border();
        let color = RenderColor::from_rgb8(255, 128, 0);
        for _ in 0..40 {
            raster.add_sample(Pixel(1 + b, 1 + b), color);
        }
        let full = filter.transform_point(&raster, 1, 1);
        let simple = filter.transform_point_simple(&raster, 1, 1);
        assert_eq!(full, simple);
        assert!((full.red / full.intensity - 1.0).abs() < 1e-12);
        assert_eq!(full.blue, 0.0);
    }

    fn scattered(filter: &LogDensityFilter, w: usize, h: usize) -> Raster {
        let raster = Raster::new(w, h, filter.border());
        let b = raster.border();
        for i in 0..w * h * 3 {
            let x = (i * 7 + i / 5) % w;
            let y = (i * 13 + i / 3) % h;
            let color = RenderColor::from_rgb8((i % 256) as u8, 90, (x * 20) as u8);
            for _ in 0..(i % 5) {
                raster.add_sample(Pixel(x + b, y + b), color);
            }
        }
        raster
    }

    #[test]
    fn banded_filtering_matches_a_single_band() {
        let filter = filter_for(0.75, 17, 11);
        let raster = scattered(&filter, 17, 11);
        let one = filter.filter_raster(&raster, 17, 11, false, 1).unwrap();
        assert_eq!(one.len(), 17 * 11);
        assert_eq!(one[5 * 17 + 3], filter.transform_point(&raster, 3, 5));
        for threads in &[2, 3, 4, 11, 40] {
            assert_eq!(filter.filter_raster(&raster, 17, 11, false, *threads).unwrap(), one);
        }
        let simple = filter.filter_raster(&raster, 17, 11, true, 1).unwrap();
        assert_eq!(filter.filter_raster(&raster, 17, 11, true, 4).unwrap(), simple);
        assert_eq!(simple[10 * 17 + 16], filter.transform_point_simple(&raster, 16, 10));
    }

    #[test]
    fn filtering_an_empty_image_spawns_nothing() {
        let filter = filter_for(0.0, 4, 4);
        let raster = Raster::new(0, 0, filter.border());
        assert_eq!(filter.filter_raster(&raster, 0, 0, false, 8).unwrap(), Vec::new());
    }
}
