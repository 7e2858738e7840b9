// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The render orchestrator.
//!
//! A render is `color_oversample` independent passes.  Each pass
//! renders the scene at `spatial_oversample` times the requested size,
//! with the camera zoom scaled to match, runs the chaos game into a
//! fresh raster, and filters that raster into images.  The passes are
//! then averaged, and the average is box filtered back down to the
//! requested size.

use std::ops::Deref;

use image::{Rgb32FImage, RgbImage};
use tracing::{debug, info};

use crate::camera::CameraProjection;
use crate::density::{LogDensityFilter, LogDensityPoint, SIMPLE_DENSITY_LIMIT};
use crate::error::{RenderError, Result};
use crate::flame::Flame;
use crate::gamma::{intensity_pixel, GammaCorrectionFilter};
use crate::iterate::{iterate, EntropySource, RandomSource, SamplingJob};
use crate::oversample;
use crate::palette::PALETTE_RESOLUTION;
use crate::raster::Raster;

/// Largest accepted spatial oversampling factor.
pub const MAX_SPATIAL_OVERSAMPLE: u32 = 6;

/// Largest accepted color oversampling factor.
pub const MAX_COLOR_OVERSAMPLE: u32 = 10;

/// Below this sample density both oversampling factors are forced to 1.
pub const MIN_OVERSAMPLE_DENSITY: f64 = 100.0;

/// Progress steps reported per color pass.
pub const STEPS_PER_PASS: u64 = 100;

/// Receives render progress.  Called from the rendering thread only.
pub trait ProgressUpdater: Send {
    /// Called once, before any sampling, with the number of steps.
    fn init_progress(&mut self, total: u64);

    /// Called with the number of steps done so far, increasing.
    fn update_progress(&mut self, step: u64);
}

/// Engine settings that are not part of the scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// Upper bound on sampling threads.
    pub threads: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            threads: num_cpus::get(),
        }
    }
}

/// What to render.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderInfo {
    /// Output width in pixels.
    pub image_width: u32,
    /// Output height in pixels.
    pub image_height: u32,
    /// Produce the 8-bit image.
    pub render_image: bool,
    /// Produce the floating point image.
    pub render_hdr: bool,
    /// Produce the floating point density map.
    pub render_hdr_intensity_map: bool,
}

impl RenderInfo {
    /// An 8-bit image of the given size, and nothing else.
    pub fn new(image_width: u32, image_height: u32) -> Self {
        RenderInfo {
            image_width,
            image_height,
            render_image: true,
            render_hdr: false,
            render_hdr_intensity_map: false,
        }
    }

    /// An 8-bit image at the size the scene itself names.
    pub fn for_flame(flame: &Flame) -> Self {
        RenderInfo::new(flame.width, flame.height)
    }

    fn wants_anything(&self) -> bool {
        self.render_image || self.render_hdr || self.render_hdr_intensity_map
    }
}

/// The images of a render.  Each is present exactly when it was asked
/// for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedFlame {
    /// The display image.
    pub image: Option<RgbImage>,
    /// Gamma corrected color, not clamped above.
    pub hdr_image: Option<Rgb32FImage>,
    /// Filtered density as gray.
    pub hdr_intensity_map: Option<Rgb32FImage>,
}

/// Multiplies the scene's zoom for the lifetime of the guard.
struct ScopedZoom<'a> {
    flame: &'a mut Flame,
    saved: f64,
}

impl<'a> ScopedZoom<'a> {
    fn new(flame: &'a mut Flame, factor: u32) -> Self {
        let saved = flame.cam_zoom;
        if factor > 1 {
            flame.cam_zoom *= f64::from(factor);
        }
        ScopedZoom { flame, saved }
    }
}

impl Deref for ScopedZoom<'_> {
    type Target = Flame;

    fn deref(&self) -> &Flame {
        self.flame
    }
}

impl Drop for ScopedZoom<'_> {
    fn drop(&mut self) {
        self.flame.cam_zoom = self.saved;
    }
}

/// Checks the parts of a request that can be checked without doing any
/// work.
fn validate(flame: &Flame, info: &RenderInfo) -> Result<()> {
    if !(1..=MAX_SPATIAL_OVERSAMPLE).contains(&flame.spatial_oversample) {
        return Err(RenderError::SpatialOversample(flame.spatial_oversample));
    }
    if !(1..=MAX_COLOR_OVERSAMPLE).contains(&flame.color_oversample) {
        return Err(RenderError::ColorOversample(flame.color_oversample));
    }
    if info.image_width == 0 || info.image_height == 0 {
        return Err(RenderError::InvalidGeometry(format!(
            "{}x{}",
            info.image_width, info.image_height
        )));
    }
    if !info.wants_anything() {
        return Err(RenderError::NoOutputRequested);
    }
    if !flame.xforms.is_empty() {
        flame.weight_tables()?;
    }
    Ok(())
}

/// The factors actually used: oversampling is off for sparse renders.
fn effective_oversample(flame: &Flame) -> (u32, u32) {
    if flame.sample_density < MIN_OVERSAMPLE_DENSITY {
        if flame.spatial_oversample > 1 || flame.color_oversample > 1 {
            debug!(
                density = flame.sample_density,
                "sample density too low, oversampling disabled"
            );
        }
        (1, 1)
    } else {
        (flame.spatial_oversample, flame.color_oversample)
    }
}

/// One pass of the chaos game into a fresh raster.
#[allow(clippy::too_many_arguments)]
fn accumulate_pass(
    flame: &Flame,
    threads: usize,
    random: &dyn RandomSource,
    width: usize,
    height: usize,
    spatial_oversample: u32,
    pass: u32,
    report: &mut dyn FnMut(u64),
) -> Result<(Raster, LogDensityFilter)> {
    let filter = LogDensityFilter::new(flame, spatial_oversample, width, height);
    let raster = Raster::new(width, height, filter.border());
    let mut camera = CameraProjection::new(flame, width, height, filter.border());
    if flame.sample_density <= SIMPLE_DENSITY_LIMIT {
        camera = camera.without_depth_of_field();
    }
    let palette = flame.palette.create_render_palette(PALETTE_RESOLUTION);
    let samples = (flame.sample_density.max(0.0) * raster.len() as f64 + 0.5) as u64;
    let workers = threads.max(1);
    debug!(
        pass,
        width = raster.width(),
        height = raster.height(),
        samples,
        "accumulating"
    );

    let job = SamplingJob {
        flame,
        camera: &camera,
        palette: &palette,
        raster: &raster,
        samples,
        workers,
    };
    iterate(&job, random, pass, report)?;
    Ok((raster, filter))
}

/// The three kinds of image one pass can produce.
#[derive(Default)]
struct PassImages {
    image: Vec<RgbImage>,
    hdr_image: Vec<Rgb32FImage>,
    hdr_intensity_map: Vec<Rgb32FImage>,
}

impl PassImages {
    fn add(
        &mut self,
        info: &RenderInfo,
        gamma: &GammaCorrectionFilter,
        points: &[LogDensityPoint],
        width: u32,
        height: u32,
    ) {
        let at = |x: u32, y: u32| &points[y as usize * width as usize + x as usize];
        if info.render_image {
            self.image
                .push(RgbImage::from_fn(width, height, |x, y| gamma.transform_point(at(x, y))));
        }
        if info.render_hdr {
            self.hdr_image.push(Rgb32FImage::from_fn(width, height, |x, y| {
                gamma.transform_point_hdr(at(x, y))
            }));
        }
        if info.render_hdr_intensity_map {
            self.hdr_intensity_map
                .push(Rgb32FImage::from_fn(width, height, |x, y| intensity_pixel(at(x, y))));
        }
    }
}

/// Renders one scene.
///
/// The renderer owns its scene for the duration; the zoom it changes
/// during oversampled passes is always put back, whether the render
/// succeeds or fails.
pub struct FlameRenderer {
    flame: Flame,
    config: RendererConfig,
    random: Box<dyn RandomSource>,
    progress: Option<Box<dyn ProgressUpdater>>,
    render_scale: u32,
}

impl FlameRenderer {
    /// A renderer with the default configuration.
    pub fn new(flame: Flame) -> Self {
        FlameRenderer::with_config(flame, RendererConfig::default())
    }

    /// A renderer with an explicit configuration.
    pub fn with_config(flame: Flame, config: RendererConfig) -> Self {
        FlameRenderer {
            flame,
            config,
            random: Box::new(EntropySource),
            progress: None,
            render_scale: 1,
        }
    }

    /// Replaces where the workers' random streams come from.
    pub fn set_random_source(&mut self, random: Box<dyn RandomSource>) {
        self.random = random;
    }

    /// Installs a progress sink.
    pub fn set_progress_updater(&mut self, progress: Box<dyn ProgressUpdater>) {
        self.progress = Some(progress);
    }

    /// With 2, the 8-bit image is delivered at twice the requested size
    /// by pixel doubling.  Any other value means 1.
    pub fn set_render_scale(&mut self, scale: u32) {
        self.render_scale = if scale == 2 { 2 } else { 1 };
    }

    /// The scene.
    pub fn flame(&self) -> &Flame {
        &self.flame
    }

    /// The scene, for changes between renders.
    pub fn flame_mut(&mut self) -> &mut Flame {
        &mut self.flame
    }

    /// The engine settings.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Runs the chaos game once for an image of the given size, without
    /// oversampling, and returns the raster.
    pub fn accumulate(&self, image_width: u32, image_height: u32, pass: u32) -> Result<Raster> {
        let (raster, _) = accumulate_pass(
            &self.flame,
            self.config.threads,
            &*self.random,
            image_width as usize,
            image_height as usize,
            1,
            pass,
            &mut |_| {},
        )?;
        Ok(raster)
    }

    /// Renders the requested images.
    pub fn render_flame(&mut self, info: &RenderInfo) -> Result<RenderedFlame> {
        validate(&self.flame, info)?;
        if self.flame.xforms.is_empty() {
            info!("scene has no xforms, rendering the background");
            return Ok(self.background(info));
        }

        let (spatial, color) = effective_oversample(&self.flame);
        let width = info.image_width * spatial;
        let height = info.image_height * spatial;
        info!(
            width = info.image_width,
            height = info.image_height,
            spatial,
            color,
            "rendering"
        );

        let FlameRenderer {
            flame,
            config,
            random,
            progress,
            ..
        } = &mut *self;
        if let Some(progress) = progress.as_mut() {
            progress.init_progress(STEPS_PER_PASS * u64::from(color));
        }

        let zoomed = ScopedZoom::new(flame, spatial);
        let gamma = GammaCorrectionFilter::new(&zoomed);
        let simple = zoomed.sample_density <= SIMPLE_DENSITY_LIMIT;
        let mut passes = PassImages::default();
        for pass in 0..color {
            let base = STEPS_PER_PASS * u64::from(pass);
            let mut report = |percent: u64| {
                if let Some(progress) = progress.as_mut() {
                    progress.update_progress(base + percent);
                }
            };
            let (raster, filter) = accumulate_pass(
                &zoomed,
                config.threads,
                &**random,
                width as usize,
                height as usize,
                spatial,
                pass,
                &mut report,
            )?;
            debug!(pass, filled = raster.filled_cells(), "filtering");
            let points = filter.filter_raster(
                &raster,
                width as usize,
                height as usize,
                simple,
                config.threads,
            )?;
            passes.add(info, &gamma, &points, width, height);
        }
        drop(zoomed);

        let image = oversample::average_rgb8(&passes.image)
            .map(|image| oversample::downsample_rgb8(&image, spatial))
            .map(|image| self.scaled(image));
        let hdr_image = oversample::average_rgb32f(&passes.hdr_image)
            .map(|image| oversample::downsample_rgb32f(&image, spatial));
        let hdr_intensity_map = oversample::average_rgb32f(&passes.hdr_intensity_map)
            .map(|image| oversample::downsample_rgb32f(&image, spatial));
        Ok(RenderedFlame {
            image,
            hdr_image,
            hdr_intensity_map,
        })
    }

    fn scaled(&self, image: RgbImage) -> RgbImage {
        if self.render_scale == 2 {
            oversample::double_rgb8(&image)
        } else {
            image
        }
    }

    fn background(&self, info: &RenderInfo) -> RenderedFlame {
        let gamma = GammaCorrectionFilter::new(&self.flame);
        let (w, h) = (info.image_width, info.image_height);
        let hdr = gamma.background_hdr();
        RenderedFlame {
            image: if info.render_image {
                let pixel = gamma.transform_point(&LogDensityPoint::default());
                Some(self.scaled(RgbImage::from_pixel(w, h, pixel)))
            } else {
                None
            },
            hdr_image: if info.render_hdr {
                Some(Rgb32FImage::from_pixel(w, h, hdr))
            } else {
                None
            },
            hdr_intensity_map: if info.render_hdr_intensity_map {
                Some(Rgb32FImage::from_pixel(w, h, hdr))
            } else {
                None
            },
        }
    }
}
