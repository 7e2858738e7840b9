// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The chaos game.
//!
//! A pass splits its sample budget evenly over a number of workers.
//! Each worker owns a deep copy of the scene and its own random
//! stream, starts from a random point, and repeatedly applies a
//! randomly chosen xform to it, plotting every result after a short
//! fuse into the one raster that all workers share.  The orchestrating
//! thread only watches: it polls the workers' progress counters every
//! millisecond, reports progress, and collects the workers when they
//! are done.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::thread::ScopedJoinHandle;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, trace};

use crate::camera::CameraProjection;
use crate::error::{RenderError, Result};
use crate::flame::{Flame, WeightTables, XYZPoint};
use crate::palette::RenderPalette;
use crate::raster::Raster;
use crate::variation::TransformContext;

/// Iterations each worker runs before it starts plotting, so the point
/// has settled onto the attractor.
pub const FUSE_ITERATIONS: u64 = 20;

/// How often, in samples, a worker publishes its progress.
const PROGRESS_INTERVAL: u64 = 1024;

/// The random stream a single worker draws from.
pub type WorkerRng = Box<dyn RngCore + Send>;

/// Hands every worker of every pass its own random stream.  Any
/// generator will do; the built-in sources use [`SmallRng`].
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// The stream of worker `worker` in color pass `pass`.
    fn worker_rng(&self, pass: u32, worker: usize) -> WorkerRng;
}

/// Fresh entropy for every worker.  Renders are not repeatable.
#[derive(Copy, Clone, Debug, Default)]
pub struct EntropySource;

impl RandomSource for EntropySource {
    fn worker_rng(&self, _pass: u32, _worker: usize) -> WorkerRng {
        Box::new(SmallRng::from_entropy())
    }
}

/// Streams derived from a fixed seed.  With a single worker the render
/// is repeatable bit for bit; with more, workers still race on shared
/// raster cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeededSource(pub u64);

impl RandomSource for SeededSource {
    fn worker_rng(&self, pass: u32, worker: usize) -> WorkerRng {
        let seed = self.0
            ^ u64::from(pass).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (worker as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        Box::new(SmallRng::seed_from_u64(seed))
    }
}

/// Everything a pass of the chaos game reads.
pub struct SamplingJob<'a> {
    /// The scene, already carrying the zoom of the pass.
    pub flame: &'a Flame,
    /// Maps points to raster cells.
    pub camera: &'a CameraProjection,
    /// Color index to color.
    pub palette: &'a RenderPalette,
    /// The shared target.
    pub raster: &'a Raster,
    /// Total samples over all workers.
    pub samples: u64,
    /// Number of worker threads.
    pub workers: usize,
}

struct SampleWorker<'a> {
    flame: Flame,
    tables: WeightTables,
    camera: &'a CameraProjection,
    palette: &'a RenderPalette,
    raster: &'a Raster,
    rng: WorkerRng,
}

impl<'a> SampleWorker<'a> {
    fn run(&mut self, samples: u64, progress: &AtomicU64) {
        let preserve_z = self.flame.preserve_z;
        let mut point = XYZPoint::random(&mut self.rng);
        let mut index = self.tables.first(&mut self.rng);

        for iteration in 0..FUSE_ITERATIONS + samples {
            index = self.tables.next(index, &mut self.rng);
            let xform = &self.flame.xforms[index];
            point = {
                let mut ctx = TransformContext::new(&mut self.rng, preserve_z);
                xform.transform_point(&mut ctx, &point)
            };
            if !point.is_finite() {
                point = XYZPoint::random(&mut self.rng);
                continue;
            }
            if iteration < FUSE_ITERATIONS {
                continue;
            }
            let done = iteration - FUSE_ITERATIONS + 1;
            if done % PROGRESS_INTERVAL == 0 {
                progress.store(done, Ordering::Relaxed);
            }
            if !xform.should_plot(&mut self.rng) {
                continue;
            }

            let plotted = match &self.flame.final_xform {
                Some(last) => {
                    let mut ctx = TransformContext::new(&mut self.rng, preserve_z);
                    last.transform_point(&mut ctx, &point)
                }
                None => point,
            };
            if let Some(pixel) = self.camera.raster_coordinate(&plotted, &mut self.rng) {
                self.raster
                    .add_sample(pixel, self.palette.color_at(plotted.color));
            }
        }
        progress.store(samples, Ordering::Relaxed);
    }
}

/// Counts a worker as finished when dropped, even while unwinding.
struct Finished<'a>(&'a AtomicUsize);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Release);
    }
}

/// Runs one pass of the chaos game into `job.raster`.
///
/// `report` receives the percentage of samples done, in increasing
/// order, ending with 100 on success.  If any worker panics, the
/// lowest-numbered failure is returned once every worker has stopped.
pub fn iterate(
    job: &SamplingJob<'_>,
    random: &dyn RandomSource,
    pass: u32,
    report: &mut dyn FnMut(u64),
) -> Result<()> {
    let workers = job.workers.max(1);
    let per_worker = job.samples / workers as u64;
    let total = per_worker * workers as u64;
    debug!(pass, workers, per_worker, "starting chaos game");

    let pool = (0..workers)
        .map(|index| {
            let flame = job.flame.clone();
            let tables = flame.weight_tables()?;
            Ok(SampleWorker {
                flame,
                tables,
                camera: job.camera,
                palette: job.palette,
                raster: job.raster,
                rng: random.worker_rng(pass, index),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let counters: Vec<AtomicU64> = (0..workers).map(|_| AtomicU64::new(0)).collect();
    let finished = AtomicUsize::new(0);

    let outcome = crossbeam::scope(|spawner| {
        let handles: Vec<ScopedJoinHandle<()>> = pool
            .into_iter()
            .zip(counters.iter())
            .map(|(mut worker, counter)| {
                let finished = &finished;
                spawner.spawn(move |_| {
                    let _finished = Finished(finished);
                    worker.run(per_worker, counter);
                })
            })
            .collect();

        let mut last = 0;
        loop {
            let all_done = finished.load(Ordering::Acquire) == workers;
            let sampled: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
            let percent = if total == 0 { 100 } else { sampled * 100 / total };
            if percent > last && percent < 100 {
                trace!(pass, percent, "sampling");
                report(percent);
                last = percent;
            }
            if all_done {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    let joined = outcome.map_err(|payload| RenderError::from_panic(0, payload.as_ref()))?;
    for (worker, result) in joined.into_iter().enumerate() {
        if let Err(payload) = result {
            return Err(RenderError::from_panic(worker, payload.as_ref()));
        }
    }
    report(100);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flame::{Affine, DrawMode, XForm};
    use crate::variation::Variation;
    use crate::variations::Linear;

    #[derive(Clone, Debug, Default)]
    struct Explode;

    impl Variation for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn transform(
            &self,
            _ctx: &mut TransformContext<'_>,
            _affine: &XYZPoint,
            _out: &mut XYZPoint,
            _amount: f64,
        ) {
            panic!("variation exploded");
        }

        fn box_clone(&self) -> Box<dyn Variation> {
            Box::new(self.clone())
        }
    }

    fn run(flame: &Flame, samples: u64, workers: usize) -> (Raster, Result<()>, Vec<u64>) {
        let camera = CameraProjection::new(flame, flame.width as usize, flame.height as usize, 0);
        let palette = flame.palette.create_render_palette(256);
        let raster = Raster::new(flame.width as usize, flame.height as usize, 0);
        let mut reported = Vec::new();
        let result = {
            let job = SamplingJob {
                flame,
                camera: &camera,
                palette: &palette,
                raster: &raster,
                samples,
                workers,
            };
            iterate(&job, &SeededSource(7), 0, &mut |p| reported.push(p))
        };
        (raster, result, reported)
    }

    fn small(flame: Flame) -> Flame {
        Flame {
            width: 64,
            height: 48,
            pixels_per_unit: 20.0,
            ..flame
        }
    }

    #[test]
    fn sierpinski_fills_the_raster() {
        let (raster, result, reported) = run(&small(Flame::sierpinski()), 20_000, 2);
        assert!(result.is_ok());
        assert!(raster.filled_cells() > 50);
        assert!(raster.total_count() <= 20_000);
        assert_eq!(reported.last(), Some(&100));
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
    }

    fn identity() -> XForm {
        XForm::new(1.0, Affine::IDENTITY).with_variation(Box::new(Linear), 1.0)
    }

    fn filled(raster: &Raster) -> Vec<(usize, usize, u64)> {
        let mut cells = Vec::new();
        for row in 0..raster.height() {
            for column in 0..raster.width() {
                let count = raster.cell(column, row).count();
                if count > 0 {
                    cells.push((column, row, count));
                }
            }
        }
        cells
    }

    #[test]
    fn identity_keeps_hitting_one_cell() {
        let flame = small(Flame {
            xforms: vec![identity()],
            ..Flame::default()
        });
        let (raster, result, _) = run(&flame, 5_000, 1);
        assert!(result.is_ok());
        assert_eq!(raster.filled_cells(), 1);
        assert_eq!(raster.total_count(), 5_000);
    }

    #[test]
    fn final_xform_moves_the_plot_but_not_the_orbit() {
        let plain = small(Flame {
            xforms: vec![identity()],
            ..Flame::default()
        });
        let (raster, result, _) = run(&plain, 1_000, 1);
        assert!(result.is_ok());
        let cells = filled(&raster);
        assert_eq!(cells.len(), 1);
        let (column, row, _) = cells[0];
        assert!(column >= 10);

        // half a unit is ten cells at 20 pixels per unit
        let shifted = Flame {
            final_xform: Some(
                XForm::new(1.0, Affine::scale_translate(1.0, -0.5, 0.0))
                    .with_variation(Box::new(Linear), 1.0),
            ),
            ..plain
        };
        let (raster, result, _) = run(&shifted, 1_000, 1);
        assert!(result.is_ok());
        assert_eq!(filled(&raster), vec![(column - 10, row, 1_000)]);
    }

    #[test]
    fn opaque_xforms_plot_in_proportion_to_opacity() {
        let mut xform = identity();
        xform.draw_mode = DrawMode::Opaque;
        xform.opacity = 0.25;
        let flame = small(Flame {
            xforms: vec![xform],
            ..Flame::default()
        });
        let (raster, result, _) = run(&flame, 10_000, 1);
        assert!(result.is_ok());
        let plotted = raster.total_count();
        assert!(plotted > 2_000 && plotted < 3_000, "plotted {}", plotted);
    }

    #[derive(Debug, Default)]
    struct CountingSource(AtomicUsize);

    impl RandomSource for CountingSource {
        fn worker_rng(&self, pass: u32, worker: usize) -> WorkerRng {
            self.0.fetch_add(1, Ordering::Relaxed);
            Box::new(rand::rngs::StdRng::seed_from_u64(u64::from(pass) * 100 + worker as u64))
        }
    }

    #[test]
    fn any_generator_can_drive_the_workers() {
        let flame = small(Flame::sierpinski());
        let camera = CameraProjection::new(&flame, 64, 48, 0);
        let palette = flame.palette.create_render_palette(256);
        let raster = Raster::new(64, 48, 0);
        let source = CountingSource::default();
        let job = SamplingJob {
            flame: &flame,
            camera: &camera,
            palette: &palette,
            raster: &raster,
            samples: 9_000,
            workers: 3,
        };
        assert!(iterate(&job, &source, 0, &mut |_| {}).is_ok());
        assert_eq!(source.0.load(Ordering::Relaxed), 3);
        assert!(raster.filled_cells() > 50);
    }

    #[test]
    fn hidden_xforms_are_never_plotted() {
        let mut xform = XForm::new(1.0, Affine::scale_translate(0.5, 0.0, 0.0))
            .with_variation(Box::new(Linear), 1.0);
        xform.draw_mode = DrawMode::Hidden;
        let flame = small(Flame {
            xforms: vec![xform],
            ..Flame::default()
        });
        let (raster, result, _) = run(&flame, 1_000, 1);
        assert!(result.is_ok());
        assert_eq!(raster.total_count(), 0);
    }

    #[test]
    fn single_seeded_worker_is_repeatable() {
        let flame = small(Flame::spiral());
        let (a, _, _) = run(&flame, 10_000, 1);
        let (b, _, _) = run(&flame, 10_000, 1);
        for row in 0..a.height() {
            for column in 0..a.width() {
                assert_eq!(a.cell(column, row).count(), b.cell(column, row).count());
                assert_eq!(a.cell(column, row).red(), b.cell(column, row).red());
            }
        }
    }

    #[test]
    fn a_panicking_variation_fails_the_pass() {
        let flame = small(Flame {
            xforms: vec![XForm::new(1.0, Affine::IDENTITY).with_variation(Box::new(Explode), 1.0)],
            ..Flame::default()
        });
        let (_, result, reported) = run(&flame, 1_000, 3);
        match result {
            Err(RenderError::WorkerFailure { worker, message }) => {
                assert_eq!(worker, 0);
                assert!(message.contains("exploded"));
            }
            other => panic!("expected a worker failure, got {:?}", other),
        }
        assert!(!reported.contains(&100));
    }

    #[test]
    fn zero_weights_are_rejected_before_sampling() {
        let flame = small(Flame {
            xforms: vec![XForm::new(0.0, Affine::IDENTITY)],
            ..Flame::default()
        });
        let (_, result, _) = run(&flame, 1_000, 1);
        assert_eq!(result, Err(RenderError::NoDrawableXForm));
    }

    #[test]
    fn seeded_streams_differ_per_worker_and_pass() {
        use rand::RngCore;
        let source = SeededSource(1);
        let a = source.worker_rng(0, 0).next_u64();
        assert_eq!(a, source.worker_rng(0, 0).next_u64());
        assert_ne!(a, source.worker_rng(0, 1).next_u64());
        assert_ne!(a, source.worker_rng(1, 0).next_u64());
    }
}
