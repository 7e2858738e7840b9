// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The accumulation raster.
//!
//! One raster per pass, sized to the (oversampled) image plus the
//! filter border on every side.  Every worker writes into the same
//! raster at once.  Cells are updated with a relaxed load followed by
//! a relaxed store, not a read-modify-write: two workers hitting the
//! same cell in the same instant may lose one of the two samples.  The
//! raster is a histogram of millions of samples, so a lost sample is
//! noise, never corruption, and no worker ever waits on another.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::camera::Pixel;
use crate::palette::RenderColor;

/// Sample count and color sums of one raster cell.
#[derive(Debug, Default)]
pub struct RasterCell {
    count: AtomicU64,
    red: AtomicU64,
    green: AtomicU64,
    blue: AtomicU64,
}

#[inline]
fn add_f64(slot: &AtomicU64, value: f64) {
    let sum = f64::from_bits(slot.load(Ordering::Relaxed)) + value;
    slot.store(sum.to_bits(), Ordering::Relaxed);
}

impl RasterCell {
    /// Records one sample of the given color.
    #[inline]
    pub fn add_sample(&self, color: RenderColor) {
        let count = self.count.load(Ordering::Relaxed);
        self.count.store(count + 1, Ordering::Relaxed);
        add_f64(&self.red, color.red);
        add_f64(&self.green, color.green);
        add_f64(&self.blue, color.blue);
    }

    /// Number of samples that landed here.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of the red channel of every sample.
    #[inline]
    pub fn red(&self) -> f64 {
        f64::from_bits(self.red.load(Ordering::Relaxed))
    }

    /// Sum of the green channel of every sample.
    #[inline]
    pub fn green(&self) -> f64 {
        f64::from_bits(self.green.load(Ordering::Relaxed))
    }

    /// Sum of the blue channel of every sample.
    #[inline]
    pub fn blue(&self) -> f64 {
        f64::from_bits(self.blue.load(Ordering::Relaxed))
    }
}

/// A fixed-size grid of [`RasterCell`]s.
#[derive(Debug)]
pub struct Raster {
    width: usize,
    height: usize,
    border: usize,
    cells: Vec<RasterCell>,
}

impl Raster {
    /// Allocates a zeroed raster for an image of the given size with
    /// `border` extra cells on every side.
    pub fn new(image_width: usize, image_height: usize, border: usize) -> Self {
        let width = image_width + 2 * border;
        let height = image_height + 2 * border;
        Raster {
            width,
            height,
            border,
            cells: (0..width * height).map(|_| RasterCell::default()).collect(),
        }
    }

    /// Width in cells, border included.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells, border included.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width of the border on each side.
    pub fn border(&self) -> usize {
        self.border
    }

    /// Width of the image this raster feeds.
    pub fn image_width(&self) -> usize {
        self.width - 2 * self.border
    }

    /// Height of the image this raster feeds.
    pub fn image_height(&self) -> usize {
        self.height - 2 * self.border
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a raster without cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell at `pixel`, if it lies on the raster.
    #[inline]
    pub fn cell_at(&self, pixel: Pixel) -> Option<&RasterCell> {
        let Pixel(column, row) = pixel;
        if column < self.width && row < self.height {
            Some(&self.cells[row * self.width + column])
        } else {
            None
        }
    }

    /// The cell at `(column, row)`.  Panics when out of bounds; the
    /// filters only read inside the border by construction.
    #[inline]
    pub fn cell(&self, column: usize, row: usize) -> &RasterCell {
        &self.cells[row * self.width + column]
    }

    /// Records a sample at `pixel`.  Returns false when it is off the
    /// raster.
    #[inline]
    pub fn add_sample(&self, pixel: Pixel, color: RenderColor) -> bool {
        match self.cell_at(pixel) {
            Some(cell) => {
                cell.add_sample(color);
                true
            }
            None => false,
        }
    }

    /// Number of cells hit at least once.
    pub fn filled_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.count() > 0).count()
    }

    /// Sum of all sample counts.
    pub fn total_count(&self) -> u64 {
        self.cells.iter().map(RasterCell::count).sum()
    }
}
