// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Maps points in fractal space onto cells of the accumulation raster.
//!
//! Two stages, both derived once per pass and read-only afterwards.
//! The optional 3D stage rotates the point by the camera's yaw and
//! pitch, divides by the perspective depth and, with depth of field,
//! scatters it by a random offset that grows with its distance from
//! the focal plane.  The view stage then rotates by the camera roll
//! and scales the view window, extended by the filter border on every
//! side, onto the integral raster plane.

use std::f64::consts::PI;

use rand::Rng;

use crate::flame::{Flame, XYZPoint};

/// Below this, yaw, pitch, perspective and depth of field count as off.
pub const EPSILON: f64 = 1.0e-8;

/// Extents smaller than this are considered degenerate.
const MIN_EXTENT: f64 = 0.01;

/// Column and row of a raster cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pixel(pub usize, pub usize);

#[derive(Clone, Debug, PartialEq)]
struct Projection3D {
    matrix: [[f64; 3]; 3],
    perspective: f64,
    dof: f64,
    cam_z: f64,
}

impl Projection3D {
    fn new(flame: &Flame) -> Option<Self> {
        let enabled = flame.cam_yaw.abs() > EPSILON
            || flame.cam_pitch.abs() > EPSILON
            || flame.cam_perspective.abs() > EPSILON
            || flame.cam_dof.abs() > EPSILON;
        if !enabled {
            return None;
        }
        let yaw = -flame.cam_yaw * PI / 180.0;
        let pitch = flame.cam_pitch * PI / 180.0;
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let mut matrix = [[0.0; 3]; 3];
        matrix[0][0] = cy;
        matrix[1][0] = -sy;
        matrix[2][0] = 0.0;
        matrix[0][1] = cp * sy;
        matrix[1][1] = cp * cy;
        matrix[2][1] = -sp;
        matrix[0][2] = sp * sy;
        matrix[1][2] = sp * cy;
        matrix[2][2] = cp;
        Some(Projection3D {
            matrix,
            perspective: flame.cam_perspective,
            dof: flame.cam_dof,
            cam_z: flame.cam_z,
        })
    }

    #[inline]
    fn project<R: Rng + ?Sized>(&self, p: &mut XYZPoint, rng: &mut R) {
        let m = &self.matrix;
        let px = m[0][0] * p.x + m[1][0] * p.y;
        let py = m[0][1] * p.x + m[1][1] * p.y + m[2][1] * p.z;
        let pz = m[0][2] * p.x + m[1][2] * p.y + m[2][2] * p.z;
        let zr = 1.0 - self.perspective * pz;
        if self.dof.abs() > EPSILON {
            let a = 2.0 * PI * rng.gen::<f64>();
            let (dsina, dcosa) = a.sin_cos();
            let zdist = self.cam_z - pz;
            let dr = if zdist > 0.0 {
                rng.gen::<f64>() * self.dof * 0.1 * zdist
            } else {
                0.0
            };
            p.x = (px + dr * dcosa) / zr;
            p.y = (py + dr * dsina) / zr;
        } else {
            p.x = px / zr;
            p.y = py / zr;
        }
    }
}

/// The camera of one render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraProjection {
    projection: Option<Projection3D>,
    cosa: f64,
    sina: f64,
    rc_x: f64,
    rc_y: f64,
    cam_w: f64,
    cam_h: f64,
    bws: f64,
    bhs: f64,
    raster_width: usize,
    raster_height: usize,
}

impl CameraProjection {
    /// Derives the camera for an image of the given size whose raster
    /// carries `border` extra cells on every side.
    pub fn new(flame: &Flame, image_width: usize, image_height: usize, border: usize) -> Self {
        let mut ppu = flame.pixels_per_unit * flame.cam_zoom;
        if !ppu.is_finite() || ppu.abs() < EPSILON {
            ppu = 1.0;
        }
        let raster_width = image_width + 2 * border;
        let raster_height = image_height + 2 * border;

        let corner_x = flame.centre_x - image_width as f64 / ppu / 2.0;
        let corner_y = flame.centre_y - image_height as f64 / ppu / 2.0;
        let t = border as f64 / ppu;
        let cam_x0 = corner_x - t;
        let cam_y0 = corner_y - t;
        let cam_x1 = corner_x + image_width as f64 / ppu + t;
        let cam_y1 = corner_y + image_height as f64 / ppu + t;

        let cam_w = cam_x1 - cam_x0;
        let x_size = if cam_w.abs() > MIN_EXTENT {
            1.0 / cam_w
        } else {
            1.0
        };
        let cam_h = cam_y1 - cam_y0;
        let y_size = if cam_h.abs() > MIN_EXTENT {
            1.0 / cam_h
        } else {
            1.0
        };

        let roll = -PI * flame.cam_roll / 180.0;
        let (sina, cosa) = roll.sin_cos();
        CameraProjection {
            projection: Projection3D::new(flame),
            cosa,
            sina,
            rc_x: flame.centre_x * (1.0 - cosa) - flame.centre_y * sina - cam_x0,
            rc_y: flame.centre_y * (1.0 - cosa) + flame.centre_x * sina - cam_y0,
            cam_w,
            cam_h,
            bws: (raster_width as f64 - 0.5) * x_size,
            bhs: (raster_height as f64 - 0.5) * y_size,
            raster_width,
            raster_height,
        }
    }

    /// Whether the 3D stage runs at all.
    pub fn is_3d(&self) -> bool {
        self.projection.is_some()
    }

    /// The same camera with depth of field switched off.
    pub fn without_depth_of_field(&self) -> Self {
        let projection = self.projection.as_ref().and_then(|p| {
            let still_3d =
                p.perspective.abs() > EPSILON || p.matrix != Projection3D::identity_matrix();
            if still_3d {
                Some(Projection3D { dof: 0.0, ..p.clone() })
            } else {
                None
            }
        });
        CameraProjection {
            projection,
            ..self.clone()
        }
    }

    /// Applies the 3D stage to `p` in place.  A no-op when the camera
    /// is flat.
    #[inline]
    pub fn project<R: Rng + ?Sized>(&self, p: &mut XYZPoint, rng: &mut R) {
        if let Some(projection) = &self.projection {
            projection.project(p, rng);
        }
    }

    /// Maps an already projected point onto the raster.  `None` when it
    /// falls outside the view window or is not a finite number.
    #[inline]
    pub fn point_to_pixel(&self, x: f64, y: f64) -> Option<Pixel> {
        let px = x * self.cosa + y * self.sina + self.rc_x;
        if !(px >= 0.0 && px <= self.cam_w) {
            return None;
        }
        let py = y * self.cosa - x * self.sina + self.rc_y;
        if !(py >= 0.0 && py <= self.cam_h) {
            return None;
        }
        let column = (self.bws * px + 0.5) as usize;
        let row = (self.bhs * py + 0.5) as usize;
        if column < self.raster_width && row < self.raster_height {
            Some(Pixel(column, row))
        } else {
            None
        }
    }

    /// Projects a copy of `p` and maps it onto the raster.
    #[inline]
    pub fn raster_coordinate<R: Rng + ?Sized>(&self, p: &XYZPoint, rng: &mut R) -> Option<Pixel> {
        let mut q = *p;
        self.project(&mut q, rng);
        self.point_to_pixel(q.x, q.y)
    }

    /// Raster size in cells, `(width, height)`.
    pub fn raster_size(&self) -> (usize, usize) {
        (self.raster_width, self.raster_height)
    }
}

impl Projection3D {
    fn identity_matrix() -> [[f64; 3]; 3] {
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
    }
}
