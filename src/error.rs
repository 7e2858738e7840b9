// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The ways a render can fail.
//!
//! Configuration problems are caught before a single buffer is
//! allocated or a single thread is started.  Numeric trouble inside
//! the chaos game (a point flying off to infinity, a degenerate view
//! window) is never an error; it is absorbed where it happens.  A
//! worker that panics takes the whole pass down with it.

use std::any::Any;

use failure::Fail;

/// Everything the renderer can report back to its caller.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum RenderError {
    /// Spatial oversampling must be in `1..=6`.
    #[fail(display = "spatial oversample {} is outside 1..=6", _0)]
    SpatialOversample(u32),

    /// Color oversampling must be in `1..=10`.
    #[fail(display = "color oversample {} is outside 1..=10", _0)]
    ColorOversample(u32),

    /// The requested output geometry cannot be rendered.
    #[fail(display = "invalid geometry: {}", _0)]
    InvalidGeometry(String),

    /// None of the image kinds was requested.
    #[fail(display = "no output image was requested")]
    NoOutputRequested,

    /// The scene has xforms, but none of them can ever be chosen.
    #[fail(display = "no xform has a positive weight")]
    NoDrawableXForm,

    /// The registry has no variation of that name.
    #[fail(display = "unknown variation '{}'", _0)]
    UnknownVariation(String),

    /// The variation does not declare a parameter of that name.
    #[fail(display = "variation '{}' has no parameter '{}'", variation, name)]
    UnknownParameter {
        /// Name of the variation that was asked.
        variation: String,
        /// The parameter it did not recognize.
        name: String,
    },

    /// A sampling thread panicked.  Nothing of the pass survives.
    #[fail(display = "render worker {} failed: {}", worker, message)]
    WorkerFailure {
        /// Index of the first worker that failed.
        worker: usize,
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl RenderError {
    /// True for the errors that are detected before any work starts.
    pub fn is_configuration(&self) -> bool {
        match self {
            RenderError::SpatialOversample(_)
            | RenderError::ColorOversample(_)
            | RenderError::InvalidGeometry(_)
            | RenderError::NoOutputRequested
            | RenderError::NoDrawableXForm => true,
            _ => false,
        }
    }

    /// A [`RenderError::WorkerFailure`] for thread `worker`, carrying
    /// the panic payload's text when it has one.
    pub(crate) fn from_panic(worker: usize, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        RenderError::WorkerFailure { worker, message }
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_value() {
        assert_eq!(
            RenderError::SpatialOversample(7).to_string(),
            "spatial oversample 7 is outside 1..=6"
        );
        let e = RenderError::UnknownParameter {
            variation: "fan2".to_string(),
            name: "z".to_string(),
        };
        assert_eq!(e.to_string(), "variation 'fan2' has no parameter 'z'");
    }

    #[test]
    fn worker_failures_are_not_configuration_errors() {
        assert!(RenderError::ColorOversample(0).is_configuration());
        let e = RenderError::WorkerFailure {
            worker: 0,
            message: "boom".to_string(),
        };
        assert!(!e.is_configuration());
    }

    #[test]
    fn panic_payloads_keep_their_text() {
        let owned: Box<dyn Any + Send> = Box::new("lost".to_string());
        assert_eq!(
            RenderError::from_panic(2, owned.as_ref()),
            RenderError::WorkerFailure {
                worker: 2,
                message: "lost".to_string()
            }
        );
        let opaque: Box<dyn Any + Send> = Box::new(17u8);
        assert_eq!(
            RenderError::from_panic(0, opaque.as_ref()).to_string(),
            "render worker 0 failed: unknown panic"
        );
    }
}
