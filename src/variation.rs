// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The contract between the renderer and the nonlinear point
//! transforms ("variations") an xform blends together.
//!
//! The renderer never knows which variations exist.  It asks each one
//! to add its contribution, scaled by an amount, into an output point.
//! New variations are plugged in by registering a factory under a name
//! in a [`VariationRegistry`].

use std::collections::BTreeMap;
use std::fmt;

use rand::{Rng, RngCore};

use crate::error::{RenderError, Result};
use crate::flame::XYZPoint;

/// What a variation may use besides its input point: the worker's own
/// random stream, and whether the z coordinate should survive planar
/// transforms.
pub struct TransformContext<'a> {
    rng: &'a mut dyn RngCore,
    /// Planar variations carry `z` through, scaled by their amount.
    pub preserve_z: bool,
}

impl<'a> TransformContext<'a> {
    /// Wraps a worker's random stream.
    pub fn new(rng: &'a mut dyn RngCore, preserve_z: bool) -> Self {
        TransformContext { rng, preserve_z }
    }

    /// A uniform sample in `[0, 1)`.
    #[inline]
    pub fn random(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// A uniform integer in `0..n`.  `n` must be positive.
    #[inline]
    pub fn random_below(&mut self, n: u32) -> u32 {
        self.rng.gen_range(0..n)
    }
}

/// A named, parameterized point transform.
///
/// `transform` adds `amount` times its result into `out`; it must not
/// overwrite what other variations of the same xform already put there.
pub trait Variation: Send + Sync + fmt::Debug {
    /// The registry name.
    fn name(&self) -> &'static str;

    /// Names of the tunable parameters, in declaration order.
    fn parameter_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Current value of a parameter.
    fn parameter(&self, _name: &str) -> Option<f64> {
        None
    }

    /// Sets a parameter by name.
    fn set_parameter(&mut self, name: &str, _value: f64) -> Result<()> {
        Err(RenderError::UnknownParameter {
            variation: self.name().to_string(),
            name: name.to_string(),
        })
    }

    /// Adds this variation's contribution for `affine` into `out`.
    fn transform(
        &self,
        ctx: &mut TransformContext<'_>,
        affine: &XYZPoint,
        out: &mut XYZPoint,
        amount: f64,
    );

    /// A deep copy, so every worker owns its own instance.
    fn box_clone(&self) -> Box<dyn Variation>;
}

impl Clone for Box<dyn Variation> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Builds a fresh variation with default parameters.
pub type VariationFactory = fn() -> Box<dyn Variation>;

/// Name → factory lookup.
#[derive(Clone)]
pub struct VariationRegistry {
    factories: BTreeMap<&'static str, VariationFactory>,
}

impl VariationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        VariationRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every variation this crate ships.
    pub fn builtin() -> Self {
        let mut registry = VariationRegistry::new();
        for factory in crate::variations::BUILTIN.iter() {
            registry.register(*factory);
        }
        registry
    }

    /// Adds a factory under the name its variations report.  A later
    /// registration replaces an earlier one of the same name.
    pub fn register(&mut self, factory: VariationFactory) {
        let name = factory().name();
        self.factories.insert(name, factory);
    }

    /// Creates the named variation.
    pub fn create(&self, name: &str) -> Result<Box<dyn Variation>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| RenderError::UnknownVariation(name.to_string()))
    }

    /// Creates the named variation and applies parameter overrides.
    pub fn create_with(&self, name: &str, params: &[(&str, f64)]) -> Result<Box<dyn Variation>> {
        let mut variation = self.create(name)?;
        for (param, value) in params {
            variation.set_parameter(param, *value)?;
        }
        Ok(variation)
    }

    /// The declared parameters of a variation with their defaults.
    pub fn declared_parameters(&self, name: &str) -> Result<Vec<(&'static str, f64)>> {
        let variation = self.create(name)?;
        Ok(variation
            .parameter_names()
            .iter()
            .map(|p| (*p, variation.parameter(p).unwrap_or(0.0)))
            .collect())
    }

    /// Every registered name, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().cloned()
    }
}

impl Default for VariationRegistry {
    fn default() -> Self {
        VariationRegistry::builtin()
    }
}

impl fmt::Debug for VariationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_linear() {
        let registry = VariationRegistry::builtin();
        let linear = registry.create("linear").unwrap();
        assert_eq!(linear.name(), "linear");
        assert!(registry.names().any(|n| n == "fan2"));
    }

    #[test]
    fn unknown_names_are_errors() {
        let registry = VariationRegistry::builtin();
        assert_eq!(
            registry.create("no-such-thing").unwrap_err(),
            RenderError::UnknownVariation("no-such-thing".to_string())
        );
    }

    #[test]
    fn declared_parameters_report_defaults() {
        let registry = VariationRegistry::builtin();
        let params = registry.declared_parameters("fan2").unwrap();
        assert_eq!(params, vec![("x", 0.5), ("y", 1.2)]);
        assert!(registry.declared_parameters("linear").unwrap().is_empty());
    }

    #[test]
    fn overrides_are_applied_and_checked() {
        let registry = VariationRegistry::builtin();
        let rect = registry
            .create_with("rectangles", &[("x", 0.25), ("y", 0.5)])
            .unwrap();
        assert_eq!(rect.parameter("x"), Some(0.25));
        assert!(registry.create_with("linear", &[("x", 1.0)]).is_err());
    }
}
