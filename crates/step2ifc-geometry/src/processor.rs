// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-part geometry processing: load, heal, tessellate, measure

use crate::curve::ChordTolerance;
use crate::heal::heal;
use crate::mesh::TriangleMesh;
use crate::router::ShapeRouter;
use crate::shape::{Shape, ShapeBuilder};
use crate::triangulation::triangulate_shape;
use crate::{GeometryError, Result};
use rayon::prelude::*;
use step2ifc_model::{EntityResolver, GeometryMetrics, Part};

/// Tessellation and healing settings
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryOptions {
    /// Linear deflection for curved surfaces, in working units
    pub deflection: f64,
    /// Angular deflection in radians
    pub angle: f64,
    pub max_heal_passes: u32,
    /// Distance below which vertices are sewn together
    pub sewing_tolerance: f64,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            deflection: 0.5,
            angle: 0.5,
            max_heal_passes: 3,
            sewing_tolerance: 1e-6,
        }
    }
}

impl GeometryOptions {
    pub fn chords(&self) -> ChordTolerance {
        ChordTolerance {
            deflection: self.deflection,
            angle: self.angle,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(GeometryError::options(format!(
                    "{} must be strictly positive, got {}",
                    name, v
                )))
            }
        };
        positive("deflection", self.deflection)?;
        positive("angle", self.angle)?;
        positive("sewing_tolerance", self.sewing_tolerance)?;
        if self.max_heal_passes == 0 {
            return Err(GeometryError::options("max_heal_passes must be at least 1"));
        }
        Ok(())
    }
}

/// Healed shape and its tessellation, both in the part's local coordinates
#[derive(Clone, Debug)]
pub struct ProcessedShape {
    pub shape: Shape,
    pub mesh: TriangleMesh,
}

/// Loads, heals and measures part shapes
pub struct GeometryProcessor {
    router: ShapeRouter,
    options: GeometryOptions,
}

impl GeometryProcessor {
    pub fn new(options: GeometryOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            router: ShapeRouter::with_default_processors(),
            options,
        })
    }

    /// Use a custom router, e.g. with extra item processors registered
    pub fn with_router(options: GeometryOptions, router: ShapeRouter) -> Result<Self> {
        options.validate()?;
        Ok(Self { router, options })
    }

    pub fn options(&self) -> &GeometryOptions {
        &self.options
    }

    /// Process one part's own shape
    ///
    /// Metrics are measured on the mesh placed by `part.transform`.
    pub fn process(
        &self,
        part: &Part,
        resolver: &dyn EntityResolver,
    ) -> Result<(GeometryMetrics, ProcessedShape)> {
        let items = match &part.shape {
            Some(handle) if !handle.items.is_empty() => &handle.items,
            _ => return Err(GeometryError::NoGeometry(part.name.clone())),
        };

        let mut builder = ShapeBuilder::with_chords(self.options.chords());
        for &id in items {
            let entity = resolver
                .get(id)
                .ok_or_else(|| GeometryError::entity_not_found(id))?;
            self.router.load_item(&entity, resolver, &mut builder)?;
        }
        let mut shape = builder.finish();

        let report = heal(
            &mut shape,
            self.options.max_heal_passes,
            self.options.sewing_tolerance,
        );
        for repair in &report.repairs {
            log::debug!("Part {} ({}): {}", part.id, part.name, repair);
        }
        if !report.defects.is_empty() {
            log::warn!(
                "Part {} ({}) still invalid after {} passes: {} defects",
                part.id,
                part.name,
                report.passes,
                report.defects.len()
            );
        }

        let mesh = triangulate_shape(&shape);
        let world = mesh.transformed(&part.transform);
        let metrics = GeometryMetrics {
            bbox: world.bounding_box(),
            volume: world.signed_volume(),
            centroid: world.centroid(),
            status: report.status,
            repairs: report.repairs,
            defects: report.defects,
        };

        Ok((metrics, ProcessedShape { shape, mesh }))
    }

    /// Process parts on the current rayon pool
    ///
    /// Results come back in input order. Parts not started before
    /// `cancelled` returns true yield `None`.
    pub fn process_parts(
        &self,
        parts: &[&Part],
        resolver: &dyn EntityResolver,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Vec<Option<Result<(GeometryMetrics, ProcessedShape)>>> {
        parts
            .par_iter()
            .map(|part| {
                if cancelled() {
                    return None;
                }
                Some(self.process(part, resolver))
            })
            .collect()
    }
}
