// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conic edge discretization and surface frames

use nalgebra::{Point3, Vector3};
use std::f64::consts::TAU;
use step2ifc_model::Transform;

/// Upper bound on chords per edge
const MAX_SEGMENTS: usize = 4096;

/// Chord sizing for curved edges
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChordTolerance {
    /// Largest distance between a chord and its arc
    pub deflection: f64,
    /// Largest angle subtended by one chord, in radians
    pub angle: f64,
}

impl Default for ChordTolerance {
    fn default() -> Self {
        Self {
            deflection: 0.5,
            angle: 0.5,
        }
    }
}

impl ChordTolerance {
    /// Number of chords for an arc of `sweep` radians on a circle of `radius`
    ///
    /// The finer of the deflection and angle bounds wins. No chord spans more
    /// than a third of a turn.
    pub fn segments(&self, radius: f64, sweep: f64) -> usize {
        let sweep = sweep.abs();
        if sweep == 0.0 || !sweep.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return 1;
        }

        let by_angle = (sweep / self.angle).ceil();
        let by_deflection = if self.deflection < radius {
            // Sagitta of a chord subtending `step` is r (1 - cos(step / 2))
            let step = 2.0 * (1.0 - self.deflection / radius).acos();
            (sweep / step).ceil()
        } else {
            1.0
        };
        let by_turn = (sweep / (TAU / 3.0) - 1e-9).ceil();

        let segments = by_angle.max(by_deflection).max(by_turn).max(1.0);
        (segments as usize).min(MAX_SEGMENTS)
    }
}

/// Right-handed orthonormal frame of an AXIS2_PLACEMENT_3D
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub origin: Point3<f64>,
    pub x: Vector3<f64>,
    pub y: Vector3<f64>,
    pub z: Vector3<f64>,
}

impl Frame {
    pub fn from_axes(origin: [f64; 3], axis: Option<[f64; 3]>, ref_direction: Option<[f64; 3]>) -> Self {
        let t = Transform::from_axes(origin, axis, ref_direction);
        let column = |c: usize| Vector3::new(t.m[c * 4], t.m[c * 4 + 1], t.m[c * 4 + 2]);
        Self {
            origin: Point3::new(origin[0], origin[1], origin[2]),
            x: column(0),
            y: column(1),
            z: column(2),
        }
    }

    /// Angle of `p` around the frame's Z axis, measured from X
    pub fn angle_of(&self, p: &Point3<f64>) -> f64 {
        let d = p - self.origin;
        d.dot(&self.y).atan2(d.dot(&self.x))
    }

    /// Height of `p` along the frame's Z axis
    pub fn height_of(&self, p: &Point3<f64>) -> f64 {
        (p - self.origin).dot(&self.z)
    }
}

/// CIRCLE or ELLIPSE in its placement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conic {
    pub frame: Frame,
    pub semi_x: f64,
    pub semi_y: f64,
}

impl Conic {
    pub fn circle(frame: Frame, radius: f64) -> Self {
        Self {
            frame,
            semi_x: radius,
            semi_y: radius,
        }
    }

    pub fn ellipse(frame: Frame, semi_x: f64, semi_y: f64) -> Self {
        Self {
            frame,
            semi_x,
            semi_y,
        }
    }

    pub fn point(&self, t: f64) -> [f64; 3] {
        let p = self.frame.origin
            + self.frame.x * (self.semi_x * t.cos())
            + self.frame.y * (self.semi_y * t.sin());
        [p.x, p.y, p.z]
    }

    /// Curve parameter of a point on (or near) the conic
    pub fn parameter(&self, p: [f64; 3]) -> f64 {
        let d = Point3::new(p[0], p[1], p[2]) - self.frame.origin;
        (d.dot(&self.frame.y) / self.semi_y).atan2(d.dot(&self.frame.x) / self.semi_x)
    }

    /// Chord points strictly between `start` and `end`
    ///
    /// `forward` follows increasing parameter. A `closed` edge runs a full
    /// turn from `start` back to itself.
    pub fn interior(
        &self,
        start: [f64; 3],
        end: [f64; 3],
        closed: bool,
        forward: bool,
        chords: &ChordTolerance,
    ) -> Vec<[f64; 3]> {
        let t0 = self.parameter(start);
        let t1 = self.parameter(end);
        let sweep = match (closed, forward) {
            (true, true) => TAU,
            (true, false) => -TAU,
            (false, true) => (t1 - t0).rem_euclid(TAU),
            (false, false) => -(t0 - t1).rem_euclid(TAU),
        };
        if sweep == 0.0 {
            return Vec::new();
        }

        let n = chords.segments(self.semi_x.max(self.semi_y), sweep);
        (1..n)
            .map(|i| self.point(t0 + sweep * i as f64 / n as f64))
            .collect()
    }
}
