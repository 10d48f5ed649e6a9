//! Point types and related functionality

use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// Normal assigned when no better estimate exists (imports, degenerate fits).
pub const DEFAULT_NORMAL: Vector3f = Vector3f::new(0.0, 0.0, 1.0);

/// Orthonormal frame `(u, v, n)` whose third axis is the given normal.
///
/// The tangent axes are chosen deterministically from the normal's smallest
/// component. A zero or non-finite normal falls back to [`DEFAULT_NORMAL`].
pub fn tangent_frame(normal: &Vector3f) -> (Vector3f, Vector3f, Vector3f) {
    let n = match normal.try_normalize(1e-12) {
        Some(n) if n.iter().all(|c| c.is_finite()) => n,
        _ => DEFAULT_NORMAL,
    };
    let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());
    let axis = if ax <= ay && ax <= az {
        Vector3f::x()
    } else if ay <= az {
        Vector3f::y()
    } else {
        Vector3f::z()
    };
    let u = n.cross(&axis).normalize();
    let v = n.cross(&u);
    (u, v, n)
}

/// A point tagged with its insertion-order index in the owning cloud.
///
/// Neighbor identity is the index, never the coordinates, so duplicate
/// positions stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub position: Point3f,
    pub index: usize,
}

impl IndexedPoint {
    pub fn new(position: Point3f, index: usize) -> Self {
        Self { position, index }
    }

    /// Euclidean distance to an arbitrary point, see [`point_distance`]
    pub fn distance(&self, other: &Point3f) -> f64 {
        point_distance(&self.position, other)
    }
}

/// Euclidean distance evaluated in `f64`.
///
/// Any two finite `f32` points have a finite distance that is zero only when
/// their coordinates are equal, which `f32` arithmetic cannot promise at
/// the extremes of its range.
pub fn point_distance(a: &Point3f, b: &Point3f) -> f64 {
    (a.coords.cast::<f64>() - b.coords.cast::<f64>()).norm()
}

/// One result of a nearest neighbor query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub point: IndexedPoint,
    pub distance: f64,
}

impl Neighbor {
    pub fn index(&self) -> usize {
        self.point.index
    }
}

/// A point with normal vector, laid out as six packed floats for vertex buffers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct NormalPoint3f {
    pub position: Point3f,
    pub normal: Vector3f,
}

unsafe impl Pod for NormalPoint3f {}
unsafe impl Zeroable for NormalPoint3f {}

impl Default for NormalPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            normal: DEFAULT_NORMAL,
        }
    }
}

/// Two vertices of a normal-visualization line segment: the point itself
/// and the point offset along its scaled normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct NormalLineVertex {
    pub start: NormalPoint3f,
    pub end: NormalPoint3f,
}

unsafe impl Pod for NormalLineVertex {}
unsafe impl Zeroable for NormalLineVertex {}
