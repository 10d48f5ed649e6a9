//! Ordered storage of points and their normals

use crate::error::{Error, Result};
use crate::point::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fraction of an imported cloud that is kept: the first `len / IMPORT_DIVISOR`
/// points. See [`PointStore::import_xyz`].
pub const IMPORT_DIVISOR: usize = 25;

/// The points and normals of one cloud, stored as parallel arrays.
///
/// Index `i` identifies the pair `(points[i], normals[i])`; both arrays always
/// have the same length because they can only be grown or shrunk together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointStore {
    points: Vec<Point3f>,
    normals: Vec<Vector3f>,
}

impl PointStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store with room for `capacity` points
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            normals: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3f] {
        &self.points
    }

    pub fn normals(&self) -> &[Vector3f] {
        &self.normals
    }

    /// Normals can be rewritten in place; the slice cannot change length.
    pub fn normals_mut(&mut self) -> &mut [Vector3f] {
        &mut self.normals
    }

    pub fn point(&self, index: usize) -> Option<Point3f> {
        self.points.get(index).copied()
    }

    pub fn normal(&self, index: usize) -> Option<Vector3f> {
        self.normals.get(index).copied()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.normals.clear();
    }

    /// Reserve room for `additional` points, reporting allocation failure
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.points.try_reserve(additional)?;
        self.normals.try_reserve(additional)?;
        Ok(())
    }

    /// Append a point and return its index
    pub fn push(&mut self, point: Point3f, normal: Vector3f) -> usize {
        self.points.push(point);
        self.normals.push(normal);
        self.points.len() - 1
    }

    /// Overwrite the point and normal stored at `index`
    pub fn replace(&mut self, index: usize, point: Point3f, normal: Vector3f) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        self.points[index] = point;
        self.normals[index] = normal;
        Ok(())
    }

    /// Remove every index in `indices` in one pass.
    ///
    /// Survivors keep their relative order; indices may be unsorted or
    /// repeated. Returns the number of points removed.
    pub fn remove_indices(&mut self, indices: &[usize]) -> Result<usize> {
        let len = self.len();
        let mut doomed = vec![false; len];
        for &index in indices {
            if index >= len {
                return Err(Error::IndexOutOfBounds { index, len });
            }
            doomed[index] = true;
        }

        let mut keep = doomed.iter().map(|d| !d);
        self.points.retain(|_| keep.next().unwrap_or(true));
        let mut keep = doomed.iter().map(|d| !d);
        self.normals.retain(|_| keep.next().unwrap_or(true));

        Ok(len - self.len())
    }

    /// Replace the contents with an external coordinate list.
    ///
    /// Only the first `coords.len() / IMPORT_DIVISOR` points are kept; the
    /// centroid of that subset is subtracted from each of them and every
    /// normal is set to [`DEFAULT_NORMAL`]. Returns the centroid that was
    /// removed (the origin when nothing was kept).
    ///
    /// The truncation reproduces long-standing import behavior and is
    /// covered by tests; whether it was intended is unresolved.
    pub fn import_xyz(&mut self, coords: &[[f32; 3]]) -> Result<Point3f> {
        self.clear();

        let npoints = coords.len() / IMPORT_DIVISOR;
        if npoints == 0 {
            return Ok(Point3f::origin());
        }
        self.try_reserve(npoints)?;

        let subset = &coords[..npoints];
        let sum = subset
            .iter()
            .fold(Vector3f::zeros(), |acc, c| acc + Vector3f::new(c[0], c[1], c[2]));
        let centroid = Point3f::from(sum / npoints as f32);

        for c in subset {
            let p = Point3f::new(c[0] - centroid.x, c[1] - centroid.y, c[2] - centroid.z);
            self.push(p, DEFAULT_NORMAL);
        }

        Ok(centroid)
    }

    /// Coordinates in index order
    pub fn to_xyz(&self) -> Vec<[f32; 3]> {
        self.points.iter().map(|p| [p.x, p.y, p.z]).collect()
    }

    /// Replace the contents with `npoints` random samples of a plane.
    ///
    /// Samples are uniform over `[-1, 1]^2` in the plane through the origin
    /// orthogonal to `normal`, displaced along the normal by `height(u, v)`
    /// when given. Every normal is set to the plane normal.
    pub fn fill_random_plane<R: Rng + ?Sized>(
        &mut self,
        normal: Vector3f,
        npoints: usize,
        height: Option<&dyn Fn(f32, f32) -> f32>,
        rng: &mut R,
    ) -> Result<()> {
        self.clear();
        self.try_reserve(npoints)?;

        let (u, v, n) = tangent_frame(&normal);
        for _ in 0..npoints {
            let xu: f32 = rng.gen_range(-1.0..=1.0);
            let xv: f32 = rng.gen_range(-1.0..=1.0);
            let h = height.map_or(0.0, |f| f(xu, xv));
            let p = Point3f::from(u * xu + v * xv + n * h);
            self.push(p, n);
        }
        Ok(())
    }

    /// Interleaved position/normal vertices, one per point
    pub fn vertex_buffer(&self) -> Vec<NormalPoint3f> {
        self.points
            .iter()
            .zip(&self.normals)
            .map(|(&position, &normal)| NormalPoint3f { position, normal })
            .collect()
    }

    /// Line segments from each point along its normal scaled by `scale`
    pub fn normal_line_buffer(&self, scale: f32) -> Vec<NormalLineVertex> {
        self.points
            .iter()
            .zip(&self.normals)
            .map(|(&position, &normal)| NormalLineVertex {
                start: NormalPoint3f { position, normal },
                end: NormalPoint3f {
                    position: position + normal * scale,
                    normal,
                },
            })
            .collect()
    }

    /// Iterate over `(point, normal)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (&Point3f, &Vector3f)> {
        self.points.iter().zip(self.normals.iter())
    }
}
