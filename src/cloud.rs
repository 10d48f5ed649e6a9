//! The shared, locked point cloud
//!
//! A [`Cloud`] owns one [`PointStore`] and at most one [`CoverTree`] built
//! over it. Every operation goes through a [`CloudGuard`] obtained from
//! [`Cloud::lock`]; holding the guard is what entitles a caller to run
//! several operations back to back without another writer stepping in.

use cloudrec_algorithms::{approx_norm, estimate_cloud_normals, select_hole_indices, CoverTree};
use cloudrec_core::{
    DecimateConfig, Error, Neighbor, NormalConfig, NormalLineVertex, NormalPoint3f, Point3f, PointStore,
    ProgressObserver, ReconstructConfig, Result, Vector3f, DEFAULT_PROGRESS_FREQUENCY,
};
use cloudrec_reconstruction::{add_indexed_point, reconstruct, ReconstructReport};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug)]
struct CloudState {
    store: PointStore,
    /// Present only while it indexes exactly the points of `store`
    index: Option<CoverTree>,
    frequency: u32,
    debug_segments: Vec<(Point3f, Point3f)>,
}

/// A point cloud shared between threads, one writer at a time
pub struct Cloud {
    state: Mutex<CloudState>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Default for Cloud {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloud")
            .field("state", &self.state)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Cloud {
    /// Create an empty cloud with no progress observer
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState {
                store: PointStore::new(),
                index: None,
                frequency: DEFAULT_PROGRESS_FREQUENCY,
                debug_segments: Vec::new(),
            }),
            observer: None,
        }
    }

    /// Report long-running operations to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn ProgressObserver>>) {
        self.observer = observer;
    }

    /// Take exclusive access to the cloud.
    ///
    /// Blocks while another guard is alive. A panic in a previous holder
    /// does not poison the cloud: every operation leaves the store and the
    /// index consistent before it can fail.
    pub fn lock(&self) -> CloudGuard<'_> {
        CloudGuard {
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
            observer: self.observer.as_deref(),
        }
    }
}

/// Exclusive access to a [`Cloud`], released on drop
pub struct CloudGuard<'a> {
    state: MutexGuard<'a, CloudState>,
    observer: Option<&'a dyn ProgressObserver>,
}

impl CloudGuard<'_> {
    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.store.is_empty()
    }

    pub fn store(&self) -> &PointStore {
        &self.state.store
    }

    pub fn points(&self) -> &[Point3f] {
        self.state.store.points()
    }

    pub fn normals(&self) -> &[Vector3f] {
        self.state.store.normals()
    }

    pub fn point(&self, index: usize) -> Option<Point3f> {
        self.state.store.point(index)
    }

    pub fn normal(&self, index: usize) -> Option<Vector3f> {
        self.state.store.normal(index)
    }

    /// Whether queries can currently be answered
    pub fn has_spatial_index(&self) -> bool {
        self.state.index.is_some()
    }

    /// Reporting step, in percent, for long-running operations
    pub fn progress_frequency(&self) -> u32 {
        self.state.frequency
    }

    pub fn set_progress_frequency(&mut self, frequency: u32) {
        self.state.frequency = frequency;
    }

    fn invalidate_index(&mut self) {
        if self.state.index.take().is_some() {
            debug!("Spatial index dropped after cloud mutation");
        }
    }

    /// Remove every point, the index and the debug segments
    pub fn clear(&mut self) {
        self.state.store.clear();
        self.state.index = None;
        self.state.debug_segments.clear();
    }

    /// Replace the cloud with imported coordinates, see [`PointStore::import_xyz`]
    pub fn import_xyz(&mut self, coords: &[[f32; 3]]) -> Result<Point3f> {
        self.invalidate_index();
        self.state.debug_segments.clear();
        let centroid = self.state.store.import_xyz(coords)?;
        info!("Imported {} of {} points", self.state.store.len(), coords.len());
        Ok(centroid)
    }

    /// Coordinates of every point in index order
    pub fn to_xyz(&self) -> Vec<[f32; 3]> {
        self.state.store.to_xyz()
    }

    /// Replace the cloud with random samples of a plane
    pub fn fill_random_plane<R: Rng + ?Sized>(
        &mut self,
        normal: Vector3f,
        npoints: usize,
        height: Option<&dyn Fn(f32, f32) -> f32>,
        rng: &mut R,
    ) -> Result<()> {
        self.invalidate_index();
        self.state.debug_segments.clear();
        self.state.store.fill_random_plane(normal, npoints, height, rng)
    }

    /// Append a point, keeping an existing index up to date. Returns its index.
    pub fn add_point(&mut self, point: Point3f, normal: Vector3f) -> Result<usize> {
        let state = &mut *self.state;
        match state.index.as_mut() {
            Some(index) => add_indexed_point(&mut state.store, index, point, normal),
            None => Ok(state.store.push(point, normal)),
        }
    }

    /// Overwrite one point. The index cannot move points, so it is dropped.
    pub fn replace_point(&mut self, index: usize, point: Point3f, normal: Vector3f) -> Result<()> {
        self.state.store.replace(index, point, normal)?;
        self.invalidate_index();
        Ok(())
    }

    /// Build a fresh index over the current points.
    ///
    /// The previous index stays in place until the new one is complete; a
    /// failed build leaves the cloud without an index.
    pub fn build_spatial_index(&mut self) -> Result<()> {
        let frequency = self.state.frequency;
        match CoverTree::build(self.state.store.points(), self.observer, frequency) {
            Ok(tree) => {
                info!("Spatial index built over {} points", tree.len());
                self.state.index = Some(tree);
                Ok(())
            }
            Err(e) => {
                self.state.index = None;
                Err(e)
            }
        }
    }

    fn index(&self) -> Result<&CoverTree> {
        self.state.index.as_ref().ok_or(Error::IndexNotBuilt)
    }

    /// The `k` points nearest to `query`, by distance then index
    pub fn point_knn(&self, query: &Point3f, k: usize) -> Result<Vec<Neighbor>> {
        self.index()?.k_nearest_neighbors(query, k)
    }

    /// Normal estimate at `point` from its `k` nearest neighbors
    pub fn approx_norm(&self, point: &Point3f, iters: usize, k: usize) -> Result<Vector3f> {
        approx_norm(self.index()?, point, iters, k)
    }

    /// Re-estimate every normal in place. Returns the number of degenerate
    /// neighborhoods that fell back to the default normal.
    pub fn approx_cloud_norms(&mut self, config: &NormalConfig) -> Result<usize> {
        let frequency = self.state.frequency;
        let state = &mut *self.state;
        let index = state.index.as_ref().ok_or(Error::IndexNotBuilt)?;
        estimate_cloud_normals(&mut state.store, index, config, self.observer, frequency)
    }

    /// Punch random holes into the cloud. Returns the number of points removed.
    pub fn decimate(&mut self, config: &DecimateConfig) -> Result<usize> {
        self.decimate_with_rng(config, &mut rand::thread_rng())
    }

    /// [`CloudGuard::decimate`] with a caller-provided random source
    pub fn decimate_with_rng<R: Rng + ?Sized>(&mut self, config: &DecimateConfig, rng: &mut R) -> Result<usize> {
        let doomed = select_hole_indices(&self.state.store, self.index()?, config.n_holes, config.knn, rng)?;
        let removed = self.state.store.remove_indices(&doomed)?;
        self.invalidate_index();
        info!("Decimated {} points in {} holes", removed, config.n_holes);
        Ok(removed)
    }

    /// Fill gaps in the cloud with points synthesized from a learned patch
    /// dictionary.
    ///
    /// The configuration is checked first; when it is rejected nothing
    /// changes. New points are indexed as they are added, so the index is
    /// still valid afterwards.
    pub fn reconstruct(&mut self, config: &ReconstructConfig) -> Result<ReconstructReport> {
        config.validate()?;
        let frequency = self.state.frequency;
        let state = &mut *self.state;
        let index = state.index.as_mut().ok_or(Error::IndexNotBuilt)?;
        let report = reconstruct(&mut state.store, index, config, self.observer, frequency)?;
        state.debug_segments.extend_from_slice(&report.segments);
        Ok(report)
    }

    /// `(seed, synthesized point)` pairs recorded by reconstruction
    pub fn debug_segments(&self) -> &[(Point3f, Point3f)] {
        &self.state.debug_segments
    }

    /// Interleaved position/normal vertices, one per point
    pub fn vertex_buffer(&self) -> Vec<NormalPoint3f> {
        self.state.store.vertex_buffer()
    }

    /// Normal-line vertices: each point and its normal tip at `scale`
    pub fn normal_line_buffer(&self, scale: f32) -> Vec<NormalLineVertex> {
        self.state.store.normal_line_buffer(scale)
    }
}
