use crate::sample::SamplePoint;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on the room reserved when a window opens. Longer windows grow
/// through `append`.
pub const MAX_PREALLOC_POINTS: usize = 16 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("byte length {len} is not a multiple of the sample size {point_size}")]
    Misaligned { len: usize, point_size: usize },
}

/// An immutable, completed window of samples.
///
/// Cloning is cheap; every clone shares the same points.
#[derive(Debug, Clone, Default)]
pub struct WindowSnapshot {
    points: Arc<Vec<SamplePoint>>,
}

impl WindowSnapshot {
    fn new(points: Vec<SamplePoint>) -> Self {
        Self {
            points: Arc::new(points),
        }
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    pub fn forces(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.force).collect()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn zs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.z).collect()
    }

    /// Mean force magnitude, `None` for an empty window.
    pub fn mean_force(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: f64 = self.points.iter().map(|p| p.force).sum();
        Some(sum / self.points.len() as f64)
    }

    /// Timestamp of the last point appended before the window was published.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.points.last().map(|p| p.timestamp_ms)
    }

    /// Raw little-endian view of the points for transfer to another process.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.points.as_slice())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let point_size = size_of::<SamplePoint>();
        if bytes.len() % point_size != 0 {
            return Err(SnapshotError::Misaligned {
                len: bytes.len(),
                point_size,
            });
        }
        let points = bytes
            .chunks_exact(point_size)
            .map(bytemuck::pod_read_unaligned::<SamplePoint>)
            .collect();
        Ok(Self::new(points))
    }

    /// True when both snapshots share the same published buffer.
    pub fn same_window(&self, other: &WindowSnapshot) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }
}

impl Deref for WindowSnapshot {
    type Target = [SamplePoint];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

/// Double buffer of samples: one slot being filled, one slot published.
///
/// The active slot is invisible to readers. `publish` moves it into the published
/// slot in one assignment, so a reader holds either the old or the new window.
#[derive(Debug, Default)]
pub struct SampleWindow {
    active: Option<Vec<SamplePoint>>,
    published: WindowSnapshot,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh, empty active slot.
    pub fn begin_window(&mut self) {
        self.begin_window_with_capacity(0);
    }

    /// Opens a fresh active slot with room for `capacity` points, capped at
    /// `MAX_PREALLOC_POINTS`. Appends within that room never allocate.
    pub fn begin_window_with_capacity(&mut self, capacity: usize) {
        self.active = Some(Vec::with_capacity(capacity.min(MAX_PREALLOC_POINTS)));
    }

    /// Points the active slot can take before it has to grow.
    pub fn active_capacity(&self) -> usize {
        self.active.as_ref().map_or(0, Vec::capacity)
    }

    /// Appends to the active slot. Returns false when no window is open.
    #[inline(always)]
    pub fn append(&mut self, sample: SamplePoint) -> bool {
        match self.active.as_mut() {
            Some(active) => {
                active.push(sample);
                true
            }
            None => false,
        }
    }

    /// Replaces the published slot with the active one and closes the active slot.
    /// Returns the number of points published, or `None` if no window was open.
    pub fn publish(&mut self) -> Option<usize> {
        let active = self.active.take()?;
        let len = active.len();
        self.published = WindowSnapshot::new(active);
        Some(len)
    }

    /// Drops the in-flight active slot without publishing it.
    pub fn discard_active(&mut self) -> Option<usize> {
        self.active.take().map(|active| active.len())
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_len(&self) -> usize {
        self.active.as_ref().map_or(0, Vec::len)
    }

    pub fn published(&self) -> WindowSnapshot {
        self.published.clone()
    }

    /// Mean published force above `threshold`. An empty window counts as motion.
    pub fn significant_force(&self, threshold: f64) -> bool {
        match self.published.mean_force() {
            Some(mean) => mean > threshold,
            None => true,
        }
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.published.last_timestamp()
    }
}
