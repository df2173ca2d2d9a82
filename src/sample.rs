use bytemuck::{Pod, Zeroable};

/// Standard gravity in m/s^2, used to normalize acceleration into g units.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// A raw acceleration triple as delivered by the sensor driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A recorded acceleration sample.
///
/// The layout is five 8-byte fields with no padding so a window of points can be
/// shipped across a process boundary as plain bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Euclidean norm of the vector in g units.
    pub force: f64,
    pub timestamp_ms: i64,
}

impl SamplePoint {
    #[inline(always)]
    pub fn from_raw(raw: RawSample, timestamp_ms: i64) -> Self {
        Self {
            x: raw.x,
            y: raw.y,
            z: raw.z,
            force: force_magnitude(raw.x, raw.y, raw.z),
            timestamp_ms,
        }
    }
}

/// `sqrt((x/g)^2 + (y/g)^2 + (z/g)^2)`.
#[inline(always)]
pub fn force_magnitude(x: f64, y: f64, z: f64) -> f64 {
    let (gx, gy, gz) = (
        x / STANDARD_GRAVITY,
        y / STANDARD_GRAVITY,
        z / STANDARD_GRAVITY,
    );
    (gx * gx + gy * gy + gz * gz).sqrt()
}
