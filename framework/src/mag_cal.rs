//! Magnetometer hard-iron calibration
//!
//! The magnetometer picks up a constant per-axis bias from ferrous
//! material near the sensor. Rotating the device through all
//! orientations for a bounded window sweeps each axis across its full
//! range; the midpoint of the observed min/max is the hard-iron offset.
//!
//! Soft-iron scale is carried alongside the offset but never derived
//! here - it stays at identity unless a value is supplied from outside.

use log::{info, warn};

use crate::storage::CalibrationStore;
use crate::Triax;

/// Extent sentinel, far beyond any field the sensor sees in practice,
/// so the first real sample replaces both bounds.
const RANGE_SENTINEL: f32 = 2000.0;

/// Hard-iron offset and soft-iron scale applied to every raw
/// magnetometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagCalibration {
    /// Hard-iron bias in raw sensor units, subtracted per axis.
    pub offset: Triax,
    /// Soft-iron correction factor per axis, 1.0 when uncomputed.
    pub scale: Triax,
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self {
            offset: Triax::default(),
            scale: Triax::splat(1.0),
        }
    }
}

impl MagCalibration {
    /// Size of the persisted image: six little-endian `f32`s.
    pub const BLOB_LEN: usize = 24;

    pub fn new(offset: Triax, scale: Triax) -> Self {
        Self { offset, scale }
    }

    /// Apply the calibration to a raw reading: `(raw - offset) * scale`
    /// elementwise.
    pub fn apply(&self, raw: Triax) -> Triax {
        Triax::new(
            (raw.x - self.offset.x) * self.scale.x,
            (raw.y - self.offset.y) * self.scale.y,
            (raw.z - self.offset.z) * self.scale.z,
        )
    }

    /// Encode the calibration for persistence.
    pub fn to_bytes(&self) -> [u8; Self::BLOB_LEN] {
        let mut buf = [0u8; Self::BLOB_LEN];
        let fields = [
            self.offset.x,
            self.offset.y,
            self.offset.z,
            self.scale.x,
            self.scale.y,
            self.scale.z,
        ];
        for (chunk, value) in buf.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Decode a persisted image. Short blobs and non-finite values are
    /// rejected so a corrupt record falls back to the identity
    /// calibration instead of poisoning every reading.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::BLOB_LEN {
            return None;
        }
        let mut fields = [0f32; 6];
        for (value, chunk) in fields.iter_mut().zip(bytes.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !value.is_finite() {
                return None;
            }
        }
        Some(Self {
            offset: Triax::new(fields[0], fields[1], fields[2]),
            scale: Triax::new(fields[3], fields[4], fields[5]),
        })
    }
}

/// Per-axis min/max observed during one calibration run.
#[derive(Debug, Clone, Copy)]
struct RangeExtent {
    min: Triax,
    max: Triax,
}

impl RangeExtent {
    fn reset() -> Self {
        Self {
            min: Triax::splat(RANGE_SENTINEL),
            max: Triax::splat(-RANGE_SENTINEL),
        }
    }

    fn observe(&mut self, s: Triax) {
        // A zero axis reading means the sensor dropped that sample;
        // skip it. Suspected to mask a transport bug rather than being
        // a deliberate sensor feature, kept until proven otherwise.
        if s.x != 0.0 {
            self.min.x = self.min.x.min(s.x);
            self.max.x = self.max.x.max(s.x);
        }
        if s.y != 0.0 {
            self.min.y = self.min.y.min(s.y);
            self.max.y = self.max.y.max(s.y);
        }
        if s.z != 0.0 {
            self.min.z = self.min.z.min(s.z);
            self.max.z = self.max.z.max(s.z);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RunWindow {
    started_ms: u32,
    duration_ms: u32,
}

/// Tracks per-axis extremes over one timed rotation run and derives the
/// hard-iron offset when the run ends.
pub struct MagCalibrator {
    extent: RangeExtent,
    run: Option<RunWindow>,
    calibration: MagCalibration,
}

impl MagCalibrator {
    pub fn new(initial: MagCalibration) -> Self {
        Self {
            extent: RangeExtent::reset(),
            run: None,
            calibration: initial,
        }
    }

    /// The calibration currently in effect.
    pub fn calibration(&self) -> MagCalibration {
        self.calibration
    }

    pub fn run_active(&self) -> bool {
        self.run.is_some()
    }

    /// Reset the extents and arm a run ending `duration_ms` from now.
    pub fn begin_run(&mut self, now_ms: u32, duration_ms: u32) {
        self.extent = RangeExtent::reset();
        self.run = Some(RunWindow {
            started_ms: now_ms,
            duration_ms,
        });
        info!("Mag calibration run started ({} ms window)", duration_ms);
    }

    /// True once the armed run's window has elapsed.
    pub fn run_complete(&self, now_ms: u32) -> bool {
        match self.run {
            Some(w) => now_ms.wrapping_sub(w.started_ms) >= w.duration_ms,
            None => false,
        }
    }

    /// Fold one raw sample into the extents. Ignored when no run is
    /// armed or the window has already elapsed.
    pub fn observe(&mut self, sample: Triax, now_ms: u32) {
        if self.run.is_none() || self.run_complete(now_ms) {
            return;
        }
        self.extent.observe(sample);
    }

    /// Compute the offset from the collected extents, persist the
    /// result, and disarm the run.
    ///
    /// An axis that saw no valid sample still has its min above its max
    /// and keeps the previous offset. A persistence failure is logged
    /// and absorbed; the fresh calibration stays live in memory so the
    /// device remains usable.
    pub fn finalize_run<S: CalibrationStore>(&mut self, store: &mut S) -> MagCalibration {
        let ext = self.extent;
        let mut cal = self.calibration;

        if ext.min.x <= ext.max.x {
            cal.offset.x = (ext.min.x + ext.max.x) / 2.0;
        }
        if ext.min.y <= ext.max.y {
            cal.offset.y = (ext.min.y + ext.max.y) / 2.0;
        }
        if ext.min.z <= ext.max.z {
            cal.offset.z = (ext.min.z + ext.max.z) / 2.0;
        }

        info!(
            "Mag calibration done: x [{:.2}, {:.2}] y [{:.2}, {:.2}] z [{:.2}, {:.2}]",
            ext.min.x, ext.max.x, ext.min.y, ext.max.y, ext.min.z, ext.max.z
        );
        info!(
            "Mag offset: ({:.2}, {:.2}, {:.2})",
            cal.offset.x, cal.offset.y, cal.offset.z
        );

        self.calibration = cal;
        self.run = None;

        if let Err(e) = store.save(&cal) {
            warn!("Mag calibration save failed: {:?}", e);
        }

        cal
    }
}
