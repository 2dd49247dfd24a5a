//! Calibration persistence seam
//!
//! The magnetometer calibration must survive power cycles. The store
//! holds a single fixed-key record whose payload is the 24-byte image
//! produced by [`MagCalibration::to_bytes`]. On the device this is NVS;
//! tests and host runs use [`MemoryStore`].

use crate::mag_cal::MagCalibration;

/// Durable store for the magnetometer calibration.
pub trait CalibrationStore {
    type Error: core::fmt::Debug;

    /// Write the calibration record. Called once per completed run.
    fn save(&mut self, calibration: &MagCalibration) -> Result<(), Self::Error>;

    /// Read the persisted calibration. Absent or unreadable records
    /// yield `None`; callers fall back to the identity calibration
    /// rather than failing startup.
    fn load(&mut self) -> Option<MagCalibration>;
}

/// In-memory store for tests and host-side experiments. Round-trips
/// through the same byte image as the on-device store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Option<[u8; MagCalibration::BLOB_LEN]>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalibrationStore for MemoryStore {
    type Error = core::convert::Infallible;

    fn save(&mut self, calibration: &MagCalibration) -> Result<(), Self::Error> {
        self.blob = Some(calibration.to_bytes());
        Ok(())
    }

    fn load(&mut self) -> Option<MagCalibration> {
        self.blob.and_then(|b| MagCalibration::from_bytes(&b))
    }
}
