//! Non-volatile storage for the magnetometer calibration.

use attitude::{CalibrationStore, MagCalibration};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_svc::sys::EspError;
use log::{info, warn};

const NAMESPACE: &str = "bmm150";
const KEY_MAG_CAL: &str = "mag_cal";

/// NVS-backed persistent storage for calibration data.
///
/// Construction never fails: without a usable partition the store
/// degrades to a no-op, the device just runs uncalibrated until the
/// next power cycle.
pub struct NvsStorage {
    nvs: Option<EspNvs<NvsDefault>>,
}

impl NvsStorage {
    pub fn new(partition: Option<EspNvsPartition<NvsDefault>>) -> Self {
        let nvs = partition.and_then(|p| match EspNvs::new(p, NAMESPACE, true) {
            Ok(nvs) => {
                info!("NVS storage initialized");
                Some(nvs)
            }
            Err(e) => {
                warn!("NVS open failed, calibration will not persist: {:?}", e);
                None
            }
        });
        Self { nvs }
    }
}

impl CalibrationStore for NvsStorage {
    type Error = EspError;

    fn save(&mut self, calibration: &MagCalibration) -> Result<(), EspError> {
        let Some(nvs) = self.nvs.as_mut() else {
            warn!("NVS unavailable, calibration not saved");
            return Ok(());
        };
        nvs.set_raw(KEY_MAG_CAL, &calibration.to_bytes())?;
        info!(
            "NVS: saved mag offset ({:.2}, {:.2}, {:.2})",
            calibration.offset.x, calibration.offset.y, calibration.offset.z
        );
        Ok(())
    }

    fn load(&mut self) -> Option<MagCalibration> {
        let nvs = self.nvs.as_ref()?;
        let mut buf = [0u8; MagCalibration::BLOB_LEN];
        let bytes = nvs.get_raw(KEY_MAG_CAL, &mut buf).ok().flatten()?;
        let calibration = MagCalibration::from_bytes(bytes)?;
        info!(
            "NVS: loaded mag offset ({:.2}, {:.2}, {:.2})",
            calibration.offset.x, calibration.offset.y, calibration.offset.z
        );
        Some(calibration)
    }
}
