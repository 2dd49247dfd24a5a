//! Configuration for the tracker firmware
//!
//! Plain structs with defaults matching the handheld unit. A few values
//! can be overridden at build time through environment variables.

use attitude::madgwick::DEFAULT_BETA;

/// Magnetometer calibration run settings.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationConfig {
    /// Length of the rotation sampling window (ms).
    pub run_duration_ms: u32,
    /// Operator warning before the startup run begins (ms).
    pub startup_warning_ms: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            run_duration_ms: 10_000,
            startup_warning_ms: 5_000,
        }
    }
}

/// Gyro bias capture settings.
#[derive(Debug, Clone, Copy)]
pub struct GyroBiasConfig {
    pub sample_count: u32,
    pub sample_interval_ms: u32,
}

impl Default for GyroBiasConfig {
    fn default() -> Self {
        Self {
            sample_count: 256,
            sample_interval_ms: 5,
        }
    }
}

/// Fusion settings.
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// Madgwick gain.
    pub filter_beta: f32,
    /// Local magnetic declination (degrees), subtracted from the
    /// heading so it reads against true north.
    pub declination_deg: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            filter_beta: DEFAULT_BETA,
            declination_deg: 8.5,
        }
    }
}

/// Master system configuration.
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    pub calibration: CalibrationConfig,
    pub gyro_bias: GyroBiasConfig,
    pub fusion: FusionConfig,
    /// Angle/temperature readout cadence (ms).
    pub readout_interval_ms: u32,
    /// Main loop pacing delay (ms).
    pub cycle_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            gyro_bias: GyroBiasConfig::default(),
            fusion: FusionConfig::default(),
            readout_interval_ms: 250,
            cycle_interval_ms: 10,
        }
    }
}

impl SystemConfig {
    /// Build-time overrides:
    ///
    /// ```bash
    /// export MAG_DECLINATION_DEG="-2.3"
    /// export MAG_CAL_DURATION_MS="15000"
    /// cargo build --release
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = option_env!("MAG_DECLINATION_DEG") {
            if let Ok(v) = v.parse() {
                config.fusion.declination_deg = v;
            }
        }
        if let Some(v) = option_env!("MAG_CAL_DURATION_MS") {
            if let Ok(v) = v.parse() {
                config.calibration.run_duration_ms = v;
            }
        }

        config
    }
}
