//! Physical constants in the CGS-flavoured units used by spectroscopy.

/// Second radiation constant `hc/k` (cm·K).
pub const C2: f64 = 1.438_776_877;

/// First radiation constant for radiance, `2hc²` (W·cm²/sr).
pub const C1_RADIANCE: f64 = 1.191_042_972e-12;

/// Boltzmann constant (J/K).
pub const K_B: f64 = 1.380_649e-23;

/// Speed of light (m/s).
pub const C_LIGHT: f64 = 299_792_458.0;

/// Atomic mass unit (kg).
pub const AMU: f64 = 1.660_539_066_60e-27;

/// Reference temperature of line intensities (K).
pub const T_REF: f64 = 296.0;

/// Planck radiance at wavenumber `nu` (cm-1) and temperature `t` (K), in W/cm2/sr/cm-1.
pub fn planck_wavenumber(nu: f64, t: f64) -> f64 {
    if nu <= 0.0 || t <= 0.0 {
        return 0.0;
    }
    C1_RADIANCE * nu.powi(3) / ((C2 * nu / t).exp_m1())
}
