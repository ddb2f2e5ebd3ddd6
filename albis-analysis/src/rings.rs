//! Diffraction geometry: resolution at a pixel and resolution ring radii.

/// `h * c` in eV·Å.
pub const HC_EV_ANGSTROM: f64 = 12_398.419_3;
/// Ring resolutions drawn by default, in Å.
pub const DEFAULT_RINGS: [f64; 4] = [1.0, 2.0, 4.0, 8.0];
/// Number of default rings shown.
pub const DEFAULT_RING_COUNT: usize = 3;

/// Convert a wavelength in Å to a photon energy in eV.
#[must_use]
pub fn energy_from_wavelength(wavelength_a: f64) -> Option<f64> {
    let energy = HC_EV_ANGSTROM / wavelength_a;
    (energy.is_finite() && energy > 0.0).then_some(energy)
}

/// Detector geometry as reported by the acquisition metadata.
///
/// Every field is optional; a missing beam center falls back to the frame
/// center.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectorGeometry {
    /// Sample-to-detector distance.
    pub distance_mm: Option<f64>,
    /// Pixel pitch.
    pub pixel_size_um: Option<f64>,
    /// Photon energy.
    pub energy_ev: Option<f64>,
    /// Beam center column.
    pub center_x_px: Option<f64>,
    /// Beam center row.
    pub center_y_px: Option<f64>,
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

impl DetectorGeometry {
    /// Fill a missing beam center with the center of a `width`×`height` frame.
    #[must_use]
    pub fn with_default_center(mut self, width: usize, height: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
        if !self.center_x_px.is_some_and(f64::is_finite) {
            self.center_x_px = Some(cx);
        }
        if !self.center_y_px.is_some_and(f64::is_finite) {
            self.center_y_px = Some(cy);
        }
        self
    }

    /// X-ray wavelength in Å.
    #[must_use]
    pub fn wavelength_a(&self) -> Option<f64> {
        let lambda = HC_EV_ANGSTROM / positive(self.energy_ev)?;
        (lambda.is_finite() && lambda > 0.0).then_some(lambda)
    }

    /// Whether distance, pixel size and energy are all known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        positive(self.distance_mm).is_some()
            && positive(self.pixel_size_um).is_some()
            && self.wavelength_a().is_some()
    }

    fn center(&self) -> (f64, f64) {
        (
            self.center_x_px.unwrap_or(0.0),
            self.center_y_px.unwrap_or(0.0),
        )
    }

    /// Resolution `d` in Å at pixel `(x, y)`.
    ///
    /// `None` when the geometry is incomplete or at the beam center.
    #[must_use]
    pub fn resolution_at_pixel(&self, x: f64, y: f64) -> Option<f64> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let distance = positive(self.distance_mm)?;
        let pixel_mm = positive(self.pixel_size_um)? / 1000.0;
        let lambda = self.wavelength_a()?;
        let (cx, cy) = self.center();
        let radius_mm = (x - cx).hypot(y - cy) * pixel_mm;
        let two_theta = radius_mm.atan2(distance);
        let sin_theta = (two_theta / 2.0).sin();
        if !sin_theta.is_finite() || sin_theta <= 0.0 {
            return None;
        }
        let d = lambda / (2.0 * sin_theta);
        (d.is_finite() && d > 0.0).then_some(d)
    }

    /// Radius in pixels of the ring at resolution `d` Å.
    #[must_use]
    pub fn ring_radius_px(&self, d: f64) -> Option<f64> {
        let distance = positive(self.distance_mm)?;
        let pixel_mm = positive(self.pixel_size_um)? / 1000.0;
        let sin_theta = self.wavelength_a()? / (2.0 * d);
        if !sin_theta.is_finite() || sin_theta <= 0.0 || sin_theta >= 1.0 {
            return None;
        }
        let two_theta = 2.0 * sin_theta.asin();
        let radius = distance * two_theta.tan() / pixel_mm;
        (radius.is_finite() && radius > 0.0).then_some(radius)
    }
}
