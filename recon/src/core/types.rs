//! Event data objects exchanged between modules.
//!
//! These mirror the records supplied by the input files. Reconstruction proper
//! happens upstream; the pipeline only moves these objects between modules.

use serde::{Deserialize, Serialize};

use crate::core::store::StoreKey;

/// Store key for the per-event metadata written by the source module.
pub const EVENT_META: StoreKey<EventMetaData> = StoreKey::new("EventMetaData");
/// Store key for the reconstructed tracks of the event.
pub const TRACKS: StoreKey<Vec<Track>> = StoreKey::new("Tracks");

/// Identity of one event within an experiment and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetaData {
    pub experiment: u32,
    pub run: u32,
    pub event: u64,
}

impl EventMetaData {
    /// `(experiment, run)` pair used to detect run boundaries.
    pub fn run_id(&self) -> (u32, u32) {
        (self.experiment, self.run)
    }
}

/// Particle hypothesis a track fit was performed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hypothesis {
    Electron,
    Muon,
    Pion,
    Kaon,
    Proton,
}

impl Hypothesis {
    pub fn mass_gev(self) -> f64 {
        match self {
            Hypothesis::Electron => 0.000_510_999,
            Hypothesis::Muon => 0.105_658,
            Hypothesis::Pion => 0.139_570,
            Hypothesis::Kaon => 0.493_677,
            Hypothesis::Proton => 0.938_272,
        }
    }
}

/// Cartesian three-vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Magnitude.
    pub fn r(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn perp(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Polar angle in `[0, pi]`; zero for the null vector.
    pub fn theta(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 && self.z == 0.0 {
            return 0.0;
        }
        self.perp().atan2(self.z)
    }

    /// Azimuthal angle in `(-pi, pi]`.
    pub fn phi(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 {
            return 0.0;
        }
        self.y.atan2(self.x)
    }

    /// Pseudorapidity. Vectors along the beam axis map to a large finite value
    /// with the sign of `z`, and the null vector maps to zero.
    pub fn eta(&self) -> f64 {
        let cos_theta = if self.r() == 0.0 { 1.0 } else { self.z / self.r() };
        if cos_theta * cos_theta < 1.0 {
            return -0.5 * ((1.0 - cos_theta) / (1.0 + cos_theta)).ln();
        }
        if self.z == 0.0 {
            return 0.0;
        }
        if self.z > 0.0 { 10e10 } else { -10e10 }
    }
}

/// Result of fitting a track under one particle hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFitResult {
    pub hypothesis: Hypothesis,
    pub momentum: Vector3,
    #[serde(default)]
    pub p_value: f64,
}

/// Hit content of the pattern-recognition track a fit was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoTrackHits {
    /// Central drift chamber hits.
    pub cdc: u32,
    /// Barrel muon-detector hits.
    pub bklm: u32,
    /// Endcap muon-detector hits.
    pub eklm: u32,
}

impl RecoTrackHits {
    pub fn klm_total(&self) -> u32 {
        self.bklm + self.eklm
    }
}

/// A reconstructed track with its fit results and related hit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub fits: Vec<TrackFitResult>,
    #[serde(default)]
    pub reco: Option<RecoTrackHits>,
}

impl Track {
    /// Fit whose hypothesis mass is closest to `hypothesis`; an exact match wins.
    pub fn fit_closest_to(&self, hypothesis: Hypothesis) -> Option<&TrackFitResult> {
        let target = hypothesis.mass_gev();
        self.fits.iter().min_by(|a, b| {
            let da = (a.hypothesis.mass_gev() - target).abs();
            let db = (b.hypothesis.mass_gev() - target).abs();
            da.total_cmp(&db)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(hypothesis: Hypothesis) -> TrackFitResult {
        TrackFitResult {
            hypothesis,
            momentum: Vector3::new(1.0, 0.0, 0.0),
            p_value: 0.5,
        }
    }

    #[test]
    fn transverse_vector_has_zero_eta() {
        let v = Vector3::new(3.0, 4.0, 0.0);
        assert_eq!(v.r(), 5.0);
        assert!(v.eta().abs() < 1e-12);
        assert!((v.theta() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn beam_axis_vector_has_large_signed_eta() {
        assert!(Vector3::new(0.0, 0.0, 2.0).eta() > 1e9);
        assert!(Vector3::new(0.0, 0.0, -2.0).eta() < -1e9);
        assert_eq!(Vector3::new(0.0, 0.0, 0.0).eta(), 0.0);
    }

    #[test]
    fn closest_fit_prefers_nearest_mass() {
        let track = Track {
            fits: vec![fit(Hypothesis::Proton), fit(Hypothesis::Pion)],
            reco: None,
        };
        let chosen = track.fit_closest_to(Hypothesis::Muon).expect("fit");
        assert_eq!(chosen.hypothesis, Hypothesis::Pion);
        assert!(Track { fits: Vec::new(), reco: None }
            .fit_closest_to(Hypothesis::Muon)
            .is_none());
    }
}
