//! `KLMCDCTrack`: muon-detector hit content of high-momentum tracks.
//!
//! For every track with a muon-hypothesis fit above `min_momentum` that left
//! hits in both the drift chamber and the muon detector, the module fills the
//! mean number of muon-detector hits against the track's eta, theta and phi,
//! once for all hits and once for barrel hits only.

use tracing::warn;

use crate::core::histogram::Profile;
use crate::core::module::{Flow, Module, ModuleError, Outputs, ParamsExt};
use crate::core::params::Params;
use crate::core::registry::BuildContext;
use crate::core::store::{Declarations, EventStore};
use crate::core::types::{EventMetaData, Hypothesis, TRACKS, Track};

pub const TYPE_NAME: &str = "KLMCDCTrack";

const BINS: usize = 300;
const AXIS_LIMIT: f64 = 3.142;

/// Index order of [`KlmCdcTrack::profiles`].
const ETA: usize = 0;
const THETA: usize = 1;
const PHI: usize = 2;
const BARREL_ETA: usize = 3;
const BARREL_THETA: usize = 4;
const BARREL_PHI: usize = 5;

pub struct KlmCdcTrack {
    params: Params,
    directory: String,
    min_momentum: f64,
    profiles: Vec<Profile>,
}

fn profile(prefix: &str, angle: &str, hits: &str) -> Profile {
    Profile::new(
        &format!("{prefix}_CDC_tracks_by_{angle}"),
        &format!("Mean {prefix} Hits per CDC track vs. #{angle}"),
        BINS,
        -AXIS_LIMIT,
        AXIS_LIMIT,
    )
    .with_axes(&format!("Angle #{angle}"), hits)
}

impl KlmCdcTrack {
    pub fn build(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        Ok(Box::new(Self::from_params(ctx.params)?))
    }

    pub fn from_params(params: Params) -> Result<Self, ModuleError> {
        params.reject_unknown(&["histogram_directory_name", "min_momentum"])?;
        let directory = params.str_or("histogram_directory_name", "KLM")?;
        let min_momentum = params.float_or("min_momentum", 4.0)?;
        if min_momentum.is_nan() || min_momentum < 0.0 {
            return Err(ModuleError::param("min_momentum", "must be >= 0"));
        }
        let mut profiles = Vec::with_capacity(6);
        for (prefix, hits) in [("KLM", "Mean hits (EKLM + BKLM)"), ("BKLM", "Mean hits (BKLM)")] {
            for angle in ["eta", "theta", "phi"] {
                profiles.push(profile(prefix, angle, hits));
            }
        }
        Ok(Self {
            params,
            directory,
            min_momentum,
            profiles,
        })
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Fill all profiles from `track`; returns whether it passed the selection.
    fn fill_track(&mut self, track: &Track) -> bool {
        let Some(fit) = track.fit_closest_to(Hypothesis::Muon) else {
            warn!("no track fit result found");
            return false;
        };
        let Some(hits) = track.reco else {
            warn!("track has no related reconstructed track");
            return false;
        };

        let momentum = fit.momentum;
        if momentum.r() < self.min_momentum {
            return false;
        }
        let klm = hits.klm_total();
        if hits.cdc == 0 || klm == 0 {
            return false;
        }

        let (eta, theta, phi) = (momentum.eta(), momentum.theta(), momentum.phi());
        let klm = f64::from(klm);
        let bklm = f64::from(hits.bklm);
        self.profiles[ETA].fill(eta, klm);
        self.profiles[THETA].fill(theta, klm);
        self.profiles[PHI].fill(phi, klm);
        self.profiles[BARREL_ETA].fill(eta, bklm);
        self.profiles[BARREL_THETA].fill(theta, bklm);
        self.profiles[BARREL_PHI].fill(phi, bklm);
        true
    }
}

impl Module for KlmCdcTrack {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        Declarations::new()
            .optional(&TRACKS)
            .deposits_histograms()
    }

    fn begin_run(&mut self, _meta: &EventMetaData) {
        for profile in &mut self.profiles {
            profile.reset();
        }
    }

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError> {
        let Some(tracks) = store.get(&TRACKS) else {
            return Ok(Flow::condition(false));
        };
        let mut filled = 0usize;
        for track in tracks {
            if self.fill_track(track) {
                filled += 1;
            }
        }
        Ok(Flow::condition(filled > 0))
    }

    fn finalize(&mut self, outputs: &mut Outputs) -> Result<(), ModuleError> {
        for profile in self.profiles.drain(..) {
            outputs.histograms.deposit(&self.directory, profile);
        }
        Ok(())
    }
}
