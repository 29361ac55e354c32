//! Run parameters.
//!
//! Everything is plain data with serde derives; runs are configured from a
//! toml file plus a couple of command line overrides. `Param::default()` is a
//! complete, runnable configuration so a config file only needs to name what
//! it changes.

use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landscape::LayerId;

/// per-species parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndParam {
    /// population size, fixed for the whole run
    pub n: usize,
    /// policy factory key, see [`crate::policy::make_policy`]
    pub policy: String,
    /// offspring are placed within this chebyshev radius of their ancestor
    pub sprout_radius: i16,
    pub mutation_prob: f32,
    pub mutation_step: f32,
    pub mutation_knockout: f32,
    /// stddev of the gaussian sensing noise added to every sensed layer value
    pub noise_sigma: f32,
    /// fitness penalty per unit of policy complexity
    pub cmplx_penalty: f32,
    /// the three landscape layers fed into the policy
    pub input_layers: [LayerId; 3],
    /// per-layer sensing weight, negative values make a layer repulsive
    pub input_mask: [f32; 3],
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelParam {
    pub radius: usize,
    pub sigma: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeParam {
    pub dim: usize,
    pub max_grass_cover: f32,
    pub grass_growth: f32,
    /// uniform fill for the static risk layer
    pub risk_cover: f32,
    pub prey_kernel: KernelParam,
    pub pred_kernel: KernelParam,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Param {
    pub seed: u64,
    /// burn-in generations, reproduced under forcibly-zeroed fitness
    pub g_burnin: usize,
    /// main generations
    pub g: usize,
    /// ticks per generation
    pub t: usize,
    /// first generation of the fixed phase (mutation suppressed)
    pub g_fix: usize,
    /// ticks per generation once fixed
    pub t_fix: usize,
    /// rayon thread count hint, 0 keeps the default
    pub threads: usize,
    pub outdir: PathBuf,
    pub prey: IndParam,
    pub pred: IndParam,
    pub landscape: LandscapeParam,
    /// optional warm-start archives written by a previous run
    pub init_prey_policy: Option<PathBuf>,
    pub init_pred_policy: Option<PathBuf>,
    /// generation to extract from the archives, `None` means the last one
    pub init_g: Option<usize>,
}

impl Default for IndParam {
    fn default() -> Self {
        Self {
            n: 512,
            policy: "linear".to_owned(),
            sprout_radius: 2,
            mutation_prob: 0.001,
            mutation_step: 0.1,
            mutation_knockout: 0.001,
            noise_sigma: 0.1,
            cmplx_penalty: 0.01,
            input_layers: [LayerId::Grass, LayerId::PreyDensity, LayerId::PredDensity],
            input_mask: [1., -1., -1.],
        }
    }
}

impl Default for KernelParam {
    fn default() -> Self {
        Self { radius: 3, sigma: 1. }
    }
}

impl Default for LandscapeParam {
    fn default() -> Self {
        Self {
            dim: 512,
            max_grass_cover: 1.,
            grass_growth: 0.01,
            risk_cover: 0.,
            prey_kernel: KernelParam::default(),
            pred_kernel: KernelParam::default(),
        }
    }
}

impl Default for Param {
    fn default() -> Self {
        Self {
            seed: 1234,
            g_burnin: 10,
            g: 1000,
            t: 100,
            // effectively disabled unless lowered below g
            g_fix: usize::MAX,
            t_fix: 100,
            threads: 0,
            outdir: PathBuf::from("out"),
            prey: IndParam::default(),
            pred: IndParam {
                n: 256,
                input_layers: [LayerId::PreyDensity, LayerId::PredDensity, LayerId::Risk],
                input_mask: [1., -1., -1.],
                ..IndParam::default()
            },
            landscape: LandscapeParam::default(),
            init_prey_policy: None,
            init_pred_policy: None,
            init_g: None,
        }
    }
}

impl IndParam {
    fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidParam("population size must be nonzero"));
        }
        if self.sprout_radius < 0 {
            return Err(Error::InvalidParam("sprout_radius must be non-negative"));
        }
        if !(self.noise_sigma >= 0.) {
            return Err(Error::InvalidParam("noise_sigma must be non-negative"));
        }
        if !(0. ..=1.).contains(&self.mutation_prob) || !(0. ..=1.).contains(&self.mutation_knockout)
        {
            return Err(Error::InvalidParam("mutation probabilities must be in [0, 1]"));
        }
        Ok(())
    }
}

impl Param {
    pub fn validate(&self) -> Result<()> {
        self.prey.validate()?;
        self.pred.validate()?;
        if self.landscape.grass_growth < 0. {
            return Err(Error::InvalidParam("grass_growth must be non-negative"));
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let param: Param = toml::from_str(&text)?;
        Ok(param)
    }
}
