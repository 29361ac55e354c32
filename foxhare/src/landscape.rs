//! The toroidal landscape and its density model.
//!
//! The world is a square grid of named layers. Terrain layers (grass, risk)
//! are read and depleted during resolution, the per-species count layers are
//! exact occupancy bins, and the density layers are their smoothed
//! (convolved) counterparts used for sensing. Densities carry no state across
//! ticks, they are recomputed from scratch from the current positions, which
//! is what makes the two per-species refreshes safe to run concurrently.

use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::config::KernelParam;
use crate::coord::{Coord, wrap};
use crate::error::{Error, Result};

/// kernel radii assume enough margin for wrap-safe convolution
pub const MIN_DIM: usize = 32;

/// names for the landscape layers, also used for sensing selection in config
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerId {
    Grass,
    Risk,
    PreyCount,
    PredCount,
    PreyDensity,
    PredDensity,
    Temp,
}

/// one dim x dim grid of floats, all addressing is wrapped
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LayerBuf {
    dim: usize,
    cells: Vec<f32>,
}

impl LayerBuf {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            cells: vec![0.; dim * dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn idx(&self, c: Coord) -> usize {
        wrap(c.y as i32, self.dim) * self.dim + wrap(c.x as i32, self.dim)
    }

    pub fn at(&self, c: Coord) -> f32 {
        self.cells[self.idx(c)]
    }

    pub fn at_mut(&mut self, c: Coord) -> &mut f32 {
        let i = self.idx(c);
        &mut self.cells[i]
    }

    pub fn fill(&mut self, v: f32) {
        self.cells.fill(v);
    }

    pub fn copy_from(&mut self, other: &LayerBuf) {
        self.cells.copy_from_slice(&other.cells);
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn sum(&self) -> f32 {
        self.cells.iter().sum()
    }

    /// `cell = min(cap, cell + rate)`, independent per cell
    pub fn grow(&mut self, rate: f32, cap: f32) {
        self.cells
            .par_iter_mut()
            .for_each(|c| *c = cap.min(*c + rate));
    }
}

/// normalized gaussian smoothing kernel
#[derive(Clone, Debug)]
pub struct Kernel {
    radius: usize,
    weights: Vec<f32>,
}

impl Kernel {
    pub fn gauss(param: KernelParam) -> Self {
        let r = param.radius as i32;
        let inv = if param.sigma > 0. {
            0.5 / (param.sigma * param.sigma)
        } else {
            // degenerate sigma collapses to the identity kernel
            f32::INFINITY
        };
        let mut weights = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                let d2 = (dx * dx + dy * dy) as f32;
                weights.push(if d2 == 0. { 1. } else { (-d2 * inv).exp() });
            }
        }
        let total: f32 = weights.iter().sum();
        for w in weights.iter_mut() {
            *w /= total;
        }
        Self {
            radius: param.radius,
            weights,
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }
}

/// bin every position into `count`, then convolve into `density`
///
/// Safe to run concurrently for the two species because each species writes
/// a disjoint layer pair.
pub fn update_occupancy(
    count: &mut LayerBuf,
    density: &mut LayerBuf,
    positions: impl Iterator<Item = Coord>,
    kernel: &Kernel,
) {
    count.fill(0.);
    for pos in positions {
        *count.at_mut(pos) += 1.;
    }

    let dim = count.dim;
    let r = kernel.radius as i32;
    let count = &*count;
    density
        .cells
        .par_chunks_mut(dim)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.;
                let mut weights = kernel.weights.iter();
                for dy in -r..=r {
                    for dx in -r..=r {
                        let c = Coord::new(x as i16 + dx as i16, y as i16 + dy as i16);
                        acc += weights.next().unwrap() * count.at(c);
                    }
                }
                *out = acc;
            }
        });
}

pub struct Landscape {
    dim: usize,
    pub grass: LayerBuf,
    pub risk: LayerBuf,
    pub prey_count: LayerBuf,
    pub pred_count: LayerBuf,
    pub prey_density: LayerBuf,
    pub pred_density: LayerBuf,
    pub temp: LayerBuf,
}

impl Landscape {
    pub fn new(dim: usize) -> Result<Self> {
        if dim < MIN_DIM {
            return Err(Error::LandscapeTooSmall { dim });
        }
        Ok(Self {
            dim,
            grass: LayerBuf::new(dim),
            risk: LayerBuf::new(dim),
            prey_count: LayerBuf::new(dim),
            pred_count: LayerBuf::new(dim),
            prey_density: LayerBuf::new(dim),
            pred_density: LayerBuf::new(dim),
            temp: LayerBuf::new(dim),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn wrap(&self, c: Coord) -> Coord {
        Coord::new(
            wrap(c.x as i32, self.dim) as i16,
            wrap(c.y as i32, self.dim) as i16,
        )
    }

    pub fn layer(&self, id: LayerId) -> &LayerBuf {
        match id {
            LayerId::Grass => &self.grass,
            LayerId::Risk => &self.risk,
            LayerId::PreyCount => &self.prey_count,
            LayerId::PredCount => &self.pred_count,
            LayerId::PreyDensity => &self.prey_density,
            LayerId::PredDensity => &self.pred_density,
            LayerId::Temp => &self.temp,
        }
    }
}
