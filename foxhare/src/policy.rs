//! Movement/mutation policies.
//!
//! A policy holds one small network per individual ("unit") in a flat float
//! buffer. Movement scores the 3x3 neighborhood of an individual by feeding
//! the three configured landscape layers (masked, with gaussian sensing
//! noise) through its unit and walks to the best-scoring cell. The current
//! cell is scored first so that ties keep the individual in place.
//!
//! The flat buffer layout is part of the interface: generation production
//! copies ancestor units chunk-by-chunk in parallel, and the archive module
//! moves the buffers between runs.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::config::IndParam;
use crate::coord::Coord;
use crate::error::{Error, Result};
use crate::landscape::Landscape;
use crate::population::Individual;
use crate::rng;

/// candidate cells, current position first
const NEIGHBORHOOD: [(i16, i16); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// knocked-out weights are exactly zero and don't count towards complexity
fn active_weights(unit: &[f32]) -> f32 {
    unit.iter().filter(|&&w| w != 0.).count() as f32
}

/// rectified truncated linear activation
fn rtlu(x: f32) -> f32 {
    x.clamp(0., 1.)
}

pub trait Policy: Send + Sync {
    /// number of units, one per individual
    fn unit_count(&self) -> usize;

    /// floats per unit in the flat buffer
    fn stride(&self) -> usize;

    /// meaningful floats per unit, declared for archive interchange
    fn type_size(&self) -> usize {
        self.stride()
    }

    fn data(&self) -> &[f32];
    fn data_mut(&mut self) -> &mut [f32];

    /// forward pass of one unit on one sensed input triple
    fn respond(&self, unit: usize, inputs: [f32; 3]) -> f32;

    /// number of active weights of one unit, consumed by the fitness penalty
    fn complexity(&self, unit: usize) -> f32 {
        let stride = self.stride();
        if stride == 0 {
            return 0.;
        }
        active_weights(&self.data()[unit * stride..][..stride])
    }

    /// compute new positions for all individuals, parallel per individual
    fn move_all(&self, landscape: &Landscape, pop: &mut [Individual], ip: &IndParam, seed: u64) {
        let layers = [
            landscape.layer(ip.input_layers[0]),
            landscape.layer(ip.input_layers[1]),
            landscape.layer(ip.input_layers[2]),
        ];
        // sigma is validated non-negative at config load
        let noise = Normal::new(0f32, ip.noise_sigma).unwrap();
        pop.par_iter_mut().enumerate().for_each(|(i, ind)| {
            let mut rng = rng::item_rng(seed, i);
            let mut best = ind.pos;
            let mut best_score = f32::NEG_INFINITY;
            for &(dx, dy) in NEIGHBORHOOD.iter() {
                let c = landscape.wrap(ind.pos + Coord::new(dx, dy));
                let mut inputs = [0.; 3];
                for (inp, (layer, mask)) in
                    inputs.iter_mut().zip(layers.iter().zip(&ip.input_mask))
                {
                    *inp = mask * (layer.at(c) + noise.sample(&mut rng));
                }
                let score = self.respond(i, inputs);
                if score > best_score {
                    best_score = score;
                    best = c;
                }
            }
            ind.pos = best;
        });
    }

    /// perturb all units in place, parallel per unit; a fixed-phase call is a
    /// no-op so reproduction degenerates to a plain copy
    fn mutate(&mut self, ip: &IndParam, fixed: bool, seed: u64) {
        if fixed {
            return;
        }
        let stride = self.stride();
        if stride == 0 {
            return;
        }
        let prob = ip.mutation_prob;
        let step = ip.mutation_step;
        let knockout = ip.mutation_knockout;
        self.data_mut()
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(u, unit)| {
                let mut rng = rng::item_rng(seed, u);
                for w in unit.iter_mut() {
                    if rng.random::<f32>() < prob {
                        *w += rng.random_range(-step..=step);
                    }
                    if rng.random::<f32>() < knockout {
                        *w = 0.;
                    }
                }
            });
    }

    /// copy one unit's state into another slot, possibly of another policy of
    /// the same shape
    fn assign(&mut self, src: &dyn Policy, src_unit: usize, dst_unit: usize) {
        let stride = self.stride();
        debug_assert_eq!(stride, src.stride());
        let src = &src.data()[src_unit * stride..][..stride];
        self.data_mut()[dst_unit * stride..][..stride].copy_from_slice(src);
    }
}

/// control variant: responds zero to everything, so ties keep every
/// individual exactly where it sprouted
pub struct DumbPolicy {
    n: usize,
}

impl Policy for DumbPolicy {
    fn unit_count(&self) -> usize {
        self.n
    }
    fn stride(&self) -> usize {
        0
    }
    fn data(&self) -> &[f32] {
        &[]
    }
    fn data_mut(&mut self) -> &mut [f32] {
        &mut []
    }
    fn respond(&self, _unit: usize, _inputs: [f32; 3]) -> f32 {
        0.
    }
}

/// one layer, three inputs, one rtlu output; 3 weights + bias per unit
pub struct LinearPolicy {
    n: usize,
    weights: Vec<f32>,
}

impl LinearPolicy {
    const STRIDE: usize = 4;

    fn new(n: usize, seed: u64) -> Self {
        let mut weights = vec![0.; n * Self::STRIDE];
        init_weights(&mut weights, seed);
        Self { n, weights }
    }
}

impl Policy for LinearPolicy {
    fn unit_count(&self) -> usize {
        self.n
    }
    fn stride(&self) -> usize {
        Self::STRIDE
    }
    fn data(&self) -> &[f32] {
        &self.weights
    }
    fn data_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }
    fn respond(&self, unit: usize, inputs: [f32; 3]) -> f32 {
        let w = &self.weights[unit * Self::STRIDE..][..Self::STRIDE];
        rtlu(w[0] * inputs[0] + w[1] * inputs[1] + w[2] * inputs[2] + w[3])
    }
}

/// two layers, 3 -> 3 -> 1, rtlu throughout; 16 floats per unit
pub struct SmartPolicy {
    n: usize,
    weights: Vec<f32>,
}

impl SmartPolicy {
    // hidden: 3 neurons x (3 weights + bias), out: 3 weights + bias
    const STRIDE: usize = 16;

    fn new(n: usize, seed: u64) -> Self {
        let mut weights = vec![0.; n * Self::STRIDE];
        init_weights(&mut weights, seed);
        Self { n, weights }
    }
}

impl Policy for SmartPolicy {
    fn unit_count(&self) -> usize {
        self.n
    }
    fn stride(&self) -> usize {
        Self::STRIDE
    }
    fn data(&self) -> &[f32] {
        &self.weights
    }
    fn data_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }
    fn respond(&self, unit: usize, inputs: [f32; 3]) -> f32 {
        let w = &self.weights[unit * Self::STRIDE..][..Self::STRIDE];
        let mut hidden = [0.; 3];
        for (h, w) in hidden.iter_mut().zip(w.chunks_exact(4)) {
            *h = rtlu(w[0] * inputs[0] + w[1] * inputs[1] + w[2] * inputs[2] + w[3]);
        }
        let w = &w[12..];
        rtlu(w[0] * hidden[0] + w[1] * hidden[1] + w[2] * hidden[2] + w[3])
    }
}

fn init_weights(weights: &mut [f32], seed: u64) {
    let mut rng = rng::item_rng(seed, 0);
    for w in weights.iter_mut() {
        *w = rng.random_range(-0.1..0.1);
    }
}

/// policy factory, keyed on the configuration string
pub fn make_policy(kind: &str, n: usize, seed: u64) -> Result<Box<dyn Policy>> {
    match kind {
        "dumb" => Ok(Box::new(DumbPolicy { n })),
        "linear" => Ok(Box::new(LinearPolicy::new(n, seed))),
        "smart" => Ok(Box::new(SmartPolicy::new(n, seed))),
        other => Err(Error::UnknownPolicy(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Param;

    fn test_policy(kind: &str, n: usize) -> Box<dyn Policy> {
        make_policy(kind, n, 99).unwrap()
    }

    #[test]
    fn factory_rejects_unknown_kinds() {
        assert!(matches!(
            make_policy("galaxy_brain", 4, 0),
            Err(Error::UnknownPolicy(_))
        ));
    }

    #[test]
    fn factory_shapes() {
        let p = test_policy("linear", 8);
        assert_eq!(p.unit_count(), 8);
        assert_eq!(p.stride(), 4);
        assert_eq!(p.data().len(), 32);
        let p = test_policy("smart", 8);
        assert_eq!(p.stride(), 16);
        let p = test_policy("dumb", 8);
        assert_eq!(p.stride(), 0);
        assert_eq!(p.complexity(3), 0.);
    }

    #[test]
    fn assign_copies_one_unit() {
        let src = test_policy("linear", 4);
        let mut dst = make_policy("linear", 4, 7).unwrap();
        dst.assign(src.as_ref(), 1, 3);
        assert_eq!(&dst.data()[12..16], &src.data()[4..8]);
        // other slots untouched by this assign
        assert_ne!(&dst.data()[0..4], &src.data()[0..4]);
    }

    #[test]
    fn fixed_mutation_is_a_noop() {
        let ip = Param::default().prey;
        let mut p = test_policy("smart", 16);
        let before = p.data().to_vec();
        p.mutate(&ip, true, 123);
        assert_eq!(p.data(), &before[..]);
    }

    #[test]
    fn mutation_perturbs_and_knockout_zeroes() {
        let mut ip = Param::default().prey;
        ip.mutation_prob = 1.;
        ip.mutation_step = 0.5;
        ip.mutation_knockout = 0.;
        let mut p = test_policy("linear", 16);
        let before = p.data().to_vec();
        p.mutate(&ip, false, 123);
        assert_ne!(p.data(), &before[..]);

        ip.mutation_prob = 0.;
        ip.mutation_knockout = 1.;
        p.mutate(&ip, false, 456);
        assert!(p.data().iter().all(|&w| w == 0.));
        assert_eq!(p.complexity(0), 0.);
    }

    #[test]
    fn complexity_counts_active_weights() {
        let mut p = test_policy("linear", 2);
        assert_eq!(p.complexity(0), 4.);
        p.data_mut()[1] = 0.;
        assert_eq!(p.complexity(0), 3.);
        assert_eq!(p.complexity(1), 4.);
    }

    #[test]
    fn dumb_policy_never_moves() {
        let param = Param::default();
        let mut ip = param.prey.clone();
        ip.noise_sigma = 0.3;
        let landscape = Landscape::new(32).unwrap();
        let p = test_policy("dumb", 3);
        let mut pop = vec![
            Individual::at(Coord::new(0, 0)),
            Individual::at(Coord::new(10, 20)),
            Individual::at(Coord::new(31, 31)),
        ];
        let before = pop.clone();
        p.move_all(&landscape, &mut pop, &ip, 42);
        assert_eq!(pop, before);
    }

    #[test]
    fn movement_stays_on_the_grid_and_is_deterministic() {
        let param = Param::default();
        let mut ip = param.prey.clone();
        ip.noise_sigma = 0.5;
        let mut landscape = Landscape::new(32).unwrap();
        landscape.grass.fill(0.5);
        *landscape.grass.at_mut(Coord::new(1, 0)) = 1.;
        let p = test_policy("linear", 64);
        let mut pop: Vec<_> = (0i16..64)
            .map(|i| Individual::at(Coord::new(i % 32, i / 2)))
            .collect();
        let mut pop2 = pop.clone();
        p.move_all(&landscape, &mut pop, &ip, 7);
        p.move_all(&landscape, &mut pop2, &ip, 7);
        assert_eq!(pop, pop2);
        for ind in &pop {
            assert!((0..32).contains(&ind.pos.x));
            assert!((0..32).contains(&ind.pos.y));
        }
    }
}
