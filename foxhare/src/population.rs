//! Populations and fitness-proportional reproduction.
//!
//! A population is a pair of equally sized individual buffers plus a pair of
//! policy buffers. Only one of each pair is live at a time; a generation is
//! produced wholesale into the staging buffers and made visible by a single
//! swap, so readers never observe a half-built generation.

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::config::IndParam;
use crate::coord::Coord;
use crate::error::Result;
use crate::landscape::Landscape;
use crate::policy::{Policy, make_policy};
use crate::rng::{self, DetRng};

#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Individual {
    pub pos: Coord,
    pub food: f32,
    /// index of the parent in the previous generation
    pub ancestor: usize,
}

impl Individual {
    pub fn at(pos: Coord) -> Self {
        Self {
            pos,
            food: 0.,
            ancestor: 0,
        }
    }

    pub fn sprout(&mut self, pos: Coord, ancestor: usize) {
        self.pos = pos;
        self.food = 0.;
        self.ancestor = ancestor;
    }

    pub fn alive(&self) -> bool {
        self.food >= 0.
    }

    /// food -1 is the death sentinel, food never goes negative otherwise
    pub fn die(&mut self) {
        self.food = -1.;
    }
}

/// prey score 0 when dead, otherwise food less the complexity penalty
pub fn prey_fitness(ind: &Individual, cmplx: f32, penalty: f32) -> f32 {
    if ind.alive() {
        (ind.food - cmplx * penalty).max(0.)
    } else {
        0.
    }
}

/// predators are scored on food alone, dead or not
pub fn pred_fitness(ind: &Individual, cmplx: f32, penalty: f32) -> f32 {
    (ind.food - cmplx * penalty).max(0.)
}

pub type FitnessFn = fn(&Individual, f32, f32) -> f32;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Species {
    Prey,
    Pred,
}

impl Species {
    pub fn stream_tag(self) -> u64 {
        match self {
            Species::Prey => 1,
            Species::Pred => 2,
        }
    }

    pub fn fitness_fn(self) -> FitnessFn {
        match self {
            Species::Prey => prey_fitness,
            Species::Pred => pred_fitness,
        }
    }
}

/// discrete distribution over individual indices, selection probability
/// proportional to fitness
///
/// An all-zero fitness vector (every burn-in generation, and the occasional
/// collapsed main generation) carries no selection signal, so sampling falls
/// back to the uniform distribution over all slots.
pub struct ReproSampler {
    dist: Option<WeightedIndex<f32>>,
    n: usize,
}

impl ReproSampler {
    pub fn new(fitness: &[f32]) -> Self {
        // WeightedIndex rejects a weightless vector, which is exactly the
        // fallback case
        let dist = WeightedIndex::new(fitness.iter().copied()).ok();
        Self {
            dist,
            n: fitness.len(),
        }
    }

    pub fn is_uniform(&self) -> bool {
        self.dist.is_none()
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        match &self.dist {
            Some(dist) => dist.sample(rng),
            None => rng.random_range(0..self.n),
        }
    }
}

pub struct Population {
    pub species: Species,
    pub pop: Vec<Individual>,
    tmp_pop: Vec<Individual>,
    pub policy: Box<dyn Policy>,
    tmp_policy: Box<dyn Policy>,
    pub fitness: Vec<f32>,
    sampler: ReproSampler,
}

impl Population {
    /// construct a population of `n` individuals at uniform random positions
    pub fn new(
        species: Species,
        ip: &IndParam,
        landscape: &Landscape,
        rng: &mut DetRng,
        policy_seed: u64,
    ) -> Result<Self> {
        let dim = landscape.dim() as i16;
        let pop = (0..ip.n)
            .map(|_| Individual::at(Coord::new(rng.random_range(0..dim), rng.random_range(0..dim))))
            .collect();
        let policy = make_policy(&ip.policy, ip.n, policy_seed)?;
        let tmp_policy = make_policy(&ip.policy, ip.n, rng::remix(policy_seed))?;
        let fitness = vec![0.; ip.n];
        let sampler = ReproSampler::new(&fitness);
        Ok(Self {
            species,
            pop,
            tmp_pop: vec![Individual::default(); ip.n],
            policy,
            tmp_policy,
            fitness,
            sampler,
        })
    }

    pub fn len(&self) -> usize {
        self.pop.len()
    }

    pub fn sampler(&self) -> &ReproSampler {
        &self.sampler
    }

    /// let the policy move every individual, parallel within the species
    pub fn move_all(&mut self, landscape: &Landscape, ip: &IndParam, seed: u64) {
        self.policy.move_all(landscape, &mut self.pop, ip, seed);
    }

    /// score every individual from its terminal state and rebuild the
    /// reproduction sampler, parallel per individual
    pub fn assess_fitness(&mut self, ip: &IndParam) {
        let fit = self.species.fitness_fn();
        let penalty = ip.cmplx_penalty;
        let policy = &self.policy;
        self.fitness
            .par_iter_mut()
            .zip(&self.pop)
            .enumerate()
            .for_each(|(i, (f, ind))| {
                *f = fit(ind, policy.complexity(i), penalty);
            });
        self.sampler = ReproSampler::new(&self.fitness);
    }

    /// burn-in generations reproduce under degenerate fitness; this zeroes
    /// the scores without reassessing and rebuilds the (uniform) sampler
    pub fn zero_fitness(&mut self) {
        self.fitness.fill(0.);
        self.sampler = ReproSampler::new(&self.fitness);
    }

    /// produce the next generation into the staging buffers and swap
    ///
    /// Every output slot independently samples an ancestor, sprouts near it
    /// with uniform jitter, and inherits (a copy of) its policy unit. The
    /// buffer swap at the end is the only visibility boundary.
    pub fn create_new_generation(
        &mut self,
        landscape: &Landscape,
        ip: &IndParam,
        fixed: bool,
        seed: u64,
    ) {
        let Self {
            pop,
            tmp_pop,
            policy,
            tmp_policy,
            sampler,
            ..
        } = self;

        let radius = ip.sprout_radius;
        tmp_pop.par_iter_mut().enumerate().for_each(|(i, slot)| {
            let mut rng = rng::item_rng(seed, i);
            let ancestor = sampler.sample(&mut rng);
            let jitter = Coord::new(
                rng.random_range(-radius..=radius),
                rng.random_range(-radius..=radius),
            );
            slot.sprout(landscape.wrap(pop[ancestor].pos + jitter), ancestor);
        });

        // inherit the sampled ancestors' policy units, disjoint chunk per slot
        let stride = policy.stride();
        if stride > 0 {
            let src = policy.data();
            tmp_policy
                .data_mut()
                .par_chunks_mut(stride)
                .zip(tmp_pop.par_iter())
                .for_each(|(dst, slot)| {
                    dst.copy_from_slice(&src[slot.ancestor * stride..][..stride]);
                });
        }
        tmp_policy.mutate(ip, fixed, rng::remix(seed));

        std::mem::swap(pop, tmp_pop);
        std::mem::swap(policy, tmp_policy);
    }
}
