//! The simulation: one landscape, two populations, and the run loop.
//!
//! A run is a strictly ordered sequence of phases. Burn-in generations tick
//! and reproduce under forcibly-zeroed fitness to settle the spatial
//! distribution; main generations tick, get assessed, analyzed and
//! reproduced; once the generation counter reaches the fixation threshold
//! reproduction stops mutating. Every phase boundary notifies the observer
//! chain, which can stop the run cooperatively.
//!
//! Within a tick the stage order is fixed: grass growth, movement, density
//! refresh, grazing and predation. Each stage is internally data-parallel
//! with an implicit barrier at its end; ticks never overlap.

use rand::Rng;
use rand::SeedableRng;
use tracing::info;

use crate::analysis::Analysis;
use crate::archive::{self, Archive};
use crate::config::Param;
use crate::error::Result;
use crate::landscape::{Kernel, Landscape, update_occupancy};
use crate::observer::{Msg, ObserverChain};
use crate::population::{Population, Species};
use crate::rng::{self, DetRng};

pub struct Simulation {
    param: Param,
    landscape: Landscape,
    prey: Population,
    pred: Population,
    prey_kernel: Kernel,
    pred_kernel: Kernel,
    /// main generation counter, -1 during burn-in
    g: i64,
    /// tick within the current generation
    t: i64,
    /// counts every generation ever produced, burn-in included; seeds the
    /// per-generation random streams
    epoch: u64,
    rng: DetRng,
    analysis: Analysis,
    // per-tick scratch, reused to avoid reallocation
    attacking: Vec<usize>,
    attacked: Vec<usize>,
}

impl Simulation {
    pub fn new(param: Param) -> Result<Self> {
        param.validate()?;
        let mut landscape = Landscape::new(param.landscape.dim)?;
        landscape.grass.fill(param.landscape.max_grass_cover);
        landscape.risk.fill(param.landscape.risk_cover);

        let mut rng = DetRng::seed_from_u64(param.seed);
        let prey = Population::new(
            Species::Prey,
            &param.prey,
            &landscape,
            &mut rng,
            rng::stream_seed(param.seed, [rng::INIT, Species::Prey.stream_tag(), 0, 0]),
        )?;
        let pred = Population::new(
            Species::Pred,
            &param.pred,
            &landscape,
            &mut rng,
            rng::stream_seed(param.seed, [rng::INIT, Species::Pred.stream_tag(), 0, 0]),
        )?;

        let prey_kernel = Kernel::gauss(param.landscape.prey_kernel);
        let pred_kernel = Kernel::gauss(param.landscape.pred_kernel);

        let mut sim = Self {
            param,
            landscape,
            prey,
            pred,
            prey_kernel,
            pred_kernel,
            g: -1,
            t: -1,
            epoch: 0,
            rng,
            analysis: Analysis::default(),
            attacking: Vec::new(),
            attacked: Vec::new(),
        };

        // initial occupancies and observable densities
        sim.refresh_densities();

        // optional warm start from former runs
        if let Some(path) = sim.param.init_prey_policy.clone() {
            info!(path = %path.display(), "warm-starting prey policies");
            let ar = Archive::open(&path)?;
            archive::uncompress(sim.prey.policy.as_mut(), ar.extract(sim.param.init_g)?)?;
        }
        if let Some(path) = sim.param.init_pred_policy.clone() {
            info!(path = %path.display(), "warm-starting predator policies");
            let ar = Archive::open(&path)?;
            archive::uncompress(sim.pred.policy.as_mut(), ar.extract(sim.param.init_g)?)?;
        }
        Ok(sim)
    }

    pub fn param(&self) -> &Param {
        &self.param
    }

    pub fn landscape(&self) -> &Landscape {
        &self.landscape
    }

    pub fn prey(&self) -> &Population {
        &self.prey
    }

    pub fn pred(&self) -> &Population {
        &self.pred
    }

    /// current main generation, -1 during burn-in
    pub fn generation(&self) -> i64 {
        self.g
    }

    pub fn tick(&self) -> i64 {
        self.t
    }

    /// mutation is suppressed once the generation counter reaches `g_fix`
    pub fn fixed(&self) -> bool {
        self.g >= 0 && self.g as usize >= self.param.g_fix
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// drive the full run; returns false if an observer stopped it early
    pub fn run(&mut self, observers: &mut ObserverChain) -> bool {
        macro_rules! notify {
            ($msg:expr) => {
                if !observers.notify(self, $msg) {
                    return false;
                }
            };
        }

        notify!(Msg::Initialized);

        for _ in 0..self.param.g_burnin {
            notify!(Msg::NewGeneration);
            for t in 0..self.param.t {
                self.t = t as i64;
                self.simulate_timestep();
                notify!(Msg::Watchdog);
            }
            // reproduce under degenerate fitness, not reassessed
            self.prey.zero_fitness();
            self.pred.zero_fitness();
            self.create_new_generations();
        }

        for g in 0..self.param.g {
            self.g = g as i64;
            notify!(Msg::NewGeneration);
            let ticks = if self.fixed() {
                self.param.t_fix
            } else {
                self.param.t
            };
            for t in 0..ticks {
                self.t = t as i64;
                self.simulate_timestep();
                notify!(Msg::PostTimestep);
            }
            self.assess_fitness();
            self.analysis.generation(&self.prey, &self.pred);
            notify!(Msg::Generation);
            self.create_new_generations();
        }

        notify!(Msg::Finished);
        true
    }

    /// one tick: growth, movement, density refresh, grazing and predation
    pub(crate) fn simulate_timestep(&mut self) {
        self.landscape.grass.grow(
            self.param.landscape.grass_growth,
            self.param.landscape.max_grass_cover,
        );

        // both species move independently, each parallel over individuals
        let tick = self.t.max(0) as u64;
        let prey_seed = self.move_seed(Species::Prey, tick);
        let pred_seed = self.move_seed(Species::Pred, tick);
        {
            let Self {
                landscape,
                prey,
                pred,
                param,
                ..
            } = self;
            let landscape = &*landscape;
            let param = &*param;
            rayon::join(
                || prey.move_all(landscape, &param.prey, prey_seed),
                || pred.move_all(landscape, &param.pred, pred_seed),
            );
        }

        self.refresh_densities();
        self.resolve_grazing_and_attacks();
    }

    fn move_seed(&self, species: Species, tick: u64) -> u64 {
        rng::stream_seed(
            self.param.seed,
            [rng::MOVE, species.stream_tag(), self.epoch, tick],
        )
    }

    /// recompute occupancy counts and smoothed densities for both species;
    /// the species pairs are disjoint so they run concurrently
    fn refresh_densities(&mut self) {
        let Self {
            landscape,
            prey,
            pred,
            prey_kernel,
            pred_kernel,
            ..
        } = self;
        let Landscape {
            prey_count,
            prey_density,
            pred_count,
            pred_density,
            ..
        } = landscape;
        rayon::join(
            || {
                update_occupancy(
                    prey_count,
                    prey_density,
                    prey.pop.iter().map(|i| i.pos),
                    prey_kernel,
                )
            },
            || {
                update_occupancy(
                    pred_count,
                    pred_density,
                    pred.pop.iter().map(|i| i.pos),
                    pred_kernel,
                )
            },
        );
    }

    pub(crate) fn assess_fitness(&mut self) {
        self.prey.assess_fitness(&self.param.prey);
        self.pred.assess_fitness(&self.param.pred);
    }

    fn create_new_generations(&mut self) {
        self.epoch += 1;
        let fixed = self.fixed();
        let Self {
            landscape,
            prey,
            pred,
            param,
            epoch,
            ..
        } = self;
        let seed = |species: Species| {
            rng::stream_seed(param.seed, [rng::SPROUT, species.stream_tag(), *epoch, 0])
        };
        prey.create_new_generation(landscape, &param.prey, fixed, seed(Species::Prey));
        pred.create_new_generation(landscape, &param.pred, fixed, seed(Species::Pred));
    }

    /// grazing and predation resolution
    ///
    /// Sequential by design: the attack coin flips come from the root stream
    /// and all cross-species interaction happens here, bounded to co-located
    /// individuals via the attacking/attacked scratch sets.
    pub(crate) fn resolve_grazing_and_attacks(&mut self) {
        let Self {
            landscape,
            prey,
            pred,
            rng,
            attacking,
            attacked,
            ..
        } = self;
        let Landscape {
            grass,
            temp,
            prey_count,
            pred_count,
            ..
        } = landscape;

        // snapshot the grass before depletion
        temp.copy_from(grass);

        // find attacking predators; the timid ones leave the count so they
        // neither pose risk nor dilute the attackers' credit
        attacking.clear();
        for (i, p) in pred.pop.iter().enumerate() {
            if prey_count.at(p.pos) > 0. {
                if rng.random_bool(0.5) {
                    attacking.push(i);
                } else {
                    *pred_count.at_mut(p.pos) -= 1.;
                }
            }
        }

        // find attacked prey and graze on the fly
        attacked.clear();
        for (i, p) in prey.pop.iter_mut().enumerate() {
            if p.alive() {
                let pos = p.pos;
                if pred_count.at(pos) > 0. {
                    attacked.push(i);
                }
                // even split of the pre-depletion cover; the count is nonzero
                // because this prey is binned there
                p.food += temp.at(pos) / prey_count.at(pos);
                // depletion is total per cell, not proportional to intake
                *grass.at_mut(pos) = 0.;
            }
        }

        // resolve interactions over attacking x attacked only, instead of
        // all predators x all prey
        for &ip in attacking.iter() {
            let pos = pred.pop[ip].pos;
            for &iq in attacked.iter() {
                if prey.pop[iq].pos == pos {
                    prey.pop[iq].die();
                    pred.pop[ip].food += 1. / pred_count.at(pos);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coord;
    use crate::observer::Observer;

    fn small_param() -> Param {
        let mut param = Param::default();
        param.landscape.dim = 32;
        param.prey.n = 8;
        param.pred.n = 4;
        param.g_burnin = 1;
        param.g = 2;
        param.t = 3;
        param
    }

    /// park everyone far from the interaction under test
    fn park(pop: &mut [crate::population::Individual], pos: Coord) {
        for ind in pop.iter_mut() {
            ind.pos = pos;
            ind.food = 0.;
        }
    }

    #[test]
    fn construction_rejects_small_landscapes() {
        let mut param = small_param();
        param.landscape.dim = 31;
        assert!(Simulation::new(param).is_err());
        let mut param = small_param();
        param.landscape.dim = 32;
        assert!(Simulation::new(param).is_ok());
    }

    #[test]
    fn grazing_splits_evenly_and_depletes() {
        let mut sim = Simulation::new(small_param()).unwrap();
        park(&mut sim.prey.pop, Coord::new(20, 20));
        park(&mut sim.pred.pop, Coord::new(5, 5));
        sim.prey.pop[0].pos = Coord::new(10, 10);
        sim.prey.pop[1].pos = Coord::new(10, 10);
        sim.landscape.grass.fill(0.);
        *sim.landscape.grass.at_mut(Coord::new(10, 10)) = 10.;
        *sim.landscape.grass.at_mut(Coord::new(5, 5)) = 0.;
        sim.refresh_densities();

        sim.resolve_grazing_and_attacks();

        assert_eq!(sim.prey.pop[0].food, 5.);
        assert_eq!(sim.prey.pop[1].food, 5.);
        assert_eq!(sim.landscape.grass.at(Coord::new(10, 10)), 0.);
        // the parked prey shared their (empty) cell, no food from nothing
        assert_eq!(sim.prey.pop[2].food, 0.);
    }

    #[test]
    fn lone_attacker_takes_full_credit() {
        // the attack choice is a fair coin from the root stream, so probe a
        // handful of seeds and check both outcomes are consistent
        let mut attacks = 0;
        for seed in 0..32 {
            let mut sim = Simulation::new(small_param()).unwrap();
            park(&mut sim.prey.pop, Coord::new(20, 20));
            park(&mut sim.pred.pop, Coord::new(5, 5));
            sim.prey.pop[0].pos = Coord::new(10, 10);
            sim.pred.pop[0].pos = Coord::new(10, 10);
            sim.landscape.grass.fill(0.);
            sim.refresh_densities();
            sim.rng = DetRng::seed_from_u64(seed);

            sim.resolve_grazing_and_attacks();

            if sim.pred.pop[0].food > 0. {
                attacks += 1;
                assert!(!sim.prey.pop[0].alive());
                assert_eq!(sim.prey.pop[0].food, -1.);
                assert_eq!(sim.pred.pop[0].food, 1.);
            } else {
                // timid predator: prey grazes on unharmed
                assert!(sim.prey.pop[0].alive());
                assert_eq!(
                    sim.landscape.pred_count.at(Coord::new(10, 10)),
                    0.,
                    "timid predators are removed from the count"
                );
            }
        }
        assert!(attacks > 0 && attacks < 32, "saw {} attacks", attacks);
    }

    #[test]
    fn predation_credit_scales_with_matching_pairs() {
        // force every predator to attack by trying seeds until both do
        for seed in 0..256 {
            let mut sim = Simulation::new(small_param()).unwrap();
            park(&mut sim.prey.pop, Coord::new(20, 20));
            park(&mut sim.pred.pop, Coord::new(5, 5));
            // three prey and two predators on one cell
            for i in 0..3 {
                sim.prey.pop[i].pos = Coord::new(10, 10);
            }
            sim.pred.pop[0].pos = Coord::new(10, 10);
            sim.pred.pop[1].pos = Coord::new(10, 10);
            sim.landscape.grass.fill(0.);
            sim.refresh_densities();
            sim.rng = DetRng::seed_from_u64(seed);

            sim.resolve_grazing_and_attacks();

            if sim.pred.pop[0].food > 0. && sim.pred.pop[1].food > 0. {
                // both attacked: each earns 3 pairs x 1/2 credit
                assert_eq!(sim.pred.pop[0].food, 1.5);
                assert_eq!(sim.pred.pop[1].food, 1.5);
                for i in 0..3 {
                    assert!(!sim.prey.pop[i].alive());
                }
                return;
            }
        }
        panic!("no seed made both predators attack");
    }

    #[test]
    fn dead_prey_neither_graze_nor_die_twice() {
        let mut sim = Simulation::new(small_param()).unwrap();
        park(&mut sim.prey.pop, Coord::new(20, 20));
        park(&mut sim.pred.pop, Coord::new(5, 5));
        sim.prey.pop[0].die();
        sim.landscape.grass.fill(1.);
        sim.refresh_densities();

        sim.resolve_grazing_and_attacks();

        assert_eq!(sim.prey.pop[0].food, -1.);
        // its cell still got grazed by the living co-located prey
        assert_eq!(sim.landscape.grass.at(Coord::new(20, 20)), 0.);
    }

    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<Msg>>>);
    impl Observer for Recorder {
        fn notify(&mut self, _sim: &Simulation, msg: Msg) -> bool {
            self.0.borrow_mut().push(msg);
            true
        }
    }

    /// stops the run at the nth message
    struct Fuse(usize);
    impl Observer for Fuse {
        fn notify(&mut self, _sim: &Simulation, _msg: Msg) -> bool {
            self.0 = self.0.saturating_sub(1);
            self.0 > 0
        }
    }

    #[test]
    fn run_emits_the_phase_protocol() {
        let mut sim = Simulation::new(small_param()).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = ObserverChain::new();
        chain.push(Box::new(Recorder(log.clone())));
        assert!(sim.run(&mut chain));

        let mut expected = vec![Msg::Initialized];
        // one burn-in generation: ticks watchdogged, no assessment
        expected.push(Msg::NewGeneration);
        expected.extend([Msg::Watchdog; 3]);
        // two main generations
        for _ in 0..2 {
            expected.push(Msg::NewGeneration);
            expected.extend([Msg::PostTimestep; 3]);
            expected.push(Msg::Generation);
        }
        expected.push(Msg::Finished);

        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn observer_stop_halts_at_a_boundary() {
        let mut sim = Simulation::new(small_param()).unwrap();
        let mut chain = ObserverChain::new();
        // continue on INITIALIZED, stop on the first NEW_GENERATION
        chain.push(Box::new(Fuse(2)));
        assert!(!sim.run(&mut chain));
        // the stop came before any main generation was assessed
        assert!(sim.analysis().prey_summary().is_empty());
    }

    #[test]
    fn burn_in_reproduces_under_uniform_sampling() {
        let mut sim = Simulation::new(small_param()).unwrap();
        for ind in sim.prey.pop.iter_mut() {
            ind.food = 5.;
        }
        sim.prey.zero_fitness();
        assert!(sim.prey.sampler().is_uniform());
        sim.create_new_generations();
        assert_eq!(sim.prey.len(), 8);
        assert_eq!(sim.pred.len(), 4);
        assert!(sim.prey.pop.iter().all(|i| i.food == 0.));
    }

    #[test]
    fn population_sizes_are_constant_across_a_run() {
        let mut sim = Simulation::new(small_param()).unwrap();
        struct SizeCheck;
        impl Observer for SizeCheck {
            fn notify(&mut self, sim: &Simulation, _msg: Msg) -> bool {
                assert_eq!(sim.prey().len(), 8);
                assert_eq!(sim.pred().len(), 4);
                true
            }
        }
        let mut chain = ObserverChain::new();
        chain.push(Box::new(SizeCheck));
        assert!(sim.run(&mut chain));
    }

    #[test]
    fn runs_are_reproducible() {
        let mut a = Simulation::new(small_param()).unwrap();
        let mut b = Simulation::new(small_param()).unwrap();
        assert!(a.run(&mut ObserverChain::new()));
        assert!(b.run(&mut ObserverChain::new()));
        assert_eq!(a.prey.pop, b.prey.pop);
        assert_eq!(a.pred.pop, b.pred.pop);
        assert_eq!(a.prey.fitness, b.prey.fitness);
        assert_eq!(a.prey.policy.data(), b.prey.policy.data());
        assert_eq!(
            a.analysis().prey_summary().last(),
            b.analysis().prey_summary().last()
        );
    }

    #[test]
    fn fixed_phase_uses_its_own_tick_count() {
        let mut param = small_param();
        param.g_burnin = 0;
        param.g = 2;
        param.g_fix = 1;
        param.t = 2;
        param.t_fix = 5;
        let mut sim = Simulation::new(param).unwrap();
        struct TickCount(Rc<RefCell<Vec<usize>>>);
        impl Observer for TickCount {
            fn notify(&mut self, _sim: &Simulation, msg: Msg) -> bool {
                let mut per_gen = self.0.borrow_mut();
                match msg {
                    Msg::NewGeneration => per_gen.push(0),
                    Msg::PostTimestep => *per_gen.last_mut().unwrap() += 1,
                    _ => (),
                }
                true
            }
        }
        let per_gen = Rc::new(RefCell::new(Vec::new()));
        let mut chain = ObserverChain::new();
        chain.push(Box::new(TickCount(per_gen.clone())));
        assert!(sim.run(&mut chain));
        assert_eq!(*per_gen.borrow(), vec![2, 5]);
    }
}
