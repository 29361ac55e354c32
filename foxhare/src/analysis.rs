//! Per-generation summary statistics, retained for reporting.

use crate::population::Population;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub ave_fitness: f32,
    /// individuals that scored above zero, i.e. could reproduce
    pub repro_ind: usize,
    /// distinct ancestor units still represented in the live population
    pub repro_policies: usize,
    /// mean policy complexity
    pub complexity: f32,
}

impl Summary {
    pub fn assess(pop: &Population) -> Self {
        let n = pop.len();
        let ave_fitness = pop.fitness.iter().sum::<f32>() / n as f32;
        let repro_ind = pop.fitness.iter().filter(|&&f| f > 0.).count();
        let mut seen = vec![false; n];
        for ind in &pop.pop {
            seen[ind.ancestor] = true;
        }
        let repro_policies = seen.iter().filter(|&&s| s).count();
        let complexity =
            (0..n).map(|i| pop.policy.complexity(i)).sum::<f32>() / n as f32;
        Self {
            ave_fitness,
            repro_ind,
            repro_policies,
            complexity,
        }
    }
}

/// summary history for both species, one entry per main generation
#[derive(Default)]
pub struct Analysis {
    prey: Vec<Summary>,
    pred: Vec<Summary>,
}

impl Analysis {
    pub fn generation(&mut self, prey: &Population, pred: &Population) {
        self.prey.push(Summary::assess(prey));
        self.pred.push(Summary::assess(pred));
    }

    pub fn prey_summary(&self) -> &[Summary] {
        &self.prey
    }

    pub fn pred_summary(&self) -> &[Summary] {
        &self.pred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Param;
    use crate::coord::Coord;
    use crate::landscape::Landscape;
    use crate::population::Species;
    use crate::rng::DetRng;
    use rand::SeedableRng;

    #[test]
    fn summary_counts_reproducers_and_lineages() {
        let mut ip = Param::default().prey;
        ip.n = 4;
        ip.cmplx_penalty = 0.;
        let landscape = Landscape::new(32).unwrap();
        let mut rng = DetRng::seed_from_u64(3);
        let mut pop = Population::new(Species::Prey, &ip, &landscape, &mut rng, 11).unwrap();

        for (i, ind) in pop.pop.iter_mut().enumerate() {
            ind.pos = Coord::new(0, 0);
            ind.food = if i < 2 { 4. } else { 0. };
            ind.ancestor = i / 2; // two lineages
        }
        pop.assess_fitness(&ip);
        let s = Summary::assess(&pop);
        assert_eq!(s.ave_fitness, 2.);
        assert_eq!(s.repro_ind, 2);
        assert_eq!(s.repro_policies, 2);
        // fresh linear policies start with all 4 weights active
        assert_eq!(s.complexity, 4.);
    }
}
