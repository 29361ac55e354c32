//! Lifecycle notifications.
//!
//! The run loop delivers a message at every phase boundary, synchronously and
//! single-threaded, to an ordered chain of observers. Every link sees every
//! message; the aggregate of the returned flags (logical and) is the run's
//! continue signal, so any link can request a cooperative stop at the next
//! boundary. Observers read simulation accessors but never mutate state.

use std::time::Instant;

use crate::sim::Simulation;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Msg {
    /// emitted once, only after successful construction
    Initialized,
    NewGeneration,
    /// per burn-in tick, liveness check only
    Watchdog,
    /// per main-generation tick
    PostTimestep,
    /// after fitness assessment and analysis, before reproduction
    Generation,
    Finished,
}

pub trait Observer {
    /// return false to request a stop; the run halts at the current phase
    /// boundary, never mid-tick
    fn notify(&mut self, sim: &Simulation, msg: Msg) -> bool;
}

#[derive(Default)]
pub struct ObserverChain {
    links: Vec<Box<dyn Observer>>,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, link: Box<dyn Observer>) {
        self.links.push(link);
    }

    pub fn notify(&mut self, sim: &Simulation, msg: Msg) -> bool {
        let mut go = true;
        for link in self.links.iter_mut() {
            go &= link.notify(sim, msg);
        }
        go
    }
}

/// prints one line per generation with both species' summary columns
pub struct ConsoleObserver {
    watch: Instant,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            watch: Instant::now(),
        }
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ConsoleObserver {
    fn notify(&mut self, sim: &Simulation, msg: Msg) -> bool {
        match msg {
            Msg::Initialized => println!("simulation initialized"),
            Msg::NewGeneration => {
                self.watch = Instant::now();
                print!(
                    "generation: {}{}  ",
                    sim.generation(),
                    if sim.fixed() { "*" } else { " " }
                );
            }
            Msg::Generation => {
                let prey = sim.analysis().prey_summary().last().unwrap();
                let pred = sim.analysis().pred_summary().last().unwrap();
                println!(
                    "{:.3} {} {} ({:.1});  {:.3} {} {} ({:.1});  {}ms",
                    prey.ave_fitness,
                    prey.repro_ind,
                    prey.repro_policies,
                    prey.complexity,
                    pred.ave_fitness,
                    pred.repro_ind,
                    pred.repro_policies,
                    pred.complexity,
                    self.watch.elapsed().as_millis()
                );
            }
            Msg::Finished => println!("simulation finished"),
            Msg::Watchdog | Msg::PostTimestep => (),
        }
        true
    }
}
