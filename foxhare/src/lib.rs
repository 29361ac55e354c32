//! Foxhare is a deterministic spatial predator-prey co-evolution simulation.
//!
//! Lets go over that from the back.
//!
//! ## Simulation
//! The world is a square toroidal grid of layers: grass that regrows and
//! gets grazed, a static risk field, and per-species occupancy counts with
//! smoothed density counterparts used for sensing. On it live two fixed-size
//! populations, prey and predators. Every tick the grass grows, every
//! individual senses a handful of layers around itself and walks one cell,
//! densities are refreshed, prey graze their cell, and co-located predators
//! flip a coin to hunt.
//!
//! ## Co-evolution
//! Nobody learns anything within a lifetime. At the end of each generation
//! every individual is scored (food gathered, minus a penalty for policy
//! complexity, zero if eaten), and the next generation is drawn from the
//! current one with probability proportional to that score. Offspring sprout
//! near their ancestor and inherit a mutated copy of its movement policy, a
//! small per-individual network. Selection does the rest, on both sides of
//! the hunt at once.
//!
//! ## Deterministic
//! Re-running with the same seed and configuration produces the same
//! trajectory, no matter how many threads do the work. Parallel regions
//! never share a random stream: every worker derives its own from the seed
//! and its position in the schedule, and the one genuinely sequential piece
//! (interaction resolution) draws from the root stream.
//!
//! The run loop lives in [`sim::Simulation::run`]; phase boundaries notify
//! an [`observer::ObserverChain`] which can stop a run cooperatively.

pub mod analysis;
pub mod archive;
pub mod config;
pub mod coord;
pub mod error;
pub mod landscape;
pub mod observer;
pub mod policy;
pub mod population;
pub mod rng;
pub mod sim;
