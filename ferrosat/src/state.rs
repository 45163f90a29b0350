//! Miscellaneous solver state.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::solver::SolverError;

/// Satisfiability state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SatState {
    Unknown,
    Sat,
    Unsat,
}

impl Default for SatState {
    fn default() -> SatState {
        SatState::Unknown
    }
}

/// Miscellaneous solver state.
///
/// Anything larger or any larger group of related state variables should be moved into a separate
/// part of [`Context`](crate::context::Context).
pub struct SolverState {
    pub sat_state: SatState,
    pub formula_is_empty: bool,
    /// Whether solve was called at least once.
    pub solver_invoked: bool,
    pub solver_error: Option<SolverError>,
    /// Set from other threads to make the solver return as soon as possible.
    pub interrupt_requested: Arc<AtomicBool>,
    /// Whether the interrupt flag belongs to an enclosing solver.
    ///
    /// A sub solver must not clear a pending interrupt of its parent.
    pub interrupt_flag_shared: bool,
}

impl Default for SolverState {
    fn default() -> SolverState {
        SolverState {
            sat_state: SatState::Unknown,
            formula_is_empty: true,
            solver_invoked: false,
            solver_error: None,
            interrupt_requested: Arc::new(AtomicBool::new(false)),
            interrupt_flag_shared: false,
        }
    }
}

impl SolverState {
    /// Whether an external interrupt was requested.
    ///
    /// Long running passes poll this at their inner loop boundaries.
    pub fn interrupted(&self) -> bool {
        self.interrupt_requested.load(Ordering::Relaxed)
    }
}

/// The solver's seeded random number generator.
///
/// Every randomized choice inside the solver draws from this generator, so a fixed seed in the
/// configuration makes the whole solver deterministic.
pub struct SolverRng {
    pub rng: SmallRng,
}

impl Default for SolverRng {
    fn default() -> SolverRng {
        SolverRng {
            rng: SmallRng::seed_from_u64(0),
        }
    }
}

impl SolverRng {
    /// Reset the generator to a given seed.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }
}
