//! The solver's public interface.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};

use anyhow::Error;
use log::info;
use thiserror::Error;

use ferrosat_dimacs::DimacsParser;
use ferrosat_formula::{CnfFormula, ExtendFormula, Lit, Var};

use crate::config::{ConfigError, SolverConfig};
use crate::context::{ensure_var_count, Context, ModelP, SolverStateP, VariablesP};
use crate::load::load_clause;
use crate::model::reconstruct_model;
use crate::proof;
use crate::schedule::solve_loop;
use crate::simplify;
use crate::state::SatState;

pub use crate::proof::ProofFormat;

/// Outcome of a solve call.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SolveResult {
    /// The formula is satisfiable; the model assigns every input variable.
    Sat(Vec<bool>),
    /// The formula is unsatisfiable.
    Unsat,
    /// A resource limit or an interrupt ended the search first.
    Unknown,
}

/// Error of a solve call.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("unable to write the proof file: {0}")]
    ProofIo(#[source] io::Error),
}

/// Cloneable handle that asks a running solver to stop as soon as possible.
#[derive(Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Make the solver return [`SolveResult::Unknown`] at the next opportunity.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// A boolean satisfiability solver with inprocessing.
#[derive(Default)]
pub struct Solver<'a> {
    pub(crate) ctx: Box<Context<'a>>,
}

impl<'a> Solver<'a> {
    /// Create a new solver with the default configuration.
    pub fn new() -> Solver<'a> {
        Solver::default()
    }

    /// Create a new solver with the given configuration.
    pub fn with_config(config: SolverConfig) -> Solver<'a> {
        let mut solver = Solver::default();
        solver.ctx.config = config;
        solver
    }

    /// Change a single configuration option by name.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        self.ctx.config.set_option(name, value)
    }

    /// Add a formula to the solver.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        self.ensure_input_var_count(formula.var_count());
        let mut ctx = self.ctx.into_partial_ref_mut();
        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }
    }

    /// Read and add a formula in DIMACS CNF format.
    ///
    /// This feeds the parsed clauses into the solver chunk by chunk, avoiding a second in-memory
    /// copy of large formulas.
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), Error> {
        let parser = DimacsParser::parse_incremental(input, |parser| {
            self.add_formula(&parser.take_formula());
            Ok(())
        })?;

        info!(
            "parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        self.ensure_input_var_count(parser.var_count());

        Ok(())
    }

    /// Check the satisfiability of the current formula.
    pub fn solve(&mut self) -> Result<SolveResult, SolverError> {
        for tokens in &[
            &self.ctx.config.simplify_schedule_startup,
            &self.ctx.config.simplify_schedule_nonstartup,
        ] {
            if let Err(unknown) = simplify::parse_schedule(tokens.as_str()) {
                return Err(ConfigError::UnknownScheduleStep(unknown).into());
            }
        }

        if !self.ctx.solver_state.interrupt_flag_shared {
            self.ctx
                .solver_state
                .interrupt_requested
                .store(false, Ordering::Relaxed);
        }
        self.ctx.solver_state.solver_invoked = true;

        {
            let mut ctx = self.ctx.into_partial_ref_mut();
            solve_loop(ctx.borrow());

            if ctx.part(SolverStateP).sat_state == SatState::Sat {
                reconstruct_model(ctx.borrow());
            }

            proof::flush(ctx.borrow());
        }

        if let Some(error) = self.ctx.solver_state.solver_error.take() {
            return Err(error);
        }

        let result = match self.ctx.solver_state.sat_state {
            SatState::Unknown => SolveResult::Unknown,
            SatState::Unsat => SolveResult::Unsat,
            SatState::Sat => {
                let ctx = self.ctx.into_partial_ref();
                let input_vars = ctx.part(VariablesP).input_var_count();
                SolveResult::Sat(ctx.part(ModelP).input_model(input_vars))
            }
        };

        Ok(result)
    }

    /// A handle that can interrupt this solver from other threads.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: self.ctx.solver_state.interrupt_requested.clone(),
        }
    }

    /// Let this solver share the interrupt flag of an enclosing solver.
    pub(crate) fn share_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.ctx.solver_state.interrupt_requested = flag;
        self.ctx.solver_state.interrupt_flag_shared = true;
    }

    /// Generate a proof of unsatisfiability during solving.
    pub fn write_proof(&mut self, target: impl io::Write + 'a, format: ProofFormat) {
        self.ctx.proof.write_proof(target, format);
    }

    /// Stop generating a proof of unsatisfiability, flushing internal buffers.
    pub fn close_proof(&mut self) -> Result<(), SolverError> {
        self.ctx.proof.close_proof();
        if let Some(error) = self.ctx.solver_state.solver_error.take() {
            return Err(error);
        }
        Ok(())
    }

    /// Grow the caller visible variable space.
    fn ensure_input_var_count(&mut self, count: usize) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        if count > ctx.part(VariablesP).input_var_count() {
            ensure_var_count(ctx.borrow(), count);
            ctx.part_mut(VariablesP).set_input_var_count(count);
        }
    }

    /// Enable a test schedule that shrinks every interval, so short tests still exercise
    /// restarts, reductions and inprocessing.
    #[cfg(test)]
    pub(crate) fn enable_test_schedule(&mut self) {
        self.ctx.schedule.test_schedule = true;
        self.ctx.config.num_conflicts_of_search = 100;
        self.ctx.config.probe_budget = 10_000;
        self.ctx.config.occsimp_budget = 10_000;
        self.ctx.config.bva_budget = 10_000;
        self.ctx.config.distill_budget = 10_000;
    }
}

impl<'a> ExtendFormula for Solver<'a> {
    fn add_clause(&mut self, clause: &[Lit]) {
        if let Some(index) = clause.iter().map(|lit| lit.index()).max() {
            self.ensure_input_var_count(index + 1);
        }
        let mut ctx = self.ctx.into_partial_ref_mut();
        load_clause(ctx.borrow(), clause);
    }

    fn new_var(&mut self) -> Var {
        // Allocate above any internally introduced variable, so fresh user variables never alias
        // one that already carries definition clauses.
        let index = self.ctx.variables.var_count();
        self.ensure_input_var_count(index + 1);
        Var::from_index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use ferrosat_formula::{cnf_formula, test::*};

    fn check_model(formula: &CnfFormula, model: &[bool]) -> bool {
        formula.iter().all(|clause| {
            clause
                .iter()
                .any(|&lit| model[lit.index()] == lit.is_positive())
        })
    }

    #[test]
    fn empty_formula_is_sat() {
        let mut solver = Solver::new();
        assert_eq!(solver.solve().unwrap(), SolveResult::Sat(vec![]));
    }

    #[test]
    fn empty_clause_is_unsat() {
        let mut solver = Solver::new();
        solver.add_clause(&[]);
        assert_eq!(solver.solve().unwrap(), SolveResult::Unsat);
    }

    #[test]
    fn single_unit_clause() {
        let mut solver = Solver::new();
        let formula = cnf_formula![-2;];
        solver.add_formula(&formula);
        match solver.solve().unwrap() {
            SolveResult::Sat(model) => {
                assert_eq!(model.len(), 2);
                assert!(!model[1]);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn contradicting_units_are_unsat() {
        let mut solver = Solver::new();
        solver.add_formula(&cnf_formula![1; -1;]);
        assert_eq!(solver.solve().unwrap(), SolveResult::Unsat);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut solver = Solver::new();
        assert!(solver.set_option("no_such_option", "1").is_err());
        assert!(solver.set_option("restart_type", "luby").is_ok());
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        let mut solver = Solver::new();
        assert!(solver
            .set_option("simplify_schedule_startup", "bve, frobnicate")
            .is_err());
        assert!(solver
            .set_option("simplify_schedule_startup", "bve, probe")
            .is_ok());
    }

    proptest! {
        #[test]
        fn sgen_unsat(
            formula in sgen_unsat_formula(1..6usize),
            test_schedule in proptest::bool::ANY,
        ) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            if test_schedule {
                solver.enable_test_schedule();
            }

            prop_assert_eq!(solver.solve().unwrap(), SolveResult::Unsat);
        }

        #[test]
        fn sat_with_model_check(
            formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0),
            test_schedule in proptest::bool::ANY,
        ) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            if test_schedule {
                solver.enable_test_schedule();
            }

            match solver.solve().unwrap() {
                SolveResult::Sat(model) => {
                    prop_assert_eq!(model.len(), formula.var_count());
                    prop_assert!(check_model(&formula, &model));
                }
                other => prop_assert!(false, "unexpected result {:?}", other),
            }
        }

        #[test]
        fn sat_via_dimacs(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            let mut dimacs = vec![];
            ferrosat_dimacs::write_dimacs(&mut dimacs, &formula).unwrap();

            solver.add_dimacs_cnf(&mut &dimacs[..]).unwrap();

            match solver.solve().unwrap() {
                SolveResult::Sat(model) => prop_assert!(check_model(&formula, &model)),
                other => prop_assert!(false, "unexpected result {:?}", other),
            }
        }

        #[test]
        fn incremental_clause_adding(formula in sgen_unsat_formula(1..5usize)) {
            let mut solver = Solver::new();

            let mut last_result = SolveResult::Sat(vec![]);

            for clause in formula.iter() {
                solver.add_clause(clause);

                let result = solver.solve().unwrap();
                match (&last_result, &result) {
                    (SolveResult::Unsat, SolveResult::Sat(_)) => {
                        prop_assert!(false, "unsat became sat after adding a clause")
                    }
                    _ => (),
                }
                last_result = result;
            }

            prop_assert_eq!(last_result, SolveResult::Unsat);
        }
    }
}
