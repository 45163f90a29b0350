//! Conflict driven clause learning.
use partial_ref::{partial, PartialRef};

use ferrosat_internal_proof::ProofStep;

use crate::analyze::analyze_conflict;
use crate::clause::activity::decay_clause_activities;
use crate::clause::{db, ClauseHeader};
use crate::context::{parts::*, Context};
use crate::decision::make_decision;
use crate::proof;
use crate::prop::{backtrack, enqueue_assignment, propagate, Conflict, Reason};
use crate::state::SatState;

/// Find a conflict, learn a clause and backjump.
///
/// If no conflict is found a satisfying assignment is reached and the state is set to SAT. If the
/// learned clause is empty the state is set to UNSAT.
pub fn conflict_step<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut RngP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        CacheP,
        ConfigP,
        VariablesP,
    ),
) {
    let conflict = match find_conflict(ctx.borrow()) {
        Ok(()) => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Sat;
            return;
        }
        Err(conflict) => conflict,
    };

    let backtrack_to = analyze_conflict(ctx.borrow(), conflict);

    ctx.part_mut(VsidsP).decay();
    decay_clause_activities(ctx.borrow());

    backtrack(ctx.borrow(), backtrack_to);

    let (clause, glue) = {
        let analyze = ctx.part(AnalyzeConflictP);
        (analyze.clause().to_vec(), analyze.glue())
    };

    if clause.is_empty() {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &[],
            },
        );
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return;
    }

    proof::add_step(
        ctx.borrow(),
        &ProofStep::AddClause {
            redundant: true,
            clause: &clause,
        },
    );

    let reason = match clause[..] {
        [_] => Reason::Unit,
        [_, lit_1] => {
            ctx.part_mut(WatchlistsP)
                .add_binary([clause[0], lit_1], true);
            Reason::Binary([lit_1])
        }
        [_, lit_1, lit_2] => {
            ctx.part_mut(WatchlistsP)
                .add_ternary([clause[0], lit_1, lit_2], true);
            Reason::Ternary([lit_1, lit_2])
        }
        _ => {
            let mut header = ClauseHeader::new();
            header.set_redundant(true);
            header.set_glue(glue);
            let cref = db::add_clause(ctx.borrow(), header, &clause);
            Reason::Long(cref)
        }
    };

    enqueue_assignment(ctx.borrow(), clause[0], reason);
}

/// Propagate and make decisions until a conflict is found.
///
/// Returns `Ok` if a satisfying assignment was found instead.
pub fn find_conflict<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut RngP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
        VariablesP,
    ),
) -> Result<(), Conflict> {
    loop {
        propagate(ctx.borrow())?;

        if !make_decision(ctx.borrow()) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::{IntoPartialRef, IntoPartialRefMut};
    use proptest::prelude::*;

    use ferrosat_formula::{cnf_formula, test::*};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    fn solve_to_fixpoint(ctx: &mut Context) -> SatState {
        let mut ctx = ctx.into_partial_ref_mut();
        while ctx.part(SolverStateP).sat_state == SatState::Unknown {
            conflict_step(ctx.borrow());
        }
        ctx.part(SolverStateP).sat_state
    }

    #[test]
    fn level_0_unsat() {
        let mut ctx = Context::default();
        {
            let mut ctx = ctx.into_partial_ref_mut();

            let formula = cnf_formula![
                1, 2, 3;
                -1;
                1, -2;
                2, -3;
            ];

            set_var_count(ctx.borrow(), formula.var_count());

            for clause in formula.iter() {
                load_clause(ctx.borrow(), clause);
            }
        }

        assert_eq!(solve_to_fixpoint(&mut ctx), SatState::Unsat);
    }

    #[test]
    fn pigeon_hole_unsat() {
        let mut ctx = Context::default();
        {
            let mut ctx = ctx.into_partial_ref_mut();

            let formula = pigeon_hole_formula(3);

            set_var_count(ctx.borrow(), formula.var_count());

            for clause in formula.iter() {
                load_clause(ctx.borrow(), clause);
            }
        }

        assert_eq!(solve_to_fixpoint(&mut ctx), SatState::Unsat);
    }

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..6usize)) {
            let mut ctx = Context::default();
            {
                let mut ctx = ctx.into_partial_ref_mut();

                set_var_count(ctx.borrow(), formula.var_count());

                for clause in formula.iter() {
                    load_clause(ctx.borrow(), clause);
                }
            }

            prop_assert_eq!(solve_to_fixpoint(&mut ctx), SatState::Unsat);
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut ctx = Context::default();
            {
                let mut ctx = ctx.into_partial_ref_mut();

                set_var_count(ctx.borrow(), formula.var_count());

                for clause in formula.iter() {
                    load_clause(ctx.borrow(), clause);
                }
            }

            prop_assert_eq!(solve_to_fixpoint(&mut ctx), SatState::Sat);

            let ctx = ctx.into_partial_ref();
            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|&lit| ctx.part(AssignmentP).lit_is_true(lit)));
            }
        }
    }
}
