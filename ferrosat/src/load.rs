//! Loading clauses into the solver.
use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::clause::{db, ClauseHeader};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{assignment, backtrack, Reason};
use crate::state::SatState;
use crate::variables::Removed;

/// Add a clause to the current formula.
///
/// Removes duplicated literals, drops tautological clauses, removes literals that are false at
/// level 0, drops clauses with a literal that is true at level 0, and dispatches the rest among
/// unit, binary, ternary and long clause representations.
///
/// Literals of variables that inprocessing removed are mapped to their equivalence
/// representatives, and eliminated or decomposed variables are put back into the active formula
/// before the clause is added.
///
/// Does not adjust the solver's variable count; that has to happen before this is called.
pub fn load_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ReconstructP,
    ),
    lits: &[Lit],
) {
    match ctx.part(SolverStateP).sat_state {
        SatState::Unsat => return,
        SatState::Sat => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unknown;
        }
        SatState::Unknown => (),
    }

    ctx.part_mut(SolverStateP).formula_is_empty = false;

    // Adding clauses invalidates the current search state.
    backtrack(ctx.borrow(), 0);

    let mapped = reactivate_lits(ctx.borrow(), lits);
    if ctx.part(SolverStateP).sat_state == SatState::Unsat {
        return;
    }

    let (tmp, mut ctx) = ctx.split_part_mut(TmpDataP);

    tmp.lits.clear();
    tmp.lits.extend_from_slice(&mapped);
    let lits = &mut tmp.lits;
    let simplified = &mut tmp.lits_2;

    lits.sort_unstable();
    lits.dedup();

    // Tautologies hold vacuously and are not added at all.
    let mut last = None;
    for &lit in lits.iter() {
        if last == Some(!lit) {
            return;
        }
        last = Some(lit);
    }

    // Remove false literals and detect satisfied clauses.
    simplified.clear();
    let mut satisfied = false;
    for &lit in lits.iter() {
        match ctx.part(AssignmentP).lit_value(lit) {
            Some(true) => {
                satisfied = true;
                break;
            }
            Some(false) => (),
            None => simplified.push(lit),
        }
    }

    if satisfied {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::DeleteClause {
                clause: lits,
                proof: DeleteClauseProof::Satisfied,
            },
        );
        return;
    }

    if simplified.len() < lits.len() {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: simplified,
            },
        );
        proof::add_step(
            ctx.borrow(),
            &ProofStep::DeleteClause {
                clause: lits,
                proof: DeleteClauseProof::Simplified,
            },
        );
    }

    match simplified[..] {
        [] => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
        [lit] => assignment::enqueue_assignment(ctx.borrow(), lit, Reason::Unit),
        [lit_0, lit_1] => ctx.part_mut(WatchlistsP).add_binary([lit_0, lit_1], false),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(WatchlistsP)
            .add_ternary([lit_0, lit_1, lit_2], false),
        _ => {
            let header = ClauseHeader::new();
            db::add_clause(ctx.borrow(), header, simplified);
        }
    }
}

/// Map literals to their active representatives, reactivating removed variables.
fn reactivate_lits<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ReconstructP,
    ),
    lits: &[Lit],
) -> Vec<Lit> {
    let mut mapped = Vec::with_capacity(lits.len());

    for &lit in lits {
        let lit = ctx.part(VariablesP).resolve_equiv(lit);
        match ctx.part(VariablesP).removed(lit.var()) {
            Removed::No => (),
            Removed::Substituted => unreachable!("equivalence chains end at active variables"),
            Removed::Eliminated => restore_eliminated(ctx.borrow(), lit.var()),
            Removed::Decomposed => restore_component(ctx.borrow(), lit.var()),
        }
        mapped.push(lit);
    }

    mapped
}

/// Put an eliminated variable and its deleted clauses back into the formula.
///
/// The deleted clauses follow from the resolvents together with the rest of the formula, so
/// re-adding them restores a formula equivalent to the one before elimination. The stale
/// reconstruction entries stay; they never fire for a variable the model already assigns.
fn restore_eliminated<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ReconstructP,
    ),
    var: ferrosat_formula::Var,
) {
    ctx.part_mut(VariablesP).set_removed(var, Removed::No);
    ctx.part_mut(VsidsP).make_available(var);

    let clauses = ctx.part(ReconstructP).elim_clauses(var);
    for clause in clauses {
        load_clause(ctx.borrow(), &clause);
    }
}

/// Put a decomposed component back into the formula.
fn restore_component<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ReconstructP,
    ),
    var: ferrosat_formula::Var,
) {
    let position = ctx
        .part(SimplifyP)
        .saved_components
        .iter()
        .position(|comp| comp.vars.contains(&var))
        .expect("decomposed variable without a saved component");

    let component = ctx.part_mut(SimplifyP).saved_components.swap_remove(position);

    for &comp_var in &component.vars {
        ctx.part_mut(VariablesP).set_removed(comp_var, Removed::No);
        ctx.part_mut(VsidsP).make_available(comp_var);
    }

    for clause in &component.clauses {
        load_clause(ctx.borrow(), clause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::lits;

    use crate::context::set_var_count;

    #[test]
    fn unsat_on_empty_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &[]);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn unit_clauses() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &lits![1]);
        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        load_clause(ctx.borrow(), &lits![3, -3]);
        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        load_clause(ctx.borrow(), &lits![-2]);
        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        load_clause(ctx.borrow(), &lits![1, 1]);
        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);

        load_clause(ctx.borrow(), &lits![2]);
        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn short_clauses_are_stored_inline() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &lits![1, 2]);
        assert_eq!(ctx.part(WatchlistsP).binary_count(), 1);

        load_clause(ctx.borrow(), &lits![-1, 3, 3]);
        assert_eq!(ctx.part(WatchlistsP).binary_count(), 2);

        load_clause(ctx.borrow(), &lits![4, -4]);
        assert_eq!(ctx.part(WatchlistsP).binary_count(), 2);

        load_clause(ctx.borrow(), &lits![4, 5, 6]);
        assert_eq!(ctx.part(WatchlistsP).ternary_count(), 1);

        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 0);
    }

    #[test]
    fn long_clauses_enter_the_arena() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &lits![1, 2, 3, 4]);
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 1);

        load_clause(ctx.borrow(), &lits![-2, 3, 3, 4, 5]);
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 2);

        // Shrinks to a ternary clause after deduplication
        load_clause(ctx.borrow(), &lits![4, 5, 5, 2]);
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 2);
        assert_eq!(ctx.part(WatchlistsP).ternary_count(), 1);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
    }
}
