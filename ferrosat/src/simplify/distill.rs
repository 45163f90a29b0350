//! Clause distillation.
//!
//! For an irredundant long clause `(l_1 v ... v l_n)` the negations of its literals are assumed
//! one by one at a throwaway decision level. Three outcomes shorten the clause:
//!
//! * assuming `!l_1 ... !l_(i-1)` conflicts: the prefix `(l_1 v ... v l_i)` replaces the clause,
//! * some `l_i` becomes true: the prefix up to `l_i` replaces the clause,
//! * some `l_i` becomes false: `l_i` drops out of the clause.
//!
//! Every replacement is a unit propagation consequence of the remaining formula, so the proof
//! side is a plain add and delete.
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::budget::Budget;
use crate::clause::{db, ClauseHeader};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{backtrack, enqueue_assignment, propagate, Reason};
use crate::state::SatState;

/// Distill all irredundant long clauses within the budget.
pub fn distill<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    let mut budget = Budget::new(
        ctx.part(ConfigP).distill_budget,
        ctx.part(ConfigP).global_timeout_multiplier,
    );

    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let mut removed_lits = 0u64;

    for cref in db::collect_clauses(ctx.borrow()) {
        if budget.exhausted()
            || ctx.part(SolverStateP).interrupted()
            || ctx.part(SolverStateP).sat_state != SatState::Unknown
        {
            break;
        }

        {
            let header = ctx.part(ClauseAllocP).header(cref);
            if header.deleted() || header.redundant() {
                continue;
            }
        }

        let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();

        budget.charge(lits.len() as u64 * 2);

        let mut shortened: Option<Vec<Lit>> = None;

        ctx.part_mut(TrailP).new_decision_level();

        for (index, &lit) in lits.iter().enumerate() {
            match ctx.part(AssignmentP).lit_value(lit) {
                Some(true) => {
                    // The assumed prefix already implies this literal.
                    if index + 1 < lits.len() {
                        shortened = Some(lits[..=index].to_vec());
                    }
                    break;
                }
                Some(false) => {
                    // The assumed prefix implies the negation, so the literal contributes
                    // nothing.
                    let mut rest = lits.clone();
                    rest.remove(index);
                    shortened = Some(rest);
                    break;
                }
                None => {
                    enqueue_assignment(ctx.borrow(), !lit, Reason::Decision);
                    let trail_before = ctx.part(TrailP).trail().len();
                    if propagate(ctx.borrow()).is_err() {
                        if index + 1 < lits.len() {
                            shortened = Some(lits[..=index].to_vec());
                        }
                        break;
                    }
                    budget.charge((ctx.part(TrailP).trail().len() - trail_before) as u64 + 2);
                }
            }
        }

        backtrack(ctx.borrow(), 0);

        if let Some(new_lits) = shortened {
            removed_lits += (lits.len() - new_lits.len()) as u64;
            replace_long_clause(ctx.borrow(), cref, &lits, &new_lits);
        }
    }

    ctx.part_mut(SimplifyP).stats.distilled_lits += removed_lits;
    debug!("distill-cls: removed {} literals", removed_lits);
}

/// Replace a long clause by a strictly shorter clause over a subset of its literals.
fn replace_long_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
    ),
    cref: crate::clause::ClauseRef,
    old_lits: &[Lit],
    new_lits: &[Lit],
) {
    debug_assert!(new_lits.len() < old_lits.len());

    proof::add_step(
        ctx.borrow(),
        &ProofStep::AddClause {
            redundant: false,
            clause: new_lits,
        },
    );

    let watched = [old_lits[0], old_lits[1]];
    ctx.part_mut(WatchlistsP).unwatch_clause(cref, watched);
    if ctx.part(OccurP).is_linked() {
        ctx.part_mut(OccurP).remove_clause(cref, old_lits);
    }
    db::delete_clause_detached(ctx.borrow(), cref);

    match *new_lits {
        [] => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
        [lit] => {
            if ctx.part(AssignmentP).lit_is_unk(lit) {
                enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
            } else if ctx.part(AssignmentP).lit_is_false(lit) {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            }
        }
        [lit_0, lit_1] => ctx.part_mut(WatchlistsP).add_binary([lit_0, lit_1], false),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(WatchlistsP)
            .add_ternary([lit_0, lit_1, lit_2], false),
        _ => {
            let cref = db::add_clause(ctx.borrow(), ClauseHeader::new(), new_lits);
            if ctx.part(OccurP).is_linked() {
                let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
                ctx.part_mut(OccurP).add_clause(cref, &lits);
            }
        }
    }

    proof::add_step(
        ctx.borrow(),
        &ProofStep::DeleteClause {
            clause: old_lits,
            proof: DeleteClauseProof::Simplified,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::cnf;

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn redundant_literal_is_distilled_away() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 5);

        // Assuming -1 and -2 propagates -4 via the binaries, so 4 is superfluous in the long
        // clause.
        for &clause in cnf![
            1, 2, 4, 5;
            -1, -4;
            2, -4;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        distill(ctx.borrow());

        assert!(ctx.part(SimplifyP).stats.distilled_lits > 0);
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 0);
        assert_eq!(ctx.part(WatchlistsP).ternary_count(), 1);
    }
}
