//! Backward subsumption and self-subsuming resolution.
//!
//! A clause `C` subsumes every clause `D ⊇ C`, which can then be deleted. If `C` and `D` overlap
//! except for one variable appearing with opposite polarity, resolving them yields `D` without
//! that variable's literal, so `D` can be strengthened in place (self-subsuming resolution).
//!
//! Candidates are found through the occurrence lists of the least occurring literal of `C`, with
//! the clause's variable-set signature as a fast reject (see
//! [`lits_abstraction`](crate::clause::lits_abstraction)).
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::budget::Budget;
use crate::clause::{db, lits_abstraction};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::state::SatState;

use super::occur::{self, OccClause};

/// Run backward subsumption and strengthening over all irredundant clauses.
pub fn backward_subsume<'a>(
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
        mut TmpDataP,
        mut TrailP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    occur::link(ctx.borrow());

    let mut budget = Budget::new(
        ctx.part(ConfigP).occsimp_budget,
        ctx.part(ConfigP).global_timeout_multiplier,
    );

    let mut candidates = collect_irredundant(ctx.borrow());
    // Smaller clauses subsume more and are cheaper to check.
    candidates.sort_by_key(|clause| match clause {
        OccClause::Binary(..) => 2,
        OccClause::Ternary(..) => 3,
        OccClause::Long(cref) => ctx.part(ClauseAllocP).header(*cref).len(),
    });

    let mut subsumed = 0u64;
    let mut strengthened = 0u64;

    for clause in candidates {
        if budget.exhausted()
            || ctx.part(SolverStateP).interrupted()
            || ctx.part(SolverStateP).sat_state != SatState::Unknown
        {
            break;
        }

        if !clause_is_present(ctx.borrow(), &clause) {
            continue;
        }

        let lits = clause.owned_lits(ctx.borrow());

        subsumed += subsume_with(ctx.borrow(), &clause, &lits, &mut budget);
        strengthened += strengthen_with(ctx.borrow(), &clause, &lits, &mut budget);
    }

    ctx.part_mut(OccurP).unlink();

    let stats = &mut ctx.part_mut(SimplifyP).stats;
    stats.subsumed += subsumed;
    stats.strengthened += strengthened;

    debug!(
        "backw-subsume: {} subsumed, {} strengthened",
        subsumed, strengthened
    );
}

/// All live irredundant clauses, short clauses in canonical form.
fn collect_irredundant<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, ClauseDbP, WatchlistsP),
) -> Vec<OccClause> {
    let mut result = vec![];

    {
        let watchlists = ctx.part(WatchlistsP);
        for code in 0..watchlists.len() {
            let watching = Lit::from_code(code);
            let first = !watching;
            for watch in watchlists.watched_by(watching) {
                match *watch {
                    crate::prop::Watch::Binary {
                        implied,
                        redundant: false,
                    } => {
                        if first < implied {
                            result.push(OccClause::Binary([first, implied], false));
                        }
                    }
                    crate::prop::Watch::Ternary {
                        implied,
                        redundant: false,
                    } => {
                        if first < implied[0] && first < implied[1] {
                            result.push(OccClause::Ternary([first, implied[0], implied[1]], false));
                        }
                    }
                    _ => (),
                }
            }
        }
    }

    for cref in db::collect_clauses(ctx.borrow()) {
        if !ctx.part(ClauseAllocP).header(cref).redundant() {
            result.push(OccClause::Long(cref));
        }
    }

    result
}

/// Whether the clause still exists in the database.
fn clause_is_present<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, WatchlistsP),
    clause: &OccClause,
) -> bool {
    match clause {
        OccClause::Binary(lits, redundant) => {
            ctx.part(WatchlistsP).contains_binary(*lits, *redundant)
        }
        OccClause::Ternary(lits, redundant) => {
            ctx.part(WatchlistsP).contains_ternary(*lits, *redundant)
        }
        OccClause::Long(cref) => !ctx.part(ClauseAllocP).header(*cref).deleted(),
    }
}

/// The literal of the clause with the fewest occurrences, as the cheapest candidate source.
fn least_occurring_lit<'a>(
    mut ctx: partial!(Context<'a>, OccurP, WatchlistsP),
    lits: &[Lit],
) -> Lit {
    let mut best = lits[0];
    let mut best_count = usize::max_value();
    for &lit in lits {
        let count =
            ctx.part(OccurP).occ_count(lit) + ctx.part(WatchlistsP).watched_by(!lit).len();
        if count < best_count {
            best = lit;
            best_count = count;
        }
    }
    best
}

/// Delete every clause subsumed by the given clause.
fn subsume_with<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut OccurP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TmpDataP,
        mut WatchlistsP,
    ),
    clause: &OccClause,
    lits: &[Lit],
    budget: &mut Budget,
) -> u64 {
    let pivot = least_occurring_lit(ctx.borrow(), lits);
    let abstraction = lits_abstraction(lits);

    mark_lits(ctx.borrow(), lits, true);

    let mut deleted = 0u64;

    // Ternary targets, only reachable for binary and ternary subsuming clauses.
    if lits.len() <= 3 {
        let mut ternary_targets = vec![];
        {
            let watchlists = ctx.part(WatchlistsP);
            let tmp = ctx.part(TmpDataP);
            for watch in watchlists.watched_by(!pivot) {
                if let crate::prop::Watch::Ternary { implied, redundant } = *watch {
                    let target = [pivot, implied[0], implied[1]];
                    budget.charge(1);
                    let in_clause = |lit: Lit| tmp.seen[lit.code()];
                    let covered =
                        lits.len() == 2 && (in_clause(implied[0]) || in_clause(implied[1]))
                            || lits.len() == 3 && in_clause(implied[0]) && in_clause(implied[1]);
                    if covered {
                        ternary_targets.push(OccClause::Ternary(target, redundant));
                    }
                }
            }
        }
        for target in ternary_targets {
            if let OccClause::Ternary(target_lits, _) = &target {
                // The subsuming clause itself shows up when it is one of the collected targets.
                if target_lits.len() == lits.len() {
                    let mut sorted = target_lits.to_vec();
                    sorted.sort_unstable();
                    let mut own = lits.to_vec();
                    own.sort_unstable();
                    if sorted == own {
                        continue;
                    }
                }
            }
            occur::delete_occ_clause(ctx.borrow(), &target, DeleteClauseProof::Simplified);
            deleted += 1;
        }
    }

    // Long targets.
    let long_targets: Vec<_> = ctx.part(OccurP).occs(pivot).to_vec();
    for cref in long_targets {
        budget.charge(1);

        let is_self = match clause {
            OccClause::Long(own) => *own == cref,
            _ => false,
        };
        if is_self {
            continue;
        }

        let covered = {
            let alloc = ctx.part(ClauseAllocP);
            let header = alloc.header(cref);
            if header.deleted()
                || header.len() < lits.len()
                || abstraction & !header.abstraction() != 0
            {
                continue;
            }
            let target_lits = alloc.clause(cref).lits();
            budget.charge(target_lits.len() as u64);
            let tmp = ctx.part(TmpDataP);
            let mut found = 0;
            for &lit in target_lits {
                if tmp.seen[lit.code()] {
                    found += 1;
                }
            }
            found == lits.len()
        };

        if covered {
            occur::delete_occ_clause(
                ctx.borrow(),
                &OccClause::Long(cref),
                DeleteClauseProof::Simplified,
            );
            deleted += 1;
        }
    }

    mark_lits(ctx.borrow(), lits, false);

    deleted
}

/// Strengthen clauses resolvable with the given clause on a single literal.
fn strengthen_with<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut WatchlistsP,
    ),
    clause: &OccClause,
    lits: &[Lit],
    budget: &mut Budget,
) -> u64 {
    let mut strengthened = 0u64;

    for flip_index in 0..lits.len() {
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            break;
        }

        let flipped = !lits[flip_index];

        // Mark C with one literal negated; any superset of this is resolvable with C and loses
        // the negated literal.
        let mut check_lits = lits.to_vec();
        check_lits[flip_index] = flipped;
        let abstraction = lits_abstraction(&check_lits);

        mark_lits(ctx.borrow(), &check_lits, true);

        // Short targets containing the flipped literal.
        let mut short_targets = vec![];
        {
            let watchlists = ctx.part(WatchlistsP);
            let tmp = ctx.part(TmpDataP);
            for watch in watchlists.watched_by(!flipped) {
                budget.charge(1);
                match *watch {
                    crate::prop::Watch::Binary { implied, redundant } => {
                        if check_lits.len() == 2 && tmp.seen[implied.code()] {
                            short_targets.push(OccClause::Binary([flipped, implied], redundant));
                        }
                    }
                    crate::prop::Watch::Ternary { implied, redundant } => {
                        let covered = match check_lits.len() {
                            2 => tmp.seen[implied[0].code()] || tmp.seen[implied[1].code()],
                            3 => tmp.seen[implied[0].code()] && tmp.seen[implied[1].code()],
                            _ => false,
                        };
                        if covered {
                            short_targets.push(OccClause::Ternary(
                                [flipped, implied[0], implied[1]],
                                redundant,
                            ));
                        }
                    }
                    _ => (),
                }
            }
        }

        for target in short_targets {
            strengthen_clause(ctx.borrow(), &target, flipped);
            strengthened += 1;
        }

        // Long targets containing the flipped literal.
        let long_targets: Vec<_> = ctx.part(OccurP).occs(flipped).to_vec();
        for cref in long_targets {
            budget.charge(1);

            let covered = {
                let alloc = ctx.part(ClauseAllocP);
                let header = alloc.header(cref);
                if header.deleted()
                    || header.len() < check_lits.len()
                    || abstraction & !header.abstraction() != 0
                {
                    continue;
                }
                let target_lits = alloc.clause(cref).lits();
                budget.charge(target_lits.len() as u64);
                let tmp = ctx.part(TmpDataP);
                let mut found = 0;
                for &lit in target_lits {
                    if tmp.seen[lit.code()] {
                        found += 1;
                    }
                }
                found == check_lits.len()
            };

            if covered {
                strengthen_clause(ctx.borrow(), &OccClause::Long(cref), flipped);
                strengthened += 1;
            }
        }

        mark_lits(ctx.borrow(), &check_lits, false);
    }

    strengthened
}

/// Remove a literal from a clause, switching its storage form if it shrinks past a boundary.
fn strengthen_clause<'a>(
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
    target: &OccClause,
    remove: Lit,
) {
    let old_lits = target.owned_lits(ctx.borrow());
    let redundant = target.redundant(ctx.borrow());
    let new_lits: Vec<Lit> = old_lits.iter().cloned().filter(|&lit| lit != remove).collect();

    proof::add_step(
        ctx.borrow(),
        &ProofStep::AddClause {
            redundant,
            clause: &new_lits,
        },
    );

    match target {
        OccClause::Binary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_binary(*lits, *redundant);
        }
        OccClause::Ternary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_ternary(*lits, *redundant);
        }
        OccClause::Long(cref) => {
            let cref = *cref;
            if new_lits.len() >= 4 {
                // Rewrite in place; the removed literal cannot be watched without reordering, so
                // rewatch explicitly.
                let watched = [old_lits[0], old_lits[1]];
                ctx.part_mut(WatchlistsP).unwatch_clause(cref, watched);
                {
                    let clause = ctx.part_mut(ClauseAllocP).clause_mut(cref);
                    clause.lits_mut()[..new_lits.len()].copy_from_slice(&new_lits);
                }
                ctx.part_mut(ClauseAllocP).shrink_clause(cref, new_lits.len());
                db::add_garbage(ctx.borrow(), 1);
                ctx.part_mut(WatchlistsP)
                    .watch_clause(cref, [new_lits[0], new_lits[1]]);
                ctx.part_mut(OccurP).remove_clause_lit(cref, remove);

                proof::add_step(
                    ctx.borrow(),
                    &ProofStep::DeleteClause {
                        clause: &old_lits,
                        proof: if redundant {
                            DeleteClauseProof::Redundant
                        } else {
                            DeleteClauseProof::Simplified
                        },
                    },
                );
                return;
            }

            let watched = [old_lits[0], old_lits[1]];
            ctx.part_mut(WatchlistsP).unwatch_clause(cref, watched);
            ctx.part_mut(OccurP).remove_clause(cref, &old_lits);
            db::delete_clause_detached(ctx.borrow(), cref);
        }
    }

    match new_lits[..] {
        [] => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
        [lit] => {
            if ctx.part(AssignmentP).lit_is_unk(lit) {
                enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
            } else if ctx.part(AssignmentP).lit_is_false(lit) {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            }
        }
        [lit_0, lit_1] => ctx.part_mut(WatchlistsP).add_binary([lit_0, lit_1], redundant),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(WatchlistsP)
            .add_ternary([lit_0, lit_1, lit_2], redundant),
        _ => unreachable!("longer clauses are rewritten in place"),
    }

    proof::add_step(
        ctx.borrow(),
        &ProofStep::DeleteClause {
            clause: &old_lits,
            proof: if redundant {
                DeleteClauseProof::Redundant
            } else {
                DeleteClauseProof::Simplified
            },
        },
    );
}

/// Set or clear the seen flag of the given literals.
fn mark_lits<'a>(mut ctx: partial!(Context<'a>, mut TmpDataP), lits: &[Lit], value: bool) {
    let tmp = ctx.part_mut(TmpDataP);
    for &lit in lits {
        tmp.seen[lit.code()] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::{cnf, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn subset_clause_deletes_superset() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 5);

        for &clause in cnf![
            1, 2;
            1, 2, 3, 4;
            1, 3, 4, 5;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        backward_subsume(ctx.borrow());

        // (1 2) subsumes (1 2 3 4); the other long clause stays.
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 1);
        assert_eq!(ctx.part(WatchlistsP).binary_count(), 1);
    }

    #[test]
    fn self_subsumption_strengthens() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        for &clause in cnf![
            1, 2;
            -1, 2, 3, 4;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        backward_subsume(ctx.borrow());

        // Resolving on 1 removes -1 from the long clause, leaving the ternary (2 3 4).
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 0);
        assert_eq!(ctx.part(WatchlistsP).ternary_count(), 1);
        assert!(ctx
            .part(WatchlistsP)
            .contains_ternary(lits![2, 3, 4], false));
    }
}
