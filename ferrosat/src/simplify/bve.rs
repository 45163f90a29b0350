//! Bounded variable elimination.
//!
//! A variable `v` can be resolved out of the formula by replacing the clause sets `P` (containing
//! `v`) and `N` (containing `!v`) with all non-tautological resolvents `P x N`. This is done only
//! when the number of resolvents does not exceed `|P| + |N|` plus a configured slack and no
//! resolvent grows past the configured size bound.
//!
//! The deleted clauses go onto the reconstruction stack, which later extends a model of the
//! reduced formula back over the eliminated variables. Variables are processed in order of an
//! elimination cost estimate, cheapest first.
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::{Lit, Var};
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::budget::Budget;
use crate::context::{parts::*, Context};
use crate::proof;
use crate::reconstruct::ReconstructStep;
use crate::state::SatState;
use crate::variables::Removed;

use super::occur;

/// Upper bound on the occurrence count of either polarity for elimination attempts.
///
/// Variables occurring more often than this are never worth the quadratic resolvent check.
const OCC_LIMIT: usize = 100;

/// Eliminate variables while the bounds allow it.
pub fn eliminate_vars<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut CacheP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut ReconstructP,
        mut SimplifyP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    if !ctx.part(ConfigP).do_var_elim {
        return;
    }

    occur::link(ctx.borrow());

    let mut budget = Budget::new(
        ctx.part(ConfigP).occsimp_budget,
        ctx.part(ConfigP).global_timeout_multiplier,
    );

    // Cheapest candidates first; the product of the occurrence counts bounds the number of
    // resolvents an elimination can produce.
    let candidates: Vec<Var> = ctx
        .part(VariablesP)
        .active_vars()
        .filter(|&var| ctx.part(AssignmentP).var_value(var).is_none())
        .collect();
    let mut queue: Vec<(usize, Var)> = Vec::with_capacity(candidates.len());
    for var in candidates {
        let cost = occur::occurrence_count(ctx.borrow(), var.positive())
            * occur::occurrence_count(ctx.borrow(), var.negative());
        queue.push((cost, var));
    }
    queue.sort_unstable();

    let limit = ((queue.len() as f64) * ctx.part(ConfigP).var_elim_ratio_per_iter).ceil() as usize;

    let mut eliminated = 0u64;

    for &(_, var) in queue.iter().take(limit) {
        if budget.exhausted()
            || ctx.part(SolverStateP).interrupted()
            || ctx.part(SolverStateP).sat_state != SatState::Unknown
        {
            break;
        }

        if try_eliminate(ctx.borrow(), var, &mut budget) {
            eliminated += 1;
        }
    }

    ctx.part_mut(OccurP).unlink();

    if eliminated > 0 {
        // Cached implications may mention eliminated variables.
        ctx.part_mut(CacheP).clear();
    }

    ctx.part_mut(SimplifyP).stats.eliminated_vars += eliminated;
    debug!("bve: eliminated {} variables", eliminated);
}

/// Attempt to eliminate a single variable.
fn try_eliminate<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut ReconstructP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
    var: Var,
    budget: &mut Budget,
) -> bool {
    if !ctx.part(VariablesP).is_active(var) || ctx.part(AssignmentP).var_value(var).is_some() {
        return false;
    }

    let pos_lit = var.positive();
    let neg_lit = var.negative();

    let all_pos = occur::clauses_with_lit(ctx.borrow(), pos_lit);
    let all_neg = occur::clauses_with_lit(ctx.borrow(), neg_lit);

    let mut pos = vec![];
    let mut pos_red = vec![];
    for clause in all_pos {
        if clause.redundant(ctx.borrow()) {
            pos_red.push(clause);
        } else {
            pos.push(clause);
        }
    }

    let mut neg = vec![];
    let mut neg_red = vec![];
    for clause in all_neg {
        if clause.redundant(ctx.borrow()) {
            neg_red.push(clause);
        } else {
            neg.push(clause);
        }
    }

    if pos.len() > OCC_LIMIT || neg.len() > OCC_LIMIT {
        return false;
    }

    budget.charge((pos.len() * neg.len()) as u64 + 1);

    let pos_lits: Vec<Vec<Lit>> = pos
        .iter()
        .map(|clause| clause.owned_lits(ctx.borrow()))
        .collect();
    let neg_lits: Vec<Vec<Lit>> = neg
        .iter()
        .map(|clause| clause.owned_lits(ctx.borrow()))
        .collect();

    let max_resolvents = pos.len() + neg.len() + ctx.part(ConfigP).velim_grow;
    let size_limit = ctx.part(ConfigP).velim_resolvent_too_large;

    let mut resolvents: Vec<Vec<Lit>> = vec![];

    for p in &pos_lits {
        for n in &neg_lits {
            budget.charge((p.len() + n.len()) as u64);
            if let Some(resolvent) = resolve(p, n, var) {
                if resolvent.len() > size_limit {
                    return false;
                }
                resolvents.push(resolvent);
                if resolvents.len() > max_resolvents {
                    return false;
                }
            }
        }
    }

    // Elimination pays off; emit the resolvents first so each one is a propagation consequence
    // of the still-present originals.
    for resolvent in &resolvents {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: resolvent,
            },
        );
    }

    for (clause, lits) in pos.iter().zip(pos_lits.iter()) {
        ctx.part_mut(ReconstructP).push(ReconstructStep::ElimClause {
            blocking: pos_lit,
            clause: lits.clone(),
        });
        occur::delete_occ_clause(ctx.borrow(), clause, DeleteClauseProof::Simplified);
    }
    for (clause, lits) in neg.iter().zip(neg_lits.iter()) {
        ctx.part_mut(ReconstructP).push(ReconstructStep::ElimClause {
            blocking: neg_lit,
            clause: lits.clone(),
        });
        occur::delete_occ_clause(ctx.borrow(), clause, DeleteClauseProof::Simplified);
    }
    for clause in pos_red.iter().chain(neg_red.iter()) {
        occur::delete_occ_clause(ctx.borrow(), clause, DeleteClauseProof::Redundant);
    }

    for resolvent in &resolvents {
        occur::add_irred_clause(ctx.borrow(), resolvent);
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return true;
        }
    }

    proof::add_step(ctx.borrow(), &ProofStep::EliminateVar { var });
    ctx.part_mut(VariablesP).set_removed(var, Removed::Eliminated);
    ctx.part_mut(VsidsP).remove(var);

    true
}

/// The resolvent of two clauses on the given variable, unless it is tautological.
fn resolve(p: &[Lit], n: &[Lit], var: Var) -> Option<Vec<Lit>> {
    let mut resolvent: Vec<Lit> = p
        .iter()
        .chain(n.iter())
        .cloned()
        .filter(|lit| lit.var() != var)
        .collect();
    resolvent.sort_unstable();
    resolvent.dedup();

    if resolvent.windows(2).any(|pair| pair[0] == !pair[1]) {
        return None;
    }

    Some(resolvent)
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::{cnf, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn resolvent_drops_tautologies() {
        assert_eq!(
            resolve(&lits![1, 2], &lits![-1, 3], lits![1][0].var()),
            Some(lits![2, 3].to_vec())
        );
        assert_eq!(
            resolve(&lits![1, 2], &lits![-1, -2], lits![1][0].var()),
            None
        );
    }

    #[test]
    fn pure_literal_is_eliminated() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // Variable 1 occurs only positively, so elimination deletes its clauses outright.
        for &clause in cnf![
            1, 2;
            1, 3, 4;
            -2, 3;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        eliminate_vars(ctx.borrow());

        assert_eq!(
            ctx.part(VariablesP).removed(lits![1][0].var()),
            Removed::Eliminated
        );
        assert!(!ctx.part(WatchlistsP).has_binary(lits![1, 2]));
        assert!(ctx.part(ReconstructP).len() >= 2);
    }

    #[test]
    fn elimination_keeps_equisatisfiability() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        for &clause in cnf![
            1, 2;
            -2, 3;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        eliminate_vars(ctx.borrow());

        // Some variable is eliminated; its clauses are replaced by resolvents (or dropped for a
        // pure literal) and recorded for model extension.
        assert!(ctx.part(SimplifyP).stats.eliminated_vars > 0);
        assert!(ctx.part(ReconstructP).len() > 0);
        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
    }
}
