//! Equivalent literal substitution.
//!
//! Every binary clause `(a v b)` is the pair of implications `!a -> b` and `!b -> a`. Literals on
//! a cycle of this implication graph are logically equivalent, so each strongly connected
//! component can be collapsed to a single representative. A component containing a literal and
//! its negation makes the formula unsatisfiable.
//!
//! Rewriting replaces every occurrence of a merged literal by its representative, deduplicates
//! the touched clauses and drops the ones that became tautological. Merged variables are recorded
//! on the reconstruction stack so models extend back to them.
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::clause::{db, ClauseHeader};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason, Watch, Watchlists};
use crate::reconstruct::ReconstructStep;
use crate::state::SatState;
use crate::variables::Removed;

use super::occur::OccClause;

const UNVISITED: u32 = u32::max_value();

/// Result of the component search.
#[derive(Default)]
struct SccOutcome {
    /// Replacement for the positive literal, per variable.
    subst: Vec<Option<Lit>>,
    /// Members of contradictory components; enqueueing one and propagating derives the conflict.
    contradiction: Option<Lit>,
    merged: usize,
}

/// Find and collapse strongly connected components of the binary implication graph.
pub fn equiv_replace<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut CacheP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut ReconstructP,
        mut SimplifyP,
        mut SolverStateP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
) {
    let node_count = ctx.part(WatchlistsP).len();
    if node_count == 0 {
        return;
    }

    let active: Vec<bool> = (0..node_count)
        .map(|code| {
            let lit = Lit::from_code(code);
            ctx.part(AssignmentP).lit_is_unk(lit) && ctx.part(VariablesP).is_active(lit.var())
        })
        .collect();

    let outcome = find_components(ctx.part(WatchlistsP), &active);

    if let Some(lit) = outcome.contradiction {
        // Both polarities of this literal are in one implication cycle, so the unit clause is an
        // asymmetric tautology; propagating it runs into the cycle's conflict.
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &[lit],
            },
        );
        enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
        return;
    }

    if outcome.merged == 0 {
        return;
    }

    for (var_index, replacement) in outcome.subst.iter().enumerate() {
        if let Some(replacement) = *replacement {
            let var = ferrosat_formula::Var::from_index(var_index);
            ctx.part_mut(VariablesP).set_removed(var, Removed::Substituted);
            ctx.part_mut(VariablesP).set_equiv(var, replacement);
            ctx.part_mut(VsidsP).remove(var);
            ctx.part_mut(ReconstructP).push(ReconstructStep::Substituted {
                var,
                equiv: replacement,
            });
        }
    }

    apply_substitution(ctx.borrow(), &outcome.subst);

    ctx.part_mut(CacheP).clear();
    ctx.part_mut(SimplifyP).stats.equiv_lits += outcome.merged as u64;

    debug!("scc: merged {} literals", outcome.merged);
}

/// Iterative Tarjan over the implication graph restricted to active literals.
fn find_components(watchlists: &Watchlists, active: &[bool]) -> SccOutcome {
    let node_count = active.len();

    let mut outcome = SccOutcome::default();
    outcome.subst = vec![None; node_count / 2];

    let mut index: Vec<u32> = vec![UNVISITED; node_count];
    let mut lowlink: Vec<u32> = vec![0; node_count];
    let mut on_stack: Vec<bool> = vec![false; node_count];
    let mut stack: Vec<u32> = vec![];
    // (node, next successor position) frames of the explicit DFS.
    let mut call_stack: Vec<(u32, usize)> = vec![];
    let mut next_index: u32 = 0;

    for root in 0..node_count as u32 {
        if index[root as usize] != UNVISITED || !active[root as usize] {
            continue;
        }

        index[root as usize] = next_index;
        lowlink[root as usize] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root as usize] = true;
        call_stack.push((root, 0));

        while !call_stack.is_empty() {
            let node = call_stack.last().unwrap().0;
            let succs = watchlists.watched_by(Lit::from_code(node as usize));

            let mut pushed = false;
            loop {
                let succ_pos = {
                    let frame = call_stack.last_mut().unwrap();
                    if frame.1 >= succs.len() {
                        break;
                    }
                    frame.1 += 1;
                    frame.1 - 1
                };

                let succ = match succs[succ_pos] {
                    Watch::Binary { implied, .. } => implied.code() as u32,
                    _ => continue,
                };
                if !active[succ as usize] {
                    continue;
                }

                if index[succ as usize] == UNVISITED {
                    index[succ as usize] = next_index;
                    lowlink[succ as usize] = next_index;
                    next_index += 1;
                    stack.push(succ);
                    on_stack[succ as usize] = true;
                    call_stack.push((succ, 0));
                    pushed = true;
                    break;
                } else if on_stack[succ as usize] {
                    lowlink[node as usize] = lowlink[node as usize].min(index[succ as usize]);
                }
            }

            if pushed {
                continue;
            }

            let node_lowlink = lowlink[node as usize];
            if node_lowlink == index[node as usize] {
                let first = stack
                    .iter()
                    .rposition(|&entry| entry == node)
                    .expect("tarjan stack corrupt");
                let component: Vec<u32> = stack.drain(first..).collect();
                for &entry in &component {
                    on_stack[entry as usize] = false;
                }

                collect_component(&component, &mut outcome);
                if outcome.contradiction.is_some() {
                    return outcome;
                }
            }

            call_stack.pop();
            if let Some(&mut (parent, _)) = call_stack.last_mut() {
                lowlink[parent as usize] = lowlink[parent as usize].min(node_lowlink);
            }
        }
    }

    outcome
}

/// Record the substitutions of one strongly connected component.
fn collect_component(component: &[u32], outcome: &mut SccOutcome) {
    if component.len() < 2 {
        return;
    }

    let mut lits: Vec<Lit> = component
        .iter()
        .map(|&code| Lit::from_code(code as usize))
        .collect();
    lits.sort_unstable();

    for pair in lits.windows(2) {
        if pair[0] == !pair[1] {
            outcome.contradiction = Some(pair[0]);
            return;
        }
    }

    let rep = lits[0];

    // The mirrored component of the negated literals yields the same merges; skip it.
    if lits.iter().any(|&lit| outcome.subst[lit.index()].is_some()) {
        return;
    }

    for &lit in &lits[1..] {
        debug_assert_ne!(lit.var(), rep.var());
        outcome.subst[lit.index()] = Some(rep ^ lit.is_negative());
        outcome.merged += 1;
    }
}

/// Rewrite every clause containing a substituted literal.
fn apply_substitution<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
    ),
    subst: &[Option<Lit>],
) {
    // Collect affected short clauses in canonical form.
    let mut touched_short = vec![];
    {
        let watchlists = ctx.part(WatchlistsP);

        for code in 0..watchlists.len() {
            let watching = Lit::from_code(code);
            let first = !watching;
            for watch in watchlists.watched_by(watching) {
                match *watch {
                    Watch::Binary { implied, redundant } => {
                        if first < implied
                            && (subst[first.index()].is_some() || subst[implied.index()].is_some())
                        {
                            touched_short.push(OccClause::Binary([first, implied], redundant));
                        }
                    }
                    Watch::Ternary { implied, redundant } => {
                        if first < implied[0]
                            && first < implied[1]
                            && (subst[first.index()].is_some()
                                || subst[implied[0].index()].is_some()
                                || subst[implied[1].index()].is_some())
                        {
                            touched_short.push(OccClause::Ternary(
                                [first, implied[0], implied[1]],
                                redundant,
                            ));
                        }
                    }
                    Watch::Long { .. } => (),
                }
            }
        }
    }

    for clause in touched_short {
        match clause {
            OccClause::Binary(lits, redundant) => {
                ctx.part_mut(WatchlistsP).remove_binary(lits, redundant);
                add_rewritten_clause(ctx.borrow(), subst, &lits, redundant);
            }
            OccClause::Ternary(lits, redundant) => {
                ctx.part_mut(WatchlistsP).remove_ternary(lits, redundant);
                add_rewritten_clause(ctx.borrow(), subst, &lits, redundant);
            }
            OccClause::Long(_) => unreachable!(),
        }
    }

    for cref in db::collect_clauses(ctx.borrow()) {
        let old_lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        if old_lits.iter().all(|&lit| subst[lit.index()].is_none()) {
            continue;
        }
        let redundant = ctx.part(ClauseAllocP).header(cref).redundant();

        db::delete_clause(ctx.borrow(), cref);

        add_rewritten_clause(ctx.borrow(), subst, &old_lits, redundant);
    }
}

/// Add the rewritten form of a clause and delete the original from the proof.
fn add_rewritten_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
    ),
    subst: &[Option<Lit>],
    old_lits: &[Lit],
    redundant: bool,
) {
    let mut new_lits: Vec<Lit> = old_lits
        .iter()
        .map(|&lit| match subst[lit.index()] {
            Some(replacement) => replacement ^ lit.is_negative(),
            None => lit,
        })
        .collect();
    new_lits.sort_unstable();
    new_lits.dedup();

    let tautology = new_lits.windows(2).any(|pair| pair[0] == !pair[1]);

    if !tautology {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant,
                clause: &new_lits,
            },
        );

        match new_lits[..] {
            [] => unreachable!("substitution cannot produce an empty clause"),
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
            _ => {
                let mut header = ClauseHeader::new();
                header.set_redundant(redundant);
                db::add_clause(ctx.borrow(), header, &new_lits);
            }
        }
    }

    proof::add_step(
        ctx.borrow(),
        &ProofStep::DeleteClause {
            clause: old_lits,
            proof: if tautology {
                DeleteClauseProof::Satisfied
            } else if redundant {
                DeleteClauseProof::Redundant
            } else {
                DeleteClauseProof::Simplified
            },
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::{cnf, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn equivalence_cycle_is_merged() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // 1 -> 2 -> 3 -> 1 plus a clause mentioning all three
        for &clause in cnf![
            -1, 2;
            -2, 3;
            -3, 1;
            1, 2, 3, 4;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        equiv_replace(ctx.borrow());

        // Variables 2 and 3 are merged into variable 1.
        assert_eq!(
            ctx.part(VariablesP).removed(lits![2][0].var()),
            Removed::Substituted
        );
        assert_eq!(
            ctx.part(VariablesP).removed(lits![3][0].var()),
            Removed::Substituted
        );
        assert!(ctx.part(VariablesP).is_active(lits![1][0].var()));

        // The long clause collapses to the binary (1 v 4).
        assert!(ctx.part(WatchlistsP).has_binary(lits![1, 4]));
    }

    #[test]
    fn contradictory_cycle_becomes_unsat() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        // 1 -> 2, 2 -> -1, -1 -> -2, -2 -> 1: both polarities of 1 are equivalent.
        for &clause in cnf![
            -1, 2;
            -2, -1;
            1, -2;
            2, 1;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        equiv_replace(ctx.borrow());

        // The contradiction surfaces once the enqueued unit is propagated.
        let result = crate::simplify::propagate_at_level_0(ctx.borrow());
        assert!(result.is_err());
        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }
}
