//! Failed literal probing.
//!
//! Probing tentatively assigns each polarity of a free variable at a throwaway decision level and
//! propagates. A conflict makes the opposite literal a *failed literal*, which is enqueued as a
//! unit at level 0. Variables forced to the same value by both polarities are enqueued as well
//! (*bothprop*). While a tentative propagation runs, every literal forced through a non-binary
//! clause yields an on-the-fly *hyper-binary* resolvent connecting it directly to the probe
//! literal.
//!
//! Each implied literal set is also merged into the implication cache, which conflict analysis
//! uses for clause minimization.
use log::debug;

use partial_ref::{partial, PartialRef};

use rand::seq::SliceRandom;

use ferrosat_formula::{Lit, Var};
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::budget::Budget;
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{backtrack, enqueue_assignment, propagate, Reason, Watch};
use crate::state::SatState;

/// What a single tentative assignment produced.
enum ProbeOutcome {
    /// Propagation succeeded; the literals forced by the probe, in propagation order.
    Implied(Vec<Lit>),
    /// Propagation conflicted; the negated probe literal was enqueued at level 0.
    Failed,
}

/// Probe free variables at level 0.
pub fn probe<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut CacheP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut RngP,
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
    if !ctx.part(ConfigP).do_probe {
        return;
    }

    let mut budget = Budget::new(
        ctx.part(ConfigP).probe_budget,
        ctx.part(ConfigP).global_timeout_multiplier,
    );
    let mut hyperbin_work: u64 = 0;

    let mut candidates: Vec<Var> = ctx
        .part(VariablesP)
        .active_vars()
        .filter(|&var| ctx.part(AssignmentP).var_value(var).is_none())
        .collect();

    candidates.shuffle(&mut ctx.part_mut(RngP).rng);

    if ctx.part(ConfigP).do_intree_probe {
        // Roots of the binary implication forest first: probing a root visits its whole subtree,
        // which makes the remaining probes cheaper.
        let watchlists = ctx.part(WatchlistsP);
        // Binary clauses containing `lit` sit in the watchlists of its negation.
        let occurs_in_binary = |lit: Lit| {
            watchlists.watched_by(!lit).iter().any(|watch| match watch {
                Watch::Binary { .. } => true,
                _ => false,
            })
        };
        let is_root = |var: Var| {
            let pos = var.positive();
            let neg = var.negative();
            // A polarity with outgoing implications (clauses containing its negation) but no
            // incoming ones (no clauses containing itself).
            (occurs_in_binary(neg) && !occurs_in_binary(pos))
                || (occurs_in_binary(pos) && !occurs_in_binary(neg))
        };
        candidates.sort_by_key(|&var| !is_root(var));
    }

    let mut probes = 0u64;
    let mut failed = 0u64;
    let mut bothprop = 0u64;
    let mut hyper = 0u64;

    for var in candidates {
        if budget.exhausted() || ctx.part(SolverStateP).interrupted() {
            break;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return;
        }
        if ctx.part(AssignmentP).var_value(var).is_some() {
            continue;
        }

        let lit = var.positive();
        probes += 2;

        let pos = match try_probe(
            ctx.borrow(),
            lit,
            &mut budget,
            &mut hyperbin_work,
            &mut hyper,
        ) {
            Err(()) => return,
            Ok(ProbeOutcome::Failed) => {
                failed += 1;
                continue;
            }
            Ok(ProbeOutcome::Implied(implied)) => implied,
        };

        let neg = match try_probe(
            ctx.borrow(),
            !lit,
            &mut budget,
            &mut hyperbin_work,
            &mut hyper,
        ) {
            Err(()) => return,
            Ok(ProbeOutcome::Failed) => {
                failed += 1;
                continue;
            }
            Ok(ProbeOutcome::Implied(implied)) => implied,
        };

        bothprop += apply_bothprop(ctx.borrow(), lit, &pos, &neg);
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return;
        }

        let cutoff = ctx.part(ConfigP).cache_update_cutoff;
        if ctx.part(ConfigP).do_cache {
            if pos.len() <= cutoff {
                ctx.part_mut(CacheP).add_implications(lit, &pos);
            }
            if neg.len() <= cutoff {
                ctx.part_mut(CacheP).add_implications(!lit, &neg);
            }
        }
    }

    // When hyper-binary resolution ate most of the budget, turn it off for all later calls.
    if budget.exhausted()
        && !ctx.part(SimplifyP).otf_hyperbin_disabled
        && (hyperbin_work as f64)
            > ctx.part(ConfigP).probe_budget as f64 * ctx.part(ConfigP).otf_hyper_ratio_limit
    {
        ctx.part_mut(SimplifyP).otf_hyperbin_disabled = true;
        debug!("probe: disabling on-the-fly hyper-binary resolution");
    }

    let stats = &mut ctx.part_mut(SimplifyP).stats;
    stats.probed_lits += probes;
    stats.failed_lits += failed;
    stats.bothprop_lits += bothprop;
    stats.hyper_binaries += hyper;

    debug!(
        "probe: {} probes, {} failed, {} bothprop, {} hyper-binary",
        probes, failed, bothprop, hyper
    );
}

/// Tentatively assign a literal and propagate.
///
/// Returns `Err` when a failed literal turned out to make the formula unsatisfiable.
fn try_probe<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
    lit: Lit,
    budget: &mut Budget,
    hyperbin_work: &mut u64,
    hyper_count: &mut u64,
) -> Result<ProbeOutcome, ()> {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let trail_start = ctx.part(TrailP).trail().len();

    ctx.part_mut(TrailP).new_decision_level();
    enqueue_assignment(ctx.borrow(), lit, Reason::Decision);

    let conflict = propagate(ctx.borrow()).is_err();

    let trail_end = ctx.part(TrailP).trail().len();
    budget.charge((trail_end - trail_start) as u64 + 10);

    if conflict {
        backtrack(ctx.borrow(), 0);

        // Assuming `lit` propagates into a conflict, so its negation is implied.
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &[!lit],
            },
        );
        enqueue_assignment(ctx.borrow(), !lit, Reason::Unit);

        return match super::propagate_at_level_0(ctx.borrow()) {
            Ok(()) => Ok(ProbeOutcome::Failed),
            Err(()) => Err(()),
        };
    }

    let implied: Vec<Lit> = ctx.part(TrailP).trail()[trail_start + 1..].to_vec();

    // Lazy hyper-binary resolution: inside a probe level every propagation descends from the
    // probe literal, so a literal forced through a ternary or long clause also follows from the
    // probe literal alone.
    let mut hyper_binaries = vec![];
    if ctx.part(ConfigP).otf_hyperbin && !ctx.part(SimplifyP).otf_hyperbin_disabled {
        *hyperbin_work += implied.len() as u64;
        budget.charge(implied.len() as u64);
        for &implied_lit in &implied {
            match ctx.part(ImplGraphP).reason(implied_lit.var()) {
                Reason::Ternary(..) | Reason::Long(..) => {
                    if !ctx
                        .part(WatchlistsP)
                        .has_binary([!lit, implied_lit])
                    {
                        hyper_binaries.push(implied_lit);
                    }
                }
                _ => (),
            }
        }
    }

    backtrack(ctx.borrow(), 0);

    for implied_lit in hyper_binaries {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: true,
                clause: &[!lit, implied_lit],
            },
        );
        ctx.part_mut(WatchlistsP)
            .add_binary([!lit, implied_lit], true);
        *hyper_count += 1;
    }

    Ok(ProbeOutcome::Implied(implied))
}

/// Enqueue literals implied by both polarities of the probe variable.
///
/// Returns the number of enqueued literals.
fn apply_bothprop<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut WatchlistsP,
    ),
    probe_lit: Lit,
    pos_implied: &[Lit],
    neg_implied: &[Lit],
) -> u64 {
    let mut found = vec![];
    {
        let tmp = ctx.part_mut(TmpDataP);
        for &lit in pos_implied {
            tmp.seen[lit.code()] = true;
        }
        for &lit in neg_implied {
            if tmp.seen[lit.code()] {
                found.push(lit);
            }
        }
        for &lit in pos_implied {
            tmp.seen[lit.code()] = false;
        }
    }

    let mut enqueued = 0;
    for lit in found {
        if !ctx.part(AssignmentP).lit_is_unk(lit) {
            continue;
        }

        // The unit is justified by the two hyper-binary clauses connecting it to both polarities
        // of the probe literal; adding those first keeps every step a unit propagation
        // consequence.
        let from_pos = [!probe_lit, lit];
        let from_neg = [probe_lit, lit];
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: true,
                clause: &from_pos,
            },
        );
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: true,
                clause: &from_neg,
            },
        );
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &[lit],
            },
        );
        proof::add_step(
            ctx.borrow(),
            &ProofStep::DeleteClause {
                clause: &from_pos,
                proof: DeleteClauseProof::Redundant,
            },
        );
        proof::add_step(
            ctx.borrow(),
            &ProofStep::DeleteClause {
                clause: &from_neg,
                proof: DeleteClauseProof::Redundant,
            },
        );

        enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
        enqueued += 1;
    }

    if enqueued > 0 {
        let _ = super::propagate_at_level_0(ctx.borrow());
    }

    enqueued
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::{cnf, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn failed_literal_is_forced() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // Assuming 1 propagates both 2 and -2.
        for &clause in cnf![
            -1, 2;
            -1, 3;
            -3, -2;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        probe(ctx.borrow());

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
        assert!(ctx.part(AssignmentP).lit_is_true(lits![-1][0]));
    }

    #[test]
    fn bothprop_is_forced() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // Both polarities of 1 force 3: 1 -> 3 directly, -1 -> 2 -> 3.
        for &clause in cnf![
            -1, 3;
            1, 2;
            -2, 3;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        probe(ctx.borrow());

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
        assert!(ctx.part(AssignmentP).lit_is_true(lits![3][0]));
    }
}
