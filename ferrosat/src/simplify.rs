//! Inprocessing passes and their scheduling.
//!
//! Simplification runs at decision level 0, between search windows. A schedule is an ordered list
//! of step tokens from the configuration; each step runs under its own work budget and leaves the
//! solver with intact watch and occurrence invariants before handing back control.
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::clause::{db, gc};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{propagate, Watch};
use crate::state::SatState;

pub mod bva;
pub mod bve;
pub mod comp;
pub mod distill;
pub mod occur;
pub mod probe;
pub mod scc;
pub mod subsume;

pub use occur::OccLists;

/// One step of a simplification schedule.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SimplifyStep {
    /// Equivalent literal substitution via binary implication SCCs.
    SccVrepl,
    /// Failed literal probing with bothprop and hyper-binary resolution.
    Probe,
    /// Backward subsumption and self-subsuming resolution.
    BackwSubsume,
    /// Bounded variable elimination.
    Bve,
    /// Bounded variable addition.
    Bva,
    /// Clause distillation.
    DistillCls,
    /// Clause arena compaction.
    Renumber,
}

impl SimplifyStep {
    /// Parse a schedule token.
    pub fn from_token(token: &str) -> Option<SimplifyStep> {
        match token {
            "scc-vrepl" => Some(SimplifyStep::SccVrepl),
            "probe" => Some(SimplifyStep::Probe),
            "backw-subsume" => Some(SimplifyStep::BackwSubsume),
            "bve" => Some(SimplifyStep::Bve),
            "bva" => Some(SimplifyStep::Bva),
            "distill-cls" => Some(SimplifyStep::DistillCls),
            "renumber" => Some(SimplifyStep::Renumber),
            _ => None,
        }
    }
}

/// Parse a comma separated schedule string.
///
/// Returns the unknown token on failure.
pub fn parse_schedule(tokens: &str) -> Result<Vec<SimplifyStep>, String> {
    tokens
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| SimplifyStep::from_token(token).ok_or_else(|| token.to_string()))
        .collect()
}

/// Counters of the simplification passes.
#[derive(Default)]
pub struct SimpStats {
    pub subsumed: u64,
    pub strengthened: u64,
    pub eliminated_vars: u64,
    pub probed_lits: u64,
    pub failed_lits: u64,
    pub bothprop_lits: u64,
    pub hyper_binaries: u64,
    pub bva_vars: u64,
    pub distilled_lits: u64,
    pub equiv_lits: u64,
    pub components_solved: u64,
}

/// State shared by the simplification passes.
#[derive(Default)]
pub struct Simplify {
    /// Trail length up to which level 0 assignments are applied to the clause database.
    pub cleaned_trail_len: usize,
    /// Set when hyper-binary resolution blew its time budget; disables it for good.
    pub otf_hyperbin_disabled: bool,
    /// Clauses of components handed to sub solvers, kept for reactivation when new input
    /// clauses connect to such a component.
    pub saved_components: Vec<comp::SavedComponent>,
    pub stats: SimpStats,
}

/// Run a parsed simplification schedule.
///
/// Steps that discover unsatisfiability abort the schedule. Budget exhaustion inside a step only
/// ends that step.
pub fn run_schedule<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut ReconstructP,
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
    tokens: &str,
) {
    let steps = match parse_schedule(tokens) {
        Ok(steps) => steps,
        Err(unknown) => {
            // Schedules are validated when the configuration is set; getting here is a bug.
            panic!("unknown simplification step: {:?}", unknown);
        }
    };

    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    for step in steps {
        if ctx.part(SolverStateP).sat_state != SatState::Unknown
            || ctx.part(SolverStateP).interrupted()
        {
            return;
        }

        if prepare_for_step(ctx.borrow()).is_err() {
            return;
        }

        debug!("simplify: running {:?}", step);

        match step {
            SimplifyStep::SccVrepl => scc::equiv_replace(ctx.borrow()),
            SimplifyStep::Probe => probe::probe(ctx.borrow()),
            SimplifyStep::BackwSubsume => subsume::backward_subsume(ctx.borrow()),
            SimplifyStep::Bve => bve::eliminate_vars(ctx.borrow()),
            SimplifyStep::Bva => bva::add_vars(ctx.borrow()),
            SimplifyStep::DistillCls => distill::distill(ctx.borrow()),
            SimplifyStep::Renumber => renumber(ctx.borrow()),
        }
    }

    if ctx.part(SolverStateP).sat_state == SatState::Unknown {
        let _ = prepare_for_step(ctx.borrow());
    }
}

/// Propagate pending units and apply new level 0 assignments to the clause database.
fn prepare_for_step<'a>(
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
        mut WatchlistsP,
    ),
) -> Result<(), ()> {
    propagate_at_level_0(ctx.borrow())?;

    if ctx.part(SimplifyP).cleaned_trail_len < ctx.part(TrailP).trail().len() {
        clean_clauses(ctx.borrow());
    }

    Ok(())
}

/// Propagate at level 0, turning a conflict into the unsat state.
pub fn propagate_at_level_0<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
    ),
) -> Result<(), ()> {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    if propagate(ctx.borrow()).is_err() {
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &[],
            },
        );
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return Err(());
    }
    Ok(())
}

/// Remove satisfied clauses and false literals from the clause database.
///
/// Assumes a full level 0 propagation fixpoint, so any clause with a false literal and no true
/// literal still has at least two unassigned literals.
fn clean_clauses<'a>(
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
        mut WatchlistsP,
    ),
) {
    // Short clauses with an assigned literal, in canonical form.
    let mut touched_short = vec![];
    {
        let watchlists = ctx.part(WatchlistsP);
        let assignment = ctx.part(AssignmentP);

        for code in 0..watchlists.len() {
            let watching = ferrosat_formula::Lit::from_code(code);
            let first = !watching;
            for watch in watchlists.watched_by(watching) {
                match *watch {
                    Watch::Binary { implied, redundant } => {
                        if first < implied
                            && !(assignment.lit_is_unk(first) && assignment.lit_is_unk(implied))
                        {
                            touched_short.push(occur::OccClause::Binary([first, implied], redundant));
                        }
                    }
                    Watch::Ternary { implied, redundant } => {
                        if first < implied[0]
                            && first < implied[1]
                            && !(assignment.lit_is_unk(first)
                                && assignment.lit_is_unk(implied[0])
                                && assignment.lit_is_unk(implied[1]))
                        {
                            touched_short.push(occur::OccClause::Ternary(
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
        let lits = match clause {
            occur::OccClause::Binary(lits, _) => lits.to_vec(),
            occur::OccClause::Ternary(lits, _) => lits.to_vec(),
            occur::OccClause::Long(_) => unreachable!(),
        };

        if lits
            .iter()
            .any(|&lit| ctx.part(AssignmentP).lit_is_true(lit))
        {
            delete_short_clause(ctx.borrow(), &clause, DeleteClauseProof::Satisfied);
            continue;
        }

        let remaining: Vec<_> = lits
            .iter()
            .cloned()
            .filter(|&lit| ctx.part(AssignmentP).lit_is_unk(lit))
            .collect();

        // A binary with a false literal propagates the other one, so only ternary clauses can
        // shrink here.
        debug_assert!(remaining.len() == 2 && lits.len() == 3);

        let redundant = match clause {
            occur::OccClause::Binary(_, redundant) => redundant,
            occur::OccClause::Ternary(_, redundant) => redundant,
            occur::OccClause::Long(_) => unreachable!(),
        };

        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant,
                clause: &remaining,
            },
        );
        ctx.part_mut(WatchlistsP)
            .add_binary([remaining[0], remaining[1]], redundant);
        delete_short_clause(ctx.borrow(), &clause, DeleteClauseProof::Simplified);
    }

    // Long clauses.
    for cref in db::collect_clauses(ctx.borrow()) {
        let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();

        let mut satisfied = false;
        let mut remaining = Vec::with_capacity(lits.len());
        for &lit in &lits {
            match ctx.part(AssignmentP).lit_value(lit) {
                Some(true) => {
                    satisfied = true;
                    break;
                }
                Some(false) => (),
                None => remaining.push(lit),
            }
        }

        let redundant = ctx.part(ClauseAllocP).header(cref).redundant();

        if satisfied {
            if ctx.part(OccurP).is_linked() {
                ctx.part_mut(OccurP).remove_clause(cref, &lits);
            }
            db::delete_clause(ctx.borrow(), cref);
            proof::add_step(
                ctx.borrow(),
                &ProofStep::DeleteClause {
                    clause: &lits,
                    proof: if redundant {
                        DeleteClauseProof::Redundant
                    } else {
                        DeleteClauseProof::Satisfied
                    },
                },
            );
            continue;
        }

        if remaining.len() == lits.len() {
            continue;
        }

        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant,
                clause: &remaining,
            },
        );

        if remaining.len() >= 4 {
            // Watched literals are unassigned, so they stay in position 0 and 1.
            let freed = lits.len() - remaining.len();
            {
                let clause = ctx.part_mut(ClauseAllocP).clause_mut(cref);
                clause.lits_mut()[..remaining.len()].copy_from_slice(&remaining);
            }
            ctx.part_mut(ClauseAllocP)
                .shrink_clause(cref, remaining.len());
            db::add_garbage(ctx.borrow(), freed);
            if ctx.part(OccurP).is_linked() {
                for &lit in lits.iter() {
                    if !remaining.contains(&lit) {
                        ctx.part_mut(OccurP).remove_clause_lit(cref, lit);
                    }
                }
            }
        } else {
            let watched = [lits[0], lits[1]];
            ctx.part_mut(WatchlistsP).unwatch_clause(cref, watched);
            if ctx.part(OccurP).is_linked() {
                ctx.part_mut(OccurP).remove_clause(cref, &lits);
            }
            db::delete_clause_detached(ctx.borrow(), cref);

            match remaining[..] {
                [lit_0, lit_1] => ctx.part_mut(WatchlistsP).add_binary([lit_0, lit_1], redundant),
                [lit_0, lit_1, lit_2] => ctx
                    .part_mut(WatchlistsP)
                    .add_ternary([lit_0, lit_1, lit_2], redundant),
                // An empty or unit remainder contradicts the propagation fixpoint.
                _ => unreachable!(),
            }
        }

        proof::add_step(
            ctx.borrow(),
            &ProofStep::DeleteClause {
                clause: &lits,
                proof: if redundant {
                    DeleteClauseProof::Redundant
                } else {
                    DeleteClauseProof::Simplified
                },
            },
        );
    }

    let trail_len = ctx.part(TrailP).trail().len();
    ctx.part_mut(SimplifyP).cleaned_trail_len = trail_len;
}

/// Remove a binary or ternary clause with its proof step.
fn delete_short_clause<'a>(
    mut ctx: partial!(Context<'a>, mut ProofP<'a>, mut SolverStateP, mut WatchlistsP),
    clause: &occur::OccClause,
    reason: DeleteClauseProof,
) {
    match clause {
        occur::OccClause::Binary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_binary(*lits, *redundant);
            proof::add_step(
                ctx.borrow(),
                &ProofStep::DeleteClause {
                    clause: lits,
                    proof: reason,
                },
            );
        }
        occur::OccClause::Ternary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_ternary(*lits, *redundant);
            proof::add_step(
                ctx.borrow(),
                &ProofStep::DeleteClause {
                    clause: lits,
                    proof: reason,
                },
            );
        }
        occur::OccClause::Long(_) => unreachable!(),
    }
}

/// The `renumber` schedule step: compact the clause arena and rewrite all references.
fn renumber<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut WatchlistsP,
        TrailP,
    ),
) {
    ctx.part_mut(OccurP).unlink();
    gc::collect_garbage_now(ctx.borrow());
}
