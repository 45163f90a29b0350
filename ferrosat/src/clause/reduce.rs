//! Clause database reduction.
use std::cmp::Reverse;

use log::debug;

use ordered_float::OrderedFloat;

use partial_ref::{partial, PartialRef};

use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::Reason;

use super::{db, ClauseRef};

/// Delete the less useful half of the redundant long clauses.
///
/// Clauses are ranked by glue, breaking ties by activity, then size, then age. Clauses with a
/// glue at or below the configured keep threshold and clauses currently acting as the reason of a
/// trail literal survive unconditionally.
pub fn reduce<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut WatchlistsP,
        ConfigP,
        ImplGraphP,
        TrailP,
    ),
) {
    mark_reason_clauses(ctx.borrow(), true);

    let mut candidates: Vec<ClauseRef> = vec![];
    {
        let alloc = ctx.part(ClauseAllocP);
        let db = ctx.part(ClauseDbP);
        let keep_glue = ctx.part(ConfigP).glue_must_keep_if_below_or_eq;

        for &cref in db.clauses.iter() {
            let header = alloc.header(cref);
            if header.deleted() || !header.redundant() || header.mark() {
                continue;
            }
            if header.glue() <= keep_glue {
                continue;
            }
            candidates.push(cref);
        }

        candidates.sort_unstable_by_key(|&cref| {
            let header = alloc.header(cref);
            (
                Reverse(header.glue()),
                OrderedFloat(header.activity()),
                Reverse(header.len()),
                cref,
            )
        });
    }

    let delete_count = candidates.len() / 2;

    for &cref in candidates[..delete_count].iter() {
        let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        proof::add_step(
            ctx.borrow(),
            &ProofStep::DeleteClause {
                clause: &lits,
                proof: DeleteClauseProof::Redundant,
            },
        );
        db::delete_clause(ctx.borrow(), cref);
    }

    mark_reason_clauses(ctx.borrow(), false);

    debug!(
        "reduce: deleted {} of {} candidate clauses, {} redundant left",
        delete_count,
        candidates.len(),
        ctx.part(ClauseDbP).redundant_count()
    );
}

/// Set or clear the mark bit of every long clause that is the reason of a trail literal.
fn mark_reason_clauses<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseAllocP, ImplGraphP, TrailP),
    mark: bool,
) {
    let (trail, mut ctx) = ctx.split_part(TrailP);
    let (alloc, ctx) = ctx.split_part_mut(ClauseAllocP);
    let impl_graph = ctx.part(ImplGraphP);

    for &lit in trail.trail() {
        if let Reason::Long(cref) = *impl_graph.reason(lit.var()) {
            alloc.header_mut(cref).set_mark(mark);
        }
    }
}
