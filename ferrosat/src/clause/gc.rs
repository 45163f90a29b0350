//! Garbage collection of long clauses.
use log::debug;

use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::prop::{Reason, Watch};

use super::ClauseAlloc;

/// Perform a garbage collection of long clauses if necessary.
///
/// Collecting when a fixed fraction of the arena is garbage amortizes collection costs.
pub fn collect_garbage<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut WatchlistsP,
        TrailP,
    ),
) {
    let alloc = ctx.part(ClauseAllocP);
    let db = ctx.part(ClauseDbP);

    if db.garbage_size * 2 > alloc.buffer_size() {
        collect_garbage_now(ctx.borrow());
    }
}

/// Unconditionally compact the clause arena.
///
/// Every live clause is copied into a fresh arena and a forwarding offset is left in the old
/// header. All `ClauseRef` values stored in watchlists and trail reasons are rewritten to the new
/// offsets. Occurrence lists are rebuilt by their owning passes and must not be linked while this
/// runs.
pub fn collect_garbage_now<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut WatchlistsP,
        TrailP,
    ),
) {
    let (db, mut ctx_2) = ctx.split_part_mut(ClauseDbP);
    let (alloc, mut ctx_2) = ctx_2.split_part_mut(ClauseAllocP);

    assert!(
        db.garbage_size <= alloc.buffer_size(),
        "inconsistent garbage tracking in ClauseDb"
    );
    let current_size = alloc.buffer_size() - db.garbage_size;

    // Allocating exactly the live size would grow again on the next learnt clause.
    let mut new_alloc = ClauseAlloc::with_capacity(current_size * 2);

    let mut new_clauses = vec![];

    for &cref in db.clauses.iter() {
        let clause = alloc.clause(cref);
        if clause.header().deleted() {
            continue;
        }
        let header = clause.header().clone();
        let new_cref = new_alloc.add_clause(header, clause.lits());
        alloc.header_mut(cref).set_moved(new_cref);
        new_clauses.push(new_cref);
    }

    debug!(
        "gc: compacted {} -> {} cells, {} clauses",
        alloc.buffer_size(),
        new_alloc.buffer_size(),
        new_clauses.len()
    );

    // Deleted clauses were detached when they were deleted, so every long watch points at a
    // live (now moved) clause.
    ctx_2.part_mut(WatchlistsP).update_refs(|watch| {
        if let Watch::Long { cref, .. } = watch {
            *cref = alloc.header(*cref).moved_to();
        }
    });

    let (trail, mut ctx_2) = ctx_2.split_part(TrailP);
    let impl_graph = ctx_2.part_mut(ImplGraphP);

    for &lit in trail.trail() {
        if let Reason::Long(cref) = *impl_graph.reason(lit.var()) {
            let header = alloc.header(cref);
            if header.deleted() {
                // A satisfied reason clause of a level 0 assignment may have been deleted; the
                // assignment itself is permanent.
                debug_assert_eq!(impl_graph.level(lit.var()), 0);
                impl_graph.update_reason(lit.var(), Reason::Unit);
            } else {
                impl_graph.update_reason(lit.var(), Reason::Long(header.moved_to()));
            }
        }
    }

    *alloc = new_alloc;
    db.clauses = new_clauses;
    db.garbage_size = 0;
}
