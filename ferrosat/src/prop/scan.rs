//! Watchlist scan of a single assignment.
use std::mem::replace;

use partial_ref::{partial, PartialRef};

use vec_mut_scan::VecMutScan;

use ferrosat_formula::Lit;

use crate::context::{parts::*, Context};

use super::assignment::enqueue_assignment;
use super::{Conflict, Reason, Watch};

/// Propagate all clauses watched by a literal that just became true.
///
/// On conflict returns the clause that would propagate the opposite value of an already assigned
/// literal.
///
/// See [`prop::watch`](crate::prop::watch) for the invariants this has to uphold.
#[inline(never)]
pub fn propagate_literal<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    // Temporarily move the list out of the watchlists struct, so watches can be added to other
    // lists while scanning. The scanned literal's own list is never a target: any literal gaining
    // a watch is non-false, while `!lit` is false.
    let mut watches = replace(ctx.part_mut(WatchlistsP).watched_by_mut(lit), vec![]);

    let mut scan = VecMutScan::new(&mut watches);

    let mut result = Ok(());

    'watches: while let Some(watch) = scan.next() {
        match *watch {
            Watch::Binary { implied, .. } => {
                let assignment = ctx.part(AssignmentP);
                if assignment.lit_is_false(implied) {
                    result = Err(Conflict::Binary([implied, !lit]));
                    break;
                } else if !assignment.lit_is_true(implied) {
                    enqueue_assignment(ctx.borrow(), implied, Reason::Binary([!lit]));
                }
            }
            Watch::Ternary { implied, .. } => {
                let [lit_2, lit_3] = implied;
                let assignment = ctx.part(AssignmentP);
                if assignment.lit_is_true(lit_2) || assignment.lit_is_true(lit_3) {
                    continue;
                }
                match (assignment.lit_value(lit_2), assignment.lit_value(lit_3)) {
                    (Some(false), Some(false)) => {
                        result = Err(Conflict::Ternary([lit_2, lit_3, !lit]));
                        break;
                    }
                    (Some(false), None) => {
                        enqueue_assignment(ctx.borrow(), lit_3, Reason::Ternary([!lit, lit_2]));
                    }
                    (None, Some(false)) => {
                        enqueue_assignment(ctx.borrow(), lit_2, Reason::Ternary([!lit, lit_3]));
                    }
                    (None, None) => (),
                    _ => unreachable!("true literals are handled above"),
                }
            }
            Watch::Long { cref, blocking } => {
                // If the blocking literal (part of the clause) is true, the clause is satisfied
                // without touching the clause data.
                if ctx.part(AssignmentP).lit_is_true(blocking) {
                    continue;
                }

                let (alloc, mut sub_ctx) = ctx.split_part_mut(ClauseAllocP);
                let clause = alloc.clause_mut(cref);
                let lits = clause.lits_mut();

                // Ensure the falsified watched literal is in position 1. This readies the literal
                // order for further propagation, as a propagating clause keeps its propagated
                // literal in position 0.
                let mut first = lits[0];
                if first == !lit {
                    lits.swap(0, 1);
                    first = lits[0];
                }

                // The replacement watch uses the other watched literal as blocking literal. It
                // either replaces the current watch or moves to another literal's list.
                let new_watch = Watch::Long {
                    cref,
                    blocking: first,
                };

                // Check whether the other watched literal satisfies the clause, unless we already
                // know it is not the true blocking literal checked above.
                if first != blocking && sub_ctx.part(AssignmentP).lit_is_true(first) {
                    watch.replace(new_watch);
                    continue;
                }

                // Search an unwatched non-false literal to take over the watch.
                let (initial, rest) = lits.split_at_mut(2);

                for rest_lit_ref in rest.iter_mut() {
                    let rest_lit = *rest_lit_ref;
                    if !sub_ctx.part(AssignmentP).lit_is_false(rest_lit) {
                        initial[1] = rest_lit;
                        *rest_lit_ref = !lit;
                        sub_ctx.part_mut(WatchlistsP).add_watch(!rest_lit, new_watch);
                        watch.remove();
                        continue 'watches;
                    }
                }

                // All unwatched literals are false, so the clause propagates or conflicts.
                watch.replace(new_watch);

                if sub_ctx.part(AssignmentP).lit_is_false(first) {
                    result = Err(Conflict::Long(cref));
                    break;
                }

                enqueue_assignment(sub_ctx.borrow(), first, Reason::Long(cref));
            }
        }
    }

    // Keeps all unprocessed watches in the list.
    drop(scan);

    *ctx.part_mut(WatchlistsP).watched_by_mut(lit) = watches;

    result
}
