//! Database for long clauses.
use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;

use crate::context::{parts::*, Context};

use super::{header::HEADER_LEN, ClauseHeader, ClauseRef};

/// Database for long clauses.
///
/// Removal of entries from the `clauses` field can be delayed, so the deleted flag of the header
/// needs to be checked when iterating. The counts are always up to date.
#[derive(Default)]
pub struct ClauseDb {
    /// All long clauses; may contain entries whose header is marked deleted.
    pub(crate) clauses: Vec<ClauseRef>,
    /// Number of live irredundant long clauses.
    pub(crate) irredundant_count: usize,
    /// Number of live redundant long clauses.
    pub(crate) redundant_count: usize,
    /// Size of deleted but not collected clauses in buffer cells.
    pub(crate) garbage_size: usize,
}

impl ClauseDb {
    /// The number of live irredundant long clauses.
    pub fn irredundant_count(&self) -> usize {
        self.irredundant_count
    }

    /// The number of live redundant long clauses.
    pub fn redundant_count(&self) -> usize {
        self.redundant_count
    }
}

/// Add a long clause to the database and watch it.
///
/// The first two literals of the clause become the watched literals.
pub fn add_clause<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseAllocP, mut ClauseDbP, mut WatchlistsP),
    header: ClauseHeader,
    lits: &[Lit],
) -> ClauseRef {
    let redundant = header.redundant();

    let cref = ctx.part_mut(ClauseAllocP).add_clause(header, lits);

    ctx.part_mut(WatchlistsP)
        .watch_clause(cref, [lits[0], lits[1]]);

    let db = ctx.part_mut(ClauseDbP);
    db.clauses.push(cref);
    if redundant {
        db.redundant_count += 1;
    } else {
        db.irredundant_count += 1;
    }

    cref
}

/// Delete a long clause, removing its watches.
pub fn delete_clause<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseAllocP, mut ClauseDbP, mut WatchlistsP),
    cref: ClauseRef,
) {
    let (lit_0, lit_1) = {
        let lits = ctx.part(ClauseAllocP).clause(cref).lits();
        (lits[0], lits[1])
    };
    ctx.part_mut(WatchlistsP)
        .unwatch_clause(cref, [lit_0, lit_1]);

    delete_clause_detached(ctx.borrow(), cref);
}

/// Delete a long clause whose watches were already removed or rewritten.
pub fn delete_clause_detached<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseAllocP, mut ClauseDbP),
    cref: ClauseRef,
) {
    let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);
    let db = ctx.part_mut(ClauseDbP);

    let header = alloc.header_mut(cref);

    debug_assert!(!header.deleted(), "delete of an already deleted clause");

    header.set_deleted(true);

    if header.redundant() {
        db.redundant_count -= 1;
    } else {
        db.irredundant_count -= 1;
    }

    db.garbage_size += header.len() + HEADER_LEN;
}

/// Account for the cells freed by shrinking a clause in place.
pub fn add_garbage<'a>(mut ctx: partial!(Context<'a>, mut ClauseDbP), cells: usize) {
    ctx.part_mut(ClauseDbP).garbage_size += cells;
}

/// Collect all live long clauses into a vector.
pub fn collect_clauses<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, ClauseDbP),
) -> Vec<ClauseRef> {
    let (alloc, ctx) = ctx.split_part(ClauseAllocP);
    ctx.part(ClauseDbP)
        .clauses
        .iter()
        .cloned()
        .filter(|&cref| !alloc.header(cref).deleted())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::cnf_formula;

    use crate::context::set_var_count;

    #[test]
    fn add_and_delete() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        let clauses = cnf_formula![
            1, 2, 3, 4;
            4, -5, 6, 2;
            -2, 3, -4, 5;
        ];

        set_var_count(ctx.borrow(), clauses.var_count());

        let mut crefs = vec![];
        for lits in clauses.iter() {
            let mut header = ClauseHeader::new();
            header.set_redundant(crefs.len() == 1);
            crefs.push(add_clause(ctx.borrow(), header, lits));
        }

        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 2);
        assert_eq!(ctx.part(ClauseDbP).redundant_count(), 1);

        delete_clause(ctx.borrow(), crefs[1]);
        assert_eq!(ctx.part(ClauseDbP).redundant_count(), 0);
        assert!(ctx.part(ClauseDbP).garbage_size > 0);

        delete_clause(ctx.borrow(), crefs[0]);
        assert_eq!(ctx.part(ClauseDbP).irredundant_count(), 1);

        let live: Vec<_> = collect_clauses(ctx.borrow());
        assert_eq!(live, vec![crefs[2]]);
    }
}
