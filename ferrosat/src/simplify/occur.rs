//! Occurrence lists for the simplification passes.
//!
//! Long clauses are indexed by an explicit list of clause references per literal; binary and
//! ternary clauses are already indexed by the watchlists, which watch every literal of a short
//! clause. Passes therefore enumerate the clauses containing a literal by combining both sources.
//!
//! The lists are only maintained while a simplification pass is running. Passes call
//! [`link`](crate::simplify::occur::link) on entry, keep the lists in sync with every clause they
//! add or delete, and [`unlink`](OccLists::unlink) before handing control back to search or
//! garbage collection.
use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::clause::{db, ClauseHeader, ClauseRef};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{assignment::enqueue_assignment, Reason, Watch};

/// Occurrence lists for long clauses.
#[derive(Default)]
pub struct OccLists {
    /// Clause references per literal code; may contain deleted clauses, which are filtered on
    /// access.
    occs: Vec<Vec<ClauseRef>>,
    linked: bool,
}

impl OccLists {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.occs.resize(count * 2, vec![]);
    }

    /// Whether the lists are currently maintained.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Long clauses containing the given literal.
    ///
    /// May contain clauses that were deleted since the last link.
    pub fn occs(&self, lit: Lit) -> &[ClauseRef] {
        &self.occs[lit.code()]
    }

    /// Number of occurrences of a literal in long clauses, counting stale entries.
    pub fn occ_count(&self, lit: Lit) -> usize {
        self.occs[lit.code()].len()
    }

    /// Record a new long clause.
    pub fn add_clause(&mut self, cref: ClauseRef, lits: &[Lit]) {
        debug_assert!(self.linked);
        for &lit in lits {
            self.occs[lit.code()].push(cref);
        }
    }

    /// Remove a long clause from the lists.
    pub fn remove_clause(&mut self, cref: ClauseRef, lits: &[Lit]) {
        for &lit in lits {
            self.remove_clause_lit(cref, lit);
        }
    }

    /// Remove a single literal's occurrence of a long clause.
    pub fn remove_clause_lit(&mut self, cref: ClauseRef, lit: Lit) {
        let list = &mut self.occs[lit.code()];
        if let Some(position) = list.iter().position(|&entry| entry == cref) {
            list.swap_remove(position);
        }
    }

    /// Drop all lists.
    pub fn unlink(&mut self) {
        for list in self.occs.iter_mut() {
            list.clear();
        }
        self.linked = false;
    }
}

/// Build the occurrence lists from the current clause database.
pub fn link<'a>(mut ctx: partial!(Context<'a>, mut OccurP, ClauseAllocP, ClauseDbP)) {
    let crefs = db::collect_clauses(ctx.borrow());

    let (occur, ctx) = ctx.split_part_mut(OccurP);
    let alloc = ctx.part(ClauseAllocP);

    for list in occur.occs.iter_mut() {
        list.clear();
    }
    occur.linked = true;

    for cref in crefs {
        for &lit in alloc.clause(cref).lits() {
            occur.occs[lit.code()].push(cref);
        }
    }
}

/// A clause as seen by the simplification passes, covering all three storage forms.
#[derive(Clone, Debug)]
pub enum OccClause {
    Binary([Lit; 2], bool),
    Ternary([Lit; 3], bool),
    Long(ClauseRef),
}

impl OccClause {
    /// Whether the clause is redundant.
    pub fn redundant<'a, 'b>(&self, ctx: partial!('b Context<'a>, ClauseAllocP)) -> bool {
        match self {
            OccClause::Binary(_, redundant) => *redundant,
            OccClause::Ternary(_, redundant) => *redundant,
            OccClause::Long(cref) => ctx.part(ClauseAllocP).header(*cref).redundant(),
        }
    }

    /// The clause's literals as an owned vector.
    pub fn owned_lits<'a, 'b>(&self, ctx: partial!('b Context<'a>, ClauseAllocP)) -> Vec<Lit> {
        match self {
            OccClause::Binary(lits, _) => lits.to_vec(),
            OccClause::Ternary(lits, _) => lits.to_vec(),
            OccClause::Long(cref) => ctx.part(ClauseAllocP).clause(*cref).lits().to_vec(),
        }
    }
}

/// Collect all live clauses containing the given literal.
pub fn clauses_with_lit<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, OccurP, WatchlistsP),
    lit: Lit,
) -> Vec<OccClause> {
    let mut result = vec![];

    for watch in ctx.part(WatchlistsP).watched_by(!lit) {
        match *watch {
            Watch::Binary { implied, redundant } => {
                result.push(OccClause::Binary([lit, implied], redundant));
            }
            Watch::Ternary { implied, redundant } => {
                result.push(OccClause::Ternary([lit, implied[0], implied[1]], redundant));
            }
            Watch::Long { .. } => (),
        }
    }

    let (alloc, mut ctx) = ctx.split_part(ClauseAllocP);
    for &cref in ctx.part(OccurP).occs(lit) {
        if !alloc.header(cref).deleted() {
            result.push(OccClause::Long(cref));
        }
    }

    result
}

/// Number of irredundant clauses containing the given literal.
///
/// Used as the elimination and addition cost estimate; stale occurrence entries are filtered.
pub fn occurrence_count<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, OccurP, WatchlistsP),
    lit: Lit,
) -> usize {
    let mut count = 0;
    for watch in ctx.part(WatchlistsP).watched_by(!lit) {
        match watch {
            Watch::Binary { redundant, .. } | Watch::Ternary { redundant, .. } => {
                if !redundant {
                    count += 1;
                }
            }
            Watch::Long { .. } => (),
        }
    }
    let (alloc, ctx) = ctx.split_part(ClauseAllocP);
    for &cref in ctx.part(OccurP).occs(lit) {
        let header = alloc.header(cref);
        if !header.deleted() && !header.redundant() {
            count += 1;
        }
    }
    count
}

/// Delete a clause in any storage form, emitting the proof step.
pub fn delete_occ_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut OccurP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut WatchlistsP,
    ),
    clause: &OccClause,
    reason: DeleteClauseProof,
) {
    match clause {
        OccClause::Binary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_binary(*lits, *redundant);
            proof::add_step(
                ctx.borrow(),
                &ProofStep::DeleteClause {
                    clause: lits,
                    proof: reason,
                },
            );
        }
        OccClause::Ternary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_ternary(*lits, *redundant);
            proof::add_step(
                ctx.borrow(),
                &ProofStep::DeleteClause {
                    clause: lits,
                    proof: reason,
                },
            );
        }
        OccClause::Long(cref) => {
            let lits = ctx.part(ClauseAllocP).clause(*cref).lits().to_vec();
            ctx.part_mut(OccurP).remove_clause(*cref, &lits);
            db::delete_clause(ctx.borrow(), *cref);
            proof::add_step(
                ctx.borrow(),
                &ProofStep::DeleteClause {
                    clause: &lits,
                    proof: reason,
                },
            );
        }
    }
}

/// Add an irredundant clause in the storage form fitting its length.
///
/// The clause must not be trivially satisfied or contain assigned literals; units are enqueued at
/// level 0. The proof step for the addition is the caller's responsibility.
pub fn add_irred_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
    ),
    lits: &[Lit],
) {
    match *lits {
        [] => ctx.part_mut(SolverStateP).sat_state = crate::state::SatState::Unsat,
        [lit] => match ctx.part(AssignmentP).lit_value(lit) {
            None => enqueue_assignment(ctx.borrow(), lit, Reason::Unit),
            Some(true) => (),
            Some(false) => ctx.part_mut(SolverStateP).sat_state = crate::state::SatState::Unsat,
        },
        [lit_0, lit_1] => ctx.part_mut(WatchlistsP).add_binary([lit_0, lit_1], false),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(WatchlistsP)
            .add_ternary([lit_0, lit_1, lit_2], false),
        _ => {
            let cref = db::add_clause(ctx.borrow(), ClauseHeader::new(), lits);
            if ctx.part(OccurP).is_linked() {
                ctx.part_mut(OccurP).add_clause(cref, lits);
            }
        }
    }
}
