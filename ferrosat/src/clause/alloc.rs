//! Clause arena allocator.
use std::mem::transmute;
use std::slice;

use ferrosat_formula::{Lit, LitIdx};

use super::{lits_abstraction, Clause, ClauseHeader, HEADER_LEN};

/// Integer type used to store offsets into [`ClauseAlloc`]'s memory.
type ClauseOffset = u32;

/// Bump allocator for long clause storage.
///
/// Clauses are allocated from a single continuous buffer of [`LitIdx`] cells. Individual clauses
/// cannot be freed; deleted clauses are marked in their header and the wasted space is reclaimed
/// by copying the surviving clauses into a fresh allocator (see
/// [`collect_garbage`](crate::clause::gc::collect_garbage)).
///
/// External references ([`ClauseRef`]) are plain offsets into the buffer. They stay valid when the
/// buffer grows and are only invalidated by garbage collection, which leaves a forwarding offset
/// in the old header.
///
/// **Safety**: the safe methods are memory safe even when clause storage invariants are violated,
/// e.g. when a `ClauseRef` of a different allocator is used. Internal unsafe methods do expect
/// such invariants and must not be reachable with violated invariants through the crate's public
/// API.
#[derive(Default)]
pub struct ClauseAlloc {
    buffer: Vec<LitIdx>,
}

impl ClauseAlloc {
    /// Create an empty clause allocator.
    pub fn new() -> ClauseAlloc {
        ClauseAlloc::default()
    }

    /// Create a clause allocator with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> ClauseAlloc {
        ClauseAlloc {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Allocate space for and add a new clause.
    ///
    /// Clauses have a minimal size of 4; unit, binary and ternary clauses are represented outside
    /// the arena. Enforcing this here safely avoids bound checks when accessing the watched
    /// literals of a stored clause.
    ///
    /// The header's length and abstraction are set from the given literals.
    pub fn add_clause(&mut self, mut header: ClauseHeader, lits: &[Lit]) -> ClauseRef {
        let offset = self.buffer.len();

        assert!(
            lits.len() >= 4,
            "only clauses of length 4 or more are arena allocated"
        );

        assert!(
            offset <= (ClauseOffset::max_value() as usize),
            "clause arena exceeded the maximal buffer size"
        );

        header.set_len(lits.len());
        header.set_abstraction(lits_abstraction(lits));

        self.buffer.extend_from_slice(&header.data);

        let lit_idx_slice = unsafe {
            // Safe as Lit is repr(transparent) over LitIdx
            slice::from_raw_parts(lits.as_ptr() as *const LitIdx, lits.len())
        };

        self.buffer.extend_from_slice(lit_idx_slice);

        ClauseRef {
            offset: offset as ClauseOffset,
        }
    }

    /// Access the header of a clause.
    pub fn header(&self, cref: ClauseRef) -> &ClauseHeader {
        let offset = cref.offset as usize;
        assert!(
            offset + HEADER_LEN <= self.buffer.len(),
            "ClauseRef out of bounds"
        );
        unsafe {
            let header_ptr = self.buffer.as_ptr().add(offset) as *const ClauseHeader;
            &*header_ptr
        }
    }

    /// Mutate the header of a clause.
    pub fn header_mut(&mut self, cref: ClauseRef) -> &mut ClauseHeader {
        let offset = cref.offset as usize;
        assert!(
            offset + HEADER_LEN <= self.buffer.len(),
            "ClauseRef out of bounds"
        );
        unsafe {
            let header_ptr = self.buffer.as_mut_ptr().add(offset) as *mut ClauseHeader;
            &mut *header_ptr
        }
    }

    /// Access a clause.
    pub fn clause(&self, cref: ClauseRef) -> &Clause {
        let len = self.header(cref).len();
        let end = cref.offset as usize + HEADER_LEN + len;
        assert!(end <= self.buffer.len(), "ClauseRef out of bounds");
        unsafe {
            transmute::<&[LitIdx], &Clause>(slice::from_raw_parts(
                self.buffer.as_ptr().add(cref.offset as usize),
                len + HEADER_LEN,
            ))
        }
    }

    /// Mutate a clause.
    pub fn clause_mut(&mut self, cref: ClauseRef) -> &mut Clause {
        let len = self.header(cref).len();
        let end = cref.offset as usize + HEADER_LEN + len;
        assert!(end <= self.buffer.len(), "ClauseRef out of bounds");
        unsafe {
            transmute::<&mut [LitIdx], &mut Clause>(slice::from_raw_parts_mut(
                self.buffer.as_mut_ptr().add(cref.offset as usize),
                len + HEADER_LEN,
            ))
        }
    }

    /// Shorten a clause in place, updating length and abstraction.
    ///
    /// The new literals must be a prefix written by the caller via
    /// [`clause_mut`](ClauseAlloc::clause_mut). The freed tail is accounted as garbage by the
    /// caller.
    pub fn shrink_clause(&mut self, cref: ClauseRef, new_len: usize) {
        let old_len = self.header(cref).len();
        debug_assert!(new_len >= 4 && new_len <= old_len);
        let abstraction = {
            let clause = self.clause(cref);
            lits_abstraction(&clause.lits()[..new_len])
        };
        let header = self.header_mut(cref);
        header.set_len(new_len);
        header.set_abstraction(abstraction);
    }

    /// Current buffer size in multiples of [`LitIdx`].
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

/// Compact reference to a clause within a [`ClauseAlloc`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ClauseRef {
    offset: ClauseOffset,
}

impl ClauseRef {
    pub(super) fn to_raw(self) -> u32 {
        self.offset
    }

    pub(super) fn from_raw(offset: u32) -> ClauseRef {
        ClauseRef { offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use ferrosat_formula::{cnf::strategy::cnf_formula, CnfFormula, ExtendFormula};

    proptest! {
        #[test]
        fn roundtrip_from_cnf_formula(input in cnf_formula(4..100usize, 0..500, 4..30)) {
            let mut alloc = ClauseAlloc::new();
            let mut crefs = vec![];

            for lits in input.iter() {
                crefs.push(alloc.add_clause(ClauseHeader::new(), lits));
            }

            let mut recovered = CnfFormula::new();

            for cref in crefs {
                let clause = alloc.clause(cref);
                prop_assert_eq!(clause.header().len(), clause.lits().len());
                recovered.add_clause(clause.lits());
            }

            recovered.set_var_count(input.var_count());
            prop_assert_eq!(input, recovered);
        }

        #[test]
        fn shrink_drops_tail(input in cnf_formula(5..50usize, 1..100, 5..20)) {
            let mut alloc = ClauseAlloc::new();
            let mut crefs = vec![];

            for lits in input.iter() {
                crefs.push(alloc.add_clause(ClauseHeader::new(), lits));
            }

            for (&cref, lits) in crefs.iter().zip(input.iter()) {
                alloc.shrink_clause(cref, lits.len() - 1);
            }

            for (&cref, lits) in crefs.iter().zip(input.iter()) {
                prop_assert_eq!(alloc.clause(cref).lits(), &lits[..lits.len() - 1]);
            }
        }
    }
}
