//! Proof steps emitted by the ferrosat SAT solver.
//!
//! Every permanent change of the clause database is described by a [`ProofStep`]. The solver hands
//! these to a sink that renders them into a DRUP/DRAT file for external verification.
use ferrosat_formula::{Lit, Var};

/// Integer type used to store a hash of a clause.
pub type ClauseHash = u64;

/// Hash a single literal.
///
/// Hashes of multiple literals can be combined with xor, as done in [`clause_hash`].
pub fn lit_hash(lit: Lit) -> ClauseHash {
    // Constant based on the golden ratio provides good mixing for the resulting upper bits
    (!(lit.code() as u64)).wrapping_mul(0x61c8_8646_80b5_83ebu64)
}

/// A fast order-independent hash for clauses (or other *sets* of literals).
///
/// Permuting the input does not change the result. Duplicated literals are not handled.
pub fn clause_hash(lits: &[Lit]) -> ClauseHash {
    let mut hash = 0;
    for &lit in lits {
        hash ^= lit_hash(lit);
    }
    hash
}

/// Justification for a clause deletion.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DeleteClauseProof {
    /// The clause is known to be redundant.
    Redundant,
    /// The clause is irredundant but implied by the remaining formula.
    Simplified,
    /// The clause contains a literal that is true at level 0.
    ///
    /// Also used for tautological clauses.
    Satisfied,
}

/// A single proof step.
///
/// Represents a mutation of the current formula together with a justification for its validity.
#[derive(Copy, Clone, Debug)]
pub enum ProofStep<'a> {
    /// Add a clause that is implied by the current formula.
    ///
    /// Every clause the solver derives (learnt clauses, resolvents, hyper-binary resolvents, BVA
    /// definitions) is an asymmetric tautology of the preceding formula, so a RUP/RAT checker can
    /// verify it without further hints.
    AddClause { redundant: bool, clause: &'a [Lit] },
    /// Unit clauses found by propagation at the top level.
    UnitClauses { units: &'a [Lit] },
    /// Delete a clause consisting of the given literals.
    DeleteClause {
        clause: &'a [Lit],
        proof: DeleteClauseProof,
    },
    /// A variable was resolved out of the formula.
    ///
    /// Emitted for documentation of the reconstruction stack; DRAT output renders the clause
    /// deletions separately, so this step itself produces no output.
    EliminateVar { var: Var },
    /// Signals the end of a proof.
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    use ferrosat_formula::lits;

    #[test]
    fn clause_hash_is_order_independent() {
        let a = lits![1, -3, 5];
        let b = lits![5, 1, -3];
        let c = lits![5, 1, 3];
        assert_eq!(clause_hash(&a), clause_hash(&b));
        assert_ne!(clause_hash(&a), clause_hash(&c));
    }
}
