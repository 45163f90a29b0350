//! Temporary data.
use ferrosat_formula::Lit;

/// Temporary data used by various parts of the solver.
///
/// Make sure to check any documented invariants when using this. Also make sure to check all
/// existing users when adding invariants.
#[derive(Default)]
pub struct TmpData {
    pub lits: Vec<Lit>,
    pub lits_2: Vec<Lit>,
    /// A boolean for each literal.
    ///
    /// Reset to all-false, keep size.
    pub seen: Vec<bool>,
    /// A second boolean for each literal, for passes that need two marks.
    ///
    /// Reset to all-false, keep size.
    pub seen_2: Vec<bool>,
}

impl TmpData {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.seen.resize(count * 2, false);
        self.seen_2.resize(count * 2, false);
    }
}
