//! Variable metadata.
use ferrosat_formula::{Lit, Var};

/// How a variable left the active formula.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Removed {
    /// The variable is part of the active formula.
    No,
    /// Resolved out by bounded variable elimination.
    Eliminated,
    /// Handed to a sub solver by the component handler.
    Decomposed,
    /// Merged into an equivalence class representative.
    Substituted,
}

/// Metadata for a single variable.
#[derive(Copy, Clone)]
pub struct VarData {
    pub removed: Removed,
}

impl Default for VarData {
    fn default() -> VarData {
        VarData {
            removed: Removed::No,
        }
    }
}

/// Variable metadata for the whole variable space.
///
/// The first `input_var_count` variables belong to the caller and make up the reported model;
/// variables above that were introduced internally (by bounded variable addition) and are
/// projected away from the model.
#[derive(Default)]
pub struct Variables {
    var_data: Vec<VarData>,
    /// Replacement for the positive literal of substituted variables.
    equiv: Vec<Option<Lit>>,
    input_var_count: usize,
}

impl Variables {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        if count > self.var_data.len() {
            self.var_data.resize(count, VarData::default());
            self.equiv.resize(count, None);
        }
    }

    /// Total number of variables, including internal ones.
    pub fn var_count(&self) -> usize {
        self.var_data.len()
    }

    /// Number of variables visible to the caller.
    pub fn input_var_count(&self) -> usize {
        self.input_var_count
    }

    /// Extend the caller visible variable space to the given count.
    pub fn set_input_var_count(&mut self, count: usize) {
        debug_assert!(count >= self.input_var_count);
        self.input_var_count = count;
        self.set_var_count(count);
    }

    /// Whether a variable is part of the active formula.
    pub fn is_active(&self, var: Var) -> bool {
        self.var_data[var.index()].removed == Removed::No
    }

    /// How a variable left the active formula.
    pub fn removed(&self, var: Var) -> Removed {
        self.var_data[var.index()].removed
    }

    /// Record that a variable left the active formula.
    pub fn set_removed(&mut self, var: Var, removed: Removed) {
        self.var_data[var.index()].removed = removed;
        if removed == Removed::No {
            self.equiv[var.index()] = None;
        }
    }

    /// Record the replacement literal of a substituted variable.
    pub fn set_equiv(&mut self, var: Var, equiv: Lit) {
        self.equiv[var.index()] = Some(equiv);
    }

    /// Map a literal through the equivalence substitutions to its active representative.
    pub fn resolve_equiv(&self, lit: Lit) -> Lit {
        let mut lit = lit;
        while let Some(replacement) = self.equiv[lit.index()] {
            lit = replacement ^ lit.is_negative();
        }
        lit
    }

    /// Iterator over all active variables.
    pub fn active_vars<'a>(&'a self) -> impl Iterator<Item = Var> + 'a {
        self.var_data
            .iter()
            .enumerate()
            .filter(|(_, data)| data.removed == Removed::No)
            .map(|(index, _)| Var::from_index(index))
    }

    /// Number of active variables.
    pub fn active_count(&self) -> usize {
        self.var_data
            .iter()
            .filter(|data| data.removed == Removed::No)
            .count()
    }
}
