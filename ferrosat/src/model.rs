//! Model reconstruction.
use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;

use crate::context::{parts::*, Context};

/// The satisfying assignment over the full variable space.
#[derive(Default)]
pub struct Model {
    /// Indexed by variable; valid whenever the solver state is SAT.
    assignment: Vec<Option<bool>>,
}

impl Model {
    /// The model assignment, indexed by variable.
    pub fn assignment(&self) -> &[Option<bool>] {
        &self.assignment
    }

    /// Whether a literal is true in the model.
    pub fn lit_is_true(&self, lit: Lit) -> bool {
        self.assignment[lit.index()] == Some(lit.is_positive())
    }

    /// The model restricted to the caller's variables.
    ///
    /// Variables without a forced value get a fixed default, so every input variable is defined.
    pub fn input_model(&self, input_var_count: usize) -> Vec<bool> {
        (0..input_var_count)
            .map(|index| self.assignment.get(index).cloned().flatten().unwrap_or(false))
            .collect()
    }
}

/// Extend the search assignment to a model of the original formula.
///
/// Active variables take their value from the current (total) assignment; removed variables are
/// filled in by replaying the reconstruction stack.
pub fn reconstruct_model<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ModelP,
        AssignmentP,
        ReconstructP,
        VariablesP,
    ),
) {
    let (model, mut ctx) = ctx.split_part_mut(ModelP);
    let variables = ctx.part(VariablesP);
    let assignment = ctx.part(AssignmentP);

    model.assignment.clear();
    model.assignment.resize(variables.var_count(), None);

    for var in variables.active_vars() {
        model.assignment[var.index()] = assignment.var_value(var);
    }

    ctx.part(ReconstructP).extend_model(&mut model.assignment);
}
