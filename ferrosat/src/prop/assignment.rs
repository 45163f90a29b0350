//! Partial assignment and trail.
use partial_ref::{partial, PartialRef};

use ferrosat_formula::{Lit, LitIdx, Var};

use crate::context::{parts::*, Context};

use super::Reason;

/// Current partial assignment with saved phases.
#[derive(Default)]
pub struct Assignment {
    assignment: Vec<Option<bool>>,
    /// The last value assigned to each variable, used as the decision phase.
    phase: Vec<bool>,
}

impl Assignment {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.assignment.resize(count, None);
        self.phase.resize(count, false);
    }

    /// Current partial assignment, indexed by variable.
    pub fn assignment(&self) -> &[Option<bool>] {
        &self.assignment
    }

    /// Value assigned to a variable.
    pub fn var_value(&self, var: Var) -> Option<bool> {
        self.assignment[var.index()]
    }

    /// Value assigned to a literal.
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.index()].map(|value| value ^ lit.is_negative())
    }

    pub fn lit_is_true(&self, lit: Lit) -> bool {
        self.assignment[lit.index()] == Some(lit.is_positive())
    }

    pub fn lit_is_false(&self, lit: Lit) -> bool {
        self.assignment[lit.index()] == Some(lit.is_negative())
    }

    pub fn lit_is_unk(&self, lit: Lit) -> bool {
        self.assignment[lit.index()].is_none()
    }

    pub fn assign_lit(&mut self, lit: Lit) {
        self.assignment[lit.index()] = lit.is_positive().into()
    }

    pub fn unassign_var(&mut self, var: Var) {
        self.assignment[var.index()] = None;
    }

    /// The saved phase of a variable.
    pub fn phase(&self, var: Var) -> bool {
        self.phase[var.index()]
    }

    /// Overwrite the saved phase of a variable.
    pub fn set_phase(&mut self, var: Var, phase: bool) {
        self.phase[var.index()] = phase;
    }
}

/// Decision and propagation history.
#[derive(Default)]
pub struct Trail {
    /// Stack of all propagated and enqueued assignments.
    trail: Vec<Lit>,
    /// Next assignment in the trail to propagate.
    queue_head_pos: usize,
    /// Start of each decision level as a trail index.
    decisions: Vec<LitIdx>,
}

impl Trail {
    /// Return and consume the next assignment to propagate.
    pub fn pop_queue(&mut self) -> Option<Lit> {
        let lit = self.trail.get(self.queue_head_pos).cloned();
        if lit.is_some() {
            self.queue_head_pos += 1;
        }
        lit
    }

    /// Whether all enqueued assignments are propagated.
    pub fn queue_is_empty(&self) -> bool {
        self.queue_head_pos == self.trail.len()
    }

    /// Assigned literals in assignment order.
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    /// Current decision level.
    pub fn current_level(&self) -> usize {
        self.decisions.len()
    }

    /// Start a new decision level.
    pub fn new_decision_level(&mut self) {
        self.decisions.push(self.trail.len() as LitIdx);
    }

    /// Trail index at which the given decision level starts.
    pub fn level_start(&self, level: usize) -> usize {
        if level == 0 {
            0
        } else {
            self.decisions[level - 1] as usize
        }
    }

    /// Number of assignments at level 0.
    ///
    /// These are fixed and never retracted.
    pub fn top_level_length(&self) -> usize {
        if self.decisions.is_empty() {
            self.trail.len()
        } else {
            self.decisions[0] as usize
        }
    }
}

/// Enqueue the assignment of true to a literal.
///
/// This updates the assignment and the trail but does not perform any propagation. The literal
/// has to be unassigned when calling this.
pub fn enqueue_assignment<'a>(
    mut ctx: partial!(Context<'a>, mut AssignmentP, mut ImplGraphP, mut TrailP),
    lit: Lit,
    reason: Reason,
) {
    let assignment = ctx.part_mut(AssignmentP);
    debug_assert!(assignment.lit_value(lit) == None);

    assignment.assign_lit(lit);

    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    trail.trail.push(lit);

    let node = &mut ctx.part_mut(ImplGraphP).nodes[lit.index()];
    node.reason = reason;
    node.level = trail.decisions.len() as LitIdx;
}

/// Undo all assignments above a given decision level.
///
/// The phase of every unassigned variable is saved and the variable is reinserted into the
/// decision heap.
pub fn backtrack<'a>(
    mut ctx: partial!(Context<'a>, mut AssignmentP, mut TrailP, mut VsidsP),
    level: usize,
) {
    let (assignment, mut ctx) = ctx.split_part_mut(AssignmentP);
    let (vsids, mut ctx) = ctx.split_part_mut(VsidsP);
    let trail = ctx.part_mut(TrailP);

    debug_assert!(level <= trail.current_level());

    if level == trail.current_level() {
        return;
    }

    let new_len = trail.decisions[level] as usize;
    trail.decisions.truncate(level);

    for &lit in &trail.trail[new_len..] {
        let var = lit.var();
        assignment.phase[var.index()] = lit.is_positive();
        assignment.assignment[var.index()] = None;
        vsids.make_available(var);
    }

    trail.trail.truncate(new_len);
    trail.queue_head_pos = trail.queue_head_pos.min(new_len);
}

/// Undo all decisions and their consequences.
pub fn restart<'a>(mut ctx: partial!(Context<'a>, mut AssignmentP, mut TrailP, mut VsidsP)) {
    backtrack(ctx.borrow(), 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::lits;

    use crate::context::set_var_count;

    #[test]
    fn enqueue_and_backtrack() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        enqueue_assignment(ctx.borrow(), lits![1][0], Reason::Unit);

        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lits![-2][0], Reason::Decision);
        enqueue_assignment(ctx.borrow(), lits![3][0], Reason::Binary(lits![2]));

        assert_eq!(ctx.part(TrailP).current_level(), 1);
        assert_eq!(ctx.part(TrailP).trail().len(), 3);
        assert!(ctx.part(AssignmentP).lit_is_true(lits![-2][0]));
        assert_eq!(ctx.part(ImplGraphP).level(lits![3][0].var()), 1);

        backtrack(ctx.borrow(), 0);

        assert_eq!(ctx.part(TrailP).current_level(), 0);
        assert_eq!(ctx.part(TrailP).trail(), &lits![1]);
        assert!(ctx.part(AssignmentP).lit_is_unk(lits![2][0]));
        // Phase of the undone assignment is saved
        assert!(!ctx.part(AssignmentP).phase(lits![2][0].var()));
        assert!(ctx.part(AssignmentP).phase(lits![3][0].var()));
    }
}
