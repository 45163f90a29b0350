//! Decision heuristic.
use partial_ref::{partial, PartialRef};

use rand::Rng;

use ferrosat_formula::Lit;

use crate::config::PolarityMode;
use crate::context::{parts::*, Context};
use crate::prop::{enqueue_assignment, Reason};

pub mod vsids;

pub use vsids::Vsids;

/// Make and enqueue a decision.
///
/// Branches on the unassigned variable with the highest activity. Returns `false` without making
/// a decision when all variables are assigned.
pub fn make_decision<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ImplGraphP,
        mut RngP,
        mut TrailP,
        mut VsidsP,
        ConfigP,
        VariablesP,
    ),
) -> bool {
    let decision_var = loop {
        match ctx.part_mut(VsidsP).pop() {
            None => return false,
            Some(var) => {
                if ctx.part(AssignmentP).var_value(var).is_none()
                    && ctx.part(VariablesP).is_active(var)
                {
                    break var;
                }
            }
        }
    };

    let polarity = match ctx.part(ConfigP).polarity_mode {
        PolarityMode::Pos => true,
        PolarityMode::Neg => false,
        PolarityMode::Rnd => ctx.part_mut(RngP).rng.gen(),
        PolarityMode::Auto | PolarityMode::Saved => ctx.part(AssignmentP).phase(decision_var),
    };

    let decision = Lit::from_var(decision_var, polarity);

    ctx.part_mut(TrailP).new_decision_level();
    enqueue_assignment(ctx.borrow(), decision, Reason::Decision);

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::Var;

    use crate::context::set_var_count;

    #[test]
    fn picks_highest_activity_unassigned_var() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        for _ in 0..3 {
            ctx.part_mut(VsidsP).bump(Var::from_index(2));
        }
        ctx.part_mut(VsidsP).bump(Var::from_index(1));

        assert!(make_decision(ctx.borrow()));
        assert_eq!(
            ctx.part(TrailP).trail().last().unwrap().var(),
            Var::from_index(2)
        );

        assert!(make_decision(ctx.borrow()));
        assert_eq!(
            ctx.part(TrailP).trail().last().unwrap().var(),
            Var::from_index(1)
        );
    }

    #[test]
    fn no_decision_when_fully_assigned() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        assert!(make_decision(ctx.borrow()));
        assert!(make_decision(ctx.borrow()));
        assert!(!make_decision(ctx.borrow()));
        assert_eq!(ctx.part(TrailP).current_level(), 2);
    }
}
