//! Clause activities.
use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};

use super::ClauseRef;

/// Tracks the activity bump value for redundant clauses.
///
/// Like variable activities, clause activities are decayed by growing the bump value instead of
/// touching every clause. When the bump value would overflow the f32 range, all stored activities
/// and the bump value are scaled down by the same factor, which keeps their order.
pub struct ClauseActivity {
    /// The value to add on bumping.
    bump: f32,
    /// The inverse of the decay factor.
    inv_decay: f32,
}

impl Default for ClauseActivity {
    fn default() -> ClauseActivity {
        ClauseActivity {
            bump: 1.0,
            inv_decay: 1.0 / crate::config::SolverConfig::default().clause_activity_decay,
        }
    }
}

impl ClauseActivity {
    /// Rescale when a value exceeds this.
    fn rescale_limit() -> f32 {
        std::f32::MAX / 16.0
    }

    /// Change the decay factor.
    pub fn set_decay(&mut self, decay: f32) {
        assert!(decay < 1.0);
        assert!(decay > 1.0 / 16.0);
        self.inv_decay = 1.0 / decay;
    }
}

/// Increase the activity of a clause.
///
/// Called for every redundant clause involved in a conflict.
pub fn bump_clause_activity<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseActivityP, mut ClauseAllocP, ClauseDbP),
    cref: ClauseRef,
) {
    let bump = ctx.part(ClauseActivityP).bump;
    let rescale = {
        let header = ctx.part_mut(ClauseAllocP).header_mut(cref);
        let activity = header.activity() + bump;
        header.set_activity(activity);
        activity >= ClauseActivity::rescale_limit()
    };

    if rescale {
        rescale_clause_activities(ctx.borrow());
    }
}

/// Decay all clause activities by growing the bump value.
pub fn decay_clause_activities<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseActivityP, mut ClauseAllocP, ClauseDbP),
) {
    let activity = ctx.part_mut(ClauseActivityP);
    activity.bump *= activity.inv_decay;
    if activity.bump >= ClauseActivity::rescale_limit() {
        rescale_clause_activities(ctx.borrow());
    }
}

/// Rescale all clause activities to avoid an overflow.
fn rescale_clause_activities<'a>(
    mut ctx: partial!(Context<'a>, mut ClauseActivityP, mut ClauseAllocP, ClauseDbP),
) {
    let rescale_factor = 1.0 / ClauseActivity::rescale_limit();

    let (db, mut ctx) = ctx.split_part(ClauseDbP);
    let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);

    for &cref in db.clauses.iter() {
        let header = alloc.header_mut(cref);
        if !header.deleted() && header.redundant() {
            let activity = header.activity();
            header.set_activity(activity * rescale_factor);
        }
    }

    ctx.part_mut(ClauseActivityP).bump *= rescale_factor;
}
