//! Glue levels of clauses.
//!
//! The glue level (literal block distance, LBD) of a propagating clause is the number of distinct
//! decision levels among its variables. For each clause the smallest observed glue level is kept
//! as an indicator of how useful the clause is.
use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;

use crate::context::{parts::*, Context};

/// Compute the glue level of a clause.
pub fn compute_glue<'a>(
    mut ctx: partial!(Context<'a>, mut TmpDataP, ImplGraphP),
    lits: &[Lit],
) -> usize {
    let (tmp, ctx) = ctx.split_part_mut(TmpDataP);
    let impl_graph = ctx.part(ImplGraphP);
    let flags = &mut tmp.seen;

    let mut glue = 0;

    for &lit in lits {
        let level = impl_graph.level(lit.var());
        let flag = &mut flags[level];
        if !*flag {
            *flag = true;
            glue += 1
        }
    }

    for &lit in lits {
        let level = impl_graph.level(lit.var());
        flags[level] = false;
    }

    glue
}
