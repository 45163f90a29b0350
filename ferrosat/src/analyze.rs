//! Learning a new clause from a conflict.
use std::mem::swap;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::{Lit, Var};

use crate::clause::activity::bump_clause_activity;
use crate::clause::ClauseRef;
use crate::context::{parts::*, Context};
use crate::glue::compute_glue;
use crate::prop::{Conflict, Reason};

/// Memoized result of a redundancy check during clause minimization.
const MEMO_UNKNOWN: u8 = 0;
const MEMO_REMOVABLE: u8 = 1;
const MEMO_POISON: u8 = 2;

/// Temporaries for conflict analysis.
#[derive(Default)]
pub struct AnalyzeConflict {
    /// The learned clause after analysis finishes, asserting literal in position 0.
    clause: Vec<Lit>,
    /// Number of literals of the current level in the unfinished resolvent.
    current_level_count: usize,
    /// Variables present in the unfinished resolvent (and later, in the learned clause).
    var_flags: Vec<bool>,
    /// Entries to clean in `var_flags`.
    to_clean: Vec<Var>,
    /// Glue level of the learned clause.
    glue: usize,
    /// Per variable memo for the minimization DFS.
    memo: Vec<u8>,
    /// Entries to clean in `memo`.
    memo_clean: Vec<Var>,
    /// DFS worklist of the minimization.
    pending: Vec<Lit>,
    /// Variables visited by the current minimization DFS.
    visited: Vec<Var>,
}

impl AnalyzeConflict {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.var_flags.resize(count, false);
        self.memo.resize(count, MEMO_UNKNOWN);
    }

    /// The learned clause.
    pub fn clause(&self) -> &[Lit] {
        &self.clause
    }

    /// Glue level of the learned clause.
    pub fn glue(&self) -> usize {
        self.glue
    }
}

/// Learn a clause by analyzing a conflict.
///
/// Produces the first unique implication point clause, minimizes it and returns the lowest
/// decision level at which the clause is asserting. An empty learned clause means the formula is
/// unsatisfiable.
pub fn analyze_conflict<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut TmpDataP,
        mut VsidsP,
        CacheP,
        ClauseDbP,
        ConfigP,
        ImplGraphP,
        TrailP,
    ),
    conflict: Conflict,
) -> usize {
    {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        analyze.clause.clear();
        analyze.current_level_count = 0;
        analyze.glue = 0;
    }

    if ctx.part(TrailP).current_level() == 0 {
        // Conflict without any decision, the formula is unsat and the learned clause empty.
        return 0;
    }

    if let Conflict::Long(cref) = conflict {
        bump_traversed_clause(ctx.borrow(), cref);
    }

    {
        let conflict_lits = conflict.lits(&ctx.borrow()).to_vec();
        for &lit in &conflict_lits {
            add_literal(ctx.borrow(), lit);
        }
    }

    // Resolve the conflict clause with the reasons of current level literals in reverse
    // chronological order, until a single current level literal is left.
    let trail_len = ctx.part(TrailP).trail().len();

    for trail_index in (0..trail_len).rev() {
        let lit = ctx.part(TrailP).trail()[trail_index];

        let lit_present = &mut ctx.part_mut(AnalyzeConflictP).var_flags[lit.index()];
        if !*lit_present {
            continue;
        }
        *lit_present = false;

        let analyze = ctx.part_mut(AnalyzeConflictP);
        analyze.current_level_count -= 1;
        if analyze.current_level_count == 0 {
            // lit is the first unique implication point; the clause asserts !lit, which goes to
            // position 0.
            analyze.clause.push(!lit);
            let end = analyze.clause.len() - 1;
            analyze.clause.swap(0, end);
            break;
        }

        let reason = *ctx.part(ImplGraphP).reason(lit.var());
        if let Reason::Long(cref) = reason {
            bump_traversed_clause(ctx.borrow(), cref);
        }

        let reason_lits = reason.lits(&ctx.borrow()).to_vec();
        for &reason_lit in &reason_lits {
            add_literal(ctx.borrow(), reason_lit);
        }
    }

    minimize_clause(ctx.borrow());

    if ctx.part(ConfigP).do_cache {
        minimize_with_cache(ctx.borrow());
    }

    // Clean the var flags of the remaining clause literals.
    {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        for var in analyze.to_clean.drain(..) {
            analyze.var_flags[var.index()] = false;
        }
        for var in analyze.memo_clean.drain(..) {
            analyze.memo[var.index()] = MEMO_UNKNOWN;
        }
    }

    let glue = {
        let clause = ctx.part(AnalyzeConflictP).clause.to_vec();
        compute_glue(ctx.borrow(), &clause)
    };
    ctx.part_mut(AnalyzeConflictP).glue = glue;

    // Move the highest level literal besides the asserting one into position 1, so the watchlist
    // invariant holds after backtracking.
    let mut backtrack_to = 0;

    let (analyze, ctx) = ctx.split_part_mut(AnalyzeConflictP);
    if analyze.clause.len() > 1 {
        let impl_graph = ctx.part(ImplGraphP);
        let (prefix, rest) = analyze.clause.split_at_mut(2);
        let lit_1 = &mut prefix[1];
        backtrack_to = impl_graph.level(lit_1.var());
        for lit in rest.iter_mut() {
            let lit_level = impl_graph.level(lit.var());
            if lit_level > backtrack_to {
                backtrack_to = lit_level;
                swap(lit_1, lit);
            }
        }
    }

    backtrack_to
}

/// Add a literal to the unfinished resolvent.
///
/// Level 0 literals are always false and can be dropped from the resolvent. Every added variable
/// gets an activity bump.
fn add_literal<'a>(
    mut ctx: partial!(Context<'a>, mut AnalyzeConflictP, mut VsidsP, ImplGraphP, TrailP),
    lit: Lit,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let lit_level = ctx.part(ImplGraphP).level(lit.var());
    if lit_level == 0 || analyze.var_flags[lit.index()] {
        return;
    }

    ctx.part_mut(VsidsP).bump(lit.var());

    analyze.var_flags[lit.index()] = true;
    if lit_level == ctx.part(TrailP).current_level() {
        analyze.current_level_count += 1;
    } else {
        analyze.clause.push(lit);
        analyze.to_clean.push(lit.var());
    }
}

/// Bump the activity of a traversed redundant clause and tighten its glue.
///
/// The glue is only ever decreased to the newly observed level count.
fn bump_traversed_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut TmpDataP,
        ClauseDbP,
        ImplGraphP,
    ),
    cref: ClauseRef,
) {
    if !ctx.part(ClauseAllocP).header(cref).redundant() {
        return;
    }

    bump_clause_activity(ctx.borrow(), cref);

    let glue = {
        let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        compute_glue(ctx.borrow(), &lits)
    };

    let header = ctx.part_mut(ClauseAllocP).header_mut(cref);
    if glue < header.glue() as usize {
        header.set_glue(glue);
    }
}

/// Remove literals whose negation is implied by the rest of the clause.
///
/// A literal is redundant if every path through its implication ancestry ends in another clause
/// literal or a level 0 assignment (Sörensson and Biere, "Minimizing Learned Clauses"). The
/// check runs a DFS over the implication graph with memoization across the clause's literals.
fn minimize_clause<'a>(
    mut ctx: partial!(Context<'a>, mut AnalyzeConflictP, ClauseAllocP, ImplGraphP),
) {
    let mut index = 1;
    loop {
        let len = ctx.part(AnalyzeConflictP).clause.len();
        if index >= len {
            break;
        }
        let lit = ctx.part(AnalyzeConflictP).clause[index];
        if lit_is_redundant(ctx.borrow(), lit) {
            let analyze = ctx.part_mut(AnalyzeConflictP);
            analyze.clause.swap_remove(index);
            // The flag stays set: a removed literal is still implied by the clause, so it can
            // still justify removing other literals.
        } else {
            index += 1;
        }
    }
}

/// DFS redundancy check for a single clause literal.
fn lit_is_redundant<'a>(
    mut ctx: partial!(Context<'a>, mut AnalyzeConflictP, ClauseAllocP, ImplGraphP),
    lit: Lit,
) -> bool {
    if ctx.part(ImplGraphP).reason(lit.var()).is_unit() {
        // Decisions cannot be resolved away; level 0 literals never enter the clause.
        return false;
    }

    {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        analyze.pending.clear();
        analyze.visited.clear();
        analyze.pending.push(lit);
    }

    while let Some(open) = ctx.part_mut(AnalyzeConflictP).pending.pop() {
        let reason = *ctx.part(ImplGraphP).reason(open.var());
        let ante_lits = reason.lits(&ctx.borrow()).to_vec();

        for &ante in &ante_lits {
            let var = ante.var();
            let (analyze, mut sub_ctx) = ctx.split_part_mut(AnalyzeConflictP);
            if sub_ctx.part(ImplGraphP).level(var) == 0
                || analyze.var_flags[var.index()]
                || analyze.memo[var.index()] == MEMO_REMOVABLE
            {
                continue;
            }
            if analyze.memo[var.index()] == MEMO_POISON
                || sub_ctx.part(ImplGraphP).reason(var).is_unit()
            {
                // A decision outside the clause blocks the resolution chain for good.
                if analyze.memo[var.index()] == MEMO_UNKNOWN {
                    analyze.memo[var.index()] = MEMO_POISON;
                    analyze.memo_clean.push(var);
                }
                return false;
            }
            analyze.pending.push(ante);
            analyze.visited.push(var);
        }
    }

    // The whole ancestry terminated in clause literals or level 0; everything visited is
    // removable as well.
    let analyze = ctx.part_mut(AnalyzeConflictP);
    for i in 0..analyze.visited.len() {
        let var = analyze.visited[i];
        if analyze.memo[var.index()] == MEMO_UNKNOWN {
            analyze.memo[var.index()] = MEMO_REMOVABLE;
            analyze.memo_clean.push(var);
        }
    }

    true
}

/// Drop literals that are implied via a cached binary implication.
///
/// If the cache holds `!k -> !l` for clause literals `k` and `l`, then resolving with the
/// corresponding binary clause `(k v !l)` removes `l` from the clause.
fn minimize_with_cache<'a>(
    mut ctx: partial!(Context<'a>, mut AnalyzeConflictP, mut TmpDataP, CacheP),
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let (tmp, ctx) = ctx.split_part_mut(TmpDataP);
    let cache = ctx.part(CacheP);

    if analyze.clause.len() <= 2 {
        return;
    }

    // tmp.seen marks clause literals, tmp.seen_2 marks literals to remove.
    for &lit in &analyze.clause {
        tmp.seen[lit.code()] = true;
    }

    let mut any_removed = false;
    for &lit in &analyze.clause {
        // A literal marked for removal can no longer act as a witness, which keeps witness
        // chains acyclic and the removals sound.
        if tmp.seen_2[lit.code()] {
            continue;
        }
        for &implied in cache.implied(!lit) {
            if implied != !analyze.clause[0] && implied != lit && tmp.seen[(!implied).code()] {
                tmp.seen_2[(!implied).code()] = true;
                any_removed = true;
            }
        }
    }

    for &lit in &analyze.clause {
        tmp.seen[lit.code()] = false;
    }

    if any_removed {
        let seen_2 = &mut tmp.seen_2;
        analyze
            .clause
            .retain(|&lit| !std::mem::replace(&mut seen_2[lit.code()], false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::{cnf, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;
    use crate::prop::propagate;

    #[test]
    fn asserting_clause_is_learned() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 8);

        // Decision 1 forces 2, then 3 and 4, which conflict.
        for &clause in cnf![
            -1, 2;
            -1, -2, 3;
            -2, 4;
            -3, -4;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        ctx.part_mut(TrailP).new_decision_level();
        crate::prop::enqueue_assignment(ctx.borrow(), lits![1][0], Reason::Decision);

        let conflict = propagate(ctx.borrow()).unwrap_err();

        let backtrack_to = analyze_conflict(ctx.borrow(), conflict);

        assert_eq!(backtrack_to, 0);
        // The decision is the only unique implication point of this conflict.
        assert_eq!(ctx.part(AnalyzeConflictP).clause(), &lits![-1]);
        assert_eq!(ctx.part(AnalyzeConflictP).glue(), 1);
    }

    #[test]
    fn conflict_at_level_0_learns_empty_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        for &clause in cnf![
            1, 2;
            -1;
            -2;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        let conflict = propagate(ctx.borrow()).unwrap_err();
        let backtrack_to = analyze_conflict(ctx.borrow(), conflict);

        assert_eq!(backtrack_to, 0);
        assert!(ctx.part(AnalyzeConflictP).clause().is_empty());
    }
}
