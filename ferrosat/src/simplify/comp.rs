//! Disconnected component handling.
//!
//! Variables sharing a clause are connected; the connected components of this relation are
//! independent subformulas. Each small component is renumbered, handed to a fresh solver instance
//! and solved to completion. A satisfying sub assignment is saved for model extension and the
//! component's clauses leave the main solver; an unsatisfiable component makes the whole formula
//! unsatisfiable.
//!
//! The pass is skipped while proof generation is active: the sub solvers run without a proof sink
//! and removing their conclusions from the main proof would leave it unverifiable.
use hashbrown::HashMap;
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::{ExtendFormula, Lit, Var};

use crate::clause::db;
use crate::context::{parts::*, Context};
use crate::prop::Watch;
use crate::reconstruct::ReconstructStep;
use crate::solver::{SolveResult, Solver};
use crate::state::SatState;
use crate::variables::Removed;

use super::occur::OccClause;

/// A solved component's variables and clauses.
///
/// Kept so the component can be put back into the main solver when a later input clause connects
/// to one of its variables.
pub struct SavedComponent {
    pub vars: Vec<Var>,
    pub clauses: Vec<Vec<Lit>>,
}

/// Find disconnected components and solve the small ones in sub solvers.
pub fn handle_components<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut OccurP,
        mut ReconstructP,
        mut SimplifyP,
        mut SolverStateP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
        ProofP<'a>,
        TrailP,
    ),
) {
    if !ctx.part(ConfigP).do_comp_handler || ctx.part(ProofP).is_active() {
        return;
    }

    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let var_count = ctx.part(VariablesP).var_count();
    let mut union_find = UnionFind::new(var_count);

    let clauses = collect_all_clauses(ctx.borrow());

    for clause in &clauses {
        let lits = clause.owned_lits(ctx.borrow());
        for pair in lits.windows(2) {
            union_find.union(pair[0].var(), pair[1].var());
        }
    }

    // Group unassigned active variables by component root.
    let mut components: HashMap<usize, Vec<Var>> = HashMap::new();
    for var in 0..var_count {
        let var = Var::from_index(var);
        if ctx.part(VariablesP).is_active(var) && ctx.part(AssignmentP).var_value(var).is_none() {
            components
                .entry(union_find.find(var.index()))
                .or_insert_with(Vec::new)
                .push(var);
        }
    }

    if components.len() <= 1 {
        return;
    }

    let mut sized: Vec<(usize, usize)> = components
        .iter()
        .map(|(&root, vars)| (vars.len(), root))
        .collect();
    sized.sort_unstable();

    debug!("comp: found {} components", sized.len());

    // The largest component stays in the main solver.
    let (_, keep_root) = *sized.last().unwrap();

    let comp_var_limit = ctx.part(ConfigP).comp_var_limit;

    for &(size, root) in &sized[..sized.len() - 1] {
        if size > comp_var_limit {
            continue;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown
            || ctx.part(SolverStateP).interrupted()
        {
            return;
        }
        debug_assert_ne!(root, keep_root);

        solve_component(
            ctx.borrow(),
            &components[&root],
            &clauses,
            &mut union_find,
            root,
        );
    }
}

/// Solve one component in a fresh solver and apply the outcome.
fn solve_component<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut OccurP,
        mut ReconstructP,
        mut SimplifyP,
        mut SolverStateP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
    comp_vars: &[Var],
    all_clauses: &[OccClause],
    union_find: &mut UnionFind,
    root: usize,
) {
    // Renumber the component's variables densely.
    let mut sub_from_main: HashMap<Var, Var> = HashMap::new();
    for (index, &var) in comp_vars.iter().enumerate() {
        sub_from_main.insert(var, Var::from_index(index));
    }

    let mut config = ctx.part(ConfigP).clone();
    // A component has no subcomponents, and nested decomposition state would go to waste.
    config.do_comp_handler = false;

    let mut sub_solver = Solver::with_config(config);
    sub_solver.share_interrupt_flag(ctx.part(SolverStateP).interrupt_requested.clone());
    sub_solver.new_vars(comp_vars.len());

    let mut comp_clauses = vec![];
    let mut sub_lits = vec![];

    for clause in all_clauses {
        let lits = clause.owned_lits(ctx.borrow());
        if union_find.find(lits[0].index()) != root {
            continue;
        }
        comp_clauses.push(clause.clone());

        if !clause.redundant(ctx.borrow()) {
            sub_lits.clear();
            for &lit in &lits {
                sub_lits.push(lit.map_var(|var| sub_from_main[&var]));
            }
            sub_solver.add_clause(&sub_lits);
        }
    }

    match sub_solver.solve() {
        Err(_) | Ok(SolveResult::Unknown) => {
            // Timed out or interrupted; the clauses stay in the main solver.
            debug!("comp: sub solver returned unknown, keeping component");
        }
        Ok(SolveResult::Unsat) => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        }
        Ok(SolveResult::Sat(model)) => {
            for &var in comp_vars {
                let value = model[sub_from_main[&var].index()];
                ctx.part_mut(ReconstructP)
                    .push(ReconstructStep::Decomposed { var, value });
                ctx.part_mut(VariablesP).set_removed(var, Removed::Decomposed);
                ctx.part_mut(VsidsP).remove(var);
            }

            let mut saved_clauses = Vec::with_capacity(comp_clauses.len());
            for clause in comp_clauses {
                saved_clauses.push(clause.owned_lits(ctx.borrow()));
                delete_component_clause(ctx.borrow(), &clause);
            }
            ctx.part_mut(SimplifyP)
                .saved_components
                .push(SavedComponent {
                    vars: comp_vars.to_vec(),
                    clauses: saved_clauses,
                });

            ctx.part_mut(SimplifyP).stats.components_solved += 1;
        }
    }
}

/// Remove a clause of a solved component, without proof steps (the pass is proofless).
fn delete_component_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut OccurP,
        mut WatchlistsP,
    ),
    clause: &OccClause,
) {
    match clause {
        OccClause::Binary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_binary(*lits, *redundant);
        }
        OccClause::Ternary(lits, redundant) => {
            ctx.part_mut(WatchlistsP).remove_ternary(*lits, *redundant);
        }
        OccClause::Long(cref) => {
            if ctx.part(OccurP).is_linked() {
                let lits = ctx.part(ClauseAllocP).clause(*cref).lits().to_vec();
                ctx.part_mut(OccurP).remove_clause(*cref, &lits);
            }
            db::delete_clause(ctx.borrow(), *cref);
        }
    }
}

/// All live clauses, short ones in canonical form.
fn collect_all_clauses<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, ClauseDbP, WatchlistsP),
) -> Vec<OccClause> {
    let mut result = vec![];

    {
        let watchlists = ctx.part(WatchlistsP);
        for code in 0..watchlists.len() {
            let watching = Lit::from_code(code);
            let first = !watching;
            for watch in watchlists.watched_by(watching) {
                match *watch {
                    Watch::Binary { implied, redundant } => {
                        if first < implied {
                            result.push(OccClause::Binary([first, implied], redundant));
                        }
                    }
                    Watch::Ternary { implied, redundant } => {
                        if first < implied[0] && first < implied[1] {
                            result.push(OccClause::Ternary(
                                [first, implied[0], implied[1]],
                                redundant,
                            ));
                        }
                    }
                    Watch::Long { .. } => (),
                }
            }
        }
    }

    for cref in db::collect_clauses(ctx.borrow()) {
        result.push(OccClause::Long(cref));
    }

    result
}

/// Union-find with path halving over variable indices.
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(count: usize) -> UnionFind {
        UnionFind {
            parent: (0..count as u32).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] as usize != index {
            let grandparent = self.parent[self.parent[index] as usize];
            self.parent[index] = grandparent;
            index = grandparent as usize;
        }
        index
    }

    fn union(&mut self, a: Var, b: Var) {
        let root_a = self.find(a.index());
        let root_b = self.find(b.index());
        if root_a != root_b {
            self.parent[root_a.max(root_b)] = root_a.min(root_b) as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::{cnf, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn disjoint_formulas_are_decomposed() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 6);

        // Two independent copies of the same implication structure.
        for &clause in cnf![
            1, 2;
            -1, 3;
            -2, 3;
            4, 5;
            -4, 6;
            -5, 6;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        handle_components(ctx.borrow());

        // One component is handed off and solved, the other stays in the main solver.
        assert_eq!(ctx.part(SimplifyP).stats.components_solved, 1);
        assert_eq!(ctx.part(SimplifyP).saved_components.len(), 1);

        let decomposed = (0..6)
            .filter(|&index| {
                ctx.part(VariablesP).removed(Var::from_index(index)) == Removed::Decomposed
            })
            .count();
        assert_eq!(decomposed, 3);

        // The solved component's saved assignment satisfies its implied literal.
        let saved = &ctx.part(SimplifyP).saved_components[0];
        assert!(saved.vars.contains(&lits![3][0].var()) || saved.vars.contains(&lits![6][0].var()));
    }

    #[test]
    fn union_find_groups() {
        let mut uf = UnionFind::new(6);
        uf.union(Var::from_index(0), Var::from_index(1));
        uf.union(Var::from_index(1), Var::from_index(2));
        uf.union(Var::from_index(4), Var::from_index(5));

        assert_eq!(uf.find(0), uf.find(2));
        assert_ne!(uf.find(0), uf.find(3));
        assert_eq!(uf.find(4), uf.find(5));
        assert_ne!(uf.find(3), uf.find(4));
    }
}
