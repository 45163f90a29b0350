//! Bounded variable addition.
//!
//! When the clause sets `{C_1, ..., C_m}` and literals `{l_1, ..., l_k}` are such that for every
//! pair the clause `(C_i \ {l}) ∪ {l_j}` is present in the formula, all `k * m` clauses can be
//! replaced by `k` binary clauses `(!x v l_j)` and `m` clauses `(x v C_i \ {l})` over a fresh
//! variable `x`. The net gain `k * m - k - m` is positive for matrices larger than 2x2.
//!
//! The greedy search follows Manthey, Heule and Biere ("Automated Reencoding of Boolean
//! Formulas"): starting from a pivot literal, repeatedly pick the candidate literal matching the
//! most clauses of the current set and keep the matched subset, while the estimated gain grows.
use hashbrown::HashMap;
use log::debug;

use partial_ref::{partial, PartialRef};

use ferrosat_formula::{Lit, Var};
use ferrosat_internal_proof::{DeleteClauseProof, ProofStep};

use crate::budget::Budget;
use crate::context::{ensure_var_count, parts::*, Context};
use crate::proof;
use crate::prop::Watch;
use crate::state::SatState;

use super::occur::{self, OccClause};

/// A clause participating in a BVA matrix.
#[derive(Clone)]
struct Entry {
    clause: OccClause,
    lits: Vec<Lit>,
}

/// Run bounded variable addition.
pub fn add_vars<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut SimplifyP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
) {
    if !ctx.part(ConfigP).do_bva {
        return;
    }

    occur::link(ctx.borrow());

    let mut budget = Budget::new(
        ctx.part(ConfigP).bva_budget,
        ctx.part(ConfigP).global_timeout_multiplier,
    );

    // Most occurring literals first; they are the most promising pivots.
    let mut seeds: Vec<(usize, Lit)> = vec![];
    for code in 0..ctx.part(WatchlistsP).len() {
        let lit = Lit::from_code(code);
        if !ctx.part(VariablesP).is_active(lit.var()) || !ctx.part(AssignmentP).lit_is_unk(lit) {
            continue;
        }
        let count = occur::occurrence_count(ctx.borrow(), lit);
        if count > 2 {
            seeds.push((count, lit));
        }
    }
    seeds.sort_unstable_by_key(|&(count, lit)| (std::cmp::Reverse(count), lit));

    let mut added_vars = 0u64;

    for &(_, pivot) in &seeds {
        if budget.exhausted()
            || ctx.part(SolverStateP).interrupted()
            || ctx.part(SolverStateP).sat_state != SatState::Unknown
        {
            break;
        }

        if try_bva(ctx.borrow(), pivot, &mut budget) {
            added_vars += 1;
        }
    }

    ctx.part_mut(OccurP).unlink();

    ctx.part_mut(SimplifyP).stats.bva_vars += added_vars;
    debug!("bva: introduced {} variables", added_vars);
}

/// Grow a matching matrix from one pivot literal and apply it when profitable.
fn try_bva<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        ConfigP,
    ),
    pivot: Lit,
    budget: &mut Budget,
) -> bool {
    let mut m_lits = vec![pivot];

    // Row per literal of `m_lits`, column per matched clause set.
    let mut rows: Vec<Vec<Entry>> = vec![];
    {
        let mut initial: Vec<Entry> = vec![];
        for clause in occur::clauses_with_lit(ctx.borrow(), pivot) {
            if clause.redundant(ctx.borrow()) {
                continue;
            }
            let lits = clause.owned_lits(ctx.borrow());
            if lits.len() >= 2 {
                initial.push(Entry { clause, lits });
            }
        }
        if initial.len() < 2 {
            return false;
        }
        rows.push(initial);
    }

    loop {
        budget.charge(rows[0].len() as u64);

        let (candidate, matched_cols) = match best_extension(ctx.borrow(), pivot, &m_lits, &rows[0], budget)
        {
            Some(result) => result,
            None => break,
        };

        let k = m_lits.len() as i64;
        let m = rows[0].len() as i64;
        let matched = matched_cols.len() as i64;

        let gain_now = k * m - k - m;
        let gain_extended = (k + 1) * matched - (k + 1) - matched;

        if gain_extended <= gain_now {
            break;
        }

        // Keep only the matched columns in every row and add the new row.
        let col_indices: Vec<usize> = matched_cols.iter().map(|&(col, _)| col).collect();
        for row in rows.iter_mut() {
            *row = col_indices.iter().map(|&col| row[col].clone()).collect();
        }
        rows.push(matched_cols.into_iter().map(|(_, entry)| entry).collect());
        m_lits.push(candidate);
    }

    let k = m_lits.len() as i64;
    let m = rows[0].len() as i64;
    if k < 2 || m < 2 || k * m - k - m <= 0 {
        return false;
    }

    apply_bva(ctx.borrow(), pivot, &m_lits, &rows);
    true
}

/// Find the literal that can replace the pivot in the most clauses of the current set.
///
/// Returns the literal and, per matched column, the replacement clause.
fn best_extension<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut TmpDataP,
        ClauseAllocP,
        OccurP,
        WatchlistsP,
    ),
    pivot: Lit,
    m_lits: &[Lit],
    columns: &[Entry],
    budget: &mut Budget,
) -> Option<(Lit, Vec<(usize, Entry)>)> {
    let mut matches: HashMap<Lit, Vec<(usize, Entry)>> = HashMap::new();

    for (col, entry) in columns.iter().enumerate() {
        let rest: Vec<Lit> = entry
            .lits
            .iter()
            .cloned()
            .filter(|&lit| lit != pivot)
            .collect();

        // Scan the clauses of the rest's least occurring literal for matches of the shape
        // rest ∪ {candidate}.
        let probe_lit = *rest.iter().min_by_key(|&&lit| {
            ctx.part(OccurP).occ_count(lit) + ctx.part(WatchlistsP).watched_by(!lit).len()
        })?;

        budget.charge(8);

        {
            let tmp = ctx.part_mut(TmpDataP);
            for &lit in &rest {
                tmp.seen[lit.code()] = true;
            }
        }

        let mut col_candidates: Vec<(Lit, OccClause, Vec<Lit>)> = vec![];

        // Short clauses containing the probe literal.
        {
            let watchlists = ctx.part(WatchlistsP);
            let tmp = ctx.part(TmpDataP);
            for watch in watchlists.watched_by(!probe_lit) {
                budget.charge(1);
                match *watch {
                    Watch::Binary {
                        implied,
                        redundant: false,
                    } => {
                        if rest.len() == 1 && !tmp.seen[implied.code()] {
                            col_candidates.push((
                                implied,
                                OccClause::Binary([probe_lit, implied], false),
                                vec![probe_lit, implied],
                            ));
                        }
                    }
                    Watch::Ternary {
                        implied,
                        redundant: false,
                    } => {
                        if rest.len() == 2 {
                            let seen_0 = tmp.seen[implied[0].code()];
                            let seen_1 = tmp.seen[implied[1].code()];
                            let candidate = if seen_0 && !seen_1 {
                                Some(implied[1])
                            } else if seen_1 && !seen_0 {
                                Some(implied[0])
                            } else {
                                None
                            };
                            if let Some(candidate) = candidate {
                                col_candidates.push((
                                    candidate,
                                    OccClause::Ternary(
                                        [probe_lit, implied[0], implied[1]],
                                        false,
                                    ),
                                    vec![probe_lit, implied[0], implied[1]],
                                ));
                            }
                        }
                    }
                    _ => (),
                }
            }

            // Long clauses containing the probe literal.
            let alloc = ctx.part(ClauseAllocP);
            for &cref in ctx.part(OccurP).occs(probe_lit) {
                budget.charge(2);
                let header = alloc.header(cref);
                if header.deleted()
                    || header.redundant()
                    || header.len() != rest.len() + 1
                {
                    continue;
                }
                let lits = alloc.clause(cref).lits();
                let tmp = ctx.part(TmpDataP);
                let mut outside = None;
                let mut matched = 0;
                for &lit in lits {
                    if tmp.seen[lit.code()] {
                        matched += 1;
                    } else if outside.is_none() {
                        outside = Some(lit);
                    } else {
                        outside = None;
                        break;
                    }
                }
                if matched == rest.len() {
                    if let Some(candidate) = outside {
                        col_candidates.push((
                            candidate,
                            OccClause::Long(cref),
                            lits.to_vec(),
                        ));
                    }
                }
            }
        }

        {
            let tmp = ctx.part_mut(TmpDataP);
            for &lit in &rest {
                tmp.seen[lit.code()] = false;
            }
        }

        for (candidate, clause, lits) in col_candidates {
            if candidate == pivot || m_lits.contains(&candidate) {
                continue;
            }
            let list = matches.entry(candidate).or_insert_with(Vec::new);
            // One match per column suffices.
            if list.last().map_or(true, |&(last_col, _)| last_col != col) {
                list.push((col, Entry { clause, lits }));
            }
        }
    }

    // Deterministic winner: most matches, ties by literal code.
    let mut best: Option<(Lit, Vec<(usize, Entry)>)> = None;
    let mut entries: Vec<_> = matches.into_iter().collect();
    entries.sort_unstable_by_key(|(lit, list)| (std::cmp::Reverse(list.len()), *lit));
    if let Some((lit, list)) = entries.into_iter().next() {
        if list.len() >= 2 {
            best = Some((lit, list));
        }
    }
    best
}

/// Replace the matched matrix by a fresh variable's definition clauses.
fn apply_bva<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut OccurP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    pivot: Lit,
    m_lits: &[Lit],
    rows: &[Vec<Entry>],
) {
    let fresh_index = ctx.part(VariablesP).var_count();
    ensure_var_count(ctx.borrow(), fresh_index + 1);
    let fresh = Var::from_index(fresh_index).positive();

    // Definition clauses first: (!x v l_j) is blocked on !x while x is unused, and every
    // (x v C_i \ {l}) then resolves into a present clause on x.
    for &m_lit in m_lits {
        let clause = [!fresh, m_lit];
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &clause,
            },
        );
        ctx.part_mut(WatchlistsP).add_binary(clause, false);
    }

    for entry in &rows[0] {
        let mut clause: Vec<Lit> = entry
            .lits
            .iter()
            .cloned()
            .filter(|&lit| lit != pivot)
            .collect();
        clause.push(fresh);
        clause.sort_unstable();
        proof::add_step(
            ctx.borrow(),
            &ProofStep::AddClause {
                redundant: false,
                clause: &clause,
            },
        );
        occur::add_irred_clause(ctx.borrow(), &clause);
    }

    for row in rows {
        for entry in row {
            if clause_is_live(ctx.borrow(), &entry.clause) {
                occur::delete_occ_clause(
                    ctx.borrow(),
                    &entry.clause,
                    DeleteClauseProof::Simplified,
                );
            }
        }
    }
}

/// Whether a clause handle still refers to a present clause.
fn clause_is_live<'a>(
    mut ctx: partial!(Context<'a>, ClauseAllocP, WatchlistsP),
    clause: &OccClause,
) -> bool {
    match clause {
        OccClause::Binary(lits, redundant) => {
            ctx.part(WatchlistsP).contains_binary(*lits, *redundant)
        }
        OccClause::Ternary(lits, redundant) => {
            ctx.part(WatchlistsP).contains_ternary(*lits, *redundant)
        }
        OccClause::Long(cref) => !ctx.part(ClauseAllocP).header(*cref).deleted(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use ferrosat_formula::cnf;

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn factors_a_product_structure() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 6);

        // {1, 2, 3} x {4, 5, 6}: nine binary clauses that BVA can compress into seven.
        for &clause in cnf![
            1, 4;
            1, 5;
            1, 6;
            2, 4;
            2, 5;
            2, 6;
            3, 4;
            3, 5;
            3, 6;
        ]
        .iter()
        {
            load_clause(ctx.borrow(), clause);
        }

        add_vars(ctx.borrow());

        assert_eq!(ctx.part(SimplifyP).stats.bva_vars, 1);
        // 3 + 3 definition clauses replace the 9 original ones.
        assert_eq!(ctx.part(WatchlistsP).binary_count(), 6);
        // The caller visible variable space is unchanged.
        assert_eq!(ctx.part(VariablesP).input_var_count(), 0);
        assert_eq!(ctx.part(VariablesP).var_count(), 7);
    }
}
