//! Random formula generators for tests.
use proptest::{prelude::*, *};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::cnf::{CnfFormula, ExtendFormula};
use crate::lit::Lit;

/// Generate small hard unsat instances.
///
/// Sgen-style construction (http://www.cs.qub.ac.uk/~i.spence/sgen/) with random partitions: for
/// both polarities the variables are split into blocks of 4 with at-most-one constraints, forcing
/// a contradiction by counting.
pub fn sgen_unsat_formula(
    blocks: impl Strategy<Value = usize>,
) -> impl Strategy<Value = CnfFormula> {
    blocks.prop_flat_map(|blocks| {
        collection::vec(bool::ANY, blocks * 4 + 1).prop_perturb(|polarity, mut rng| {
            let mut clauses: Vec<Vec<Lit>> = vec![];
            let mut lits = polarity
                .into_iter()
                .enumerate()
                .map(|(index, polarity)| Lit::from_index(index, polarity))
                .collect::<Vec<_>>();

            for &invert in [false, true].iter() {
                lits.shuffle(&mut rng);
                for block in lits.chunks_exact(4) {
                    for a in 0..4 {
                        for b in 0..a {
                            for c in 0..b {
                                let mut clause =
                                    vec![block[a] ^ invert, block[b] ^ invert, block[c] ^ invert];
                                clause.shuffle(&mut rng);
                                clauses.push(clause);
                            }
                        }
                    }
                }
                let &lit_a = lits.last().unwrap();
                for b in 0..4 {
                    for c in 0..b {
                        let mut clause = vec![lit_a ^ invert, lits[b] ^ invert, lits[c] ^ invert];
                        clause.shuffle(&mut rng);
                        clauses.push(clause);
                    }
                }
            }

            clauses.shuffle(&mut rng);
            CnfFormula::from(clauses)
        })
    })
}

/// Generate a satisfiable instance.
///
/// Draws a random full assignment first and only emits clauses compatible with it.
pub fn sat_formula(
    vars: impl Strategy<Value = usize>,
    clause_count: impl Strategy<Value = usize>,
    density: impl Strategy<Value = f64>,
    polarity_dist: impl Strategy<Value = f64>,
) -> impl Strategy<Value = CnfFormula> {
    (vars, clause_count, density, polarity_dist).prop_flat_map(
        |(vars, clause_count, density, polarity_dist)| {
            let density = rand::distributions::Bernoulli::new(density);
            let polarity_dist = rand::distributions::Bernoulli::new(polarity_dist);

            collection::vec(bool::ANY, vars).prop_perturb(move |polarity, mut rng| {
                let mut clauses: Vec<Vec<Lit>> = vec![];
                let lits = polarity
                    .into_iter()
                    .enumerate()
                    .map(|(index, polarity)| Lit::from_index(index, polarity))
                    .collect::<Vec<_>>();

                for _ in 0..clause_count {
                    let &fixed_lit = lits.choose(&mut rng).unwrap();
                    let mut clause = vec![fixed_lit];
                    for &lit in lits.iter() {
                        if lit != fixed_lit && rng.sample(density) {
                            clause.push(lit ^ rng.sample(polarity_dist));
                        }
                    }
                    clause.shuffle(&mut rng);
                    clauses.push(clause);
                }

                clauses.shuffle(&mut rng);
                CnfFormula::from(clauses)
            })
        },
    )
}

/// The pigeon hole principle for `holes + 1` pigeons in `holes` holes, as CNF.
///
/// Unsatisfiable for every positive `holes`; the smallest instances already force real conflict
/// analysis, which makes this a good search smoke test.
pub fn pigeon_hole_formula(holes: usize) -> CnfFormula {
    let pigeons = holes + 1;
    let mut formula = CnfFormula::new();
    let var_of = |pigeon: usize, hole: usize| Lit::from_index(pigeon * holes + hole, true);

    for pigeon in 0..pigeons {
        let clause: Vec<Lit> = (0..holes).map(|hole| var_of(pigeon, hole)).collect();
        formula.add_clause(&clause);
    }

    for hole in 0..holes {
        for a in 0..pigeons {
            for b in 0..a {
                formula.add_clause(&[!var_of(a, hole), !var_of(b, hole)]);
            }
        }
    }

    formula
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pigeon_hole_shape() {
        let formula = pigeon_hole_formula(2);
        assert_eq!(formula.var_count(), 6);
        assert_eq!(formula.len(), 3 + 2 * 3);
    }
}
