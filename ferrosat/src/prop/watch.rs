//! The watch index.
//!
//! Every literal `l` has a list of watch entries for the clauses that need to be inspected when
//! `l` becomes true (i.e. when the clause literal `!l` becomes false). Binary and ternary clauses
//! are stored *inline* in these entries and exist nowhere else: a binary clause has an entry in
//! the lists of both its literals, a ternary clause in all three. Long clauses (four or more
//! literals) live in the arena and are watched by exactly their first two literals.
//!
//! For long clauses the entry also carries a blocking literal, some other literal of the clause.
//! When the blocking literal is true the clause is satisfied and the clause data does not have to
//! be touched at all (Sörensson and Eén, "MINISAT 2.1 and MINISAT++ 1.0").
//!
//! Propagation keeps the watched literals of a long clause in positions 0 and 1 of the clause and
//! only moves watches when the watched literal becomes false, as described in Section 4.5.1 of
//! the "Handbook of Satisfiability". Backtracking never invalidates the watch invariant, so
//! watchlists are not updated then.
use ferrosat_formula::Lit;

use crate::clause::ClauseRef;

/// A watch entry.
///
/// Kept at 16 bytes so watch scans stay cache friendly.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Watch {
    /// A binary clause `(!l, implied)` in the list of literal `l`.
    Binary { implied: Lit, redundant: bool },
    /// A ternary clause `(!l, implied[0], implied[1])` in the list of literal `l`.
    Ternary { implied: [Lit; 2], redundant: bool },
    /// A long clause that has `!l` in position 0 or 1.
    Long { cref: ClauseRef, blocking: Lit },
}

/// The watch index.
#[derive(Default)]
pub struct Watchlists {
    /// Indexed by literal code.
    watches: Vec<Vec<Watch>>,
    /// Number of binary clauses, split into (irredundant, redundant).
    binary_count: [usize; 2],
    /// Number of ternary clauses, split into (irredundant, redundant).
    ternary_count: [usize; 2],
}

impl Watchlists {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.watches.resize(count * 2, vec![]);
    }

    /// Start watching a long clause.
    ///
    /// `lits` have to be the first two literals of the given clause.
    pub fn watch_clause(&mut self, cref: ClauseRef, lits: [Lit; 2]) {
        for i in 0..2 {
            let watch = Watch::Long {
                cref,
                blocking: lits[i ^ 1],
            };
            self.watches[(!lits[i]).code()].push(watch);
        }
    }

    /// Stop watching a long clause.
    ///
    /// `lits` have to be the two watched literals of the clause.
    pub fn unwatch_clause(&mut self, cref: ClauseRef, lits: [Lit; 2]) {
        for &lit in lits.iter() {
            let list = &mut self.watches[(!lit).code()];
            let position = list
                .iter()
                .position(|watch| match watch {
                    Watch::Long { cref: w_cref, .. } => *w_cref == cref,
                    _ => false,
                })
                .expect("clause not found in watchlist");
            list.swap_remove(position);
        }
    }

    /// Add a binary clause.
    pub fn add_binary(&mut self, lits: [Lit; 2], redundant: bool) {
        debug_assert_ne!(lits[0].var(), lits[1].var());
        for i in 0..2 {
            self.watches[(!lits[i]).code()].push(Watch::Binary {
                implied: lits[i ^ 1],
                redundant,
            });
        }
        self.binary_count[redundant as usize] += 1;
    }

    /// Remove a binary clause that is present with the given redundancy flag.
    pub fn remove_binary(&mut self, lits: [Lit; 2], redundant: bool) {
        for i in 0..2 {
            let list = &mut self.watches[(!lits[i]).code()];
            let position = list
                .iter()
                .position(|watch| {
                    *watch
                        == Watch::Binary {
                            implied: lits[i ^ 1],
                            redundant,
                        }
                })
                .expect("binary clause not found in watchlist");
            list.swap_remove(position);
        }
        self.binary_count[redundant as usize] -= 1;
    }

    /// Whether a binary clause with the given redundancy flag is present.
    pub fn contains_binary(&self, lits: [Lit; 2], redundant: bool) -> bool {
        self.watches[(!lits[0]).code()]
            .iter()
            .any(|watch| match watch {
                Watch::Binary {
                    implied,
                    redundant: w_red,
                } => *implied == lits[1] && *w_red == redundant,
                _ => false,
            })
    }

    /// Whether a ternary clause with the given redundancy flag is present.
    pub fn contains_ternary(&self, lits: [Lit; 3], redundant: bool) -> bool {
        let other = [lits[1], lits[2]];
        self.watches[(!lits[0]).code()]
            .iter()
            .any(|watch| match watch {
                Watch::Ternary {
                    implied,
                    redundant: w_red,
                } => {
                    *w_red == redundant
                        && (*implied == other || *implied == [other[1], other[0]])
                }
                _ => false,
            })
    }

    /// Whether a binary clause over the given literals is present, irredundant or not.
    pub fn has_binary(&self, lits: [Lit; 2]) -> bool {
        self.watches[(!lits[0]).code()]
            .iter()
            .any(|watch| match watch {
                Watch::Binary { implied, .. } => *implied == lits[1],
                _ => false,
            })
    }

    /// Add a ternary clause.
    pub fn add_ternary(&mut self, lits: [Lit; 3], redundant: bool) {
        for i in 0..3 {
            self.watches[(!lits[i]).code()].push(Watch::Ternary {
                implied: [lits[(i + 1) % 3], lits[(i + 2) % 3]],
                redundant,
            });
        }
        self.ternary_count[redundant as usize] += 1;
    }

    /// Remove a ternary clause that is present with the given redundancy flag.
    pub fn remove_ternary(&mut self, lits: [Lit; 3], redundant: bool) {
        for i in 0..3 {
            let other = [lits[(i + 1) % 3], lits[(i + 2) % 3]];
            let list = &mut self.watches[(!lits[i]).code()];
            let position = list
                .iter()
                .position(|watch| match watch {
                    Watch::Ternary {
                        implied,
                        redundant: w_red,
                    } => {
                        *w_red == redundant
                            && (*implied == other || *implied == [other[1], other[0]])
                    }
                    _ => false,
                })
                .expect("ternary clause not found in watchlist");
            list.swap_remove(position);
        }
        self.ternary_count[redundant as usize] -= 1;
    }

    /// Watches for a literal that just became true.
    pub fn watched_by(&self, lit: Lit) -> &[Watch] {
        &self.watches[lit.code()]
    }

    /// Mutable watchlist of a literal that just became true.
    pub fn watched_by_mut(&mut self, lit: Lit) -> &mut Vec<Watch> {
        &mut self.watches[lit.code()]
    }

    /// Make a literal watch a long clause.
    pub fn add_watch(&mut self, lit: Lit, watch: Watch) {
        self.watches[lit.code()].push(watch)
    }

    /// Number of binary clauses.
    pub fn binary_count(&self) -> usize {
        self.binary_count[0] + self.binary_count[1]
    }

    /// Number of irredundant binary clauses.
    pub fn irredundant_binary_count(&self) -> usize {
        self.binary_count[0]
    }

    /// Number of ternary clauses.
    pub fn ternary_count(&self) -> usize {
        self.ternary_count[0] + self.ternary_count[1]
    }

    /// Apply a function to every watch entry, e.g. to rewrite clause references after garbage
    /// collection.
    pub fn update_refs(&mut self, mut update: impl FnMut(&mut Watch)) {
        for list in self.watches.iter_mut() {
            for watch in list.iter_mut() {
                update(watch);
            }
        }
    }

    /// Adjust the stored clause counts, for passes that edit watch entries wholesale.
    pub fn set_counts(&mut self, binary: [usize; 2], ternary: [usize; 2]) {
        self.binary_count = binary;
        self.ternary_count = ternary;
    }

    /// Number of literal slots in the index.
    pub fn len(&self) -> usize {
        self.watches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ferrosat_formula::lits;

    #[test]
    fn binary_lifecycle() {
        let mut watchlists = Watchlists::default();
        watchlists.set_var_count(4);

        let clause = lits![1, -2];
        watchlists.add_binary(clause, false);
        assert_eq!(watchlists.binary_count(), 1);
        assert!(watchlists.has_binary(clause));
        assert!(watchlists.has_binary(lits![-2, 1]));
        assert!(!watchlists.has_binary(lits![1, 2]));

        // Watch sits in the list of the falsifying assignment
        assert_eq!(watchlists.watched_by(lits![-1][0]).len(), 1);
        assert_eq!(watchlists.watched_by(lits![2][0]).len(), 1);

        watchlists.remove_binary(clause, false);
        assert_eq!(watchlists.binary_count(), 0);
        assert!(!watchlists.has_binary(clause));
    }

    #[test]
    fn ternary_lifecycle() {
        let mut watchlists = Watchlists::default();
        watchlists.set_var_count(4);

        watchlists.add_ternary(lits![1, 2, 3], true);
        assert_eq!(watchlists.ternary_count(), 1);

        // Removal matches any rotation of the remaining literals
        watchlists.remove_ternary(lits![1, 2, 3], true);
        assert_eq!(watchlists.ternary_count(), 0);
        for code in 0..8 {
            assert!(watchlists
                .watched_by(ferrosat_formula::Lit::from_code(code))
                .is_empty());
        }
    }
}
