//! End-to-end scenarios on small fixed formulas.
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use ferrosat::{
    CnfFormula, ExtendFormula, Lit, ProofFormat, SolveResult, Solver, SolverConfig,
};

fn formula(clauses: &[&[isize]]) -> CnfFormula {
    let mut formula = CnfFormula::new();
    for clause in clauses {
        let lits: Vec<Lit> = clause.iter().map(|&lit| Lit::from_dimacs(lit)).collect();
        formula.add_clause(&lits);
    }
    formula
}

fn check_model(formula: &CnfFormula, model: &[bool]) {
    for clause in formula.iter() {
        assert!(
            clause
                .iter()
                .any(|&lit| model[lit.index()] == lit.is_positive()),
            "clause {:?} unsatisfied",
            clause
        );
    }
}

fn solve(formula: &CnfFormula) -> SolveResult {
    let mut solver = Solver::new();
    solver.add_formula(formula);
    solver.solve().expect("solve failed")
}

/// Proof target backed by a shared buffer, outliving the solver.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn all_polarities_of_two_vars_unsat() {
    let input = formula(&[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);

    let buf = SharedBuf::default();
    let mut solver = Solver::new();
    solver.write_proof(buf.clone(), ProofFormat::Drat);
    solver.add_formula(&input);

    assert_eq!(solver.solve().expect("solve failed"), SolveResult::Unsat);
    solver.close_proof().expect("proof io failed");

    // The proof must end by deriving the empty clause.
    let proof = String::from_utf8(buf.0.borrow().clone()).unwrap();
    let last_add = proof
        .lines()
        .filter(|line| !line.starts_with('d'))
        .last()
        .expect("empty proof");
    assert_eq!(last_add.trim(), "0");
}

#[test]
fn implied_literal_is_in_every_model() {
    let input = formula(&[&[1, 2], &[-1, 3], &[-2, 3]]);

    match solve(&input) {
        SolveResult::Sat(model) => {
            check_model(&input, &model);
            // 3 is implied by resolution of all three clauses.
            assert!(model[2]);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn units_force_the_last_literal() {
    let input = formula(&[&[1, 2, 3], &[-1], &[-2]]);

    match solve(&input) {
        SolveResult::Sat(model) => {
            check_model(&input, &model);
            assert!(!model[0]);
            assert!(!model[1]);
            assert!(model[2]);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn pigeon_hole_3_into_2_unsat() {
    // Pigeons p in {0,1,2}, holes h in {0,1}; var 1 + 2p + h says p sits in h.
    let input = formula(&[
        &[1, 2],
        &[3, 4],
        &[5, 6],
        &[-1, -3],
        &[-1, -5],
        &[-3, -5],
        &[-2, -4],
        &[-2, -6],
        &[-4, -6],
    ]);

    assert_eq!(input.var_count(), 6);
    assert_eq!(input.len(), 9);
    assert_eq!(solve(&input), SolveResult::Unsat);
}

#[test]
fn disjoint_components_are_both_solved() {
    // Two copies of the implied-literal formula over disjoint variables.
    let input = formula(&[
        &[1, 2],
        &[-1, 3],
        &[-2, 3],
        &[4, 5],
        &[-4, 6],
        &[-5, 6],
    ]);

    match solve(&input) {
        SolveResult::Sat(model) => {
            check_model(&input, &model);
            assert!(model[2]);
            assert!(model[5]);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

/// Deterministic pseudo random 3-SAT near the phase transition.
///
/// Uses a fixed linear congruential generator so the instance is reproducible.
fn random_3sat(vars: usize, clauses: usize, mut state: u64) -> CnfFormula {
    let mut formula = CnfFormula::new();
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };

    for _ in 0..clauses {
        let mut clause = vec![];
        while clause.len() < 3 {
            let var = next() % vars;
            if clause.iter().any(|lit: &Lit| lit.index() == var) {
                continue;
            }
            clause.push(Lit::from_index(var, next() % 2 == 0));
        }
        formula.add_clause(&clause);
    }

    formula.set_var_count(vars);
    formula
}

#[test]
fn random_3sat_verdict_is_config_independent() {
    for seed in 0..4u64 {
        let input = random_3sat(50, 215, 0xfe_ed_be_ef ^ seed);

        // A plain CDCL configuration without inprocessing acts as the reference.
        let mut reference_config = SolverConfig::default();
        reference_config.do_startup_simplify = false;
        reference_config.restart_type = "luby".parse().unwrap();

        let mut reference = Solver::with_config(reference_config);
        reference.add_formula(&input);
        let reference_result = reference.solve().expect("solve failed");

        let mut solver = Solver::new();
        solver.add_formula(&input);
        let result = solver.solve().expect("solve failed");

        match (&reference_result, &result) {
            (SolveResult::Sat(reference_model), SolveResult::Sat(model)) => {
                check_model(&input, reference_model);
                check_model(&input, model);
            }
            (SolveResult::Unsat, SolveResult::Unsat) => (),
            other => panic!("solvers disagree on seed {}: {:?}", seed, other),
        }
    }
}

#[test]
fn fresh_vars_without_clauses_get_values() {
    let mut solver = Solver::new();
    let x = solver.new_var();
    let y = solver.new_var();
    solver.add_clause(&[x.negative(), y.positive()]);
    solver.add_clause(&[x.positive()]);

    match solver.solve().expect("solve failed") {
        SolveResult::Sat(model) => {
            assert_eq!(model.len(), 2);
            assert!(model[x.index()]);
            assert!(model[y.index()]);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn conflict_limit_ends_with_unknown_or_a_valid_answer() {
    let input = random_3sat(300, 1275, 0xabcdef);

    let mut solver = Solver::new();
    solver.add_formula(&input);
    solver.set_option("max_conflicts", "50").unwrap();
    solver.set_option("do_startup_simplify", "false").unwrap();

    // The limit usually stops the search, but a lucky run may finish; both must be reported
    // truthfully.
    match solver.solve().expect("solve failed") {
        SolveResult::Sat(model) => check_model(&input, &model),
        SolveResult::Unsat | SolveResult::Unknown => (),
    }
}

#[test]
fn interrupt_from_another_thread() {
    let input = random_3sat(300, 1275, 0x1234567);

    let mut solver = Solver::new();
    solver.add_formula(&input);

    let handle = solver.interrupt_handle();
    let interruptor = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        handle.interrupt();
    });

    // Either the interrupt lands and the result is unknown, or the instance was solved first;
    // the call must return either way.
    match solver.solve().expect("solve failed") {
        SolveResult::Sat(model) => check_model(&input, &model),
        SolveResult::Unsat | SolveResult::Unknown => (),
    }

    interruptor.join().unwrap();
}
