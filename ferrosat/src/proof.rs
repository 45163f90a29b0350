//! Proof generation.
use std::io::{sink, BufWriter, Write};

use partial_ref::{partial, PartialRef};

use ferrosat_formula::Lit;
use ferrosat_internal_proof::ProofStep;

use crate::context::{parts::*, Context};
use crate::solver::SolverError;

/// Proof formats that can be generated during solving.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProofFormat {
    Drat,
    BinaryDrat,
}

/// Sink that renders every permanent clause database change as DRAT proof steps.
pub struct Proof<'a> {
    format: Option<ProofFormat>,
    target: BufWriter<Box<dyn Write + 'a>>,
    io_error: Option<std::io::Error>,
}

impl<'a> Default for Proof<'a> {
    fn default() -> Proof<'a> {
        Proof {
            format: None,
            target: BufWriter::new(Box::new(sink())),
            io_error: None,
        }
    }
}

impl<'a> Proof<'a> {
    /// Start writing proof steps to the given target in the given format.
    pub fn write_proof(&mut self, target: impl Write + 'a, format: ProofFormat) {
        self.format = Some(format);
        self.target = BufWriter::new(Box::new(target));
    }

    /// Stop writing proof steps, flushing all buffers.
    pub fn close_proof(&mut self) {
        let result = self.target.flush();
        self.note_io_result(result);
        self.format = None;
        self.target = BufWriter::new(Box::new(sink()));
    }

    /// Whether proof generation is active.
    pub fn is_active(&self) -> bool {
        self.format.is_some()
    }

    /// Render a proof step.
    fn write_step(&mut self, step: &ProofStep) {
        match step {
            ProofStep::AddClause { clause, .. } => {
                self.write_add_marker();
                self.write_lits(clause);
            }
            ProofStep::UnitClauses { units } => {
                for &unit in units.iter() {
                    self.write_add_marker();
                    self.write_lits(&[unit]);
                }
            }
            ProofStep::DeleteClause { clause, .. } => {
                self.write_delete_marker();
                self.write_lits(clause);
            }
            ProofStep::EliminateVar { .. } => (),
            ProofStep::End => {
                let result = self.target.flush();
                self.note_io_result(result);
            }
        }
    }

    fn write_add_marker(&mut self) {
        if self.format == Some(ProofFormat::BinaryDrat) {
            let result = self.target.write_all(b"a");
            self.note_io_result(result);
        }
    }

    fn write_delete_marker(&mut self) {
        if self.format == Some(ProofFormat::BinaryDrat) {
            let result = self.target.write_all(b"d");
            self.note_io_result(result);
        } else {
            let result = self.target.write_all(b"d ");
            self.note_io_result(result);
        }
    }

    fn write_lits(&mut self, literals: &[Lit]) {
        if self.format == Some(ProofFormat::BinaryDrat) {
            for &lit in literals {
                // Mapped DIMACS encoding: positive n -> 2n, negative n -> 2n+1, end marker 0
                let drat_code = lit.code() as u64 + 2;
                let result = leb128::write::unsigned(&mut self.target, drat_code).map(|_| ());
                self.note_io_result(result);
            }
            let result = self.target.write_all(&[0]);
            self.note_io_result(result);
        } else {
            for &lit in literals {
                let result = itoa::write(&mut self.target, lit.to_dimacs()).map(|_| ());
                self.note_io_result(result);
                let result = self.target.write_all(b" ");
                self.note_io_result(result);
            }
            let result = self.target.write_all(b"0\n");
            self.note_io_result(result);
        }
    }

    fn note_io_result(&mut self, result: std::io::Result<()>) {
        if let Err(err) = result {
            if self.io_error.is_none() {
                self.io_error = Some(err);
            }
            self.format = None;
        }
    }

    fn take_io_error(&mut self) -> Option<std::io::Error> {
        self.io_error.take()
    }
}

/// Add a step to the proof.
///
/// Ignored when proof generation is inactive. An IO failure deactivates proof generation and is
/// surfaced as a solver error when the current solve call returns.
pub fn add_step<'a>(
    mut ctx: partial!(Context<'a>, mut ProofP<'a>, mut SolverStateP),
    step: &ProofStep,
) {
    let proof = ctx.part_mut(ProofP);
    if proof.is_active() {
        proof.write_step(step);
    }
    if let Some(err) = proof.take_io_error() {
        let state = ctx.part_mut(SolverStateP);
        if state.solver_error.is_none() {
            state.solver_error = Some(SolverError::ProofIo(err));
        }
    }
}

/// Flush buffered proof steps at the end of a solve call.
pub fn flush<'a>(mut ctx: partial!(Context<'a>, mut ProofP<'a>, mut SolverStateP)) {
    add_step(ctx.borrow(), &ProofStep::End);
}

#[cfg(test)]
mod tests {
    use super::*;

    use ferrosat_formula::lits;
    use ferrosat_internal_proof::DeleteClauseProof;

    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared buffer target, as proof targets only have to outlive the solver.
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
    fn drat_text_output() {
        let buf = SharedBuf::default();
        let mut proof = Proof::default();
        proof.write_proof(buf.clone(), ProofFormat::Drat);

        proof.write_step(&ProofStep::AddClause {
            redundant: true,
            clause: &lits![1, -2],
        });
        proof.write_step(&ProofStep::DeleteClause {
            clause: &lits![3],
            proof: DeleteClauseProof::Satisfied,
        });
        proof.write_step(&ProofStep::AddClause {
            redundant: false,
            clause: &[],
        });
        proof.close_proof();

        let text = String::from_utf8(buf.0.borrow().clone()).unwrap();
        assert_eq!(text, "1 -2 0\nd 3 0\n0\n");
    }

    #[test]
    fn binary_drat_output() {
        let buf = SharedBuf::default();
        let mut proof = Proof::default();
        proof.write_proof(buf.clone(), ProofFormat::BinaryDrat);

        proof.write_step(&ProofStep::AddClause {
            redundant: true,
            clause: &lits![1, -2],
        });
        proof.close_proof();

        // lit 1 -> code 0 -> 2, lit -2 -> code 3 -> 5
        assert_eq!(&buf.0.borrow()[..], b"a\x02\x05\x00");
    }
}
