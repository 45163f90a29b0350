//! DIMACS CNF parser and writer for the ferrosat SAT solver.
//!
//! The parser consumes its input in chunks, so a caller can stream a large file into the solver
//! without materializing the whole formula at once.
use std::{io, mem::replace};

use ferrosat_formula::{CnfFormula, ExtendFormula, Lit, Var};

use anyhow::Error;
use thiserror::Error;

/// Possible errors while parsing a DIMACS CNF formula.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("line {line}: unexpected character in DIMACS CNF input: {unexpected:?}")]
    UnexpectedInput { line: usize, unexpected: char },
    #[error("line {line}: literal index too large: {digits}")]
    LiteralTooLarge { line: usize, digits: String },
    #[error("line {line}: invalid header: {header:?}")]
    InvalidHeader { line: usize, header: String },
    #[error("line {line}: unterminated clause")]
    UnterminatedClause { line: usize },
    #[error("formula has {var_count} variables, header specifies {header_var_count}")]
    VarCount {
        var_count: usize,
        header_var_count: usize,
    },
    #[error("formula has {clause_count} clauses, header specifies {header_clause_count}")]
    ClauseCount {
        clause_count: usize,
        header_clause_count: usize,
    },
    #[error("parser invoked after a previous error")]
    PreviousError,
}

/// Variable and clause count of a DIMACS CNF header.
#[derive(Copy, Clone, Debug)]
pub struct DimacsHeader {
    pub var_count: usize,
    pub clause_count: usize,
}

/// What the byte scanner is currently inside of.
#[derive(Copy, Clone, PartialEq, Eq)]
enum ScanState {
    /// At the start of a line or between tokens.
    Gap { line_start: bool },
    /// Inside a number, after an optional leading minus sign.
    Number { negative: bool, empty: bool },
    /// Inside a `c` comment line.
    Comment,
    /// Inside the `p cnf ...` header line.
    Header,
}

/// Incremental parser for DIMACS CNF files.
pub struct DimacsParser {
    formula: CnfFormula,
    partial_clause: Vec<Lit>,
    header: Option<DimacsHeader>,

    state: ScanState,
    line: usize,
    number: usize,
    header_line: Vec<u8>,
    clause_count: usize,
    seen_var_count: usize,
    failed: bool,
}

impl Default for DimacsParser {
    fn default() -> DimacsParser {
        DimacsParser {
            formula: CnfFormula::new(),
            partial_clause: vec![],
            header: None,

            state: ScanState::Gap { line_start: true },
            line: 1,
            number: 0,
            header_line: vec![],
            clause_count: 0,
            seen_var_count: 0,
            failed: false,
        }
    }
}

impl DimacsParser {
    /// Create a new DIMACS CNF parser.
    pub fn new() -> DimacsParser {
        DimacsParser::default()
    }

    /// Parse the complete input into a single formula, checking the header if present.
    pub fn parse(input: impl io::Read) -> Result<CnfFormula, Error> {
        Ok(Self::parse_incremental(input, |_| Ok(()))?.take_formula())
    }

    /// Parse the given input incrementally, checking the header if present.
    ///
    /// The callback is invoked after each chunk with a reference to the parser, and can drain the
    /// clauses parsed so far using [`take_formula`](DimacsParser::take_formula).
    pub fn parse_incremental(
        input: impl io::Read,
        mut callback: impl FnMut(&mut DimacsParser) -> Result<(), Error>,
    ) -> Result<DimacsParser, Error> {
        use io::BufRead;

        let mut buffer = io::BufReader::new(input);
        let mut parser = Self::new();

        loop {
            let data = buffer.fill_buf()?;
            if data.is_empty() {
                break;
            }
            parser.parse_chunk(data)?;
            let len = data.len();
            buffer.consume(len);

            callback(&mut parser)?;
        }
        parser.eof()?;
        callback(&mut parser)?;
        parser.check_header()?;

        Ok(parser)
    }

    /// Parse a chunk of input.
    ///
    /// Call [`eof`](DimacsParser::eof) after the last chunk. When this returns an error the parser
    /// cannot process further chunks.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Result<(), ParserError> {
        if self.failed {
            return Err(ParserError::PreviousError);
        }
        for &byte in chunk {
            if let Err(err) = self.scan_byte(byte) {
                self.failed = true;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Finish parsing the input.
    ///
    /// Header counts are not verified here, use [`check_header`](DimacsParser::check_header).
    pub fn eof(&mut self) -> Result<(), ParserError> {
        if self.failed {
            return Err(ParserError::PreviousError);
        }
        if let Err(err) = self.scan_byte(b'\n') {
            self.failed = true;
            return Err(err);
        }
        if !self.partial_clause.is_empty() {
            self.failed = true;
            return Err(ParserError::UnterminatedClause { line: self.line });
        }
        if let Some(header) = self.header {
            self.formula.set_var_count(header.var_count);
        }
        Ok(())
    }

    /// Verify the parsed formula against the header counts.
    pub fn check_header(&self) -> Result<(), ParserError> {
        if let Some(header) = self.header {
            if self.seen_var_count > header.var_count {
                return Err(ParserError::VarCount {
                    var_count: self.seen_var_count,
                    header_var_count: header.var_count,
                });
            }
            if self.clause_count != header.clause_count {
                return Err(ParserError::ClauseCount {
                    clause_count: self.clause_count,
                    header_clause_count: header.clause_count,
                });
            }
        }
        Ok(())
    }

    /// The header of the input, if one was present.
    pub fn header(&self) -> Option<DimacsHeader> {
        self.header
    }

    /// Number of variables parsed so far (or declared by the header, whichever is larger).
    pub fn var_count(&self) -> usize {
        self.seen_var_count
            .max(self.header.map_or(0, |header| header.var_count))
    }

    /// Number of complete clauses parsed so far.
    pub fn clause_count(&self) -> usize {
        self.clause_count
    }

    /// Take the clauses parsed since the last call, leaving the parser ready for more input.
    pub fn take_formula(&mut self) -> CnfFormula {
        replace(&mut self.formula, CnfFormula::new())
    }

    fn scan_byte(&mut self, byte: u8) -> Result<(), ParserError> {
        match self.state {
            ScanState::Comment => {
                if byte == b'\n' {
                    self.new_line();
                }
            }
            ScanState::Header => {
                if byte == b'\n' {
                    self.parse_header_line()?;
                    self.new_line();
                } else {
                    self.header_line.push(byte);
                }
            }
            ScanState::Gap { line_start } => match byte {
                b' ' | b'\t' | b'\r' => (),
                b'\n' => self.new_line(),
                b'c' if line_start => self.state = ScanState::Comment,
                b'p' if line_start && self.header.is_none() => {
                    self.header_line.clear();
                    self.header_line.push(b'p');
                    self.state = ScanState::Header;
                }
                b'-' => {
                    self.number = 0;
                    self.state = ScanState::Number {
                        negative: true,
                        empty: true,
                    };
                }
                b'0'..=b'9' => {
                    self.number = (byte - b'0') as usize;
                    self.state = ScanState::Number {
                        negative: false,
                        empty: false,
                    };
                }
                _ => {
                    return Err(ParserError::UnexpectedInput {
                        line: self.line,
                        unexpected: byte as char,
                    });
                }
            },
            ScanState::Number { negative, empty } => match byte {
                b'0'..=b'9' => {
                    let digit = (byte - b'0') as usize;
                    if self.number > Var::max_count() / 10
                        || self.number * 10 > Var::max_count() - digit
                    {
                        return Err(ParserError::LiteralTooLarge {
                            line: self.line,
                            digits: format!("{}{}...", self.number, digit),
                        });
                    }
                    self.number = self.number * 10 + digit;
                    self.state = ScanState::Number {
                        negative,
                        empty: false,
                    };
                }
                b' ' | b'\t' | b'\r' | b'\n' if !empty => {
                    self.finish_number(negative);
                    if byte == b'\n' {
                        self.new_line();
                    } else {
                        self.state = ScanState::Gap { line_start: false };
                    }
                }
                _ => {
                    return Err(ParserError::UnexpectedInput {
                        line: self.line,
                        unexpected: byte as char,
                    });
                }
            },
        }
        Ok(())
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.state = ScanState::Gap { line_start: true };
    }

    fn finish_number(&mut self, negative: bool) {
        if self.number == 0 {
            self.formula.add_clause(&self.partial_clause);
            self.partial_clause.clear();
            self.clause_count += 1;
        } else {
            let mut dimacs = self.number as isize;
            if negative {
                dimacs = -dimacs;
            }
            self.seen_var_count = self.seen_var_count.max(self.number);
            self.partial_clause.push(Lit::from_dimacs(dimacs));
        }
    }

    fn parse_header_line(&mut self) -> Result<(), ParserError> {
        let header_err = |line: usize, bytes: &[u8]| ParserError::InvalidHeader {
            line,
            header: String::from_utf8_lossy(bytes).into_owned(),
        };

        let line = replace(&mut self.header_line, vec![]);
        let text = std::str::from_utf8(&line).map_err(|_| header_err(self.line, &line))?;

        let mut tokens = text.split_whitespace();
        if tokens.next() != Some("p") || tokens.next() != Some("cnf") {
            return Err(header_err(self.line, &line));
        }
        let var_count: usize = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| header_err(self.line, &line))?;
        let clause_count: usize = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| header_err(self.line, &line))?;
        if tokens.next().is_some() || var_count > Var::max_count() {
            return Err(header_err(self.line, &line));
        }

        self.header = Some(DimacsHeader {
            var_count,
            clause_count,
        });
        Ok(())
    }
}

/// Write a formula in DIMACS CNF format.
pub fn write_dimacs(target: &mut impl io::Write, formula: &CnfFormula) -> io::Result<()> {
    writeln!(target, "p cnf {} {}", formula.var_count(), formula.len())?;
    for clause in formula.iter() {
        for &lit in clause {
            itoa::write(&mut *target, lit.to_dimacs())?;
            target.write_all(b" ")?;
        }
        target.write_all(b"0\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use ferrosat_formula::{cnf::strategy::cnf_formula, cnf_formula};

    #[test]
    fn parse_simple() {
        let input = b"c example\np cnf 4 3\n1 -2 0\n-1 3 0\n2 3 -4 0\n" as &[u8];
        let formula = DimacsParser::parse(input).unwrap();

        let expected = cnf_formula![
            1, -2;
            -1, 3;
            2, 3, -4;
        ];

        assert_eq!(formula, expected);
    }

    #[test]
    fn parse_missing_newline_at_eof() {
        let input = b"p cnf 2 1\n1 2 0" as &[u8];
        let formula = DimacsParser::parse(input).unwrap();
        assert_eq!(formula.len(), 1);
    }

    #[test]
    fn parse_headerless() {
        let input = b"1 2 0\n-1 0\n" as &[u8];
        let formula = DimacsParser::parse(input).unwrap();
        assert_eq!(formula.len(), 2);
        assert_eq!(formula.var_count(), 2);
    }

    #[test]
    fn reject_unterminated_clause() {
        let input = b"p cnf 2 1\n1 2\n" as &[u8];
        assert!(DimacsParser::parse(input).is_err());
    }

    #[test]
    fn reject_garbage() {
        let input = b"p cnf 2 1\n1 x 0\n" as &[u8];
        assert!(DimacsParser::parse(input).is_err());
    }

    #[test]
    fn reject_wrong_clause_count() {
        let input = b"p cnf 2 3\n1 2 0\n" as &[u8];
        assert!(DimacsParser::parse(input).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_through_dimacs(formula in cnf_formula(1..100usize, 0..500, 0..10)) {
            let mut written = vec![];
            write_dimacs(&mut written, &formula).unwrap();

            let parsed = DimacsParser::parse(&written[..]).unwrap();

            prop_assert_eq!(parsed, formula);
        }
    }
}
