use std::env;
use std::fs;
use std::io;
use std::io::Write;

use anyhow::{anyhow, Error};
use clap::{App, Arg};
use env_logger::{fmt, Builder, Target};
use log::{error, info};
use log::{Level, LevelFilter, Record};

use ferrosat::{ProofFormat, SolveResult, Solver};

fn main() {
    let exit_code = match main_with_err() {
        Err(err) => {
            error!("{}", err);
            1
        }
        Ok(exit_code) => exit_code,
    };
    std::process::exit(exit_code);
}

fn main_with_err() -> Result<i32, Error> {
    let matches = App::new("ferrosat")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'")
        .arg_from_usage("--proof [FILE] 'Write an unsatisfiability proof to this file'")
        .arg(
            Arg::with_name("proof-format")
                .long("proof-format")
                .takes_value(true)
                .possible_values(&["drat", "binary-drat"])
                .default_value("drat")
                .help("Format of the written proof"),
        )
        .arg(
            Arg::with_name("option")
                .short("o")
                .long("option")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .value_name("KEY=VALUE")
                .help("Set a solver option"),
        )
        .get_matches();

    let format = |buf: &mut fmt::Formatter, record: &Record| {
        if record.level() == Level::Info {
            writeln!(buf, "c {}", record.args())
        } else {
            writeln!(buf, "c {}: {}", record.level(), record.args())
        }
    };

    let mut builder = Builder::new();
    builder
        .target(Target::Stdout)
        .format(format)
        .filter(None, LevelFilter::Info);

    if let Ok(ref env_var) = env::var("FERROSAT_LOG") {
        builder.parse_filters(env_var);
    }

    builder.init();

    info!("This is ferrosat {}", env!("CARGO_PKG_VERSION"));

    let mut solver = Solver::new();

    if let Some(options) = matches.values_of("option") {
        for option in options {
            let mut parts = option.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts
                .next()
                .ok_or_else(|| anyhow!("option {:?} is not of the form KEY=VALUE", option))?;
            solver.set_option(key, value)?;
        }
    }

    let proof_file = match matches.value_of("proof") {
        Some(path) => {
            info!("Writing proof to file '{}'", path);
            let format = match matches.value_of("proof-format").unwrap() {
                "binary-drat" => ProofFormat::BinaryDrat,
                _ => ProofFormat::Drat,
            };
            let file = fs::File::create(path)?;
            solver.write_proof(file, format);
            true
        }
        None => false,
    };

    let stdin = io::stdin();

    let mut locked_stdin;
    let mut opened_file;

    let file = match matches.value_of("INPUT") {
        Some(path) => {
            info!("Reading file '{}'", path);
            opened_file = fs::File::open(path)?;
            &mut opened_file as &mut dyn io::Read
        }
        None => {
            info!("Reading from stdin");
            locked_stdin = stdin.lock();
            &mut locked_stdin as &mut dyn io::Read
        }
    };

    solver.add_dimacs_cnf(file)?;

    let result = solver.solve()?;

    if proof_file {
        solver.close_proof()?;
    }

    match result {
        SolveResult::Sat(model) => {
            println!("s SATISFIABLE");
            print!("v");
            for (index, &value) in model.iter().enumerate() {
                let number = index as isize + 1;
                print!(" {}", if value { number } else { -number });
            }
            println!(" 0");
            Ok(10)
        }
        SolveResult::Unsat => {
            println!("s UNSATISFIABLE");
            Ok(20)
        }
        SolveResult::Unknown => {
            println!("s UNKNOWN");
            Ok(0)
        }
    }
}
