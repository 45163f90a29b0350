//! Solver configuration.
use std::str::FromStr;

use thiserror::Error;

/// Error while updating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("option {option}: invalid value {value:?}: {expected}")]
    InvalidValue {
        option: String,
        value: String,
        expected: String,
    },
    #[error("unknown simplification step: {0}")]
    UnknownScheduleStep(String),
}

/// Restart policy.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RestartType {
    /// Restart when the short term average glue of learnt clauses exceeds the long term average.
    Glue,
    /// Restart intervals following the Luby sequence.
    Luby,
    /// Geometrically growing restart intervals.
    Geom,
}

impl FromStr for RestartType {
    type Err = String;

    fn from_str(value: &str) -> Result<RestartType, String> {
        match value {
            "glue" => Ok(RestartType::Glue),
            "luby" => Ok(RestartType::Luby),
            "geom" => Ok(RestartType::Geom),
            _ => Err("one of glue, luby, geom".to_string()),
        }
    }
}

/// Initial polarity of decision variables.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PolarityMode {
    /// Negative first, saved phase afterwards.
    Auto,
    /// Always positive first.
    Pos,
    /// Always negative first.
    Neg,
    /// Random initial polarity.
    Rnd,
    /// Saved phase only, initialized to negative.
    Saved,
}

impl FromStr for PolarityMode {
    type Err = String;

    fn from_str(value: &str) -> Result<PolarityMode, String> {
        match value {
            "auto" => Ok(PolarityMode::Auto),
            "pos" => Ok(PolarityMode::Pos),
            "neg" => Ok(PolarityMode::Neg),
            "rnd" => Ok(PolarityMode::Rnd),
            "saved" => Ok(PolarityMode::Saved),
            _ => Err("one of auto, pos, neg, rnd, saved".to_string()),
        }
    }
}

/// Generates the configuration struct, its defaults and the by-name update function.
///
/// Every option can be set from a string value with [`SolverConfig::set_option`]; unknown names
/// are rejected. This replaces per-field boilerplate for the option table below.
macro_rules! solver_config {
    ($($(#[doc = $doc:literal])* $name:ident : $type:ty = $default:expr => $expected:literal ; $check:expr,)*) => {
        /// Configurable parameters used during solving.
        #[derive(Clone, Debug)]
        pub struct SolverConfig {
            $($(#[doc = $doc])* pub $name: $type,)*
        }

        impl Default for SolverConfig {
            fn default() -> SolverConfig {
                SolverConfig {
                    $($name: $default,)*
                }
            }
        }

        impl SolverConfig {
            /// Set a single option from its name and a string value.
            ///
            /// Returns an error for unknown option names, unparsable values and values outside
            /// the option's range.
            pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
                let invalid = |expected: &str| ConfigError::InvalidValue {
                    option: name.to_string(),
                    value: value.to_string(),
                    expected: expected.to_string(),
                };
                match name {
                    $(stringify!($name) => {
                        let parsed: $type = value.parse().map_err(|_| invalid($expected))?;
                        let check: fn(&$type) -> bool = $check;
                        if !check(&parsed) {
                            return Err(invalid($expected));
                        }
                        self.$name = parsed;
                        Ok(())
                    })*
                    _ => Err(ConfigError::UnknownOption(name.to_string())),
                }
            }

            /// Names of all recognized options.
            pub fn option_names() -> &'static [&'static str] {
                &[$(stringify!($name),)*]
            }
        }
    };
}

fn any<T>(_: &T) -> bool {
    true
}

solver_config! {
    /// Seed for the solver's random number generator.
    seed: u64 = 0 => "an unsigned integer"; any,

    /// Multiplicative decay for the variable activities of the decision heuristic.
    vsids_decay: f32 = 0.95 => "a float in 0.5..1.0"; |&v| v >= 0.5 && v < 1.0,

    /// Multiplicative decay for clause activities.
    clause_activity_decay: f32 = 0.999 => "a float in 0.5..1.0"; |&v| v >= 0.5 && v < 1.0,

    /// Restart policy.
    restart_type: RestartType = RestartType::Glue => "one of glue, luby, geom"; any,

    /// Base restart interval in conflicts.
    ///
    /// Scales the Luby sequence and is the initial interval of the geometric policy.
    restart_first: u64 = 100 => "a positive integer"; |&v| v > 0,

    /// Growth factor of the geometric restart interval.
    restart_inc: f64 = 1.5 => "a float >= 1.0"; |&v| v >= 1.0,

    /// Glue restarts trigger when the short term glue average exceeds this multiple of the long
    /// term average.
    glue_restart_multiplier: f64 = 1.1 => "a float >= 1.0"; |&v| v >= 1.0,

    /// Minimum number of conflicts between two glue based restarts.
    glue_restart_min_conflicts: u64 = 50 => "a positive integer"; |&v| v > 0,

    /// Suppress a pending restart while the trail is larger than this multiple of its recent
    /// average.
    blocking_restart_multiplier: f64 = 1.4 => "a float >= 1.0"; |&v| v >= 1.0,

    /// Initial polarity of decision variables.
    polarity_mode: PolarityMode = PolarityMode::Auto => "one of auto, pos, neg, rnd, saved"; any,

    /// Number of redundant clauses that triggers a clause database reduction.
    max_temporary_learnt_clauses: usize = 30000 => "a positive integer"; |&v| v > 0,

    /// Redundant clauses with a glue at or below this are never removed.
    glue_must_keep_if_below_or_eq: u32 = 5 => "an unsigned integer"; any,

    /// Number of conflicts before the first clause database reduction.
    reduce_first: u64 = 2000 => "a positive integer"; |&v| v > 0,

    /// Growth factor for the interval between clause database reductions.
    reduce_inc: f64 = 1.1 => "a float >= 1.0"; |&v| v >= 1.0,

    /// Run the startup simplification schedule before the first search.
    do_startup_simplify: bool = true => "a bool"; any,

    /// Number of conflicts of the first search window between inprocessing rounds.
    num_conflicts_of_search: u64 = 20000 => "a positive integer"; |&v| v > 0,

    /// Growth factor of the search window.
    num_conflicts_of_search_inc: f64 = 1.4 => "a float >= 1.0"; |&v| v >= 1.0,

    /// Total conflict limit for a solve call.
    max_conflicts: u64 = u64::max_value() => "an unsigned integer"; any,

    /// Total wall clock limit for a solve call in seconds.
    max_time_secs: f64 = std::f64::INFINITY => "a positive float"; |&v| v > 0.0,

    /// Enable failed literal probing.
    do_probe: bool = true => "a bool"; any,

    /// Probe roots of the binary implication forest before other variables.
    do_intree_probe: bool = true => "a bool"; any,

    /// Enable on-the-fly hyper-binary resolution during probing.
    otf_hyperbin: bool = true => "a bool"; any,

    /// Disable hyper-binary resolution for good when it used more than this ratio of the probe
    /// budget.
    otf_hyper_ratio_limit: f64 = 0.5 => "a float in 0.0..=1.0"; |&v| v >= 0.0 && v <= 1.0,

    /// Enable the implication cache.
    do_cache: bool = true => "a bool"; any,

    /// Skip cache updates for probes that implied more literals than this.
    cache_update_cutoff: usize = 2000 => "an unsigned integer"; any,

    /// Enable bounded variable elimination.
    do_var_elim: bool = true => "a bool"; any,

    /// Largest resolvent size bounded variable elimination may produce.
    velim_resolvent_too_large: usize = 20 => "a positive integer"; |&v| v > 0,

    /// Allowed growth of the clause count when eliminating a variable.
    velim_grow: usize = 0 => "an unsigned integer"; any,

    /// Fraction of the elimination queue processed per call.
    var_elim_ratio_per_iter: f64 = 0.25 => "a float in 0.0..=1.0"; |&v| v > 0.0 && v <= 1.0,

    /// Enable bounded variable addition.
    do_bva: bool = true => "a bool"; any,

    /// Enable splitting the formula into disconnected components.
    do_comp_handler: bool = true => "a bool"; any,

    /// Components larger than this many variables stay in the main solver.
    comp_var_limit: usize = 100000 => "a positive integer"; |&v| v > 0,

    /// Work budget of a probing pass in bogo-props.
    probe_budget: u64 = 2000000 => "a positive integer"; |&v| v > 0,

    /// Work budget of a subsumption or variable elimination pass in bogo-props.
    occsimp_budget: u64 = 4000000 => "a positive integer"; |&v| v > 0,

    /// Work budget of a bounded variable addition pass in bogo-props.
    bva_budget: u64 = 1000000 => "a positive integer"; |&v| v > 0,

    /// Work budget of a clause distillation pass in bogo-props.
    distill_budget: u64 = 1000000 => "a positive integer"; |&v| v > 0,

    /// Scales every per-pass work budget.
    global_timeout_multiplier: f64 = 1.0 => "a positive float"; |&v| v > 0.0,

    /// Simplification steps run before the first search.
    simplify_schedule_startup: String =
        "scc-vrepl, probe, backw-subsume, bve, bva, distill-cls, renumber".to_string()
        => "a comma separated list of step tokens";
        |v: &String| crate::simplify::parse_schedule(v).is_ok(),

    /// Simplification steps run between search windows.
    simplify_schedule_nonstartup: String =
        "scc-vrepl, probe, backw-subsume, bve, renumber".to_string()
        => "a comma separated list of step tokens";
        |v: &String| crate::simplify::parse_schedule(v).is_ok(),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_known_options() {
        let mut config = SolverConfig::default();

        config.set_option("vsids_decay", "0.9").unwrap();
        assert_eq!(config.vsids_decay, 0.9);

        config.set_option("restart_type", "luby").unwrap();
        assert_eq!(config.restart_type, RestartType::Luby);

        config.set_option("do_bva", "false").unwrap();
        assert!(!config.do_bva);

        config.set_option("comp_var_limit", "1234").unwrap();
        assert_eq!(config.comp_var_limit, 1234);
    }

    #[test]
    fn reject_unknown_option() {
        let mut config = SolverConfig::default();
        match config.set_option("no_such_option", "1") {
            Err(ConfigError::UnknownOption(name)) => assert_eq!(name, "no_such_option"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn reject_out_of_range_values() {
        let mut config = SolverConfig::default();
        assert!(config.set_option("vsids_decay", "1.5").is_err());
        assert!(config.set_option("restart_first", "0").is_err());
        assert!(config.set_option("restart_type", "fancy").is_err());
        assert!(config.set_option("do_probe", "maybe").is_err());
    }

    #[test]
    fn option_names_cover_semantic_options() {
        for name in &[
            "do_bva",
            "do_probe",
            "do_var_elim",
            "do_comp_handler",
            "restart_type",
            "polarity_mode",
            "otf_hyperbin",
            "do_cache",
            "seed",
            "global_timeout_multiplier",
        ] {
            assert!(SolverConfig::option_names().contains(name));
        }
    }
}
