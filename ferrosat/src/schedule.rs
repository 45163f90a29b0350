//! Scheduling of search and inprocessing.
//!
//! The top level loop alternates search windows of a growing number of conflicts with runs of the
//! configured inprocessing schedule, and applies the restart and clause database reduction
//! policies inside each search window.
use std::time::Instant;

use log::info;

use partial_ref::{partial, PartialRef};

use crate::cdcl::conflict_step;
use crate::clause::{gc::collect_garbage, reduce::reduce};
use crate::config::RestartType;
use crate::context::{parts::*, Context};
use crate::prop;
use crate::simplify;
use crate::state::SatState;

mod luby;

use luby::LubySequence;

/// Exponential moving average weights for the glue based restart policy.
const SHORT_EMA_WEIGHT: f64 = 1.0 / 32.0;
const LONG_EMA_WEIGHT: f64 = 1.0 / 4096.0;

/// Scheduling state for search, restarts, reductions and inprocessing.
pub struct Schedule {
    /// Total number of conflicts of this solve call.
    pub conflicts: u64,
    restarts: u64,
    conflicts_at_last_restart: u64,
    /// Absolute conflict count of the next Luby or geometric restart.
    next_restart_at: u64,
    geom_interval: f64,
    luby: LubySequence,
    /// Short and long running averages of learnt clause glues.
    glue_short_ema: f64,
    glue_long_ema: f64,
    /// Running average of the trail size at conflicts, for blocking restarts.
    trail_size_ema: f64,
    next_reduce_at: u64,
    reduce_interval: f64,
    started: Option<Instant>,
    /// Makes every interval tiny so tests exercise all steps.
    pub test_schedule: bool,
}

impl Default for Schedule {
    fn default() -> Schedule {
        Schedule {
            conflicts: 0,
            restarts: 0,
            conflicts_at_last_restart: 0,
            next_restart_at: 0,
            geom_interval: 0.0,
            luby: LubySequence::default(),
            glue_short_ema: 0.0,
            glue_long_ema: 0.0,
            trail_size_ema: 0.0,
            next_reduce_at: 0,
            reduce_interval: 0.0,
            started: None,
            test_schedule: false,
        }
    }
}

/// Whether a global resource limit was reached.
fn out_of_budget<'a, 'b>(
    schedule: &Schedule,
    ctx: partial!('b Context<'a>, ConfigP, SolverStateP),
) -> bool {
    if ctx.part(SolverStateP).interrupted() {
        return true;
    }
    let config = ctx.part(ConfigP);
    if schedule.conflicts >= config.max_conflicts {
        return true;
    }
    if config.max_time_secs.is_finite() {
        if let Some(started) = schedule.started {
            if started.elapsed().as_secs_f64() >= config.max_time_secs {
                return true;
            }
        }
    }
    false
}

/// Run the complete search and simplify loop of one solve call.
pub fn solve_loop<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ModelP,
        mut OccurP,
        mut ProofP<'a>,
        mut ReconstructP,
        mut RngP,
        mut ScheduleP,
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
    init_schedule(ctx.borrow());

    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return;
    }

    // Propagate units of the loaded formula before anything else.
    if simplify::propagate_at_level_0(ctx.borrow()).is_err() {
        return;
    }

    if ctx.part(ConfigP).do_startup_simplify {
        let tokens = ctx.part(ConfigP).simplify_schedule_startup.clone();
        simplify::run_schedule(ctx.borrow(), &tokens);

        if ctx.part(SolverStateP).sat_state == SatState::Unknown
            && ctx.part(ConfigP).do_comp_handler
        {
            simplify::comp::handle_components(ctx.borrow());
        }
    }

    let mut window = ctx.part(ConfigP).num_conflicts_of_search;

    while ctx.part(SolverStateP).sat_state == SatState::Unknown {
        let budget_hit = search_window(ctx.borrow(), window);

        if ctx.part(SolverStateP).sat_state != SatState::Unknown || budget_hit {
            break;
        }

        let tokens = ctx.part(ConfigP).simplify_schedule_nonstartup.clone();
        simplify::run_schedule(ctx.borrow(), &tokens);

        window = (window as f64 * ctx.part(ConfigP).num_conflicts_of_search_inc) as u64;
    }
}

/// Prepare the schedule state for a solve call.
fn init_schedule<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseActivityP,
        mut RngP,
        mut ScheduleP,
        mut VsidsP,
        ConfigP,
    ),
) {
    let config = ctx.part(ConfigP);
    let seed = config.seed;
    let vsids_decay = config.vsids_decay;
    let clause_decay = config.clause_activity_decay;
    let reduce_first = config.reduce_first;
    let restart_first = config.restart_first;

    ctx.part_mut(RngP).reseed(seed);
    ctx.part_mut(VsidsP).set_decay(vsids_decay);
    ctx.part_mut(ClauseActivityP).set_decay(clause_decay);

    let schedule = ctx.part_mut(ScheduleP);
    schedule.started = Some(Instant::now());
    if schedule.reduce_interval == 0.0 {
        let reduce_first = if schedule.test_schedule {
            50
        } else {
            reduce_first
        };
        schedule.reduce_interval = reduce_first as f64;
        schedule.next_reduce_at = schedule.conflicts + reduce_first;
    }
    if schedule.geom_interval == 0.0 {
        schedule.geom_interval = restart_first as f64;
    }
}

/// Run CDCL search for up to `limit` conflicts.
///
/// Returns `true` when a global resource limit stopped the search.
fn search_window<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut RngP,
        mut ScheduleP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        CacheP,
        ConfigP,
        VariablesP,
    ),
    limit: u64,
) -> bool {
    let limit = if ctx.part(ScheduleP).test_schedule {
        limit.min(100)
    } else {
        limit
    };

    for _ in 0..limit {
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return false;
        }
        let (schedule, mut sub_ctx) = ctx.split_part(ScheduleP);
        if out_of_budget(schedule, sub_ctx.borrow()) {
            return true;
        }

        restart_if_scheduled(ctx.borrow());
        reduce_if_scheduled(ctx.borrow());

        let trail_size_before = ctx.part(TrailP).trail().len();

        conflict_step(ctx.borrow());

        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return false;
        }

        let glue = ctx.part(AnalyzeConflictP).glue() as f64;
        let (conflicts, restarts) = {
            let schedule = ctx.part_mut(ScheduleP);
            schedule.conflicts += 1;

            if schedule.conflicts == 1 {
                schedule.glue_short_ema = glue;
                schedule.glue_long_ema = glue;
                schedule.trail_size_ema = trail_size_before as f64;
            } else {
                schedule.glue_short_ema += (glue - schedule.glue_short_ema) * SHORT_EMA_WEIGHT;
                schedule.glue_long_ema += (glue - schedule.glue_long_ema) * LONG_EMA_WEIGHT;
                schedule.trail_size_ema +=
                    (trail_size_before as f64 - schedule.trail_size_ema) * LONG_EMA_WEIGHT;
            }
            (schedule.conflicts, schedule.restarts)
        };

        if conflicts % 5000 == 0 {
            info!(
                "confl: {}k rest: {} bin: {} tern: {} irred: {} red: {}",
                conflicts / 1000,
                restarts,
                ctx.part(WatchlistsP).binary_count(),
                ctx.part(WatchlistsP).ternary_count(),
                ctx.part(ClauseDbP).irredundant_count(),
                ctx.part(ClauseDbP).redundant_count(),
            );
        }
    }

    false
}

/// Return to decision level 0 when the restart policy asks for it.
fn restart_if_scheduled<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ScheduleP,
        mut TrailP,
        mut VsidsP,
        ConfigP,
    ),
) {
    let restart_now = {
        let config = ctx.part(ConfigP);
        let trail_size = ctx.part(TrailP).trail().len();
        let schedule = ctx.part_mut(ScheduleP);

        let min_interval = if schedule.test_schedule {
            5
        } else {
            config.glue_restart_min_conflicts
        };

        match config.restart_type {
            RestartType::Luby => {
                if schedule.next_restart_at <= schedule.conflicts_at_last_restart {
                    schedule.next_restart_at = schedule.conflicts_at_last_restart
                        + config.restart_first * schedule.luby.advance();
                }
                schedule.conflicts >= schedule.next_restart_at
            }
            RestartType::Geom => {
                if schedule.next_restart_at <= schedule.conflicts_at_last_restart {
                    schedule.next_restart_at =
                        schedule.conflicts_at_last_restart + schedule.geom_interval as u64;
                    schedule.geom_interval *= config.restart_inc;
                }
                schedule.conflicts >= schedule.next_restart_at
            }
            RestartType::Glue => {
                let enough_conflicts =
                    schedule.conflicts - schedule.conflicts_at_last_restart >= min_interval;
                let glue_high = schedule.glue_short_ema
                    > schedule.glue_long_ema * config.glue_restart_multiplier;
                // A rapidly growing trail suggests the search is about to complete an
                // assignment; hold the restart back.
                let blocked = (trail_size as f64)
                    > schedule.trail_size_ema * config.blocking_restart_multiplier;
                enough_conflicts && glue_high && !blocked
            }
        }
    };

    if restart_now && ctx.part(TrailP).current_level() > 0 {
        prop::restart(ctx.borrow());
        let schedule = ctx.part_mut(ScheduleP);
        schedule.restarts += 1;
        schedule.conflicts_at_last_restart = schedule.conflicts;
        schedule.next_restart_at = schedule.conflicts_at_last_restart;
    }
}

/// Reduce the clause database when its size or the conflict count asks for it.
fn reduce_if_scheduled<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut ScheduleP,
        mut SolverStateP,
        mut WatchlistsP,
        ConfigP,
        TrailP,
    ),
) {
    let reduce_now = {
        let config = ctx.part(ConfigP);
        let db = ctx.part(ClauseDbP);
        let schedule = ctx.part(ScheduleP);

        (schedule.next_reduce_at != 0 && schedule.conflicts >= schedule.next_reduce_at)
            || db.redundant_count() > config.max_temporary_learnt_clauses
    };

    if reduce_now {
        reduce(ctx.borrow());
        collect_garbage(ctx.borrow());

        let reduce_inc = ctx.part(ConfigP).reduce_inc;
        let schedule = ctx.part_mut(ScheduleP);
        schedule.reduce_interval *= reduce_inc;
        schedule.next_reduce_at = schedule.conflicts + schedule.reduce_interval as u64;
    }
}
