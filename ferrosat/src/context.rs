//! Central solver data structure.
use partial_ref::{part, partial, PartialRef, PartialRefTarget};

use crate::analyze::AnalyzeConflict;
use crate::cache::ImplCache;
use crate::clause::{ClauseActivity, ClauseAlloc, ClauseDb};
use crate::config::SolverConfig;
use crate::decision::Vsids;
use crate::model::Model;
use crate::proof::Proof;
use crate::prop::{Assignment, ImplGraph, Trail, Watchlists};
use crate::reconstruct::Reconstruction;
use crate::schedule::Schedule;
use crate::simplify::{occur::OccLists, Simplify};
use crate::state::{SolverRng, SolverState};
use crate::tmp::TmpData;
use crate::variables::Variables;

/// Part declarations for the [`Context`] struct.
pub mod parts {
    use super::*;

    part!(pub AnalyzeConflictP: AnalyzeConflict);
    part!(pub AssignmentP: Assignment);
    part!(pub CacheP: ImplCache);
    part!(pub ClauseActivityP: ClauseActivity);
    part!(pub ClauseAllocP: ClauseAlloc);
    part!(pub ClauseDbP: ClauseDb);
    part!(pub ConfigP: SolverConfig);
    part!(pub ImplGraphP: ImplGraph);
    part!(pub ModelP: Model);
    part!(pub OccurP: OccLists);
    part!(pub ProofP<'a>: Proof<'a>);
    part!(pub ReconstructP: Reconstruction);
    part!(pub RngP: SolverRng);
    part!(pub ScheduleP: Schedule);
    part!(pub SimplifyP: Simplify);
    part!(pub SolverStateP: SolverState);
    part!(pub TmpDataP: TmpData);
    part!(pub TrailP: Trail);
    part!(pub VariablesP: Variables);
    part!(pub VsidsP: Vsids);
    part!(pub WatchlistsP: Watchlists);
}

pub use parts::*;

/// Central solver data structure.
///
/// This struct contains all data kept by the solver. Functions that operate on multiple fields
/// take partial references provided by the `partial_ref` crate. This documents the data
/// dependencies of every routine and satisfies the borrow checker without passing around large
/// tuples of individual references.
#[derive(PartialRefTarget, Default)]
pub struct Context<'a> {
    #[part(AnalyzeConflictP)]
    pub analyze_conflict: AnalyzeConflict,
    #[part(AssignmentP)]
    pub assignment: Assignment,
    #[part(CacheP)]
    pub cache: ImplCache,
    #[part(ClauseActivityP)]
    pub clause_activity: ClauseActivity,
    #[part(ClauseAllocP)]
    pub clause_alloc: ClauseAlloc,
    #[part(ClauseDbP)]
    pub clause_db: ClauseDb,
    #[part(ConfigP)]
    pub config: SolverConfig,
    #[part(ImplGraphP)]
    pub impl_graph: ImplGraph,
    #[part(ModelP)]
    pub model: Model,
    #[part(OccurP)]
    pub occur: OccLists,
    #[part(ProofP<'a>)]
    pub proof: Proof<'a>,
    #[part(ReconstructP)]
    pub reconstruct: Reconstruction,
    #[part(RngP)]
    pub rng: SolverRng,
    #[part(ScheduleP)]
    pub schedule: Schedule,
    #[part(SimplifyP)]
    pub simplify: Simplify,
    #[part(SolverStateP)]
    pub solver_state: SolverState,
    #[part(TmpDataP)]
    pub tmp: TmpData,
    #[part(TrailP)]
    pub trail: Trail,
    #[part(VariablesP)]
    pub variables: Variables,
    #[part(VsidsP)]
    pub vsids: Vsids,
    #[part(WatchlistsP)]
    pub watchlists: Watchlists,
}

/// Update all variable indexed structures for a new variable count.
pub fn set_var_count<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ImplGraphP,
        mut OccurP,
        mut TmpDataP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    count: usize,
) {
    ctx.part_mut(AnalyzeConflictP).set_var_count(count);
    ctx.part_mut(AssignmentP).set_var_count(count);
    ctx.part_mut(CacheP).set_var_count(count);
    ctx.part_mut(ImplGraphP).set_var_count(count);
    ctx.part_mut(OccurP).set_var_count(count);
    ctx.part_mut(TmpDataP).set_var_count(count);
    ctx.part_mut(VariablesP).set_var_count(count);
    ctx.part_mut(VsidsP).set_var_count(count);
    ctx.part_mut(WatchlistsP).set_var_count(count);
}

/// Grow the variable count if necessary.
pub fn ensure_var_count<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut CacheP,
        mut ImplGraphP,
        mut OccurP,
        mut TmpDataP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    count: usize,
) {
    if count > ctx.part(VariablesP).var_count() {
        set_var_count(ctx.borrow(), count);
    }
}
