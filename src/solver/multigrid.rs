use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::parameters::AmrParameters;
use crate::problem_domain::ProblemDomain;
use super::bottom::LinearSolver;
use super::level_op::{MgLevelOp, MgLevelOpFactory};




/// Residual norms below this value count as converged.
pub const RESIDUAL_FLOOR: f64 = 1e-16;




/// The outcome of an iterative solve. Non-convergence is not an error; the
/// caller inspects the final residual.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    pub initial_residual: f64,
    pub final_residual: f64,
}

impl SolveReport {
    pub fn reduction(&self) -> f64 {
        if self.initial_residual > 0.0 {
            self.final_residual / self.initial_residual
        } else {
            0.0
        }
    }
}




/// Sweep counts and the number of coarse-grid visits per depth.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Schedule {
    pub pre: usize,
    pub post: usize,
    pub bottom: usize,
    pub cycles: i32,
}

impl Schedule {
    pub(crate) fn visits(&self, who: &str) -> usize {
        if self.cycles < 0 {
            panic!("{}::cycle - non-V cycle options not implemented", who)
        }
        self.cycles as usize
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiGridState {
    Undefined,
    Defined,
}




/// Correction-form multigrid over a hierarchy of operators, one per depth,
/// built by a factory from the finest domain down. Depth 0 is the finest.
///
/// The per-depth correction and residual buffers are allocated on the first
/// solve after `define` and reused by every later cycle.
///
pub struct MultiGrid<T, Op> {
    pub pre: usize,
    pub post: usize,
    pub bottom: usize,
    /// Coarse-grid visits per depth: 1 is a V-cycle. Negative values are
    /// reserved and panic.
    pub cycles: i32,
    pub homogeneous: bool,
    state: MultiGridState,
    pub(crate) ops: Vec<Op>,
    pub(crate) correction: Vec<T>,
    pub(crate) residual: Vec<T>,
    bottom_solver: Option<Box<dyn LinearSolver<T, Op>>>,
}




// ============================================================================
impl<T, Op: MgLevelOp<T>> Default for MultiGrid<T, Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Op: MgLevelOp<T>> MultiGrid<T, Op> {

    pub fn new() -> Self {
        Self {
            pre: 2,
            post: 2,
            bottom: 40,
            cycles: 1,
            homogeneous: true,
            state: MultiGridState::Undefined,
            ops: Vec::new(),
            correction: Vec::new(),
            residual: Vec::new(),
            bottom_solver: None,
        }
    }

    pub fn state(&self) -> MultiGridState {
        self.state
    }

    pub fn num_depths(&self) -> usize {
        self.ops.len()
    }

    pub fn op(&self, depth: usize) -> &Op {
        &self.ops[depth]
    }

    pub fn set_solver_parameters(&mut self, pre: usize, post: usize, bottom: usize, cycles: i32) {
        self.pre = pre;
        self.post = post;
        self.bottom = bottom;
        self.cycles = cycles;
    }

    pub fn set_from_parameters(&mut self, parameters: &AmrParameters) {
        self.set_solver_parameters(
            parameters.pre_smooth,
            parameters.post_smooth,
            parameters.bottom_smooth,
            parameters.cycles)
    }

    pub(crate) fn schedule(&self) -> Schedule {
        Schedule { pre: self.pre, post: self.post, bottom: self.bottom, cycles: self.cycles }
    }

    /// Build the operators from depth 0 (the given finest operator, or the
    /// factory's) down to `max_depth`, or until the factory returns `None`
    /// when `max_depth` is -1. Any previous definition and its buffers are
    /// discarded.
    ///
    pub fn define<F>(
        &mut self,
        factory: &F,
        bottom_solver: Option<Box<dyn LinearSolver<T, Op>>>,
        domain: &ProblemDomain,
        max_depth: i32,
        finest_op: Option<Op>)
    where
        F: MgLevelOpFactory<T, Op = Op>
    {
        self.define_depths(factory, bottom_solver, domain, max_depth, finest_op, true)
    }

    pub(crate) fn define_depths<F>(
        &mut self,
        factory: &F,
        bottom_solver: Option<Box<dyn LinearSolver<T, Op>>>,
        domain: &ProblemDomain,
        max_depth: i32,
        finest_op: Option<Op>,
        homogeneous_only: bool)
    where
        F: MgLevelOpFactory<T, Op = Op>
    {
        assert!(max_depth >= -1, "MultiGrid::define - max depth must be -1 or more");

        let finest = match finest_op.or_else(|| factory.mg_new_op(domain, 0, false)) {
            Some(op) => op,
            None => panic!("MultiGrid::define - the factory has no operator over {:?}", domain.space()),
        };
        let mut ops = vec![finest];

        while max_depth == -1 || ops.len() <= max_depth as usize {
            match factory.mg_new_op(domain, ops.len(), homogeneous_only) {
                Some(op) => ops.push(op),
                None => break,
            }
        }

        self.ops = ops;
        self.correction = Vec::new();
        self.residual = Vec::new();
        self.bottom_solver = bottom_solver;
        self.state = MultiGridState::Defined;

        if let Some(solver) = self.bottom_solver.as_mut() {
            solver.set_homogeneous(true)
        }
    }

    fn check_defined(&self) {
        if self.state != MultiGridState::Defined {
            panic!("MultiGrid - solver used before define")
        }
    }

    /// Allocate the per-depth buffers, shaped like `phi` at depth 0, if this
    /// has not been done since `define`.
    ///
    pub fn init(&mut self, phi: &T, rhs: &T) {
        self.check_defined();

        if !self.correction.is_empty() {
            return;
        }
        let mut correction = vec![self.ops[0].create(phi)];
        let mut residual = vec![self.ops[0].create(rhs)];

        for depth in 1..self.ops.len() {
            let c = self.ops[depth - 1].create_coarser(&correction[depth - 1], true);
            let r = self.ops[depth - 1].create_coarser(&residual[depth - 1], false);
            correction.push(c);
            residual.push(r);
        }
        self.correction = correction;
        self.residual = residual;
    }

    /// Run one cycle on `L(e) = res`. With homogeneous boundary conditions
    /// the cycle runs on `e` directly; otherwise the residual of `e` is
    /// formed, a correction is cycled on, and added to `e`.
    ///
    pub fn one_cycle(&mut self, e: &mut T, res: &T) {
        self.init(e, res);

        let schedule = self.schedule();
        let (c0, corrections) = split(&mut self.correction);
        let (r0, residuals) = split(&mut self.residual);

        if self.homogeneous {
            cycle(&schedule, &self.ops, corrections, residuals, e, res, &mut self.bottom_solver);
        } else {
            self.ops[0].residual(r0, e, res, false);
            self.ops[0].set_to_zero(c0);
            cycle(&schedule, &self.ops, corrections, residuals, c0, r0, &mut self.bottom_solver);
            self.ops[0].incr(e, c0, 1.0);
        }
    }

    /// Iterate cycles on `L(phi) = rhs` from the given initial guess, until
    /// the max norm of the residual is below `tolerance` times its initial
    /// value (or 1e-16), or `max_iterations` cycles have run.
    ///
    pub fn solve(&mut self, phi: &mut T, rhs: &T, tolerance: f64, max_iterations: usize, verbosity: i32) -> SolveReport {
        self.init(phi, rhs);

        let schedule = self.schedule();
        let homogeneous = self.homogeneous;
        let ops = &self.ops;
        let op = &ops[0];
        let (c0, corrections) = split(&mut self.correction);
        let (r0, residuals) = split(&mut self.residual);

        op.residual(r0, phi, rhs, homogeneous);

        let initial = op.norm(r0, 0);
        let target = (tolerance * initial).max(RESIDUAL_FLOOR);
        let mut error = initial;
        let mut iter = 0;

        if verbosity > 2 {
            info!("MultiGrid::solve - initial residual {:.6e}", initial);
        }
        while error > target && iter < max_iterations {
            op.set_to_zero(c0);
            cycle(&schedule, ops, corrections, residuals, c0, r0, &mut self.bottom_solver);
            op.incr(phi, c0, 1.0);
            op.residual(r0, phi, rhs, homogeneous);
            error = op.norm(r0, 0);
            iter += 1;

            if verbosity > 3 {
                debug!("MultiGrid::solve - iter {}, residual {:.6e}", iter, error);
            }
        }
        if verbosity > 2 {
            info!("MultiGrid::solve - final residual {:.6e} after {} iterations", error, iter);
        }
        if error > target && verbosity > 0 {
            warn!("MultiGrid::solve - not converged: residual {:.6e}, target {:.6e}", error, target);
        }
        SolveReport { iterations: iter, initial_residual: initial, final_residual: error }
    }
}

pub(crate) fn split<T>(buffers: &mut [T]) -> (&mut T, &mut [T]) {
    match buffers.split_first_mut() {
        Some(pair) => pair,
        None => panic!("MultiGrid - buffers are not allocated"),
    }
}

/// The recursive correction cycle at the depth of `ops[0]`. The buffers
/// hold the correction and residual of the depths below, starting with the
/// next one.
///
fn cycle<T, Op: MgLevelOp<T>>(
    schedule: &Schedule,
    ops: &[Op],
    corrections: &mut [T],
    residuals: &mut [T],
    e: &mut T,
    res: &T,
    bottom_solver: &mut Option<Box<dyn LinearSolver<T, Op>>>)
{
    let (op, coarser) = match ops.split_first() {
        Some(pair) => pair,
        None => panic!("MultiGrid::cycle - no operator at this depth"),
    };

    if coarser.is_empty() {
        match bottom_solver {
            Some(solver) => solver.solve(op, e, res),
            None => op.relax(e, res, schedule.bottom),
        }
        return;
    }
    let visits = schedule.visits("MultiGrid");
    let (e_coarse, corrections) = split(corrections);
    let (r_coarse, residuals) = split(residuals);

    op.relax(e, res, schedule.pre);
    op.restrict_residual(r_coarse, e, None, res, true);
    coarser[0].set_to_zero(e_coarse);

    for _ in 0..visits {
        cycle(schedule, coarser, corrections, residuals, e_coarse, r_coarse, bottom_solver);
    }
    op.prolong_increment(e, e_coarse);
    op.relax(e, res, schedule.post);
}
