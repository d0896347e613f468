use log::{debug, info, warn};
use crate::parameters::AmrParameters;
use crate::problem_domain::ProblemDomain;
use super::level_op::{LevelShape, MgLevelOp, MgLevelOpFactory};
use super::multigrid::{split, MultiGrid, MultiGridState, Schedule, SolveReport, RESIDUAL_FLOOR};




/// Full approximation scheme multigrid, for operators that may be
/// nonlinear. Each depth relaxes the full solution rather than a
/// correction; the coarse problem is `L_c(phi_c) = R(rhs - L(phi)) +
/// L_c(R phi)`, and the change in the coarse solution over the cycle is
/// interpolated back as the correction.
///
/// Coarse-fine boundary values come from the solution on the next coarser
/// AMR level, which is restricted along with the hierarchy.
///
pub struct FasMultiGrid<T, Op> {
    mg: MultiGrid<T, Op>,
    /// Coarse solutions and coarse `L_c(R phi)`, for depths 1 and below.
    phi: Vec<T>,
    scratch: Vec<T>,
}




// ============================================================================
impl<T: LevelShape, Op: MgLevelOp<T>> Default for FasMultiGrid<T, Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LevelShape, Op: MgLevelOp<T>> FasMultiGrid<T, Op> {

    pub fn new() -> Self {
        let mut mg = MultiGrid::new();
        mg.homogeneous = false;
        Self { mg, phi: Vec::new(), scratch: Vec::new() }
    }

    pub fn state(&self) -> MultiGridState {
        self.mg.state()
    }

    pub fn num_depths(&self) -> usize {
        self.mg.num_depths()
    }

    pub fn set_solver_parameters(&mut self, pre: usize, post: usize, bottom: usize, cycles: i32) {
        self.mg.set_solver_parameters(pre, post, bottom, cycles)
    }

    pub fn set_from_parameters(&mut self, parameters: &AmrParameters) {
        self.mg.set_from_parameters(parameters)
    }

    /// Build the operator hierarchy like `MultiGrid::define`. Every depth
    /// solves the full problem, so no operator is homogeneous-only. The
    /// coarsest depth is relaxed rather than handed to a bottom solver.
    ///
    pub fn define<F>(&mut self, factory: &F, domain: &ProblemDomain, max_depth: i32, finest_op: Option<Op>)
    where
        F: MgLevelOpFactory<T, Op = Op>
    {
        self.mg.define_depths(factory, None, domain, max_depth, finest_op, false);
        self.mg.homogeneous = false;
        self.phi = Vec::new();
        self.scratch = Vec::new();
    }

    pub fn init(&mut self, phi: &T, rhs: &T) {
        self.mg.init(phi, rhs);

        if self.phi.len() + 1 == self.mg.ops.len() {
            return;
        }
        let ops = &self.mg.ops;
        let correction = &self.mg.correction;

        self.phi = (1..ops.len()).map(|d| ops[d - 1].create_coarser(&correction[d - 1], true)).collect();
        self.scratch = (1..ops.len()).map(|d| ops[d - 1].create_coarser(&correction[d - 1], false)).collect();
    }

    /// FAS cycles need the solution on the coarser AMR level for their
    /// boundary values; call `one_cycle_with_coarse`.
    ///
    pub fn one_cycle(&mut self, _phi: &mut T, _rhs: &T) {
        panic!("FasMultiGrid::one_cycle - not implemented without a coarse solution")
    }

    /// Run one cycle on `L(phi) = rhs`, updating `phi` in place. `phi_coarse`
    /// is the solution on the coarser AMR level, or `None` at the base of
    /// the hierarchy.
    ///
    pub fn one_cycle_with_coarse(&mut self, phi: &mut T, phi_coarse: Option<&T>, rhs: &T) {
        self.init(phi, rhs);

        let chain = self.coarse_chain(phi_coarse);
        let schedule = self.mg.schedule();
        let (_, residuals) = split(&mut self.mg.residual);

        cycle(
            &schedule,
            &self.mg.ops,
            &mut self.mg.correction,
            residuals,
            &mut self.phi,
            &mut self.scratch,
            phi_coarse,
            &chain,
            phi,
            rhs);
    }

    /// The coarser-level solution restricted to each depth below the
    /// first. A restriction which cannot be coarsened further, or whose
    /// domain has shrunk to a single cell, is dropped, and so are all below
    /// it.
    ///
    fn coarse_chain(&self, phi_coarse: Option<&T>) -> Vec<Option<T>> {
        let ops = &self.mg.ops;
        let mut chain: Vec<Option<T>> = Vec::with_capacity(ops.len().saturating_sub(1));

        for depth in 1..ops.len() {
            let finer = if depth == 1 { phi_coarse } else { chain[depth - 2].as_ref() };

            let next = finer.filter(|f| f.is_coarsenable()).and_then(|f| {
                let mut c = ops[depth - 1].create_coarser(f, true);
                ops[depth - 1].restrict_r(&mut c, f);

                if c.problem_domain().is_single_cell() {
                    debug!("FasMultiGrid - coarse solution dropped at depth {}", depth);
                    None
                } else {
                    Some(c)
                }
            });
            chain.push(next);
        }
        chain
    }

    /// `result = rhs - L(phi)` at the finest depth.
    ///
    fn residual_norm(&mut self, phi: &mut T, phi_coarse: Option<&T>, rhs: &T) -> f64 {
        let op = &self.mg.ops[0];
        let r = &mut self.mg.residual[0];

        op.apply_op_mg(r, phi, phi_coarse, false);
        op.scale(r, -1.0);
        op.incr(r, rhs, 1.0);
        op.norm(r, 0)
    }

    pub fn solve(&mut self, phi: &mut T, rhs: &T, tolerance: f64, max_iterations: usize, verbosity: i32) -> SolveReport {
        self.solve_with_coarse(phi, None, rhs, tolerance, max_iterations, verbosity)
    }

    /// Iterate FAS cycles from the given initial guess until the max norm
    /// of the residual drops below `tolerance` times its initial value (or
    /// 1e-16), or `max_iterations` cycles have run.
    ///
    pub fn solve_with_coarse(
        &mut self,
        phi: &mut T,
        phi_coarse: Option<&T>,
        rhs: &T,
        tolerance: f64,
        max_iterations: usize,
        verbosity: i32) -> SolveReport
    {
        self.init(phi, rhs);

        let initial = self.residual_norm(phi, phi_coarse, rhs);
        let target = (tolerance * initial).max(RESIDUAL_FLOOR);
        let mut error = initial;
        let mut iter = 0;

        if verbosity > 2 {
            info!("FasMultiGrid::solve - initial residual {:.6e}", initial);
        }
        while error > target && iter < max_iterations {
            self.one_cycle_with_coarse(phi, phi_coarse, rhs);
            error = self.residual_norm(phi, phi_coarse, rhs);
            iter += 1;

            if verbosity > 3 {
                debug!("FasMultiGrid::solve - iter {}, residual {:.6e}", iter, error);
            }
        }
        if verbosity > 2 {
            info!("FasMultiGrid::solve - final residual {:.6e} after {} iterations", error, iter);
        }
        if error > target && verbosity > 0 {
            warn!("FasMultiGrid::solve - not converged: residual {:.6e}, target {:.6e}", error, target);
        }
        SolveReport { iterations: iter, initial_residual: initial, final_residual: error }
    }
}

/// One FAS cycle at the depth of `ops[0]`. `corrections` start at this
/// depth; the coarse right-hand sides, solutions and scratch start at the
/// next. `here` is the coarser-level solution at this depth and `deeper`
/// holds it for the depths below.
///
#[allow(clippy::too_many_arguments)]
fn cycle<T, Op: MgLevelOp<T>>(
    schedule: &Schedule,
    ops: &[Op],
    corrections: &mut [T],
    residuals: &mut [T],
    phis: &mut [T],
    scratch: &mut [T],
    here: Option<&T>,
    deeper: &[Option<T>],
    phi: &mut T,
    rhs: &T)
{
    let (op, coarser) = match ops.split_first() {
        Some(pair) => pair,
        None => panic!("FasMultiGrid::cycle - no operator at this depth"),
    };
    let (correction, corrections) = split(corrections);

    // The correction starts as minus the initial solution.
    op.set_to_zero(correction);
    op.incr(correction, phi, -1.0);

    if coarser.is_empty() {
        op.relax_nf(phi, here, rhs, schedule.bottom);
        op.incr(correction, phi, 1.0);
        return;
    }
    let visits = schedule.visits("FasMultiGrid");
    let (rhs_coarse, residuals) = split(residuals);
    let (phi_coarse, phis) = split(phis);
    let (op_coarse, scratch) = split(scratch);
    let (next, deeper) = match deeper.split_first() {
        Some((next, deeper)) => (next.as_ref(), deeper),
        None => (None, deeper),
    };

    op.relax_nf(phi, here, rhs, schedule.pre);
    op.restrict_r(phi_coarse, phi);

    coarser[0].apply_op_mg(op_coarse, phi_coarse, next, false);
    op.restrict_residual(rhs_coarse, phi, here, rhs, false);
    coarser[0].incr(rhs_coarse, op_coarse, 1.0);
    coarser[0].assign(op_coarse, phi_coarse);

    for _ in 0..visits {
        cycle(schedule, coarser, corrections, residuals, phis, scratch, next, deeper, phi_coarse, rhs_coarse);
    }
    // The coarse correction is the change in the coarse solution over all
    // visits; `op_coarse` holds the restricted solution.
    coarser[0].axby(&mut corrections[0], phi_coarse, op_coarse, 1.0, -1.0);
    op.prolong_increment(phi, &mut corrections[0]);
    op.relax_nf(phi, here, rhs, schedule.post);
    op.incr(correction, phi, 1.0);
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use approx::assert_relative_eq;
    use crate::eb::{AllRegular, CoarseningPolicy, EbIndexSpace, VolIndex};
    use crate::index_space::range2d;
    use crate::layout::DisjointBoxLayout;
    use crate::message::SerialCommunicator;
    use crate::poisson::testing::{laplacian, sine_rhs, unit_square};
    use crate::poisson::{EbLevelData, EbPoissonOp, EbPoissonOpFactory};
    use crate::problem_domain::ProblemDomain;
    use crate::solver::{DirectSolver, LevelShape, MultiGrid};
    use super::FasMultiGrid;

    #[test]
    fn fas_and_correction_cycles_agree_on_a_linear_problem() {
        let geom = unit_square(16, 8, &AllRegular);
        let factory = laplacian(vec![geom.clone()]);
        let domain = geom.layout().domain().clone();
        let rhs = sine_rhs(geom.clone());

        let mut fas = FasMultiGrid::new();
        fas.define(&factory, &domain, -1, None);
        let mut phi_fas = EbLevelData::new(geom.clone());
        let report = fas.solve(&mut phi_fas, &rhs, 1e-10, 40, 0);
        assert!(report.reduction() < 1e-9);

        let mut mg = MultiGrid::new();
        mg.define(&factory, Some(Box::new(DirectSolver::new())), &domain, 1, None);
        mg.homogeneous = false;
        let mut phi_mg = EbLevelData::new(geom.clone());
        mg.solve(&mut phi_mg, &rhs, 1e-10, 40, 0);

        for cell in domain.space().iter() {
            let n = geom.layout().find(cell).unwrap();
            let vof = VolIndex::new(cell, 0);
            assert_relative_eq!(phi_fas.get(n, vof), phi_mg.get(n, vof), epsilon = 1e-8);
        }
    }

    #[test]
    fn w_cycles_converge_no_slower_than_v_cycles() {
        let geom = unit_square(32, 8, &AllRegular);
        let factory = laplacian(vec![geom.clone()]);
        let domain = geom.layout().domain().clone();
        let rhs = sine_rhs(geom.clone());

        let run = |cycles: i32| {
            let mut fas = FasMultiGrid::new();
            fas.define(&factory, &domain, -1, None);
            fas.set_solver_parameters(2, 2, 40, cycles);
            let mut phi = EbLevelData::new(geom.clone());
            let report = fas.solve(&mut phi, &rhs, 1e-10, 40, 0);
            (report, phi)
        };
        let (v_report, v_phi) = run(1);
        let (w_report, w_phi) = run(2);

        assert!(w_report.reduction() < 1e-9);
        assert!(w_report.iterations <= v_report.iterations);

        for cell in domain.space().iter() {
            let n = geom.layout().find(cell).unwrap();
            let vof = VolIndex::new(cell, 0);
            assert_relative_eq!(w_phi.get(n, vof), v_phi.get(n, vof), epsilon = 1e-8);
        }
    }

    #[test]
    #[should_panic(expected = "FasMultiGrid::cycle - non-V cycle options not implemented")]
    fn negative_cycle_counts_are_rejected() {
        let geom = unit_square(16, 8, &AllRegular);
        let factory = laplacian(vec![geom.clone()]);
        let mut fas = FasMultiGrid::new();
        fas.define(&factory, geom.layout().domain(), -1, None);
        fas.set_solver_parameters(2, 2, 40, -1);

        let rhs = sine_rhs(geom.clone());
        let mut phi = EbLevelData::new(geom);
        fas.solve(&mut phi, &rhs, 1e-10, 4, 0);
    }

    #[test]
    fn coarse_solution_is_dropped_once_it_reaches_a_single_cell() {
        let fine_domain = ProblemDomain::non_periodic(range2d(0..8, 0..8));
        let ebis = Arc::new(EbIndexSpace::new(fine_domain.clone(), 1.0 / 8.0, &AllRegular, CoarseningPolicy::default(), None));
        let comm = Arc::new(SerialCommunicator);
        let layouts = vec![
            Arc::new(DisjointBoxLayout::single(fine_domain.coarsen_by(2), comm.clone())),
            Arc::new(DisjointBoxLayout::single(fine_domain.clone(), comm)),
        ];
        let levels = EbPoissonOpFactory::hierarchy(layouts, ebis, 1, 2);
        let factory = laplacian(levels.clone());
        let phi_coarse = EbLevelData::new(levels[0].clone());

        let mut fas: FasMultiGrid<EbLevelData, EbPoissonOp> = FasMultiGrid::new();
        fas.define(&factory, &fine_domain, -1, None);
        let chain = fas.coarse_chain(Some(&phi_coarse));

        assert_eq!(chain.len(), fas.num_depths() - 1);
        assert_eq!(chain[0].as_ref().map(|c| c.problem_domain().space().clone()), Some(range2d(0..2, 0..2)));
        assert!(chain[1..].iter().all(Option::is_none));
    }

    #[test]
    #[should_panic(expected = "not implemented without a coarse solution")]
    fn one_cycle_requires_the_coarse_solution() {
        let geom = unit_square(8, 8, &AllRegular);
        let factory = laplacian(vec![geom.clone()]);
        let mut fas = FasMultiGrid::new();
        fas.define(&factory, geom.layout().domain(), -1, None);

        let rhs = sine_rhs(geom.clone());
        let mut phi = EbLevelData::new(geom);
        fas.one_cycle(&mut phi, &rhs);
    }
}
