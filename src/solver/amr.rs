use log::info;
use crate::parameters::AmrParameters;
use crate::problem_domain::ProblemDomain;
use super::fas::FasMultiGrid;
use super::level_op::{AmrLevelOp, LevelShape, MgLevelOpFactory};
use super::multigrid::SolveReport;




/// Solves an elliptic problem over an AMR hierarchy, one level at a time
/// from the coarsest. Each level is solved by FAS multigrid with the
/// solution of the level below supplying its coarse-fine boundary values;
/// the fine solutions are then averaged down onto the coarse cells they
/// cover. No refluxing is done.
///
pub struct AmrMultiGrid<T, Op> {
    solvers: Vec<FasMultiGrid<T, Op>>,
    ops: Vec<Op>,
    parameters: Option<AmrParameters>,
}




// ============================================================================
impl<T: LevelShape, Op: AmrLevelOp<T>> Default for AmrMultiGrid<T, Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LevelShape, Op: AmrLevelOp<T>> AmrMultiGrid<T, Op> {

    pub fn new() -> Self {
        Self { solvers: Vec::new(), ops: Vec::new(), parameters: None }
    }

    pub fn num_levels(&self) -> usize {
        self.ops.len()
    }

    pub fn set_from_parameters(&mut self, parameters: &AmrParameters) {
        for solver in &mut self.solvers {
            solver.set_from_parameters(parameters)
        }
        self.parameters = Some(parameters.clone())
    }

    /// Define one FAS solver per level over `domains`, coarsest first.
    ///
    /// # Panics
    ///
    /// If the factory has no operator for a domain, or the refinement
    /// ratios it reports disagree with the operators'.
    ///
    pub fn define<F>(&mut self, factory: &F, domains: &[ProblemDomain], max_depth: i32)
    where
        F: MgLevelOpFactory<T, Op = Op>
    {
        let new_op = |domain: &ProblemDomain| match factory.amr_new_op(domain) {
            Some(op) => op,
            None => panic!("AmrMultiGrid::define - the factory has no operator over {:?}", domain.space()),
        };
        self.ops = domains.iter().map(new_op).collect();
        self.solvers = domains.iter().map(|domain| {
            let mut solver = FasMultiGrid::new();
            solver.define(factory, domain, max_depth, Some(new_op(domain)));

            if let Some(parameters) = &self.parameters {
                solver.set_from_parameters(parameters)
            }
            solver
        }).collect();

        for l in 1..domains.len() {
            if factory.ref_to_finer(&domains[l - 1]) != Some(self.ops[l].ref_to_coarser()) {
                panic!("AmrMultiGrid::define - refinement ratio mismatch between levels {} and {}", l - 1, l)
            }
        }
    }

    /// Solve every level in turn, then average the fine solutions down.
    /// Returns the report of each level, coarsest first.
    ///
    pub fn solve(&mut self, phi: &mut [T], rhs: &[T], tolerance: f64, max_iterations: usize, verbosity: i32) -> Vec<SolveReport> {
        assert_eq!(phi.len(), self.ops.len(), "AmrMultiGrid::solve - one solution per level is required");
        assert_eq!(rhs.len(), self.ops.len(), "AmrMultiGrid::solve - one right-hand side per level is required");

        let mut reports = Vec::with_capacity(phi.len());

        for (l, solver) in self.solvers.iter_mut().enumerate() {
            let (coarser, finer) = phi.split_at_mut(l);
            let report = solver.solve_with_coarse(&mut finer[0], coarser.last(), &rhs[l], tolerance, max_iterations, verbosity);

            if verbosity > 2 {
                info!("AmrMultiGrid::solve - level {}: {} iterations, residual {:.6e}", l, report.iterations, report.final_residual);
            }
            reports.push(report);
        }
        for l in (1..phi.len()).rev() {
            let (coarser, finer) = phi.split_at_mut(l);
            self.ops[l].average_down(&mut coarser[l - 1], &finer[0]);
        }
        reports
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use approx::assert_relative_eq;
    use crate::eb::{AllRegular, CoarseningPolicy, EbIndexSpace, VolIndex};
    use crate::index_space::range2d;
    use crate::layout::DisjointBoxLayout;
    use crate::level_geometry::LevelGeometry;
    use crate::message::SerialCommunicator;
    use crate::parameters::AmrParameters;
    use crate::poisson::testing::{laplacian, sine_rhs};
    use crate::poisson::{EbLevelData, EbPoissonOp, EbPoissonOpFactory};
    use crate::problem_domain::ProblemDomain;
    use super::AmrMultiGrid;

    fn two_levels() -> Vec<Arc<LevelGeometry>> {
        let fine_domain = ProblemDomain::non_periodic(range2d(0..32, 0..32));
        let ebis = Arc::new(EbIndexSpace::new(fine_domain.clone(), 1.0 / 32.0, &AllRegular, CoarseningPolicy::default(), None));
        let comm = Arc::new(SerialCommunicator);
        let patch = [
            range2d(8..16, 8..16),
            range2d(16..24, 8..16),
            range2d(8..16, 16..24),
            range2d(16..24, 16..24),
        ];
        let layouts = vec![
            Arc::new(DisjointBoxLayout::uniform(fine_domain.coarsen_by(2), 8, comm.clone())),
            Arc::new(DisjointBoxLayout::new(fine_domain, patch.to_vec(), vec![0; 4], comm)),
        ];
        EbPoissonOpFactory::hierarchy(layouts, ebis, 1, 2)
    }

    fn value(data: &EbLevelData, cell: (i64, i64)) -> f64 {
        let n = data.geometry().layout().find(cell).unwrap();
        data.get(n, VolIndex::new(cell, 0))
    }

    #[test]
    fn cascade_solves_each_level_and_averages_down() {
        let levels = two_levels();
        let factory = laplacian(levels.clone());
        let domains: Vec<_> = levels.iter().map(|g| g.layout().domain().clone()).collect();

        let mut amr: AmrMultiGrid<EbLevelData, EbPoissonOp> = AmrMultiGrid::new();
        amr.set_from_parameters(&AmrParameters::default());
        amr.define(&factory, &domains, -1);
        assert_eq!(amr.num_levels(), 2);

        let rhs: Vec<_> = levels.iter().map(|g| sine_rhs(g.clone())).collect();
        let mut phi: Vec<_> = levels.iter().map(|g| EbLevelData::new(g.clone())).collect();
        let reports = amr.solve(&mut phi, &rhs, 1e-8, 50, 0);

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.reduction() < 1e-7));

        let fine: f64 = [(10, 10), (11, 10), (10, 11), (11, 11)].iter().map(|&c| value(&phi[1], c)).sum();
        assert_relative_eq!(value(&phi[0], (5, 5)), fine / 4.0, epsilon = 1e-14);
        assert!(value(&phi[0], (1, 1)) > 0.0);
    }

    #[test]
    #[should_panic(expected = "has no operator")]
    fn define_rejects_unknown_domains() {
        let levels = two_levels();
        let factory = laplacian(levels);
        let other = ProblemDomain::non_periodic(range2d(0..64, 0..64));

        let mut amr: AmrMultiGrid<EbLevelData, EbPoissonOp> = AmrMultiGrid::new();
        amr.define(&factory, &[other], -1);
    }
}
