use std::sync::Arc;
use log::debug;
use crate::bc::{BcHolder, EbBc};
use crate::eb::EbIndexSpace;
use crate::layout::DisjointBoxLayout;
use crate::level_geometry::LevelGeometry;
use crate::problem_domain::ProblemDomain;
use crate::solver::MgLevelOpFactory;
use super::data::EbLevelData;
use super::op::EbPoissonOp;




/// Builds `EbPoissonOp`s over an AMR hierarchy of level geometries, ordered
/// from the coarsest level. The levels are told apart by their domains.
///
#[derive(Clone, Debug)]
pub struct EbPoissonOpFactory {
    levels: Vec<Arc<LevelGeometry>>,
    alpha: f64,
    beta: f64,
    bc: BcHolder,
    eb_bc: EbBc,
}




// ============================================================================
impl EbPoissonOpFactory {

    /// # Panics
    ///
    /// If the hierarchy is empty, or a level is not linked to the one below
    /// it.
    ///
    pub fn new(levels: Vec<Arc<LevelGeometry>>, alpha: f64, beta: f64, bc: BcHolder, eb_bc: EbBc) -> Self {
        if levels.is_empty() {
            panic!("EbPoissonOpFactory::new - the hierarchy has no levels")
        }
        for pair in levels.windows(2) {
            let ratio = match pair[1].coarse_link() {
                Some(link) => link.ratio,
                None => panic!("EbPoissonOpFactory::new - a fine level has no link to its coarser level"),
            };
            if pair[1].layout().domain().coarsen_by(ratio) != *pair[0].layout().domain() {
                panic!("EbPoissonOpFactory::new - level domains do not differ by the refinement ratio {}", ratio)
            }
        }
        Self { levels, alpha, beta, bc, eb_bc }
    }

    /// Build the geometry of an AMR hierarchy from one layout per level,
    /// coarsest first, each refined by `ratio` from the one before.
    ///
    pub fn hierarchy(layouts: Vec<Arc<DisjointBoxLayout>>, ebis: Arc<EbIndexSpace>, ghost: i64, ratio: i64) -> Vec<Arc<LevelGeometry>> {
        layouts
            .into_iter()
            .enumerate()
            .map(|(l, layout)| {
                let link = if l == 0 { None } else { Some(ratio) };
                Arc::new(LevelGeometry::new(layout, ebis.clone(), ghost, link))
            })
            .collect()
    }

    pub fn levels(&self) -> &[Arc<LevelGeometry>] {
        &self.levels
    }

    fn level_of(&self, domain: &ProblemDomain) -> Option<usize> {
        self.levels.iter().position(|g| g.layout().domain() == domain)
    }

    fn op(&self, geom: Arc<LevelGeometry>) -> EbPoissonOp {
        EbPoissonOp::new(geom, self.alpha, self.beta, self.bc.clone(), self.eb_bc)
    }
}

impl MgLevelOpFactory<EbLevelData> for EbPoissonOpFactory {
    type Op = EbPoissonOp;

    fn mg_new_op(&self, domain: &ProblemDomain, depth: usize, _homogeneous_only: bool) -> Option<EbPoissonOp> {
        let mut geom = self.levels[self.level_of(domain)?].clone();

        for d in 0..depth {
            geom = match geom.coarser() {
                Some(g) => g,
                None => {
                    debug!("EbPoissonOpFactory - no multigrid depth {} below {:?}", d + 1, domain.space());
                    return None;
                }
            };
        }
        Some(self.op(geom))
    }

    fn amr_new_op(&self, domain: &ProblemDomain) -> Option<EbPoissonOp> {
        self.level_of(domain).map(|l| self.op(self.levels[l].clone()))
    }

    fn ref_to_finer(&self, domain: &ProblemDomain) -> Option<i64> {
        let l = self.level_of(domain)?;
        self.levels.get(l + 1).and_then(|g| g.coarse_link()).map(|link| link.ratio)
    }
}
