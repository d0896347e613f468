use std::sync::Arc;
use log::{info, warn};
use crate::index_space::{Axis, IndexSpace, Side};
use crate::problem_domain::ProblemDomain;
use super::data::VofData;
use super::graph::{CoarseningPolicy, EbGraph};
use super::implicit::ImplicitFunction;
use super::index::{CellKind, FaceIndex, VolIndex};




/// The geometry of one level of the index space: a graph over the whole
/// problem domain and the cell size of the level.
///
#[derive(Debug)]
pub struct EbisLevel {
    pub domain: ProblemDomain,
    pub dx: f64,
    pub graph: EbGraph,
}




/// The embedded-boundary geometry at every level, from the finest domain
/// down to the coarsest domain reachable by factors of two. Level 0 is the
/// finest. Levels are immutable and shared.
///
#[derive(Debug)]
pub struct EbIndexSpace {
    levels: Vec<Arc<EbisLevel>>,
    policy: CoarseningPolicy,
}




// ============================================================================
impl EbIndexSpace {

    /// Generate the finest level from an implicit function and coarsen it as
    /// far as the domain allows. `max_coarsenings` bounds the number of
    /// coarser levels, if given. Coarsening stops early (with a warning) if
    /// the policy rejects a level.
    ///
    pub fn new(
        domain: ProblemDomain,
        dx: f64,
        function: &dyn ImplicitFunction,
        policy: CoarseningPolicy,
        max_coarsenings: Option<usize>) -> Self
    {
        let graph = EbGraph::from_implicit(&domain, dx, function);
        Self::from_graph(graph, dx, policy, max_coarsenings)
    }

    /// Build the coarser levels of an existing finest graph.
    ///
    pub fn from_graph(
        graph: EbGraph,
        dx: f64,
        policy: CoarseningPolicy,
        max_coarsenings: Option<usize>) -> Self
    {
        let mut levels = vec![Arc::new(EbisLevel { domain: graph.domain().clone(), dx, graph })];

        while max_coarsenings.map_or(true, |m| levels.len() <= m) {
            let finer = &levels[levels.len() - 1];

            if !finer.domain.is_coarsenable(2) {
                break;
            }
            match finer.graph.coarsen(policy) {
                Ok(graph) => {
                    let dx = finer.dx * 2.0;
                    levels.push(Arc::new(EbisLevel { domain: graph.domain().clone(), dx, graph }))
                }
                Err(e) => {
                    warn!("EbIndexSpace - coarsening stopped after {} levels: {}", levels.len(), e);
                    break;
                }
            }
        }
        info!("EbIndexSpace - built {} levels, coarsest domain {:?}", levels.len(), levels[levels.len() - 1].domain.space());

        Self { levels, policy }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, n: usize) -> &Arc<EbisLevel> {
        &self.levels[n]
    }

    pub fn policy(&self) -> CoarseningPolicy {
        self.policy
    }

    pub fn finest_domain(&self) -> &ProblemDomain {
        &self.levels[0].domain
    }

    /// Return the level whose domain box equals the given domain's box.
    ///
    pub fn level_of(&self, domain: &ProblemDomain) -> Option<usize> {
        self.levels.iter().position(|l| l.domain.space() == domain.space())
    }

    /// Coarsen a volume from level `level` by a power-of-two ratio.
    ///
    pub fn coarsen(&self, level: usize, vof: VolIndex, ratio: i64) -> VolIndex {
        let mut vof = vof;
        for n in level + 1..=level + steps(ratio) {
            vof = self.levels[n].graph.coarse_vof(vof)
        }
        vof
    }

    /// Refine a volume from level `level` by a power-of-two ratio.
    ///
    pub fn refine(&self, level: usize, vof: VolIndex, ratio: i64) -> Vec<VolIndex> {
        let mut vofs = vec![vof];
        for n in (level + 1 - steps(ratio)..=level).rev() {
            vofs = vofs.iter().flat_map(|v| self.levels[n].graph.fine_vofs(*v)).collect();
        }
        vofs
    }
}

/// Return log2 of a ratio that must be a positive power of two.
///
pub(crate) fn steps(ratio: i64) -> usize {
    if ratio < 1 || ratio & (ratio - 1) != 0 {
        panic!("EbIndexSpace - ratio {} is not a power of two", ratio)
    }
    ratio.trailing_zeros() as usize
}




/// A view of one level of the index space restricted to a region (a layout
/// box grown by its ghost cells). All queries take cells inside the region.
///
#[derive(Clone, Debug)]
pub struct EbisBox {
    level: Arc<EbisLevel>,
    region: IndexSpace,
}




// ============================================================================
impl EbisBox {

    pub fn new(level: Arc<EbisLevel>, region: IndexSpace) -> Self {
        Self { level, region }
    }

    pub fn region(&self) -> &IndexSpace {
        &self.region
    }

    pub fn domain(&self) -> &ProblemDomain {
        &self.level.domain
    }

    pub fn graph(&self) -> &EbGraph {
        &self.level.graph
    }

    fn check(&self, cell: (i64, i64)) {
        if !self.region.contains(cell) {
            panic!("EbisBox - cell ({} {}) is outside the region {:?}", cell.0, cell.1, self.region)
        }
    }

    /// Classify a cell of the region. Cells outside the domain along a
    /// non-periodic axis are reported as covered.
    ///
    pub fn classify(&self, cell: (i64, i64)) -> CellKind {
        self.check(cell);
        if self.level.domain.image(cell).is_none() {
            return CellKind::Covered;
        }
        self.level.graph.classify(cell)
    }

    pub fn vofs(&self, cell: (i64, i64)) -> Vec<VolIndex> {
        match self.classify(cell) {
            CellKind::Covered => Vec::new(),
            _ => self.level.graph.vofs_in(cell),
        }
    }

    pub fn contains_vof(&self, vof: VolIndex) -> bool {
        self.region.contains(vof.cell) && self.level.graph.contains_vof(vof)
    }

    pub fn is_multi_valued(&self, cell: (i64, i64)) -> bool {
        self.check(cell);
        self.level.graph.is_multi_valued(cell)
    }

    pub fn is_regular(&self, cell: (i64, i64)) -> bool {
        self.classify(cell) == CellKind::Regular
    }

    /// Determine whether every cell of the region inside the domain is
    /// regular.
    ///
    pub fn is_all_regular(&self) -> bool {
        self.level.graph.is_regular_region(&self.region)
    }

    pub fn irregular_cells(&self, region: &IndexSpace) -> Vec<(i64, i64)> {
        match region.intersect(&self.region) {
            Some(r) => self.level.graph.irregular_cells(&r),
            None => Vec::new(),
        }
    }

    pub fn faces(&self, vof: VolIndex, axis: Axis, side: Side) -> Vec<FaceIndex> {
        self.check(vof.cell);
        self.level.graph.faces(vof, axis, side)
    }

    pub fn area_fraction(&self, face: &FaceIndex) -> f64 {
        self.level.graph.area_fraction(face)
    }

    pub fn vof_data(&self, vof: VolIndex) -> VofData {
        self.check(vof.cell);
        self.level.graph.vof_data(vof)
    }

    pub fn volume_fraction(&self, vof: VolIndex) -> f64 {
        self.vof_data(vof).volume_fraction
    }

    pub fn boundary_area(&self, vof: VolIndex) -> f64 {
        self.vof_data(vof).boundary_area
    }

    pub fn normal(&self, vof: VolIndex) -> [f64; 2] {
        self.vof_data(vof).normal
    }

    pub fn centroid(&self, vof: VolIndex) -> [f64; 2] {
        self.vof_data(vof).centroid
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use approx::assert_relative_eq;
    use crate::eb::graph::CoarseningPolicy;
    use crate::eb::implicit::{AllRegular, Circle, Complement};
    use crate::eb::index::{CellKind, VolIndex};
    use crate::index_space::range2d;
    use crate::problem_domain::ProblemDomain;
    use super::{EbIndexSpace, EbisBox};

    fn obstacle(n: i64) -> EbIndexSpace {
        let domain = ProblemDomain::non_periodic(range2d(0..n, 0..n));
        let circle = Complement(Circle { center: [0.5, 0.5], radius: 0.25 });
        EbIndexSpace::new(domain, 1.0 / n as f64, &circle, CoarseningPolicy::SplitComponents, None)
    }

    #[test]
    fn levels_reach_the_coarsest_domain() {
        let ebis = obstacle(32);
        assert_eq!(ebis.num_levels(), 6);
        assert_eq!(ebis.level(5).domain.space(), &range2d(0..1, 0..1));
        assert_relative_eq!(ebis.level(2).dx, 1.0 / 8.0);
        assert_eq!(ebis.level_of(&ProblemDomain::non_periodic(range2d(0..8, 0..8))), Some(2));
    }

    #[test]
    fn max_coarsenings_bounds_the_levels() {
        let domain = ProblemDomain::non_periodic(range2d(0..16, 0..16));
        let ebis = EbIndexSpace::new(domain, 1.0 / 16.0, &AllRegular, CoarseningPolicy::default(), Some(2));
        assert_eq!(ebis.num_levels(), 3);
    }

    #[test]
    fn multi_level_round_trip() {
        let ebis = obstacle(32);
        let graph = &ebis.level(0).graph;

        for cell in graph.irregular_cells(&range2d(0..32, 0..32)) {
            for vof in graph.vofs_in(cell) {
                let coarse = ebis.coarsen(0, vof, 4);
                assert_eq!(coarse.cell, (cell.0.div_euclid(4), cell.1.div_euclid(4)));
                assert!(ebis.refine(2, coarse, 4).contains(&vof));
            }
        }
    }

    #[test]
    fn box_view_reports_outside_cells_as_covered() {
        let ebis = obstacle(8);
        let view = EbisBox::new(ebis.level(0).clone(), range2d(-1..5, -1..5));
        assert_eq!(view.classify((-1, 0)), CellKind::Covered);
        assert!(view.vofs((-1, 0)).is_empty());
        assert_eq!(view.vofs((0, 0)), vec![VolIndex::new((0, 0), 0)]);
        assert!(!view.is_all_regular());
    }
}
