//! A variable-geometry Poisson (Helmholtz) operator on embedded boundary
//! levels, with its level data type and factory. This is the concrete
//! discretization the multigrid engine is exercised with.

pub mod data;
pub mod factory;
pub mod op;

pub use data::EbLevelData;
pub use factory::EbPoissonOpFactory;
pub use op::EbPoissonOp;




#[cfg(test)]
pub(crate) mod testing {

    use std::f64::consts::PI;
    use std::sync::Arc;
    use crate::bc::{BcHolder, DomainBc, EbBc};
    use crate::eb::{CoarseningPolicy, EbIndexSpace, ImplicitFunction};
    use crate::index_space::range2d;
    use crate::layout::DisjointBoxLayout;
    use crate::level_geometry::LevelGeometry;
    use crate::message::SerialCommunicator;
    use crate::problem_domain::ProblemDomain;
    use super::{EbLevelData, EbPoissonOpFactory};

    pub fn unit_square(size: i64, block: i64, function: &dyn ImplicitFunction) -> Arc<LevelGeometry> {
        let domain = ProblemDomain::non_periodic(range2d(0..size, 0..size));
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / size as f64, function, CoarseningPolicy::default(), None));
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, block, Arc::new(SerialCommunicator)));
        Arc::new(LevelGeometry::new(layout, ebis, 1, None))
    }

    pub fn laplacian(levels: Vec<Arc<LevelGeometry>>) -> EbPoissonOpFactory {
        EbPoissonOpFactory::new(levels, 0.0, 1.0, BcHolder::from(DomainBc::dirichlet(0.0)), EbBc::Dirichlet(0.0))
    }

    /// The right-hand side whose continuous solution is `sin(pi x) sin(pi y)`.
    pub fn sine_rhs(geom: Arc<LevelGeometry>) -> EbLevelData {
        let mut rhs = EbLevelData::from_function(geom, |[x, y]| -2.0 * PI * PI * (PI * x).sin() * (PI * y).sin());
        rhs.scale_by_volume_fraction();
        rhs
    }
}
