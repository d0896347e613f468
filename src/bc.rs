use std::fmt;
use std::sync::Arc;
use crate::grid_array::GridArray;
use crate::index_space::{Axis, IndexSpace, Side};
use crate::level_data::LevelData;
use crate::problem_domain::ProblemDomain;




/// Plain function form of a domain boundary condition: fill the ghost cells
/// of `state` outside `valid` which lie across a physical domain boundary.
pub type BcFunc = fn(state: &mut GridArray, valid: &IndexSpace, domain: &ProblemDomain, dx: f64, homogeneous: bool);




/// Object form of a domain boundary condition. The box index of the state
/// within its layout is passed along for conditions that depend on it.
///
/// Called with `homogeneous = true`, an implementation must fill the ghost
/// cells as if the boundary data were zero, and have no other effects.
///
pub trait BcFunction: Send + Sync {
    fn apply(
        &self,
        state: &mut GridArray,
        valid: &IndexSpace,
        domain: &ProblemDomain,
        dx: f64,
        homogeneous: bool,
        index: usize);
}




/// Holds either form of domain boundary condition.
///
#[derive(Clone)]
pub enum BcHolder {
    Func(BcFunc),
    Function(Arc<dyn BcFunction>),
}

impl BcHolder {
    pub fn apply(
        &self,
        state: &mut GridArray,
        valid: &IndexSpace,
        domain: &ProblemDomain,
        dx: f64,
        homogeneous: bool,
        index: usize)
    {
        match self {
            BcHolder::Func(f) => f(state, valid, domain, dx, homogeneous),
            BcHolder::Function(f) => f.apply(state, valid, domain, dx, homogeneous, index),
        }
    }
}

impl fmt::Debug for BcHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BcHolder::Func(_) => write!(f, "BcHolder::Func"),
            BcHolder::Function(_) => write!(f, "BcHolder::Function"),
        }
    }
}

impl<B: BcFunction + 'static> From<B> for BcHolder {
    fn from(bc: B) -> Self {
        BcHolder::Function(Arc::new(bc))
    }
}




/// The boundary condition for periodic problems, where there are no ghost
/// cells across a physical boundary to fill.
///
pub fn do_nothing_bc(_state: &mut GridArray, _valid: &IndexSpace, _domain: &ProblemDomain, _dx: f64, _homogeneous: bool) {
}




/// Boundary data: a constant, or a function of the boundary face center and
/// the face's axis and side.
///
#[derive(Clone)]
pub enum BcValue {
    Const(f64),
    Function(Arc<dyn Fn([f64; 2], Axis, Side) -> f64 + Send + Sync>),
}

impl BcValue {
    pub fn eval(&self, point: [f64; 2], axis: Axis, side: Side) -> f64 {
        match self {
            BcValue::Const(v) => *v,
            BcValue::Function(f) => f(point, axis, side),
        }
    }
}




/// The condition imposed on one side of the domain.
///
#[derive(Clone)]
pub enum BcKind {
    /// Value on the boundary face, extrapolated to first or second order.
    Dirichlet { value: BcValue, order: u8 },
    /// Derivative along the positive axis direction.
    Neumann(BcValue),
    /// Linear extrapolation from the interior.
    Extrapolation,
    /// Neumann where the face center's x coordinate is below `start`, and
    /// Dirichlet (second order) from there on.
    Mixed { start: f64, neumann: BcValue, dirichlet: BcValue },
}




/// A domain boundary condition with one kind per `[axis][side]`.
///
#[derive(Clone)]
pub struct DomainBc {
    pub kinds: [[BcKind; 2]; 2],
}




// ============================================================================
impl DomainBc {

    pub fn uniform(kind: BcKind) -> Self {
        Self { kinds: [[kind.clone(), kind.clone()], [kind.clone(), kind]] }
    }

    pub fn dirichlet(value: f64) -> Self {
        Self::uniform(BcKind::Dirichlet { value: BcValue::Const(value), order: 2 })
    }

    pub fn neumann(value: f64) -> Self {
        Self::uniform(BcKind::Neumann(BcValue::Const(value)))
    }

    pub fn kind(&self, axis: Axis, side: Side) -> &BcKind {
        &self.kinds[axis.index()][side.index()]
    }

    /// Fill the ghost cells adjacent to every side of `valid` which is a
    /// physical domain boundary, one cell deep.
    ///
    pub fn fill(&self, state: &mut GridArray, valid: &IndexSpace, domain: &ProblemDomain, dx: f64, homogeneous: bool) {
        for axis in Axis::ALL {
            for side in Side::ALL {
                if domain.is_physical_boundary(valid, axis, side) {
                    self.fill_side(state, valid, domain, dx, homogeneous, axis, side)
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_side(
        &self,
        state: &mut GridArray,
        valid: &IndexSpace,
        domain: &ProblemDomain,
        dx: f64,
        homogeneous: bool,
        axis: Axis,
        side: Side)
    {
        let r = domain.space().range(axis);
        let wall = match side {
            Side::Lo => r.start as f64 * dx,
            Side::Hi => r.end as f64 * dx,
        };
        let value = |v: &BcValue, point: [f64; 2]| if homogeneous { 0.0 } else { v.eval(point, axis, side) };
        let inward = -side.sign();

        for ghost in valid.adjacent(axis, side, 1).iter() {
            let p0 = axis.step(ghost, inward);
            let p1 = axis.step(ghost, 2 * inward);
            let wide = valid.contains(p1);
            let tangent = (axis.other().of(ghost) as f64 + 0.5) * dx;
            let point = match axis {
                Axis::I => [wall, tangent],
                Axis::J => [tangent, wall],
            };

            for field in 0..state.num_fields() {
                // A box one cell wide has no second interior cell: the
                // stencils drop to first order.
                let a = state.get_slice(p0)[field];
                let b = if wide { state.get_slice(p1)[field] } else { a };
                let limit = |order: u8| if wide { order } else { 1 };

                let g = match self.kind(axis, side) {
                    BcKind::Dirichlet { value: v, order } => dirichlet_ghost(value(v, point), a, b, limit(*order)),
                    BcKind::Neumann(v) => a + side.sign() as f64 * dx * value(v, point),
                    BcKind::Extrapolation => 2.0 * a - b,
                    BcKind::Mixed { start, neumann, dirichlet } => {
                        if point[0] < *start {
                            a + side.sign() as f64 * dx * value(neumann, point)
                        } else {
                            dirichlet_ghost(value(dirichlet, point), a, b, limit(2))
                        }
                    }
                };
                state.get_slice_mut(ghost)[field] = g;
            }
        }
    }
}

fn dirichlet_ghost(value: f64, p0: f64, p1: f64, order: u8) -> f64 {
    match order {
        1 => 2.0 * value - p0,
        2 => (8.0 * value - 6.0 * p0 + p1) / 3.0,
        _ => panic!("DomainBc - Dirichlet order {} is not supported", order),
    }
}

impl BcFunction for DomainBc {
    fn apply(&self, state: &mut GridArray, valid: &IndexSpace, domain: &ProblemDomain, dx: f64, homogeneous: bool, _index: usize) {
        self.fill(state, valid, domain, dx, homogeneous)
    }
}




/// Either Dirichlet or Neumann, with a constant value, on each side.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BcType {
    Dirichlet,
    Neumann,
}

/// Constant Dirichlet or Neumann data, chosen per side.
///
#[derive(Clone)]
pub struct ConstDiriNeumBc {
    bc: DomainBc,
}

impl ConstDiriNeumBc {
    pub fn new(lo_type: [BcType; 2], lo_value: [f64; 2], hi_type: [BcType; 2], hi_value: [f64; 2]) -> Self {
        let kind = |t: BcType, v: f64| match t {
            BcType::Dirichlet => BcKind::Dirichlet { value: BcValue::Const(v), order: 2 },
            BcType::Neumann => BcKind::Neumann(BcValue::Const(v)),
        };
        let kinds = [
            [kind(lo_type[0], lo_value[0]), kind(hi_type[0], hi_value[0])],
            [kind(lo_type[1], lo_value[1]), kind(hi_type[1], hi_value[1])],
        ];
        Self { bc: DomainBc { kinds } }
    }
}

impl BcFunction for ConstDiriNeumBc {
    fn apply(&self, state: &mut GridArray, valid: &IndexSpace, domain: &ProblemDomain, dx: f64, homogeneous: bool, _index: usize) {
        self.bc.fill(state, valid, domain, dx, homogeneous)
    }
}




/// The closure on the embedded boundary: the outward normal derivative
/// (Neumann) or the boundary value (Dirichlet).
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EbBc {
    Neumann(f64),
    Dirichlet(f64),
}

impl EbBc {
    pub fn value(&self, homogeneous: bool) -> f64 {
        match (self, homogeneous) {
            (_, true) => 0.0,
            (EbBc::Neumann(v), false) | (EbBc::Dirichlet(v), false) => *v,
        }
    }

    pub fn is_dirichlet(&self) -> bool {
        matches!(self, EbBc::Dirichlet(_))
    }
}




/// Fill the physical-boundary ghost cells of every local box of a level.
///
pub fn fill_ghost_cells(bc: &BcHolder, data: &mut LevelData, dx: f64, homogeneous: bool) {
    let layout = data.layout().clone();

    for n in layout.local_indexes() {
        bc.apply(data.get_mut(n), layout.get(n), layout.domain(), dx, homogeneous, n)
    }
}

/// Fill the physical-boundary ghost cells of every level of a hierarchy,
/// where `dx[l]` is the cell size of level `l`.
///
pub fn fill_ghost_cells_hierarchy(bc: &BcHolder, levels: &mut [LevelData], dx: &[f64], homogeneous: bool) {
    assert_eq!(levels.len(), dx.len(), "fill_ghost_cells_hierarchy - one cell size per level is required");

    for (data, dx) in levels.iter_mut().zip(dx) {
        fill_ghost_cells(bc, data, *dx, homogeneous)
    }
}
