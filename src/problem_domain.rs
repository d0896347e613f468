use serde::{Deserialize, Serialize};
use crate::index_space::{Axis, IndexSpace, Side};




/**
 * The physical index space at one refinement level: a box plus a periodicity
 * flag per axis. Grid boxes at a level lie inside the domain box, or wrap
 * into it along periodic axes.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProblemDomain {
    space: IndexSpace,
    periodic: [bool; 2],
}




// ============================================================================
impl ProblemDomain {

    pub fn new(space: IndexSpace, periodic: [bool; 2]) -> Self {
        assert!(!space.is_empty(), "ProblemDomain::new - empty domain box");
        Self { space, periodic }
    }

    pub fn non_periodic(space: IndexSpace) -> Self {
        Self::new(space, [false, false])
    }

    pub fn space(&self) -> &IndexSpace {
        &self.space
    }

    pub fn is_periodic(&self, axis: Axis) -> bool {
        self.periodic[axis.index()]
    }

    pub fn periodic(&self) -> [bool; 2] {
        self.periodic
    }

    /**
     * Determine whether an index is inside the domain box (no wrapping).
     */
    pub fn contains(&self, index: (i64, i64)) -> bool {
        self.space.contains(index)
    }

    /**
     * Return the periodic image of an index inside the domain box. Returns
     * `None` if the index lies outside the box along a non-periodic axis.
     */
    pub fn image(&self, index: (i64, i64)) -> Option<(i64, i64)> {
        let mut result = index;

        for axis in Axis::ALL {
            let r = self.space.range(axis);
            let x = axis.of(index);

            if !r.contains(&x) {
                if !self.is_periodic(axis) {
                    return None;
                }
                let n = r.end - r.start;
                let wrapped = r.start + (x - r.start).rem_euclid(n);
                result = match axis {
                    Axis::I => (wrapped, result.1),
                    Axis::J => (result.0, wrapped),
                };
            }
        }
        Some(result)
    }

    /**
     * Return the offsets (in multiples of the domain extent) of the periodic
     * images that can overlap a box grown by at most one domain length. The
     * zero shift is always first.
     */
    pub fn periodic_shifts(&self) -> Vec<(i64, i64)> {
        let (ni, nj) = self.space.dim();
        let si: &[i64] = if self.periodic[0] { &[0, -1, 1] } else { &[0] };
        let sj: &[i64] = if self.periodic[1] { &[0, -1, 1] } else { &[0] };

        si.iter()
            .flat_map(|a| sj.iter().map(move |b| (a * ni as i64, b * nj as i64)))
            .collect()
    }

    /**
     * Determine whether the given side of a box touches a non-periodic edge
     * of the domain.
     */
    pub fn is_physical_boundary(&self, space: &IndexSpace, axis: Axis, side: Side) -> bool {
        if self.is_periodic(axis) {
            return false;
        }
        let d = self.space.range(axis);
        let b = space.range(axis);
        match side {
            Side::Lo => b.start <= d.start,
            Side::Hi => b.end >= d.end,
        }
    }

    pub fn is_coarsenable(&self, ratio: i64) -> bool {
        self.space.is_coarsenable(ratio)
    }

    pub fn coarsen_by(&self, ratio: i64) -> Self {
        Self::new(self.space.coarsen_by(ratio), self.periodic)
    }

    pub fn refine_by(&self, ratio: i64) -> Self {
        Self::new(self.space.refine_by(ratio), self.periodic)
    }

    /**
     * A domain whose box holds exactly one cell cannot support coarse-fine
     * interpolation stencils.
     */
    pub fn is_single_cell(&self) -> bool {
        self.space.small_end() == self.space.big_end()
    }
}
