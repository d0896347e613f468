use serde::{Deserialize, Serialize};
use crate::index_space::{Axis, Side};




/// Classification of one grid cell with respect to the embedded boundary.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Regular,
    Covered,
    Irregular,
}




/// Identifies one volume of fluid: a connected fluid fragment of a grid
/// cell. Regular cells hold the single volume `id = 0`. The cell may lie
/// outside the domain box when it names a periodic image or a ghost cell.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolIndex {
    pub cell: (i64, i64),
    pub id: usize,
}

impl VolIndex {
    pub fn new(cell: (i64, i64), id: usize) -> Self {
        Self { cell, id }
    }
}




/// A face connecting two volumes across the cell boundary normal to `axis`.
/// `lo` is on the low side and `hi` on the high side. For a face on a
/// non-periodic domain edge, `boundary` is set and the outside volume names
/// the ghost cell with `id = 0`.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceIndex {
    pub axis: Axis,
    pub lo: VolIndex,
    pub hi: VolIndex,
    pub boundary: bool,
}

impl FaceIndex {

    /// Build the face leaving `vof` on the given side, reaching `other`.
    ///
    pub fn leaving(vof: VolIndex, axis: Axis, side: Side, other: VolIndex, boundary: bool) -> Self {
        match side {
            Side::Lo => Self { axis, lo: other, hi: vof, boundary },
            Side::Hi => Self { axis, lo: vof, hi: other, boundary },
        }
    }

    pub fn vof(&self, side: Side) -> VolIndex {
        match side {
            Side::Lo => self.lo,
            Side::Hi => self.hi,
        }
    }

    /// Return the volume across the face from the given one.
    ///
    pub fn other(&self, vof: VolIndex) -> VolIndex {
        if vof == self.lo {
            self.hi
        } else if vof == self.hi {
            self.lo
        } else {
            panic!("FaceIndex::other - {:?} is not on face {:?}", vof, self)
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::index_space::{Axis, Side};
    use super::{FaceIndex, VolIndex};

    #[test]
    fn face_orientation_follows_side() {
        let a = VolIndex::new((2, 3), 0);
        let b = VolIndex::new((1, 3), 1);
        let face = FaceIndex::leaving(a, Axis::I, Side::Lo, b, false);
        assert_eq!(face.lo, b);
        assert_eq!(face.hi, a);
        assert_eq!(face.other(a), b);
        assert_eq!(face.vof(Side::Hi), a);
    }
}
