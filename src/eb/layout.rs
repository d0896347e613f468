use std::sync::{Arc, OnceLock};
use crate::index_space::Side;
use crate::layout::DisjointBoxLayout;
use super::ebis::{steps, EbIndexSpace, EbisBox, EbisLevel};
use super::index::{FaceIndex, VolIndex};




struct Inner {
    layout: Arc<DisjointBoxLayout>,
    ebis: Arc<EbIndexSpace>,
    level: usize,
    ghost: i64,
    max_coarsen: i64,
    max_refine: i64,
    boxes: Vec<OnceLock<EbisBox>>,
}




/// Binds one level of an `EbIndexSpace` to a box layout with a ghost width.
/// The per-box `EbisBox` views are built on first use and cached. Cloning
/// is cheap: all clones share the same views and geometry.
///
/// The layout is registered with the largest coarsening and refinement
/// ratios at which its volumes may be mapped to other levels.
///
#[derive(Clone)]
pub struct EbisLayout {
    inner: Arc<Inner>,
}




// ============================================================================
impl EbisLayout {

    /// # Panics
    ///
    /// If the index space has no level over the layout's domain, or if a
    /// registered ratio is not a power of two.
    ///
    pub fn new(
        layout: Arc<DisjointBoxLayout>,
        ebis: Arc<EbIndexSpace>,
        ghost: i64,
        max_coarsen: i64,
        max_refine: i64) -> Self
    {
        let level = match ebis.level_of(layout.domain()) {
            Some(level) => level,
            None => panic!("EbisLayout::new - no index space level over the domain {:?}", layout.domain().space()),
        };
        steps(max_coarsen);
        steps(max_refine);

        let boxes = (0..layout.len()).map(|_| OnceLock::new()).collect();
        let inner = Inner { layout, ebis, level, ghost, max_coarsen, max_refine, boxes };
        Self { inner: Arc::new(inner) }
    }

    pub fn layout(&self) -> &Arc<DisjointBoxLayout> {
        &self.inner.layout
    }

    pub fn ebis(&self) -> &Arc<EbIndexSpace> {
        &self.inner.ebis
    }

    /// The index of this layout's level in the index space (0 is finest).
    ///
    pub fn level(&self) -> usize {
        self.inner.level
    }

    pub fn ebis_level(&self) -> &Arc<EbisLevel> {
        self.inner.ebis.level(self.inner.level)
    }

    pub fn ghost(&self) -> i64 {
        self.inner.ghost
    }

    pub fn dx(&self) -> f64 {
        self.ebis_level().dx
    }

    pub fn max_coarsen(&self) -> i64 {
        self.inner.max_coarsen
    }

    pub fn max_refine(&self) -> i64 {
        self.inner.max_refine
    }

    pub fn len(&self) -> usize {
        self.inner.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.boxes.is_empty()
    }

    /// Return the view of box `index`, grown by the ghost width.
    ///
    pub fn get(&self, index: usize) -> &EbisBox {
        self.inner.boxes[index].get_or_init(|| {
            let region = self.inner.layout.get(index).extend_all(self.inner.ghost);
            EbisBox::new(self.ebis_level().clone(), region)
        })
    }

    /// Determine whether the index space has a level coarser than this one
    /// by the given ratio.
    ///
    pub fn has_coarser(&self, ratio: i64) -> bool {
        self.inner.level + steps(ratio) < self.inner.ebis.num_levels()
    }

    /// Build the layout at the coarser index space level, over the coarsened
    /// boxes. The registered ratios shift with the level.
    ///
    pub fn coarsened(&self, ratio: i64) -> Self {
        Self::new(
            Arc::new(self.inner.layout.coarsen(ratio)),
            self.inner.ebis.clone(),
            self.inner.ghost,
            (self.inner.max_coarsen / ratio).max(1),
            self.inner.max_refine * ratio)
    }

    fn check_ratio(&self, ratio: i64, max: i64, what: &str) {
        steps(ratio);
        if ratio > max {
            panic!("EbisLayout::{} - ratio {} exceeds registered maximum {}", what, ratio, max)
        }
    }

    fn check_vof(&self, vof: VolIndex, index: usize, what: &str) {
        if !self.get(index).contains_vof(vof) {
            panic!("EbisLayout::{} - no volume {:?} in box {}", what, vof, index)
        }
    }

    /// Return the volume that `vof`, in box `index`, coarsens into.
    ///
    /// # Panics
    ///
    /// If the ratio exceeds the registered maximum, or the volume does not
    /// exist in the ghosted box.
    ///
    pub fn coarsen_vof(&self, vof: VolIndex, ratio: i64, index: usize) -> VolIndex {
        self.check_ratio(ratio, self.inner.max_coarsen, "coarsen");
        self.check_vof(vof, index, "coarsen");

        if !self.has_coarser(ratio) {
            panic!("EbisLayout::coarsen - no index space level {} coarser than {}", ratio, self.inner.level)
        }
        self.inner.ebis.coarsen(self.inner.level, vof, ratio)
    }

    /// Return the volumes that refine `vof`, in box `index`.
    ///
    /// # Panics
    ///
    /// If the ratio exceeds the registered maximum, or the volume does not
    /// exist in the ghosted box.
    ///
    pub fn refine_vof(&self, vof: VolIndex, ratio: i64, index: usize) -> Vec<VolIndex> {
        self.check_ratio(ratio, self.inner.max_refine, "refine");
        self.check_vof(vof, index, "refine");

        if self.inner.level < steps(ratio) {
            panic!("EbisLayout::refine - no index space level {} finer than {}", ratio, self.inner.level)
        }
        self.inner.ebis.refine(self.inner.level, vof, ratio)
    }

    /// Return the coarse face containing a fine face.
    ///
    /// # Panics
    ///
    /// Under the same conditions as `coarsen_vof`, and if the face lies in
    /// the interior of a coarse cell.
    ///
    pub fn coarsen_face(&self, face: &FaceIndex, ratio: i64, index: usize) -> FaceIndex {
        let domain = self.inner.layout.domain();
        let coarse_cell = |cell: (i64, i64)| (cell.0.div_euclid(ratio), cell.1.div_euclid(ratio));
        let outside = |vof: VolIndex| VolIndex::new(coarse_cell(vof.cell), 0);

        let lo = if face.boundary && domain.image(face.lo.cell).is_none() {
            outside(face.lo)
        } else {
            self.coarsen_vof(face.lo, ratio, index)
        };
        let hi = if face.boundary && domain.image(face.hi.cell).is_none() {
            outside(face.hi)
        } else {
            self.coarsen_vof(face.hi, ratio, index)
        };
        if lo.cell == hi.cell {
            panic!("EbisLayout::coarsen_face - face {:?} is interior to coarse cell {:?}", face, lo.cell)
        }
        FaceIndex { axis: face.axis, lo, hi, boundary: face.boundary }
    }

    /// Return the fine faces which refine a coarse face.
    ///
    pub fn refine_face(&self, face: &FaceIndex, ratio: i64, index: usize) -> Vec<FaceIndex> {
        let domain = self.inner.layout.domain();
        let axis = face.axis;

        let (inside, side, other) = if domain.image(face.lo.cell).is_some() {
            (face.lo, Side::Hi, face.hi)
        } else {
            (face.hi, Side::Lo, face.lo)
        };
        let refined = self.refine_vof(inside, ratio, index);
        let fine_graph = &self.inner.ebis.level(self.inner.level - steps(ratio)).graph;
        let plane = match side {
            Side::Hi => (axis.of(inside.cell) + 1) * ratio - 1,
            Side::Lo => axis.of(inside.cell) * ratio,
        };
        let across = if face.boundary {
            Vec::new()
        } else {
            self.refine_vof(other, ratio, index)
        };

        refined
            .into_iter()
            .filter(|v| axis.of(v.cell) == plane)
            .flat_map(|v| fine_graph.faces(v, axis, side))
            .filter(|f| face.boundary || across.contains(&f.other(f.vof(side.flip()))))
            .collect()
    }
}

impl std::fmt::Debug for EbisLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EbisLayout")
            .field("layout", &self.inner.layout)
            .field("level", &self.inner.level)
            .field("ghost", &self.inner.ghost)
            .finish()
    }
}





// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use crate::eb::graph::CoarseningPolicy;
    use crate::eb::implicit::{Circle, Complement};
    use crate::eb::ebis::EbIndexSpace;
    use crate::index_space::{range2d, Axis, Side};
    use crate::layout::DisjointBoxLayout;
    use crate::message::SerialCommunicator;
    use crate::problem_domain::ProblemDomain;
    use super::EbisLayout;

    fn ebisl(n: i64) -> EbisLayout {
        let domain = ProblemDomain::non_periodic(range2d(0..n, 0..n));
        let circle = Complement(Circle { center: [0.5, 0.5], radius: 0.3 });
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / n as f64, &circle, CoarseningPolicy::SplitComponents, None));
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, n / 2, Arc::new(SerialCommunicator)));
        EbisLayout::new(layout, ebis, 1, 2, 1)
    }

    fn box_of(ebisl: &EbisLayout, cell: (i64, i64)) -> usize {
        ebisl.layout().find(cell).unwrap()
    }

    #[test]
    fn views_are_memoized() {
        let ebisl = ebisl(16);
        let a = ebisl.get(0) as *const _;
        let b = ebisl.clone().get(0) as *const _;
        assert_eq!(a, b);
        assert_eq!(ebisl.get(0).region(), &range2d(-1..9, -1..9));
    }

    #[test]
    fn coarsen_then_refine_recovers_the_vof() {
        let ebisl = ebisl(16);
        let coarse = ebisl.coarsened(2);

        for index in 0..ebisl.len() {
            let region = ebisl.layout().get(index).clone();
            for cell in ebisl.get(index).irregular_cells(&region) {
                for vof in ebisl.get(index).vofs(cell) {
                    let c = ebisl.coarsen_vof(vof, 2, index);
                    assert!(coarse.refine_vof(c, 2, index).contains(&vof));
                }
            }
        }
    }

    #[test]
    fn faces_coarsen_and_refine() {
        let ebisl = ebisl(16);
        let coarse = ebisl.coarsened(2);
        let vof = ebisl.get(0).vofs((3, 2))[0];
        let face = ebisl.get(0).faces(vof, Axis::I, Side::Hi)[0];
        let coarse_face = ebisl.coarsen_face(&face, 2, box_of(&ebisl, (3, 2)));

        assert_eq!(coarse_face.lo.cell, (1, 1));
        assert_eq!(coarse_face.hi.cell, (2, 1));
        assert!(coarse.refine_face(&coarse_face, 2, 0).contains(&face));
    }

    #[test]
    fn boundary_faces_refine_to_boundary_faces() {
        let ebisl = ebisl(16);
        let coarse = ebisl.coarsened(2);
        let vof = coarse.get(0).vofs((0, 1))[0];
        let face = coarse.get(0).faces(vof, Axis::I, Side::Lo)[0];
        let fine = coarse.refine_face(&face, 2, 0);

        assert_eq!(fine.len(), 2);
        assert!(fine.iter().all(|f| f.boundary && f.lo.cell.0 == -1));
    }

    #[test]
    #[should_panic(expected = "ratio 4 exceeds registered maximum 2")]
    fn coarsening_beyond_the_registered_ratio_is_fatal() {
        let ebisl = ebisl(16);
        let vof = ebisl.get(0).vofs((0, 0))[0];
        ebisl.coarsen_vof(vof, 4, 0);
    }

    #[test]
    #[should_panic(expected = "ratio 2 exceeds registered maximum 1")]
    fn refining_beyond_the_registered_ratio_is_fatal() {
        let ebisl = ebisl(16);
        let vof = ebisl.get(0).vofs((0, 0))[0];
        ebisl.refine_vof(vof, 2, 0);
    }

    #[test]
    #[should_panic(expected = "no volume")]
    fn missing_vofs_are_fatal() {
        let ebisl = ebisl(16);
        ebisl.coarsen_vof(crate::eb::index::VolIndex::new((0, 0), 3), 2, 0);
    }
}
