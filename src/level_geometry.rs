use std::ops::Range;
use std::sync::{Arc, OnceLock};
use rayon::prelude::*;
use crate::eb::{CellKind, EbIndexSpace, EbisBox, EbisLayout, VolIndex};
use crate::index_space::{Axis, IndexSpace, Side};
use crate::layout::DisjointBoxLayout;




/// Smallest distance from a volume centroid to the embedded boundary, in
/// units of the cell size, used in boundary flux gradients.
pub const MIN_BOUNDARY_DISTANCE: f64 = 0.1;




/// A ghost cell of a box which lies inside the domain but is not covered by
/// any box of the layout, so its value comes from the next coarser level.
/// `inside` is the valid cell across the face normal to `axis`.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CfFace {
    pub ghost: (i64, i64),
    pub inside: (i64, i64),
    pub axis: Axis,
    pub side: Side,
}




/// The stencil data of one volume which is not handled by the regular
/// five-point formula: its faces (the volume across and the area fraction)
/// and its embedded boundary.
///
#[derive(Clone, Debug)]
pub struct VofStencil {
    pub vof: VolIndex,
    pub kappa: f64,
    pub faces: Vec<(VolIndex, f64)>,
    pub eb_area: f64,
    pub eb_distance: f64,
}

#[derive(Clone, Debug)]
pub enum CellStencil {
    /// Regular cell whose four neighbors are regular or outside the domain.
    Regular,
    Covered,
    /// Indexes into `BoxGeometry::vofs`.
    General(Range<usize>),
}




/// Geometry of one locally owned box, precomputed for the operator.
///
#[derive(Clone, Debug)]
pub struct BoxGeometry {
    pub valid: IndexSpace,
    cells: Vec<CellStencil>,
    pub vofs: Vec<VofStencil>,
    pub cf: Vec<CfFace>,
    /// Volumes with `id > 0` in the ghosted region of the box.
    pub extra_vofs: Vec<VolIndex>,
}

impl BoxGeometry {
    pub fn cell(&self, cell: (i64, i64)) -> &CellStencil {
        &self.cells[self.valid.row_major_offset(cell)]
    }

    /// Determine whether every valid cell uses the regular stencil.
    ///
    pub fn is_all_regular(&self) -> bool {
        self.vofs.is_empty() && self.cells.iter().all(|c| matches!(c, CellStencil::Regular))
    }

    fn build(ebis_box: &EbisBox, layout: &DisjointBoxLayout, index: usize) -> Self {
        let valid = layout.get(index).clone();
        let domain = layout.domain();
        let mut vofs = Vec::new();

        let outside_or_regular = |cell: (i64, i64)| {
            domain.image(cell).is_none() || ebis_box.classify(cell) == CellKind::Regular
        };

        let cells = valid.iter().map(|cell| match ebis_box.classify(cell) {
            CellKind::Covered => CellStencil::Covered,
            CellKind::Regular if neighbors(cell).all(|(_, _, n)| outside_or_regular(n)) => CellStencil::Regular,
            _ => {
                let start = vofs.len();

                for vof in ebis_box.vofs(cell) {
                    let data = ebis_box.vof_data(vof);
                    let mut faces = Vec::new();

                    for (axis, side, _) in neighbors(cell) {
                        for face in ebis_box.faces(vof, axis, side) {
                            faces.push((face.other(vof), ebis_box.area_fraction(&face)))
                        }
                    }
                    vofs.push(VofStencil {
                        vof,
                        kappa: data.volume_fraction,
                        faces,
                        eb_area: data.boundary_area,
                        eb_distance: data.boundary_distance().max(MIN_BOUNDARY_DISTANCE),
                    })
                }
                CellStencil::General(start..vofs.len())
            }
        }).collect();

        let mut cf = Vec::new();

        for cell in valid.iter() {
            if ebis_box.classify(cell) == CellKind::Covered {
                continue;
            }
            for (axis, side, ghost) in neighbors(cell) {
                if !valid.contains(ghost) && domain.image(ghost).is_some() && !layout.covers(ghost) {
                    cf.push(CfFace { ghost, inside: cell, axis, side })
                }
            }
        }

        let extra_vofs = ebis_box
            .region()
            .iter()
            .filter(|&c| domain.image(c).is_some() && ebis_box.is_multi_valued(c))
            .flat_map(|c| ebis_box.vofs(c).into_iter().skip(1))
            .collect();

        Self { valid, cells, vofs, cf, extra_vofs }
    }
}

fn neighbors(cell: (i64, i64)) -> impl Iterator<Item = (Axis, Side, (i64, i64))> {
    Axis::ALL.into_iter().flat_map(move |axis| {
        Side::ALL.into_iter().map(move |side| (axis, side, axis.step(cell, side.sign())))
    })
}




/// The link from a level to the next coarser AMR level: the refinement
/// ratio, and this level's layout coarsened by it, over which coarse data is
/// gathered for coarse-fine interpolation.
///
#[derive(Debug)]
pub struct CoarseLink {
    pub ratio: i64,
    pub coarsened_fine: Arc<DisjointBoxLayout>,
}




/// Binds the embedded-boundary geometry to one box layout with a ghost
/// width: the `EbisLayout`, the cell size, and the precomputed stencils and
/// coarse-fine faces of each local box. Multigrid coarsenings of the level
/// are built on demand and cached.
///
#[derive(Debug)]
pub struct LevelGeometry {
    ebisl: EbisLayout,
    ghost: i64,
    boxes: Vec<Option<BoxGeometry>>,
    coarse_link: Option<CoarseLink>,
    coarser: OnceLock<Option<Arc<LevelGeometry>>>,
}




// ============================================================================
impl LevelGeometry {

    /// # Panics
    ///
    /// If the ghost width is zero, if the index space has no level over the
    /// layout's domain, or if `ref_to_coarser` is given and the layout is not
    /// coarsenable by it.
    ///
    pub fn new(
        layout: Arc<DisjointBoxLayout>,
        ebis: Arc<EbIndexSpace>,
        ghost: i64,
        ref_to_coarser: Option<i64>) -> Self
    {
        let coarse_link = ref_to_coarser.map(|ratio| {
            if !layout.is_coarsenable(ratio) {
                panic!("LevelGeometry::new - layout is not coarsenable by the refinement ratio {}", ratio)
            }
            CoarseLink { ratio, coarsened_fine: Arc::new(layout.coarsen(ratio)) }
        });
        Self::with_link(layout, ebis, ghost, coarse_link)
    }

    fn with_link(
        layout: Arc<DisjointBoxLayout>,
        ebis: Arc<EbIndexSpace>,
        ghost: i64,
        coarse_link: Option<CoarseLink>) -> Self
    {
        assert!(ghost >= 1, "LevelGeometry::new - ghost width must be at least one");

        let ebisl = EbisLayout::new(layout.clone(), ebis, ghost, 2, 2);
        let boxes = (0..layout.len())
            .into_par_iter()
            .map(|n| if layout.is_local(n) {
                Some(BoxGeometry::build(ebisl.get(n), &layout, n))
            } else {
                None
            })
            .collect();

        Self { ebisl, ghost, boxes, coarse_link, coarser: OnceLock::new() }
    }

    pub fn layout(&self) -> &Arc<DisjointBoxLayout> {
        self.ebisl.layout()
    }

    pub fn ebisl(&self) -> &EbisLayout {
        &self.ebisl
    }

    pub fn dx(&self) -> f64 {
        self.ebisl.dx()
    }

    pub fn ghost(&self) -> i64 {
        self.ghost
    }

    pub fn coarse_link(&self) -> Option<&CoarseLink> {
        self.coarse_link.as_ref()
    }

    /// Return the precomputed geometry of a locally owned box.
    ///
    pub fn get(&self, index: usize) -> &BoxGeometry {
        match &self.boxes[index] {
            Some(geometry) => geometry,
            None => panic!("LevelGeometry::get - box {} is not local", index),
        }
    }

    /// Return the geometry of the layout coarsened by two, if the layout and
    /// the index space allow it. The link to the coarser AMR level is
    /// coarsened along with it where possible.
    ///
    pub fn coarser(&self) -> Option<Arc<LevelGeometry>> {
        self.coarser.get_or_init(|| {
            let layout = self.layout();

            if !layout.is_coarsenable(2) || !self.ebisl.has_coarser(2) {
                return None;
            }
            let link = self.coarse_link.as_ref().and_then(|link| {
                if link.coarsened_fine.is_coarsenable(2) {
                    Some(CoarseLink { ratio: link.ratio, coarsened_fine: Arc::new(link.coarsened_fine.coarsen(2)) })
                } else {
                    None
                }
            });
            let geometry = Self::with_link(
                Arc::new(layout.coarsen(2)),
                self.ebisl.ebis().clone(),
                self.ghost,
                link);
            Some(Arc::new(geometry))
        }).clone()
    }

    /// Determine whether this geometry is the coarsening by two of another.
    ///
    pub fn is_coarsening_of(&self, fine: &LevelGeometry) -> bool {
        self.layout().is_coarsening_of(fine.layout(), 2)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use crate::eb::{AllRegular, Circle, CoarseningPolicy, Complement, EbIndexSpace};
    use crate::index_space::{range2d, Axis, Side};
    use crate::layout::DisjointBoxLayout;
    use crate::message::SerialCommunicator;
    use crate::problem_domain::ProblemDomain;
    use super::{CellStencil, LevelGeometry};

    #[test]
    fn regular_geometry_uses_the_five_point_stencil() {
        let domain = ProblemDomain::non_periodic(range2d(0..16, 0..16));
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / 16.0, &AllRegular, CoarseningPolicy::default(), None));
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, 8, Arc::new(SerialCommunicator)));
        let geom = LevelGeometry::new(layout, ebis, 1, None);

        assert!((0..4).all(|n| geom.get(n).is_all_regular()));
        assert!(geom.get(0).cf.is_empty());

        let coarse = geom.coarser().unwrap();
        assert_eq!(coarse.dx(), 1.0 / 8.0);
        assert!(coarse.is_coarsening_of(&geom));
        assert!(Arc::ptr_eq(&coarse, &geom.coarser().unwrap()));
    }

    #[test]
    fn partial_layouts_have_coarse_fine_faces() {
        let domain = ProblemDomain::non_periodic(range2d(0..16, 0..16));
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / 16.0, &AllRegular, CoarseningPolicy::default(), None));
        let layout = Arc::new(DisjointBoxLayout::new(domain, vec![range2d(4..12, 4..12)], vec![0], Arc::new(SerialCommunicator)));
        let geom = LevelGeometry::new(layout, ebis, 1, Some(2));

        let cf = &geom.get(0).cf;
        assert_eq!(cf.len(), 32);
        assert!(cf.iter().any(|f| f.ghost == (3, 6) && f.axis == Axis::I && f.side == Side::Lo));
        assert_eq!(geom.coarse_link().unwrap().coarsened_fine.get(0), &range2d(2..6, 2..6));
    }

    #[test]
    fn cut_cells_get_general_stencils() {
        let domain = ProblemDomain::non_periodic(range2d(0..16, 0..16));
        let circle = Complement(Circle { center: [0.5, 0.5], radius: 0.3 });
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / 16.0, &circle, CoarseningPolicy::default(), None));
        let layout = Arc::new(DisjointBoxLayout::single(domain, Arc::new(SerialCommunicator)));
        let geom = LevelGeometry::new(layout, ebis, 1, None);
        let bg = geom.get(0);

        assert!(matches!(bg.cell((0, 0)), CellStencil::Regular));
        assert!(matches!(bg.cell((8, 8)), CellStencil::Covered));
        assert!(!bg.vofs.is_empty());
        assert!(bg.vofs.iter().all(|v| v.kappa > 0.0 && v.kappa <= 1.0));
    }
}
