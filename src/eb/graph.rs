use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::error::CoarseningError;
use crate::index_space::{Axis, IndexSpace, Side};
use crate::problem_domain::ProblemDomain;
use super::data::{polygon_moments, VofData};
use super::implicit::{brent_root, ImplicitFunction};
use super::index::{CellKind, FaceIndex, VolIndex};




/// Tolerance of edge intersections, in units of the cell size.
const EDGE_TOLERANCE: f64 = 1e-12;




/// What to do when the fine volumes inside one coarse cell fall into more
/// than one connected component.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoarseningPolicy {
    /// Each connected component becomes one coarse volume, so the coarse
    /// cell is multi-valued.
    SplitComponents,
    /// Coarse cells must be single-valued; a cell that is not fails the
    /// coarsening.
    SingleValued,
}

impl Default for CoarseningPolicy {
    fn default() -> Self {
        CoarseningPolicy::SplitComponents
    }
}




/// One face leaving an irregular volume: the volume it reaches in the
/// neighboring cell and its area fraction.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FaceArc {
    pub id: usize,
    pub area: f64,
}

#[derive(Clone, Debug)]
pub(crate) struct IrregularVof {
    /// Faces indexed by `[axis][side]`.
    pub faces: [[Vec<FaceArc>; 2]; 2],
    pub data: VofData,
    /// The volumes at the next finer level that coarsen into this one.
    pub fine: Vec<VolIndex>,
    pub merged: bool,
}

#[derive(Clone, Debug)]
pub(crate) enum CellNode {
    Regular,
    Covered,
    Irregular(Vec<IrregularVof>),
}

static REGULAR: CellNode = CellNode::Regular;
static COVERED: CellNode = CellNode::Covered;

#[derive(Clone, Debug)]
enum GraphTag {
    AllRegular,
    AllCovered,
    HasIrregular(Vec<CellNode>),
}




/// The embedded-boundary graph over one problem domain: each cell is
/// regular, covered, or irregular, and irregular cells hold a list of
/// volumes connected by faces. Cell lookups are constant time; cells
/// outside the domain box are mapped to their periodic image.
///
#[derive(Clone, Debug)]
pub struct EbGraph {
    domain: ProblemDomain,
    tag: GraphTag,
}




// ============================================================================
impl EbGraph {

    pub fn all_regular(domain: ProblemDomain) -> Self {
        Self { domain, tag: GraphTag::AllRegular }
    }

    pub fn all_covered(domain: ProblemDomain) -> Self {
        Self { domain, tag: GraphTag::AllCovered }
    }

    pub fn domain(&self) -> &ProblemDomain {
        &self.domain
    }

    pub fn is_all_regular(&self) -> bool {
        matches!(self.tag, GraphTag::AllRegular)
    }

    pub fn is_all_covered(&self) -> bool {
        matches!(self.tag, GraphTag::AllCovered)
    }

    fn node(&self, cell: (i64, i64)) -> Option<&CellNode> {
        let image = self.domain.image(cell)?;

        match &self.tag {
            GraphTag::AllRegular => Some(&REGULAR),
            GraphTag::AllCovered => Some(&COVERED),
            GraphTag::HasIrregular(nodes) => Some(&nodes[self.domain.space().row_major_offset(image)]),
        }
    }

    fn node_or_panic(&self, cell: (i64, i64)) -> &CellNode {
        match self.node(cell) {
            Some(node) => node,
            None => panic!("EbGraph - cell ({} {}) is outside the domain {:?}", cell.0, cell.1, self.domain.space()),
        }
    }

    fn irregular_vof(&self, vof: VolIndex) -> Option<&IrregularVof> {
        match self.node(vof.cell) {
            Some(CellNode::Irregular(vofs)) => vofs.get(vof.id),
            _ => None,
        }
    }

    /// Classify a cell. Multi-valued cells are irregular.
    ///
    /// # Panics
    ///
    /// If the cell is outside the domain along a non-periodic axis.
    ///
    pub fn classify(&self, cell: (i64, i64)) -> CellKind {
        match self.node_or_panic(cell) {
            CellNode::Regular => CellKind::Regular,
            CellNode::Covered => CellKind::Covered,
            CellNode::Irregular(_) => CellKind::Irregular,
        }
    }

    pub fn num_vofs(&self, cell: (i64, i64)) -> usize {
        match self.node_or_panic(cell) {
            CellNode::Regular => 1,
            CellNode::Covered => 0,
            CellNode::Irregular(vofs) => vofs.len(),
        }
    }

    /// Return the volumes of a cell: none if covered, one if regular, and
    /// one or more if irregular.
    ///
    pub fn vofs_in(&self, cell: (i64, i64)) -> Vec<VolIndex> {
        (0..self.num_vofs(cell)).map(|id| VolIndex::new(cell, id)).collect()
    }

    pub fn contains_vof(&self, vof: VolIndex) -> bool {
        match self.node(vof.cell) {
            Some(CellNode::Regular) => vof.id == 0,
            Some(CellNode::Covered) | None => false,
            Some(CellNode::Irregular(vofs)) => vof.id < vofs.len(),
        }
    }

    pub fn is_multi_valued(&self, cell: (i64, i64)) -> bool {
        matches!(self.node(cell), Some(CellNode::Irregular(vofs)) if vofs.len() > 1)
    }

    /// Return the cells of a region which are irregular, in row-major order.
    /// Cells outside the domain box are skipped.
    ///
    pub fn irregular_cells(&self, region: &IndexSpace) -> Vec<(i64, i64)> {
        match self.tag {
            GraphTag::HasIrregular(_) => region
                .iter()
                .filter(|&c| matches!(self.node(c), Some(CellNode::Irregular(_))))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Determine whether all cells of a region are regular. Cells outside
    /// the domain box are ignored.
    ///
    pub fn is_regular_region(&self, region: &IndexSpace) -> bool {
        match self.tag {
            GraphTag::AllRegular => true,
            GraphTag::AllCovered => false,
            GraphTag::HasIrregular(_) => region
                .iter()
                .all(|c| matches!(self.node(c), Some(CellNode::Regular) | None)),
        }
    }

    /// Return the faces of a volume on the given side of its cell along an
    /// axis. A volume may have several faces on one side when the neighbor
    /// cell is multi-valued, and none when the side is closed.
    ///
    pub fn faces(&self, vof: VolIndex, axis: Axis, side: Side) -> Vec<FaceIndex> {
        let neighbor = axis.step(vof.cell, side.sign());
        let outside = self.domain.image(neighbor).is_none();

        match self.node_or_panic(vof.cell) {
            CellNode::Covered => {
                panic!("EbGraph::faces - covered cell {:?} has no volumes", vof.cell)
            }
            CellNode::Regular if outside => {
                vec![FaceIndex::leaving(vof, axis, side, VolIndex::new(neighbor, 0), true)]
            }
            CellNode::Regular => match self.node_or_panic(neighbor) {
                CellNode::Regular => {
                    vec![FaceIndex::leaving(vof, axis, side, VolIndex::new(neighbor, 0), false)]
                }
                CellNode::Covered => Vec::new(),
                CellNode::Irregular(others) => others
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.faces[axis.index()][side.flip().index()].iter().any(|a| a.id == 0))
                    .map(|(id, _)| FaceIndex::leaving(vof, axis, side, VolIndex::new(neighbor, id), false))
                    .collect(),
            },
            CellNode::Irregular(vofs) => {
                let node = match vofs.get(vof.id) {
                    Some(node) => node,
                    None => panic!("EbGraph::faces - no volume {:?}", vof),
                };
                node.faces[axis.index()][side.index()]
                    .iter()
                    .map(|a| FaceIndex::leaving(vof, axis, side, VolIndex::new(neighbor, a.id), outside))
                    .collect()
            }
        }
    }

    /// Return the face connecting two volumes in adjacent cells along an
    /// axis, if there is one.
    ///
    pub fn face_between(&self, a: VolIndex, b: VolIndex, axis: Axis) -> Option<FaceIndex> {
        let side = if axis.step(a.cell, 1) == b.cell {
            Side::Hi
        } else if axis.step(a.cell, -1) == b.cell {
            Side::Lo
        } else {
            return None;
        };
        self.faces(a, axis, side).into_iter().find(|f| f.other(a) == b)
    }

    /// Return the area fraction of a face.
    ///
    pub fn area_fraction(&self, face: &FaceIndex) -> f64 {
        let a = face.axis.index();

        if let Some(lo) = self.irregular_vof(face.lo) {
            lo.faces[a][1].iter().find(|arc| arc.id == face.hi.id).map_or(0.0, |arc| arc.area)
        } else if let Some(hi) = self.irregular_vof(face.hi) {
            hi.faces[a][0].iter().find(|arc| arc.id == face.lo.id).map_or(0.0, |arc| arc.area)
        } else {
            1.0
        }
    }

    /// Return the geometric moments of a volume.
    ///
    pub fn vof_data(&self, vof: VolIndex) -> VofData {
        match self.node_or_panic(vof.cell) {
            CellNode::Regular => VofData::regular(),
            CellNode::Covered => panic!("EbGraph::vof_data - covered cell {:?} has no volumes", vof.cell),
            CellNode::Irregular(vofs) => match vofs.get(vof.id) {
                Some(node) => node.data,
                None => panic!("EbGraph::vof_data - no volume {:?}", vof),
            },
        }
    }

    /// Determine whether a volume was built from more than one finer volume.
    ///
    pub fn is_merged(&self, vof: VolIndex) -> bool {
        self.irregular_vof(vof).map_or(false, |v| v.merged)
    }

    /// Return the volumes at the next finer level (refinement ratio 2) which
    /// coarsen into the given volume of this graph.
    ///
    pub fn fine_vofs(&self, vof: VolIndex) -> Vec<VolIndex> {
        let image = self.image_or_panic(vof.cell);
        let offset = (2 * (vof.cell.0 - image.0), 2 * (vof.cell.1 - image.1));

        match self.node_or_panic(vof.cell) {
            CellNode::Regular if vof.id == 0 => IndexSpace::new(2 * vof.cell.0..2 * vof.cell.0 + 2, 2 * vof.cell.1..2 * vof.cell.1 + 2)
                .iter()
                .map(|c| VolIndex::new(c, 0))
                .collect(),
            CellNode::Irregular(vofs) if vof.id < vofs.len() => vofs[vof.id]
                .fine
                .iter()
                .map(|f| VolIndex::new((f.cell.0 + offset.0, f.cell.1 + offset.1), f.id))
                .collect(),
            _ => panic!("EbGraph::fine_vofs - no volume {:?}", vof),
        }
    }

    /// Return the volume of this graph that a volume at the next finer level
    /// (refinement ratio 2) coarsens into.
    ///
    pub fn coarse_vof(&self, fine: VolIndex) -> VolIndex {
        let cell = (fine.cell.0.div_euclid(2), fine.cell.1.div_euclid(2));
        let image = self.image_or_panic(cell);
        let shifted = VolIndex::new(
            (fine.cell.0 - 2 * (cell.0 - image.0), fine.cell.1 - 2 * (cell.1 - image.1)),
            fine.id);

        match self.node_or_panic(cell) {
            CellNode::Regular => VolIndex::new(cell, 0),
            CellNode::Covered => panic!("EbGraph::coarse_vof - {:?} coarsens into covered cell {:?}", fine, cell),
            CellNode::Irregular(vofs) => match vofs.iter().position(|v| v.fine.contains(&shifted)) {
                Some(id) => VolIndex::new(cell, id),
                None => panic!("EbGraph::coarse_vof - no coarse volume contains {:?}", fine),
            },
        }
    }

    fn image_or_panic(&self, cell: (i64, i64)) -> (i64, i64) {
        match self.domain.image(cell) {
            Some(image) => image,
            None => panic!("EbGraph - cell ({} {}) is outside the domain {:?}", cell.0, cell.1, self.domain.space()),
        }
    }
}




// ============================================================================
impl EbGraph {

    /// Generate the graph of the zero level set of an implicit function on
    /// a domain with cell size `dx` (the domain origin is at zero).
    ///
    pub fn from_implicit(domain: &ProblemDomain, dx: f64, function: &dyn ImplicitFunction) -> Self {
        let space = domain.space().clone();
        let nodes = NodeValues::sample(&space, dx, function);
        let cuts: Vec<CellCut> = space.iter().map(|c| CellCut::new(c, dx, &nodes, function)).collect();

        if cuts.iter().all(|c| matches!(c.kind, CellKind::Regular)) {
            return Self::all_regular(domain.clone());
        }
        if cuts.iter().all(|c| matches!(c.kind, CellKind::Covered)) {
            return Self::all_covered(domain.clone());
        }

        let cut_at = |cell: (i64, i64)| &cuts[space.row_major_offset(cell)];

        let cells = space.iter().zip(&cuts).map(|(cell, cut)| match cut.kind {
            CellKind::Regular => CellNode::Regular,
            CellKind::Covered => CellNode::Covered,
            CellKind::Irregular => {
                let vofs = cut.vofs.iter().enumerate().map(|(id, v)| {
                    let mut faces: [[Vec<FaceArc>; 2]; 2] = Default::default();

                    for axis in Axis::ALL {
                        for side in Side::ALL {
                            let area = v.apertures[axis.index()][side.index()];

                            if area <= 0.0 || cut.edge_owner[axis.index()][side.index()] != Some(id) {
                                continue;
                            }
                            let neighbor = match domain.image(axis.step(cell, side.sign())) {
                                Some(n) => n,
                                None => {
                                    faces[axis.index()][side.index()].push(FaceArc { id: 0, area });
                                    continue;
                                }
                            };
                            let other = cut_at(neighbor);
                            let id = match other.kind {
                                CellKind::Regular => 0,
                                CellKind::Irregular => match other.edge_owner[axis.index()][side.flip().index()] {
                                    Some(id) => id,
                                    None => panic!("EbGraph::from_implicit - edge of cell {:?} is open on one side only", cell),
                                },
                                CellKind::Covered => panic!("EbGraph::from_implicit - open face of cell {:?} leads into a covered cell", cell),
                            };
                            faces[axis.index()][side.index()].push(FaceArc { id, area })
                        }
                    }
                    IrregularVof { faces, data: v.data, fine: Vec::new(), merged: false }
                });
                CellNode::Irregular(vofs.collect())
            }
        });

        Self { domain: domain.clone(), tag: GraphTag::HasIrregular(cells.collect()) }
    }
}




/// Values of the implicit function at the nodes (cell corners) of a box.
///
struct NodeValues {
    space: IndexSpace,
    values: Vec<f64>,
}

impl NodeValues {
    fn sample(cells: &IndexSpace, dx: f64, function: &dyn ImplicitFunction) -> Self {
        let space = cells.extend_upper(1, Axis::I).extend_upper(1, Axis::J);
        let values = space.iter().map(|(i, j)| function.value([i as f64 * dx, j as f64 * dx])).collect();
        Self { space, values }
    }

    fn get(&self, node: (i64, i64)) -> f64 {
        self.values[self.space.row_major_offset(node)]
    }
}

struct VofCut {
    apertures: [[f64; 2]; 2],
    data: VofData,
}

/// The cut of one cell: corners are numbered counter-clockwise from the low
/// corner, and perimeter edge `k` joins corner `k` to corner `k + 1`.
///
struct CellCut {
    kind: CellKind,
    vofs: Vec<VofCut>,
    /// Which volume owns the fluid part of each edge, by `[axis][side]`.
    edge_owner: [[Option<usize>; 2]; 2],
}

const CORNERS: [(i64, i64); 4] = [(0, 0), (1, 0), (1, 1), (0, 1)];
const EDGE_FACE: [(Axis, Side); 4] = [(Axis::J, Side::Lo), (Axis::I, Side::Hi), (Axis::J, Side::Hi), (Axis::I, Side::Lo)];

impl CellCut {

    fn new(cell: (i64, i64), dx: f64, nodes: &NodeValues, function: &dyn ImplicitFunction) -> Self {
        let value = |k: usize| nodes.get((cell.0 + CORNERS[k].0, cell.1 + CORNERS[k].1));
        let fluid: Vec<bool> = (0..4).map(|k| value(k) < 0.0).collect();

        if fluid.iter().all(|&f| f) {
            return Self { kind: CellKind::Regular, vofs: Vec::new(), edge_owner: [[Some(0); 2]; 2] };
        }
        if fluid.iter().all(|&f| !f) {
            return Self { kind: CellKind::Covered, vofs: Vec::new(), edge_owner: [[None; 2]; 2] };
        }

        // Crossing point (cell-local, unit cell) and fluid aperture per edge.
        let mut crossing = [[0.0; 2]; 4];
        let mut aperture = [0.0; 4];

        for k in 0..4 {
            let p = CORNERS[k];
            let q = CORNERS[(k + 1) % 4];

            if fluid[k] && fluid[(k + 1) % 4] {
                aperture[k] = 1.0;
            } else if fluid[k] != fluid[(k + 1) % 4] {
                let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
                let x0 = [(cell.0 + lo.0) as f64 * dx, (cell.1 + lo.1) as f64 * dx];
                let x1 = [(cell.0 + hi.0) as f64 * dx, (cell.1 + hi.1) as f64 * dx];
                let along = |t: f64| function.value([x0[0] + t * (x1[0] - x0[0]), x0[1] + t * (x1[1] - x0[1])]);
                let t = brent_root(along, 0.0, 1.0, EDGE_TOLERANCE);
                let lo_fluid = if p <= q { fluid[k] } else { fluid[(k + 1) % 4] };

                aperture[k] = if lo_fluid { t } else { 1.0 - t };
                crossing[k] = [lo.0 as f64 + t * (hi.0 - lo.0) as f64, lo.1 as f64 + t * (hi.1 - lo.1) as f64];
            }
        }

        let mut runs: Vec<Vec<usize>> = Vec::new();

        for start in (0..4).filter(|&k| fluid[k] && !fluid[(k + 3) % 4]) {
            let mut run = vec![start];
            let mut k = (start + 1) % 4;
            while fluid[k] {
                run.push(k);
                k = (k + 1) % 4;
            }
            runs.push(run)
        }

        let center = function.value([(cell.0 as f64 + 0.5) * dx, (cell.1 as f64 + 0.5) * dx]);

        if runs.len() == 2 && center < 0.0 {
            runs = vec![runs.concat()];
        }

        let corner_point = |k: usize| [CORNERS[k].0 as f64, CORNERS[k].1 as f64];
        let mut owner_of_corner = [None; 4];
        let mut vofs = Vec::new();

        for (id, run) in runs.iter().enumerate() {
            let mut polygon = Vec::new();
            let mut segments = Vec::new();

            for k in 0..4 {
                let next = (k + 1) % 4;

                if run.contains(&k) {
                    polygon.push(corner_point(k));
                    if !fluid[next] {
                        polygon.push(crossing[k]);
                    }
                } else if run.contains(&next) {
                    polygon.push(crossing[k]);
                }
            }
            // Boundary segments join the exit crossing of the fluid before a
            // solid stretch to the entry crossing after it.
            for &k in run {
                if !fluid[(k + 1) % 4] {
                    let mut m = (k + 1) % 4;
                    while !fluid[(m + 1) % 4] {
                        m = (m + 1) % 4;
                    }
                    segments.push((crossing[k], crossing[m]));
                }
            }
            for &k in run {
                owner_of_corner[k] = Some(id);
            }

            let (area, centroid) = polygon_moments(&polygon);
            let (mut length, mut bx, mut by) = (0.0, 0.0, 0.0);

            for (a, b) in &segments {
                let l = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt();
                length += l;
                bx += l * 0.5 * (a[0] + b[0]);
                by += l * 0.5 * (a[1] + b[1]);
            }
            let boundary_centroid = if length > 0.0 { [bx / length - 0.5, by / length - 0.5] } else { [0.0, 0.0] };

            vofs.push((area, [centroid[0] - 0.5, centroid[1] - 0.5], boundary_centroid))
        }

        let mut edge_owner = [[None; 2]; 2];
        let mut apertures = vec![[[0.0; 2]; 2]; vofs.len()];

        for k in 0..4 {
            let owner = owner_of_corner[k].or(owner_of_corner[(k + 1) % 4]);
            let (axis, side) = EDGE_FACE[k];

            if let Some(id) = owner.filter(|_| aperture[k] > 0.0) {
                edge_owner[axis.index()][side.index()] = Some(id);
                apertures[id][axis.index()][side.index()] = aperture[k];
            }
        }

        let vofs = vofs
            .into_iter()
            .zip(apertures)
            .map(|((area, centroid, boundary_centroid), apertures)| VofCut {
                apertures,
                data: VofData::from_apertures(area, apertures, centroid, boundary_centroid),
            })
            .collect();

        Self { kind: CellKind::Irregular, vofs, edge_owner }
    }
}




// ============================================================================
impl EbGraph {

    /// Build the graph at the next coarser level (ratio 2). A coarse cell is
    /// covered if all of its fine cells are, regular if all are regular, and
    /// irregular otherwise. The fine volumes of an irregular coarse cell are
    /// grouped into connected components through the faces between them;
    /// each component becomes one coarse volume, unless the policy requires
    /// single-valued cells.
    ///
    pub fn coarsen(&self, policy: CoarseningPolicy) -> Result<Self, CoarseningError> {
        if !self.domain.is_coarsenable(2) {
            let (ni, nj) = self.domain.space().dim();
            return Err(CoarseningError::NotCoarsenable((ni as i64, nj as i64), 2));
        }
        let domain = self.domain.coarsen_by(2);

        match self.tag {
            GraphTag::AllRegular => return Ok(Self::all_regular(domain)),
            GraphTag::AllCovered => return Ok(Self::all_covered(domain)),
            GraphTag::HasIrregular(_) => {}
        }

        let space = domain.space().clone();
        let mut components: Vec<Option<Vec<Vec<VolIndex>>>> = Vec::with_capacity(space.len());
        let mut kinds = Vec::with_capacity(space.len());
        let mut coarse_id: HashMap<VolIndex, usize> = HashMap::new();

        for cell in space.iter() {
            let block = Self::fine_block(cell);
            let fine_kinds: Vec<_> = block.iter().map(|f| self.classify(f)).collect();

            if fine_kinds.iter().all(|k| *k == CellKind::Covered) {
                kinds.push(CellKind::Covered);
                components.push(None);
                continue;
            }
            if fine_kinds.iter().all(|k| *k == CellKind::Regular) {
                kinds.push(CellKind::Regular);
                components.push(None);
                continue;
            }

            let comps = self.connected_components(&block);

            if policy == CoarseningPolicy::SingleValued && comps.len() > 1 {
                return Err(CoarseningError::DisconnectedComponents(cell.0, cell.1, comps.len()));
            }
            for (id, comp) in comps.iter().enumerate() {
                for v in comp {
                    coarse_id.insert(*v, id);
                }
            }
            kinds.push(CellKind::Irregular);
            components.push(Some(comps));
        }

        let kind_at = |cell: (i64, i64)| kinds[space.row_major_offset(cell)];

        let cells = space.iter().zip(components).zip(&kinds).map(|((cell, comps), kind)| {
            let comps = match (kind, comps) {
                (CellKind::Regular, _) => return CellNode::Regular,
                (CellKind::Covered, _) => return CellNode::Covered,
                (CellKind::Irregular, Some(comps)) => comps,
                (CellKind::Irregular, None) => unreachable!(),
            };
            let block = Self::fine_block(cell);

            CellNode::Irregular(comps.into_iter().map(|comp| {
                let mut faces: [[Vec<FaceArc>; 2]; 2] = Default::default();
                let mut volume = 0.0;
                let mut centroid = [0.0, 0.0];
                let mut boundary = 0.0;
                let mut boundary_centroid = [0.0, 0.0];

                for v in &comp {
                    let data = self.vof_data(*v);
                    let offset = [
                        ((v.cell.0 - 2 * cell.0) as f64 - 0.5) * 0.5,
                        ((v.cell.1 - 2 * cell.1) as f64 - 0.5) * 0.5,
                    ];
                    volume += data.volume_fraction;
                    boundary += data.boundary_area;

                    for d in 0..2 {
                        centroid[d] += data.volume_fraction * (offset[d] + 0.5 * data.centroid[d]);
                        boundary_centroid[d] += data.boundary_area * (offset[d] + 0.5 * data.boundary_centroid[d]);
                    }

                    for axis in Axis::ALL {
                        for side in Side::ALL {
                            for face in self.faces(*v, axis, side) {
                                let other = face.other(*v);

                                if block.contains(other.cell) {
                                    continue;
                                }
                                let area = 0.5 * self.area_fraction(&face);
                                let id = if face.boundary {
                                    0
                                } else {
                                    let image = self.image_or_panic(other.cell);
                                    let coarse = (image.0.div_euclid(2), image.1.div_euclid(2));
                                    match kind_at(coarse) {
                                        CellKind::Regular => 0,
                                        CellKind::Irregular => coarse_id[&VolIndex::new(image, other.id)],
                                        CellKind::Covered => panic!("EbGraph::coarsen - face of {:?} leads into a covered coarse cell", v),
                                    }
                                };
                                let arcs = &mut faces[axis.index()][side.index()];

                                match arcs.iter_mut().find(|a| a.id == id) {
                                    Some(arc) => arc.area += area,
                                    None => arcs.push(FaceArc { id, area }),
                                }
                            }
                        }
                    }
                }

                if volume > 0.0 {
                    centroid = [centroid[0] / volume, centroid[1] / volume];
                }
                if boundary > 0.0 {
                    boundary_centroid = [boundary_centroid[0] / boundary, boundary_centroid[1] / boundary];
                }
                let apertures = [
                    [faces[0][0].iter().map(|a| a.area).sum(), faces[0][1].iter().map(|a| a.area).sum()],
                    [faces[1][0].iter().map(|a| a.area).sum(), faces[1][1].iter().map(|a| a.area).sum()],
                ];
                let data = VofData::from_apertures(0.25 * volume, apertures, centroid, boundary_centroid);

                IrregularVof { faces, data, merged: comp.len() > 1, fine: comp }
            }).collect())
        });

        Ok(Self { domain, tag: GraphTag::HasIrregular(cells.collect()) })
    }

    fn fine_block(cell: (i64, i64)) -> IndexSpace {
        IndexSpace::new(2 * cell.0..2 * cell.0 + 2, 2 * cell.1..2 * cell.1 + 2)
    }

    /// Group the volumes of a block of cells into components connected by
    /// faces inside the block. Components are ordered by their first volume
    /// in row-major order.
    ///
    fn connected_components(&self, block: &IndexSpace) -> Vec<Vec<VolIndex>> {
        let vofs: Vec<VolIndex> = block.iter().flat_map(|c| self.vofs_in(c)).collect();
        let mut parent: Vec<usize> = (0..vofs.len()).collect();

        fn root(parent: &mut [usize], mut n: usize) -> usize {
            while parent[n] != n {
                parent[n] = parent[parent[n]];
                n = parent[n];
            }
            n
        }

        for (n, v) in vofs.iter().enumerate() {
            for axis in Axis::ALL {
                for face in self.faces(*v, axis, Side::Hi) {
                    if let Some(m) = vofs.iter().position(|w| *w == face.hi) {
                        let (a, b) = (root(&mut parent, n), root(&mut parent, m));
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }

        let mut groups: Vec<(usize, Vec<VolIndex>)> = Vec::new();

        for (n, v) in vofs.iter().enumerate() {
            let r = root(&mut parent, n);
            match groups.iter_mut().find(|(g, _)| *g == r) {
                Some((_, members)) => members.push(*v),
                None => groups.push((r, vec![*v])),
            }
        }
        groups.into_iter().map(|(_, members)| members).collect()
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use approx::assert_relative_eq;
    use crate::eb::implicit::{Circle, Complement, ImplicitFunction, Plane};
    use crate::eb::index::{CellKind, VolIndex};
    use crate::error::CoarseningError;
    use crate::index_space::{range2d, Axis, Side};
    use crate::problem_domain::ProblemDomain;
    use super::{CoarseningPolicy, EbGraph};

    /// Fluid in the two diagonal quadrants around the node (2, 2), solid in
    /// the other two, on a 4x4 grid of unit cells.
    struct Saddle;

    impl ImplicitFunction for Saddle {
        fn value(&self, p: [f64; 2]) -> f64 {
            let v = (p[0] - 1.5) * (p[1] - 1.5);
            if v == 0.0 { 1e-3 } else { -v }
        }
    }

    fn obstacle_graph(n: i64) -> EbGraph {
        let domain = ProblemDomain::non_periodic(range2d(0..n, 0..n));
        let dx = 1.0 / n as f64;
        EbGraph::from_implicit(&domain, dx, &Complement(Circle { center: [0.5, 0.5], radius: 0.3 }))
    }

    #[test]
    fn half_plane_cells_are_classified() {
        let domain = ProblemDomain::non_periodic(range2d(0..4, 0..4));
        let plane = Plane { normal: [0.0, 1.0], point: [0.0, 0.5] };
        let graph = EbGraph::from_implicit(&domain, 0.25, &plane);

        assert_eq!(graph.classify((0, 0)), CellKind::Regular);
        assert_eq!(graph.classify((0, 3)), CellKind::Covered);
        assert_eq!(graph.classify((0, 2)), CellKind::Covered);
        assert_eq!(graph.num_vofs((1, 3)), 0);
    }

    #[test]
    fn cut_cell_moments() {
        let domain = ProblemDomain::non_periodic(range2d(0..4, 0..4));
        let plane = Plane { normal: [0.0, 1.0], point: [0.0, 0.625] };
        let graph = EbGraph::from_implicit(&domain, 0.25, &plane);
        let vof = VolIndex::new((1, 2), 0);
        let data = graph.vof_data(vof);

        assert_eq!(graph.classify((1, 2)), CellKind::Irregular);
        assert_relative_eq!(data.volume_fraction, 0.5, epsilon = 1e-10);
        assert_relative_eq!(data.normal[1], 1.0, epsilon = 1e-10);
        assert_relative_eq!(data.boundary_area, 1.0, epsilon = 1e-10);

        let side = graph.face_between(vof, VolIndex::new((2, 2), 0), Axis::I).unwrap();
        assert_relative_eq!(graph.area_fraction(&side), 0.5, epsilon = 1e-10);
        assert!(graph.faces(vof, Axis::J, Side::Hi).is_empty());

        let below = graph.faces(vof, Axis::J, Side::Lo);
        assert_eq!(below.len(), 1);
        assert_relative_eq!(graph.area_fraction(&below[0]), 1.0);
    }

    #[test]
    fn faces_are_symmetric() {
        let graph = obstacle_graph(16);

        for cell in range2d(0..16, 0..16).iter() {
            for vof in graph.vofs_in(cell) {
                for axis in Axis::ALL {
                    for face in graph.faces(vof, axis, Side::Hi).into_iter().filter(|f| !f.boundary) {
                        let back = graph.faces(face.hi, axis, Side::Lo);
                        let reciprocal = back.iter().find(|f| f.lo == vof).unwrap();
                        assert_relative_eq!(graph.area_fraction(reciprocal), graph.area_fraction(&face));
                    }
                }
            }
        }
    }

    #[test]
    fn domain_edges_give_boundary_faces() {
        let graph = obstacle_graph(8);
        let faces = graph.faces(VolIndex::new((0, 3), 0), Axis::I, Side::Lo);
        assert_eq!(faces.len(), 1);
        assert!(faces[0].boundary);
        assert_eq!(faces[0].lo.cell, (-1, 3));
    }

    #[test]
    fn saddle_cell_holds_two_volumes() {
        let domain = ProblemDomain::non_periodic(range2d(0..4, 0..4));
        let graph = EbGraph::from_implicit(&domain, 1.0, &Saddle);
        assert!(graph.is_multi_valued((1, 1)));
        assert_eq!(graph.vofs_in((1, 1)).len(), 2);

        let total: f64 = graph.vofs_in((1, 1)).iter().map(|v| graph.vof_data(*v).volume_fraction).sum();
        assert!(total > 0.0 && total < 1.0);
    }

    #[test]
    fn coarsening_conserves_volume() {
        let fine = obstacle_graph(32);
        let coarse = fine.coarsen(CoarseningPolicy::SplitComponents).unwrap();

        let volume = |g: &EbGraph, n: i64| -> f64 {
            range2d(0..n, 0..n).iter()
                .flat_map(|c| g.vofs_in(c))
                .map(|v| g.vof_data(v).volume_fraction)
                .sum()
        };
        assert_relative_eq!(volume(&fine, 32), 4.0 * volume(&coarse, 16), epsilon = 1e-9);
        assert_eq!(coarse.classify((8, 8)), CellKind::Covered);
        assert_eq!(coarse.classify((0, 0)), CellKind::Regular);
    }

    #[test]
    fn refine_of_coarsen_contains_the_vof() {
        let fine = obstacle_graph(32);
        let coarse = fine.coarsen(CoarseningPolicy::SplitComponents).unwrap();

        for cell in fine.irregular_cells(&range2d(0..32, 0..32)) {
            for vof in fine.vofs_in(cell) {
                let parent = coarse.coarse_vof(vof);
                assert!(coarse.fine_vofs(parent).contains(&vof));
            }
        }
    }

    #[test]
    fn single_valued_policy_reports_split_cells() {
        let domain = ProblemDomain::non_periodic(range2d(0..4, 0..4));
        let graph = EbGraph::from_implicit(&domain, 1.0, &Saddle);
        let split = graph.coarsen(CoarseningPolicy::SplitComponents).unwrap();

        assert_eq!(split.num_vofs((0, 0)), 2);
        assert!(split.is_merged(VolIndex::new((0, 0), 0)));
        assert!(!split.is_merged(VolIndex::new((0, 0), 1)));
        assert_eq!(
            graph.coarsen(CoarseningPolicy::SingleValued).unwrap_err(),
            CoarseningError::DisconnectedComponents(0, 0, 2));
    }

    #[test]
    fn odd_domains_are_not_coarsenable() {
        let coarse = obstacle_graph(6).coarsen(CoarseningPolicy::SplitComponents).unwrap();
        assert!(matches!(
            coarse.coarsen(CoarseningPolicy::SplitComponents),
            Err(CoarseningError::NotCoarsenable((3, 3), 2))));
    }
}
