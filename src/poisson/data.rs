use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::eb::VolIndex;
use crate::grid_array::GridArray;
use crate::level_data::{decode, encode, LevelData};
use crate::message::comm::TAG_EXCHANGE_MULTI;
use crate::level_geometry::{CellStencil, LevelGeometry};
use crate::problem_domain::ProblemDomain;
use crate::solver::LevelShape;




/// One scalar per volume of fluid over a level. Volumes with `id = 0` are
/// stored in a ghosted `LevelData`; the further volumes of multi-valued
/// cells (valid or ghost) are kept in a per-box map. Every instance carries
/// the ghost width of its geometry.
///
#[derive(Clone, Debug)]
pub struct EbLevelData {
    geom: Arc<LevelGeometry>,
    data: LevelData,
    multi: Vec<BTreeMap<VolIndex, f64>>,
}




// ============================================================================
impl EbLevelData {

    pub fn new(geom: Arc<LevelGeometry>) -> Self {
        let layout = geom.layout().clone();
        let data = LevelData::new(layout.clone(), 1, geom.ghost());
        let multi = (0..layout.len())
            .map(|n| if layout.is_local(n) {
                geom.get(n).extra_vofs.iter().map(|&v| (v, 0.0)).collect()
            } else {
                BTreeMap::new()
            })
            .collect();
        Self { geom, data, multi }
    }

    /// Build data with every volume set from a function of its cell center
    /// (in physical units, relative to the domain origin).
    ///
    pub fn from_function<F>(geom: Arc<LevelGeometry>, f: F) -> Self
    where
        F: Fn([f64; 2]) -> f64
    {
        let mut result = Self::new(geom);
        let dx = result.geom.dx();
        let center = |(i, j): (i64, i64)| [(i as f64 + 0.5) * dx, (j as f64 + 0.5) * dx];

        for n in result.geom.layout().local_indexes() {
            let fab = result.data.get_mut(n);
            let space = fab.space().clone();

            for cell in space.iter() {
                fab.set(cell, f(center(cell)))
            }
            for (vof, value) in result.multi[n].iter_mut() {
                *value = f(center(vof.cell))
            }
        }
        result
    }

    /// Multiply every valid volume by its volume fraction, and zero covered
    /// cells: the form a right-hand side takes for the conservative
    /// operator.
    ///
    pub fn scale_by_volume_fraction(&mut self) {
        let geom = self.geom.clone();

        for n in geom.layout().local_indexes() {
            let bg = geom.get(n);
            let (fab, multi) = self.box_mut(n);
            let mut values = BoxValuesMut { fab, multi };

            for cell in bg.valid.iter() {
                match bg.cell(cell) {
                    CellStencil::Regular => {}
                    CellStencil::Covered => values.set_cell(cell, 0.0),
                    CellStencil::General(range) => {
                        for s in &bg.vofs[range.clone()] {
                            values.set(s.vof, s.kappa * values.value(s.vof))
                        }
                    }
                }
            }
        }
    }

    pub fn geometry(&self) -> &Arc<LevelGeometry> {
        &self.geom
    }

    pub fn level_data(&self) -> &LevelData {
        &self.data
    }

    pub fn level_data_mut(&mut self) -> &mut LevelData {
        &mut self.data
    }

    /// The value of a volume in local box `index`.
    ///
    pub fn get(&self, index: usize, vof: VolIndex) -> f64 {
        BoxValues { fab: self.data.get(index), multi: &self.multi[index] }.value(vof)
    }

    pub fn set(&mut self, index: usize, vof: VolIndex, value: f64) {
        let (fab, multi) = self.box_mut(index);
        BoxValuesMut { fab, multi }.set(vof, value)
    }

    pub(crate) fn values(&self, index: usize) -> BoxValues<'_> {
        BoxValues { fab: self.data.get(index), multi: &self.multi[index] }
    }

    pub(crate) fn box_mut(&mut self, index: usize) -> (&mut GridArray, &mut BTreeMap<VolIndex, f64>) {
        (self.data.get_mut(index), &mut self.multi[index])
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut [Option<GridArray>], &mut [BTreeMap<VolIndex, f64>]) {
        (self.data.fabs_mut(), &mut self.multi)
    }

    pub fn set_val(&mut self, value: f64) {
        self.data.set_val(value);

        for map in &mut self.multi {
            map.values_mut().for_each(|v| *v = value)
        }
    }

    /// Apply `f(dest, src)` to every stored value of this and another
    /// instance over the same geometry, ghost cells included.
    ///
    pub(crate) fn zip_apply<F>(&mut self, other: &Self, f: F)
    where
        F: Fn(&mut f64, f64)
    {
        self.check_same_geometry(other, "zip_apply");

        for (a, b) in self.data.fabs_mut().iter_mut().zip(other.data.fabs()) {
            if let (Some(a), Some(b)) = (a, b) {
                a.data_mut().iter_mut().zip(b.data()).for_each(|(x, y)| f(x, *y))
            }
        }
        for (a, b) in self.multi.iter_mut().zip(&other.multi) {
            for (vof, x) in a.iter_mut() {
                if let Some(y) = b.get(vof) {
                    f(x, *y)
                }
            }
        }
    }

    pub(crate) fn map_values<F>(&mut self, f: F)
    where
        F: Fn(&mut f64)
    {
        for fab in self.data.fabs_mut().iter_mut().flatten() {
            fab.data_mut().iter_mut().for_each(&f)
        }
        for map in &mut self.multi {
            map.values_mut().for_each(&f)
        }
    }

    pub(crate) fn check_same_geometry(&self, other: &Self, what: &str) {
        if !Arc::ptr_eq(&self.geom, &other.geom) && **self.geom.layout() != **other.geom.layout() {
            panic!("EbLevelData::{} - data are over different layouts", what)
        }
    }

    /// Fill ghost cells covered by other boxes of the layout, including
    /// periodic images. The extra volumes of multi-valued ghost cells travel
    /// in a second round of messages, one per neighboring box pair whose
    /// source is remote, sent even when it carries no values.
    ///
    pub fn exchange(&mut self) {
        self.data.exchange();

        let layout = self.geom.layout().clone();
        let comm = layout.comm().clone();
        let ghost = self.geom.ghost();
        let mut local = Vec::new();
        let mut expected = Vec::new();

        for dst in 0..layout.len() {
            let grown = layout.get(dst).extend_all(ghost);

            for nb in layout.neighbors(dst) {
                let region = match grown.intersect(&layout.get(nb.index).shift(nb.shift)) {
                    Some(region) => region,
                    None => continue,
                };
                if layout.is_local(nb.index) {
                    let src_box = layout.get(nb.index);
                    let values = self.multi[nb.index]
                        .iter()
                        .filter(|(vof, _)| src_box.contains(vof.cell))
                        .map(|(vof, &x)| (VolIndex::new((vof.cell.0 + nb.shift.0, vof.cell.1 + nb.shift.1), vof.id), x))
                        .filter(|(vof, _)| region.contains(vof.cell))
                        .collect();
                    let payload = MultiPayload { src: nb.index, dst, shift: nb.shift, values };

                    if layout.is_local(dst) {
                        local.push(payload)
                    } else {
                        comm.send_tagged(layout.owner(dst), TAG_EXCHANGE_MULTI, encode(&payload))
                    }
                } else if layout.is_local(dst) {
                    expected.push((nb.index, dst, nb.shift))
                }
            }
        }
        for payload in local {
            self.apply_multi(payload)
        }

        let mut stash = Vec::new();

        while !expected.is_empty() {
            let bytes = comm.recv_tagged(TAG_EXCHANGE_MULTI);
            let payload: MultiPayload = decode(&bytes);

            match expected.iter().position(|&key| key == (payload.src, payload.dst, payload.shift)) {
                Some(n) => {
                    expected.swap_remove(n);
                    self.apply_multi(payload)
                }
                None => {
                    let mut bytes = bytes;
                    bytes.insert(0, TAG_EXCHANGE_MULTI);
                    stash.push(bytes)
                }
            }
        }
        if !stash.is_empty() {
            comm.requeue_recv(stash)
        }
    }

    fn apply_multi(&mut self, payload: MultiPayload) {
        let map = &mut self.multi[payload.dst];

        for (vof, value) in payload.values {
            if let Some(x) = map.get_mut(&vof) {
                *x = value
            }
        }
    }
}




/// The extra volumes of box `src`, translated by `shift`, that fall in the
/// ghost region of box `dst`.
///
#[derive(Serialize, Deserialize)]
struct MultiPayload {
    src: usize,
    dst: usize,
    shift: (i64, i64),
    values: Vec<(VolIndex, f64)>,
}




/// Read access to the values of one box.
///
#[derive(Clone, Copy)]
pub(crate) struct BoxValues<'a> {
    pub fab: &'a GridArray,
    pub multi: &'a BTreeMap<VolIndex, f64>,
}

impl<'a> BoxValues<'a> {
    pub fn value(&self, vof: VolIndex) -> f64 {
        if vof.id == 0 {
            return self.fab.get(vof.cell);
        }
        match self.multi.get(&vof) {
            Some(&value) => value,
            None => panic!("EbLevelData - no storage for volume {:?}", vof),
        }
    }
}

pub(crate) struct BoxValuesMut<'a> {
    pub fab: &'a mut GridArray,
    pub multi: &'a mut BTreeMap<VolIndex, f64>,
}

impl<'a> BoxValuesMut<'a> {
    pub fn values(&self) -> BoxValues<'_> {
        BoxValues { fab: &*self.fab, multi: &*self.multi }
    }

    pub fn value(&self, vof: VolIndex) -> f64 {
        self.values().value(vof)
    }

    pub fn set(&mut self, vof: VolIndex, value: f64) {
        if vof.id == 0 {
            self.fab.set(vof.cell, value)
        } else {
            match self.multi.get_mut(&vof) {
                Some(v) => *v = value,
                None => panic!("EbLevelData - no storage for volume {:?}", vof),
            }
        }
    }

    /// Set every volume of a cell to the same value.
    ///
    pub fn set_cell(&mut self, cell: (i64, i64), value: f64) {
        self.fab.set(cell, value);

        for (_, v) in self.multi.range_mut(VolIndex::new(cell, 1)..=VolIndex::new(cell, usize::MAX)) {
            *v = value
        }
    }
}




// ============================================================================
impl LevelShape for EbLevelData {
    fn problem_domain(&self) -> &ProblemDomain {
        self.geom.layout().domain()
    }

    fn is_coarsenable(&self) -> bool {
        self.geom.coarser().is_some()
    }

    fn is_coarsening_of(&self, fine: &Self) -> bool {
        self.geom.is_coarsening_of(&fine.geom)
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use std::thread;
    use crate::eb::{AllRegular, CoarseningPolicy, EbIndexSpace, ImplicitFunction, VolIndex};
    use crate::index_space::range2d;
    use crate::layout::DisjointBoxLayout;
    use crate::level_geometry::LevelGeometry;
    use crate::message::{ChannelCommunicator, Communicator, SerialCommunicator};
    use crate::problem_domain::ProblemDomain;
    use super::EbLevelData;

    fn periodic_geometry() -> Arc<LevelGeometry> {
        let domain = ProblemDomain::new(range2d(0..8, 0..8), [true, true]);
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0 / 8.0, &AllRegular, CoarseningPolicy::default(), None));
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, 4, Arc::new(SerialCommunicator)));
        Arc::new(LevelGeometry::new(layout, ebis, 1, None))
    }

    /// Fluid in two opposite quadrants around the center of cell (3, 3),
    /// which therefore holds two volumes.
    struct Saddle;

    impl ImplicitFunction for Saddle {
        fn value(&self, p: [f64; 2]) -> f64 {
            let v = (p[0] - 3.5) * (p[1] - 3.5);
            if v == 0.0 { 1e-3 } else { -v }
        }
    }

    fn saddle_geometry(comm: Arc<dyn Communicator>) -> Arc<LevelGeometry> {
        let domain = ProblemDomain::non_periodic(range2d(0..8, 0..8));
        let ebis = Arc::new(EbIndexSpace::new(domain.clone(), 1.0, &Saddle, CoarseningPolicy::default(), Some(0)));
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, 4, comm));
        Arc::new(LevelGeometry::new(layout, ebis, 1, None))
    }

    fn label(vof: VolIndex) -> f64 {
        (100 * vof.cell.0 + 10 * vof.cell.1) as f64 + vof.id as f64
    }

    #[test]
    fn from_function_evaluates_cell_centers() {
        let data = EbLevelData::from_function(periodic_geometry(), |[x, y]| x + 10.0 * y);
        assert_eq!(data.get(0, VolIndex::new((0, 0), 0)), 0.0625 + 0.625);
    }

    #[test]
    fn exchange_wraps_periodic_ghosts() {
        let geom = periodic_geometry();
        let mut data = EbLevelData::new(geom.clone());

        for n in 0..4 {
            for cell in geom.layout().get(n).iter() {
                data.set(n, VolIndex::new(cell, 0), (10 * cell.0 + cell.1) as f64)
            }
        }
        data.exchange();
        assert_eq!(data.get(0, VolIndex::new((-1, 2), 0)), 72.0);
        assert_eq!(data.get(0, VolIndex::new((4, 2), 0)), 42.0);
    }

    #[test]
    fn exchange_fills_multi_valued_ghosts_across_ranks() {
        let compute = |comm: Arc<dyn Communicator>| {
            let geom = saddle_geometry(comm);
            let layout = geom.layout().clone();
            let mut data = EbLevelData::new(geom.clone());

            for n in layout.local_indexes() {
                for &vof in geom.get(n).extra_vofs.iter().filter(|v| layout.get(n).contains(v.cell)) {
                    data.set(n, vof, label(vof))
                }
            }
            data.exchange();

            let mut filled = 0;
            for n in layout.local_indexes() {
                for &vof in geom.get(n).extra_vofs.iter().filter(|v| !layout.get(n).contains(v.cell)) {
                    assert_eq!(data.get(n, vof), label(vof));
                    filled += 1;
                }
            }
            filled
        };
        assert_eq!(compute(Arc::new(SerialCommunicator)), 3);

        let handles: Vec<_> = ChannelCommunicator::group(2)
            .into_iter()
            .map(|comm| thread::spawn(move || compute(Arc::new(comm))))
            .collect();
        let filled: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(filled, 3);
    }
}
