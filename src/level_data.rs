use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::grid_array::GridArray;
use crate::index_space::IndexSpace;
use crate::layout::{DisjointBoxLayout, MAX_GHOST};
use crate::message::comm::TAG_EXCHANGE;
use crate::message::Communicator;




/// Describes one copy of a region between two boxes. The destination region
/// is in the destination's coordinates; the source index is the destination
/// index minus `shift`.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Motion {
    src: usize,
    dst: usize,
    region: IndexSpace,
    shift: (i64, i64),
}

#[derive(Serialize, Deserialize)]
struct Payload {
    motion: Motion,
    values: GridArray,
}




/// A partial aggregate over the valid cells of one box, tagged with the box
/// index so that the global fold can be carried out in layout order.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxPartial {
    pub index: usize,
    pub sum: f64,
    pub volume: f64,
    pub max: f64,
}




/// Gather the per-box partials from all ranks, sorted by box index. Every
/// rank receives the same list, so any fold over it is independent of the
/// number of ranks.
///
pub fn gather_partials(comm: &dyn Communicator, partials: Vec<BoxPartial>) -> Vec<BoxPartial> {
    let mut all = if comm.size() == 1 {
        partials
    } else {
        let concat = |a: Vec<u8>, b: Vec<u8>| -> Vec<u8> {
            let mut a: Vec<BoxPartial> = decode(&a);
            a.extend(decode::<Vec<BoxPartial>>(&b));
            encode(&a)
        };
        decode(&comm.all_reduce(&concat, encode(&partials)))
    };
    all.sort_by_key(|p| p.index);
    all
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    match rmp_serde::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => panic!("level_data::encode - {}", e),
    }
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> T {
    match rmp_serde::from_read_ref(bytes) {
        Ok(value) => value,
        Err(e) => panic!("level_data::decode - {}", e),
    }
}




/// Distributed data over a `DisjointBoxLayout`: one ghosted `GridArray` per
/// box owned by this rank. Remote boxes hold no storage.
///
#[derive(Clone, Debug)]
pub struct LevelData {
    layout: Arc<DisjointBoxLayout>,
    num_fields: usize,
    ghost: i64,
    fabs: Vec<Option<GridArray>>,
}




// ============================================================================
impl LevelData {

    pub fn new(layout: Arc<DisjointBoxLayout>, num_fields: usize, ghost: i64) -> Self {
        assert!(
            (0..=MAX_GHOST).contains(&ghost),
            "LevelData::new - ghost width {} not in 0..={}", ghost, MAX_GHOST);

        let fabs = (0..layout.len())
            .map(|n| if layout.is_local(n) {
                Some(GridArray::zeros(layout.get(n).extend_all(ghost), num_fields))
            } else {
                None
            })
            .collect();

        Self { layout, num_fields, ghost, fabs }
    }

    pub fn layout(&self) -> &Arc<DisjointBoxLayout> {
        &self.layout
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn ghost(&self) -> i64 {
        self.ghost
    }

    /// Return the array for a locally owned box.
    ///
    pub fn get(&self, index: usize) -> &GridArray {
        match &self.fabs[index] {
            Some(fab) => fab,
            None => panic!("LevelData::get - box {} is not owned by rank {}", index, self.layout.comm().rank()),
        }
    }

    pub fn get_mut(&mut self, index: usize) -> &mut GridArray {
        let rank = self.layout.comm().rank();
        match &mut self.fabs[index] {
            Some(fab) => fab,
            None => panic!("LevelData::get_mut - box {} is not owned by rank {}", index, rank),
        }
    }

    pub fn fabs(&self) -> &[Option<GridArray>] {
        &self.fabs
    }

    pub fn fabs_mut(&mut self) -> &mut [Option<GridArray>] {
        &mut self.fabs
    }

    /// Iterate over the locally owned boxes as (index, array) pairs.
    ///
    pub fn iter_local(&self) -> impl Iterator<Item = (usize, &GridArray)> {
        self.fabs.iter().enumerate().filter_map(|(n, f)| f.as_ref().map(|f| (n, f)))
    }

    pub fn set_val(&mut self, value: f64) {
        for fab in self.fabs.iter_mut().flatten() {
            fab.fill(value)
        }
    }

    /// Fill the ghost cells of every box from the valid cells of the boxes
    /// (or periodic images of boxes) that cover them. Ghost cells not
    /// covered by any box are left untouched.
    ///
    pub fn exchange(&mut self) {
        let mut motions = Vec::new();

        for dst in 0..self.layout.len() {
            let grown = self.layout.get(dst).extend_all(self.ghost);

            for nb in self.layout.neighbors(dst) {
                if let Some(region) = grown.intersect(&self.layout.get(nb.index).shift(nb.shift)) {
                    motions.push(Motion { src: nb.index, dst, region, shift: nb.shift })
                }
            }
        }
        let payloads = self.outgoing(&motions, &self.layout);
        let layout = self.layout.clone();
        self.incoming(&motions, payloads, &layout);
    }

    /// Copy the valid cells of this data into the valid cells of another
    /// level data over the same domain. Cells of `dest` not covered by this
    /// layout are left untouched.
    ///
    pub fn copy_to(&self, dest: &mut LevelData) {
        self.copy_into(dest, 0)
    }

    /// Like `copy_to`, but also fill the ghost cells of `dest` from the
    /// valid cells (or periodic images of valid cells) of this data.
    ///
    pub fn copy_to_ghosted(&self, dest: &mut LevelData) {
        let ghost = dest.ghost;
        self.copy_into(dest, ghost)
    }

    fn copy_into(&self, dest: &mut LevelData, grow: i64) {
        assert_eq!(self.num_fields, dest.num_fields, "LevelData::copy_to - field count mismatch");
        assert_eq!(
            self.layout.domain(), dest.layout.domain(),
            "LevelData::copy_to - layouts are over different domains");

        let shifts = if grow > 0 { self.layout.domain().periodic_shifts() } else { vec![(0, 0)] };
        let mut motions = Vec::new();

        for (dst, dst_box) in dest.layout.boxes().iter().enumerate() {
            let grown = dst_box.extend_all(grow);

            for (src, src_box) in self.layout.boxes().iter().enumerate() {
                for &shift in &shifts {
                    if let Some(region) = grown.intersect(&src_box.shift(shift)) {
                        motions.push(Motion { src, dst, region, shift })
                    }
                }
            }
        }
        let payloads = self.outgoing(&motions, &dest.layout);
        dest.incoming(&motions, payloads, &self.layout);
    }

    /// Extract the payloads of all motions whose source is local. Payloads
    /// bound for remote ranks are sent; local ones are returned.
    ///
    fn outgoing(&self, motions: &[Motion], dest_layout: &DisjointBoxLayout) -> Vec<Payload> {
        let comm = self.layout.comm();
        let mut local = Vec::new();

        for motion in motions.iter().filter(|m| self.layout.is_local(m.src)) {
            let source_region = motion.region.shift((-motion.shift.0, -motion.shift.1));
            let payload = Payload {
                motion: motion.clone(),
                values: self.get(motion.src).extract(&source_region),
            };
            let owner = dest_layout.owner(motion.dst);

            if owner == comm.rank() {
                local.push(payload)
            } else {
                comm.send_tagged(owner, TAG_EXCHANGE, encode(&payload))
            }
        }
        local
    }

    /// Apply local payloads, then receive the remote payloads expected for
    /// the locally owned destinations.
    ///
    fn incoming(&mut self, motions: &[Motion], local: Vec<Payload>, source_layout: &DisjointBoxLayout) {
        for payload in local {
            self.apply(payload)
        }

        let comm = self.layout.comm().clone();
        let mut expected: Vec<Motion> = motions
            .iter()
            .filter(|m| self.layout.is_local(m.dst) && !source_layout.is_local(m.src))
            .cloned()
            .collect();
        let mut stash = Vec::new();

        while !expected.is_empty() {
            let bytes = comm.recv_tagged(TAG_EXCHANGE);
            let payload: Payload = decode(&bytes);

            match expected.iter().position(|m| *m == payload.motion) {
                Some(n) => {
                    expected.swap_remove(n);
                    self.apply(payload)
                }
                None => {
                    let mut bytes = bytes;
                    bytes.insert(0, TAG_EXCHANGE);
                    stash.push(bytes)
                }
            }
        }
        if !stash.is_empty() {
            comm.requeue_recv(stash)
        }
    }

    fn apply(&mut self, payload: Payload) {
        let shift = payload.motion.shift;
        let region = &payload.motion.region;
        self.get_mut(payload.motion.dst).copy_from_shifted(&payload.values, region, shift)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use std::thread;
    use crate::index_space::range2d;
    use crate::layout::DisjointBoxLayout;
    use crate::message::{ChannelCommunicator, SerialCommunicator};
    use crate::problem_domain::ProblemDomain;
    use super::{gather_partials, BoxPartial, LevelData};

    fn fill_with_position(data: &mut LevelData) {
        let layout = data.layout().clone();
        for n in layout.local_indexes() {
            let valid = layout.get(n).clone();
            let fab = data.get_mut(n);
            for (i, j) in valid.iter() {
                fab.set((i, j), (100 * i + j) as f64)
            }
        }
    }

    #[test]
    fn exchange_fills_interior_ghosts() {
        let domain = ProblemDomain::non_periodic(range2d(0..8, 0..8));
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, 4, Arc::new(SerialCommunicator)));
        let mut data = LevelData::new(layout, 1, 1);
        fill_with_position(&mut data);
        data.exchange();

        assert_eq!(data.get(0).get((4, 2)), 402.0);
        assert_eq!(data.get(0).get((4, 4)), 404.0);
        assert_eq!(data.get(3).get((3, 3)), 303.0);
        assert_eq!(data.get(0).get((-1, 0)), 0.0);
    }

    #[test]
    fn exchange_wraps_periodic_images() {
        let domain = ProblemDomain::new(range2d(0..8, 0..4), [true, true]);
        let layout = Arc::new(DisjointBoxLayout::uniform(domain, 4, Arc::new(SerialCommunicator)));
        let mut data = LevelData::new(layout, 1, 1);
        fill_with_position(&mut data);
        data.exchange();

        assert_eq!(data.get(0).get((-1, 0)), 700.0);
        assert_eq!(data.get(0).get((0, -1)), 3.0);
        assert_eq!(data.get(1).get((8, 4)), 0.0);
    }

    #[test]
    fn copy_to_a_different_layout() {
        let domain = ProblemDomain::non_periodic(range2d(0..8, 0..8));
        let comm = Arc::new(SerialCommunicator);
        let blocks = Arc::new(DisjointBoxLayout::uniform(domain.clone(), 4, comm.clone()));
        let single = Arc::new(DisjointBoxLayout::single(domain, comm));
        let mut source = LevelData::new(blocks, 1, 0);
        let mut dest = LevelData::new(single, 1, 2);
        fill_with_position(&mut source);
        source.copy_to(&mut dest);

        assert_eq!(dest.get(0).get((7, 5)), 705.0);
        assert_eq!(dest.get(0).get((-1, -1)), 0.0);
    }

    #[test]
    fn copy_to_ghosted_fills_periodic_ghosts() {
        let domain = ProblemDomain::new(range2d(0..8, 0..8), [true, false]);
        let comm = Arc::new(SerialCommunicator);
        let blocks = Arc::new(DisjointBoxLayout::uniform(domain.clone(), 4, comm.clone()));
        let single = Arc::new(DisjointBoxLayout::new(domain, vec![range2d(0..4, 0..4)], vec![0], comm));
        let mut source = LevelData::new(blocks, 1, 0);
        let mut dest = LevelData::new(single, 1, 1);
        fill_with_position(&mut source);
        source.copy_to_ghosted(&mut dest);

        assert_eq!(dest.get(0).get((4, 2)), 402.0);
        assert_eq!(dest.get(0).get((-1, 2)), 702.0);
        assert_eq!(dest.get(0).get((2, -1)), 0.0);
    }

    #[test]
    fn exchange_across_ranks() {
        let handles: Vec<_> = ChannelCommunicator::group(3)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let domain = ProblemDomain::new(range2d(0..12, 0..4), [true, false]);
                let layout = Arc::new(DisjointBoxLayout::uniform(domain, 4, Arc::new(comm)));
                let mut data = LevelData::new(layout.clone(), 1, 1);
                fill_with_position(&mut data);
                data.exchange();
                data.exchange();

                let n = layout.local_indexes()[0];
                let fab = data.get(n);
                let lo = layout.get(n).start().0;
                (fab.get((lo - 1, 1)), fab.get((lo + 4, 1)))
            }))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0], (1101.0, 401.0));
        assert_eq!(results[1], (301.0, 801.0));
        assert_eq!(results[2], (701.0, 1.0));
    }

    #[test]
    fn partials_are_sorted_by_box() {
        let partial = |index| BoxPartial { index, sum: index as f64, volume: 1.0, max: 0.0 };
        let gathered = gather_partials(&SerialCommunicator, vec![partial(2), partial(0), partial(1)]);
        assert_eq!(gathered.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
