use std::fmt;
use std::sync::Arc;
use crate::index_space::IndexSpace;
use crate::message::Communicator;
use crate::problem_domain::ProblemDomain;




/// The widest ghost region a level data object may carry over a layout.
/// Neighbor lists are built for boxes grown by this many cells.
pub const MAX_GHOST: i64 = 4;




/// A box which lies within `MAX_GHOST` cells of another box, possibly
/// through a periodic image. The neighbor's periodic image is the box
/// translated by `shift`.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub index: usize,
    pub shift: (i64, i64),
}




/// An ordered collection of non-overlapping boxes within a problem domain,
/// each owned by one rank of a communicator. The union of the boxes need not
/// cover the domain. Layouts are immutable and shared behind an `Arc`.
///
pub struct DisjointBoxLayout {
    domain: ProblemDomain,
    boxes: Vec<IndexSpace>,
    owners: Vec<usize>,
    neighbors: Vec<Vec<Neighbor>>,
    comm: Arc<dyn Communicator>,
}




// ============================================================================
impl DisjointBoxLayout {

    /// Create a layout from explicit boxes and owner ranks.
    ///
    /// # Panics
    ///
    /// If two boxes overlap, if a box lies outside the domain, or if an owner
    /// rank does not exist in the communicator.
    ///
    pub fn new(
        domain: ProblemDomain,
        boxes: Vec<IndexSpace>,
        owners: Vec<usize>,
        comm: Arc<dyn Communicator>) -> Self
    {
        assert_eq!(boxes.len(), owners.len(), "DisjointBoxLayout::new - one owner per box is required");

        for (n, b) in boxes.iter().enumerate() {
            if b.is_empty() || !domain.space().contains_space(b) {
                panic!("DisjointBoxLayout::new - box {} {:?} is empty or outside the domain {:?}", n, b, domain.space())
            }
            if owners[n] >= comm.size() {
                panic!("DisjointBoxLayout::new - box {} owned by rank {} of {}", n, owners[n], comm.size())
            }
            for (m, c) in boxes.iter().enumerate().take(n) {
                if b.overlaps(c) {
                    panic!("DisjointBoxLayout::new - boxes {} and {} overlap", m, n)
                }
            }
        }

        let shifts = domain.periodic_shifts();
        let neighbors = boxes
            .iter()
            .enumerate()
            .map(|(n, b)| {
                let grown = b.extend_all(MAX_GHOST);
                let mut list = Vec::new();

                for (m, c) in boxes.iter().enumerate() {
                    for &shift in &shifts {
                        if m == n && shift == (0, 0) {
                            continue;
                        }
                        if grown.overlaps(&c.shift(shift)) {
                            list.push(Neighbor { index: m, shift })
                        }
                    }
                }
                list
            })
            .collect();

        Self { domain, boxes, owners, neighbors, comm }
    }


    /// Decompose the domain into square blocks of the given size (the last
    /// row and column may be smaller), owned round-robin by the ranks of the
    /// communicator.
    ///
    pub fn uniform(domain: ProblemDomain, block: i64, comm: Arc<dyn Communicator>) -> Self {
        assert!(block > 0, "DisjointBoxLayout::uniform - block size must be positive");

        let space = domain.space().clone();
        let (i0, j0) = space.start();
        let (i1, j1) = space.end();
        let mut boxes = Vec::new();

        for i in (i0..i1).step_by(block as usize) {
            for j in (j0..j1).step_by(block as usize) {
                boxes.push(IndexSpace::new(i..(i + block).min(i1), j..(j + block).min(j1)))
            }
        }
        let owners = (0..boxes.len()).map(|n| n % comm.size()).collect();
        Self::new(domain, boxes, owners, comm)
    }


    /// A layout with one box covering the whole domain, owned by rank 0.
    ///
    pub fn single(domain: ProblemDomain, comm: Arc<dyn Communicator>) -> Self {
        let space = domain.space().clone();
        Self::new(domain, vec![space], vec![0], comm)
    }

    pub fn domain(&self) -> &ProblemDomain {
        &self.domain
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[IndexSpace] {
        &self.boxes
    }

    pub fn get(&self, index: usize) -> &IndexSpace {
        &self.boxes[index]
    }

    pub fn owner(&self, index: usize) -> usize {
        self.owners[index]
    }

    pub fn is_local(&self, index: usize) -> bool {
        self.owners[index] == self.comm.rank()
    }

    /// Return the indexes of the boxes owned by this rank, in layout order.
    ///
    pub fn local_indexes(&self) -> Vec<usize> {
        (0..self.len()).filter(|&n| self.is_local(n)).collect()
    }

    pub fn neighbors(&self, index: usize) -> &[Neighbor] {
        &self.neighbors[index]
    }

    /// Return the index of the box containing a cell, after mapping the cell
    /// to its periodic image.
    ///
    pub fn find(&self, cell: (i64, i64)) -> Option<usize> {
        let cell = self.domain.image(cell)?;
        self.boxes.iter().position(|b| b.contains(cell))
    }

    pub fn covers(&self, cell: (i64, i64)) -> bool {
        self.find(cell).is_some()
    }

    pub fn is_coarsenable(&self, ratio: i64) -> bool {
        self.domain.is_coarsenable(ratio) && self.boxes.iter().all(|b| b.is_coarsenable(ratio))
    }

    /// Coarsen every box by the given ratio, preserving order and owners.
    ///
    /// # Panics
    ///
    /// If a box is not coarsenable by the ratio.
    ///
    pub fn coarsen(&self, ratio: i64) -> Self {
        if !self.is_coarsenable(ratio) {
            panic!("DisjointBoxLayout::coarsen - layout is not coarsenable by {}", ratio)
        }
        Self::new(
            self.domain.coarsen_by(ratio),
            self.boxes.iter().map(|b| b.coarsen_by(ratio)).collect(),
            self.owners.clone(),
            self.comm.clone())
    }

    pub fn refine(&self, ratio: i64) -> Self {
        Self::new(
            self.domain.refine_by(ratio),
            self.boxes.iter().map(|b| b.refine_by(ratio)).collect(),
            self.owners.clone(),
            self.comm.clone())
    }

    /// Determine whether this layout is box-for-box the coarsening of a finer
    /// one by the given ratio.
    ///
    pub fn is_coarsening_of(&self, fine: &Self, ratio: i64) -> bool {
        self.len() == fine.len()
            && self.domain == fine.domain.coarsen_by(ratio)
            && self.boxes.iter().zip(&fine.boxes).all(|(c, f)| *c == f.coarsen_by(ratio))
    }
}




// ============================================================================
impl PartialEq for DisjointBoxLayout {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.boxes == other.boxes && self.owners == other.owners
    }
}

impl fmt::Debug for DisjointBoxLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisjointBoxLayout")
            .field("domain", &self.domain)
            .field("boxes", &self.boxes)
            .field("owners", &self.owners)
            .finish()
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::sync::Arc;
    use crate::index_space::range2d;
    use crate::message::SerialCommunicator;
    use crate::problem_domain::ProblemDomain;
    use super::{DisjointBoxLayout, Neighbor};

    fn serial() -> Arc<SerialCommunicator> {
        Arc::new(SerialCommunicator)
    }

    #[test]
    fn uniform_layout_tiles_the_domain() {
        let domain = ProblemDomain::non_periodic(range2d(0..10, 0..8));
        let layout = DisjointBoxLayout::uniform(domain, 4, serial());
        assert_eq!(layout.len(), 6);
        assert_eq!(layout.boxes().iter().map(|b| b.len()).sum::<usize>(), 80);
        assert_eq!(layout.find((9, 7)), Some(5));
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn overlapping_boxes_are_rejected() {
        let domain = ProblemDomain::non_periodic(range2d(0..8, 0..8));
        DisjointBoxLayout::new(domain, vec![range2d(0..4, 0..4), range2d(3..8, 0..4)], vec![0, 0], serial());
    }

    #[test]
    fn periodic_neighbors_are_found() {
        let domain = ProblemDomain::new(range2d(0..8, 0..4), [true, false]);
        let layout = DisjointBoxLayout::uniform(domain, 4, serial());
        assert!(layout.neighbors(0).contains(&Neighbor { index: 1, shift: (0, 0) }));
        assert!(layout.neighbors(0).contains(&Neighbor { index: 1, shift: (-8, 0) }));
        assert_eq!(layout.find((-1, 0)), Some(1));
    }

    #[test]
    fn coarsened_layout_matches() {
        let domain = ProblemDomain::non_periodic(range2d(0..16, 0..16));
        let fine = DisjointBoxLayout::uniform(domain, 8, serial());
        let coarse = fine.coarsen(2);
        assert!(coarse.is_coarsening_of(&fine, 2));
        assert!(!fine.is_coarsening_of(&coarse, 2));
        assert_eq!(coarse.refine(2), fine);
    }
}
