use core::ops::Range;
use serde::{Deserialize, Serialize};




/**
 * Identifier for a Cartesian axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    I,
    J,
}




/**
 * Identifier for the low or high side of a box along an axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Lo,
    Hi,
}




// ============================================================================
impl Axis {
    pub const ALL: [Axis; 2] = [Axis::I, Axis::J];

    pub fn index(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Axis::I => Axis::J,
            Axis::J => Axis::I,
        }
    }

    /**
     * Return the unit offset along this axis.
     */
    pub fn unit(self) -> (i64, i64) {
        match self {
            Axis::I => (1, 0),
            Axis::J => (0, 1),
        }
    }

    /**
     * Return the index displaced by `delta` along this axis.
     */
    pub fn step(self, index: (i64, i64), delta: i64) -> (i64, i64) {
        match self {
            Axis::I => (index.0 + delta, index.1),
            Axis::J => (index.0, index.1 + delta),
        }
    }

    /**
     * Return the component of an index along this axis.
     */
    pub fn of(self, index: (i64, i64)) -> i64 {
        match self {
            Axis::I => index.0,
            Axis::J => index.1,
        }
    }
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Lo, Side::Hi];

    /**
     * Return -1 for the low side and +1 for the high side.
     */
    pub fn sign(self) -> i64 {
        match self {
            Side::Lo => -1,
            Side::Hi => 1,
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Side::Lo => Side::Hi,
            Side::Hi => Side::Lo,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::Lo => 0,
            Side::Hi => 1,
        }
    }
}




/**
 * Represents a rectangular region in a discrete index space. This is the
 * atomic unit of domain decomposition (a "box"). The ranges are half-open;
 * `small_end` and `big_end` give the inclusive corners.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpace {
    di: Range<i64>,
    dj: Range<i64>,
}




// ============================================================================
impl IndexSpace {


    pub fn new(di: Range<i64>, dj: Range<i64>) -> Self {

        assert!(
            di.start <= di.end && dj.start <= dj.end,
            "IndexSpace::new - index space has negative volume");

        Self { di, dj }
    }


    /**
     * Construct an index space from its inclusive corners.
     */
    pub fn from_corners(small_end: (i64, i64), big_end: (i64, i64)) -> Self {
        Self::new(small_end.0..big_end.0 + 1, small_end.1..big_end.1 + 1)
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> (usize, usize) {
        ((self.di.end - self.di.start) as usize,
         (self.dj.end - self.dj.start) as usize)
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        let (l, m) = self.dim();
        l * m
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn start(&self) -> (i64, i64) {
        (self.di.start, self.dj.start)
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn end(&self) -> (i64, i64) {
        (self.di.end, self.dj.end)
    }


    /**
     * Return the lower corner (inclusive).
     */
    pub fn small_end(&self) -> (i64, i64) {
        self.start()
    }


    /**
     * Return the upper corner (inclusive).
     */
    pub fn big_end(&self) -> (i64, i64) {
        (self.di.end - 1, self.dj.end - 1)
    }


    /**
     * Return the index range along one axis.
     */
    pub fn range(&self, axis: Axis) -> Range<i64> {
        match axis {
            Axis::I => self.di.clone(),
            Axis::J => self.dj.clone(),
        }
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: (i64, i64)) -> bool {
        self.di.contains(&index.0) && self.dj.contains(&index.1)
    }


    /**
     * Determine whether another index space is a subset of this one.
     */
    pub fn contains_space(&self, other: &Self) -> bool {
        other.is_empty() || (
        other.di.start >= self.di.start && other.di.end <= self.di.end &&
        other.dj.start >= self.dj.start && other.dj.end <= self.dj.end)
    }


    /**
     * Return the overlap of two index spaces, or `None` if they are disjoint.
     */
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let i0 = self.di.start.max(other.di.start);
        let i1 = self.di.end.min(other.di.end);
        let j0 = self.dj.start.max(other.dj.start);
        let j1 = self.dj.end.min(other.dj.end);

        if i0 < i1 && j0 < j1 {
            Some(Self::new(i0..i1, j0..j1))
        } else {
            None
        }
    }


    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }


    /**
     * Expand this index space by the given number of elements on each axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        Self::new(
            self.di.start - delta .. self.di.end + delta,
            self.dj.start - delta .. self.dj.end + delta)
    }


    /**
     * Trim this index space by the given number of elements on each axis.
     */
    pub fn trim_all(&self, delta: i64) -> Self {
        self.extend_all(-delta)
    }


    /**
     * Expand this index space on both sides of one axis.
     */
    pub fn extend(&self, delta: i64, axis: Axis) -> Self {
        self.extend_lower(delta, axis).extend_upper(delta, axis)
    }


    /**
     * Expand just the lower elements of this index space on the given axis.
     */
    pub fn extend_lower(&self, delta: i64, axis: Axis) -> Self {
        match axis {
            Axis::I => Self::new(self.di.start - delta .. self.di.end, self.dj.clone()),
            Axis::J => Self::new(self.di.clone(), self.dj.start - delta .. self.dj.end),
        }
    }


    /**
     * Expand just the upper elements of this index space on the given axis.
     */
    pub fn extend_upper(&self, delta: i64, axis: Axis) -> Self {
        match axis {
            Axis::I => Self::new(self.di.start .. self.di.end + delta, self.dj.clone()),
            Axis::J => Self::new(self.di.clone(), self.dj.start .. self.dj.end + delta),
        }
    }


    /**
     * Trim just the lower elements of this index space by a certain amount on
     * the given axis.
     */
    pub fn trim_lower(&self, delta: i64, axis: Axis) -> Self {
        self.extend_lower(-delta, axis)
    }


    /**
     * Shift the index space by `delta` along the given axis.
     */
    pub fn translate(&self, delta: i64, axis: Axis) -> Self {
        match axis {
            Axis::I => Self::new(self.di.start + delta .. self.di.end + delta, self.dj.clone()),
            Axis::J => Self::new(self.di.clone(), self.dj.start + delta .. self.dj.end + delta),
        }
    }


    /**
     * Shift the index space by an offset on both axes.
     */
    pub fn shift(&self, offset: (i64, i64)) -> Self {
        self.translate(offset.0, Axis::I).translate(offset.1, Axis::J)
    }


    /**
     * Return the slab of `width` cells lying just outside this index space
     * on the given side of an axis. The slab spans the box extent on the
     * other axis, so corners are not included.
     */
    pub fn adjacent(&self, axis: Axis, side: Side, width: i64) -> Self {
        let r = self.range(axis);
        let slab = match side {
            Side::Lo => r.start - width .. r.start,
            Side::Hi => r.end .. r.end + width,
        };
        match axis {
            Axis::I => Self::new(slab, self.dj.clone()),
            Axis::J => Self::new(self.di.clone(), slab),
        }
    }


    /**
     * Increase the size of this index space by the given factor.
     */
    pub fn refine_by(&self, factor: i64) -> Self {
        assert!(factor > 0, "IndexSpace::refine_by - ratio must be positive");
        Self::new(
            self.di.start * factor .. self.di.end * factor,
            self.dj.start * factor .. self.dj.end * factor)
    }


    /**
     * Return the smallest index space whose refinement by the given factor
     * covers this one. Negative indexes round toward negative infinity.
     */
    pub fn coarsen_by(&self, factor: i64) -> Self {
        assert!(factor > 0, "IndexSpace::coarsen_by - ratio must be positive");
        if self.is_empty() {
            return Self::new(
                self.di.start.div_euclid(factor) .. self.di.start.div_euclid(factor),
                self.dj.start.div_euclid(factor) .. self.dj.start.div_euclid(factor));
        }
        Self::new(
            self.di.start.div_euclid(factor) .. (self.di.end - 1).div_euclid(factor) + 1,
            self.dj.start.div_euclid(factor) .. (self.dj.end - 1).div_euclid(factor) + 1)
    }


    /**
     * Determine whether coarsening then refining by the given factor
     * reproduces this index space exactly.
     */
    pub fn is_coarsenable(&self, factor: i64) -> bool {
        factor > 0
            && !self.is_empty()
            && self.di.start.rem_euclid(factor) == 0
            && self.di.end.rem_euclid(factor) == 0
            && self.dj.start.rem_euclid(factor) == 0
            && self.dj.end.rem_euclid(factor) == 0
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: (i64, i64)) -> usize {
        let i = (index.0 - self.di.start) as usize;
        let j = (index.1 - self.dj.start) as usize;
        let m = (self.dj.end - self.dj.start) as usize;
        i * m + j
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.di.clone().flat_map(move |i| self.dj.clone().map(move |j| (i, j)))
    }
}




// ============================================================================
impl From<(Range<i64>, Range<i64>)> for IndexSpace {
    fn from(range: (Range<i64>, Range<i64>)) -> Self {
        Self::new(range.0, range.1)
    }
}

impl From<IndexSpace> for (Range<i64>, Range<i64>) {
    fn from(space: IndexSpace) -> Self {
        (space.di, space.dj)
    }
}




/**
 * Less imposing factory function to construct an IndexSpace object.
 */
pub fn range2d(di: Range<i64>, dj: Range<i64>) -> IndexSpace {
    IndexSpace::new(di, dj)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{range2d, Axis, IndexSpace, Side};

    #[test]
    fn coarsen_rounds_toward_negative_infinity() {
        let space = range2d(-3..5, 0..8);
        assert_eq!(space.coarsen_by(2), range2d(-2..3, 0..4));
        assert_eq!(range2d(-1..1, -1..1).coarsen_by(2), range2d(-1..1, -1..1));
    }

    #[test]
    fn coarsen_then_refine_contains_original() {
        let space = range2d(3..9, -5..2);
        assert!(space.coarsen_by(4).refine_by(4).contains_space(&space));
        assert!(!space.is_coarsenable(2));
        assert!(range2d(4..8, -4..2).is_coarsenable(2));
    }

    #[test]
    fn corners_are_inclusive() {
        let space = IndexSpace::from_corners((0, 0), (31, 15));
        assert_eq!(space.dim(), (32, 16));
        assert_eq!(space.big_end(), (31, 15));
    }

    #[test]
    fn intersection_of_disjoint_spaces_is_none() {
        assert!(range2d(0..4, 0..4).intersect(&range2d(4..8, 0..4)).is_none());
        assert_eq!(
            range2d(0..4, 0..4).intersect(&range2d(2..8, 1..2)),
            Some(range2d(2..4, 1..2)));
    }

    #[test]
    fn adjacent_slabs_lie_outside() {
        let space = range2d(0..4, 0..6);
        let lo = space.adjacent(Axis::I, Side::Lo, 1);
        let hi = space.adjacent(Axis::J, Side::Hi, 2);
        assert_eq!(lo, range2d(-1..0, 0..6));
        assert_eq!(hi, range2d(0..4, 6..8));
        assert!(!space.overlaps(&lo) && !space.overlaps(&hi));
    }

    #[test]
    fn iteration_is_row_major() {
        let space = range2d(1..3, 5..7);
        let indexes: Vec<_> = space.iter().collect();
        assert_eq!(indexes, vec![(1, 5), (1, 6), (2, 5), (2, 6)]);
        for (n, index) in space.iter().enumerate() {
            assert_eq!(space.row_major_offset(index), n);
        }
    }
}
