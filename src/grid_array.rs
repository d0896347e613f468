use serde::{Deserialize, Serialize};
use crate::index_space::IndexSpace;




/**
 * A dense array of field values over a rectangular index space. Values are
 * stored in row-major order with the field index increasing fastest, so the
 * fields at one index form a contiguous slice. This is the unit of storage
 * for one box of level data, including its ghost cells.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridArray {
    space: IndexSpace,
    num_fields: usize,
    data: Vec<f64>,
}




// ============================================================================
impl GridArray {




    /**
     * Generate an array of zeros covering the given index space.
     */
    pub fn zeros(space: IndexSpace, num_fields: usize) -> Self {
        assert!(num_fields > 0, "GridArray::zeros - at least one field is required");
        Self {
            data: vec![0.0; space.len() * num_fields],
            space,
            num_fields,
        }
    }




    /**
     * Generate a single-field array with values defined from a closure.
     */
    pub fn from_function<F>(space: IndexSpace, f: F) -> Self
    where
        F: Fn((i64, i64)) -> f64
    {
        Self {
            data: space.iter().map(f).collect(),
            space,
            num_fields: 1,
        }
    }




    pub fn space(&self) -> &IndexSpace {
        &self.space
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }




    /**
     * Return the fields at the given index.
     */
    pub fn get_slice(&self, index: (i64, i64)) -> &[f64] {
        let s = self.offset(index);
        &self.data[s .. s + self.num_fields]
    }

    pub fn get_slice_mut(&mut self, index: (i64, i64)) -> &mut [f64] {
        let s = self.offset(index);
        &mut self.data[s .. s + self.num_fields]
    }

    /**
     * Return the value of field zero at the given index.
     */
    pub fn get(&self, index: (i64, i64)) -> f64 {
        self.data[self.offset(index)]
    }

    pub fn get_mut(&mut self, index: (i64, i64)) -> &mut f64 {
        let s = self.offset(index);
        &mut self.data[s]
    }

    pub fn set(&mut self, index: (i64, i64), value: f64) {
        *self.get_mut(index) = value
    }




    pub fn fill(&mut self, value: f64) {
        for x in &mut self.data {
            *x = value
        }
    }




    /**
     * Copy values over a region from another array. The region must be
     * inside both arrays.
     */
    pub fn copy_from(&mut self, other: &Self, region: &IndexSpace) {
        self.copy_from_shifted(other, region, (0, 0))
    }




    /**
     * Copy values from another array into a region of this one, where the
     * source index is the destination index minus `shift`. This is how ghost
     * cells are filled from the periodic image of a neighbor.
     */
    pub fn copy_from_shifted(&mut self, other: &Self, region: &IndexSpace, shift: (i64, i64)) {
        assert_eq!(self.num_fields, other.num_fields, "GridArray::copy_from - field count mismatch");

        for index in region.iter() {
            let source = (index.0 - shift.0, index.1 - shift.1);
            let s = other.offset(source);
            let d = self.offset(index);
            self.data[d .. d + self.num_fields].copy_from_slice(&other.data[s .. s + self.num_fields]);
        }
    }




    /**
     * Return a copy of the values over a sub-region.
     */
    pub fn extract(&self, region: &IndexSpace) -> Self {
        let mut result = Self::zeros(region.clone(), self.num_fields);
        result.copy_from(self, region);
        result
    }

    fn offset(&self, index: (i64, i64)) -> usize {
        self.validate_index(index);
        self.space.row_major_offset(index) * self.num_fields
    }

    fn validate_index(&self, index: (i64, i64)) {
        if !self.space.contains(index) {
            let (i0, j0) = self.space.start();
            let (i1, j1) = self.space.end();
            panic!("index ({} {}) out of range on grid array ({}..{} {}..{})",
                index.0,
                index.1,
                i0,
                i1,
                j0,
                j1);
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::index_space::range2d;
    use super::GridArray;

    #[test]
    fn indexing_works() {
        let array = GridArray::from_function(range2d(4..10, 4..10), |(i, j)| i as f64 + j as f64);
        assert_eq!(array.get((5, 5)), 10.0);
        assert_eq!(array.get((6, 8)), 14.0);
        assert_eq!(array.get_slice((9, 9)), &[18.0]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn indexing_outside_panics() {
        GridArray::zeros(range2d(0..2, 0..2), 1).get((2, 0));
    }

    #[test]
    fn shifted_copy_reads_the_image() {
        let source = GridArray::from_function(range2d(0..4, 0..4), |(i, j)| (10 * i + j) as f64);
        let mut target = GridArray::zeros(range2d(-1..1, 0..4), 1);
        target.copy_from_shifted(&source, &range2d(-1..0, 0..4), (-4, 0));
        assert_eq!(target.get((-1, 2)), 32.0);
        assert_eq!(target.get((0, 2)), 0.0);
    }

    #[test]
    fn multiple_fields_are_contiguous() {
        let mut array = GridArray::zeros(range2d(0..2, 0..3), 2);
        array.get_slice_mut((1, 2)).copy_from_slice(&[1.0, 2.0]);
        assert_eq!(array.data()[10..12], [1.0, 2.0]);
        assert_eq!(array.extract(&range2d(1..2, 2..3)).data(), &[1.0, 2.0]);
    }
}
