use serde::{Deserialize, Serialize};




/// Geometric moments of one volume of fluid, in units of the cell size.
/// Centroids are measured from the cell center.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VofData {
    pub volume_fraction: f64,
    pub boundary_area: f64,
    /// Unit normal of the embedded boundary, pointing out of the fluid.
    pub normal: [f64; 2],
    pub centroid: [f64; 2],
    pub boundary_centroid: [f64; 2],
}




// ============================================================================
impl VofData {

    pub fn regular() -> Self {
        Self {
            volume_fraction: 1.0,
            boundary_area: 0.0,
            normal: [0.0, 0.0],
            centroid: [0.0, 0.0],
            boundary_centroid: [0.0, 0.0],
        }
    }

    /// Build the moments of a volume from its face apertures, indexed as
    /// `apertures[axis][side]`. The boundary area and normal follow from the
    /// discrete divergence theorem: the faces and the boundary of a closed
    /// volume have zero net area vector.
    ///
    pub fn from_apertures(
        volume_fraction: f64,
        apertures: [[f64; 2]; 2],
        centroid: [f64; 2],
        boundary_centroid: [f64; 2]) -> Self
    {
        let nx = -(apertures[0][1] - apertures[0][0]);
        let ny = -(apertures[1][1] - apertures[1][0]);
        let boundary_area = (nx * nx + ny * ny).sqrt();
        let normal = if boundary_area > 0.0 {
            [nx / boundary_area, ny / boundary_area]
        } else {
            [0.0, 0.0]
        };
        Self { volume_fraction, boundary_area, normal, centroid, boundary_centroid }
    }

    /// Distance along the normal from the volume centroid to the embedded
    /// boundary, in units of the cell size.
    ///
    pub fn boundary_distance(&self) -> f64 {
        let dx = self.boundary_centroid[0] - self.centroid[0];
        let dy = self.boundary_centroid[1] - self.centroid[1];
        (dx * self.normal[0] + dy * self.normal[1]).abs()
    }
}




/// Area and centroid of a simple polygon given in counter-clockwise order.
///
pub fn polygon_moments(points: &[[f64; 2]]) -> (f64, [f64; 2]) {
    let n = points.len();
    let mut area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;

    for k in 0..n {
        let p = points[k];
        let q = points[(k + 1) % n];
        let cross = p[0] * q[1] - q[0] * p[1];
        area += cross;
        cx += (p[0] + q[0]) * cross;
        cy += (p[1] + q[1]) * cross;
    }
    area *= 0.5;

    if area.abs() < 1e-300 {
        let m = points.iter().fold([0.0, 0.0], |a, p| [a[0] + p[0], a[1] + p[1]]);
        return (0.0, [m[0] / n as f64, m[1] / n as f64]);
    }
    (area, [cx / (6.0 * area), cy / (6.0 * area)])
}




// ============================================================================
#[cfg(test)]
mod test {

    use approx::assert_relative_eq;
    use super::{polygon_moments, VofData};

    #[test]
    fn unit_square_moments() {
        let (area, centroid) = polygon_moments(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert_relative_eq!(area, 1.0);
        assert_relative_eq!(centroid[0], 0.5);
        assert_relative_eq!(centroid[1], 0.5);
    }

    #[test]
    fn triangle_moments() {
        let (area, centroid) = polygon_moments(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert_relative_eq!(area, 0.5);
        assert_relative_eq!(centroid[0], 1.0 / 3.0);
    }

    #[test]
    fn normal_from_apertures_points_out_of_fluid() {
        // Fluid below a horizontal cut at half height: the top face is closed.
        let data = VofData::from_apertures(0.5, [[0.5, 0.5], [1.0, 0.0]], [0.0, -0.25], [0.0, 0.0]);
        assert_relative_eq!(data.boundary_area, 1.0);
        assert_relative_eq!(data.normal[1], 1.0);
        assert_relative_eq!(data.boundary_distance(), 0.25);
    }
}
