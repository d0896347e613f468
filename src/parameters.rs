use serde::{Deserialize, Serialize};
use crate::error::Error;




/// Flat configuration record for the AMR driver layer. The solver fields are
/// copied into a multigrid object by `MultiGrid::set_solver_parameters`;
/// the remaining fields are carried for time-stepping drivers and output
/// cadence.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmrParameters {
    /// Relative residual reduction at which a solve stops.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub pre_smooth: usize,
    pub post_smooth: usize,
    pub bottom_smooth: usize,
    /// Number of coarse-grid visits per depth; 1 is a V-cycle.
    pub cycles: i32,
    /// Deepest multigrid level, or -1 to coarsen as far as possible.
    pub max_depth: i32,
    pub verbosity: i32,
    pub cfl: f64,
    pub regrid_interval: usize,
    /// Refinement ratio between each level and the next finer one.
    pub ref_ratios: Vec<i64>,
    pub max_level: usize,
    pub checkpoint_interval: usize,
    pub plot_interval: usize,
}




// ============================================================================
impl Default for AmrParameters {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 20,
            pre_smooth: 2,
            post_smooth: 2,
            bottom_smooth: 40,
            cycles: 1,
            max_depth: -1,
            verbosity: 0,
            cfl: 0.5,
            regrid_interval: 2,
            ref_ratios: vec![2],
            max_level: 0,
            checkpoint_interval: 0,
            plot_interval: 0,
        }
    }
}

impl AmrParameters {

    /// Check that every field is admissible. This is where a driver is
    /// expected to catch configuration mistakes, before a solve turns them
    /// into fatal errors.
    ///
    pub fn validate(&self) -> Result<(), Error> {
        use Error::InvalidParameter;

        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(InvalidParameter { name: "tolerance", reason: format!("{} is not in (0, 1)", self.tolerance) });
        }
        if self.max_iterations == 0 {
            return Err(InvalidParameter { name: "max_iterations", reason: "must be positive".into() });
        }
        if self.cycles < 1 {
            return Err(InvalidParameter { name: "cycles", reason: format!("{} cycles requested; only V-cycle schedules (cycles >= 1) are implemented", self.cycles) });
        }
        if self.max_depth < -1 {
            return Err(InvalidParameter { name: "max_depth", reason: format!("{} is below -1", self.max_depth) });
        }
        if !(self.cfl > 0.0 && self.cfl <= 1.0) {
            return Err(InvalidParameter { name: "cfl", reason: format!("{} is not in (0, 1]", self.cfl) });
        }
        if self.ref_ratios.len() < self.max_level {
            return Err(InvalidParameter {
                name: "ref_ratios",
                reason: format!("{} ratios given for {} levels", self.ref_ratios.len(), self.max_level),
            });
        }
        if let Some(r) = self.ref_ratios.iter().find(|&&r| r < 2 || r & (r - 1) != 0) {
            return Err(InvalidParameter { name: "ref_ratios", reason: format!("{} is not a power of two >= 2", r) });
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::AmrParameters;

    #[test]
    fn default_parameters_are_valid() {
        assert!(AmrParameters::default().validate().is_ok());
    }

    #[test]
    fn bad_parameters_are_rejected() {
        let mut params = AmrParameters::default();
        params.cycles = -1;
        assert!(params.validate().is_err());

        let mut params = AmrParameters::default();
        params.ref_ratios = vec![3];
        assert!(params.validate().is_err());

        let mut params = AmrParameters::default();
        params.max_level = 2;
        assert!(params.validate().is_err());
    }
}
