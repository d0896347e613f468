use crate::problem_domain::ProblemDomain;




/// The arithmetic and the discrete operator over one level's data type `T`.
/// All binary operations require their arguments to have the same shape;
/// a mismatch is a programming error and panics.
///
pub trait LinearOp<T> {

    /// Allocate data with the same layout, ghost width and component count
    /// as the prototype. The values are unspecified.
    fn create(&self, prototype: &T) -> T;

    fn assign(&self, dest: &mut T, src: &T);

    /// `dest += scale * src`
    fn incr(&self, dest: &mut T, src: &T, scale: f64);

    fn set_to_zero(&self, data: &mut T);

    fn scale(&self, data: &mut T, scale: f64);

    /// `dest = a * x + b * y`
    fn axby(&self, dest: &mut T, x: &T, y: &T, a: f64, b: f64);

    /// Global inner product over the valid region.
    fn dot(&self, a: &T, b: &T) -> f64;

    /// Global norm over the valid region: the max norm for `p = 0`, and the
    /// volume-weighted p-norm otherwise. The result is the same on every
    /// rank, and does not depend on the number of ranks.
    fn norm(&self, data: &T, p: i32) -> f64;

    /// `result = rhs - L(phi)`. The ghost cells of `phi` are filled first.
    fn residual(&self, result: &mut T, phi: &mut T, rhs: &T, homogeneous: bool);

    /// `result = L(phi)`. The ghost cells of `phi` are filled first.
    fn apply_op(&self, result: &mut T, phi: &mut T, homogeneous: bool);
}




/// The additional operations a multigrid cycle needs from the operator at
/// one depth. `phi_coarse` is the solution on the next coarser AMR level,
/// which supplies coarse-fine boundary values; when it is `None`, those
/// boundaries are treated as homogeneous.
///
pub trait MgLevelOp<T>: LinearOp<T> {

    /// Allocate data over the layout coarsened by two, with ghost cells if
    /// `ghosted` is set.
    fn create_coarser(&self, fine: &T, ghosted: bool) -> T;

    /// Smooth the correction equation `L(e) = r` with homogeneous boundary
    /// conditions.
    fn relax(&self, correction: &mut T, residual: &T, iterations: usize);

    /// Smooth `L(phi) = rhs` with inhomogeneous boundary conditions.
    fn relax_nf(&self, phi: &mut T, phi_coarse: Option<&T>, rhs: &T, iterations: usize);

    /// `res_coarse = restrict(rhs - L(phi))`, in one step.
    fn restrict_residual(&self, res_coarse: &mut T, phi: &mut T, phi_coarse: Option<&T>, rhs: &T, homogeneous: bool);

    /// Volume-weighted restriction of the solution.
    fn restrict_r(&self, coarse: &mut T, fine: &T);

    /// `phi += interpolate(coarse)`. The ghost cells of `coarse` are
    /// exchanged first.
    fn prolong_increment(&self, phi: &mut T, coarse: &mut T);

    /// `result = L(phi)`, with coarse-fine boundary values from
    /// `phi_coarse`.
    fn apply_op_mg(&self, result: &mut T, phi: &mut T, phi_coarse: Option<&T>, homogeneous: bool);
}




/// The operations needed between AMR levels.
///
pub trait AmrLevelOp<T>: MgLevelOp<T> {

    /// The refinement ratio to the next coarser AMR level, or 1 if there is
    /// none.
    fn ref_to_coarser(&self) -> i64;

    /// Replace the coarse values under the fine level with the
    /// volume-weighted average of the fine values.
    fn average_down(&self, coarse: &mut T, fine: &T);
}




/// Builds the operators of a level and of its multigrid coarsenings.
/// Returning `None` signals that no further coarsening is possible.
///
pub trait MgLevelOpFactory<T> {
    type Op: MgLevelOp<T>;

    /// The operator at multigrid depth `depth` below the AMR level over
    /// `domain`. With `homogeneous_only`, the operator is only ever applied
    /// to corrections and may panic on inhomogeneous calls.
    fn mg_new_op(&self, domain: &ProblemDomain, depth: usize, homogeneous_only: bool) -> Option<Self::Op>;

    /// The operator of the AMR level over `domain`.
    fn amr_new_op(&self, domain: &ProblemDomain) -> Option<Self::Op>;

    /// The refinement ratio from the AMR level over `domain` to the next
    /// finer one, if there is a finer level.
    fn ref_to_finer(&self, domain: &ProblemDomain) -> Option<i64>;
}




/// The shape of level data, as the multigrid driver needs to inspect it.
///
pub trait LevelShape {
    fn problem_domain(&self) -> &ProblemDomain;

    /// Determine whether the layout can be coarsened by two.
    fn is_coarsenable(&self) -> bool;

    /// Determine whether this data's layout is the coarsening by two of
    /// another's.
    fn is_coarsening_of(&self, fine: &Self) -> bool;
}




/// The seam to matrix-based solvers: a level's unknowns as a flat vector.
///
pub trait Assemble<T> {
    fn num_unknowns(&self, data: &T) -> usize;

    fn gather(&self, data: &T) -> Vec<f64>;

    fn scatter(&self, data: &mut T, values: &[f64]);
}
