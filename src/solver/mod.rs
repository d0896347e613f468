//! The multigrid engine. It is generic over the level data type and the
//! operator acting on it: drivers only see the operator traits in
//! `level_op`, and concrete discretizations implement them.
//!
//! - `MultiGrid`: correction-form V-cycles for linear operators
//! - `FasMultiGrid`: full approximation scheme cycles, carrying the solution
//!   itself and the coarser AMR level's solution through every depth
//! - `AmrMultiGrid`: a level-by-level cascade of FAS solves
//! - bottom solvers for the coarsest depth

pub mod amr;
pub mod bottom;
pub mod fas;
pub mod level_op;
pub mod multigrid;

pub use amr::AmrMultiGrid;
pub use bottom::{BiCgStabSolver, DirectSolver, LinearSolver, RelaxSolver};
pub use fas::FasMultiGrid;
pub use level_op::{AmrLevelOp, Assemble, LevelShape, LinearOp, MgLevelOp, MgLevelOpFactory};
pub use multigrid::{MultiGrid, MultiGridState, SolveReport};
