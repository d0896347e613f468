//! Ebamr is a library for solving elliptic equations on block-structured
//! adaptive mesh refinement (AMR) grids with embedded boundaries. Irregular
//! geometry is represented by cut cells: each grid cell is regular, covered,
//! or split into one or more volumes of fluid with volume and face area
//! fractions. The core is a multigrid engine (correction-form and full
//! approximation scheme cycles) that is generic over the discretized
//! operator, and a geometry layer that serves cut-cell data consistently at
//! every refinement level and multigrid depth.

pub mod bc;
pub mod eb;
pub mod error;
pub mod grid_array;
pub mod index_space;
pub mod layout;
pub mod level_data;
pub mod level_geometry;
pub mod message;
pub mod parameters;
pub mod poisson;
pub mod problem_domain;
pub mod solver;
