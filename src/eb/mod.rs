//! Embedded-boundary geometry: implicit functions, the graph of regular,
//! covered and irregular cells at every level, and its binding to box
//! layouts.

pub mod data;
pub mod ebis;
pub mod graph;
pub mod implicit;
pub mod index;
pub mod layout;

pub use data::VofData;
pub use ebis::{EbIndexSpace, EbisBox, EbisLevel};
pub use graph::{CoarseningPolicy, EbGraph};
pub use implicit::{AllRegular, Circle, Complement, ImplicitFunction, Intersection, Plane, Union};
pub use index::{CellKind, FaceIndex, VolIndex};
pub use layout::EbisLayout;
