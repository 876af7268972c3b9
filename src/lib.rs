//! Finite element assembly of weak forms into sparse global systems.

extern crate nalgebra as na;
extern crate nalgebra_sparse as nas;

pub mod assemble;
pub mod error;
pub mod fe;
pub mod function;
pub mod geometry;
pub mod problems;
pub mod quadrature;
pub mod sparse;
pub mod system;
pub mod util;
pub mod weakform;

pub type Dim = usize;
pub type DofIdx = usize;
pub type ElementId = usize;
