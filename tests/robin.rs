//! Galerkin solutions reproduce exact solutions that lie in the discrete space.

extern crate nalgebra as na;

mod common;

use common::{unit_square_quads, unit_square_triangles, TestMesh};
use weakform::{
  assemble::{Assembler, AssemblyConfig, AssemblyPath},
  fe::LagrangeFamily,
  function::Coefficient,
  geometry::{CoordRef, ReferenceShape},
  problems::ScalarElliptic,
};

use approx::assert_relative_eq;

const ALPHA: f64 = 1.0;

/// $u = 1 + x + 2y$
fn exact(x: CoordRef) -> f64 {
  1.0 + x[0] + 2.0 * x[1]
}

/// $partial_n u + alpha u$ on the sides of the unit square.
fn robin_data(x: CoordRef) -> f64 {
  let eps = 1e-12;
  let normal_derivative = if x[1] < eps {
    -2.0
  } else if x[1] > 1.0 - eps {
    2.0
  } else if x[0] < eps {
    -1.0
  } else {
    1.0
  };
  normal_derivative + ALPHA * exact(x)
}

fn solve(mesh: &TestMesh, family: LagrangeFamily, path: AssemblyPath) -> na::DVector<f64> {
  let form = ScalarElliptic::laplace(Coefficient::constant(0.0))
    .with_robin(Coefficient::constant(ALPHA))
    .with_flux(Coefficient::polynomial(1, robin_data));
  let system = Assembler::new(&form, family, AssemblyConfig::default().with_path(path))
    .unwrap()
    .assemble(&mesh.elements, mesh.ndofs())
    .unwrap()
    .finish()
    .unwrap();
  system
    .stiffness_dense()
    .lu()
    .solve(system.load())
    .unwrap()
}

fn check(mesh: &TestMesh, family: LagrangeFamily) {
  let expected = na::DVector::from_iterator(
    mesh.ndofs(),
    mesh.vertices.column_iter().map(exact),
  );
  for path in [AssemblyPath::Compositional, AssemblyPath::Fused] {
    let solution = solve(mesh, family, path);
    assert_relative_eq!(solution, expected, epsilon = 1e-10);
  }
}

#[test]
fn linear_solution_on_triangles() {
  let mesh = unit_square_triangles(4);
  check(&mesh, LagrangeFamily::p1(ReferenceShape::Triangle).unwrap());
}

#[test]
fn linear_solution_on_quads() {
  let mesh = unit_square_quads(3);
  check(&mesh, LagrangeFamily::p1(ReferenceShape::Quadrilateral).unwrap());
}
