//! Element failures never leave partial contributions behind.

extern crate nalgebra as na;

mod common;

use common::unit_square_triangles;
use weakform::{
  assemble::{Assembler, AssemblyConfig, AssemblyPath, ErrorPolicy, Parallelism},
  error::AssemblyError,
  fe::LagrangeFamily,
  function::Coefficient,
  geometry::{GeometricElement, ItemKind, ReferenceShape},
  problems::ScalarElliptic,
  quadrature::QuadratureDegree,
  system::GlobalSystem,
  weakform::WeakForm,
};

use approx::assert_relative_eq;

fn family() -> LagrangeFamily {
  LagrangeFamily::p1(ReferenceShape::Triangle).unwrap()
}

/// A triangle with collinear nodes.
fn degenerate(id: usize) -> GeometricElement {
  GeometricElement::new(
    id,
    ReferenceShape::Triangle,
    ItemKind::Domain,
    na::dmatrix![0.0, 0.5, 1.0; 0.0, 0.5, 1.0],
    vec![0, 4, 8],
  )
  .unwrap()
}

#[test]
fn skipped_element_leaves_system_untouched() {
  let mesh = unit_square_triangles(2);
  let form = ScalarElliptic::laplace(Coefficient::constant(1.0));
  let mut elements = mesh.elements.clone();
  elements.insert(3, degenerate(100));

  for path in [AssemblyPath::Compositional, AssemblyPath::Fused] {
    let config = AssemblyConfig::default()
      .with_path(path)
      .with_error_policy(ErrorPolicy::Skip);
    let assembler = Assembler::new(&form, family(), config.clone()).unwrap();
    let with_bad = assembler.assemble(&elements, mesh.ndofs()).unwrap();
    let clean = assembler
      .assemble(&mesh.elements, mesh.ndofs())
      .unwrap()
      .finish()
      .unwrap();

    assert_eq!(with_bad.report.assembled, mesh.elements.len());
    assert_eq!(with_bad.report.skipped.len(), 1);
    assert!(matches!(
      with_bad.report.skipped[0],
      AssemblyError::DegenerateGeometry { element: 100, .. }
    ));
    assert_eq!(with_bad.system, clean);
  }
}

#[test]
fn abort_reports_failing_element() {
  let mesh = unit_square_triangles(2);
  let form = ScalarElliptic::laplace(Coefficient::constant(1.0));
  let mut elements = mesh.elements.clone();
  elements.push(degenerate(77));

  for parallelism in [
    Parallelism::Sequential,
    Parallelism::LockedScatter,
    Parallelism::MergeReduce,
  ] {
    let config = AssemblyConfig::default().with_parallelism(parallelism);
    let err = Assembler::new(&form, family(), config)
      .unwrap()
      .assemble(&elements, mesh.ndofs())
      .unwrap_err();
    assert_eq!(err.element(), Some(77));
  }
}

#[test]
fn non_finite_integrand() {
  let mesh = unit_square_triangles(2);
  // Blows up on the right half of the square.
  let source = Coefficient::polynomial(0, |x| if x[0] > 0.5 { f64::NAN } else { 1.0 });
  let form = ScalarElliptic::laplace(source);
  let config = AssemblyConfig::default().with_error_policy(ErrorPolicy::Skip);
  let assembly = Assembler::new(&form, family(), config)
    .unwrap()
    .assemble(&mesh.elements, mesh.ndofs())
    .unwrap();

  assert!(!assembly.report.skipped.is_empty());
  assert!(assembly
    .report
    .skipped
    .iter()
    .all(|e| matches!(e, AssemblyError::NumericalFailure { .. })));
  assert!(assembly.system.load().iter().all(|v| v.is_finite()));
  assert_eq!(
    assembly.report.assembled + assembly.report.skipped.len(),
    mesh.elements.len()
  );
}

#[test]
fn out_of_range_dofs() {
  let mesh = unit_square_triangles(1);
  let form = ScalarElliptic::laplace(Coefficient::constant(1.0));
  let config = AssemblyConfig::default().with_error_policy(ErrorPolicy::Skip);
  let assembly = Assembler::new(&form, family(), config)
    .unwrap()
    .assemble(&mesh.elements, 3)
    .unwrap();

  // Every item touching vertex 3 is rejected as a whole.
  for err in &assembly.report.skipped {
    assert!(matches!(err, AssemblyError::PreconditionViolation { element: Some(_), .. }));
  }
  let touching = mesh
    .elements
    .iter()
    .filter(|e| e.local2global_map().contains(&3))
    .count();
  assert_eq!(assembly.report.skipped.len(), touching);
  assert_eq!(assembly.system.ndofs(), 3);
}

#[test]
fn direct_assembly_checks_dofs_first() {
  let elem = GeometricElement::new(
    12,
    ReferenceShape::Triangle,
    ItemKind::Domain,
    ReferenceShape::Triangle.vertices(),
    vec![0, 1, 5],
  )
  .unwrap();
  let form = ScalarElliptic::laplace(Coefficient::constant(1.0));
  let mut system = GlobalSystem::new(3);

  let err = form
    .assemble_element(&elem, &family(), &mut system)
    .unwrap_err();
  assert!(matches!(
    err,
    AssemblyError::PreconditionViolation {
      element: Some(12),
      ..
    }
  ));
  assert_eq!(system, GlobalSystem::new(3));
  assert_eq!(system.stiffness().ntriplets(), 0);
}

#[test]
fn quadrature_configuration_errors() {
  let nonpoly = ScalarElliptic::laplace(Coefficient::field(|x| x[0].cos()));
  let err = Assembler::new(&nonpoly, family(), AssemblyConfig::default())
    .err()
    .unwrap();
  assert!(matches!(err, AssemblyError::PreconditionViolation { .. }));

  let explicit = nonpoly.with_quadrature(QuadratureDegree::Fixed(6));
  let mesh = unit_square_triangles(2);
  let system = Assembler::new(&explicit, family(), AssemblyConfig::default())
    .unwrap()
    .assemble(&mesh.elements, mesh.ndofs())
    .unwrap()
    .finish()
    .unwrap();
  // int_0^1 cos(x) dx = sin(1)
  assert_relative_eq!(system.load().sum(), 1f64.sin(), epsilon = 1e-8);

  let insufficient = ScalarElliptic::new()
    .with_reaction(Coefficient::constant(1.0))
    .with_quadrature(QuadratureDegree::Fixed(1));
  let err = Assembler::new(&insufficient, family(), AssemblyConfig::default())
    .err()
    .unwrap();
  assert_eq!(
    err,
    AssemblyError::QuadratureInsufficiency {
      required: 2,
      available: 1
    }
  );
}
