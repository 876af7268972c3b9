#![allow(dead_code)]

use weakform::{
  fe::LagrangeFamily,
  geometry::{GeometricElement, ItemKind, ReferenceShape},
  DofIdx,
};

/// A mesh as the assembly engine sees it: a flat list of items.
pub struct TestMesh {
  pub elements: Vec<GeometricElement>,
  pub vertices: na::DMatrix<f64>,
}

impl TestMesh {
  pub fn ndofs(&self) -> usize {
    self.vertices.ncols()
  }
  pub fn ndomain(&self) -> usize {
    self
      .elements
      .iter()
      .filter(|e| e.kind() == ItemKind::Domain)
      .count()
  }
}

fn grid_vertices(n: usize) -> na::DMatrix<f64> {
  let h = 1.0 / n as f64;
  na::DMatrix::from_fn(2, (n + 1) * (n + 1), |d, ivertex| {
    let (i, j) = (ivertex % (n + 1), ivertex / (n + 1));
    if d == 0 {
      i as f64 * h
    } else {
      j as f64 * h
    }
  })
}

fn element(
  id: usize,
  shape: ReferenceShape,
  kind: ItemKind,
  vertices: &na::DMatrix<f64>,
  dofs: Vec<DofIdx>,
) -> GeometricElement {
  let nodes = na::DMatrix::from_columns(&dofs.iter().map(|&i| vertices.column(i)).collect::<Vec<_>>());
  GeometricElement::new(id, shape, kind, nodes, dofs).unwrap()
}

/// Boundary segments of the unit square grid, counterclockwise.
fn boundary_segments(n: usize) -> Vec<[DofIdx; 2]> {
  let v = |i: usize, j: usize| i + j * (n + 1);
  let mut segments = Vec::new();
  for k in 0..n {
    segments.push([v(k, 0), v(k + 1, 0)]);
    segments.push([v(n, k), v(n, k + 1)]);
    segments.push([v(n - k, n), v(n - k - 1, n)]);
    segments.push([v(0, n - k), v(0, n - k - 1)]);
  }
  segments
}

/// P1 triangulation of the unit square with `n` cells per side, each cell
/// split along its diagonal, plus the boundary segments as border items.
pub fn unit_square_triangles(n: usize) -> TestMesh {
  let vertices = grid_vertices(n);
  let v = |i: usize, j: usize| i + j * (n + 1);
  let mut elements = Vec::new();
  for j in 0..n {
    for i in 0..n {
      let (v00, v10, v11, v01) = (v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1));
      for dofs in [vec![v00, v10, v11], vec![v00, v11, v01]] {
        let id = elements.len();
        elements.push(element(id, ReferenceShape::Triangle, ItemKind::Domain, &vertices, dofs));
      }
    }
  }
  for segment in boundary_segments(n) {
    let id = elements.len();
    elements.push(element(
      id,
      ReferenceShape::Segment,
      ItemKind::Border,
      &vertices,
      segment.to_vec(),
    ));
  }
  TestMesh { elements, vertices }
}

/// Q1 mesh of the unit square with `n` cells per side and its boundary.
pub fn unit_square_quads(n: usize) -> TestMesh {
  let vertices = grid_vertices(n);
  let v = |i: usize, j: usize| i + j * (n + 1);
  let mut elements = Vec::new();
  for j in 0..n {
    for i in 0..n {
      let dofs = vec![v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)];
      let id = elements.len();
      elements.push(element(id, ReferenceShape::Quadrilateral, ItemKind::Domain, &vertices, dofs));
    }
  }
  for segment in boundary_segments(n) {
    let id = elements.len();
    elements.push(element(
      id,
      ReferenceShape::Segment,
      ItemKind::Border,
      &vertices,
      segment.to_vec(),
    ));
  }
  TestMesh { elements, vertices }
}

/// A single element carrying `family` on the given nodes, with DOFs
/// numbered from `offset`.
pub fn single_element(family: LagrangeFamily, nodes: na::DMatrix<f64>, offset: usize) -> GeometricElement {
  GeometricElement::new(
    0,
    family.shape(),
    ItemKind::Domain,
    nodes,
    (offset..offset + family.ndofs()).collect(),
  )
  .unwrap()
}
