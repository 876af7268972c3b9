//! Lagrange finite element families and their shape functions on reference cells.

use crate::{
  error::{AssemblyError, Result},
  geometry::{Coord, CoordRef, GeometricElement, ItemKind, Matrix, ReferenceShape},
  util::{ref_bary, ref_difbarys},
  ElementId,
};

/// A nodal Lagrange family of a given order on a reference shape.
///
/// Local DOF order: vertices first, then edge midpoints following the
/// facet order of the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LagrangeFamily {
  shape: ReferenceShape,
  order: usize,
}

impl LagrangeFamily {
  pub fn new(shape: ReferenceShape, order: usize) -> Result<Self> {
    use ReferenceShape as S;
    let supported = matches!(
      (shape, order),
      (S::Point, 0) | (S::Segment, 1 | 2) | (S::Triangle, 1 | 2) | (S::Tetrahedron, 1)
        | (S::Quadrilateral, 1)
    );
    if supported {
      Ok(Self { shape, order })
    } else {
      Err(AssemblyError::UnsupportedFamily { shape, order })
    }
  }

  pub fn p1(shape: ReferenceShape) -> Result<Self> {
    match shape {
      ReferenceShape::Point => Self::new(shape, 0),
      _ => Self::new(shape, 1),
    }
  }

  pub fn shape(&self) -> ReferenceShape {
    self.shape
  }
  pub fn order(&self) -> usize {
    self.order
  }

  pub fn ndofs(&self) -> usize {
    match (self.shape, self.order) {
      (ReferenceShape::Segment, 2) => 3,
      (ReferenceShape::Triangle, 2) => 6,
      (shape, _) => shape.nvertices(),
    }
  }

  /// Total polynomial degree of the shape functions.
  pub fn degree(&self) -> usize {
    match self.shape {
      ReferenceShape::Quadrilateral => 2 * self.order,
      _ => self.order,
    }
  }

  pub fn shape_function(&self, local_index: usize) -> Result<ShapeFunction> {
    if local_index < self.ndofs() {
      Ok(ShapeFunction {
        family: *self,
        local_index,
      })
    } else {
      Err(AssemblyError::precondition(
        None,
        format!(
          "shape function {local_index} out of range 0..{} for {self:?}",
          self.ndofs()
        ),
      ))
    }
  }

  /// The ordered shape functions of the family.
  pub fn shape_functions(&self) -> Vec<ShapeFunction> {
    (0..self.ndofs())
      .map(|local_index| ShapeFunction {
        family: *self,
        local_index,
      })
      .collect()
  }

  /// Values and reference gradients (one column per shape function)
  /// of all shape functions at once.
  pub fn eval_all(&self, xi: CoordRef) -> (na::DVector<f64>, Matrix) {
    let n = self.ndofs();
    let mut values = na::DVector::zeros(n);
    let mut grads = Matrix::zeros(self.shape.dim(), n);
    for i in 0..n {
      let (value, grad) = self.eval_basis(i, xi);
      values[i] = value;
      grads.set_column(i, &grad);
    }
    (values, grads)
  }

  fn eval_basis(&self, i: usize, xi: CoordRef) -> (f64, Coord) {
    debug_assert_eq!(xi.nrows(), self.shape.dim());
    let dim = self.shape.dim();
    match (self.shape, self.order) {
      (ReferenceShape::Point, _) => (1.0, Coord::zeros(0)),
      (ReferenceShape::Quadrilateral, _) => {
        let (s, t) = (xi[0], xi[1]);
        let (value, ds, dt) = match i {
          0 => ((1.0 - s) * (1.0 - t), -(1.0 - t), -(1.0 - s)),
          1 => (s * (1.0 - t), 1.0 - t, -s),
          2 => (s * t, t, s),
          _ => ((1.0 - s) * t, -t, 1.0 - s),
        };
        (value, na::dvector![ds, dt])
      }
      (_, 1) => (ref_bary(i, xi), ref_difbarys(dim).column(i).into_owned()),
      (_, _) => {
        let difbarys = ref_difbarys(dim);
        let nvertices = self.shape.nvertices();
        if i < nvertices {
          let l = ref_bary(i, xi);
          let grad = difbarys.column(i) * (4.0 * l - 1.0);
          (l * (2.0 * l - 1.0), grad)
        } else {
          let (a, b) = self.edge(i - nvertices);
          let (la, lb) = (ref_bary(a, xi), ref_bary(b, xi));
          let grad = (difbarys.column(a) * lb + difbarys.column(b) * la) * 4.0;
          (4.0 * la * lb, grad)
        }
      }
    }
  }

  /// Vertex pair of the edge carrying edge DOF `iedge`.
  fn edge(&self, iedge: usize) -> (usize, usize) {
    match self.shape {
      ReferenceShape::Segment => (0, 1),
      shape => {
        let facet = shape.facets()[iedge];
        (facet[0], facet[1])
      }
    }
  }

  /// Local DOFs of this family that live on the given facet, in the order of
  /// the facet family.
  pub fn facet_dofs(&self, ifacet: usize) -> Result<Vec<usize>> {
    let Some(facet) = self.shape.facets().get(ifacet) else {
      return Err(AssemblyError::precondition(
        None,
        format!("{:?} has no facet {ifacet}", self.shape),
      ));
    };
    let mut dofs = facet.to_vec();
    if self.order == 2 && self.shape == ReferenceShape::Triangle {
      dofs.push(self.shape.nvertices() + ifacet);
    }
    Ok(dofs)
  }

  /// The border item of a facet of `element` together with the trace family.
  pub fn facet(
    &self,
    element: &GeometricElement,
    ifacet: usize,
    id: ElementId,
  ) -> Result<(GeometricElement, LagrangeFamily)> {
    if element.shape() != self.shape || element.ndofs() != self.ndofs() {
      return Err(AssemblyError::precondition(
        element.id(),
        format!("element does not carry {self:?}"),
      ));
    }
    let dofs = self.facet_dofs(ifacet).map_err(|e| e.on_element(element.id()))?;
    let facet_elem = element.facet_with_dofs(ifacet, id, &dofs)?;
    Ok((facet_elem, self.trace()?))
  }

  /// The family induced on the facets of the shape.
  pub fn trace(&self) -> Result<LagrangeFamily> {
    match self.shape.facet_shape() {
      Some(ReferenceShape::Point) => LagrangeFamily::new(ReferenceShape::Point, 0),
      Some(facet_shape) => LagrangeFamily::new(facet_shape, self.order),
      None => Err(AssemblyError::UnsupportedFamily {
        shape: self.shape,
        order: self.order,
      }),
    }
  }

  /// The reference cell itself as an element carrying this family,
  /// with identity DOF numbering.
  pub fn reference_element(&self, id: ElementId, kind: ItemKind) -> Result<GeometricElement> {
    GeometricElement::new(
      id,
      self.shape,
      kind,
      self.shape.vertices(),
      (0..self.ndofs()).collect(),
    )
  }
}

/// Value and reference gradient of a shape function at a point.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEval {
  pub value: f64,
  pub ref_grad: Coord,
}

/// A basis function bound to one local DOF of a reference element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeFunction {
  family: LagrangeFamily,
  local_index: usize,
}

impl ShapeFunction {
  pub fn family(&self) -> LagrangeFamily {
    self.family
  }
  pub fn local_index(&self) -> usize {
    self.local_index
  }
  pub fn degree(&self) -> usize {
    self.family.degree()
  }

  pub fn eval(&self, xi: CoordRef) -> ShapeEval {
    let (value, ref_grad) = self.family.eval_basis(self.local_index, xi);
    ShapeEval { value, ref_grad }
  }
  pub fn value(&self, xi: CoordRef) -> f64 {
    self.eval(xi).value
  }
  pub fn ref_gradient(&self, xi: CoordRef) -> Coord {
    self.eval(xi).ref_grad
  }
}

#[cfg(test)]
mod test {
  use super::*;

  use approx::assert_relative_eq;

  fn families() -> Vec<LagrangeFamily> {
    use ReferenceShape as S;
    [
      (S::Segment, 1),
      (S::Segment, 2),
      (S::Triangle, 1),
      (S::Triangle, 2),
      (S::Tetrahedron, 1),
      (S::Quadrilateral, 1),
    ]
    .into_iter()
    .map(|(s, o)| LagrangeFamily::new(s, o).unwrap())
    .collect()
  }

  /// Nodal points matching the local DOF order.
  fn nodes(family: &LagrangeFamily) -> Matrix {
    let verts = family.shape().vertices();
    let nverts = verts.ncols();
    let mut nodes = Matrix::zeros(verts.nrows(), family.ndofs());
    nodes.columns_mut(0, nverts).copy_from(&verts);
    for i in nverts..family.ndofs() {
      let (a, b) = family.edge(i - nverts);
      nodes.set_column(i, &((verts.column(a) + verts.column(b)) * 0.5));
    }
    nodes
  }

  #[test]
  fn kronecker_property() {
    for family in families() {
      let nodes = nodes(&family);
      for (j, node) in nodes.column_iter().enumerate() {
        for phi in family.shape_functions() {
          let expected = if phi.local_index() == j { 1.0 } else { 0.0 };
          assert_relative_eq!(phi.value(node), expected, epsilon = 1e-14);
        }
      }
    }
  }

  #[test]
  fn partition_of_unity() {
    for family in families() {
      let xi = Coord::from_element(family.shape().dim(), 0.2);
      let (values, grads) = family.eval_all(xi.as_view());
      assert_relative_eq!(values.sum(), 1.0, epsilon = 1e-14);
      assert_relative_eq!(
        grads.column_sum(),
        Coord::zeros(family.shape().dim()),
        epsilon = 1e-14
      );
    }
  }

  #[test]
  fn gradients_match_finite_differences() {
    let h = 1e-6;
    for family in families() {
      let dim = family.shape().dim();
      let xi = Coord::from_element(dim, 0.23);
      for phi in family.shape_functions() {
        let grad = phi.ref_gradient(xi.as_view());
        for d in 0..dim {
          let mut xp = xi.clone();
          let mut xm = xi.clone();
          xp[d] += h;
          xm[d] -= h;
          let fd = (phi.value(xp.as_view()) - phi.value(xm.as_view())) / (2.0 * h);
          assert_relative_eq!(grad[d], fd, epsilon = 1e-7);
        }
      }
    }
  }

  #[test]
  fn unsupported_family() {
    let err = LagrangeFamily::new(ReferenceShape::Tetrahedron, 2).unwrap_err();
    assert!(matches!(err, AssemblyError::UnsupportedFamily { .. }));
    let family = LagrangeFamily::p1(ReferenceShape::Triangle).unwrap();
    assert!(family.shape_function(3).is_err());
  }

  #[test]
  fn p2_triangle_facet() {
    let family = LagrangeFamily::new(ReferenceShape::Triangle, 2).unwrap();
    let elem = GeometricElement::new(
      0,
      ReferenceShape::Triangle,
      ItemKind::Domain,
      ReferenceShape::Triangle.vertices(),
      vec![10, 11, 12, 13, 14, 15],
    )
    .unwrap();
    let (facet, facet_family) = family.facet(&elem, 1, 100).unwrap();
    assert_eq!(facet.kind(), ItemKind::Border);
    assert_eq!(facet.local2global_map(), &[11, 12, 14]);
    assert_eq!(facet_family.ndofs(), 3);
    assert_eq!(facet_family.degree(), 2);
  }
}
