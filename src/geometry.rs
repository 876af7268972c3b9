//! Mesh cells as seen by the assembly engine.
//!
//! A [`GeometricElement`] owns the node coordinates of one cell, its
//! local-to-global DOF map and the mapping from the reference cell onto
//! the physical cell.

use crate::{
  error::{AssemblyError, Result},
  util::factorial,
  Dim, DofIdx, ElementId,
};

use itertools::Itertools;

pub type Coord = na::DVector<f64>;
pub type CoordRef<'a> = na::DVectorView<'a, f64>;
pub type Matrix = na::DMatrix<f64>;

/// Relative threshold under which a measure density counts as vanishing.
const DEGENERACY_TOL: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceShape {
  /// The 0-cell, used as border item of segments.
  Point,
  /// $[0,1]$
  Segment,
  /// Unit right triangle with vertices $(0,0), (1,0), (0,1)$.
  Triangle,
  /// Unit square $[0,1]^2$ with counterclockwise vertices.
  Quadrilateral,
  /// Unit tetrahedron with vertices $0, e_1, e_2, e_3$.
  Tetrahedron,
}

impl ReferenceShape {
  pub fn dim(self) -> Dim {
    match self {
      Self::Point => 0,
      Self::Segment => 1,
      Self::Triangle | Self::Quadrilateral => 2,
      Self::Tetrahedron => 3,
    }
  }

  pub fn nvertices(self) -> usize {
    match self {
      Self::Quadrilateral => 4,
      simplex => simplex.dim() + 1,
    }
  }

  pub fn is_simplex(self) -> bool {
    !matches!(self, Self::Quadrilateral)
  }

  /// The measure of the reference cell.
  pub fn ref_vol(self) -> f64 {
    match self {
      Self::Quadrilateral => 1.0,
      simplex => (factorial(simplex.dim()) as f64).recip(),
    }
  }

  /// Polynomial degree the reference-to-physical measure density contributes
  /// to an integrand.
  pub fn geometric_degree(self) -> usize {
    match self {
      Self::Quadrilateral => 1,
      _ => 0,
    }
  }

  /// Reference vertex coordinates in the columns of a matrix.
  pub fn vertices(self) -> Matrix {
    let dim = self.dim();
    match self {
      Self::Quadrilateral => na::dmatrix![
        0.0, 1.0, 1.0, 0.0;
        0.0, 0.0, 1.0, 1.0
      ],
      _ => {
        let mut vertices = Matrix::zeros(dim, dim + 1);
        for i in 0..dim {
          vertices[(i, i + 1)] = 1.0;
        }
        vertices
      }
    }
  }

  /// Local vertex lists of the facets, oriented consistently with the cell.
  pub fn facets(self) -> &'static [&'static [usize]] {
    match self {
      Self::Point => &[],
      Self::Segment => &[&[0], &[1]],
      Self::Triangle => &[&[0, 1], &[1, 2], &[2, 0]],
      Self::Quadrilateral => &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]],
      Self::Tetrahedron => &[&[0, 2, 1], &[0, 1, 3], &[0, 3, 2], &[1, 2, 3]],
    }
  }

  pub fn facet_shape(self) -> Option<ReferenceShape> {
    match self {
      Self::Point => None,
      Self::Segment => Some(Self::Point),
      Self::Triangle | Self::Quadrilateral => Some(Self::Segment),
      Self::Tetrahedron => Some(Self::Triangle),
    }
  }
}

/// Whether an integral is taken over the cell interior or over a boundary facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
  Domain,
  Border,
}

/// The mapping evaluated at one reference point.
#[derive(Debug, Clone)]
pub struct PointGeometry {
  /// Physical coordinates of the mapped point.
  pub x: Coord,
  /// Integration measure density, $|det J|$ or the Gram root for embedded items.
  pub density: f64,
  /// Transposed (pseudo-)inverse Jacobian, pushes reference gradients to physical ones.
  pub inv_jac_t: Matrix,
}

impl PointGeometry {
  pub fn physical_gradient(&self, ref_grad: &Coord) -> Coord {
    &self.inv_jac_t * ref_grad
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometricElement {
  id: ElementId,
  shape: ReferenceShape,
  kind: ItemKind,
  /// Node coordinates in the columns of a matrix.
  nodes: Matrix,
  local2global: Vec<DofIdx>,
}

impl GeometricElement {
  pub fn new(
    id: ElementId,
    shape: ReferenceShape,
    kind: ItemKind,
    nodes: Matrix,
    local2global: Vec<DofIdx>,
  ) -> Result<Self> {
    if nodes.ncols() != shape.nvertices() {
      return Err(AssemblyError::precondition(
        id,
        format!(
          "{shape:?} needs {} nodes, got {}",
          shape.nvertices(),
          nodes.ncols()
        ),
      ));
    }
    if nodes.nrows() < shape.dim() {
      return Err(AssemblyError::precondition(
        id,
        format!(
          "ambient dimension {} below reference dimension {}",
          nodes.nrows(),
          shape.dim()
        ),
      ));
    }
    if local2global.is_empty() {
      return Err(AssemblyError::precondition(id, "element without DOFs"));
    }
    Ok(Self {
      id,
      shape,
      kind,
      nodes,
      local2global,
    })
  }

  pub fn id(&self) -> ElementId {
    self.id
  }
  pub fn shape(&self) -> ReferenceShape {
    self.shape
  }
  pub fn kind(&self) -> ItemKind {
    self.kind
  }
  pub fn dim_intrinsic(&self) -> Dim {
    self.shape.dim()
  }
  pub fn dim_ambient(&self) -> Dim {
    self.nodes.nrows()
  }
  pub fn nodes(&self) -> &Matrix {
    &self.nodes
  }
  pub fn node(&self, inode: usize) -> CoordRef {
    self.nodes.column(inode)
  }
  pub fn ndofs(&self) -> usize {
    self.local2global.len()
  }
  pub fn local2global_map(&self) -> &[DofIdx] {
    &self.local2global
  }

  /// Global DOF of a local index. Out-of-range indices are a precondition violation.
  pub fn local2global(&self, ilocal: usize) -> Result<DofIdx> {
    self.local2global.get(ilocal).copied().ok_or_else(|| {
      AssemblyError::precondition(
        self.id,
        format!("local DOF {ilocal} out of range 0..{}", self.ndofs()),
      )
    })
  }

  /// Polynomial degree of the measure density.
  pub fn geometric_degree(&self) -> usize {
    self.shape.geometric_degree()
  }

  /// The largest distance between two nodes.
  pub fn diameter(&self) -> f64 {
    self
      .nodes
      .column_iter()
      .tuple_combinations()
      .map(|(a, b)| (a - b).norm())
      .fold(0.0, f64::max)
  }

  /// Reference to physical coordinates.
  pub fn map_reference(&self, xi: CoordRef) -> Coord {
    let n = &self.nodes;
    match self.shape {
      ReferenceShape::Quadrilateral => {
        let (s, t) = (xi[0], xi[1]);
        n.column(0) * ((1.0 - s) * (1.0 - t))
          + n.column(1) * (s * (1.0 - t))
          + n.column(2) * (s * t)
          + n.column(3) * ((1.0 - s) * t)
      }
      _ => {
        let mut x = n.column(0).into_owned();
        for i in 0..self.dim_intrinsic() {
          x += (n.column(i + 1) - n.column(0)) * xi[i];
        }
        x
      }
    }
  }

  /// Jacobian of the reference mapping, ambient x intrinsic.
  pub fn jacobian(&self, xi: CoordRef) -> Matrix {
    let n = &self.nodes;
    let mut jac = Matrix::zeros(self.dim_ambient(), self.dim_intrinsic());
    match self.shape {
      ReferenceShape::Quadrilateral => {
        let (s, t) = (xi[0], xi[1]);
        let ds = (n.column(1) - n.column(0)) * (1.0 - t) + (n.column(2) - n.column(3)) * t;
        let dt = (n.column(3) - n.column(0)) * (1.0 - s) + (n.column(2) - n.column(1)) * s;
        jac.set_column(0, &ds);
        jac.set_column(1, &dt);
      }
      _ => {
        for i in 0..self.dim_intrinsic() {
          jac.set_column(i, &(n.column(i + 1) - n.column(0)));
        }
      }
    }
    jac
  }

  /// Signed measure density: $det J$ for full-dimensional items,
  /// the Gram root $sqrt(det J^T J)$ for embedded ones.
  pub fn measure_density(&self, xi: CoordRef) -> f64 {
    if self.dim_intrinsic() == 0 {
      return 1.0;
    }
    let jac = self.jacobian(xi);
    if self.dim_ambient() == self.dim_intrinsic() {
      jac.determinant()
    } else {
      (jac.transpose() * &jac).determinant().max(0.0).sqrt()
    }
  }

  /// Evaluates the mapping at a reference point, rejecting degenerate geometry.
  pub fn geometry_at(&self, xi: CoordRef) -> Result<PointGeometry> {
    let x = self.map_reference(xi);
    let dim = self.dim_intrinsic();
    if dim == 0 {
      return Ok(PointGeometry {
        x,
        density: 1.0,
        inv_jac_t: Matrix::zeros(self.dim_ambient(), 0),
      });
    }

    let degenerate = |density| AssemblyError::DegenerateGeometry {
      element: self.id,
      density,
    };
    let tol = DEGENERACY_TOL * self.diameter().powi(dim as i32);

    let jac = self.jacobian(xi);
    if self.dim_ambient() == dim {
      let density = jac.determinant();
      if !(density > tol) {
        return Err(degenerate(density));
      }
      let inv = jac.try_inverse().ok_or_else(|| degenerate(density))?;
      Ok(PointGeometry {
        x,
        density,
        inv_jac_t: inv.transpose(),
      })
    } else {
      let gram = jac.transpose() * &jac;
      let density = gram.determinant().max(0.0).sqrt();
      if !(density > tol) {
        return Err(degenerate(density));
      }
      let gram_inv = gram.try_inverse().ok_or_else(|| degenerate(density))?;
      Ok(PointGeometry {
        x,
        density,
        inv_jac_t: jac * gram_inv,
      })
    }
  }

  /// Builds the border item of a local facet with the given local DOF subset.
  pub(crate) fn facet_with_dofs(
    &self,
    ifacet: usize,
    id: ElementId,
    local_dofs: &[usize],
  ) -> Result<GeometricElement> {
    let facets = self.shape.facets();
    let (Some(facet), Some(facet_shape)) = (facets.get(ifacet), self.shape.facet_shape()) else {
      return Err(AssemblyError::precondition(
        self.id,
        format!("{:?} has no facet {ifacet}", self.shape),
      ));
    };
    let mut nodes = Matrix::zeros(self.dim_ambient(), facet.len());
    for (i, &ivertex) in facet.iter().enumerate() {
      nodes.set_column(i, &self.node(ivertex));
    }
    let dofs = local_dofs
      .iter()
      .map(|&ilocal| self.local2global(ilocal))
      .collect::<Result<Vec<_>>>()?;
    GeometricElement::new(id, facet_shape, ItemKind::Border, nodes, dofs)
  }
}
