//! Quadrature rules on reference shapes and element integration.

use crate::{
  error::{AssemblyError, Result},
  function::{EvalPoint, Integrand},
  geometry::{CoordRef, GeometricElement, Matrix, ReferenceShape},
  Dim,
};

use itertools::iproduct;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

/// Highest rule degree any integral may resolve to.
pub const MAX_QUADRATURE_DEGREE: usize = 64;

/// A quadrature rule defined on a reference shape.
///
/// Exact for polynomials up to total degree [`QuadRule::degree`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuadRule {
  shape: ReferenceShape,
  degree: usize,
  /// Quadrature nodes in the columns.
  nodes: Matrix,
  weights: na::DVector<f64>,
}

static RULE_CACHE: Lazy<Mutex<HashMap<(ReferenceShape, usize), Arc<QuadRule>>>> =
  Lazy::new(|| Mutex::new(HashMap::new()));

impl QuadRule {
  /// Builds a rule of the given shape exact up to `degree`.
  ///
  /// # Panics
  ///
  /// Panics if `degree` exceeds [`MAX_QUADRATURE_DEGREE`].
  pub fn new(shape: ReferenceShape, degree: usize) -> Self {
    assert!(
      degree <= MAX_QUADRATURE_DEGREE,
      "quadrature degree {degree} above {MAX_QUADRATURE_DEGREE}"
    );
    let (nodes, weights) = match shape {
      ReferenceShape::Point => (Matrix::zeros(0, 1), na::dvector![1.0]),
      ReferenceShape::Segment => {
        let (x, w) = gauss_legendre_unit(gauss_npoints(degree));
        (Matrix::from_row_slice(1, x.len(), &x), na::DVector::from_vec(w))
      }
      ReferenceShape::Quadrilateral => {
        let (weights, points) =
          fenris_quadrature::tensor::quadrilateral_gauss(gauss_npoints(degree));
        collect_rule(
          2,
          points
            .into_iter()
            .zip(weights)
            .map(|([x, y], w)| (vec![to_unit(x), to_unit(y)], 0.25 * w)),
        )
      }
      ReferenceShape::Triangle => {
        // Collapsed coordinates: x = u, y = v (1-u), dA = (1-u) du dv.
        let (u, wu) = gauss_legendre_unit(gauss_npoints(degree + 1));
        let (v, wv) = gauss_legendre_unit(gauss_npoints(degree));
        collect_rule(
          2,
          iproduct!(0..u.len(), 0..v.len()).map(|(i, j)| {
            let jac = 1.0 - u[i];
            (vec![u[i], v[j] * jac], wu[i] * wv[j] * jac)
          }),
        )
      }
      ReferenceShape::Tetrahedron => {
        // x = u, y = v (1-u), z = w (1-u)(1-v), dV = (1-u)^2 (1-v) du dv dw.
        let (u, wu) = gauss_legendre_unit(gauss_npoints(degree + 2));
        let (v, wv) = gauss_legendre_unit(gauss_npoints(degree + 1));
        let (w, ww) = gauss_legendre_unit(gauss_npoints(degree));
        collect_rule(
          3,
          iproduct!(0..u.len(), 0..v.len(), 0..w.len()).map(|(i, j, k)| {
            let (cu, cv) = (1.0 - u[i], 1.0 - v[j]);
            (
              vec![u[i], v[j] * cu, w[k] * cu * cv],
              wu[i] * wv[j] * ww[k] * cu * cu * cv,
            )
          }),
        )
      }
    };
    Self {
      shape,
      degree,
      nodes,
      weights,
    }
  }

  /// Shared rule from the process-wide cache.
  ///
  /// # Panics
  ///
  /// Panics if `degree` exceeds [`MAX_QUADRATURE_DEGREE`].
  pub fn for_shape(shape: ReferenceShape, degree: usize) -> Arc<QuadRule> {
    let mut cache = RULE_CACHE.lock();
    cache
      .entry((shape, degree))
      .or_insert_with(|| {
        let rule = QuadRule::new(shape, degree);
        tracing::debug!(
          "built quadrature rule for {shape:?} of degree {degree} with {} points",
          rule.npoints()
        );
        Arc::new(rule)
      })
      .clone()
  }

  pub fn shape(&self) -> ReferenceShape {
    self.shape
  }
  pub fn degree(&self) -> usize {
    self.degree
  }
  pub fn dim(&self) -> Dim {
    self.shape.dim()
  }
  pub fn npoints(&self) -> usize {
    self.weights.len()
  }
  pub fn nodes(&self) -> &Matrix {
    &self.nodes
  }
  pub fn weights(&self) -> &na::DVector<f64> {
    &self.weights
  }

  pub fn iter(&self) -> impl Iterator<Item = (CoordRef, f64)> {
    self.nodes.column_iter().zip(self.weights.iter().copied())
  }

  /// Integrates over the reference shape.
  pub fn integrate_ref<F>(&self, f: F) -> f64
  where
    F: Fn(CoordRef) -> f64,
  {
    self.iter().map(|(xi, w)| w * f(xi)).sum()
  }
}

fn collect_rule<I>(dim: Dim, points: I) -> (Matrix, na::DVector<f64>)
where
  I: Iterator<Item = (Vec<f64>, f64)>,
{
  let (nodes, weights): (Vec<_>, Vec<_>) = points.unzip();
  let mut mat = Matrix::zeros(dim, nodes.len());
  for (i, node) in nodes.iter().enumerate() {
    mat.set_column(i, &na::DVector::from_column_slice(node));
  }
  (mat, na::DVector::from_vec(weights))
}

/// Number of Gauss-Legendre points exact up to `degree`.
fn gauss_npoints(degree: usize) -> usize {
  degree / 2 + 1
}

/// Maps a coordinate of $[-1,1]$ onto $[0,1]$.
fn to_unit(x: f64) -> f64 {
  0.5 * (1.0 + x)
}

/// Gauss-Legendre nodes and weights on $[0,1]$.
fn gauss_legendre_unit(n: usize) -> (Vec<f64>, Vec<f64>) {
  let (weights, points) = fenris_quadrature::univariate::gauss(n);
  (
    points.iter().map(|&[x]| to_unit(x)).collect(),
    weights.iter().map(|w| 0.5 * w).collect(),
  )
}

/// How the quadrature degree of an integral is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadratureDegree {
  /// Exactly the declared integrand degree plus the geometric degree.
  /// Requires a polynomial integrand.
  #[default]
  Auto,
  /// A caller-chosen degree, rejected if below a declared polynomial degree.
  Fixed(usize),
  /// The declared degree, but never below the given one. Non-polynomial
  /// integrands use the given degree as accepted approximation order.
  AtLeast(usize),
}

impl QuadratureDegree {
  /// Resolves the rule degree for an integrand of declared degree on a cell
  /// whose measure contributes `geometric_degree`.
  ///
  /// Degrees above [`MAX_QUADRATURE_DEGREE`] are a precondition violation.
  pub fn resolve(self, integrand_degree: Option<usize>, geometric_degree: usize) -> Result<usize> {
    let required = integrand_degree.map(|d| d.saturating_add(geometric_degree));
    let degree = self.resolve_unbounded(required)?;
    if degree > MAX_QUADRATURE_DEGREE {
      return Err(AssemblyError::precondition(
        None,
        format!("quadrature degree {degree} exceeds the maximum of {MAX_QUADRATURE_DEGREE}"),
      ));
    }
    Ok(degree)
  }

  fn resolve_unbounded(self, required: Option<usize>) -> Result<usize> {
    match (self, required) {
      (Self::Auto, Some(required)) => Ok(required),
      (Self::Auto, None) => Err(AssemblyError::precondition(
        None,
        "non-polynomial integrand needs an explicit quadrature degree",
      )),
      (Self::Fixed(available), Some(required)) if available < required => {
        Err(AssemblyError::QuadratureInsufficiency {
          required,
          available,
        })
      }
      (Self::Fixed(available), _) => Ok(available),
      (Self::AtLeast(min), required) => Ok(required.map_or(min, |r| r.max(min))),
    }
  }
}

/// Integrates a scalar integrand over an element.
///
/// Raises [`AssemblyError::DegenerateGeometry`] for vanishing measure and
/// [`AssemblyError::NumericalFailure`] for non-finite integrand values,
/// both tagged with the element identity.
pub fn integrate(
  element: &GeometricElement,
  integrand: &Integrand,
  degree: QuadratureDegree,
) -> Result<f64> {
  let id = element.id();
  let rule_degree = degree
    .resolve(integrand.degree(), element.geometric_degree())
    .map_err(|e| e.on_element(id))?;
  let rule = QuadRule::for_shape(element.shape(), rule_degree);

  let mut integral = 0.0;
  for (ipoint, (xi, w)) in rule.iter().enumerate() {
    let geometry = element.geometry_at(xi)?;
    let point = EvalPoint {
      xi,
      geometry: &geometry,
    };
    let value = integrand.eval_scalar(&point).map_err(|e| e.on_element(id))?;
    if !value.is_finite() {
      return Err(AssemblyError::NumericalFailure {
        element: id,
        ipoint,
        value,
      });
    }
    integral += w * value * geometry.density;
  }
  if !integral.is_finite() {
    return Err(AssemblyError::NumericalFailure {
      element: id,
      ipoint: rule.npoints(),
      value: integral,
    });
  }
  Ok(integral)
}
