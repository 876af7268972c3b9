//! Integrands as closure trees.
//!
//! An [`Integrand`] is built by algebraic composition of shape function
//! evaluations and coefficient fields, and evaluated by a recursive match
//! at every quadrature point.

use crate::{
  error::{AssemblyError, Result},
  fe::ShapeFunction,
  geometry::{Coord, CoordRef, PointGeometry},
};

use std::{
  fmt,
  ops::{Add, Mul},
  sync::Arc,
};

pub type ScalarField = Arc<dyn Fn(CoordRef) -> f64 + Send + Sync>;
pub type VectorField = Arc<dyn Fn(CoordRef) -> Coord + Send + Sync>;

/// Scalar field on physical coordinates, e.g. a material coefficient.
///
/// The declared degree is `None` for non-polynomial fields, which then
/// need an explicitly configured quadrature degree.
#[derive(Clone)]
pub struct Coefficient {
  field: ScalarField,
  degree: Option<usize>,
}

impl Coefficient {
  pub fn constant(value: f64) -> Self {
    Self {
      field: Arc::new(move |_: CoordRef| value),
      degree: Some(0),
    }
  }
  pub fn polynomial<F>(degree: usize, field: F) -> Self
  where
    F: Fn(CoordRef) -> f64 + Send + Sync + 'static,
  {
    Self {
      field: Arc::new(field),
      degree: Some(degree),
    }
  }
  pub fn field<F>(field: F) -> Self
  where
    F: Fn(CoordRef) -> f64 + Send + Sync + 'static,
  {
    Self {
      field: Arc::new(field),
      degree: None,
    }
  }

  pub fn degree(&self) -> Option<usize> {
    self.degree
  }
  pub fn eval(&self, x: CoordRef) -> f64 {
    (self.field)(x)
  }

  /// The same field multiplied by a constant.
  pub fn scaled(&self, factor: f64) -> Self {
    let field = self.field.clone();
    Self {
      field: Arc::new(move |x: CoordRef| factor * field(x)),
      degree: self.degree,
    }
  }
}
impl fmt::Debug for Coefficient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Coefficient")
      .field("degree", &self.degree)
      .finish_non_exhaustive()
  }
}

/// Vector field on physical coordinates, e.g. an advection velocity.
#[derive(Clone)]
pub struct VectorCoefficient {
  field: VectorField,
  degree: Option<usize>,
}

impl VectorCoefficient {
  pub fn constant(value: Coord) -> Self {
    Self {
      field: Arc::new(move |_: CoordRef| value.clone()),
      degree: Some(0),
    }
  }
  pub fn polynomial<F>(degree: usize, field: F) -> Self
  where
    F: Fn(CoordRef) -> Coord + Send + Sync + 'static,
  {
    Self {
      field: Arc::new(field),
      degree: Some(degree),
    }
  }
  pub fn field<F>(field: F) -> Self
  where
    F: Fn(CoordRef) -> Coord + Send + Sync + 'static,
  {
    Self {
      field: Arc::new(field),
      degree: None,
    }
  }

  pub fn degree(&self) -> Option<usize> {
    self.degree
  }
  pub fn eval(&self, x: CoordRef) -> Coord {
    (self.field)(x)
  }
}
impl fmt::Debug for VectorCoefficient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("VectorCoefficient")
      .field("degree", &self.degree)
      .finish_non_exhaustive()
  }
}

/// Pointwise value of an integrand.
#[derive(Debug, Clone, PartialEq)]
pub enum FnValue {
  Scalar(f64),
  Vector(Coord),
}

/// A quadrature point seen by an integrand: the reference point and the
/// mapping evaluated there.
#[derive(Debug, Clone, Copy)]
pub struct EvalPoint<'a> {
  pub xi: CoordRef<'a>,
  pub geometry: &'a PointGeometry,
}

#[derive(Debug, Clone)]
pub enum Integrand {
  Constant(f64),
  Coefficient(Coefficient),
  VectorCoefficient(VectorCoefficient),
  ShapeValue(ShapeFunction),
  /// Physical gradient of a shape function.
  ShapeGradient(ShapeFunction),
  Sum(Box<Integrand>, Box<Integrand>),
  /// Scalar times scalar or scalar times vector.
  Product(Box<Integrand>, Box<Integrand>),
  Dot(Box<Integrand>, Box<Integrand>),
  Scale(f64, Box<Integrand>),
}

impl Integrand {
  pub fn zero() -> Self {
    Self::Constant(0.0)
  }

  pub fn dot(self, other: Integrand) -> Self {
    Self::Dot(Box::new(self), Box::new(other))
  }

  /// Polynomial degree in reference coordinates on affine cells, `None` as
  /// soon as a non-polynomial factor participates.
  pub fn degree(&self) -> Option<usize> {
    match self {
      Self::Constant(_) => Some(0),
      Self::Coefficient(c) => c.degree(),
      Self::VectorCoefficient(c) => c.degree(),
      Self::ShapeValue(phi) => Some(phi.degree()),
      Self::ShapeGradient(phi) => Some(phi.degree().saturating_sub(1)),
      Self::Sum(a, b) => Some(a.degree()?.max(b.degree()?)),
      Self::Product(a, b) | Self::Dot(a, b) => Some(a.degree()? + b.degree()?),
      Self::Scale(_, a) => a.degree(),
    }
  }

  pub fn eval(&self, point: &EvalPoint) -> Result<FnValue> {
    use FnValue::{Scalar, Vector};

    let value = match self {
      Self::Constant(c) => Scalar(*c),
      Self::Coefficient(c) => Scalar(c.eval(point.geometry.x.as_view())),
      Self::VectorCoefficient(c) => Vector(c.eval(point.geometry.x.as_view())),
      Self::ShapeValue(phi) => Scalar(phi.value(point.xi)),
      Self::ShapeGradient(phi) => {
        Vector(point.geometry.physical_gradient(&phi.ref_gradient(point.xi)))
      }
      Self::Sum(a, b) => match (a.eval(point)?, b.eval(point)?) {
        (Scalar(a), Scalar(b)) => Scalar(a + b),
        (Vector(a), Vector(b)) if a.len() == b.len() => Vector(a + b),
        _ => return Err(mismatch("sum")),
      },
      Self::Product(a, b) => match (a.eval(point)?, b.eval(point)?) {
        (Scalar(a), Scalar(b)) => Scalar(a * b),
        (Scalar(s), Vector(v)) | (Vector(v), Scalar(s)) => Vector(v * s),
        _ => return Err(mismatch("product")),
      },
      Self::Dot(a, b) => match (a.eval(point)?, b.eval(point)?) {
        (Vector(a), Vector(b)) if a.len() == b.len() => Scalar(a.dot(&b)),
        _ => return Err(mismatch("dot product")),
      },
      Self::Scale(s, a) => match a.eval(point)? {
        Scalar(a) => Scalar(s * a),
        Vector(a) => Vector(a * *s),
      },
    };
    Ok(value)
  }

  pub fn eval_scalar(&self, point: &EvalPoint) -> Result<f64> {
    match self.eval(point)? {
      FnValue::Scalar(v) => Ok(v),
      FnValue::Vector(_) => Err(AssemblyError::precondition(
        None,
        "integrand evaluates to a vector, expected a scalar",
      )),
    }
  }
}

fn mismatch(op: &str) -> AssemblyError {
  AssemblyError::precondition(None, format!("operand kinds do not match in {op}"))
}

impl Add for Integrand {
  type Output = Integrand;
  fn add(self, rhs: Integrand) -> Integrand {
    Integrand::Sum(Box::new(self), Box::new(rhs))
  }
}
impl Mul for Integrand {
  type Output = Integrand;
  fn mul(self, rhs: Integrand) -> Integrand {
    Integrand::Product(Box::new(self), Box::new(rhs))
  }
}
impl Mul<Integrand> for f64 {
  type Output = Integrand;
  fn mul(self, rhs: Integrand) -> Integrand {
    Integrand::Scale(self, Box::new(rhs))
  }
}

/// $grad u dot grad v$
pub fn grad_dot_grad(trial: ShapeFunction, test: ShapeFunction) -> Integrand {
  Integrand::ShapeGradient(trial).dot(Integrand::ShapeGradient(test))
}

/// $u v$
pub fn mass(trial: ShapeFunction, test: ShapeFunction) -> Integrand {
  Integrand::ShapeValue(trial) * Integrand::ShapeValue(test)
}

/// $f v$
pub fn source(f: &Coefficient, test: ShapeFunction) -> Integrand {
  Integrand::Coefficient(f.clone()) * Integrand::ShapeValue(test)
}

/// $(b dot grad u) v$
pub fn advection(b: &VectorCoefficient, trial: ShapeFunction, test: ShapeFunction) -> Integrand {
  Integrand::VectorCoefficient(b.clone()).dot(Integrand::ShapeGradient(trial))
    * Integrand::ShapeValue(test)
}

/// $k dot (...)$
pub fn weighted(k: &Coefficient, integrand: Integrand) -> Integrand {
  Integrand::Coefficient(k.clone()) * integrand
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    fe::LagrangeFamily,
    geometry::{GeometricElement, ItemKind, ReferenceShape},
  };

  use approx::assert_relative_eq;

  fn setup() -> (GeometricElement, LagrangeFamily) {
    let elem = GeometricElement::new(
      0,
      ReferenceShape::Triangle,
      ItemKind::Domain,
      na::dmatrix![0.0, 2.0, 0.0; 0.0, 0.0, 2.0],
      vec![0, 1, 2],
    )
    .unwrap();
    (elem, LagrangeFamily::p1(ReferenceShape::Triangle).unwrap())
  }

  #[test]
  fn evaluates_building_blocks() {
    let (elem, family) = setup();
    let phis = family.shape_functions();
    let xi = na::dvector![0.25, 0.25];
    let geometry = elem.geometry_at(xi.as_view()).unwrap();
    let point = EvalPoint {
      xi: xi.as_view(),
      geometry: &geometry,
    };

    // Physical gradients are halved by the scaling of the element.
    let a = grad_dot_grad(phis[1], phis[1]).eval_scalar(&point).unwrap();
    assert_relative_eq!(a, 0.25);
    let a = grad_dot_grad(phis[0], phis[1]).eval_scalar(&point).unwrap();
    assert_relative_eq!(a, -0.25);

    let m = mass(phis[0], phis[1]).eval_scalar(&point).unwrap();
    assert_relative_eq!(m, 0.5 * 0.25);

    // x = (0.5, 0.5) at the mapped point.
    let f = Coefficient::polynomial(1, |x| x[0] + x[1]);
    let s = (3.0 * source(&f, phis[2])).eval_scalar(&point).unwrap();
    assert_relative_eq!(s, 3.0 * 1.0 * 0.25);

    let b = VectorCoefficient::constant(na::dvector![1.0, 0.0]);
    let adv = advection(&b, phis[1], phis[0]).eval_scalar(&point).unwrap();
    assert_relative_eq!(adv, 0.5 * 0.5);
  }

  #[test]
  fn degrees_compose() {
    let family = LagrangeFamily::new(ReferenceShape::Triangle, 2).unwrap();
    let phi = family.shape_function(0).unwrap();
    assert_eq!(grad_dot_grad(phi, phi).degree(), Some(2));
    assert_eq!(mass(phi, phi).degree(), Some(4));
    let k = Coefficient::polynomial(1, |x| x[0]);
    assert_eq!(weighted(&k, mass(phi, phi)).degree(), Some(5));
    let nonpoly = Coefficient::field(|x| x[0].exp());
    assert_eq!((mass(phi, phi) + source(&nonpoly, phi)).degree(), None);
  }

  #[test]
  fn kind_mismatch_is_reported() {
    let (elem, family) = setup();
    let phi = family.shape_function(0).unwrap();
    let xi = na::dvector![0.25, 0.25];
    let geometry = elem.geometry_at(xi.as_view()).unwrap();
    let point = EvalPoint {
      xi: xi.as_view(),
      geometry: &geometry,
    };
    let bad = Integrand::ShapeValue(phi) + Integrand::ShapeGradient(phi);
    assert!(matches!(
      bad.eval(&point),
      Err(AssemblyError::PreconditionViolation { .. })
    ));
    assert!(Integrand::ShapeGradient(phi).eval_scalar(&point).is_err());
  }
}
