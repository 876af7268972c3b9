//! Scalar second-order elliptic weak form.
//!
//! Domain: $-div(k grad u) + b dot grad u + c u = f$
//! Border: $k partial_n u + alpha u = g$
//!
//! $a(u, v) = integral_Omega k grad u dot grad v + (b dot grad u) v + c u v
//!   + integral_Gamma alpha u v$
//! $l(v) = integral_Omega f v + integral_Gamma g v$

use crate::{
  error::{AssemblyError, Result},
  fe::LagrangeFamily,
  function::{self, Coefficient, Integrand, VectorCoefficient},
  geometry::{GeometricElement, ItemKind},
  quadrature::{QuadRule, QuadratureDegree},
  system::Accumulator,
  weakform::{check_family, scatter_local, Binding, ElMat, ElVec, WeakForm},
};

/// Absent coefficients drop their term from the form.
#[derive(Debug, Clone, Default)]
pub struct ScalarElliptic {
  diffusion: Option<Coefficient>,
  advection: Option<VectorCoefficient>,
  reaction: Option<Coefficient>,
  source: Option<Coefficient>,
  robin: Option<Coefficient>,
  flux: Option<Coefficient>,
  quadrature: QuadratureDegree,
}

impl ScalarElliptic {
  pub fn new() -> Self {
    Self::default()
  }

  /// $-Delta u = f$
  pub fn laplace(source: Coefficient) -> Self {
    Self::new()
      .with_diffusion(Coefficient::constant(1.0))
      .with_source(source)
  }

  pub fn with_diffusion(mut self, k: Coefficient) -> Self {
    self.diffusion = Some(k);
    self
  }
  pub fn with_advection(mut self, b: VectorCoefficient) -> Self {
    self.advection = Some(b);
    self
  }
  pub fn with_reaction(mut self, c: Coefficient) -> Self {
    self.reaction = Some(c);
    self
  }
  pub fn with_source(mut self, f: Coefficient) -> Self {
    self.source = Some(f);
    self
  }
  pub fn with_robin(mut self, alpha: Coefficient) -> Self {
    self.robin = Some(alpha);
    self
  }
  pub fn with_flux(mut self, g: Coefficient) -> Self {
    self.flux = Some(g);
    self
  }
  pub fn with_quadrature(mut self, quadrature: QuadratureDegree) -> Self {
    self.quadrature = quadrature;
    self
  }

  /// Declared degrees of the bilinear and linear integrands for shape
  /// functions of degree `p`. Mirrors [`Integrand::degree`] of the trees
  /// built by the compositional path.
  fn degrees(&self, item: ItemKind, p: usize) -> (Option<usize>, Option<usize>) {
    let dp = p.saturating_sub(1);
    // An empty form integrates the zero constant.
    let max = |terms: Vec<Option<usize>>| -> Option<usize> {
      terms.into_iter().try_fold(0, |acc, t| t.map(|t| acc.max(t)))
    };
    match item {
      ItemKind::Domain => {
        let mut lhs = Vec::new();
        if let Some(k) = &self.diffusion {
          lhs.push(k.degree().map(|dk| dk + 2 * dp));
        }
        if let Some(b) = &self.advection {
          lhs.push(b.degree().map(|db| db + dp + p));
        }
        if let Some(c) = &self.reaction {
          lhs.push(c.degree().map(|dc| dc + 2 * p));
        }
        let rhs = self.source.as_ref().map(|f| f.degree().map(|df| df + p));
        (max(lhs), max(rhs.into_iter().collect()))
      }
      ItemKind::Border => {
        let lhs = self.robin.as_ref().map(|a| a.degree().map(|da| da + 2 * p));
        let rhs = self.flux.as_ref().map(|g| g.degree().map(|dg| dg + p));
        (max(lhs.into_iter().collect()), max(rhs.into_iter().collect()))
      }
    }
  }

  /// Element matrix and vector through the fused kernel: one sweep over the
  /// quadrature points evaluating all shape functions at once.
  pub fn fused_contribution(
    &self,
    element: &GeometricElement,
    family: &LagrangeFamily,
  ) -> Result<(ElMat, ElVec)> {
    check_family(element, family)?;
    let id = element.id();
    let n = element.ndofs();
    let geo_degree = element.geometric_degree();
    let (lhs_degree, rhs_degree) = self.degrees(element.kind(), family.degree());
    let lhs_rule_degree = self
      .quadrature
      .resolve(lhs_degree, geo_degree)
      .map_err(|e| e.on_element(id))?;
    let rhs_rule_degree = self
      .quadrature
      .resolve(rhs_degree, geo_degree)
      .map_err(|e| e.on_element(id))?;

    let (diffusion, advection, reaction, source) = match element.kind() {
      ItemKind::Domain => (
        self.diffusion.as_ref(),
        self.advection.as_ref(),
        self.reaction.as_ref(),
        self.source.as_ref(),
      ),
      ItemKind::Border => (None, None, self.robin.as_ref(), self.flux.as_ref()),
    };

    let mut elmat = ElMat::zeros(n, n);
    let lhs_rule = QuadRule::for_shape(element.shape(), lhs_rule_degree);
    for (ipoint, (xi, w)) in lhs_rule.iter().enumerate() {
      let geometry = element.geometry_at(xi)?;
      let x = geometry.x.as_view();
      let (values, ref_grads) = family.eval_all(xi);
      let grads = &geometry.inv_jac_t * ref_grads;
      let wd = w * geometry.density;

      let mut local = ElMat::zeros(n, n);
      if let Some(k) = diffusion {
        local += (grads.transpose() * &grads) * k.eval(x);
      }
      if let Some(b) = advection {
        let b = b.eval(x);
        if b.len() != element.dim_ambient() {
          return Err(AssemblyError::precondition(
            id,
            format!(
              "advection field of dimension {} in ambient dimension {}",
              b.len(),
              element.dim_ambient()
            ),
          ));
        }
        let b_grads = grads.transpose() * b;
        local += &values * b_grads.transpose();
      }
      if let Some(c) = reaction {
        local += (&values * values.transpose()) * c.eval(x);
      }
      if let Some(&value) = local.iter().find(|v| !v.is_finite()) {
        return Err(AssemblyError::NumericalFailure {
          element: id,
          ipoint,
          value,
        });
      }
      elmat += local * wd;
    }

    let mut elvec = ElVec::zeros(n);
    if let Some(f) = source {
      let rhs_rule = QuadRule::for_shape(element.shape(), rhs_rule_degree);
      for (ipoint, (xi, w)) in rhs_rule.iter().enumerate() {
        let geometry = element.geometry_at(xi)?;
        let (values, _) = family.eval_all(xi);
        let fx = f.eval(geometry.x.as_view());
        if !fx.is_finite() {
          return Err(AssemblyError::NumericalFailure {
            element: id,
            ipoint,
            value: fx,
          });
        }
        elvec += values * (fx * w * geometry.density);
      }
    }
    Ok((elmat, elvec))
  }
}

impl WeakForm for ScalarElliptic {
  fn left_hand_side(
    &self,
    binding: &Binding,
    _element: &GeometricElement,
    item: ItemKind,
  ) -> Result<Integrand> {
    let (u, v) = (binding.trial, binding.test);
    let terms: Vec<Integrand> = match item {
      ItemKind::Domain => [
        self
          .diffusion
          .as_ref()
          .map(|k| function::weighted(k, function::grad_dot_grad(u, v))),
        self.advection.as_ref().map(|b| function::advection(b, u, v)),
        self
          .reaction
          .as_ref()
          .map(|c| function::weighted(c, function::mass(u, v))),
      ]
      .into_iter()
      .flatten()
      .collect(),
      ItemKind::Border => self
        .robin
        .as_ref()
        .map(|alpha| function::weighted(alpha, function::mass(u, v)))
        .into_iter()
        .collect(),
    };
    Ok(
      terms
        .into_iter()
        .reduce(|acc, term| acc + term)
        .unwrap_or_else(Integrand::zero),
    )
  }

  fn right_hand_side(
    &self,
    binding: &Binding,
    _element: &GeometricElement,
    item: ItemKind,
  ) -> Result<Integrand> {
    let f = match item {
      ItemKind::Domain => self.source.as_ref(),
      ItemKind::Border => self.flux.as_ref(),
    };
    Ok(
      f.map(|f| function::source(f, binding.test))
        .unwrap_or_else(Integrand::zero),
    )
  }

  fn quadrature_degree(&self) -> QuadratureDegree {
    self.quadrature
  }

  fn assemble_element(
    &self,
    element: &GeometricElement,
    family: &LagrangeFamily,
    acc: &mut dyn Accumulator,
  ) -> Result<()> {
    let (elmat, elvec) = self.fused_contribution(element, family)?;
    scatter_local(element, &elmat, &elvec, acc)
  }
}
