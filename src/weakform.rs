//! The weak form contract.
//!
//! A [`WeakForm`] offers two ways to obtain element contributions:
//!
//! - the compositional path: for every bound (trial, test) pair, build the
//!   bilinear and linear integrands and integrate them generically;
//! - the fused path: [`WeakForm::assemble_element`] computes and scatters all
//!   contributions of an element in one go.
//!
//! Both must agree up to floating-point tolerance.

use crate::{
  error::{AssemblyError, Result},
  fe::{LagrangeFamily, ShapeFunction},
  function::Integrand,
  geometry::{GeometricElement, ItemKind},
  quadrature::{self, QuadratureDegree},
  system::Accumulator,
};

/// Element matrix, rows indexed by test, columns by trial local DOF.
pub type ElMat = na::DMatrix<f64>;
/// Element vector, indexed by test local DOF.
pub type ElVec = na::DVector<f64>;

/// The active trial/test pair of one assembly step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
  pub trial: ShapeFunction,
  pub trial_index: usize,
  pub test: ShapeFunction,
  pub test_index: usize,
}

impl Binding {
  /// Binds a pair on an element, rejecting indices the element does not have.
  pub fn new(
    element: &GeometricElement,
    trial: ShapeFunction,
    trial_index: usize,
    test: ShapeFunction,
    test_index: usize,
  ) -> Result<Self> {
    let ndofs = element.ndofs();
    for (role, phi, index) in [("trial", trial, trial_index), ("test", test, test_index)] {
      if index >= ndofs {
        return Err(AssemblyError::precondition(
          element.id(),
          format!("{role} index {index} out of range 0..{ndofs}"),
        ));
      }
      if phi.family().shape() != element.shape() {
        return Err(AssemblyError::precondition(
          element.id(),
          format!(
            "{role} function lives on {:?}, element is {:?}",
            phi.family().shape(),
            element.shape()
          ),
        ));
      }
    }
    Ok(Self {
      trial,
      trial_index,
      test,
      test_index,
    })
  }
}

pub trait WeakForm: Send + Sync {
  /// Bilinear integrand of the bound pair, contributing to the stiffness matrix.
  fn left_hand_side(
    &self,
    binding: &Binding,
    element: &GeometricElement,
    item: ItemKind,
  ) -> Result<Integrand>;

  /// Linear integrand of the bound test function, contributing to the load vector.
  fn right_hand_side(
    &self,
    binding: &Binding,
    element: &GeometricElement,
    item: ItemKind,
  ) -> Result<Integrand>;

  fn quadrature_degree(&self) -> QuadratureDegree {
    QuadratureDegree::Auto
  }

  fn integrate(&self, element: &GeometricElement, integrand: &Integrand) -> Result<f64> {
    quadrature::integrate(element, integrand, self.quadrature_degree())
  }

  /// Computes and scatters all contributions of `element` into `acc`.
  ///
  /// Defaults to the compositional path; forms with a hand-fused kernel
  /// override this. Overrides compute the whole local system before they
  /// hand it to [`scatter_local`], so a failing element writes nothing.
  fn assemble_element(
    &self,
    element: &GeometricElement,
    family: &LagrangeFamily,
    acc: &mut dyn Accumulator,
  ) -> Result<()> {
    let (elmat, elvec) = compositional_contribution(self, element, family)?;
    scatter_local(element, &elmat, &elvec, acc)
  }
}

/// One element of an assembly run with its current binding.
///
/// Evaluation methods require a prior [`ElementStep::bind`].
pub struct ElementStep<'a, W: ?Sized> {
  form: &'a W,
  element: &'a GeometricElement,
  binding: Option<Binding>,
}

impl<'a, W: WeakForm + ?Sized> ElementStep<'a, W> {
  pub fn new(form: &'a W, element: &'a GeometricElement) -> Self {
    Self {
      form,
      element,
      binding: None,
    }
  }

  pub fn element(&self) -> &GeometricElement {
    self.element
  }
  pub fn binding(&self) -> Option<&Binding> {
    self.binding.as_ref()
  }

  pub fn bind(
    &mut self,
    trial: ShapeFunction,
    trial_index: usize,
    test: ShapeFunction,
    test_index: usize,
  ) -> Result<&Binding> {
    let binding = Binding::new(self.element, trial, trial_index, test, test_index)?;
    Ok(self.binding.insert(binding))
  }

  fn require_binding(&self) -> Result<&Binding> {
    self.binding.as_ref().ok_or_else(|| {
      AssemblyError::precondition(self.element.id(), "no trial/test pair bound")
    })
  }

  pub fn left_hand_side(&self, item: ItemKind) -> Result<Integrand> {
    let binding = self.require_binding()?;
    self
      .form
      .left_hand_side(binding, self.element, item)
      .map_err(|e| e.on_element(self.element.id()))
  }

  pub fn right_hand_side(&self, item: ItemKind) -> Result<Integrand> {
    let binding = self.require_binding()?;
    self
      .form
      .right_hand_side(binding, self.element, item)
      .map_err(|e| e.on_element(self.element.id()))
  }

  pub fn integrate(&self, integrand: &Integrand) -> Result<f64> {
    self.form.integrate(self.element, integrand)
  }
}

/// Checks that `family` provides exactly the local DOFs of `element`.
pub fn check_family(element: &GeometricElement, family: &LagrangeFamily) -> Result<()> {
  if family.shape() != element.shape() || family.ndofs() != element.ndofs() {
    return Err(AssemblyError::precondition(
      element.id(),
      format!(
        "{family:?} with {} DOFs does not fit {:?} element with {} DOFs",
        family.ndofs(),
        element.shape(),
        element.ndofs()
      ),
    ));
  }
  Ok(())
}

/// Element matrix and vector through the compositional path: bind every
/// (trial, test) pair, build the integrands and integrate them.
pub fn compositional_contribution<W: WeakForm + ?Sized>(
  form: &W,
  element: &GeometricElement,
  family: &LagrangeFamily,
) -> Result<(ElMat, ElVec)> {
  check_family(element, family)?;
  let n = element.ndofs();
  let item = element.kind();
  let phis = family.shape_functions();

  let mut elmat = ElMat::zeros(n, n);
  let mut elvec = ElVec::zeros(n);
  let mut step = ElementStep::new(form, element);
  for (itest, &test) in phis.iter().enumerate() {
    for (itrial, &trial) in phis.iter().enumerate() {
      step.bind(trial, itrial, test, itest)?;
      let lhs = step.left_hand_side(item)?;
      elmat[(itest, itrial)] = step.integrate(&lhs)?;
      if itrial == 0 {
        let rhs = step.right_hand_side(item)?;
        elvec[itest] = step.integrate(&rhs)?;
      }
    }
  }
  Ok((elmat, elvec))
}

/// Scatters an element matrix and vector through the element's
/// local-to-global DOF map: `(test, trial)` goes to
/// `(global(test), global(trial))`.
pub fn scatter_local(
  element: &GeometricElement,
  elmat: &ElMat,
  elvec: &ElVec,
  acc: &mut dyn Accumulator,
) -> Result<()> {
  let n = element.ndofs();
  if elmat.shape() != (n, n) || elvec.len() != n {
    return Err(AssemblyError::precondition(
      element.id(),
      format!(
        "local system of shape {:?} does not match {n} local DOFs",
        elmat.shape()
      ),
    ));
  }
  acc.check_element(element)?;
  let dofs = element.local2global_map();
  for (itest, &gtest) in dofs.iter().enumerate() {
    for (itrial, &gtrial) in dofs.iter().enumerate() {
      let v = elmat[(itest, itrial)];
      if v != 0.0 {
        acc.add_stiffness(gtest, gtrial, v);
      }
    }
    if elvec[itest] != 0.0 {
      acc.add_load(gtest, elvec[itest]);
    }
  }
  Ok(())
}
