//! Error taxonomy of the assembly engine.
//!
//! Every error raised while working on a single element carries that
//! element's identity, so the driver can decide to skip or abort.

use crate::{geometry::ReferenceShape, ElementId};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssemblyError {
  /// Invalid or unbound trial/test indices, evaluation before binding,
  /// out-of-range DOFs and ill-formed inputs.
  #[error("precondition violated on element {element:?}: {reason}")]
  PreconditionViolation {
    element: Option<ElementId>,
    reason: String,
  },

  /// Non-positive or vanishing integration measure at a quadrature point.
  #[error("degenerate geometry on element {element}: measure density {density:e}")]
  DegenerateGeometry { element: ElementId, density: f64 },

  /// Non-finite integrand value produced during quadrature.
  #[error("non-finite integrand on element {element}: {value} at quadrature point {ipoint}")]
  NumericalFailure {
    element: ElementId,
    ipoint: usize,
    value: f64,
  },

  /// The quadrature rule cannot integrate the declared integrand degree exactly.
  #[error("quadrature of degree {available} is insufficient for integrand degree {required}")]
  QuadratureInsufficiency { required: usize, available: usize },

  #[error("no Lagrange family of order {order} on {shape:?}")]
  UnsupportedFamily { shape: ReferenceShape, order: usize },

  #[error("assembly cancelled after {assembled} elements")]
  Cancelled { assembled: usize },
}

impl AssemblyError {
  pub fn precondition(element: impl Into<Option<ElementId>>, reason: impl Into<String>) -> Self {
    Self::PreconditionViolation {
      element: element.into(),
      reason: reason.into(),
    }
  }

  /// The element this error is tied to, if any.
  pub fn element(&self) -> Option<ElementId> {
    match self {
      Self::PreconditionViolation { element, .. } => *element,
      Self::DegenerateGeometry { element, .. } | Self::NumericalFailure { element, .. } => {
        Some(*element)
      }
      Self::QuadratureInsufficiency { .. }
      | Self::UnsupportedFamily { .. }
      | Self::Cancelled { .. } => None,
    }
  }

  /// Attaches an element identity to errors raised without one.
  pub fn on_element(self, id: ElementId) -> Self {
    match self {
      Self::PreconditionViolation {
        element: None,
        reason,
      } => Self::PreconditionViolation {
        element: Some(id),
        reason,
      },
      other => other,
    }
  }
}

pub type Result<T, E = AssemblyError> = std::result::Result<T, E>;
