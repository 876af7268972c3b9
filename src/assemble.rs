//! The assembly driver.
//!
//! Iterates over the elements of a mesh, obtains each element's
//! contributions through the configured path, and commits them to a
//! [`GlobalSystem`] one element at a time, all or nothing.

use crate::{
  error::{AssemblyError, Result},
  fe::LagrangeFamily,
  geometry::{GeometricElement, ItemKind},
  system::{GlobalSystem, ScatterBuffer},
  weakform::{compositional_contribution, scatter_local, Binding, WeakForm},
};

use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblyPath {
  /// Bind every (trial, test) pair and integrate the form's integrands.
  #[default]
  Compositional,
  /// Delegate to [`WeakForm::assemble_element`].
  Fused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
  #[default]
  Sequential,
  /// Workers compute element contributions in parallel and commit them
  /// to one shared system behind a lock.
  LockedScatter,
  /// Workers assemble private partial systems that are summed at the end.
  MergeReduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
  /// Stop at the first failing element and return its error.
  #[default]
  Abort,
  /// Leave the failing element out, record its error and carry on.
  Skip,
}

/// Cooperative cancellation flag, checked between elements.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }
  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyConfig {
  pub path: AssemblyPath,
  pub parallelism: Parallelism,
  pub error_policy: ErrorPolicy,
  pub cancel: CancelToken,
}

impl AssemblyConfig {
  pub fn with_path(mut self, path: AssemblyPath) -> Self {
    self.path = path;
    self
  }
  pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
    self.parallelism = parallelism;
    self
  }
  pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
    self.error_policy = error_policy;
    self
  }
  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyReport {
  /// Number of elements committed to the system.
  pub assembled: usize,
  /// Errors of the elements left out under [`ErrorPolicy::Skip`],
  /// ordered by element id.
  pub skipped: Vec<AssemblyError>,
  pub cancelled: bool,
}

impl AssemblyReport {
  fn merge(&mut self, other: AssemblyReport) {
    self.assembled += other.assembled;
    self.skipped.extend(other.skipped);
    self.cancelled |= other.cancelled;
  }
}

/// Result of an assembly run. A cancelled run still holds every element
/// committed before cancellation was observed.
#[derive(Debug, Clone)]
pub struct Assembly {
  pub system: GlobalSystem,
  pub report: AssemblyReport,
}

impl Assembly {
  /// The assembled system, or [`AssemblyError::Cancelled`] for a partial one.
  pub fn finish(self) -> Result<GlobalSystem> {
    if self.report.cancelled {
      Err(AssemblyError::Cancelled {
        assembled: self.report.assembled,
      })
    } else {
      Ok(self.system)
    }
  }
}

/// Partial system of one worker.
struct Partial {
  system: GlobalSystem,
  report: AssemblyReport,
}

impl Partial {
  fn new(ndofs: usize) -> Self {
    Self {
      system: GlobalSystem::new(ndofs),
      report: AssemblyReport::default(),
    }
  }

  fn merge(mut self, other: Partial) -> Result<Self> {
    self.system.merge(other.system)?;
    self.report.merge(other.report);
    Ok(self)
  }
}

pub struct Assembler<'a, W: ?Sized> {
  form: &'a W,
  family: LagrangeFamily,
  trace: Option<LagrangeFamily>,
  config: AssemblyConfig,
}

impl<'a, W: WeakForm + ?Sized> Assembler<'a, W> {
  /// Sets up an assembler for domain elements carrying `family` and border
  /// elements carrying its trace.
  ///
  /// The quadrature configuration is checked against the form's integrands
  /// on the reference cells, so an unsuitable degree is reported here and
  /// not once per element.
  pub fn new(form: &'a W, family: LagrangeFamily, config: AssemblyConfig) -> Result<Self> {
    let this = Self {
      form,
      family,
      trace: family.trace().ok(),
      config,
    };
    this.check_quadrature(&family, ItemKind::Domain)?;
    if let Some(trace) = this.trace {
      this.check_quadrature(&trace, ItemKind::Border)?;
    }
    Ok(this)
  }

  fn check_quadrature(&self, family: &LagrangeFamily, item: ItemKind) -> Result<()> {
    let element = family.reference_element(0, item)?;
    let phi = family.shape_function(0)?;
    let binding = Binding::new(&element, phi, 0, phi, 0)?;
    let quadrature = self.form.quadrature_degree();
    let integrands = [
      self.form.left_hand_side(&binding, &element, item),
      self.form.right_hand_side(&binding, &element, item),
    ];
    for integrand in integrands {
      let integrand = integrand.map_err(|e| e.on_element(element.id()))?;
      quadrature
        .resolve(integrand.degree(), element.geometric_degree())
        .map_err(|e| match e {
          AssemblyError::PreconditionViolation { reason, .. } => {
            AssemblyError::precondition(None, format!("{item:?} integrand: {reason}"))
          }
          other => other,
        })?;
    }
    Ok(())
  }

  pub fn config(&self) -> &AssemblyConfig {
    &self.config
  }

  /// The family an element is assembled with: the configured one on domain
  /// items, its trace on border items.
  pub fn element_family(&self, element: &GeometricElement) -> Result<LagrangeFamily> {
    match element.kind() {
      ItemKind::Domain => Ok(self.family),
      ItemKind::Border => self.trace.ok_or_else(|| {
        AssemblyError::precondition(
          element.id(),
          format!("{:?} has no border items", self.family),
        )
      }),
    }
  }

  /// Staged contributions of a single element, in global DOFs.
  pub fn assemble_local(&self, element: &GeometricElement) -> Result<ScatterBuffer> {
    let family = self.element_family(element)?;
    let mut buffer = ScatterBuffer::for_element(element);
    match self.config.path {
      AssemblyPath::Compositional => {
        let (elmat, elvec) = compositional_contribution(self.form, element, &family)?;
        scatter_local(element, &elmat, &elvec, &mut buffer)?;
      }
      AssemblyPath::Fused => self.form.assemble_element(element, &family, &mut buffer)?,
    }
    Ok(buffer)
  }

  /// Assembles all `elements` into a system of `ndofs` global DOFs.
  ///
  /// Fails with the first element error under [`ErrorPolicy::Abort`]. With
  /// parallel models, "first" is whichever failing element a worker hit
  /// first.
  pub fn assemble(&self, elements: &[GeometricElement], ndofs: usize) -> Result<Assembly> {
    let mut assembly = match self.config.parallelism {
      Parallelism::Sequential => self.assemble_sequential(elements, ndofs)?,
      Parallelism::LockedScatter => self.assemble_locked(elements, ndofs)?,
      Parallelism::MergeReduce => self.assemble_merged(elements, ndofs)?,
    };
    let report = &mut assembly.report;
    report.skipped.sort_by_key(|e| e.element());

    if report.cancelled {
      tracing::warn!(
        "assembly cancelled after {} of {} elements",
        report.assembled,
        elements.len()
      );
    }
    tracing::info!(
      "assembled {} of {} elements into {} DOFs ({:?}, {:?}), skipped {}",
      report.assembled,
      elements.len(),
      ndofs,
      self.config.path,
      self.config.parallelism,
      report.skipped.len()
    );
    Ok(assembly)
  }

  fn assemble_sequential(&self, elements: &[GeometricElement], ndofs: usize) -> Result<Assembly> {
    let mut partial = Partial::new(ndofs);
    for element in elements {
      if self.config.cancel.is_cancelled() {
        partial.report.cancelled = true;
        break;
      }
      self.assemble_into(element, &mut partial)?;
    }
    Ok(Assembly {
      system: partial.system,
      report: partial.report,
    })
  }

  fn assemble_locked(&self, elements: &[GeometricElement], ndofs: usize) -> Result<Assembly> {
    let shared = Mutex::new(Partial::new(ndofs));
    elements.par_iter().try_for_each(|element| {
      if self.config.cancel.is_cancelled() {
        shared.lock().report.cancelled = true;
        return Ok(());
      }
      let staged = self.assemble_local(element);
      let mut shared = shared.lock();
      let result = staged.and_then(|buffer| shared.system.commit(buffer));
      self.record(element, result, &mut shared.report)
    })?;
    let partial = shared.into_inner();
    Ok(Assembly {
      system: partial.system,
      report: partial.report,
    })
  }

  fn assemble_merged(&self, elements: &[GeometricElement], ndofs: usize) -> Result<Assembly> {
    let partial = elements
      .par_iter()
      .try_fold(
        || Partial::new(ndofs),
        |mut partial, element| {
          if self.config.cancel.is_cancelled() {
            partial.report.cancelled = true;
          } else {
            self.assemble_into(element, &mut partial)?;
          }
          Ok(partial)
        },
      )
      .try_reduce(|| Partial::new(ndofs), Partial::merge)?;
    Ok(Assembly {
      system: partial.system,
      report: partial.report,
    })
  }

  fn assemble_into(&self, element: &GeometricElement, partial: &mut Partial) -> Result<()> {
    let result = self
      .assemble_local(element)
      .and_then(|buffer| partial.system.commit(buffer));
    self.record(element, result, &mut partial.report)
  }

  /// Applies the error policy to the outcome of one element.
  fn record(
    &self,
    element: &GeometricElement,
    result: Result<()>,
    report: &mut AssemblyReport,
  ) -> Result<()> {
    let err = match result {
      Ok(()) => {
        report.assembled += 1;
        return Ok(());
      }
      Err(err) => err.on_element(element.id()),
    };
    tracing::debug!("element {} failed: {err}", element.id());
    match self.config.error_policy {
      ErrorPolicy::Abort => Err(err),
      ErrorPolicy::Skip => {
        tracing::warn!("skipping element {}: {err}", element.id());
        report.skipped.push(err);
        Ok(())
      }
    }
  }
}
