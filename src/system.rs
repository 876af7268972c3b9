//! The global linear system and the accumulation targets of element scatter.

use crate::{
  error::{AssemblyError, Result},
  geometry::GeometricElement,
  sparse::SparseMatrix,
  DofIdx, ElementId,
};

/// Additive target of local-to-global scatter.
///
/// Writers call [`Accumulator::check_element`] before the first `add_*` of
/// an element, so a rejected element leaves the target untouched.
pub trait Accumulator {
  /// Validates the DOF map of `element` against this target.
  fn check_element(&self, _element: &GeometricElement) -> Result<()> {
    Ok(())
  }
  /// Adds `value` to the stiffness entry `(row, col)`, i.e. `(test, trial)`.
  fn add_stiffness(&mut self, row: DofIdx, col: DofIdx, value: f64);
  /// Adds `value` to the load entry `row`.
  fn add_load(&mut self, row: DofIdx, value: f64);
}

/// Staged contributions of a single element.
///
/// Nothing reaches a [`GlobalSystem`] until the buffer is committed as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScatterBuffer {
  element: Option<ElementId>,
  /// Global DOFs the element claims, validated on commit even when no
  /// entry touches them.
  dofs: Vec<DofIdx>,
  stiffness: Vec<(DofIdx, DofIdx, f64)>,
  load: Vec<(DofIdx, f64)>,
}

impl ScatterBuffer {
  pub fn new(element: ElementId) -> Self {
    Self {
      element: Some(element),
      ..Default::default()
    }
  }

  /// A buffer carrying the DOF map of `element`.
  pub fn for_element(element: &GeometricElement) -> Self {
    Self {
      element: Some(element.id()),
      dofs: element.local2global_map().to_vec(),
      ..Default::default()
    }
  }

  pub fn element(&self) -> Option<ElementId> {
    self.element
  }
  pub fn dofs(&self) -> &[DofIdx] {
    &self.dofs
  }
  pub fn stiffness(&self) -> &[(DofIdx, DofIdx, f64)] {
    &self.stiffness
  }
  pub fn load(&self) -> &[(DofIdx, f64)] {
    &self.load
  }
  pub fn is_empty(&self) -> bool {
    self.stiffness.is_empty() && self.load.is_empty()
  }
}

impl Accumulator for ScatterBuffer {
  fn add_stiffness(&mut self, row: DofIdx, col: DofIdx, value: f64) {
    self.stiffness.push((row, col, value));
  }
  fn add_load(&mut self, row: DofIdx, value: f64) {
    self.load.push((row, value));
  }
}

/// Global stiffness matrix and load vector indexed by global DOF.
///
/// Stiffness contributions are kept as triplets and summed in insertion
/// order on export. Accumulation is commutative up to floating-point
/// summation order: assembling the same elements in another order (as
/// parallel runs do) can change the last bits of an entry, nothing more.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem {
  stiffness: SparseMatrix,
  load: na::DVector<f64>,
}

impl GlobalSystem {
  pub fn new(ndofs: usize) -> Self {
    Self {
      stiffness: SparseMatrix::zeros(ndofs, ndofs),
      load: na::DVector::zeros(ndofs),
    }
  }

  pub fn ndofs(&self) -> usize {
    self.load.len()
  }
  pub fn stiffness(&self) -> &SparseMatrix {
    &self.stiffness
  }
  pub fn load(&self) -> &na::DVector<f64> {
    &self.load
  }
  pub fn into_parts(self) -> (SparseMatrix, na::DVector<f64>) {
    (self.stiffness, self.load)
  }

  pub fn stiffness_entry(&self, row: DofIdx, col: DofIdx) -> f64 {
    self.stiffness.entry(row, col)
  }
  pub fn stiffness_coo(&self) -> nas::CooMatrix<f64> {
    self.stiffness.to_nalgebra_coo()
  }
  pub fn stiffness_csr(&self) -> nas::CsrMatrix<f64> {
    self.stiffness.to_nalgebra_csr()
  }
  pub fn stiffness_dense(&self) -> na::DMatrix<f64> {
    self.stiffness.to_nalgebra_dense()
  }

  fn check_dofs(
    &self,
    element: Option<ElementId>,
    dofs: impl IntoIterator<Item = DofIdx>,
  ) -> Result<()> {
    let ndofs = self.ndofs();
    match dofs.into_iter().find(|&idof| idof >= ndofs) {
      Some(idof) => Err(AssemblyError::precondition(
        element,
        format!("global DOF {idof} out of range 0..{ndofs}"),
      )),
      None => Ok(()),
    }
  }

  /// Applies the staged contributions of one element, all or nothing.
  ///
  /// Every DOF the buffer carries or touches must lie in `0..ndofs`.
  pub fn commit(&mut self, buffer: ScatterBuffer) -> Result<()> {
    self.check_dofs(
      buffer.element,
      buffer
        .dofs
        .iter()
        .copied()
        .chain(buffer.stiffness.iter().flat_map(|&(r, c, _)| [r, c]))
        .chain(buffer.load.iter().map(|&(r, _)| r)),
    )?;

    for (r, c, v) in buffer.stiffness {
      self.stiffness.push(r, c, v);
    }
    for (r, v) in buffer.load {
      self.load[r] += v;
    }
    Ok(())
  }

  /// Adds another system of the same size, e.g. a per-worker partial.
  pub fn merge(&mut self, other: GlobalSystem) -> Result<()> {
    if other.ndofs() != self.ndofs() {
      return Err(AssemblyError::precondition(
        None,
        format!(
          "cannot merge systems of {} and {} DOFs",
          self.ndofs(),
          other.ndofs()
        ),
      ));
    }
    self.stiffness.append(other.stiffness);
    self.load += other.load;
    Ok(())
  }
}

/// Direct scatter. [`Accumulator::check_element`] rejects elements with
/// global DOFs outside `0..ndofs`.
///
/// # Panics
///
/// `add_*` panic on global DOFs outside `0..ndofs`.
impl Accumulator for GlobalSystem {
  fn check_element(&self, element: &GeometricElement) -> Result<()> {
    self.check_dofs(
      Some(element.id()),
      element.local2global_map().iter().copied(),
    )
  }
  fn add_stiffness(&mut self, row: DofIdx, col: DofIdx, value: f64) {
    self.stiffness.push(row, col, value);
  }
  fn add_load(&mut self, row: DofIdx, value: f64) {
    self.load[row] += value;
  }
}
