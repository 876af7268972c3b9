//! Triplet storage for additive sparse accumulation.

use crate::DofIdx;

/// Sparse matrix as an unordered list of `(row, col, value)` triplets.
///
/// Duplicate entries are allowed and mean addition; they are summed in
/// insertion order on conversion.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SparseMatrix {
  nrows: usize,
  ncols: usize,
  triplets: Vec<(DofIdx, DofIdx, f64)>,
}

impl SparseMatrix {
  pub fn zeros(nrows: usize, ncols: usize) -> Self {
    Self::new(nrows, ncols, Vec::new())
  }
  /// # Panics
  ///
  /// Panics if a triplet lies outside `nrows x ncols`.
  pub fn new(nrows: usize, ncols: usize, triplets: Vec<(DofIdx, DofIdx, f64)>) -> Self {
    assert!(triplets.iter().all(|&(r, c, _)| r < nrows && c < ncols));
    Self {
      nrows,
      ncols,
      triplets,
    }
  }

  pub fn nrows(&self) -> usize {
    self.nrows
  }
  pub fn ncols(&self) -> usize {
    self.ncols
  }
  pub fn ntriplets(&self) -> usize {
    self.triplets.len()
  }
  pub fn triplets(&self) -> &[(DofIdx, DofIdx, f64)] {
    &self.triplets
  }

  pub fn into_parts(self) -> (usize, usize, Vec<(DofIdx, DofIdx, f64)>) {
    (self.nrows, self.ncols, self.triplets)
  }

  /// Adds a triplet. Zero values are dropped.
  ///
  /// # Panics
  ///
  /// Panics if `(r, c)` lies outside the matrix.
  pub fn push(&mut self, r: DofIdx, c: DofIdx, v: f64) {
    assert!(r < self.nrows && c < self.ncols);
    if v != 0.0 {
      self.triplets.push((r, c, v));
    }
  }

  /// Appends all triplets of a matrix of the same size.
  ///
  /// # Panics
  ///
  /// Panics if the sizes differ.
  pub fn append(&mut self, other: SparseMatrix) {
    assert_eq!((self.nrows, self.ncols), (other.nrows, other.ncols));
    self.triplets.extend(other.triplets);
  }

  /// The summed value at one position.
  pub fn entry(&self, r: DofIdx, c: DofIdx) -> f64 {
    self
      .triplets
      .iter()
      .filter(|&&(tr, tc, _)| tr == r && tc == c)
      .map(|t| t.2)
      .sum()
  }

  pub fn to_nalgebra_coo(&self) -> nas::CooMatrix<f64> {
    let mut coo = nas::CooMatrix::new(self.nrows, self.ncols);
    for &(r, c, v) in &self.triplets {
      coo.push(r, c, v);
    }
    coo
  }

  pub fn to_nalgebra_csr(&self) -> nas::CsrMatrix<f64> {
    (&self.to_nalgebra_coo()).into()
  }

  pub fn to_nalgebra_dense(&self) -> na::DMatrix<f64> {
    (&self.to_nalgebra_coo()).into()
  }
}
