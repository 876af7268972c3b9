pub fn factorial(num: usize) -> usize {
  (1..=num).product()
}

/// Barycentric coordinate `ibary` of a point in the reference simplex.
///
/// # Panics
///
/// Panics if `ibary` exceeds the dimension of `xi`.
pub(crate) fn ref_bary(ibary: usize, xi: na::DVectorView<f64>) -> f64 {
  assert!(ibary < xi.nrows() + 1);
  if ibary == 0 {
    1.0 - xi.sum()
  } else {
    xi[ibary - 1]
  }
}

/// The constant reference gradients of the barycentric coordinate functions,
/// one per column.
pub fn ref_difbarys(n: usize) -> na::DMatrix<f64> {
  let mut ref_difbarys = na::DMatrix::zeros(n, n + 1);
  for i in 0..n {
    ref_difbarys[(i, 0)] = -1.0;
    ref_difbarys[(i, i + 1)] = 1.0;
  }
  ref_difbarys
}
