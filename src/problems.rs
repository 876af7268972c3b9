//! Concrete weak forms.

pub mod elliptic;

pub use elliptic::ScalarElliptic;
