//! Spectral positional features from the symmetric normalised Laplacian.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Eigen-decomposition of a normalised Laplacian, eigenvalues ascending.
///
/// Column `k` of [`SpectralEmbedding::eigenvectors`] belongs to eigenvalue
/// `k`. Signs and the order within degenerate eigenvalues are solver
/// dependent.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralEmbedding {
    eigenvalues: DVector<f64>,
    eigenvectors: DMatrix<f64>,
}

impl SpectralEmbedding {
    /// Eigenvalues in ascending order.
    #[must_use]
    pub fn eigenvalues(&self) -> &DVector<f64> {
        &self.eigenvalues
    }

    /// Orthonormal eigenvectors stored column-wise.
    #[must_use]
    pub fn eigenvectors(&self) -> &DMatrix<f64> {
        &self.eigenvectors
    }

    /// Copies the leading `min(n, k)` eigenvectors into an `n × k` matrix,
    /// leaving any remaining columns zero.
    #[must_use]
    pub fn leading_columns(&self, k: usize) -> DMatrix<f64> {
        let n = self.eigenvectors.nrows();
        let mut out = DMatrix::zeros(n, k);
        let take = k.min(self.eigenvectors.ncols());
        out.columns_mut(0, take)
            .copy_from(&self.eigenvectors.columns(0, take));
        out
    }
}

/// Builds `D^{-1/2} (D - A) D^{-1/2}` for a symmetric adjacency matrix.
///
/// Degree-zero nodes get a zero inverse square root, so isolated nodes
/// contribute all-zero rows and columns.
///
/// # Examples
/// ```
/// use nalgebra::DMatrix;
/// use neugraph_core::normalized_laplacian;
///
/// let adjacency = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
/// let laplacian = normalized_laplacian(&adjacency);
/// assert_eq!(laplacian[(0, 0)], 1.0);
/// assert_eq!(laplacian[(0, 1)], -1.0);
/// assert_eq!(laplacian[(2, 2)], 0.0);
/// ```
#[must_use]
pub fn normalized_laplacian(adjacency: &DMatrix<f64>) -> DMatrix<f64> {
    let degrees: Vec<f64> = adjacency.row_iter().map(|row| row.sum()).collect();
    let inv_sqrt: Vec<f64> = degrees
        .iter()
        .map(|&d| if d > 0.0 { d.sqrt().recip() } else { 0.0 })
        .collect();
    let n = adjacency.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        let laplacian = if i == j {
            degrees.get(i).copied().unwrap_or(0.0) - adjacency[(i, j)]
        } else {
            -adjacency[(i, j)]
        };
        let left = inv_sqrt.get(i).copied().unwrap_or(0.0);
        let right = inv_sqrt.get(j).copied().unwrap_or(0.0);
        left * laplacian * right
    })
}

/// Eigen-decomposes the normalised Laplacian of `adjacency`.
///
/// The symmetric QR solver converges on any real symmetric input, so
/// disconnected and near-singular graphs never fail.
#[must_use]
pub fn spectral_features(adjacency: &DMatrix<f64>) -> SpectralEmbedding {
    let n = adjacency.nrows();
    if n == 0 {
        return SpectralEmbedding {
            eigenvalues: DVector::zeros(0),
            eigenvectors: DMatrix::zeros(0, 0),
        };
    }
    let eigen = SymmetricEigen::new(normalized_laplacian(adjacency));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let eigenvalues = DVector::from_iterator(n, order.iter().map(|&k| eigen.eigenvalues[k]));
    let eigenvectors = eigen.eigenvectors.select_columns(order.iter());
    SpectralEmbedding {
        eigenvalues,
        eigenvectors,
    }
}
