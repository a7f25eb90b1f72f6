use crate::types::DenseMatrix;

/// The result of fitting an [`Mnrsa`](super::Mnrsa) model.
#[derive(Debug, Clone)]
pub struct MnrsaFit {
    /// Fitted effect covariance U = L L'.
    pub u: DenseMatrix,
    /// Correlation matrix of `u`.
    pub c: DenseMatrix,
    /// Fitted Cholesky factor of `u`.
    pub l: DenseMatrix,
    /// Covariance of the ordinary least-squares coefficients across voxels.
    pub naive_u: DenseMatrix,
    /// Correlation matrix of `naive_u`.
    pub naive_c: DenseMatrix,
    /// Fitted nuisance regressors (n_T x n_nureg).
    pub x_0: DenseMatrix,
    /// Joint log-likelihood at the fitted parameters (priors included).
    pub log_likelihood: f64,
    /// Joint log-likelihood at the starting point.
    pub initial_log_likelihood: f64,
    /// Whether the optimizer reported convergence.
    pub converged: bool,
    /// Optimizer termination status.
    pub status: String,
    pub iterations: u64,
    /// Number of free scalar parameters optimized.
    pub n_params: usize,
}

impl MnrsaFit {
    /// AIC = -2 * logL + 2 * p.
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.n_params as f64
    }

    /// Formatted summary of the fit.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("=== Matrix-Normal RSA Fit ===\n\n");
        s.push_str(&format!(
            "Conditions: {}   Nuisance regressors: {}   Free params: {}\n",
            self.u.nrows(),
            self.x_0.ncols(),
            self.n_params
        ));
        s.push_str(&format!(
            "Converged: {}   Iterations: {}   Status: {}\n\n",
            self.converged, self.iterations, self.status
        ));
        s.push_str(&format!(
            "Log-likelihood: {:.4} (initial {:.4})\n",
            self.log_likelihood, self.initial_log_likelihood
        ));
        s.push_str(&format!("AIC: {:.4}\n\n", self.aic()));

        s.push_str("Effect correlation:\n");
        for i in 0..self.c.nrows() {
            let row: Vec<String> = (0..self.c.ncols())
                .map(|j| format!("{:>8.4}", self.c[(i, j)]))
                .collect();
            s.push_str(&format!("  {}\n", row.join(" ")));
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit() -> MnrsaFit {
        let l = DenseMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.5, 2.0]);
        let u = &l * l.transpose();
        MnrsaFit {
            c: crate::matrix::dense::cov2corr(&u),
            naive_u: u.clone(),
            naive_c: crate::matrix::dense::cov2corr(&u),
            u,
            l,
            x_0: DenseMatrix::zeros(6, 1),
            log_likelihood: -10.0,
            initial_log_likelihood: -12.5,
            converged: true,
            status: "SolverConverged".to_string(),
            iterations: 7,
            n_params: 9,
        }
    }

    #[test]
    fn test_aic() {
        assert_eq!(fit().aic(), 38.0);
    }

    #[test]
    fn test_summary_mentions_key_numbers() {
        let s = fit().summary();
        assert!(s.contains("Conditions: 2"));
        assert!(s.contains("Nuisance regressors: 1"));
        assert!(s.contains("Log-likelihood: -10.0000"));
        assert!(s.contains("SolverConverged"));
        assert!(s.contains("AIC: 38.0000"));
        assert!(s.ends_with('\n'));
    }
}
