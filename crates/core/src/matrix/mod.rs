pub mod dense;
pub mod kronecker;
pub mod sparse;

pub use kronecker::{
    kron_mul, kronecker_product, mask_marginal_counts, solve_lower_kron, solve_lower_masked_kron,
    solve_upper_kron, solve_upper_masked_kron,
};
pub use sparse::TripletBuilder;
