pub mod contract;
pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{chunked_body, hash, seeded_bytes};
