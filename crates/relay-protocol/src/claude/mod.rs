pub mod stream;
pub mod types;
