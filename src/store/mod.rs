//! Key/value storage engine and pagination.

pub mod operations;
pub mod pagination;

pub use operations::TableStore;
pub use pagination::{paginate, Page};
