//! Request handlers grouped by resource.

pub mod files;
pub mod mocks;
pub mod system;
