//! Utility layer - General types, errors, helper functions

pub mod errors;

pub use errors::{ExploreError, ExploreResult};
