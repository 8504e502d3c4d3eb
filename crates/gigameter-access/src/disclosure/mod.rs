//! Field-level disclosure of response bodies.

pub mod field_path;
pub mod response;

pub use field_path::{FilterMode, apply, apply_exclude, apply_include};
pub use response::{EndpointKey, ResponseDisclosureFilter};
