//! OpenAPI document disclosure.
//!
//! Documents are handled as `serde_json::Value` trees. Only references of
//! the form `#/components/schemas/<name>` take part in schema reachability;
//! any other `$ref` is carried through untouched.

pub mod document;
pub mod node;
pub mod schema_filter;
pub mod schema_map;

pub use document::DocumentDisclosureFilter;
pub use node::{SCHEMA_REF_PREFIX, SchemaNode, collect_refs, refs_of, schema_ref, schema_ref_name};
pub use schema_filter::filter_schema_properties;
pub use schema_map::{EndpointSchemaMap, HTTP_METHODS, OperationKey, schema_closure};
