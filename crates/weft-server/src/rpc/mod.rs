//! Registered RPC methods: handler trait, registry, and call context.

pub mod context;
pub mod registry;

pub use context::CallContext;
pub use registry::{MethodHandler, MethodRegistry, RegistryError};
