//! Provider orchestration services.

mod resolver;

pub use resolver::ProviderResolver;
