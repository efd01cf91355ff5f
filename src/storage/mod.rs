pub mod identity_provider;
pub mod identity_toolkit;
pub mod memory_provider;
