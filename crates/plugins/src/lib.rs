//! Plugin layer: maps user-supplied URLs to site handlers and resolved
//! channels without hard-coding site logic into the core.

pub mod channel;
pub mod direct;
pub mod error;
pub mod plugin;
pub mod quality;
pub mod registry;

pub use channel::{Channel, ResolvedChannel, StreamMap};
pub use direct::DirectPlugin;
pub use error::ResolutionError;
pub use plugin::SitePlugin;
pub use registry::PluginRegistry;
