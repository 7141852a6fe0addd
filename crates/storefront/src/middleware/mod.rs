//! HTTP middleware for servers that render storefront pages.

pub mod edge_guard;

pub use edge_guard::{EdgeGuard, presence_guard};
