//! Route guard checks.
//!
//! # Usage
//!
//! ```bash
//! fads route /dashboard
//! fads route /admin/products --as customer
//! ```

use fads_core::ActorKind;
use fads_storefront::RoutePolicy;

use super::output;

/// Print the decision of the storefront route table for `path`.
pub fn decide(path: &str, kind: ActorKind) {
    let decision = RoutePolicy::default().decide_for(path, kind);
    tracing::debug!(path, actor_kind = %kind, %decision, "Route decided");
    output::decision(path, &decision);
}
