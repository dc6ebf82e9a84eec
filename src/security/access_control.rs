//! Authentication and authorization gates.
//!
//! The engine never verifies credentials; it consumes the principal an
//! external resolver already attached to the request context and enforces
//! the route's declared requirements against it.

use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};
use crate::routing::route::AuthPolicy;

/// Enforce a route's auth policy against the resolved principal.
///
/// Role/scope requirements are OR-within, i.e. holding any one of the
/// listed roles or scopes is sufficient.
pub fn enforce(route_id: &str, policy: &AuthPolicy, ctx: &RequestContext) -> GatewayResult<()> {
    if !policy.required {
        return Ok(());
    }

    let principal = ctx.principal.as_ref().ok_or_else(|| {
        tracing::debug!(route_id, "Rejecting unauthenticated request");
        GatewayError::AuthenticationRequired {
            route_id: route_id.to_string(),
        }
    })?;

    if policy.roles.is_empty() && policy.scopes.is_empty() {
        return Ok(());
    }

    let has_role = policy.roles.iter().any(|r| principal.roles.contains(r));
    let has_scope = policy.scopes.iter().any(|s| principal.scopes.contains(s));
    if has_role || has_scope {
        Ok(())
    } else {
        tracing::debug!(route_id, principal = %principal.id, "Principal lacks required roles/scopes");
        Err(GatewayError::InsufficientPermissions {
            route_id: route_id.to_string(),
        })
    }
}
