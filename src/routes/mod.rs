/// Router Module Index
///
/// Routes are split by who may reach them. Access control is attached per module in
/// `create_router`, so a handler cannot end up exposed by being registered in the
/// wrong place.

/// Unauthenticated routes (health checks).
pub mod public;

/// Routes for any authenticated account that passes the security policy.
pub mod authenticated;

/// Staff routes, nested under `/admin`. Each handler additionally checks its
/// (resource, action) permission.
pub mod admin;
