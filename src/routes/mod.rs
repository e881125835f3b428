/// Router Module Index
///
/// Routes are split by who may reach them. The access guard is attached in
/// `create_router`, so a route's module decides its protection.

/// Login flow and health check. No session required.
pub mod public;

/// Any identity with a live session.
pub mod authenticated;

/// Nested under `/admin`; the access guard additionally requires the admin role.
pub mod admin;
