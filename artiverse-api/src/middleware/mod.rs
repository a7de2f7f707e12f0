pub mod auth;
pub mod rate_limit;
pub mod resiliency;

pub use auth::{admin_auth_middleware, customer_auth_middleware, Claims, MaybeUser};
