//! Route handlers.
//!
//! Every admin handler follows the same shape: `require_permission` first, then input
//! sanitizing, then the store call, then the audit entry for mutations.

pub mod analytics;
pub mod content;
pub mod me;
pub mod providers;
pub mod roles;
pub mod security;
pub mod users;

pub use analytics::*;
pub use content::*;
pub use me::*;
pub use providers::*;
pub use roles::*;
pub use security::*;
pub use users::*;
