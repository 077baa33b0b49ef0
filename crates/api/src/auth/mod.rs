//! Authentication module for Acerto Certo

pub mod jwt;
pub mod middleware;

pub use jwt::{AppMetadata, Claims, JwtManager, PLATFORM_ADMIN_ROLE, SUPABASE_AUDIENCE};
pub use middleware::{require_auth, require_platform_admin, tenant_scope, AuthError, AuthUser};
