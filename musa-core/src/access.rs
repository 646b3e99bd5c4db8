//! Route gating
//!
//! `/admin/*` needs the `ADMIN` role; the farm pages need any signed-in user.
//! Everything else is public.

use crate::session::Role;

/// Where unauthenticated users are sent
pub const SIGN_IN_PATH: &str = "/sign-in";

const ADMIN_PREFIX: &str = "/admin";
const PROTECTED_PREFIXES: &[&str] = &["/dashboard", "/plantings", "/tasks"];

/// Gate decision for a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    RedirectToSignIn,
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Decide whether `path` may be served given what the client holds.
pub fn gate(path: &str, has_token: bool, role: Option<&Role>) -> Access {
    if under(path, ADMIN_PREFIX) {
        return match role {
            Some(Role::Admin) => Access::Allow,
            _ => Access::RedirectToSignIn,
        };
    }

    if PROTECTED_PREFIXES.iter().any(|p| under(path, p)) && !has_token {
        return Access::RedirectToSignIn;
    }

    Access::Allow
}
