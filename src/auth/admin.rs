use constant_time_eq::constant_time_eq;

/// Header carrying the admin shared secret.
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Outcome of comparing a presented admin secret with the configured one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheck {
    /// Secret matches
    Granted,
    /// No `ADMIN_SECRET` configured; admin endpoints are off
    Disabled,
    /// Request carried no secret
    Missing,
    /// Request carried the wrong secret
    Mismatch,
}

/// Compare `provided` against `expected` in constant time.
pub fn check_admin_secret(expected: Option<&str>, provided: Option<&str>) -> AdminCheck {
    let Some(expected) = expected else {
        return AdminCheck::Disabled;
    };
    match provided {
        None | Some("") => AdminCheck::Missing,
        Some(provided) if constant_time_eq(expected.as_bytes(), provided.as_bytes()) => {
            AdminCheck::Granted
        }
        Some(_) => AdminCheck::Mismatch,
    }
}
