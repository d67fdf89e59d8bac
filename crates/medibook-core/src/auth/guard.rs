//! Role-based access decisions for protected screens.

use super::SessionState;
use crate::api::LOGIN_ROUTE;
use crate::models::Role;

pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Session restore has not finished; render nothing yet
    Loading,
    Granted,
    RedirectToLogin,
    /// Logged in, but with the wrong role
    Unauthorized,
}

impl Access {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            Access::RedirectToLogin => Some(LOGIN_ROUTE),
            Access::Unauthorized => Some(UNAUTHORIZED_ROUTE),
            Access::Loading | Access::Granted => None,
        }
    }
}

pub fn check_access(state: &SessionState, required: Role) -> Access {
    if state.loading {
        return Access::Loading;
    }
    match state.user {
        Some(ref user) if state.is_logged_in => {
            if user.role == required {
                Access::Granted
            } else {
                Access::Unauthorized
            }
        }
        _ => Access::RedirectToLogin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credential, UserIdentity};

    fn logged_in(role: Role) -> SessionState {
        SessionState {
            is_logged_in: true,
            user: Some(UserIdentity {
                id: 3,
                email: "u@clinic.org".to_string(),
                role,
            }),
            token: Some(Credential::new("t1")),
            loading: false,
        }
    }

    #[test]
    fn test_loading_state_waits() {
        assert_eq!(check_access(&SessionState::initializing(), Role::Patient), Access::Loading);
        assert_eq!(Access::Loading.redirect_target(), None);
    }

    #[test]
    fn test_anonymous_redirects_to_login() {
        let mut state = SessionState::initializing();
        state.loading = false;
        let access = check_access(&state, Role::Doctor);
        assert_eq!(access, Access::RedirectToLogin);
        assert_eq!(access.redirect_target(), Some("/auth/login"));
    }

    #[test]
    fn test_role_mismatch_is_unauthorized() {
        let access = check_access(&logged_in(Role::Patient), Role::Doctor);
        assert_eq!(access, Access::Unauthorized);
        assert_eq!(access.redirect_target(), Some(UNAUTHORIZED_ROUTE));
    }

    #[test]
    fn test_matching_role_is_granted() {
        assert_eq!(check_access(&logged_in(Role::Doctor), Role::Doctor), Access::Granted);
    }
}
