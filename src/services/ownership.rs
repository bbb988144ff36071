//! Resource ownership gate
//!
//! The single access decision applied to every resource-scoped operation:
//! admins may touch anything, everyone else only what they own. Keeping
//! this in one place is the point; per-handler copies of the rule are how
//! enforcement drifts apart between endpoints.

use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::models::Role;
use crate::utils::error::AppError;

/// Allow iff the user is an admin or owns the resource.
///
/// Denial is surfaced as 400 "Not enough permissions" rather than 403.
/// That is the wire contract the existing frontend branches on, so it is
/// kept as-is.
pub fn authorize_owner(user: &CurrentUser, owner_id: Uuid) -> Result<(), AppError> {
    if user.role == Role::Admin || user.id == owner_id {
        Ok(())
    } else {
        Err(AppError::BadRequest("Not enough permissions".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn user(role: Role, id: Uuid) -> CurrentUser {
        CurrentUser {
            id,
            email: "user@example.com".to_string(),
            role,
            is_active: true,
        }
    }

    #[rstest]
    #[case(Role::Client, true, true)]
    #[case(Role::Client, false, false)]
    #[case(Role::Lawyer, true, true)]
    #[case(Role::Lawyer, false, false)]
    #[case(Role::Admin, true, true)]
    #[case(Role::Admin, false, true)]
    fn test_gate_over_role_owner_grid(
        #[case] role: Role,
        #[case] owns_resource: bool,
        #[case] expect_allowed: bool,
    ) {
        let id = Uuid::new_v4();
        let owner_id = if owns_resource { id } else { Uuid::new_v4() };

        let result = authorize_owner(&user(role, id), owner_id);
        assert_eq!(result.is_ok(), expect_allowed);
    }

    #[test]
    fn test_denial_is_bad_request() {
        let result = authorize_owner(&user(Role::Client, Uuid::new_v4()), Uuid::new_v4());
        match result {
            Err(AppError::BadRequest(detail)) => assert_eq!(detail, "Not enough permissions"),
            other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
        }
    }
}
