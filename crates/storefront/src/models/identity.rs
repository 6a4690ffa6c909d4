//! Authenticated identity attached to a request.

use serde::{Deserialize, Serialize};

use tillpoint_core::{Role, UserId};

use crate::error::AppError;

/// Identity resolved from a bearer token by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    /// Ensure the user holds one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` if the user's role is not allowed.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden("access denied".to_owned()))
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_role() {
        let seller = CurrentUser {
            user_id: UserId::generate(),
            username: "mira".to_owned(),
            role: Role::Seller,
        };
        assert!(seller.require_role(&[Role::Admin, Role::Seller]).is_ok());
        assert!(matches!(
            seller.require_role(&[Role::Admin]),
            Err(AppError::Forbidden(_))
        ));
    }
}
