use serde::{Deserialize, Serialize};
use uuid::Uuid;
use academy_shared::Masked;

use crate::{CoreError, CoreResult};

/// Who is making the request, as established by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Masked<String>,
    pub is_admin: bool,
}

/// Turn an optional identity into an error for endpoints behind the auth wall.
pub fn require<'a>(identity: Option<&'a Identity>, message: &str) -> CoreResult<&'a Identity> {
    identity.ok_or_else(|| CoreError::IdentityError(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: Masked("a@b.c".to_string()),
            is_admin: false,
        };

        assert!(require(Some(&identity), "login").is_ok());
        match require(None, "You must login first") {
            Err(CoreError::IdentityError(msg)) => assert_eq!(msg, "You must login first"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
