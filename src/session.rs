use std::collections::HashSet;

use crate::engine::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Faculty,
}

/// Who is acting. Passed explicitly to every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub email: String,
    pub role: Role,
}

impl SessionContext {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
        }
    }

    /// Resolve the role for an identity the identity provider already vouched for.
    pub fn resolve(email: &str, roles: &dyn RoleLookup) -> Self {
        Self::new(email, roles.role_of(email))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self, action: &'static str) -> Result<(), EngineError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(EngineError::Forbidden(action))
        }
    }
}

/// Role lookup capability, injected wherever a session is established.
pub trait RoleLookup: Send + Sync {
    fn role_of(&self, email: &str) -> Role;
}

/// Fixed administrator list; everyone else is faculty.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    admins: HashSet<String>,
}

impl StaticRoles {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            admins: admins
                .into_iter()
                .map(|a| a.as_ref().trim().to_ascii_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }
}

impl RoleLookup for StaticRoles {
    fn role_of(&self, email: &str) -> Role {
        if self.admins.contains(&email.trim().to_ascii_lowercase()) {
            Role::Admin
        } else {
            Role::Faculty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_roles_case_insensitive() {
        let roles = StaticRoles::new(["Admin@KSR.edu", " ", "dean@ksr.edu "]);
        assert_eq!(roles.role_of("admin@ksr.edu"), Role::Admin);
        assert_eq!(roles.role_of("DEAN@ksr.edu"), Role::Admin);
        assert_eq!(roles.role_of("faculty@ksr.edu"), Role::Faculty);
        assert_eq!(roles.role_of(""), Role::Faculty);
    }

    #[test]
    fn require_admin() {
        let roles = StaticRoles::new(["admin@ksr.edu"]);
        let admin = SessionContext::resolve("admin@ksr.edu", &roles);
        let faculty = SessionContext::resolve("f@ksr.edu", &roles);
        assert!(admin.require_admin("approve").is_ok());
        assert!(matches!(
            faculty.require_admin("approve"),
            Err(EngineError::Forbidden("approve"))
        ));
    }
}
