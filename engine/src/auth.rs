use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::EngineError;

/// Credential attribute that carries the caller's role.
pub const ROLE_ATTRIBUTE: &str = "role";

pub const DOCTOR_ORG: &str = "doctor-org";
pub const PHARMACIST_ORG: &str = "pharmacist-org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Pharmacist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Pharmacist => "pharmacist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Already-verified facts about the caller's credential.
pub trait IdentityContext {
    /// Unique identity string of the caller's credential.
    fn caller_id(&self) -> &str;
    fn caller_organization(&self) -> &str;
    fn caller_attribute(&self, name: &str) -> Option<&str>;
}

/// Plain-data [`IdentityContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: String,
    pub organization: String,
    pub attributes: HashMap<String, String>,
}

impl CallerIdentity {
    pub fn new(id: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            organization: organization.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_role(self, role: impl Into<String>) -> Self {
        self.with_attribute(ROLE_ATTRIBUTE, role)
    }
}

impl IdentityContext for CallerIdentity {
    fn caller_id(&self) -> &str {
        &self.id
    }

    fn caller_organization(&self) -> &str {
        &self.organization
    }

    fn caller_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Maps each recognised organisation to the one role its members may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGuard {
    organizations: HashMap<String, Role>,
}

impl AuthorizationGuard {
    /// A guard that recognises no organisation.
    pub fn empty() -> Self {
        Self {
            organizations: HashMap::new(),
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>, role: Role) -> Self {
        self.organizations.insert(organization.into(), role);
        self
    }

    pub fn resolve_role(
        &self,
        organization: &str,
        role_attribute: Option<&str>,
    ) -> Result<Role, EngineError> {
        let role_attribute = role_attribute.ok_or_else(|| {
            EngineError::Authorization("role attribute not found in caller credential".to_string())
        })?;

        let expected = self.organizations.get(organization).ok_or_else(|| {
            EngineError::Authorization(format!("unknown organization: {}", organization))
        })?;

        if role_attribute != expected.as_str() {
            return Err(EngineError::Authorization(format!(
                "invalid role '{}' for organization {}",
                role_attribute, organization
            )));
        }
        Ok(*expected)
    }

    pub fn resolve_caller(&self, identity: &impl IdentityContext) -> Result<Role, EngineError> {
        self.resolve_role(
            identity.caller_organization(),
            identity.caller_attribute(ROLE_ATTRIBUTE),
        )
    }
}

impl Default for AuthorizationGuard {
    fn default() -> Self {
        Self::empty()
            .with_organization(DOCTOR_ORG, Role::Doctor)
            .with_organization(PHARMACIST_ORG, Role::Pharmacist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_message(result: Result<Role, EngineError>) -> String {
        match result {
            Err(EngineError::Authorization(message)) => message,
            other => panic!("expected authorization error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolves_expected_roles() {
        let guard = AuthorizationGuard::default();
        assert_eq!(
            guard.resolve_role(DOCTOR_ORG, Some("doctor")).unwrap(),
            Role::Doctor
        );
        assert_eq!(
            guard.resolve_role(PHARMACIST_ORG, Some("pharmacist")).unwrap(),
            Role::Pharmacist
        );
    }

    #[test]
    fn test_role_mismatch_is_rejected() {
        let guard = AuthorizationGuard::default();
        let message = auth_message(guard.resolve_role(PHARMACIST_ORG, Some("doctor")));
        assert_eq!(message, "invalid role 'doctor' for organization pharmacist-org");
    }

    #[test]
    fn test_unknown_organization_is_rejected() {
        let guard = AuthorizationGuard::default();
        let message = auth_message(guard.resolve_role("Org3MSP", Some("doctor")));
        assert!(message.contains("Org3MSP"));
    }

    #[test]
    fn test_missing_role_attribute_is_rejected() {
        let guard = AuthorizationGuard::default();
        let caller = CallerIdentity::new("x509::CN=D1", DOCTOR_ORG);
        let message = auth_message(guard.resolve_caller(&caller));
        assert!(message.contains("role attribute"));
    }

    #[test]
    fn test_custom_organization_table() {
        let guard = AuthorizationGuard::empty().with_organization("Org1MSP", Role::Doctor);
        let caller = CallerIdentity::new("D1", "Org1MSP").with_role("doctor");
        assert_eq!(guard.resolve_caller(&caller).unwrap(), Role::Doctor);
        assert!(guard.resolve_role(DOCTOR_ORG, Some("doctor")).is_err());
    }
}
