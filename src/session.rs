use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    SocialWorker,
    HealthProfessional,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::SocialWorker => "social_worker",
            Role::HealthProfessional => "health_professional",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "social_worker" => Ok(Role::SocialWorker),
            "health_professional" => Ok(Role::HealthProfessional),
            other => anyhow::bail!("unknown role: {other}"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed-in user, built once in `main` and handed to every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthSession {
    pub fn display_name(&self) -> &str {
        if self.email.is_empty() {
            "Usuário"
        } else {
            &self.email
        }
    }

    /// Students, courses and enrollments.
    pub fn can_manage_registry(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_write_attendance(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Teacher)
    }

    pub fn can_view_social(&self) -> bool {
        matches!(self.role, Role::Admin | Role::SocialWorker)
    }

    pub fn can_view_health(&self) -> bool {
        matches!(self.role, Role::Admin | Role::HealthProfessional)
    }

    pub fn require(&self, allowed: bool, area: &str) -> anyhow::Result<()> {
        if !allowed {
            anyhow::bail!("role {} cannot access {area}", self.role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role) -> AuthSession {
        AuthSession {
            user_id: Uuid::nil(),
            email: "equipe@amarsemlimites.org".to_string(),
            role,
        }
    }

    #[test]
    fn roles_gate_sensitive_areas() {
        assert!(session(Role::Admin).can_view_health());
        assert!(session(Role::HealthProfessional).can_view_health());
        assert!(!session(Role::Teacher).can_view_health());
        assert!(session(Role::Teacher).can_write_attendance());
        assert!(!session(Role::SocialWorker).can_write_attendance());
        assert!(session(Role::SocialWorker).can_view_social());
        assert!(session(Role::Admin).can_manage_registry());
        assert!(!session(Role::Teacher).can_manage_registry());
    }

    #[test]
    fn require_reports_the_role() {
        let teacher = session(Role::Teacher);
        let err = teacher
            .require(teacher.can_view_health(), "health records")
            .unwrap_err();
        assert_eq!(err.to_string(), "role teacher cannot access health records");
    }

    #[test]
    fn display_name_falls_back_when_email_missing() {
        let mut anonymous = session(Role::Admin);
        anonymous.email.clear();
        assert_eq!(anonymous.display_name(), "Usuário");
    }

    #[test]
    fn roles_round_trip_through_text() {
        assert_eq!("social_worker".parse::<Role>().unwrap(), Role::SocialWorker);
        assert!("guest".parse::<Role>().is_err());
    }
}
