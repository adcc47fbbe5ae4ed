use anyhow::Context;
use uuid::Uuid;

use crate::session::{AuthSession, Role};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_role: Role,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to the nonprofit's Postgres instance")?;

        let max_connections = match lookup("ONG_DB_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .with_context(|| format!("invalid ONG_DB_MAX_CONNECTIONS: {value}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let user_id = match lookup("ONG_USER_ID") {
            Some(value) => {
                Uuid::parse_str(&value).with_context(|| format!("invalid ONG_USER_ID: {value}"))?
            }
            None => Uuid::nil(),
        };

        let user_role = match lookup("ONG_USER_ROLE") {
            Some(value) => value.parse()?,
            None => Role::Admin,
        };

        Ok(Self {
            database_url,
            max_connections,
            user_id,
            user_email: lookup("ONG_USER_EMAIL").unwrap_or_default(),
            user_role,
        })
    }

    pub fn session(&self) -> AuthSession {
        AuthSession {
            user_id: self.user_id,
            email: self.user_email.clone(),
            role: self.user_role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://db")])).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.user_role, Role::Admin);
        assert_eq!(config.user_id, Uuid::nil());
        assert_eq!(config.session().display_name(), "Usuário");
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn session_reflects_configured_user() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("ONG_USER_EMAIL", "saude@amarsemlimites.org"),
            ("ONG_USER_ROLE", "health_professional"),
            ("ONG_DB_MAX_CONNECTIONS", "2"),
            ("ONG_USER_ID", "0b9c6f0e-8f1d-4c2a-9a3e-7d5b1c2e4f60"),
        ]))
        .unwrap();
        let session = config.session();
        assert_eq!(
            session.user_id.to_string(),
            "0b9c6f0e-8f1d-4c2a-9a3e-7d5b1c2e4f60"
        );
        assert_eq!(session.role, Role::HealthProfessional);
        assert_eq!(session.email, "saude@amarsemlimites.org");
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn bad_role_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("ONG_USER_ROLE", "root"),
        ]));
        assert!(result.is_err());
    }
}
