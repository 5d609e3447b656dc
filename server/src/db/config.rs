use sqlx::postgres::{PgPool, PgPoolOptions};
use std::borrow::Cow;

/// PostgreSQL connection settings for the ledger tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig<'a> {
    /// Full connection URL. Takes precedence over the individual parts.
    pub url: Option<Cow<'a, str>>,
    pub host: Cow<'a, str>,
    pub port: u16,
    pub database: Cow<'a, str>,
    pub user: Cow<'a, str>,
    pub password: Cow<'a, str>,
    pub max_connections: u32,
}

impl<'a> DbConfig<'a> {
    pub fn new(
        host: impl Into<Cow<'a, str>>,
        port: u16,
        database: impl Into<Cow<'a, str>>,
        user: impl Into<Cow<'a, str>>,
        password: impl Into<Cow<'a, str>>,
    ) -> Self {
        Self {
            url: None,
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            max_connections: 5,
        }
    }

    pub fn with_url(mut self, url: impl Into<Cow<'a, str>>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// The configured URL as-is, or one built from the parts.
    pub fn connection_string(&self) -> Cow<'_, str> {
        match &self.url {
            Some(url) => Cow::Borrowed(url.as_ref()),
            None => Cow::Owned(format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.database
            )),
        }
    }

    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.connection_string())
            .await
    }
}

impl<'a> Default for DbConfig<'a> {
    fn default() -> Self {
        Self {
            url: None,
            host: Cow::Borrowed("localhost"),
            port: 5432,
            database: Cow::Borrowed("prescriptions"),
            user: Cow::Borrowed("postgres"),
            password: Cow::Borrowed("postgres"),
            max_connections: 5,
        }
    }
}
