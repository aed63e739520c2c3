use std::env;

/// Connection settings for the joist database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
}

impl DbConfig {
    /// Fallback URL when neither the CLI nor the environment supplies one.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/joist";

    /// Build a config from an explicit URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Read `JOIST_DATABASE_URL`, or fall back to [`Self::DEFAULT_URL`].
    pub fn from_env() -> Self {
        match env::var("JOIST_DATABASE_URL") {
            Ok(url) => Self::new(url),
            Err(_) => Self::new(Self::DEFAULT_URL),
        }
    }

    /// The database name, i.e. the last path segment of the URL with any
    /// query string stripped. `None` when the URL has no path component.
    pub fn database_name(&self) -> Option<&str> {
        let tail = self.database_url.rsplit('/').next()?;
        let name = tail.split('?').next()?;
        if name.is_empty() { None } else { Some(name) }
    }

    /// Same server, but pointed at the `postgres` maintenance database.
    /// `CREATE DATABASE` has to be issued from there.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
