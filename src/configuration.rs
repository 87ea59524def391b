use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::ParseIntError,
};

const DEFAULT_DATABASE_URL: &str = "surveyapp.db";
const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 5000;

#[derive(thiserror::Error, Debug)]
pub(crate) enum ConfigurationError {
    #[error("Error parsing HOST \"{value}\": {source}")]
    InvalidHost {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("Error parsing PORT \"{value}\": {source}")]
    InvalidPort {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Configuration {
    /// A local file path, `:memory:` or a `libsql://` URL for a remote database
    pub(crate) database_url: String,
    /// Only used for remote databases
    pub(crate) database_auth_token: String,
    pub(crate) address: SocketAddr,
}

impl Configuration {
    /// Reads the configuration from environment variables, falling back to the defaults
    pub(crate) fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());
        let database_auth_token = lookup("DATABASE_AUTH_TOKEN").unwrap_or_default();

        let host = match lookup("HOST") {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigurationError::InvalidHost { value, source })?,
            None => DEFAULT_HOST,
        };

        let port = match lookup("PORT") {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigurationError::InvalidPort { value, source })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            database_auth_token,
            address: SocketAddr::new(host, port),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn configuration(variables: &[(&str, &str)]) -> Result<Configuration, ConfigurationError> {
        let variables: HashMap<_, _> = variables.iter().copied().collect();
        Configuration::from_lookup(|name| variables.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn uses_defaults() {
        let configuration = configuration(&[]).unwrap();
        assert_eq!(configuration.database_url, "surveyapp.db");
        assert_eq!(configuration.database_auth_token, "");
        assert_eq!(configuration.address, "0.0.0.0:5000".parse().unwrap());
    }

    #[test]
    fn environment_overrides_defaults() {
        let configuration = configuration(&[
            ("DATABASE_URL", "libsql://surveys.turso.io"),
            ("DATABASE_AUTH_TOKEN", "token"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(configuration.database_url, "libsql://surveys.turso.io");
        assert_eq!(configuration.database_auth_token, "token");
        assert_eq!(configuration.address, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn rejects_invalid_port() {
        let error = configuration(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidPort { .. }));
    }
}
