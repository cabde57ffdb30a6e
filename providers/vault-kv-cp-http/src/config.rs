use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Environment prefix of the store secrets are copied from.
pub const SOURCE_PREFIX: &str = "SOURCE_";
/// Environment prefix of the store secrets are copied to.
pub const DESTINATION_PREFIX: &str = "DESTINATION_";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for one Vault server.
///
/// Read from `<prefix>VAULT_ADDR`, `<prefix>VAULT_TOKEN`, `<prefix>VAULT_CACERT`,
/// `<prefix>VAULT_NAMESPACE`, `<prefix>VAULT_CLIENT_TIMEOUT` and
/// `<prefix>VAULT_SKIP_VERIFY`. Empty values count as unset.
#[derive(Clone)]
pub struct VaultConfig {
    pub addr: Url,
    pub token: String,
    pub ca_cert: Option<PathBuf>,
    pub namespace: Option<String>,
    pub timeout: Duration,
    pub skip_verify: bool,
}

impl VaultConfig {
    pub fn new(addr: Url, token: impl Into<String>) -> Self {
        Self {
            addr,
            token: token.into(),
            ca_cert: None,
            namespace: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            skip_verify: false,
        }
    }

    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{prefix}{suffix}");
            let value = lookup(&name).filter(|value| !value.trim().is_empty());
            (name, value)
        };

        let (name, addr) = var("VAULT_ADDR");
        let addr = addr.with_context(|| format!("set {name} to the Vault server URL"))?;
        let addr = Url::parse(addr.trim())
            .with_context(|| format!("{name} is not a valid URL: {addr}"))?;
        if !matches!(addr.scheme(), "http" | "https") {
            bail!("{name} must be an http or https URL, got {addr}");
        }

        let (name, token) = var("VAULT_TOKEN");
        let token = token.with_context(|| format!("set {name} for Vault authentication"))?;

        let ca_cert = var("VAULT_CACERT").1.map(PathBuf::from);
        let namespace = var("VAULT_NAMESPACE").1;

        let (name, timeout) = var("VAULT_CLIENT_TIMEOUT");
        let timeout = match timeout {
            Some(value) => {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .with_context(|| {
                        format!("{name} must be a positive number of seconds, got {value}")
                    })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let skip_verify = var("VAULT_SKIP_VERIFY")
            .1
            .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false);

        Ok(Self {
            addr,
            token,
            ca_cert,
            namespace,
            timeout,
            skip_verify,
        })
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr.as_str())
            .field("token", &"<redacted>")
            .field("ca_cert", &self.ca_cert)
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("skip_verify", &self.skip_verify)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = VaultConfig::from_lookup(
            SOURCE_PREFIX,
            lookup(&[
                ("SOURCE_VAULT_ADDR", "https://vault.source:8200"),
                ("SOURCE_VAULT_TOKEN", "s.source"),
                ("SOURCE_VAULT_CACERT", "/etc/vault/ca.pem"),
                ("SOURCE_VAULT_NAMESPACE", "team-a"),
                ("SOURCE_VAULT_CLIENT_TIMEOUT", "5"),
                ("SOURCE_VAULT_SKIP_VERIFY", "true"),
                ("DESTINATION_VAULT_TOKEN", "s.destination"),
            ]),
        )
        .unwrap();

        assert_eq!(config.addr.as_str(), "https://vault.source:8200/");
        assert_eq!(config.token, "s.source");
        assert_eq!(config.ca_cert, Some(PathBuf::from("/etc/vault/ca.pem")));
        assert_eq!(config.namespace.as_deref(), Some("team-a"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.skip_verify);
    }

    #[test]
    fn optional_settings_default() {
        let config = VaultConfig::from_lookup(
            DESTINATION_PREFIX,
            lookup(&[
                ("DESTINATION_VAULT_ADDR", "http://127.0.0.1:8200"),
                ("DESTINATION_VAULT_TOKEN", "root"),
                ("DESTINATION_VAULT_CACERT", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.ca_cert, None);
        assert_eq!(config.namespace, None);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(!config.skip_verify);
    }

    #[test]
    fn missing_address_or_token_names_the_variable() {
        let err = VaultConfig::from_lookup(
            SOURCE_PREFIX,
            lookup(&[("SOURCE_VAULT_TOKEN", "root")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("SOURCE_VAULT_ADDR"), "{err:#}");

        let err = VaultConfig::from_lookup(
            DESTINATION_PREFIX,
            lookup(&[
                ("DESTINATION_VAULT_ADDR", "http://127.0.0.1:8200"),
                ("DESTINATION_VAULT_TOKEN", "   "),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("DESTINATION_VAULT_TOKEN"), "{err:#}");
    }

    #[test]
    fn rejects_invalid_address_and_timeout() {
        let err = VaultConfig::from_lookup(
            SOURCE_PREFIX,
            lookup(&[
                ("SOURCE_VAULT_ADDR", "vault.internal"),
                ("SOURCE_VAULT_TOKEN", "root"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a valid URL"), "{err:#}");

        let err = VaultConfig::from_lookup(
            SOURCE_PREFIX,
            lookup(&[
                ("SOURCE_VAULT_ADDR", "ftp://vault.internal"),
                ("SOURCE_VAULT_TOKEN", "root"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("http or https"), "{err:#}");

        let err = VaultConfig::from_lookup(
            SOURCE_PREFIX,
            lookup(&[
                ("SOURCE_VAULT_ADDR", "http://127.0.0.1:8200"),
                ("SOURCE_VAULT_TOKEN", "root"),
                ("SOURCE_VAULT_CLIENT_TIMEOUT", "0"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("SOURCE_VAULT_CLIENT_TIMEOUT"), "{err:#}");
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = VaultConfig::new(Url::parse("http://127.0.0.1:8200").unwrap(), "s.secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s.secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        unsafe {
            env::set_var("KVCP_TEST_VAULT_ADDR", "http://127.0.0.1:8200");
            env::set_var("KVCP_TEST_VAULT_TOKEN", "root");
            env::remove_var("KVCP_TEST_VAULT_NAMESPACE");
        }

        let config = VaultConfig::from_env("KVCP_TEST_").unwrap();

        assert_eq!(config.addr.as_str(), "http://127.0.0.1:8200/");
        assert_eq!(config.token, "root");
        assert_eq!(config.namespace, None);

        unsafe {
            env::remove_var("KVCP_TEST_VAULT_ADDR");
            env::remove_var("KVCP_TEST_VAULT_TOKEN");
        }
    }
}
