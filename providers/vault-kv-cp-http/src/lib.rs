//! HashiCorp Vault KV v2 store using the live Vault HTTP API.
//!
//! Listings come from `LIST <mount>/metadata/<path>`, reads from
//! `GET <mount>/data/<path>` and writes go to `POST <mount>/data/<path>`.
//! A 404 on list or read is the store's way of saying "nothing here" and is
//! reported as `None`; every other non-success status is a store error.

mod config;

pub use config::{DESTINATION_PREFIX, SOURCE_PREFIX, VaultConfig};

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::{Certificate, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tracing::debug;
use url::Url;
use vault_kv_cp_core::{
    KvStore, Listing, RelPath, Secret, SecretData, StoreError, StoreResult, WriteReceipt,
};

/// Build a store handle for the Vault server described by `config`.
///
/// Fails when the CA certificate cannot be read or parsed, or the HTTP client
/// cannot be constructed. No request is sent.
pub fn connect(config: &VaultConfig) -> Result<VaultKvStore> {
    let mut builder = Client::builder().use_rustls_tls().timeout(config.timeout);
    if let Some(path) = config.ca_cert.as_ref() {
        for cert in load_ca_certificates(path)? {
            builder = builder.add_root_certificate(cert);
        }
    }
    if config.skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    let client = builder
        .build()
        .context("failed to build Vault HTTP client")?;
    Ok(VaultKvStore {
        config: config.clone(),
        client,
    })
}

// A PEM bundle when the file holds certificate sections, otherwise one DER
// certificate. DER bytes are only validated when the client is built.
fn load_ca_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let ca = fs::read(path)
        .with_context(|| format!("failed to read CA certificate {}", path.display()))?;
    match Certificate::from_pem_bundle(&ca) {
        Ok(certs) if !certs.is_empty() => Ok(certs),
        _ => {
            let cert = Certificate::from_der(&ca)
                .with_context(|| format!("failed to parse CA certificate {}", path.display()))?;
            Ok(vec![cert])
        }
    }
}

/// Store handle bound to one Vault server.
#[derive(Clone, Debug)]
pub struct VaultKvStore {
    config: VaultConfig,
    client: Client,
}

impl VaultKvStore {
    fn api_url(&self, mount: &str, kind: &str, path: &RelPath) -> StoreResult<Url> {
        let mut url = self.config.addr.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::Transport(format!("{} cannot carry a path", self.config.addr))
            })?;
            segments.pop_if_empty().push("v1");
            segments.extend(mount.split('/').filter(|segment| !segment.is_empty()));
            segments.push(kind);
            segments.extend(path.segments());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, body: Option<Value>) -> StoreResult<Response> {
        debug!(%method, %url, "vault request");
        let mut builder = self
            .client
            .request(method, url)
            .header("X-Vault-Token", &self.config.token);
        if let Some(namespace) = &self.config.namespace {
            builder = builder.header("X-Vault-Namespace", namespace);
        }
        if let Some(payload) = body {
            builder = builder.json(&payload);
        }
        builder
            .send()
            .map_err(|err| StoreError::Transport(format!("vault request failed: {err}")))
    }
}

impl KvStore for VaultKvStore {
    fn list(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Listing>> {
        let url = self.api_url(mount, "metadata", path)?;
        let method = Method::from_bytes(b"LIST")
            .map_err(|err| StoreError::Transport(format!("LIST method unavailable: {err}")))?;
        let response = self.request(method, url, None)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = read_body(response)?;
                let parsed: Value = decode(&body, "key list")?;
                let data = match parsed {
                    Value::Object(mut object) => object.remove("data").unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                Ok(Some(Listing::new(data)))
            }
            status => Err(status_error(status, response)),
        }
    }

    fn get_latest(&self, mount: &str, path: &RelPath) -> StoreResult<Option<Secret>> {
        let url = self.api_url(mount, "data", path)?;
        let response = self.request(Method::GET, url, None)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = read_body(response)?;
                let parsed: KvReadResponse = decode(&body, "read response")?;
                let Some(envelope) = parsed.data else {
                    return Ok(None);
                };
                let Some(data) = envelope.data else {
                    return Ok(None);
                };
                let secret = Secret::new(data);
                Ok(Some(match envelope.metadata {
                    Some(metadata) => secret.with_version(metadata.version),
                    None => secret,
                }))
            }
            status => Err(status_error(status, response)),
        }
    }

    fn put(
        &self,
        mount: &str,
        path: &RelPath,
        data: &SecretData,
    ) -> StoreResult<Option<WriteReceipt>> {
        let url = self.api_url(mount, "data", path)?;
        let response = self.request(Method::POST, url, Some(json!({ "data": data })))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response));
        }
        let body = read_body(response)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let parsed: KvWriteResponse = decode(&body, "write response")?;
        Ok(parsed.data.map(|metadata| WriteReceipt {
            version: metadata.version,
        }))
    }
}

fn read_body(response: Response) -> StoreResult<String> {
    response
        .text()
        .map_err(|err| StoreError::Transport(format!("failed to read vault response: {err}")))
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> StoreResult<T> {
    serde_json::from_str(body).map_err(|err| {
        StoreError::Decode(format!("failed to decode vault {what}: {err}; body={body}"))
    })
}

fn status_error(status: StatusCode, response: Response) -> StoreError {
    StoreError::Status {
        status: status.as_u16(),
        body: response.text().unwrap_or_default(),
    }
}

#[derive(Deserialize)]
struct KvReadResponse {
    #[serde(default)]
    data: Option<KvDataEnvelope>,
}

#[derive(Deserialize)]
struct KvDataEnvelope {
    #[serde(default)]
    data: Option<SecretData>,
    #[serde(default)]
    metadata: Option<VersionMetadata>,
}

#[derive(Deserialize)]
struct KvWriteResponse {
    #[serde(default)]
    data: Option<VersionMetadata>,
}

#[derive(Deserialize)]
struct VersionMetadata {
    version: u64,
}
