//! Kube-backed Helm release store.
//!
//! Helm v3 persists each release revision as a `Secret` of type
//! `helm.sh/release.v1`, labelled with the release name, owner, status, and
//! revision number. The payload under `data.release` is base64-wrapped,
//! gzip-compressed JSON. This driver lists those secrets directly instead of
//! shelling out to Helm, resolving the latest revision per `(namespace,
//! name)` pair and decoding only that one.
//!
//! Uninstall deletes the rendered manifest resources through the dynamic
//! API (reverse manifest order, the order Helm itself uninstalls in) and
//! then purges the release's revision secrets.

use crate::release::{Release, ReleaseStatus};
use crate::{Error, Result, cluster::ReleaseStore};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams};
use kube::core::GroupVersion;
use kube::discovery::{self, Scope};
use kube::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Secret type Helm v3 uses for release storage.
const RELEASE_SECRET_TYPE: &str = "helm.sh/release.v1";

/// Label selector matching all Helm release secrets.
const OWNER_SELECTOR: &str = "owner=helm";

/// Bound on a single uninstall operation.
const UNINSTALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Gzip stream magic bytes; Helm only compresses payloads above a size
/// threshold, so both forms occur in the wild.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decoded subset of a Helm release payload.
#[derive(Debug, Deserialize)]
struct ReleasePayload {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    info: PayloadInfo,
    #[serde(default)]
    manifest: String,
}

#[derive(Debug, Deserialize)]
struct PayloadInfo {
    last_deployed: DateTime<Utc>,
    status: ReleaseStatus,
}

/// [`ReleaseStore`] implementation backed by Helm release secrets.
#[derive(Clone)]
pub struct HelmSecretStore {
    client: Client,
}

impl HelmSecretStore {
    /// Creates a store over the given Kubernetes client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Picks the highest-revision secret for each `(namespace, name)` pair.
    fn latest_revisions(secrets: Vec<Secret>) -> Vec<Secret> {
        let mut latest: HashMap<(String, String), (u64, Secret)> = HashMap::new();

        for secret in secrets {
            if secret.type_.as_deref() != Some(RELEASE_SECRET_TYPE) {
                continue;
            }
            let Some(labels) = &secret.metadata.labels else {
                continue;
            };
            let (Some(name), Some(namespace)) =
                (labels.get("name").cloned(), secret.metadata.namespace.clone())
            else {
                continue;
            };
            let version = labels
                .get("version")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);

            match latest.entry((namespace, name)) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    if version > entry.get().0 {
                        entry.insert((version, secret));
                    }
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert((version, secret));
                }
            }
        }

        latest.into_values().map(|(_, secret)| secret).collect()
    }

    /// Decodes the release payload out of a release secret.
    fn decode_release(secret: &Secret) -> Result<Release> {
        let name = secret
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get("name"))
            .cloned()
            .unwrap_or_default();
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();

        let payload = Self::decode_payload(secret).map_err(|cause| Error::ReleaseDecode {
            name: name.clone(),
            namespace: namespace.clone(),
            cause,
        })?;

        Ok(Release {
            name: payload.name,
            namespace: payload.namespace.unwrap_or(namespace),
            last_deployed: payload.info.last_deployed,
            status: payload.info.status,
        })
    }

    fn decode_payload(secret: &Secret) -> std::result::Result<ReleasePayload, String> {
        let data = secret
            .data
            .as_ref()
            .and_then(|data| data.get("release"))
            .ok_or_else(|| "secret has no 'release' key".to_string())?;

        let raw = BASE64
            .decode(&data.0)
            .map_err(|e| format!("base64 decode failed: {e}"))?;

        let json = if raw.starts_with(&GZIP_MAGIC) {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut buf = Vec::new();
            decoder
                .read_to_end(&mut buf)
                .map_err(|e| format!("gzip decode failed: {e}"))?;
            buf
        } else {
            raw
        };

        serde_json::from_slice(&json).map_err(|e| format!("payload parse failed: {e}"))
    }

    /// Uninstall body, run under [`UNINSTALL_TIMEOUT`].
    async fn uninstall_inner(&self, name: &str, namespace: &str) -> Result<()> {
        let selector = format!("{OWNER_SELECTOR},name={name}");
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        let revisions = secrets
            .list(&ListParams::default().labels(&selector))
            .await?;
        let Some(latest) = Self::latest_revisions(revisions.items).into_iter().next() else {
            debug!(name, namespace, "no release secrets found, nothing to uninstall");
            return Ok(());
        };

        let payload = Self::decode_payload(&latest).map_err(|cause| Error::ReleaseDecode {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cause,
        })?;
        let mut first_err: Option<Error> = None;

        // Helm uninstalls in reverse install order.
        let docs: Vec<&str> = payload
            .manifest
            .split("\n---")
            .map(str::trim)
            .filter(|doc| !doc.is_empty())
            .collect();
        for doc in docs.iter().rev() {
            if let Err(e) = self.delete_manifest_resource(doc, namespace).await {
                warn!(
                    name,
                    namespace,
                    error = %e,
                    "failed to delete manifest resource"
                );
                first_err.get_or_insert(e);
            }
        }

        // Purge the release history even if some resources failed; the
        // remaining resources need manual attention either way.
        secrets
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(&selector),
            )
            .await?;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deletes a single rendered manifest document from the cluster.
    async fn delete_manifest_resource(&self, doc: &str, release_namespace: &str) -> Result<()> {
        let value: serde_json::Value = serde_yaml_ng::from_str(doc)
            .map_err(|e| Error::Config(format!("unparseable manifest document: {e}")))?;
        if value.is_null() {
            return Ok(());
        }

        let api_version = value
            .get("apiVersion")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let kind = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let resource_name = value
            .pointer("/metadata/name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if api_version.is_empty() || kind.is_empty() || resource_name.is_empty() {
            return Ok(());
        }
        let resource_namespace = value
            .pointer("/metadata/namespace")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(release_namespace);

        let gvk = GroupVersion::from_str(api_version)
            .map_err(|e| Error::Config(format!("invalid apiVersion '{api_version}': {e}")))?
            .with_kind(kind);
        let (resource, caps) = discovery::pinned_kind(&self.client, &gvk).await?;

        let api: Api<DynamicObject> = if caps.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), resource_namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        match api.delete(resource_name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(kind, name = resource_name, "deleted manifest resource");
                Ok(())
            }
            // Already gone is success for an uninstall.
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ReleaseStore for HelmSecretStore {
    async fn list_all(&self) -> Result<Vec<Release>> {
        let secrets: Api<Secret> = Api::all(self.client.clone());
        let list = secrets
            .list(&ListParams::default().labels(OWNER_SELECTOR))
            .await?;

        let mut releases = Vec::new();
        for secret in Self::latest_revisions(list.items) {
            match Self::decode_release(&secret) {
                Ok(release) => releases.push(release),
                // A corrupt payload is not a transport failure; skip the one
                // release rather than failing the whole listing.
                Err(e) => warn!(error = %e, "skipping undecodable release secret"),
            }
        }

        Ok(releases)
    }

    async fn namespace_has_releases(&self, namespace: &str) -> Result<bool> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let list = secrets
            .list(&ListParams::default().labels(OWNER_SELECTOR).limit(1))
            .await?;
        Ok(!list.items.is_empty())
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<()> {
        match tokio::time::timeout(UNINSTALL_TIMEOUT, self.uninstall_inner(name, namespace)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: format!("uninstall {namespace}/{name}"),
                seconds: UNINSTALL_TIMEOUT.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn release_json(name: &str, namespace: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "name": name,
            "namespace": namespace,
            "version": 3,
            "info": {
                "last_deployed": "2026-08-01T10:30:00Z",
                "status": status,
            },
            "manifest": "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n",
        }))
        .unwrap()
    }

    fn release_secret(name: &str, namespace: &str, version: u64, payload: &[u8]) -> Secret {
        let mut labels = BTreeMap::new();
        labels.insert("name".to_string(), name.to_string());
        labels.insert("owner".to_string(), "helm".to_string());
        labels.insert("version".to_string(), version.to_string());

        let mut data = BTreeMap::new();
        data.insert("release".to_string(), ByteString(BASE64.encode(payload).into_bytes()));

        Secret {
            metadata: kube::api::ObjectMeta {
                name: Some(format!("sh.helm.release.v1.{name}.v{version}")),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            data: Some(data),
            type_: Some(RELEASE_SECRET_TYPE.to_string()),
            ..Default::default()
        }
    }

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_release_plain_json() {
        let secret = release_secret("web", "feature-abc", 3, &release_json("web", "feature-abc", "deployed"));
        let release = HelmSecretStore::decode_release(&secret).unwrap();

        assert_eq!(release.name, "web");
        assert_eq!(release.namespace, "feature-abc");
        assert_eq!(release.status, ReleaseStatus::Deployed);
        assert_eq!(release.last_deployed.to_rfc3339(), "2026-08-01T10:30:00+00:00");
    }

    #[test]
    fn test_decode_release_gzipped() {
        let payload = gzip(&release_json("api", "staging", "failed"));
        let secret = release_secret("api", "staging", 1, &payload);
        let release = HelmSecretStore::decode_release(&secret).unwrap();

        assert_eq!(release.name, "api");
        assert_eq!(release.status, ReleaseStatus::Failed);
    }

    #[test]
    fn test_decode_release_rejects_garbage() {
        let secret = release_secret("web", "default", 1, b"not json at all");
        let err = HelmSecretStore::decode_release(&secret).unwrap_err();
        assert!(matches!(err, Error::ReleaseDecode { .. }));
    }

    #[test]
    fn test_latest_revisions_keeps_highest_version_per_release() {
        let secrets = vec![
            release_secret("web", "feature-abc", 1, &release_json("web", "feature-abc", "superseded")),
            release_secret("web", "feature-abc", 2, &release_json("web", "feature-abc", "deployed")),
            release_secret("api", "staging", 5, &release_json("api", "staging", "deployed")),
        ];

        let latest = HelmSecretStore::latest_revisions(secrets);
        assert_eq!(latest.len(), 2);

        let versions: Vec<&str> = latest
            .iter()
            .filter_map(|s| s.metadata.labels.as_ref())
            .filter(|l| l.get("name").map(String::as_str) == Some("web"))
            .filter_map(|l| l.get("version").map(String::as_str))
            .collect();
        assert_eq!(versions, vec!["2"]);
    }

    #[test]
    fn test_latest_revisions_ignores_foreign_secrets() {
        let mut foreign = release_secret("web", "default", 1, &release_json("web", "default", "deployed"));
        foreign.type_ = Some("Opaque".to_string());

        assert!(HelmSecretStore::latest_revisions(vec![foreign]).is_empty());
    }
}
