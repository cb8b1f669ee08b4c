//! Kube-backed namespace store.

use crate::{Result, cluster::NamespaceStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams};
use kube::core::ResourceExt;

/// [`NamespaceStore`] implementation over the core v1 namespace API.
#[derive(Clone)]
pub struct KubeNamespaceStore {
    api: Api<Namespace>,
}

impl KubeNamespaceStore {
    /// Creates a store over the given Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NamespaceStore for KubeNamespaceStore {
    async fn list_names(&self) -> Result<Vec<String>> {
        let list = self.api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        self.api.list(&ListParams::default().limit(1)).await?;
        Ok(())
    }
}
