use std::sync::Arc;

use facegate_core::{
    DeleteResponse, Embedding, EmbeddingStore, FaceError, IdentityService, RecognizeResponse,
    RegisterResponse,
};
use serde::Serialize;
use zbus::interface;

pub const BUS_NAME: &str = "org.facegate.Identity1";
pub const OBJECT_PATH: &str = "/org/facegate/Identity1";

/// Service as wired by the daemon: any store behind a shared handle.
pub type SharedService = Arc<IdentityService<Arc<dyn EmbeddingStore>>>;

/// D-Bus interface for the Facegate identity daemon.
///
/// Bus name: org.facegate.Identity1
/// Object path: /org/facegate/Identity1
///
/// Every method replies with a JSON document. Calls whose embedding has the
/// wrong width or non-finite values are rejected with `InvalidArgs`.
pub struct IdentityBus {
    service: SharedService,
}

impl IdentityBus {
    pub fn new(service: SharedService) -> Self {
        Self { service }
    }
}

#[interface(name = "org.facegate.Identity1")]
impl IdentityBus {
    /// Bind an embedding to an identity.
    async fn register(&self, identity_id: &str, embedding: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(identity_id, dim = embedding.len(), "register requested");
        register(&self.service, identity_id.to_string(), embedding).await
    }

    /// Resolve an embedding to a registered identity.
    async fn recognize(&self, embedding: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(dim = embedding.len(), "recognize requested");
        recognize(&self.service, embedding).await
    }

    /// Remove an identity's face.
    async fn delete(&self, identity_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(identity_id, "delete requested");
        delete(&self.service, identity_id.to_string()).await
    }

    /// Registered identity ids as a JSON array.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        list_identities(&self.service).await
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        status(&self.service).await
    }
}

pub async fn register(
    service: &SharedService,
    identity_id: String,
    embedding: Vec<f64>,
) -> zbus::fdo::Result<String> {
    let embedding = to_embedding(embedding);
    let result = run_blocking(service, move |svc| svc.register(&identity_id, &embedding)).await?;
    reply(RegisterResponse::from_result(result))
}

pub async fn recognize(service: &SharedService, embedding: Vec<f64>) -> zbus::fdo::Result<String> {
    let embedding = to_embedding(embedding);
    let result = run_blocking(service, move |svc| svc.recognize(&embedding)).await?;
    reply(RecognizeResponse::from_result(result))
}

pub async fn delete(service: &SharedService, identity_id: String) -> zbus::fdo::Result<String> {
    let result = run_blocking(service, move |svc| svc.delete(&identity_id)).await?;
    reply(DeleteResponse::from_result(result))
}

pub async fn list_identities(service: &SharedService) -> zbus::fdo::Result<String> {
    let ids = run_blocking(service, |svc| svc.identities())
        .await?
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
    to_json(&ids)
}

pub async fn status(service: &SharedService) -> zbus::fdo::Result<String> {
    let count = run_blocking(service, |svc| svc.count()).await?;
    let (identities, store) = match count {
        Ok(n) => (Some(n), "ok".to_string()),
        Err(e) => (None, e.to_string()),
    };
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "identities": identities,
        "store": store,
        "similarity_threshold": service.threshold(),
        "embedding_dim": service.dimension(),
    })
    .to_string())
}

/// Store calls block; keep them off the async executor. A dropped D-Bus
/// call leaves the blocking task to finish or roll back its own transaction.
async fn run_blocking<T, F>(service: &SharedService, f: F) -> zbus::fdo::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&IdentityService<Arc<dyn EmbeddingStore>>) -> T + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("worker task failed: {e}")))
}

fn to_embedding(values: Vec<f64>) -> Embedding {
    Embedding::new(values.into_iter().map(|v| v as f32).collect())
}

fn reply<T: Serialize>(response: Result<T, FaceError>) -> zbus::fdo::Result<String> {
    match response {
        Ok(body) => to_json(&body),
        Err(err) => {
            tracing::warn!(error = %err, "request rejected");
            Err(zbus::fdo::Error::InvalidArgs(err.to_string()))
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}
