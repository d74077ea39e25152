//! Controller settings from the cluster
//!
//! The ConfigMap supplies [`ControllerConfig`] and is watched for changes; the
//! Secret supplies provider credentials once at startup.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use greydns_core::{ControllerConfig, Credentials};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Read and validate the controller ConfigMap
pub async fn load_config(client: &Client, namespace: &str, name: &str) -> Result<ControllerConfig> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let configmap = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get ConfigMap {} in namespace {}", name, namespace))?;

    let data = configmap.data.unwrap_or_default();
    ControllerConfig::from_data(&data).with_context(|| format!("Invalid ConfigMap {}", name))
}

/// Read provider credentials from the Secret
pub async fn load_credentials(client: &Client, namespace: &str, name: &str) -> Result<Credentials> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get Secret {} in namespace {}", name, namespace))?;

    let data = secret
        .data
        .ok_or_else(|| anyhow!("Secret {} has no data", name))?;

    let mut credentials = Credentials::new();
    for (key, value) in data {
        let text = String::from_utf8(value.0)
            .map_err(|_| anyhow!("Secret {} key {} is not valid UTF-8", name, key))?;
        credentials.insert(key, text.trim().to_string());
    }
    Ok(credentials)
}

/// Apply a new ConfigMap payload to the live settings
///
/// Invalid payloads are logged and the previous settings stay in effect.
/// The provider is fixed for the life of the process. Returns whether the
/// live settings changed.
pub fn apply_config_update(tx: &watch::Sender<ControllerConfig>, data: &BTreeMap<String, String>) -> bool {
    let mut config = match ControllerConfig::from_data(data) {
        Ok(config) => config,
        Err(e) => {
            error!("Ignoring invalid configuration update, keeping previous settings: {}", e);
            return false;
        }
    };

    let running = tx.borrow().provider.clone();
    if config.provider != running {
        warn!(
            "Provider changed to {}; still using {} until the controller restarts",
            config.provider, running
        );
        config.provider = running;
    }

    tx.send_if_modified(|current| {
        if *current == config {
            return false;
        }
        info!(
            "Configuration reloaded: ttl={} type={} proxied={} refresh={}s destination={}",
            config.record_ttl,
            config.record_type,
            config.proxy_enabled,
            config.cache_refresh_seconds,
            config.ingress_destination
        );
        *current = config;
        true
    })
}

/// Watch the ConfigMap and push valid changes into `tx`
pub fn spawn_config_watch(
    client: Client,
    namespace: String,
    name: String,
    tx: watch::Sender<ControllerConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api: Api<ConfigMap> = Api::namespaced(client, &namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
        let mut stream = std::pin::pin!(watcher(api, config).default_backoff());

        debug!("Watching ConfigMap {}/{}", namespace, name);

        while let Some(item) = stream.next().await {
            match item {
                Ok(watcher::Event::Apply(cm)) | Ok(watcher::Event::InitApply(cm)) => {
                    apply_config_update(&tx, &cm.data.unwrap_or_default());
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!("ConfigMap {} was deleted, keeping current settings", name);
                }
                Ok(_) => {}
                Err(e) => warn!("ConfigMap watch error: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(ttl: &str) -> BTreeMap<String, String> {
        [
            ("record-ttl", ttl),
            ("record-type", "A"),
            ("proxy-enabled", "false"),
            ("cache-refresh-seconds", "60"),
            ("ingress-destination", "10.0.0.5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_valid_update_applies() {
        let initial = ControllerConfig::from_data(&data("60")).unwrap();
        let (tx, rx) = watch::channel(initial);

        assert!(apply_config_update(&tx, &data("300")));
        assert_eq!(rx.borrow().record_ttl, 300);
    }

    #[test]
    fn test_identical_update_is_not_a_change() {
        let initial = ControllerConfig::from_data(&data("60")).unwrap();
        let (tx, rx) = watch::channel(initial);

        assert!(!apply_config_update(&tx, &data("60")));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_provider_change_keeps_running_provider() {
        let initial = ControllerConfig::from_data(&data("60")).unwrap();
        let (tx, rx) = watch::channel(initial);

        let mut switched = data("300");
        switched.insert("provider".to_string(), "route53".to_string());

        assert!(apply_config_update(&tx, &switched));
        assert_eq!(rx.borrow().provider, "cloudflare");
        assert_eq!(rx.borrow().record_ttl, 300);

        // Same request again is not a change
        assert!(!apply_config_update(&tx, &switched));
    }

    #[test]
    fn test_invalid_update_keeps_previous() {
        let initial = ControllerConfig::from_data(&data("60")).unwrap();
        let (tx, rx) = watch::channel(initial);

        assert!(!apply_config_update(&tx, &data("not-a-number")));
        assert!(!apply_config_update(&tx, &BTreeMap::new()));
        assert_eq!(rx.borrow().record_ttl, 60);
    }
}
