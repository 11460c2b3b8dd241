//! Reverse DNS lookups for client hostnames
//!
//! Lookups run as tasks on the tokio runtime so the event loop never waits on
//! DNS. Finished lookups are queued on a channel and collected by the loop on
//! a later tick; until then a client is shown by its IP address.

use crate::client::ClientId;
use crate::config::LookupConfig;
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Source of reverse lookups
#[async_trait]
pub trait HostLookup: Send + Sync {
    /// Hostname for `ip`, or `None` if it has none
    async fn reverse_lookup(&self, ip: IpAddr) -> Option<String>;
}

/// System resolver backed lookup
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Create a resolver from the system configuration
    pub fn from_system_conf() -> crate::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| crate::Error::Config(format!("Failed to create DNS resolver: {}", e)))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl HostLookup for DnsResolver {
    async fn reverse_lookup(&self, ip: IpAddr) -> Option<String> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(names) => names
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .filter(|name| !name.is_empty()),
            Err(e) => {
                tracing::debug!(%ip, "Reverse lookup failed: {}", e);
                None
            }
        }
    }
}

/// Resolved hostnames keyed by IP address
#[derive(Debug)]
pub struct HostnameCache {
    entries: HashMap<IpAddr, (String, Instant)>,
    ttl: Duration,
}

impl HostnameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Cached hostname for `ip` if it has not expired at `now`
    pub fn get(&self, ip: &IpAddr, now: Instant) -> Option<&str> {
        self.entries
            .get(ip)
            .filter(|(_, stored)| now.saturating_duration_since(*stored) < self.ttl)
            .map(|(hostname, _)| hostname.as_str())
    }

    pub fn insert(&mut self, ip: IpAddr, hostname: String, now: Instant) {
        self.entries.insert(ip, (hostname, now));
    }

    /// Drop entries that expired at `now`
    pub fn purge(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, stored)| now.saturating_duration_since(*stored) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A finished lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: ClientId,
    pub hostname: Option<String>,
}

/// Starts lookups for new clients and hands back their results
pub struct HostResolver {
    lookup: Option<Arc<dyn HostLookup>>,
    cache: HostnameCache,
    timeout: Duration,
    sender: mpsc::UnboundedSender<Resolved>,
    receiver: mpsc::UnboundedReceiver<Resolved>,
}

impl HostResolver {
    /// Build from configuration, using the system resolver when enabled.
    /// A resolver that cannot be created disables lookups.
    pub fn from_config(config: &LookupConfig) -> Self {
        let lookup: Option<Arc<dyn HostLookup>> = if config.reverse_dns {
            match DnsResolver::from_system_conf() {
                Ok(resolver) => Some(Arc::new(resolver)),
                Err(e) => {
                    tracing::warn!("Reverse DNS disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self::new(lookup, config)
    }

    pub fn new(lookup: Option<Arc<dyn HostLookup>>, config: &LookupConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            lookup,
            cache: HostnameCache::new(config.cache_ttl()),
            timeout: config.timeout(),
            sender,
            receiver,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lookup.is_some()
    }

    pub fn cache(&self) -> &HostnameCache {
        &self.cache
    }

    /// Begin resolving a client's address. A cached hostname is returned
    /// straight away; otherwise a lookup task is spawned and its result shows
    /// up in [`HostResolver::completed`].
    pub fn request(&mut self, id: ClientId, now: Instant) -> Option<String> {
        let lookup = self.lookup.as_ref()?;
        let ip = id.ip();

        if let Some(hostname) = self.cache.get(&ip, now) {
            return Some(hostname.to_string());
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(peer = %id, "No runtime for reverse lookup");
            return None;
        };

        let lookup = Arc::clone(lookup);
        let sender = self.sender.clone();
        let timeout = self.timeout;
        runtime.spawn(async move {
            let hostname = tokio::time::timeout(timeout, lookup.reverse_lookup(ip))
                .await
                .unwrap_or_else(|_| {
                    tracing::debug!(%ip, "Reverse lookup timed out");
                    None
                });
            let _ = sender.send(Resolved { id, hostname });
        });
        None
    }

    /// Lookups finished since the last call. Hostnames are cached by IP.
    pub fn completed(&mut self, now: Instant) -> Vec<Resolved> {
        let mut done = Vec::new();
        while let Ok(resolved) = self.receiver.try_recv() {
            if let Some(hostname) = &resolved.hostname {
                self.cache.insert(resolved.id.ip(), hostname.clone(), now);
            }
            done.push(resolved);
        }
        if !done.is_empty() {
            self.cache.purge(now);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticLookup {
        hostname: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HostLookup for StaticLookup {
        async fn reverse_lookup(&self, _ip: IpAddr) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hostname.map(str::to_string)
        }
    }

    fn client_id(addr: &str) -> ClientId {
        ClientId::new(addr.parse().unwrap())
    }

    async fn wait_for(resolver: &mut HostResolver) -> Vec<Resolved> {
        for _ in 0..100 {
            let done = resolver.completed(Instant::now());
            if !done.is_empty() {
                return done;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("lookup never completed");
    }

    #[test]
    fn test_cache_expiry() {
        let mut cache = HostnameCache::new(Duration::from_secs(300));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();

        cache.insert(ip, "host.example.net".to_string(), now);
        assert_eq!(cache.get(&ip, now + Duration::from_secs(299)), Some("host.example.net"));
        assert_eq!(cache.get(&ip, now + Duration::from_secs(300)), None);

        cache.purge(now + Duration::from_secs(301));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_resolver_never_resolves() {
        let config = LookupConfig {
            reverse_dns: false,
            ..LookupConfig::default()
        };
        let mut resolver = HostResolver::from_config(&config);
        assert!(!resolver.is_enabled());
        assert_eq!(resolver.request(client_id("10.0.0.1:1"), Instant::now()), None);
        assert!(resolver.completed(Instant::now()).is_empty());
    }

    #[tokio::test]
    async fn test_lookup_result_is_cached_per_ip() {
        let lookup = Arc::new(StaticLookup {
            hostname: Some("host.example.net"),
            calls: AtomicUsize::new(0),
        });
        let mut resolver = HostResolver::new(Some(lookup.clone()), &LookupConfig::default());
        let first = client_id("10.0.0.1:1000");

        assert_eq!(resolver.request(first, Instant::now()), None);
        let done = wait_for(&mut resolver).await;
        assert_eq!(
            done,
            vec![Resolved {
                id: first,
                hostname: Some("host.example.net".to_string()),
            }]
        );

        // Same address, different port: answered from the cache
        let second = client_id("10.0.0.1:2000");
        assert_eq!(
            resolver.request(second, Instant::now()).as_deref(),
            Some("host.example.net")
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let lookup = Arc::new(StaticLookup {
            hostname: None,
            calls: AtomicUsize::new(0),
        });
        let mut resolver = HostResolver::new(Some(lookup), &LookupConfig::default());
        let id = client_id("10.0.0.2:1000");

        resolver.request(id, Instant::now());
        let done = wait_for(&mut resolver).await;
        assert_eq!(done, vec![Resolved { id, hostname: None }]);
        assert!(resolver.cache().is_empty());
    }
}
