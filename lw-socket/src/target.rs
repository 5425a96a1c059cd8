//! Connection targets: where to connect and how the socket behaves.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use lw_core::error::{LwError, LwResult};

use crate::events::CloseInfo;
use crate::policy::ReconnectPolicy;

/// Computes a connection URL on demand.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Produce the URL to connect to. Called before every connection attempt.
    async fn resolve(&self) -> LwResult<String>;
}

/// Source of the connection URL.
#[derive(Clone)]
pub enum UrlSource {
    /// A fixed URL.
    Static(String),
    /// A URL computed asynchronously before each attempt.
    Resolver(Arc<dyn UrlResolver>),
}

impl UrlSource {
    /// Resolve the URL, rejecting empty results.
    pub async fn resolve(&self) -> LwResult<String> {
        let url = match self {
            Self::Static(url) => url.clone(),
            Self::Resolver(resolver) => resolver.resolve().await?,
        };
        if url.trim().is_empty() {
            return Err(LwError::Resolve("resolved an empty URL".into()));
        }
        Ok(url)
    }
}

impl fmt::Debug for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(url) => f.debug_tuple("Static").field(url).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Whether one socket serves one owner or fans out to many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// A private socket owned by a single handle.
    Exclusive,
    /// One socket per resolved URL, shared by every handle acquiring it.
    Shared,
}

/// Per-subscriber predicate over inbound text messages.
pub type MessageFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Owner veto over reconnecting after a given close.
pub type ReconnectPredicate = Arc<dyn Fn(&CloseInfo) -> bool + Send + Sync>;

/// Everything needed to acquire a connection handle.
#[derive(Clone)]
pub struct ConnectionTarget {
    /// URL or resolver.
    pub source: UrlSource,
    /// Exclusive or shared.
    pub mode: ShareMode,
    /// Subprotocols offered during the handshake.
    pub protocols: Vec<String>,
    /// Query parameters appended to the resolved URL.
    pub query_params: Vec<(String, String)>,
    /// Reconnect behavior. For shared sockets, the first acquirer's policy wins.
    pub policy: ReconnectPolicy,
    /// Inbound filter applied to this subscriber only.
    pub filter: Option<MessageFilter>,
    /// Optional veto over reconnecting.
    pub should_reconnect: Option<ReconnectPredicate>,
}

impl ConnectionTarget {
    /// Exclusive target for a fixed URL with the default policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_source(UrlSource::Static(url.into()))
    }

    /// Exclusive target whose URL is computed by `resolver`.
    pub fn resolver(resolver: Arc<dyn UrlResolver>) -> Self {
        Self::from_source(UrlSource::Resolver(resolver))
    }

    fn from_source(source: UrlSource) -> Self {
        Self {
            source,
            mode: ShareMode::Exclusive,
            protocols: Vec::new(),
            query_params: Vec::new(),
            policy: ReconnectPolicy::default(),
            filter: None,
            should_reconnect: None,
        }
    }

    /// Share the socket with every other handle on the same resolved URL.
    pub fn shared(mut self) -> Self {
        self.mode = ShareMode::Shared;
        self
    }

    /// Offer subprotocols during the handshake.
    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    /// Append a query parameter to the resolved URL.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Replace the reconnect policy.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Only deliver messages for which `filter` returns true.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Reconnect only when `predicate` approves the close.
    pub fn with_reconnect_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CloseInfo) -> bool + Send + Sync + 'static,
    {
        self.should_reconnect = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("protocols", &self.protocols)
            .field("query_params", &self.query_params)
            .field("policy", &self.policy)
            .field("filter", &self.filter.is_some())
            .field("should_reconnect", &self.should_reconnect.is_some())
            .finish()
    }
}

/// Append query parameters, keeping any query the URL already carries.
///
/// Keys and values are form-encoded. A URL that cannot be parsed is a
/// resolution error.
pub(crate) fn apply_query_params(url: &str, params: &[(String, String)]) -> LwResult<String> {
    if params.is_empty() {
        return Ok(url.to_string());
    }
    let mut parsed = Url::parse(url).map_err(|e| LwError::Resolve(format!("invalid socket URL {url:?}: {e}")))?;
    parsed
        .query_pairs_mut()
        .extend_pairs(params.iter().map(|(key, value)| (key.as_str(), value.as_str())));
    Ok(parsed.into())
}
