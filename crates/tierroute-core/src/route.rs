//! Route keys and the per-request routing context
//!
//! A [`RouteKey`] names a logical upstream tier. The set of keys is closed at
//! configuration time: `primary`, `replica`, plus any custom tiers a deployment
//! wires up. Callers describe each request with a [`RouteContext`], which is
//! passed explicitly into the router instead of being read from ambient state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Logical identifier selecting an upstream tier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RouteKey {
    /// The writable primary ("master")
    Primary,
    /// The read replica used for fallback
    Replica,
    /// Any additional tier registered by name. Build it with
    /// [`RouteKey::custom`]; a hand-built `Custom("primary")` only matches
    /// [`RouteKey::Primary`] after [`RouteKey::normalized`], which the router
    /// applies to every key it is given.
    Custom(String),
}

impl RouteKey {
    pub fn as_str(&self) -> &str {
        match self {
            RouteKey::Primary => "primary",
            RouteKey::Replica => "replica",
            RouteKey::Custom(name) => name,
        }
    }

    /// Build a custom route key. Well-known names map to their dedicated variants.
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.to_ascii_lowercase().as_str() {
            "primary" => RouteKey::Primary,
            "replica" => RouteKey::Replica,
            _ => RouteKey::Custom(name),
        }
    }

    /// Map a `Custom` key spelling a well-known name onto its dedicated variant
    pub fn normalized(self) -> Self {
        match self {
            RouteKey::Custom(name) => RouteKey::custom(name),
            key => key,
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidRoute("route key must not be empty".to_string()));
        }
        Ok(RouteKey::custom(trimmed))
    }
}

impl TryFrom<String> for RouteKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RouteKey> for String {
    fn from(key: RouteKey) -> Self {
        key.as_str().to_string()
    }
}

/// Per-request routing inputs
pub trait RouteContext {
    /// Route the request asks for
    fn route_key(&self) -> RouteKey;

    /// Whether the router may serve this request from a fallback tier
    fn fallback_allowed(&self) -> bool;
}

/// Plain value implementation of [`RouteContext`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    route: RouteKey,
    fallback_allowed: bool,
}

impl RequestContext {
    pub fn new(route: RouteKey) -> Self {
        Self {
            route,
            fallback_allowed: true,
        }
    }

    pub fn primary() -> Self {
        Self::new(RouteKey::Primary)
    }

    pub fn replica() -> Self {
        Self::new(RouteKey::Replica)
    }

    /// Pin the request to its exact route (e.g. administrative connections)
    pub fn without_fallback(mut self) -> Self {
        self.fallback_allowed = false;
        self
    }

    pub fn with_fallback(mut self, allowed: bool) -> Self {
        self.fallback_allowed = allowed;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::primary()
    }
}

impl RouteContext for RequestContext {
    fn route_key(&self) -> RouteKey {
        self.route.clone()
    }

    fn fallback_allowed(&self) -> bool {
        self.fallback_allowed
    }
}
