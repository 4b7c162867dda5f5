//! Route resolution.
//!
//! Maps an incoming `(path, method)` pair to a configured fixture. Paths are
//! matched exactly; there are no patterns and no trailing-slash folding.
//! A path that is configured under other methods resolves to
//! [`Resolution::MethodNotAllowed`].

use crate::config::{ConfigError, Fixture};
use axum::http::Method;
use indexmap::IndexMap;
use std::fmt;

/// Normalized `(method, path)` identity of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: Method,
    pub path: String,
}

impl RouteKey {
    /// Parse a service key (`"/path"` or `"METHOD /path"`) together with the
    /// fixture's own `method` field.
    pub fn parse(key: &str, fixture: &Fixture) -> Result<Self, String> {
        let key = key.trim();
        let (key_method, path) = match key.split_once(char::is_whitespace) {
            Some((method, path)) => (Some(parse_method(method)?), path.trim()),
            None => (None, key),
        };
        let fixture_method = fixture.method.as_deref().map(parse_method).transpose()?;

        let method = match (key_method, fixture_method) {
            (Some(k), Some(f)) if k != f => {
                return Err(format!(
                    "method {} disagrees with route key method {}",
                    f, k
                ));
            }
            (Some(k), _) => k,
            (None, Some(f)) => f,
            (None, None) => Method::GET,
        };

        if method == Method::OPTIONS {
            return Err("OPTIONS is reserved for CORS preflight".to_string());
        }
        if !path.starts_with('/') {
            return Err(format!("path must start with '/': {}", path));
        }

        Ok(Self {
            method,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn parse_method(method: &str) -> Result<Method, String> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid method: {}", method))
}

/// Outcome of resolving a request against the table.
#[derive(Debug)]
pub enum Resolution<'a> {
    Found(&'a Fixture),
    NotFound,
    MethodNotAllowed { allowed: Vec<Method> },
}

/// Routing table built once from the configured services.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: IndexMap<String, IndexMap<Method, Fixture>>,
}

impl RouteTable {
    /// Build the table. Fails on malformed keys or duplicate routes.
    pub fn new(services: &IndexMap<String, Fixture>) -> Result<Self, ConfigError> {
        let mut routes: IndexMap<String, IndexMap<Method, Fixture>> = IndexMap::new();

        for (key, fixture) in services {
            let route = RouteKey::parse(key, fixture)
                .map_err(|e| ConfigError::invalid(format!("service '{}': {}", key, e)))?;
            let methods = routes.entry(route.path.clone()).or_default();
            if methods.contains_key(&route.method) {
                return Err(ConfigError::invalid(format!("duplicate route {}", route)));
            }
            methods.insert(route.method, fixture.clone());
        }

        Ok(Self { routes })
    }

    /// Resolve a request path and method.
    pub fn resolve(&self, path: &str, method: &Method) -> Resolution<'_> {
        match self.routes.get(path) {
            None => Resolution::NotFound,
            Some(methods) => match methods.get(method) {
                Some(fixture) => Resolution::Found(fixture),
                None => Resolution::MethodNotAllowed {
                    allowed: methods.keys().cloned().collect(),
                },
            },
        }
    }

    /// Number of configured fixtures.
    pub fn len(&self) -> usize {
        self.routes.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Fixtures in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Method, &Fixture)> {
        self.routes.iter().flat_map(|(path, methods)| {
            methods
                .iter()
                .map(move |(method, fixture)| (path.as_str(), method, fixture))
        })
    }
}
