use std::collections::BTreeMap;
use std::fmt;

/// A scalar attribute value. Attributes are intentionally restricted to
/// small scalars — the directory matches on them structurally, never on
/// arbitrary nested data.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{s}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Finite mapping from small string keys to scalar values.
pub type Attributes = BTreeMap<String, AttrValue>;

/// The lookup key a client or registrar matches endpoints against.
///
/// Value semantics: two descriptors are equal iff their name and attributes
/// are equal. `attributes` is the *query* side of the superset match
/// described in spec §4.3 — it is never itself a superset target.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub attributes: Attributes,
}

impl ServiceDescriptor {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(service_name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            service_name: service_name.into(),
            attributes,
        }
    }

    /// Key used to index caches: attributes participate in cache identity,
    /// but within a fixed descriptor they are stable, so cloning the whole
    /// descriptor as a map key is the simplest correct representation.
    pub fn cache_key(&self) -> (String, Vec<(String, String)>) {
        let attrs = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        (self.service_name.clone(), attrs)
    }
}

/// A discovered service instance. Identity within the directory is
/// `service_id`; `address`/`port`/`attributes` may be refreshed by a later
/// heart-beat without changing identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEndpoint {
    pub address: String,
    pub port: u16,
    pub service_id: String,
    pub service_name: String,
    pub attributes: Attributes,
}

impl ServiceEndpoint {
    /// A query descriptor's attributes are a subset-match against this
    /// endpoint's attributes; empty query attributes match on name alone.
    pub fn matches(&self, descriptor: &ServiceDescriptor) -> bool {
        if self.service_name != descriptor.service_name {
            return false;
        }
        descriptor
            .attributes
            .iter()
            .all(|(k, v)| self.attributes.get(k) == Some(v))
    }
}

/// Address of a candidate Registrar.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrarEndpoint {
    pub address: String,
    pub port: u16,
}

impl RegistrarEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for RegistrarEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(attrs: &[(&str, &str)]) -> ServiceEndpoint {
        ServiceEndpoint {
            address: "127.0.0.1".into(),
            port: 9000,
            service_id: "svc-1".into(),
            service_name: "store".into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), AttrValue::Str(v.to_string())))
                .collect(),
        }
    }

    #[test]
    fn empty_query_attributes_match_on_name_only() {
        let ep = endpoint(&[("region", "us")]);
        let query = ServiceDescriptor::new("store");
        assert!(ep.matches(&query));
    }

    #[test]
    fn query_attributes_must_be_subset() {
        let ep = endpoint(&[("region", "us")]);
        let mut attrs = Attributes::new();
        attrs.insert("region".into(), AttrValue::Str("eu".into()));
        let query = ServiceDescriptor::with_attributes("store", attrs);
        assert!(!ep.matches(&query));
    }

    #[test]
    fn mismatched_name_never_matches() {
        let ep = endpoint(&[]);
        let query = ServiceDescriptor::new("other");
        assert!(!ep.matches(&query));
    }
}
