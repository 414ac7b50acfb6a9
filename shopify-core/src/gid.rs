//! Global identifiers of the form `scheme://namespace/<ResourceType>/<digits>`.
//!
//! ```
//! use shopify_core::gid::Gid;
//!
//! let gid: Gid = "gid://shopify/LineItem/42".parse().unwrap();
//! assert_eq!(gid.resource_type(), "LineItem");
//! assert_eq!(gid.id(), 42);
//! ```

use std::fmt;
use std::str::FromStr;

/// Error returned when a global identifier cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed gid `{gid}`: {reason}")]
pub struct Error {
    /// The rejected identifier.
    pub gid: String,
    /// What was wrong with it.
    pub reason: &'static str,
}

/// A parsed global identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gid {
    scheme: String,
    namespace: String,
    resource_type: String,
    id: u64,
}

impl Gid {
    /// Returns the URI scheme (usually `gid`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the namespace (usually `shopify`).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the resource type tag, e.g. `Product`.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the numeric id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl FromStr for Gid {
    type Err = Error;

    fn from_str(gid: &str) -> Result<Self, Self::Err> {
        let fail = |reason| Error {
            gid: gid.to_string(),
            reason,
        };

        let (scheme, rest) = gid.split_once("://").ok_or_else(|| fail("missing scheme"))?;
        if scheme.is_empty() {
            return Err(fail("missing scheme"));
        }

        let segments: Vec<&str> = rest.split('/').collect();
        let [namespace, resource_type, id] = segments.as_slice() else {
            return Err(fail("expected namespace/ResourceType/id"));
        };
        if namespace.is_empty() {
            return Err(fail("empty namespace"));
        }
        if resource_type.is_empty()
            || !resource_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(fail("invalid resource type"));
        }
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fail("id is not numeric"));
        }
        let id = id.parse().map_err(|_| fail("id out of range"))?;

        Ok(Self {
            scheme: scheme.to_string(),
            namespace: namespace.to_string(),
            resource_type: resource_type.to_string(),
            id,
        })
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            self.scheme, self.namespace, self.resource_type, self.id
        )
    }
}
