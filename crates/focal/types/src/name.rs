//! Structured object names and query patterns
//!
//! An [`ObjectName`] addresses a manageable object: a domain plus an ordered
//! list of unique `key=value` properties, written `domain:k1=v1,k2=v2`.
//! Two names are equal when their domains match and they carry the same
//! properties, regardless of the order the properties were written in.
//!
//! An [`ObjectNamePattern`] selects names: the domain may contain `*` and `?`
//! globs, and the property list may be `*` (any properties) or a list that
//! must be present, optionally followed by `,*` to allow extra properties.

use crate::error::{NamingError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Characters a concrete domain may not contain
const DOMAIN_RESERVED: &[char] = &[':', '*', '?', '\n'];

/// Characters a property key or value may not contain
const PROPERTY_RESERVED: &[char] = &[',', '=', ':', '*', '?', '"', '\n'];

/// Structured identifier of a manageable object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName {
    domain: String,
    properties: Vec<(String, String)>,
}

impl ObjectName {
    /// Build a name from a domain and its key properties.
    ///
    /// Properties keep the order they are given in; keys must be unique and
    /// at least one property is required.
    pub fn new<K, V>(
        domain: impl Into<String>,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let domain = domain.into();
        validate_domain(&domain)?;

        let mut props: Vec<(String, String)> = Vec::new();
        for (key, value) in properties {
            let (key, value) = (key.into(), value.into());
            validate_property(&domain, &key, &value)?;
            if props.iter().any(|(existing, _)| existing == &key) {
                return Err(NamingError::invalid_identifier(
                    &domain,
                    format!("duplicate key '{}'", key),
                ));
            }
            props.push((key, value));
        }

        if props.is_empty() {
            return Err(NamingError::invalid_identifier(
                &domain,
                "at least one key property is required",
            ));
        }

        Ok(Self {
            domain,
            properties: props,
        })
    }

    /// Parse `domain:key=value[,key=value...]`
    pub fn parse(name: &str) -> Result<Self> {
        let (domain, list) = name.split_once(':').ok_or_else(|| {
            NamingError::invalid_identifier(name, "missing ':' between domain and properties")
        })?;

        let mut properties = Vec::new();
        for pair in list.split(',') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                NamingError::invalid_identifier(
                    name,
                    format!("property '{}' is not key=value", pair),
                )
            })?;
            properties.push((key, value));
        }

        Self::new(domain, properties).map_err(|e| e.with_subject(name))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Properties in the order they were written
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// Look up one property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `k1=v1,k2=v2` in written order
    pub fn key_property_list(&self) -> String {
        self.properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Name with properties sorted by key; equal names share one canonical form
    pub fn canonical_name(&self) -> String {
        let list = self
            .sorted_properties()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}:{}", self.domain, list)
    }

    fn sorted_properties(&self) -> Vec<(&str, &str)> {
        let mut sorted: Vec<(&str, &str)> = self
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        sorted.sort_unstable();
        sorted
    }
}

impl PartialEq for ObjectName {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.sorted_properties() == other.sorted_properties()
    }
}

impl Eq for ObjectName {}

impl Hash for ObjectName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.domain.hash(state);
        self.sorted_properties().hash(state);
    }
}

impl PartialOrd for ObjectName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.domain
            .cmp(&other.domain)
            .then_with(|| self.sorted_properties().cmp(&other.sorted_properties()))
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.key_property_list())
    }
}

impl FromStr for ObjectName {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectName {
    type Error = NamingError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> Self {
        name.to_string()
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(NamingError::invalid_identifier(domain, "domain is empty"));
    }
    if let Some(c) = domain.chars().find(|c| DOMAIN_RESERVED.contains(c)) {
        return Err(NamingError::invalid_identifier(
            domain,
            format!("domain contains reserved character {:?}", c),
        ));
    }
    Ok(())
}

fn validate_property(domain: &str, key: &str, value: &str) -> Result<()> {
    if key.is_empty() {
        return Err(NamingError::invalid_identifier(domain, "empty property key"));
    }
    if value.is_empty() {
        return Err(NamingError::invalid_identifier(
            domain,
            format!("empty value for key '{}'", key),
        ));
    }
    for part in [key, value] {
        if let Some(c) = part.chars().find(|c| PROPERTY_RESERVED.contains(c)) {
            return Err(NamingError::invalid_identifier(
                domain,
                format!("property '{}' contains reserved character {:?}", part, c),
            ));
        }
    }
    Ok(())
}

/// Pattern used to query a registry for names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectNamePattern {
    domain: String,
    properties: Vec<(String, String)>,
    property_wildcard: bool,
}

impl ObjectNamePattern {
    /// Pattern matching every name (`*:*`)
    pub fn all() -> Self {
        Self::domain_glob("*")
    }

    /// Pattern matching any properties under a domain glob (`<glob>:*`)
    pub fn domain_glob(glob: impl Into<String>) -> Self {
        Self {
            domain: glob.into(),
            properties: Vec::new(),
            property_wildcard: true,
        }
    }

    /// Parse `<domain-glob>:*` or `<domain-glob>:k=v[,k=v...][,*]`
    pub fn parse(pattern: &str) -> Result<Self> {
        let (domain, list) = pattern.split_once(':').ok_or_else(|| {
            NamingError::invalid_pattern(pattern, "missing ':' between domain and properties")
        })?;

        if domain.is_empty() {
            return Err(NamingError::invalid_pattern(pattern, "domain is empty"));
        }
        if domain.contains('\n') {
            return Err(NamingError::invalid_pattern(pattern, "domain contains a newline"));
        }

        let mut properties = Vec::new();
        let mut property_wildcard = false;
        let parts: Vec<&str> = list.split(',').collect();
        for (index, part) in parts.iter().enumerate() {
            if *part == "*" {
                if index + 1 != parts.len() {
                    return Err(NamingError::invalid_pattern(
                        pattern,
                        "property wildcard must come last",
                    ));
                }
                property_wildcard = true;
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                NamingError::invalid_pattern(
                    pattern,
                    format!("property '{}' is not key=value", part),
                )
            })?;
            validate_property(domain, key, value).map_err(|e| {
                NamingError::invalid_pattern(pattern, e.to_string())
            })?;
            if properties.iter().any(|(k, _): &(String, String)| k == key) {
                return Err(NamingError::invalid_pattern(
                    pattern,
                    format!("duplicate key '{}'", key),
                ));
            }
            properties.push((key.to_string(), value.to_string()));
        }

        Ok(Self {
            domain: domain.to_string(),
            properties,
            property_wildcard,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Check whether a concrete name is selected by this pattern
    pub fn matches(&self, name: &ObjectName) -> bool {
        if !glob_match(&self.domain, name.domain()) {
            return false;
        }

        let required_present = self
            .properties
            .iter()
            .all(|(k, v)| name.property(k) == Some(v.as_str()));
        if !required_present {
            return false;
        }

        self.property_wildcard || name.properties().len() == self.properties.len()
    }
}

impl fmt::Display for ObjectNamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if self.property_wildcard {
            parts.push("*".to_string());
        }
        write!(f, "{}:{}", self.domain, parts.join(","))
    }
}

impl FromStr for ObjectNamePattern {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectNamePattern {
    type Error = NamingError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectNamePattern> for String {
    fn from(pattern: ObjectNamePattern) -> Self {
        pattern.to_string()
    }
}

/// Glob match supporting `*` (any run) and `?` (one character)
fn glob_match(glob: &str, text: &str) -> bool {
    let glob: Vec<char> = glob.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut g, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if g < glob.len() && (glob[g] == '?' || glob[g] == text[t]) {
            g += 1;
            t += 1;
        } else if g < glob.len() && glob[g] == '*' {
            backtrack = Some((g, t));
            g += 1;
        } else if let Some((star, matched)) = backtrack {
            g = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    glob[g..].iter().all(|c| *c == '*')
}
