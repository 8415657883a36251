//! Maps free-form resource attributes onto the store's value types.
//!
//! The store only holds text and 64-bit integers, and statements are built as
//! plain strings, so every key and value is checked here before it can reach a
//! query. Keys lose the characters the query syntax treats specially, text
//! containing a single quote is dropped, lists are flattened, floats truncated,
//! booleans rendered as text and the `label` map exploded into one attribute
//! per entry.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::error::EncodeError;
use crate::models::{PropertyValue, Resource, Scalar};

pub mod rbac;

pub use rbac::compute_rbac;

/// Attribute holding a flat key/value map that is exploded into `label_<key>`.
pub const LABEL_PROPERTY: &str = "label";

pub const UID_PROPERTY: &str = "_uid";
pub const HASH_PROPERTY: &str = "_hash";
pub const RBAC_PROPERTY: &str = "_rbac";
pub const CLUSTER_PROPERTY: &str = "cluster";
pub const KIND_PROPERTY: &str = "kind";

/// Escape tokens for characters the query syntax reserves in property keys.
const KEY_ESCAPES: [(char, &str); 3] = [('.', "_dot_"), ('/', "_slash_"), ('=', "_eq_")];

lazy_static::lazy_static! {
    static ref CLUSTER_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9_.\-]*[A-Za-z0-9])?$").unwrap();
}

/// Value representation the store understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreValue {
    Text(String),
    Int(i64),
}

impl StoreValue {
    /// Text form, as the store returns it when read back.
    pub fn as_text(&self) -> String {
        match self {
            StoreValue::Text(s) => s.clone(),
            StoreValue::Int(i) => i.to_string(),
        }
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Text(s) => f.write_str(s),
            StoreValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// A resource ready to be written: identity plus sanitized properties,
/// including the system attributes `_uid`, `_hash`, `_rbac`, `cluster`, `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedResource {
    pub uid: String,
    pub kind: String,
    pub properties: BTreeMap<String, StoreValue>,
}

/// Cluster identity used while encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    pub cluster: &'a str,
    pub hub_cluster: &'a str,
}

impl<'a> EncodeContext<'a> {
    pub fn new(cluster: &'a str, hub_cluster: &'a str) -> Self {
        Self {
            cluster,
            hub_cluster,
        }
    }
}

pub fn validate_cluster_name(cluster: &str) -> Result<(), EncodeError> {
    if CLUSTER_NAME.is_match(cluster) {
        Ok(())
    } else {
        Err(EncodeError::InvalidCluster(cluster.to_string()))
    }
}

/// Replace reserved key characters with their escape tokens.
pub fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for ch in key.chars() {
        match KEY_ESCAPES.iter().find(|(reserved, _)| *reserved == ch) {
            Some((_, token)) => escaped.push_str(token),
            None => escaped.push(ch),
        }
    }
    escaped
}

/// Keys are rendered back-quoted; anything that could close the quote or
/// break the statement is not representable.
fn is_representable_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| c == '`' || c == '\'' || c == '"' || c == '\\' || c.is_control())
}

/// Line breaks and tabs have literal escapes; any other control character
/// cannot be written back verbatim.
fn is_safe_text(value: &str) -> bool {
    !value.is_empty()
        && !value.contains('\'')
        && !value
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

/// Encode the attribute map of a resource. Pure; the `kind` attribute always
/// mirrors `resource.kind` in the output.
pub fn encode_properties(resource: &Resource) -> Result<BTreeMap<String, StoreValue>, EncodeError> {
    if resource.uid.is_empty() || resource.kind.is_empty() {
        return Err(EncodeError::MissingIdentity);
    }

    let mut encoded = BTreeMap::new();

    for (raw_key, value) in &resource.properties {
        let key = escape_key(raw_key);
        if !is_representable_key(&key) {
            warn!("Dropping property {:?} of {}: unsupported key", raw_key, resource.uid);
            continue;
        }

        match value {
            PropertyValue::Map(entries) if raw_key == LABEL_PROPERTY => {
                for (label_key, label_value) in entries {
                    let key = format!("{}_{}", LABEL_PROPERTY, escape_key(label_key));
                    if !is_representable_key(&key) || !is_safe_text(label_value) {
                        warn!("Dropping label {:?} of {}", label_key, resource.uid);
                        continue;
                    }
                    encoded.insert(key, StoreValue::Text(label_value.clone()));
                }
            }
            other => match encode_value(other) {
                Some(v) => {
                    encoded.insert(key, v);
                }
                None => warn!(
                    "Dropping property {:?} of {}: unsupported or unsafe value",
                    raw_key, resource.uid
                ),
            },
        }
    }

    if encoded.is_empty() {
        return Err(EncodeError::NoValidProperties {
            uid: resource.uid.clone(),
        });
    }

    encoded.insert(
        KIND_PROPERTY.to_string(),
        StoreValue::Text(resource.kind.clone()),
    );
    Ok(encoded)
}

fn encode_value(value: &PropertyValue) -> Option<StoreValue> {
    match value {
        PropertyValue::Text(s) if is_safe_text(s) => Some(StoreValue::Text(s.clone())),
        PropertyValue::Text(_) => None,
        PropertyValue::Int(i) => Some(StoreValue::Int(*i)),
        PropertyValue::Float(f) if f.is_finite() => Some(StoreValue::Int(f.trunc() as i64)),
        PropertyValue::Float(_) => None,
        PropertyValue::Bool(b) => Some(StoreValue::Text(b.to_string())),
        PropertyValue::List(items) => {
            let parts = items.iter().map(scalar_text).collect::<Option<Vec<_>>>()?;
            let joined = parts.join(", ");
            if is_safe_text(&joined) {
                Some(StoreValue::Text(joined))
            } else {
                None
            }
        }
        PropertyValue::Map(_) | PropertyValue::Other(_) => None,
    }
}

fn scalar_text(scalar: &Scalar) -> Option<String> {
    match scalar {
        Scalar::Bool(b) => Some(b.to_string()),
        Scalar::Int(i) => Some(i.to_string()),
        Scalar::Float(f) if f.is_finite() => Some((f.trunc() as i64).to_string()),
        Scalar::Float(_) => None,
        Scalar::Text(s) if s.contains('\'') => None,
        Scalar::Text(s) => Some(s.clone()),
    }
}

/// Encode a resource for writing to `ctx.cluster`, attaching the system
/// attributes. The access tag is recomputed on every call.
pub fn encode_resource(
    resource: &Resource,
    ctx: &EncodeContext<'_>,
) -> Result<EncodedResource, EncodeError> {
    validate_cluster_name(ctx.cluster)?;
    let mut properties = encode_properties(resource)?;

    properties.insert(
        UID_PROPERTY.to_string(),
        StoreValue::Text(resource.uid.clone()),
    );
    properties.insert(
        CLUSTER_PROPERTY.to_string(),
        StoreValue::Text(ctx.cluster.to_string()),
    );
    if !resource.hash.is_empty() {
        properties.insert(
            HASH_PROPERTY.to_string(),
            StoreValue::Text(resource.hash.clone()),
        );
    }
    properties.insert(
        RBAC_PROPERTY.to_string(),
        StoreValue::Text(compute_rbac(resource, ctx.cluster, ctx.hub_cluster)),
    );

    Ok(EncodedResource {
        uid: resource.uid.clone(),
        kind: resource.kind.clone(),
        properties,
    })
}
