use crate::models::{PropertyValue, Resource};

const MISSING: &str = "null";

/// Access tag `namespace_apigroup_kind` attached to every stored node.
///
/// Resources reported by the hub cluster are scoped by their own namespace.
/// Resources from a managed cluster are scoped by that cluster's namespace on
/// the hub, which carries the cluster's name.
pub fn compute_rbac(resource: &Resource, cluster: &str, hub_cluster: &str) -> String {
    let namespace = if cluster == hub_cluster {
        text_property(resource, "namespace")
    } else if cluster.is_empty() {
        None
    } else {
        Some(cluster)
    };
    let apigroup = text_property(resource, "apigroup");
    let kind = if resource.kind.is_empty() {
        None
    } else {
        Some(resource.kind.as_str())
    };

    format!(
        "{}_{}_{}",
        namespace.unwrap_or(MISSING),
        apigroup.unwrap_or(MISSING),
        kind.unwrap_or(MISSING)
    )
}

fn text_property<'a>(resource: &'a Resource, key: &str) -> Option<&'a str> {
    match resource.properties.get(key) {
        Some(PropertyValue::Text(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}
