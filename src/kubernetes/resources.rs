//! Objects applied to managed clusters.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use crate::ports::RoleSubject;

/// Label marking objects created by the lifecycle engine
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "cluster-lifecycle";

pub const LABEL_SET_GROUP: &str = "labels.lifecycle.io";
pub const LABEL_SET_VERSION: &str = "v1alpha1";
pub const LABEL_SET_KIND: &str = "NodePoolLabelSet";

fn managed_labels(extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = extra.clone();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels
}

pub fn namespace(name: &str, labels: &BTreeMap<String, String>) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(managed_labels(labels)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Binding name for a subject, safe as an object name
pub fn admin_binding_name(subject: &RoleSubject) -> String {
    let name: String = subject
        .name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect();
    format!(
        "lifecycle-admin-{}-{}",
        subject.kind.to_lowercase(),
        name.trim_matches('-')
    )
}

/// Bind a subject to the built-in cluster-admin role
pub fn cluster_admin_binding(subject: &RoleSubject) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(admin_binding_name(subject)),
            labels: Some(managed_labels(&BTreeMap::new())),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "cluster-admin".to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            kind: subject.kind.clone(),
            name: subject.name.clone(),
            ..Default::default()
        }]),
    }
}

pub fn label_set_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        LABEL_SET_GROUP,
        LABEL_SET_VERSION,
        LABEL_SET_KIND,
    ))
}

/// Desired labels of one node pool
pub fn node_pool_label_set(
    namespace: &str,
    pool: &str,
    labels: &BTreeMap<String, String>,
) -> DynamicObject {
    let mut object = DynamicObject::new(pool, &label_set_resource())
        .within(namespace)
        .data(json!({ "spec": { "labels": labels } }));
    object.metadata.labels = Some(managed_labels(&BTreeMap::new()));
    object
}

/// Merge patch adding labels to an object's metadata
pub fn label_patch(labels: &BTreeMap<String, String>) -> serde_json::Value {
    json!({ "metadata": { "labels": labels } })
}
