//! Kubeconfig generation for managed backends with exec-plugin authentication.

use std::collections::BTreeMap;

use serde_json::json;

use crate::controller::error::{Error, Result};

const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

/// Credential plugin invoked by clients to obtain a token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecPlugin {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub provide_cluster_info: bool,
}

impl ExecPlugin {
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            provide_cluster_info: false,
        }
    }
}

/// Inputs for a single-context kubeconfig
#[derive(Clone, Debug)]
pub struct KubeconfigTemplate<'a> {
    pub cluster_name: &'a str,
    pub endpoint: &'a str,
    /// Base64 encoded CA bundle
    pub certificate_authority: Option<&'a str>,
    pub user: &'a str,
    pub exec: ExecPlugin,
}

/// Render a kubeconfig as YAML
pub fn render(template: &KubeconfigTemplate<'_>) -> Result<Vec<u8>> {
    if template.endpoint.is_empty() {
        return Err(Error::PreconditionFailed(format!(
            "cluster {} has no API endpoint",
            template.cluster_name
        )));
    }

    let mut cluster = json!({ "server": template.endpoint });
    if let Some(ca) = template.certificate_authority {
        cluster["certificate-authority-data"] = json!(ca);
    }

    let env: Vec<_> = template
        .exec
        .env
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    let mut exec = json!({
        "apiVersion": EXEC_API_VERSION,
        "command": template.exec.command,
        "args": template.exec.args,
        "interactiveMode": "Never",
        "provideClusterInfo": template.exec.provide_cluster_info,
    });
    if !env.is_empty() {
        exec["env"] = json!(env);
    }

    let context = template.cluster_name;
    let config = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": template.cluster_name, "cluster": cluster }],
        "users": [{ "name": template.user, "user": { "exec": exec } }],
        "contexts": [{
            "name": context,
            "context": { "cluster": template.cluster_name, "user": template.user }
        }],
        "current-context": context,
    });

    serde_yaml::to_string(&config)
        .map(String::into_bytes)
        .map_err(|e| Error::internal(format!("failed to render kubeconfig: {e}")))
}
