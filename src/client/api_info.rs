//! Endpoint introspection: per-endpoint parameter/return schemas and
//! their human-readable rendering.
//!
//! Servers from 3.37 on expose an info route; older servers get a
//! reduced schema derived locally from the config component table. The
//! schemas are for discovery and help text only — call correctness never
//! depends on them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{from_reqwest, ClientError, ClientResult};
use crate::types::{ApiNameField, AppConfig};
use crate::utils::SKIP_COMPONENTS;

/// Structured call signatures for every endpoint, keyed by name (named
/// endpoints) or stringified index (unnamed endpoints).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiInfo {
    /// Endpoints addressable by `api_name`.
    #[serde(default)]
    pub named_endpoints: BTreeMap<String, EndpointInfo>,

    /// Endpoints addressable only by index.
    #[serde(default)]
    pub unnamed_endpoints: BTreeMap<String, EndpointInfo>,
}

/// Parameter and return schema of one endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// One entry per call argument, in order.
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,

    /// One entry per return value, in order.
    #[serde(default)]
    pub returns: Vec<ParameterInfo>,
}

/// Schema of one parameter or return value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Display label from the app.
    #[serde(default)]
    pub label: String,

    /// Value type and description.
    #[serde(rename = "python_type", default)]
    pub type_info: Option<TypeInfo>,

    /// Component type backing this value, e.g. `"Number"`.
    #[serde(default)]
    pub component: String,

    /// Example input value, when the server provides one.
    #[serde(default)]
    pub example_input: Option<Value>,
}

/// Type description for one value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Type expression, e.g. `"int | float"`.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Free-text description, e.g. `"numeric value"`.
    #[serde(default)]
    pub description: Option<String>,
}

/// Fetch the schemas from the server's info route.
pub(crate) async fn fetch_api_info(
    http: &reqwest::Client,
    api_info_url: &str,
) -> ClientResult<ApiInfo> {
    let response = http
        .get(api_info_url)
        .send()
        .await
        .map_err(|e| from_reqwest(e, "could not fetch api info"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidJson(format!("api info: {e}")))
}

/// Derive a reduced schema locally from the config component table, for
/// servers without an info route.
pub(crate) fn derive_api_info(config: &AppConfig) -> ApiInfo {
    let mut info = ApiInfo::default();

    for (fn_index, dependency) in config.dependencies.iter().enumerate() {
        if !dependency.backend_fn {
            continue;
        }
        let name = match &dependency.api_name {
            Some(ApiNameField::Name(name)) => Some(format!("/{name}")),
            Some(ApiNameField::Disabled(_)) => continue,
            None => None,
        };

        let describe = |ids: &[u64]| -> Vec<ParameterInfo> {
            ids.iter()
                .filter_map(|id| config.components.iter().find(|c| c.id == *id))
                .filter(|c| !SKIP_COMPONENTS.contains(&c.kind.as_str()))
                .map(|c| ParameterInfo {
                    label: c.kind.clone(),
                    type_info: None,
                    component: capitalize(&c.kind),
                    example_input: None,
                })
                .collect()
        };

        let endpoint = EndpointInfo {
            parameters: describe(&dependency.inputs),
            returns: describe(&dependency.outputs),
        };
        match name {
            Some(name) => {
                info.named_endpoints.insert(name, endpoint);
            }
            None => {
                info.unnamed_endpoints.insert(fn_index.to_string(), endpoint);
            }
        }
    }
    info
}

/// Render the full usage text: every named endpoint, then every unnamed
/// one.
pub(crate) fn render_api_info(info: &ApiInfo) -> String {
    let mut text = String::from("AppClient.predict() Usage Info\n------------------------------\n");
    text.push_str(&format!(
        "Named API endpoints: {}\n",
        info.named_endpoints.len()
    ));
    for (name, endpoint) in &info.named_endpoints {
        text.push_str(&render_endpoint(&format!("api_name=\"{name}\""), endpoint));
    }

    text.push_str(&format!(
        "\nUnnamed API endpoints: {}\n",
        info.unnamed_endpoints.len()
    ));
    for (index, endpoint) in &info.unnamed_endpoints {
        text.push_str(&render_endpoint(&format!("fn_index={index}"), endpoint));
    }
    text
}

/// Render one endpoint's signature and parameter/return listing.
fn render_endpoint(final_param: &str, endpoint: &EndpointInfo) -> String {
    let mut parameters = endpoint
        .parameters
        .iter()
        .map(|p| sanitize_parameter_name(&p.label))
        .collect::<Vec<_>>()
        .join(", ");
    if !parameters.is_empty() {
        parameters.push_str(", ");
    }

    let returns: Vec<String> = endpoint
        .returns
        .iter()
        .map(|r| sanitize_parameter_name(&r.label))
        .collect();
    let rendered_returns = if returns.len() > 1 {
        format!("({})", returns.join(", "))
    } else {
        returns.join(", ")
    };

    let mut text = format!("\n - predict({parameters}{final_param}) -> {rendered_returns}\n");

    text.push_str("    Parameters:\n");
    if endpoint.parameters.is_empty() {
        text.push_str("     - None\n");
    }
    for p in &endpoint.parameters {
        text.push_str(&render_value_line(p));
    }

    text.push_str("    Returns:\n");
    if endpoint.returns.is_empty() {
        text.push_str("     - None\n");
    }
    for r in &endpoint.returns {
        text.push_str(&render_value_line(r));
    }
    text
}

fn render_value_line(p: &ParameterInfo) -> String {
    let (kind, desc) = match &p.type_info {
        Some(t) => (
            t.kind.as_str(),
            t.description
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default(),
        ),
        None => ("", String::new()),
    };
    format!(
        "     - [{}] {}: {}{}\n",
        p.component,
        sanitize_parameter_name(&p.label),
        kind,
        desc
    )
}

/// Turn a display label into an identifier-ish parameter name.
fn sanitize_parameter_name(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
