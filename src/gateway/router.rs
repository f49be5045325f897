//! Aggregation router
//!
//! Merges backend catalogs into one annotated catalog and routes each
//! invoke back to the backend that owns the name. The ownership indices
//! are rebuilt from scratch on every list call; an invoke resolves against
//! the most recent completed listing only, with no auto-refresh. A name
//! that was never listed is unresolvable by design.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::backend::ConnectedBackend;
use crate::error::CapabilityKind;
use crate::protocol::{
    JsonRpcResponse, Prompt, PromptsGetParams, PromptsListParams, PromptsListResult, Resource,
    ResourceTemplate, ResourcesListParams, ResourcesListResult, ResourcesReadParams,
    ResourcesTemplatesListParams, ResourcesTemplatesListResult, Tool, ToolsCallParams,
    ToolsListParams, ToolsListResult,
};
use crate::{Error, Result};

/// Ownership index: capability name/URI to owning backend
type OwnershipIndex = RwLock<HashMap<String, Arc<ConnectedBackend>>>;

/// Aggregation router over a fixed set of connected backends
pub struct Router {
    /// Connected backends, in descriptor order
    backends: Vec<Arc<ConnectedBackend>>,
    /// Tool name to owning backend
    tools: OwnershipIndex,
    /// Prompt name to owning backend
    prompts: OwnershipIndex,
    /// Resource URI to owning backend
    resources: OwnershipIndex,
}

impl Router {
    /// Create a router over the given backends
    #[must_use]
    pub fn new(backends: Vec<Arc<ConnectedBackend>>) -> Self {
        Self {
            backends,
            tools: RwLock::new(HashMap::new()),
            prompts: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Backends this router aggregates, in descriptor order
    #[must_use]
    pub fn backends(&self) -> &[Arc<ConnectedBackend>] {
        &self.backends
    }

    // ========================================================================
    // List operations
    // ========================================================================

    /// List tools across all backends.
    ///
    /// Rebuilds the tool ownership index. Per-backend allowlists filter a
    /// backend's tools before merging, so a filtered tool is neither listed
    /// nor routable. Descriptions are annotated with the owning backend.
    pub async fn list_tools(&self, params: ToolsListParams) -> ToolsListResult {
        self.tools.write().clear();

        let mut all_tools = Vec::new();

        for backend in &self.backends {
            let forward = ToolsListParams {
                cursor: None,
                meta: params.meta.clone(),
            };

            let mut tools: Vec<Tool> =
                match list_from(backend, "tools/list", &forward, |r: ToolsListResult| r.tools)
                    .await
                {
                    Some(tools) => tools,
                    None => continue,
                };

            if let Some(allowed) = &backend.allowed_tools {
                let total = tools.len();
                tools.retain(|tool| allowed.contains(&tool.name));
                debug!(
                    backend = %backend.name,
                    exposed = tools.len(),
                    total,
                    "Filtered tools by allowlist"
                );
            }

            let mut index = self.tools.write();
            for tool in tools {
                index.insert(tool.name.clone(), Arc::clone(backend));
                let description = Some(annotate(&backend.name, tool.description.as_deref()));
                all_tools.push(Tool {
                    description,
                    ..tool
                });
            }
        }

        ToolsListResult {
            tools: all_tools,
            next_cursor: None,
        }
    }

    /// List prompts across all backends, rebuilding the prompt index
    pub async fn list_prompts(&self, params: PromptsListParams) -> PromptsListResult {
        self.prompts.write().clear();

        let mut all_prompts = Vec::new();

        for backend in &self.backends {
            let forward = PromptsListParams {
                cursor: params.cursor.clone(),
                meta: params.meta.clone(),
            };

            let prompts: Vec<Prompt> = match list_from(backend, "prompts/list", &forward, |r: PromptsListResult| {
                r.prompts
            })
            .await
            {
                Some(prompts) => prompts,
                None => continue,
            };

            let mut index = self.prompts.write();
            for prompt in prompts {
                index.insert(prompt.name.clone(), Arc::clone(backend));
                let description = Some(annotate(&backend.name, prompt.description.as_deref()));
                all_prompts.push(Prompt {
                    description,
                    ..prompt
                });
            }
        }

        PromptsListResult {
            prompts: all_prompts,
            next_cursor: params.cursor,
        }
    }

    /// List resources across all backends, rebuilding the resource index.
    ///
    /// Resources are annotated on their name rather than their description.
    pub async fn list_resources(&self, params: ResourcesListParams) -> ResourcesListResult {
        self.resources.write().clear();

        let mut all_resources = Vec::new();

        for backend in &self.backends {
            let forward = ResourcesListParams {
                cursor: params.cursor.clone(),
                meta: params.meta.clone(),
            };

            let resources: Vec<Resource> =
                match list_from(backend, "resources/list", &forward, |r: ResourcesListResult| {
                    r.resources
                })
                .await
                {
                    Some(resources) => resources,
                    None => continue,
                };

            let mut index = self.resources.write();
            for resource in resources {
                index.insert(resource.uri.clone(), Arc::clone(backend));
                let name = annotate(&backend.name, Some(&resource.name));
                all_resources.push(Resource { name, ..resource });
            }
        }

        ResourcesListResult {
            resources: all_resources,
            next_cursor: None,
        }
    }

    /// List resource templates across all backends.
    ///
    /// Templates are annotated but never indexed; no invoke operation
    /// targets a template.
    pub async fn list_resource_templates(
        &self,
        params: ResourcesTemplatesListParams,
    ) -> ResourcesTemplatesListResult {
        let mut all_templates = Vec::new();

        for backend in &self.backends {
            let forward = ResourcesTemplatesListParams {
                cursor: params.cursor.clone(),
                meta: params.meta.clone(),
            };

            let templates: Vec<ResourceTemplate> = match list_from(
                backend,
                "resources/templates/list",
                &forward,
                |r: ResourcesTemplatesListResult| r.resource_templates,
            )
            .await
            {
                Some(templates) => templates,
                None => continue,
            };

            for template in templates {
                let name = annotate(&backend.name, Some(&template.name));
                let description = template
                    .description
                    .as_deref()
                    .map(|description| annotate(&backend.name, Some(description)));
                all_templates.push(ResourceTemplate {
                    name,
                    description,
                    ..template
                });
            }
        }

        ResourcesTemplatesListResult {
            resource_templates: all_templates,
            next_cursor: params.cursor,
        }
    }

    // ========================================================================
    // Invoke operations
    // ========================================================================

    /// Call a tool on the backend that owns it.
    ///
    /// Fails with `CapabilityNotFound` when the name is absent from the
    /// current index; backend failures propagate unchanged.
    pub async fn call_tool(&self, params: ToolsCallParams) -> Result<Value> {
        let backend = self.resolve(&self.tools, CapabilityKind::Tool, &params.name)?;

        debug!(backend = %backend.name, tool = %params.name, "Forwarding tool call");

        let forward = ToolsCallParams {
            name: params.name.clone(),
            arguments: Some(params.arguments.unwrap_or_else(|| json!({}))),
            meta: params.meta,
        };

        let result = backend
            .request("tools/call", Some(serde_json::to_value(&forward)?))
            .await
            .and_then(into_result);

        if let Err(e) = &result {
            error!(backend = %backend.name, tool = %params.name, error = %e, "Tool call failed");
        }
        result
    }

    /// Get a prompt from the backend that owns it
    pub async fn get_prompt(&self, params: PromptsGetParams) -> Result<Value> {
        let backend = self.resolve(&self.prompts, CapabilityKind::Prompt, &params.name)?;

        debug!(backend = %backend.name, prompt = %params.name, "Forwarding prompt request");

        let forward = PromptsGetParams {
            name: params.name.clone(),
            arguments: Some(params.arguments.unwrap_or_else(|| json!({}))),
            meta: params.meta,
        };

        let result = backend
            .request("prompts/get", Some(serde_json::to_value(&forward)?))
            .await
            .and_then(into_result);

        if let Err(e) = &result {
            error!(backend = %backend.name, prompt = %params.name, error = %e, "Prompt request failed");
        }
        result
    }

    /// Read a resource from the backend that owns its URI
    pub async fn read_resource(&self, params: ResourcesReadParams) -> Result<Value> {
        let backend = self.resolve(&self.resources, CapabilityKind::Resource, &params.uri)?;

        debug!(backend = %backend.name, uri = %params.uri, "Forwarding resource read");

        let forward = ResourcesReadParams {
            uri: params.uri.clone(),
            meta: params.meta,
        };

        let result = backend
            .request("resources/read", Some(serde_json::to_value(&forward)?))
            .await
            .and_then(into_result);

        if let Err(e) = &result {
            error!(backend = %backend.name, uri = %params.uri, error = %e, "Resource read failed");
        }
        result
    }

    /// Resolve a capability name against an ownership index
    fn resolve(
        &self,
        index: &OwnershipIndex,
        kind: CapabilityKind,
        name: &str,
    ) -> Result<Arc<ConnectedBackend>> {
        index
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CapabilityNotFound {
                kind,
                name: name.to_string(),
            })
    }
}

/// Issue one list request against one backend.
///
/// Returns `None` on failure after logging; a single unreachable backend
/// must not fail the aggregate listing.
async fn list_from<P, R, T>(
    backend: &Arc<ConnectedBackend>,
    method: &str,
    params: &P,
    items: impl FnOnce(R) -> Vec<T>,
) -> Option<Vec<T>>
where
    P: serde::Serialize,
    R: DeserializeOwned,
{
    let params = match serde_json::to_value(params) {
        Ok(value) => value,
        Err(e) => {
            error!(backend = %backend.name, method, error = %e, "Failed to encode list request");
            return None;
        }
    };

    match backend.request(method, Some(params)).await.and_then(into_result) {
        Ok(result) => match serde_json::from_value::<R>(result) {
            Ok(result) => Some(items(result)),
            Err(e) => {
                error!(backend = %backend.name, method, error = %e, "Malformed list response");
                None
            }
        },
        Err(e) => {
            error!(backend = %backend.name, method, error = %e, "List request failed");
            None
        }
    }
}

/// Unwrap a JSON-RPC response into its result value.
///
/// A backend-side error becomes `Error::Upstream` carrying the original
/// code, message, and data so it can be replayed verbatim to the caller.
fn into_result(response: JsonRpcResponse) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(Error::Upstream {
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }

    Ok(response.result.unwrap_or(Value::Null))
}

/// Tag an item's text with its owning backend, `[backend] text`
fn annotate(backend: &str, text: Option<&str>) -> String {
    format!("[{backend}] {}", text.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_annotate_prefixes_backend_name() {
        assert_eq!(annotate("files", Some("Read a file")), "[files] Read a file");
    }

    #[test]
    fn test_annotate_missing_text_keeps_tag() {
        assert_eq!(annotate("files", None), "[files] ");
    }

    #[test]
    fn test_into_result_maps_upstream_error() {
        let response = JsonRpcResponse::error_with_data(
            None,
            -32000,
            "backend exploded",
            Some(json!({"detail": 1})),
        );

        match into_result(response) {
            Err(Error::Upstream { code, message, data }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "backend exploded");
                assert_eq!(data, Some(json!({"detail": 1})));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
