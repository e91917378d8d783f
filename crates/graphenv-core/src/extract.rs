//! Dependency extraction from workflow documents.
//!
//! Every node becomes a [`NodeReference`]. Nodes that the application ships
//! itself land in `builtin_nodes`; editor-only nodes (notes, reroutes) and
//! subgraph containers are skipped. Widget values that name model files
//! become [`ModelReference`]s.

use serde_json::{Map, Value};
use tracing::debug;

use node_registry::is_model_filename;

use crate::domain::{Dependencies, EnvError, ModelReference, NodeReference, Provenance, Result};

/// Provenance package id of nodes bundled with the application.
pub const BUILTIN_PACKAGE_ID: &str = "comfy-core";

/// Node types that exist only in the editor and never execute.
pub const FRONTEND_ONLY_TYPES: &[&str] = &["Note", "MarkdownNote", "Reroute", "PrimitiveNode"];

/// Bundled node types recognized even when a node carries no provenance.
pub const BUILTIN_NODE_TYPES: &[&str] = &[
    "CheckpointLoader",
    "CheckpointLoaderSimple",
    "CLIPLoader",
    "CLIPSetLastLayer",
    "CLIPTextEncode",
    "CLIPVisionEncode",
    "CLIPVisionLoader",
    "ConditioningCombine",
    "ConditioningSetArea",
    "ControlNetApply",
    "ControlNetApplyAdvanced",
    "ControlNetLoader",
    "DiffControlNetLoader",
    "DualCLIPLoader",
    "EmptyLatentImage",
    "GLIGENLoader",
    "HypernetworkLoader",
    "ImageScale",
    "ImageUpscaleWithModel",
    "KSampler",
    "KSamplerAdvanced",
    "LatentUpscale",
    "LoadImage",
    "LoraLoader",
    "LoraLoaderModelOnly",
    "PreviewImage",
    "SaveImage",
    "StyleModelLoader",
    "UNETLoader",
    "unCLIPCheckpointLoader",
    "UpscaleModelLoader",
    "VAEDecode",
    "VAEEncode",
    "VAELoader",
];

/// Widget names of model loaders, in `widgets_values` order.
fn loader_widgets(type_name: &str) -> &'static [&'static str] {
    match type_name {
        "CheckpointLoaderSimple" | "unCLIPCheckpointLoader" => &["ckpt_name"],
        "CheckpointLoader" => &["config_name", "ckpt_name"],
        "VAELoader" => &["vae_name"],
        "LoraLoader" => &["lora_name", "strength_model", "strength_clip"],
        "LoraLoaderModelOnly" => &["lora_name", "strength_model"],
        "ControlNetLoader" | "DiffControlNetLoader" => &["control_net_name"],
        "UpscaleModelLoader" => &["model_name"],
        "CLIPLoader" => &["clip_name", "type"],
        "DualCLIPLoader" => &["clip_name1", "clip_name2", "type"],
        "CLIPVisionLoader" => &["clip_name"],
        "UNETLoader" => &["unet_name", "weight_dtype"],
        "StyleModelLoader" => &["style_model_name"],
        "GLIGENLoader" => &["gligen_name"],
        "HypernetworkLoader" => &["hypernetwork_name", "strength"],
        _ => &[],
    }
}

/// Extract the dependencies of one workflow document.
///
/// `name` only labels parse errors.
pub fn extract_dependencies(name: &str, workflow: &Value) -> Result<Dependencies> {
    let root = workflow
        .as_object()
        .ok_or_else(|| EnvError::parse(name, "expected a JSON object"))?;
    let nodes = root
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| EnvError::parse(name, "missing `nodes` list"))?;

    let subgraphs: Vec<(&str, &Vec<Value>)> = root
        .get("definitions")
        .and_then(|d| d.get("subgraphs"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|sg| {
                    let id = sg.get("id")?.as_str()?;
                    let nodes = sg.get("nodes")?.as_array()?;
                    Some((id, nodes))
                })
                .collect()
        })
        .unwrap_or_default();
    let subgraph_ids: Vec<&str> = subgraphs.iter().map(|(id, _)| *id).collect();

    let mut deps = Dependencies::default();
    collect_nodes(name, None, nodes, &subgraph_ids, &mut deps)?;
    for (id, nodes) in &subgraphs {
        collect_nodes(name, Some(*id), nodes, &subgraph_ids, &mut deps)?;
    }

    debug!(
        workflow = %name,
        nodes = deps.nodes.len(),
        builtin = deps.builtin_nodes.len(),
        models = deps.models.len(),
        "extracted dependencies"
    );
    Ok(deps)
}

fn collect_nodes(
    workflow: &str,
    scope: Option<&str>,
    nodes: &[Value],
    subgraph_ids: &[&str],
    deps: &mut Dependencies,
) -> Result<()> {
    for node in nodes {
        let obj = node
            .as_object()
            .ok_or_else(|| EnvError::parse(workflow, "node is not an object"))?;
        let type_name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvError::parse(workflow, "node without a `type`"))?;
        if FRONTEND_ONLY_TYPES.contains(&type_name) || subgraph_ids.contains(&type_name) {
            continue;
        }
        let local_id = node_id(obj.get("id"))
            .ok_or_else(|| EnvError::parse(workflow, format!("{type_name} node without an `id`")))?;

        let id = match scope {
            Some(subgraph) => format!("{subgraph}:{local_id}"),
            None => local_id,
        };

        let provenance = provenance_of(obj);
        let builtin = match &provenance {
            Some(p) => p.package_id == BUILTIN_PACKAGE_ID,
            None => BUILTIN_NODE_TYPES.contains(&type_name),
        };

        collect_models(obj, &id, type_name, &mut deps.models);

        let mut reference = NodeReference::new(id, type_name);
        reference.provenance = provenance;
        if builtin {
            deps.builtin_nodes.push(reference);
        } else {
            deps.nodes.push(reference);
        }
    }
    Ok(())
}

fn node_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Package hint from `properties`: `cnr_id` (registry id) or `aux_id`
/// (`owner/repo`), plus `ver`.
fn provenance_of(node: &Map<String, Value>) -> Option<Provenance> {
    let properties = node.get("properties")?.as_object()?;
    let text = |key: &str| {
        properties
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let package_id = match (text("cnr_id"), text("aux_id")) {
        (Some(cnr_id), _) => cnr_id,
        (None, Some(aux_id)) if aux_id.contains("://") => aux_id,
        (None, Some(aux_id)) => format!("https://github.com/{aux_id}"),
        (None, None) => return None,
    };

    Some(Provenance {
        package_id,
        package_version: text("ver"),
    })
}

fn collect_models(
    node: &Map<String, Value>,
    node_id: &str,
    type_name: &str,
    models: &mut Vec<ModelReference>,
) {
    let Some(Value::Array(widgets)) = node.get("widgets_values") else {
        return;
    };
    let names = loader_widgets(type_name);

    for (idx, value) in widgets.iter().enumerate() {
        let Some(filename) = value.as_str().filter(|s| is_model_filename(s)) else {
            continue;
        };
        let input_slot = names
            .get(idx)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("widgets_values[{idx}]"));

        let mut reference = ModelReference::new(filename, node_id, input_slot);
        if let Some(hash) = declared_hash(node, filename) {
            reference = reference.with_hash(hash);
        }
        models.push(reference);
    }
}

/// SHA-256 recorded for `filename` in the node's `properties.models`.
fn declared_hash<'a>(node: &'a Map<String, Value>, filename: &str) -> Option<&'a str> {
    let wanted = file_name_of(filename);
    node.get("properties")?
        .get("models")?
        .as_array()?
        .iter()
        .filter(|m| {
            m.get("name")
                .and_then(Value::as_str)
                .map(|name| file_name_of(name) == wanted)
                .unwrap_or(false)
        })
        .filter(|m| {
            m.get("hash_type")
                .and_then(Value::as_str)
                .map(|t| t.eq_ignore_ascii_case("sha256"))
                .unwrap_or(true)
        })
        .find_map(|m| m.get("hash").and_then(Value::as_str).filter(|h| !h.is_empty()))
}

fn file_name_of(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
