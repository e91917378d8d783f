//! Comparison-stable projection of workflow documents.
//!
//! The editor rewrites parts of a workflow on every save: a revision counter,
//! the canvas pan/zoom, the frontend version and, for nodes whose seed is set
//! to re-randomize, the seed itself. None of those change what the workflow
//! computes. [`normalize_for_comparison`] removes them so two saves of the
//! same graph compare equal.
//!
//! Rules, in order:
//! 1. drop top-level [`VOLATILE_TOP_LEVEL_KEYS`]
//! 2. drop [`VOLATILE_EXTRA_KEYS`] from `extra`
//! 3. zero the numeric value paired with a `"randomize"` control, in both
//!    `widgets_values` and `api_widget_values`, for top-level nodes and
//!    nodes inside `definitions.subgraphs`
//!
//! Everything else is copied through unchanged; arrays keep their order.

use serde_json::Value;

pub const VOLATILE_TOP_LEVEL_KEYS: &[&str] = &["revision"];

pub const VOLATILE_EXTRA_KEYS: &[&str] = &["ds", "frontendVersion"];

/// Control mode that re-rolls its paired value on every run.
pub const RANDOMIZE_CONTROL: &str = "randomize";

/// Every value a seed control widget can take.
const CONTROL_MODES: &[&str] = &["fixed", "increment", "decrement", RANDOMIZE_CONTROL];

/// Normalized copy of `workflow`. Pure and idempotent.
pub fn normalize_for_comparison(workflow: &Value) -> Value {
    let mut doc = workflow.clone();
    if let Value::Object(root) = &mut doc {
        for key in VOLATILE_TOP_LEVEL_KEYS {
            root.remove(*key);
        }
        if let Some(Value::Object(extra)) = root.get_mut("extra") {
            for key in VOLATILE_EXTRA_KEYS {
                extra.remove(*key);
            }
        }

        if let Some(Value::Array(nodes)) = root.get_mut("nodes") {
            nodes.iter_mut().for_each(normalize_node);
        }
        if let Some(Value::Array(subgraphs)) = root
            .get_mut("definitions")
            .and_then(|d| d.get_mut("subgraphs"))
        {
            for subgraph in subgraphs {
                if let Some(Value::Array(nodes)) = subgraph.get_mut("nodes") {
                    nodes.iter_mut().for_each(normalize_node);
                }
            }
        }
    }
    doc
}

/// Whether two workflows differ once volatile content is ignored.
pub fn workflows_differ(a: &Value, b: &Value) -> bool {
    normalize_for_comparison(a) != normalize_for_comparison(b)
}

fn is_control_at(widgets: &[Value], idx: usize, modes: &[&str]) -> bool {
    idx > 0
        && widgets[idx - 1].is_number()
        && widgets[idx]
            .as_str()
            .map(|s| modes.contains(&s))
            .unwrap_or(false)
}

fn normalize_node(node: &mut Value) {
    let Some(obj) = node.as_object_mut() else {
        return;
    };
    let Some(Value::Array(widgets)) = obj.get("widgets_values") else {
        return;
    };

    // Positions of values paired with a randomize control, plus how many
    // control entries precede each one.
    let mut targets: Vec<(usize, usize)> = Vec::new();
    let mut controls_seen = 0;
    for idx in 0..widgets.len() {
        if is_control_at(widgets, idx, &[RANDOMIZE_CONTROL]) {
            targets.push((idx - 1, controls_seen));
        }
        if is_control_at(widgets, idx, CONTROL_MODES) {
            controls_seen += 1;
        }
    }
    if targets.is_empty() {
        return;
    }
    let widget_count = widgets.len();

    if let Some(Value::Array(widgets)) = obj.get_mut("widgets_values") {
        for &(idx, _) in &targets {
            zero(&mut widgets[idx]);
        }
    }

    // The execution-facing list omits control entries when it is shorter.
    if let Some(Value::Array(api)) = obj.get_mut("api_widget_values") {
        let aligned = api.len() == widget_count;
        for &(idx, preceding_controls) in &targets {
            let api_idx = if aligned { idx } else { idx - preceding_controls };
            if let Some(value) = api.get_mut(api_idx) {
                zero(value);
            }
        }
    }
}

fn zero(value: &mut Value) {
    if value.is_number() {
        *value = Value::from(0);
    }
}
