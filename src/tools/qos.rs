//! QoS policy tools.

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::args::{resolve_client, schema, Arguments};
use super::{CallToolResult, ToolContext, ToolError, ToolRegistry};
use crate::api::QosPolicy;
use crate::client::ClusterClient;

const FIXED_LIMITS: [&str; 3] = ["max_throughput_iops", "max_throughput_mbps", "min_throughput_iops"];
const ADAPTIVE_ALLOCATIONS: [&str; 2] = ["expected_iops_allocation", "peak_iops_allocation"];

fn policy_selector(extra: Value) -> Value {
    let mut props = json!({
        "policy_uuid": {"type": "string"},
        "policy_name": {"type": "string", "description": "Policy name (instead of policy_uuid)"},
        "svm_name": {"type": "string", "description": "SVM used to resolve policy_name"}
    });
    if let (Some(props), Value::Object(extra)) = (props.as_object_mut(), extra) {
        props.extend(extra);
    }
    schema(props, &[])
}

pub fn register(registry: &ToolRegistry) {
    registry.register(
        "cluster_list_qos_policies",
        "List QoS policy groups. With svm_name, cluster-scoped policies usable by that SVM are included.",
        schema(
            json!({"svm_name": {"type": "string", "description": "SVM to list policies for"}}),
            &[],
        ),
        list_qos_policies,
    );
    registry.register(
        "cluster_create_qos_policy",
        "Create a fixed or adaptive QoS policy group.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "policy_name": {"type": "string"},
                "policy_type": {"type": "string", "enum": ["fixed", "adaptive"], "description": "Default fixed"},
                "max_throughput_iops": {"type": "integer"},
                "max_throughput_mbps": {"type": "integer"},
                "min_throughput_iops": {"type": "integer"},
                "is_shared": {"type": "boolean", "description": "Fixed limits shared by all workloads (default true)"},
                "expected_iops": {"type": "integer", "description": "Adaptive: expected IOPS per TB"},
                "peak_iops": {"type": "integer", "description": "Adaptive: peak IOPS per TB"},
                "expected_iops_allocation": {"type": "string", "enum": ["used_space", "allocated_space"]},
                "peak_iops_allocation": {"type": "string", "enum": ["used_space", "allocated_space"]}
            }),
            &["svm_name", "policy_name"],
        ),
        create_qos_policy,
    );
    registry.register(
        "cluster_get_qos_policy",
        "Show one QoS policy group by UUID, or by name within an SVM.",
        policy_selector(json!({})),
        get_qos_policy,
    );
    registry.register(
        "cluster_update_qos_policy",
        "Rename a QoS policy group or change its fixed or adaptive limits.",
        policy_selector(json!({
            "new_name": {"type": "string"},
            "max_throughput_iops": {"type": "integer"},
            "max_throughput_mbps": {"type": "integer"},
            "min_throughput_iops": {"type": "integer"},
            "is_shared": {"type": "boolean"},
            "expected_iops": {"type": "integer"},
            "peak_iops": {"type": "integer"},
            "expected_iops_allocation": {"type": "string", "enum": ["used_space", "allocated_space"]},
            "peak_iops_allocation": {"type": "string", "enum": ["used_space", "allocated_space"]}
        })),
        update_qos_policy,
    );
    registry.register(
        "cluster_delete_qos_policy",
        "Delete a QoS policy group by UUID, or by name within an SVM.",
        policy_selector(json!({})),
        delete_qos_policy,
    );
}

async fn qos_policy_uuid(
    client: &ClusterClient,
    cancel: &CancellationToken,
    args: &Arguments,
) -> Result<String, ToolError> {
    if let Some(uuid) = args.str("policy_uuid")? {
        return Ok(uuid.to_string());
    }
    let name = args.str("policy_name")?.ok_or_else(|| {
        ToolError::InvalidParameter("provide policy_uuid or policy_name".to_string())
    })?;
    client
        .list_qos_policies(cancel, args.str("svm_name")?)
        .await
        .map_err(ToolError::client("Failed to look up QoS policy"))?
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.uuid)
        .ok_or_else(|| ToolError::Failed(format!("QoS policy '{name}' not found")))
}

fn describe(p: &QosPolicy) -> String {
    let mut line = format!("- {}", p.name);
    if let Some(fixed) = &p.fixed {
        let mut limits = Vec::new();
        if let Some(v) = fixed.max_throughput_iops {
            limits.push(format!("max {v} IOPS"));
        }
        if let Some(v) = fixed.max_throughput_mbps {
            limits.push(format!("max {v} MB/s"));
        }
        if let Some(v) = fixed.min_throughput_iops {
            limits.push(format!("min {v} IOPS"));
        }
        line.push_str(&format!(" fixed [{}]", limits.join(", ")));
    }
    if let Some(adaptive) = &p.adaptive {
        line.push_str(&format!(
            " adaptive [expected {} / peak {} IOPS/TB]",
            adaptive.expected_iops.unwrap_or_default(),
            adaptive.peak_iops.unwrap_or_default()
        ));
    }
    match &p.svm {
        Some(svm) => line.push_str(&format!(" svm={}", svm.name)),
        None => line.push_str(" (cluster-scoped)"),
    }
    line
}

async fn list_qos_policies(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let policies = target
        .client
        .list_qos_policies(&ctx.cancel, args.str("svm_name")?)
        .await
        .map_err(ToolError::client("Failed to list QoS policies"))?;

    let mut summary = format!("QoS policies on {} ({}):\n", target.label, policies.len());
    for p in &policies {
        summary.push_str(&describe(p));
        summary.push('\n');
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), policies))
}

fn build_qos_body(args: &Arguments) -> Result<Value, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("policy_name")?;
    let mut body = json!({ "name": name, "svm": { "name": svm } });

    match args.str("policy_type")?.unwrap_or("fixed") {
        "fixed" => {
            let mut fixed = Map::new();
            for key in FIXED_LIMITS {
                if let Some(v) = args.u64(key)? {
                    fixed.insert(key.into(), json!(v));
                }
            }
            if fixed.is_empty() {
                return Err(ToolError::InvalidParameter(
                    "fixed policy needs max_throughput_iops, max_throughput_mbps or min_throughput_iops"
                        .to_string(),
                ));
            }
            fixed.insert(
                "capacity_shared".into(),
                json!(args.bool("is_shared")?.unwrap_or(true)),
            );
            body["fixed"] = Value::Object(fixed);
        }
        "adaptive" => {
            let expected = args.u64("expected_iops")?;
            let peak = args.u64("peak_iops")?;
            let (Some(expected), Some(peak)) = (expected, peak) else {
                return Err(ToolError::InvalidParameter(
                    "adaptive policy needs expected_iops and peak_iops".to_string(),
                ));
            };
            let mut adaptive = json!({ "expected_iops": expected, "peak_iops": peak });
            for key in ADAPTIVE_ALLOCATIONS {
                if let Some(v) = args.str(key)? {
                    adaptive[key] = json!(v);
                }
            }
            body["adaptive"] = adaptive;
        }
        other => {
            return Err(ToolError::InvalidParameter(format!(
                "policy_type must be fixed or adaptive, got '{other}'"
            )))
        }
    }
    Ok(body)
}

async fn create_qos_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let body = build_qos_body(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    target
        .client
        .create_qos_policy(&ctx.cancel, &body)
        .await
        .map_err(ToolError::client("Failed to create QoS policy"))?;

    let name = args.required_str("policy_name")?;
    info!(cluster = %target.label, policy = name, "QoS policy created");
    Ok(CallToolResult::text(format!(
        "QoS policy '{name}' created on {}",
        target.label
    )))
}

async fn get_qos_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = qos_policy_uuid(&target.client, &ctx.cancel, &args).await?;
    let policy = target
        .client
        .get_qos_policy(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to get QoS policy"))?;

    let summary = format!("QoS policy on {} (uuid {}):\n{}", target.label, policy.uuid, describe(&policy));
    Ok(CallToolResult::hybrid(summary, vec![policy]))
}

fn build_qos_update(args: &Arguments) -> Result<Value, ToolError> {
    let mut body = Map::new();
    if let Some(name) = args.str("new_name")? {
        body.insert("name".into(), json!(name));
    }

    let mut fixed = Map::new();
    for key in FIXED_LIMITS {
        if let Some(v) = args.u64(key)? {
            fixed.insert(key.into(), json!(v));
        }
    }
    if let Some(shared) = args.bool("is_shared")? {
        fixed.insert("capacity_shared".into(), json!(shared));
    }

    let mut adaptive = Map::new();
    for key in ["expected_iops", "peak_iops"] {
        if let Some(v) = args.u64(key)? {
            adaptive.insert(key.into(), json!(v));
        }
    }
    for key in ADAPTIVE_ALLOCATIONS {
        if let Some(v) = args.str(key)? {
            adaptive.insert(key.into(), json!(v));
        }
    }

    if !fixed.is_empty() && !adaptive.is_empty() {
        return Err(ToolError::InvalidParameter(
            "a policy is either fixed or adaptive; set limits of one kind".to_string(),
        ));
    }
    if !fixed.is_empty() {
        body.insert("fixed".into(), Value::Object(fixed));
    }
    if !adaptive.is_empty() {
        body.insert("adaptive".into(), Value::Object(adaptive));
    }
    if body.is_empty() {
        return Err(ToolError::InvalidParameter("no updates specified".to_string()));
    }
    Ok(Value::Object(body))
}

async fn update_qos_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let body = build_qos_update(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    let uuid = qos_policy_uuid(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .update_qos_policy(&ctx.cancel, &uuid, &body)
        .await
        .map_err(ToolError::client("Failed to update QoS policy"))?;

    info!(cluster = %target.label, policy = %uuid, "QoS policy updated");
    Ok(CallToolResult::text(format!(
        "QoS policy {uuid} updated on {}",
        target.label
    )))
}

async fn delete_qos_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = qos_policy_uuid(&target.client, &ctx.cancel, &args).await?;

    target
        .client
        .delete_qos_policy(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to delete QoS policy"))?;
    Ok(CallToolResult::text(format!(
        "QoS policy {uuid} deleted on {}",
        target.label
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Arguments {
        Arguments::from_value(Some(value)).unwrap()
    }

    #[test]
    fn fixed_body() {
        let body = build_qos_body(&args(json!({
            "svm_name": "svm1", "policy_name": "gold", "max_throughput_iops": 5000
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "name": "gold",
                "svm": {"name": "svm1"},
                "fixed": {"max_throughput_iops": 5000, "capacity_shared": true}
            })
        );
    }

    #[test]
    fn adaptive_body() {
        let body = build_qos_body(&args(json!({
            "svm_name": "svm1", "policy_name": "auto", "policy_type": "adaptive",
            "expected_iops": 1000, "peak_iops": 5000, "peak_iops_allocation": "used_space"
        })))
        .unwrap();
        assert_eq!(body["adaptive"]["expected_iops"], 1000);
        assert_eq!(body["adaptive"]["peak_iops_allocation"], "used_space");
        assert!(body.get("fixed").is_none());
    }

    #[test]
    fn incomplete_policies_are_rejected() {
        assert!(build_qos_body(&args(json!({"svm_name": "s", "policy_name": "p"}))).is_err());
        assert!(build_qos_body(&args(json!({
            "svm_name": "s", "policy_name": "p", "policy_type": "adaptive", "peak_iops": 1
        })))
        .is_err());
        assert!(build_qos_body(&args(json!({
            "svm_name": "s", "policy_name": "p", "policy_type": "burst"
        })))
        .is_err());
    }

    #[test]
    fn update_body_keeps_one_limit_kind() {
        let body = build_qos_update(&args(json!({
            "new_name": "silver", "max_throughput_mbps": 200, "is_shared": false
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "name": "silver",
                "fixed": {"max_throughput_mbps": 200, "capacity_shared": false}
            })
        );

        let body = build_qos_update(&args(json!({"peak_iops": 9000}))).unwrap();
        assert_eq!(body, json!({"adaptive": {"peak_iops": 9000}}));

        let err = build_qos_update(&args(json!({"max_throughput_iops": 1, "peak_iops": 2}))).unwrap_err();
        assert!(err.to_string().contains("fixed or adaptive"));
        assert!(build_qos_update(&Arguments::default()).is_err());
    }
}
