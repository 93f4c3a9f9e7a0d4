//! NFS export policy tools.

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::args::{resolve_client, schema, Arguments};
use super::volume::{volume_uuid, with_volume_selector};
use super::{CallToolResult, ToolContext, ToolError, ToolRegistry};
use crate::api::ExportRule;
use crate::client::ClusterClient;

const AUTH_FLAVORS: [&str; 6] = ["any", "none", "never", "krb5", "ntlm", "sys"];
const RULE_FLAVORS: [&str; 3] = ["ro_rule", "rw_rule", "superuser"];

fn rule_properties() -> Value {
    json!({
        "clients": {"type": "array", "items": {"type": "string"}, "description": "Client matches: IPs, subnets, hostnames or netgroups"},
        "protocols": {"type": "array", "items": {"type": "string", "enum": ["any", "nfs", "nfs3", "nfs4", "nfs41"]}, "description": "Default [\"any\"]"},
        "ro_rule": {"type": "array", "items": {"type": "string", "enum": AUTH_FLAVORS}, "description": "Default [\"sys\"]"},
        "rw_rule": {"type": "array", "items": {"type": "string", "enum": AUTH_FLAVORS}, "description": "Default [\"sys\"]"},
        "superuser": {"type": "array", "items": {"type": "string", "enum": AUTH_FLAVORS}, "description": "Default [\"none\"]"}
    })
}

fn with_rule_index(mut props: Value) -> Value {
    props["rule_index"] = json!({"type": "integer", "minimum": 1, "description": "Rule index within the policy"});
    props
}

fn policy_selector(extra: Value, required: &[&str]) -> Value {
    let mut props = Map::new();
    props.insert("policy_id".into(), json!({"type": "integer", "description": "Export policy ID"}));
    props.insert(
        "policy_name".into(),
        json!({"type": "string", "description": "Export policy name (with svm_name, instead of policy_id)"}),
    );
    props.insert("svm_name".into(), json!({"type": "string"}));
    if let Value::Object(extra) = extra {
        props.extend(extra);
    }
    schema(Value::Object(props), required)
}

pub fn register(registry: &ToolRegistry) {
    registry.register(
        "list_export_policies",
        "List NFS export policies and their rules.",
        schema(json!({"svm_name": {"type": "string"}}), &[]),
        list_export_policies,
    );
    registry.register(
        "create_export_policy",
        "Create an empty NFS export policy in an SVM. Add rules with add_export_rule.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "policy_name": {"type": "string"}
            }),
            &["svm_name", "policy_name"],
        ),
        create_export_policy,
    );
    registry.register(
        "add_export_rule",
        "Append a client access rule to an NFS export policy.",
        policy_selector(rule_properties(), &["clients"]),
        add_export_rule,
    );
    registry.register(
        "get_export_policy",
        "Show one NFS export policy with its rules.",
        policy_selector(json!({}), &[]),
        get_export_policy,
    );
    registry.register(
        "update_export_rule",
        "Change clients, protocols or auth flavors of one export policy rule. Omitted fields are unchanged.",
        policy_selector(with_rule_index(rule_properties()), &["rule_index"]),
        update_export_rule,
    );
    registry.register(
        "delete_export_rule",
        "Remove one rule from an NFS export policy. Later rules are renumbered by the cluster.",
        policy_selector(with_rule_index(json!({})), &["rule_index"]),
        delete_export_rule,
    );
    registry.register(
        "delete_export_policy",
        "Delete an NFS export policy. The policy must not be in use by any volume.",
        policy_selector(json!({}), &[]),
        delete_export_policy,
    );
    registry.register(
        "configure_volume_nfs_access",
        "Assign an export policy to a volume, optionally setting its junction path.",
        with_volume_selector(json!({
            "export_policy": {"type": "string", "description": "Export policy name"},
            "junction_path": {"type": "string", "description": "Mount path, e.g. /vol1"}
        }), &["export_policy"]),
        configure_volume_nfs_access,
    );
    registry.register(
        "disable_volume_nfs_access",
        "Revert a volume to the SVM's default export policy.",
        with_volume_selector(json!({}), &[]),
        disable_volume_nfs_access,
    );
}

/// Resolve the target policy's ID from `policy_id`, or `policy_name` + `svm_name`.
async fn policy_id(
    client: &ClusterClient,
    cancel: &CancellationToken,
    args: &Arguments,
) -> Result<u64, ToolError> {
    if let Some(id) = args.u64("policy_id")? {
        return Ok(id);
    }
    let Some(name) = args.str("policy_name")? else {
        return Err(ToolError::InvalidParameter(
            "provide policy_id, or policy_name with svm_name".to_string(),
        ));
    };
    let svm = args.required_str("svm_name")?;
    client
        .find_export_policy(cancel, svm, name)
        .await
        .map_err(ToolError::client("Failed to look up export policy"))?
        .map(|p| p.id)
        .ok_or_else(|| ToolError::Failed(format!("export policy '{name}' not found on SVM '{svm}'")))
}

fn flavors(args: &Arguments, key: &str, default: &str) -> Result<Vec<String>, ToolError> {
    let values = args
        .string_list(key)?
        .unwrap_or_else(|| vec![default.to_string()]);
    if let Some(bad) = values.iter().find(|v| !AUTH_FLAVORS.contains(&v.as_str())) {
        return Err(ToolError::InvalidParameter(format!(
            "{key} contains '{bad}'; allowed: {}",
            AUTH_FLAVORS.join(", ")
        )));
    }
    Ok(values)
}

fn optional_flavors(args: &Arguments, key: &str) -> Result<Option<Vec<String>>, ToolError> {
    if args.string_list(key)?.is_none() {
        return Ok(None);
    }
    // Default is unused once the key is present.
    flavors(args, key, "").map(Some)
}

fn rule_index(args: &Arguments) -> Result<u32, ToolError> {
    args.u64("rule_index")?
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| ToolError::InvalidParameter("rule_index must be a positive integer".to_string()))
}

fn build_rule_update(args: &Arguments) -> Result<Value, ToolError> {
    let mut body = Map::new();
    if let Some(clients) = args.string_list("clients")? {
        if clients.is_empty() {
            return Err(ToolError::InvalidParameter("clients must not be empty".to_string()));
        }
        let clients: Vec<Value> = clients.iter().map(|c| json!({ "match": c })).collect();
        body.insert("clients".into(), json!(clients));
    }
    if let Some(protocols) = args.string_list("protocols")? {
        body.insert("protocols".into(), json!(protocols));
    }
    for key in RULE_FLAVORS {
        if let Some(values) = optional_flavors(args, key)? {
            body.insert(key.into(), json!(values));
        }
    }
    if body.is_empty() {
        return Err(ToolError::InvalidParameter("no updates specified".to_string()));
    }
    Ok(Value::Object(body))
}

fn rule_line(rule: &ExportRule) -> String {
    let clients: Vec<&str> = rule.clients.iter().map(|c| c.pattern.as_str()).collect();
    format!(
        "#{} {} ro={} rw={} su={}",
        rule.index,
        clients.join(","),
        rule.ro_rule.join("/"),
        rule.rw_rule.join("/"),
        rule.superuser.join("/")
    )
}

fn build_rule(args: &Arguments) -> Result<Value, ToolError> {
    let clients = args
        .string_list("clients")?
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ToolError::InvalidParameter("missing required parameter: clients".into()))?;
    let protocols = args
        .string_list("protocols")?
        .unwrap_or_else(|| vec!["any".to_string()]);

    Ok(json!({
        "clients": clients.iter().map(|c| json!({ "match": c })).collect::<Vec<_>>(),
        "protocols": protocols,
        "ro_rule": flavors(args, "ro_rule", "sys")?,
        "rw_rule": flavors(args, "rw_rule", "sys")?,
        "superuser": flavors(args, "superuser", "none")?,
    }))
}

async fn list_export_policies(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let policies = target
        .client
        .list_export_policies(&ctx.cancel, args.str("svm_name")?)
        .await
        .map_err(ToolError::client("Failed to list export policies"))?;

    let mut summary = format!("Export policies on {} ({}):\n", target.label, policies.len());
    for p in &policies {
        summary.push_str(&format!("- {} (id {})", p.name, p.id));
        if let Some(svm) = &p.svm {
            summary.push_str(&format!(" svm={}", svm.name));
        }
        summary.push_str(&format!(", {} rule(s)\n", p.rules.len()));
        for rule in &p.rules {
            summary.push_str(&format!("    {}\n", rule_line(rule)));
        }
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), policies))
}

async fn create_export_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("policy_name")?;
    let target = resolve_client(&ctx, &args).await?;
    let created = target
        .client
        .create_export_policy(&ctx.cancel, &json!({ "name": name, "svm": { "name": svm } }))
        .await
        .map_err(ToolError::client("Failed to create export policy"))?;

    info!(cluster = %target.label, svm, policy = name, "Export policy created");
    let id = created["records"][0]["id"]
        .as_u64()
        .or_else(|| created["id"].as_u64());
    Ok(CallToolResult::text(match id {
        Some(id) => format!("Export policy '{name}' (id {id}) created in SVM '{svm}' on {}", target.label),
        None => format!("Export policy '{name}' created in SVM '{svm}' on {}", target.label),
    }))
}

async fn add_export_rule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let rule = build_rule(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    let id = policy_id(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .add_export_rule(&ctx.cancel, id, &rule)
        .await
        .map_err(ToolError::client("Failed to add export rule"))?;

    Ok(CallToolResult::text(format!(
        "Rule added to export policy {id} on {}",
        target.label
    )))
}

async fn get_export_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let id = policy_id(&target.client, &ctx.cancel, &args).await?;
    let policy = target
        .client
        .get_export_policy(&ctx.cancel, id)
        .await
        .map_err(ToolError::client("Failed to get export policy"))?;

    let mut summary = format!("Export policy {} (id {}) on {}", policy.name, policy.id, target.label);
    if let Some(svm) = &policy.svm {
        summary.push_str(&format!("\nSVM: {}", svm.name));
    }
    if policy.rules.is_empty() {
        summary.push_str("\nNo rules");
    }
    for rule in &policy.rules {
        summary.push_str(&format!("\n{}", rule_line(rule)));
    }
    Ok(CallToolResult::hybrid(summary, vec![policy]))
}

async fn update_export_rule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let index = rule_index(&args)?;
    let body = build_rule_update(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    let id = policy_id(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .update_export_rule(&ctx.cancel, id, index, &body)
        .await
        .map_err(ToolError::client("Failed to update export rule"))?;

    Ok(CallToolResult::text(format!(
        "Rule {index} of export policy {id} updated on {}",
        target.label
    )))
}

async fn delete_export_rule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let index = rule_index(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    let id = policy_id(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .delete_export_rule(&ctx.cancel, id, index)
        .await
        .map_err(ToolError::client("Failed to delete export rule"))?;

    info!(cluster = %target.label, policy = id, rule = index, "Export rule deleted");
    Ok(CallToolResult::text(format!(
        "Rule {index} removed from export policy {id} on {}",
        target.label
    )))
}

async fn delete_export_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let id = policy_id(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .delete_export_policy(&ctx.cancel, id)
        .await
        .map_err(ToolError::client("Failed to delete export policy"))?;

    info!(cluster = %target.label, policy = id, "Export policy deleted");
    Ok(CallToolResult::text(format!(
        "Export policy {id} deleted on {}",
        target.label
    )))
}

async fn configure_volume_nfs_access(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let policy = args.required_str("export_policy")?;
    let mut nas = json!({ "export_policy": { "name": policy } });
    if let Some(path) = args.str("junction_path")? {
        nas["path"] = json!(path);
    }

    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .update_volume(&ctx.cancel, &uuid, &json!({ "nas": nas }))
        .await
        .map_err(ToolError::client("Failed to configure NFS access"))?;

    Ok(CallToolResult::text(format!(
        "Volume {uuid} on {} now uses export policy '{policy}'",
        target.label
    )))
}

async fn disable_volume_nfs_access(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .update_volume(
            &ctx.cancel,
            &uuid,
            &json!({ "nas": { "export_policy": { "name": "default" } } }),
        )
        .await
        .map_err(ToolError::client("Failed to disable NFS access"))?;

    info!(cluster = %target.label, volume = %uuid, "Volume reverted to default export policy");
    Ok(CallToolResult::text(format!(
        "Volume {uuid} on {} reverted to the default export policy",
        target.label
    )))
}
