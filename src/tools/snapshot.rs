//! Volume snapshot, snapshot policy and schedule tools.
//!
//! Snapshot policies reference cluster job schedules by name. Schedules are
//! either cron-style (`cron_minutes`, `cron_hours`, ...) or a fixed interval
//! given as `30m`, `1h`, `1d12h` or an ISO 8601 duration.

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::args::{format_bytes, resolve_client, schema, Arguments};
use super::volume::{volume_uuid, with_volume_selector};
use super::{CallToolResult, ToolContext, ToolError, ToolRegistry};
use crate::api::{Schedule, SnapshotPolicy};
use crate::client::ClusterClient;

/// `(argument, cron field, min, max)`
const CRON_FIELDS: [(&str, &str, i64, i64); 5] = [
    ("cron_minutes", "minutes", 0, 59),
    ("cron_hours", "hours", 0, 23),
    ("cron_days", "days", 1, 31),
    ("cron_months", "months", 1, 12),
    ("cron_weekdays", "weekdays", 0, 6),
];

fn policy_selector() -> Value {
    schema(
        json!({
            "policy_uuid": {"type": "string", "description": "Snapshot policy UUID"},
            "policy_name": {"type": "string", "description": "Snapshot policy name (instead of policy_uuid)"},
            "svm_name": {"type": "string", "description": "SVM owning the policy"}
        }),
        &[],
    )
}

fn timing_properties() -> Map<String, Value> {
    let mut props = Map::new();
    for (arg, field, min, max) in CRON_FIELDS {
        props.insert(
            arg.into(),
            json!({
                "type": "array",
                "items": {"type": "integer", "minimum": min, "maximum": max},
                "description": format!("Cron {field} ({min}-{max})"),
            }),
        );
    }
    props.insert(
        "interval".into(),
        json!({"type": "string", "description": "Interval schedules: e.g. \"30m\", \"1h\", \"1d\" or ISO 8601 \"PT1H\""}),
    );
    props
}

fn schedule_schema(extra: Value, required: &[&str]) -> Value {
    let mut props = timing_properties();
    if let Value::Object(extra) = extra {
        props.extend(extra);
    }
    schema(Value::Object(props), required)
}

fn snapshot_selector() -> Value {
    with_volume_selector(json!({
        "snapshot_uuid": {"type": "string", "description": "Snapshot UUID"},
        "snapshot_name": {"type": "string", "description": "Snapshot name (instead of snapshot_uuid)"}
    }), &[])
}

pub fn register(registry: &ToolRegistry) {
    registry.register(
        "cluster_list_volume_snapshots",
        "List the snapshots of a volume.",
        with_volume_selector(json!({}), &[]),
        list_volume_snapshots,
    );
    registry.register(
        "cluster_get_volume_snapshot_info",
        "Show details of one volume snapshot.",
        snapshot_selector(),
        get_volume_snapshot,
    );
    registry.register(
        "cluster_delete_volume_snapshot",
        "Delete a volume snapshot. This cannot be undone.",
        snapshot_selector(),
        delete_volume_snapshot,
    );
    registry.register(
        "list_snapshot_policies",
        "List snapshot policies and their copy schedules.",
        schema(
            json!({"svm_name": {"type": "string", "description": "Only policies owned by this SVM"}}),
            &[],
        ),
        list_snapshot_policies,
    );
    registry.register(
        "get_snapshot_policy",
        "Show a snapshot policy with its copy rules.",
        policy_selector(),
        get_snapshot_policy,
    );
    registry.register(
        "create_snapshot_policy",
        "Create a snapshot policy. Each copy rule names a schedule and how many snapshots it keeps.",
        schema(
            json!({
                "policy_name": {"type": "string"},
                "svm_name": {"type": "string", "description": "Owning SVM. Omit for a cluster-scoped policy"},
                "comment": {"type": "string"},
                "enabled": {"type": "boolean", "description": "Default true"},
                "copies": {
                    "type": "array",
                    "description": "Copy rules",
                    "items": {
                        "type": "object",
                        "properties": {
                            "count": {"type": "integer", "minimum": 1, "description": "Snapshots to keep"},
                            "schedule": {"type": "string", "description": "Schedule name, e.g. hourly"},
                            "prefix": {"type": "string"},
                            "retention": {"type": "string", "description": "ISO 8601 duration, e.g. P30D"}
                        },
                        "required": ["count", "schedule"]
                    }
                }
            }),
            &["policy_name", "copies"],
        ),
        create_snapshot_policy,
    );
    registry.register(
        "delete_snapshot_policy",
        "Delete a snapshot policy. The policy must not be assigned to any volume.",
        policy_selector(),
        delete_snapshot_policy,
    );
    registry.register(
        "list_snapshot_schedules",
        "List cluster job schedules usable by snapshot policies.",
        schema(json!({}), &[]),
        list_snapshot_schedules,
    );
    registry.register(
        "get_snapshot_schedule",
        "Show a job schedule's cron fields or interval.",
        schema(json!({"schedule_name": {"type": "string"}}), &["schedule_name"]),
        get_snapshot_schedule,
    );
    registry.register(
        "create_snapshot_schedule",
        "Create a cron or interval job schedule for use in snapshot policies.",
        schedule_schema(
            json!({
                "schedule_name": {"type": "string"},
                "schedule_type": {"type": "string", "enum": ["cron", "interval"]}
            }),
            &["schedule_name", "schedule_type"],
        ),
        create_snapshot_schedule,
    );
    registry.register(
        "update_snapshot_schedule",
        "Rename a job schedule or change its cron fields or interval.",
        schedule_schema(
            json!({
                "schedule_name": {"type": "string"},
                "new_name": {"type": "string"}
            }),
            &["schedule_name"],
        ),
        update_snapshot_schedule,
    );
    registry.register(
        "delete_snapshot_schedule",
        "Delete a job schedule. It must not be referenced by any snapshot policy.",
        schema(json!({"schedule_name": {"type": "string"}}), &["schedule_name"]),
        delete_snapshot_schedule,
    );
}

async fn snapshot_uuid(
    client: &ClusterClient,
    cancel: &CancellationToken,
    volume: &str,
    args: &Arguments,
) -> Result<String, ToolError> {
    if let Some(uuid) = args.str("snapshot_uuid")? {
        return Ok(uuid.to_string());
    }
    let Some(name) = args.str("snapshot_name")? else {
        return Err(ToolError::InvalidParameter(
            "provide snapshot_uuid or snapshot_name".to_string(),
        ));
    };
    client
        .list_volume_snapshots(cancel, volume)
        .await
        .map_err(ToolError::client("Failed to list snapshots"))?
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.uuid)
        .ok_or_else(|| ToolError::Failed(format!("snapshot '{name}' not found on volume {volume}")))
}

async fn list_volume_snapshots(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let volume = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    let snapshots = target
        .client
        .list_volume_snapshots(&ctx.cancel, &volume)
        .await
        .map_err(ToolError::client("Failed to list snapshots"))?;

    let mut summary = format!("Snapshots of volume {volume} ({}):\n", snapshots.len());
    for s in &snapshots {
        summary.push_str(&format!("- {}", s.name));
        if let Some(created) = &s.create_time {
            summary.push_str(&format!(" created {created}"));
        }
        if let Some(size) = s.size {
            summary.push_str(&format!(" ({})", format_bytes(size)));
        }
        summary.push_str(&format!(" uuid={}\n", s.uuid));
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), snapshots))
}

async fn get_volume_snapshot(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let volume = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    let snapshot = snapshot_uuid(&target.client, &ctx.cancel, &volume, &args).await?;
    let info = target
        .client
        .get_volume_snapshot(&ctx.cancel, &volume, &snapshot)
        .await
        .map_err(ToolError::client("Failed to get snapshot"))?;

    let summary = format!(
        "Snapshot {} of volume {volume}: created {}, state {}",
        info.name,
        info.create_time.as_deref().unwrap_or("unknown"),
        info.state.as_deref().unwrap_or("unknown"),
    );
    Ok(CallToolResult::hybrid(summary, vec![info]))
}

async fn delete_volume_snapshot(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let volume = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    let snapshot = snapshot_uuid(&target.client, &ctx.cancel, &volume, &args).await?;
    target
        .client
        .delete_volume_snapshot(&ctx.cancel, &volume, &snapshot)
        .await
        .map_err(ToolError::client("Failed to delete snapshot"))?;

    info!(cluster = %target.label, volume = %volume, snapshot = %snapshot, "Snapshot deleted");
    Ok(CallToolResult::text(format!(
        "Snapshot {snapshot} deleted from volume {volume} on {}",
        target.label
    )))
}

async fn list_snapshot_policies(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let policies = target
        .client
        .list_snapshot_policies(&ctx.cancel, args.str("svm_name")?)
        .await
        .map_err(ToolError::client("Failed to list snapshot policies"))?;

    let mut summary = format!("Snapshot policies on {} ({}):\n", target.label, policies.len());
    for p in &policies {
        let copies: Vec<String> = p
            .copies
            .iter()
            .map(|c| {
                let schedule = c.schedule.as_ref().map_or("?", |s| s.name.as_str());
                format!("{schedule}x{}", c.count)
            })
            .collect();
        summary.push_str(&format!(
            "- {}{} [{}]\n",
            p.name,
            if p.enabled { "" } else { " (disabled)" },
            copies.join(", ")
        ));
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), policies))
}

async fn list_snapshot_schedules(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let schedules = target
        .client
        .list_schedules(&ctx.cancel)
        .await
        .map_err(ToolError::client("Failed to list schedules"))?;

    let mut summary = format!("Schedules on {} ({}):\n", target.label, schedules.len());
    for s in &schedules {
        summary.push_str(&format!("- {}: {}\n", s.name, describe_timing(s)));
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), schedules))
}

async fn snapshot_policy_uuid(
    client: &ClusterClient,
    cancel: &CancellationToken,
    args: &Arguments,
) -> Result<String, ToolError> {
    if let Some(uuid) = args.str("policy_uuid")? {
        return Ok(uuid.to_string());
    }
    let Some(name) = args.str("policy_name")? else {
        return Err(ToolError::InvalidParameter(
            "provide policy_uuid or policy_name".to_string(),
        ));
    };
    client
        .list_snapshot_policies(cancel, args.str("svm_name")?)
        .await
        .map_err(ToolError::client("Failed to look up snapshot policy"))?
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.uuid)
        .ok_or_else(|| ToolError::Failed(format!("snapshot policy '{name}' not found")))
}

fn describe_policy(policy: &SnapshotPolicy) -> String {
    let mut summary = format!(
        "Snapshot policy {} ({}), uuid {}",
        policy.name,
        if policy.enabled { "enabled" } else { "disabled" },
        policy.uuid
    );
    if let Some(svm) = &policy.svm {
        summary.push_str(&format!("\nSVM: {}", svm.name));
    }
    if let Some(comment) = &policy.comment {
        summary.push_str(&format!("\nComment: {comment}"));
    }
    if policy.copies.is_empty() {
        summary.push_str("\nNo copy rules");
    }
    for copy in &policy.copies {
        let schedule = copy.schedule.as_ref().map_or("?", |s| s.name.as_str());
        summary.push_str(&format!("\n- {schedule}: keep {}", copy.count));
        if let Some(prefix) = &copy.prefix {
            summary.push_str(&format!(", prefix {prefix}"));
        }
        if let Some(retention) = &copy.retention {
            summary.push_str(&format!(", retention {retention}"));
        }
    }
    summary
}

async fn get_snapshot_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = snapshot_policy_uuid(&target.client, &ctx.cancel, &args).await?;
    let policy = target
        .client
        .get_snapshot_policy(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to get snapshot policy"))?;
    Ok(CallToolResult::hybrid(describe_policy(&policy), vec![policy]))
}

fn build_policy_body(args: &Arguments) -> Result<Value, ToolError> {
    let name = args.required_str("policy_name")?;
    let copies = args
        .object_list("copies")?
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ToolError::InvalidParameter("copies must list at least one copy rule".into()))?;

    let copies = copies
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let copy = Arguments::from(raw);
            let count = copy
                .u64("count")?
                .filter(|n| *n > 0)
                .ok_or_else(|| ToolError::InvalidParameter(format!("copies[{i}].count must be a positive integer")))?;
            // Accept both "hourly" and {"name": "hourly"}.
            let schedule = match copy.object("schedule") {
                Ok(Some(obj)) => obj.get("name").and_then(Value::as_str).map(str::to_string),
                _ => copy.str("schedule")?.map(str::to_string),
            }
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidParameter(format!("copies[{i}].schedule is required")))?;

            let mut rule = json!({ "count": count, "schedule": { "name": schedule } });
            for key in ["prefix", "retention"] {
                if let Some(v) = copy.str(key)? {
                    rule[key] = json!(v);
                }
            }
            Ok(rule)
        })
        .collect::<Result<Vec<_>, ToolError>>()?;

    let mut body = json!({
        "name": name,
        "enabled": args.bool("enabled")?.unwrap_or(true),
        "copies": copies,
    });
    if let Some(svm) = args.str("svm_name")? {
        body["svm"] = json!({ "name": svm });
    }
    if let Some(comment) = args.str("comment")? {
        body["comment"] = json!(comment);
    }
    Ok(body)
}

async fn create_snapshot_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let body = build_policy_body(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    target
        .client
        .create_snapshot_policy(&ctx.cancel, &body)
        .await
        .map_err(ToolError::client("Failed to create snapshot policy"))?;

    let name = args.required_str("policy_name")?;
    info!(cluster = %target.label, policy = name, "Snapshot policy created");
    let scope = args
        .str("svm_name")?
        .map(|svm| format!(" in SVM '{svm}'"))
        .unwrap_or_default();
    Ok(CallToolResult::text(format!(
        "Snapshot policy '{name}' created{scope} on {}",
        target.label
    )))
}

async fn delete_snapshot_policy(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = snapshot_policy_uuid(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .delete_snapshot_policy(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to delete snapshot policy"))?;

    info!(cluster = %target.label, policy = %uuid, "Snapshot policy deleted");
    Ok(CallToolResult::text(format!(
        "Snapshot policy {uuid} deleted on {}",
        target.label
    )))
}

/// Convert `30m`, `1h`, `1d12h` into an ISO 8601 duration (`PT30M`, `PT1H`,
/// `P1DT12H`). A value already in ISO form passes through upper-cased.
pub(crate) fn parse_interval(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.len() > 1 && raw.starts_with(['P', 'p']) {
        return Ok(raw.to_ascii_uppercase());
    }

    let mut parts = [0u64; 4]; // days, hours, minutes, seconds
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid interval '{raw}'. Use values like 30m, 1h or 1d12h"))?;
        digits.clear();
        let slot = match c.to_ascii_lowercase() {
            'd' => 0,
            'h' => 1,
            'm' => 2,
            's' => 3,
            _ => return Err(format!("invalid interval unit '{c}' in '{raw}'. Use d, h, m or s")),
        };
        parts[slot] = parts[slot].saturating_add(n);
    }
    if !digits.is_empty() || parts.iter().all(|p| *p == 0) {
        return Err(format!("invalid interval '{raw}'. Use values like 30m, 1h or 1d12h"));
    }

    let [days, hours, minutes, seconds] = parts;
    let mut iso = String::from("P");
    if days > 0 {
        iso.push_str(&format!("{days}D"));
    }
    if hours + minutes + seconds > 0 {
        iso.push('T');
        for (value, unit) in [(hours, 'H'), (minutes, 'M'), (seconds, 'S')] {
            if value > 0 {
                iso.push_str(&format!("{value}{unit}"));
            }
        }
    }
    Ok(iso)
}

fn cron_fields(args: &Arguments) -> Result<Map<String, Value>, ToolError> {
    let mut cron = Map::new();
    for (arg, field, min, max) in CRON_FIELDS {
        if let Some(values) = args.int_list(arg)? {
            if let Some(bad) = values.iter().find(|v| !(min..=max).contains(*v)) {
                return Err(ToolError::InvalidParameter(format!(
                    "{arg} value {bad} is outside {min}-{max}"
                )));
            }
            cron.insert(field.into(), json!(values));
        }
    }
    Ok(cron)
}

fn interval_arg(args: &Arguments) -> Result<Option<String>, ToolError> {
    args.str("interval")?
        .map(|raw| parse_interval(raw).map_err(ToolError::InvalidParameter))
        .transpose()
}

fn build_schedule_body(args: &Arguments) -> Result<Value, ToolError> {
    let name = args.required_str("schedule_name")?;
    let mut body = json!({ "name": name });
    match args.required_str("schedule_type")? {
        "cron" => {
            let cron = cron_fields(args)?;
            if !cron.contains_key("minutes") {
                return Err(ToolError::InvalidParameter(
                    "cron schedule needs cron_minutes".to_string(),
                ));
            }
            body["cron"] = Value::Object(cron);
        }
        "interval" => {
            let interval = interval_arg(args)?.ok_or_else(|| {
                ToolError::InvalidParameter("interval schedule needs interval".to_string())
            })?;
            body["interval"] = json!(interval);
        }
        other => {
            return Err(ToolError::InvalidParameter(format!(
                "schedule_type must be cron or interval, got '{other}'"
            )))
        }
    }
    Ok(body)
}

fn build_schedule_update(args: &Arguments) -> Result<Value, ToolError> {
    let mut body = Map::new();
    if let Some(name) = args.str("new_name")? {
        body.insert("name".into(), json!(name));
    }
    let cron = cron_fields(args)?;
    let interval = interval_arg(args)?;
    if !cron.is_empty() && interval.is_some() {
        return Err(ToolError::InvalidParameter(
            "set cron fields or interval, not both".to_string(),
        ));
    }
    if !cron.is_empty() {
        body.insert("cron".into(), Value::Object(cron));
    }
    if let Some(interval) = interval {
        body.insert("interval".into(), json!(interval));
    }
    if body.is_empty() {
        return Err(ToolError::InvalidParameter("no updates specified".to_string()));
    }
    Ok(Value::Object(body))
}

fn describe_timing(schedule: &Schedule) -> String {
    if let Some(interval) = &schedule.interval {
        return format!("every {interval}");
    }
    let Some(cron) = &schedule.cron else {
        return "no timing".to_string();
    };
    let fields: Vec<String> = CRON_FIELDS
        .iter()
        .filter_map(|(_, field, _, _)| {
            let values = cron.get(*field)?.as_array()?;
            let values: Vec<String> = values.iter().map(Value::to_string).collect();
            Some(format!("{field}={}", values.join(",")))
        })
        .collect();
    if fields.is_empty() {
        "cron (every minute)".to_string()
    } else {
        format!("cron {}", fields.join(" "))
    }
}

async fn schedule_by_name(
    client: &ClusterClient,
    cancel: &CancellationToken,
    name: &str,
) -> Result<Schedule, ToolError> {
    client
        .find_schedule(cancel, name)
        .await
        .map_err(ToolError::client("Failed to look up schedule"))?
        .ok_or_else(|| ToolError::Failed(format!("schedule '{name}' not found")))
}

async fn get_snapshot_schedule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let name = args.required_str("schedule_name")?;
    let target = resolve_client(&ctx, &args).await?;
    let schedule = schedule_by_name(&target.client, &ctx.cancel, name).await?;
    let summary = format!(
        "Schedule {} on {}: {}, uuid {}",
        schedule.name,
        target.label,
        describe_timing(&schedule),
        schedule.uuid
    );
    Ok(CallToolResult::hybrid(summary, vec![schedule]))
}

async fn create_snapshot_schedule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let body = build_schedule_body(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    target
        .client
        .create_schedule(&ctx.cancel, &body)
        .await
        .map_err(ToolError::client("Failed to create schedule"))?;

    let name = args.required_str("schedule_name")?;
    info!(cluster = %target.label, schedule = name, "Schedule created");
    Ok(CallToolResult::text(format!(
        "Schedule '{name}' created on {}",
        target.label
    )))
}

async fn update_snapshot_schedule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let name = args.required_str("schedule_name")?;
    let body = build_schedule_update(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    let schedule = schedule_by_name(&target.client, &ctx.cancel, name).await?;
    target
        .client
        .update_schedule(&ctx.cancel, &schedule.uuid, &body)
        .await
        .map_err(ToolError::client("Failed to update schedule"))?;

    Ok(CallToolResult::text(format!(
        "Schedule '{name}' updated on {}",
        target.label
    )))
}

async fn delete_snapshot_schedule(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let name = args.required_str("schedule_name")?;
    let target = resolve_client(&ctx, &args).await?;
    let schedule = schedule_by_name(&target.client, &ctx.cancel, name).await?;
    target
        .client
        .delete_schedule(&ctx.cancel, &schedule.uuid)
        .await
        .map_err(ToolError::client("Failed to delete schedule"))?;

    info!(cluster = %target.label, schedule = name, "Schedule deleted");
    Ok(CallToolResult::text(format!(
        "Schedule '{name}' deleted on {}",
        target.label
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::ClusterRegistry;
    use std::sync::Arc;

    #[tokio::test]
    async fn snapshot_needs_a_selector() {
        let client = ClusterClient::new(&crate::config::ClusterConfig {
            name: "c".into(),
            cluster_ip: "10.0.0.1".into(),
            username: "u".into(),
            password: "p".into(),
            ..Default::default()
        })
        .unwrap();
        let err = snapshot_uuid(&client, &CancellationToken::new(), "vol", &Arguments::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("snapshot_uuid"));
    }

    fn args(value: Value) -> Arguments {
        Arguments::from_value(Some(value)).unwrap()
    }

    #[test]
    fn intervals_become_iso_durations() {
        assert_eq!(parse_interval("30m").unwrap(), "PT30M");
        assert_eq!(parse_interval("1h").unwrap(), "PT1H");
        assert_eq!(parse_interval("1d").unwrap(), "P1D");
        assert_eq!(parse_interval("1d12h").unwrap(), "P1DT12H");
        assert_eq!(parse_interval("pt15m").unwrap(), "PT15M");
        assert!(parse_interval("").is_err());
        assert!(parse_interval("0h").is_err());
        assert!(parse_interval("12").is_err());
        assert!(parse_interval("3w").is_err());
    }

    #[test]
    fn cron_schedule_body() {
        let body = build_schedule_body(&args(json!({
            "schedule_name": "nightly",
            "schedule_type": "cron",
            "cron_minutes": [0],
            "cron_hours": [1, 13]
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({"name": "nightly", "cron": {"minutes": [0], "hours": [1, 13]}})
        );

        let err = build_schedule_body(&args(json!({
            "schedule_name": "bad", "schedule_type": "cron", "cron_minutes": [0], "cron_hours": [24]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("cron_hours"));

        let err = build_schedule_body(&args(json!({
            "schedule_name": "bad", "schedule_type": "cron", "cron_hours": [2]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("cron_minutes"));
    }

    #[test]
    fn interval_schedule_body() {
        let body = build_schedule_body(&args(json!({
            "schedule_name": "every-6h", "schedule_type": "interval", "interval": "6h"
        })))
        .unwrap();
        assert_eq!(body, json!({"name": "every-6h", "interval": "PT6H"}));

        assert!(build_schedule_body(&args(json!({
            "schedule_name": "x", "schedule_type": "interval"
        })))
        .is_err());
    }

    #[test]
    fn schedule_update_needs_one_kind_of_timing() {
        let body = build_schedule_update(&args(json!({"new_name": "renamed"}))).unwrap();
        assert_eq!(body, json!({"name": "renamed"}));

        let err = build_schedule_update(&args(json!({"cron_minutes": [5], "interval": "1h"}))).unwrap_err();
        assert!(err.to_string().contains("not both"));

        let err = build_schedule_update(&Arguments::default()).unwrap_err();
        assert!(err.to_string().contains("no updates"));
    }

    #[test]
    fn policy_body_accepts_schedule_names_and_objects() {
        let body = build_policy_body(&args(json!({
            "policy_name": "gold",
            "svm_name": "vs0",
            "copies": [
                {"count": 6, "schedule": "hourly"},
                {"count": 2, "schedule": {"name": "daily"}, "prefix": "d"}
            ]
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "name": "gold",
                "enabled": true,
                "svm": {"name": "vs0"},
                "copies": [
                    {"count": 6, "schedule": {"name": "hourly"}},
                    {"count": 2, "schedule": {"name": "daily"}, "prefix": "d"}
                ]
            })
        );
    }

    #[test]
    fn policy_body_rejects_bad_copies() {
        let err = build_policy_body(&args(json!({"policy_name": "p", "copies": []}))).unwrap_err();
        assert!(err.to_string().contains("copies"));

        let err = build_policy_body(&args(json!({
            "policy_name": "p", "copies": [{"count": 0, "schedule": "hourly"}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("copies[0].count"));

        let err = build_policy_body(&args(json!({
            "policy_name": "p", "copies": [{"count": 1}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("copies[0].schedule"));
    }

    #[test]
    fn timing_descriptions() {
        let cron = Schedule {
            name: "5min".into(),
            cron: Some(json!({"minutes": [0, 5, 10]})),
            ..Default::default()
        };
        assert_eq!(describe_timing(&cron), "cron minutes=0,5,10");
        let interval = Schedule {
            name: "6h".into(),
            interval: Some("PT6H".into()),
            ..Default::default()
        };
        assert_eq!(describe_timing(&interval), "every PT6H");
    }

    #[tokio::test]
    async fn listing_without_cluster_fails_as_tool_error() {
        let ctx = ToolContext {
            clusters: Arc::new(ClusterRegistry::new()),
            cancel: CancellationToken::new(),
        };
        let err = list_snapshot_schedules(ctx, Arguments::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }
}
