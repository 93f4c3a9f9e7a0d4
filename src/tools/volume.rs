//! Volume lifecycle and autosize tools.
//!
//! Volumes are addressed either by `volume_uuid` or by `volume_name` plus
//! `svm_name`; see [`volume_uuid`].

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::args::{format_bytes, resolve_client, schema, Arguments};
use super::{CallToolResult, ToolContext, ToolError, ToolRegistry};
use crate::api::{offline_body, MetricBreakdown, Volume};
use crate::client::ClusterClient;

const VOLUME_STATES: [&str; 3] = ["online", "offline", "restricted"];
const SECURITY_STYLES: [&str; 4] = ["unix", "ntfs", "mixed", "unified"];
const AUTOSIZE_MODES: [&str; 3] = ["off", "grow", "grow_shrink"];

fn volume_selector() -> Value {
    json!({
        "volume_uuid": {"type": "string", "description": "Volume UUID"},
        "volume_name": {"type": "string", "description": "Volume name (with svm_name, instead of volume_uuid)"},
        "svm_name": {"type": "string", "description": "SVM owning the volume"}
    })
}

/// Volume selector plus the tool's own properties. The selector itself is never
/// listed in `required`: either form satisfies it.
pub(crate) fn with_volume_selector(extra: Value, required: &[&str]) -> Value {
    let mut props = match volume_selector() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(extra) = extra {
        props.extend(extra);
    }
    schema(Value::Object(props), required)
}

pub fn register(registry: &ToolRegistry) {
    registry.register(
        "cluster_list_volumes",
        "List volumes on a cluster, optionally limited to one SVM.",
        schema(
            json!({"svm_name": {"type": "string", "description": "Only volumes in this SVM"}}),
            &[],
        ),
        list_volumes,
    );
    registry.register(
        "get_volume_configuration",
        "Show a volume's full configuration: size, space, security style, export policy, QoS and snapshot policy.",
        with_volume_selector(json!({}), &[]),
        get_volume_configuration,
    );
    registry.register(
        "cluster_get_volume_stats",
        "Show a volume's space usage and its latest IOPS, throughput and latency sample.",
        with_volume_selector(json!({}), &[]),
        volume_stats,
    );
    registry.register(
        "cluster_create_volume",
        "Create a volume. Size accepts bytes or strings like \"100GB\".",
        schema(
            json!({
                "svm_name": {"type": "string", "description": "SVM to create the volume in"},
                "volume_name": {"type": "string", "description": "New volume name"},
                "size": {"type": "string", "description": "Size, e.g. \"100GB\", \"1.5TB\" or bytes"},
                "aggregate_name": {"type": "string", "description": "Aggregate to place the volume on"},
                "security_style": {"type": "string", "enum": SECURITY_STYLES},
                "junction_path": {"type": "string", "description": "NAS mount path, e.g. /vol1"},
                "export_policy": {"type": "string", "description": "NFS export policy name"},
                "qos_policy": {"type": "string", "description": "QoS policy name"},
                "snapshot_policy": {"type": "string", "description": "Snapshot policy name"},
                "comment": {"type": "string"}
            }),
            &["svm_name", "volume_name", "size"],
        ),
        create_volume,
    );
    registry.register(
        "cluster_update_volume",
        "Update a volume: resize, rename, change state, comment, security style, or attach QoS, snapshot and export policies.",
        with_volume_selector(json!({
            "new_size": {"type": "string", "description": "New size, e.g. \"200GB\""},
            "new_name": {"type": "string"},
            "state": {"type": "string", "enum": VOLUME_STATES},
            "comment": {"type": "string"},
            "security_style": {"type": "string", "enum": SECURITY_STYLES},
            "qos_policy": {"type": "string", "description": "QoS policy name to attach"},
            "snapshot_policy": {"type": "string"},
            "export_policy": {"type": "string"}
        }), &[]),
        update_volume,
    );
    registry.register(
        "cluster_delete_volume",
        "Delete a volume. The volume is taken offline first. This cannot be undone.",
        with_volume_selector(json!({}), &[]),
        delete_volume,
    );
    registry.register(
        "cluster_get_volume_autosize_status",
        "Show a volume's autosize mode, thresholds and limits alongside current usage.",
        with_volume_selector(json!({}), &[]),
        autosize_status,
    );
    registry.register(
        "cluster_enable_volume_autosize",
        "Configure volume autosize.",
        with_volume_selector(json!({
            "mode": {"type": "string", "enum": AUTOSIZE_MODES},
            "maximum_size": {"type": "string", "description": "Upper limit, e.g. \"500GB\""},
            "minimum_size": {"type": "string", "description": "Lower limit for grow_shrink"},
            "grow_threshold_percent": {"type": "integer", "minimum": 1, "maximum": 100},
            "shrink_threshold_percent": {"type": "integer", "minimum": 1, "maximum": 100}
        }), &["mode"]),
        enable_autosize,
    );
}

/// Resolve the target volume's UUID from `volume_uuid`, or `volume_name` + `svm_name`.
pub(crate) async fn volume_uuid(
    client: &ClusterClient,
    cancel: &CancellationToken,
    args: &Arguments,
) -> Result<String, ToolError> {
    if let Some(uuid) = args.str("volume_uuid")? {
        return Ok(uuid.to_string());
    }
    let Some(name) = args.str("volume_name")? else {
        return Err(ToolError::InvalidParameter(
            "provide volume_uuid, or volume_name with svm_name".to_string(),
        ));
    };
    let svm = args.required_str("svm_name")?;
    client
        .find_volume(cancel, svm, name)
        .await
        .map_err(ToolError::client("Failed to look up volume"))?
        .map(|v| v.uuid)
        .ok_or_else(|| ToolError::Failed(format!("volume '{name}' not found on SVM '{svm}'")))
}

fn one_of(args: &Arguments, key: &str, allowed: &[&str]) -> Result<Option<String>, ToolError> {
    match args.str(key)? {
        None => Ok(None),
        Some(v) if allowed.contains(&v) => Ok(Some(v.to_string())),
        Some(v) => Err(ToolError::InvalidParameter(format!(
            "{key} must be one of {}, got '{v}'",
            allowed.join(", ")
        ))),
    }
}

fn volume_line(v: &Volume) -> String {
    let mut line = format!("- {} [{}]", v.name, v.state);
    if let Some(svm) = &v.svm {
        line.push_str(&format!(" svm={}", svm.name));
    }
    if let Some(space) = &v.space {
        line.push_str(&format!(
            " size={} used={} available={}",
            format_bytes(space.size),
            format_bytes(space.used),
            format_bytes(space.available)
        ));
    }
    line.push_str(&format!(" uuid={}", v.uuid));
    line
}

async fn list_volumes(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let svm = args.str("svm_name")?;
    let volumes = target
        .client
        .list_volumes(&ctx.cancel, svm)
        .await
        .map_err(ToolError::client("Failed to list volumes"))?;

    let scope = svm.map(|s| format!(" in SVM {s}")).unwrap_or_default();
    let mut summary = format!("Volumes on {}{scope} ({}):\n", target.label, volumes.len());
    for v in &volumes {
        summary.push_str(&volume_line(v));
        summary.push('\n');
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), volumes))
}

async fn get_volume_configuration(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    let volume = target
        .client
        .get_volume(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to get volume"))?;

    let mut summary = format!("Volume {} on {}\n{}", volume.name, target.label, volume_line(&volume));
    if let Some(nas) = &volume.nas {
        if let Some(style) = &nas.security_style {
            summary.push_str(&format!("\nSecurity style: {style}"));
        }
        if let Some(path) = &nas.path {
            summary.push_str(&format!("\nJunction path: {path}"));
        }
        if let Some(policy) = &nas.export_policy {
            summary.push_str(&format!("\nExport policy: {}", policy.name));
        }
    }
    if let Some(policy) = volume.qos.as_ref().and_then(|q| q.policy.as_ref()) {
        summary.push_str(&format!("\nQoS policy: {}", policy.name));
    }
    if let Some(policy) = &volume.snapshot_policy {
        summary.push_str(&format!("\nSnapshot policy: {}", policy.name));
    }
    Ok(CallToolResult::hybrid(summary, vec![volume]))
}

fn breakdown(label: &str, m: &MetricBreakdown, format: impl Fn(i64) -> String) -> String {
    format!(
        "{label}: total {} (read {}, write {}, other {})",
        format(m.total),
        format(m.read),
        format(m.write),
        format(m.other)
    )
}

fn stats_summary(volume: &Volume, cluster: &str) -> String {
    let mut lines = vec![format!("Volume {} on {} ({})", volume.name, cluster, volume.state)];
    if let Some(space) = &volume.space {
        let percent = if space.size > 0 {
            space.used as f64 * 100.0 / space.size as f64
        } else {
            0.0
        };
        lines.push(format!(
            "Space: {} used of {} ({percent:.1}%), {} available",
            format_bytes(space.used),
            format_bytes(space.size),
            format_bytes(space.available)
        ));
    }
    let Some(metric) = &volume.metric else {
        lines.push("No performance sample available".to_string());
        return lines.join("\n");
    };
    if let Some(ts) = &metric.timestamp {
        let status = metric.status.as_deref().unwrap_or("unknown");
        lines.push(format!("Sample: {ts} (status {status})"));
    }
    if let Some(iops) = &metric.iops {
        lines.push(breakdown("IOPS", iops, |v| v.to_string()));
    }
    if let Some(throughput) = &metric.throughput {
        lines.push(breakdown("Throughput", throughput, |v| format!("{}/s", format_bytes(v))));
    }
    if let Some(latency) = &metric.latency {
        lines.push(breakdown("Latency", latency, |v| format!("{v}µs")));
    }
    lines.join("\n")
}

async fn volume_stats(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    let volume = target
        .client
        .volume_stats(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to get volume statistics"))?;
    Ok(CallToolResult::hybrid(stats_summary(&volume, &target.label), vec![volume]))
}

async fn create_volume(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("volume_name")?;
    let size = args
        .size("size")?
        .ok_or_else(|| ToolError::InvalidParameter("missing required parameter: size".into()))?;
    let security_style = one_of(&args, "security_style", &SECURITY_STYLES)?;

    let mut body = json!({
        "name": name,
        "svm": {"name": svm},
        "size": size,
    });
    if let Some(aggr) = args.str("aggregate_name")? {
        body["aggregates"] = json!([{ "name": aggr }]);
    }
    let mut nas = Map::new();
    if let Some(style) = security_style {
        nas.insert("security_style".into(), json!(style));
    }
    if let Some(path) = args.str("junction_path")? {
        nas.insert("path".into(), json!(path));
    }
    if let Some(policy) = args.str("export_policy")? {
        nas.insert("export_policy".into(), json!({ "name": policy }));
    }
    if !nas.is_empty() {
        body["nas"] = Value::Object(nas);
    }
    if let Some(policy) = args.str("qos_policy")? {
        body["qos"] = json!({"policy": {"name": policy}});
    }
    if let Some(policy) = args.str("snapshot_policy")? {
        body["snapshot_policy"] = json!({ "name": policy });
    }
    if let Some(comment) = args.str("comment")? {
        body["comment"] = json!(comment);
    }

    let target = resolve_client(&ctx, &args).await?;
    let created = target
        .client
        .create_volume(&ctx.cancel, &body)
        .await
        .map_err(ToolError::client("Failed to create volume"))?;

    info!(cluster = %target.label, svm, volume = name, "Volume created");
    Ok(CallToolResult::text(format!(
        "Volume '{name}' created in SVM '{svm}' on {} ({}), uuid {}",
        target.label,
        format_bytes(size),
        created.uuid
    )))
}

async fn update_volume(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let mut body = Map::new();
    let mut changes = Vec::new();

    if let Some(size) = args.size("new_size")? {
        body.insert("size".into(), json!(size));
        changes.push(format!("size → {}", format_bytes(size)));
    }
    if let Some(name) = args.str("new_name")? {
        body.insert("name".into(), json!(name));
        changes.push(format!("name → {name}"));
    }
    if let Some(state) = one_of(&args, "state", &VOLUME_STATES)? {
        changes.push(format!("state → {state}"));
        body.insert("state".into(), json!(state));
    }
    if let Some(comment) = args.str("comment")? {
        body.insert("comment".into(), json!(comment));
        changes.push("comment updated".to_string());
    }
    let mut nas = Map::new();
    if let Some(style) = one_of(&args, "security_style", &SECURITY_STYLES)? {
        changes.push(format!("security style → {style}"));
        nas.insert("security_style".into(), json!(style));
    }
    if let Some(policy) = args.str("export_policy")? {
        nas.insert("export_policy".into(), json!({ "name": policy }));
        changes.push(format!("export policy → {policy}"));
    }
    if !nas.is_empty() {
        body.insert("nas".into(), Value::Object(nas));
    }
    if let Some(policy) = args.str("qos_policy")? {
        body.insert("qos".into(), json!({ "policy": { "name": policy } }));
        changes.push(format!("QoS policy → {policy}"));
    }
    if let Some(policy) = args.str("snapshot_policy")? {
        body.insert("snapshot_policy".into(), json!({ "name": policy }));
        changes.push(format!("snapshot policy → {policy}"));
    }
    if body.is_empty() {
        return Err(ToolError::InvalidParameter(
            "no updates specified".to_string(),
        ));
    }

    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .update_volume(&ctx.cancel, &uuid, &Value::Object(body))
        .await
        .map_err(ToolError::client("Failed to update volume"))?;

    Ok(CallToolResult::text(format!(
        "Volume {uuid} on {} updated: {}",
        target.label,
        changes.join(", ")
    )))
}

async fn delete_volume(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;

    target
        .client
        .update_volume(&ctx.cancel, &uuid, &offline_body())
        .await
        .map_err(ToolError::client("Failed to take volume offline"))?;
    target
        .client
        .delete_volume(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to delete volume"))?;

    info!(cluster = %target.label, volume = %uuid, "Volume deleted");
    Ok(CallToolResult::text(format!(
        "Volume {uuid} taken offline and deleted on {}",
        target.label
    )))
}

async fn autosize_status(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    let volume = target
        .client
        .volume_autosize(&ctx.cancel, &uuid)
        .await
        .map_err(ToolError::client("Failed to get volume autosize"))?;

    let autosize = volume.autosize.clone().unwrap_or_default();
    let mode = if autosize.mode.is_empty() {
        "off"
    } else {
        autosize.mode.as_str()
    };
    let mut summary = format!("Autosize for volume {}: mode {mode}", volume.name);
    if let Some(max) = autosize.maximum {
        summary.push_str(&format!("\nMaximum: {}", format_bytes(max)));
    }
    if let Some(min) = autosize.minimum {
        summary.push_str(&format!("\nMinimum: {}", format_bytes(min)));
    }
    if let Some(grow) = autosize.grow_threshold {
        summary.push_str(&format!("\nGrow threshold: {grow}%"));
    }
    if let Some(shrink) = autosize.shrink_threshold {
        summary.push_str(&format!("\nShrink threshold: {shrink}%"));
    }
    if let Some(space) = &volume.space {
        summary.push_str(&format!(
            "\nCurrent: {} used of {}",
            format_bytes(space.used),
            format_bytes(space.size)
        ));
    }
    Ok(CallToolResult::hybrid(summary, vec![volume]))
}

async fn enable_autosize(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let mode = one_of(&args, "mode", &AUTOSIZE_MODES)?
        .ok_or_else(|| ToolError::InvalidParameter("missing required parameter: mode".into()))?;

    let mut autosize = Map::new();
    autosize.insert("mode".into(), json!(mode));
    if let Some(max) = args.size("maximum_size")? {
        autosize.insert("maximum".into(), json!(max));
    }
    if let Some(min) = args.size("minimum_size")? {
        autosize.insert("minimum".into(), json!(min));
    }
    for (arg, field) in [
        ("grow_threshold_percent", "grow_threshold"),
        ("shrink_threshold_percent", "shrink_threshold"),
    ] {
        if let Some(pct) = args.i64(arg)? {
            if !(1..=100).contains(&pct) {
                return Err(ToolError::InvalidParameter(format!(
                    "{arg} must be between 1 and 100"
                )));
            }
            autosize.insert(field.into(), json!(pct));
        }
    }

    let target = resolve_client(&ctx, &args).await?;
    let uuid = volume_uuid(&target.client, &ctx.cancel, &args).await?;
    target
        .client
        .update_volume(&ctx.cancel, &uuid, &json!({ "autosize": autosize }))
        .await
        .map_err(ToolError::client("Failed to configure volume autosize"))?;

    Ok(CallToolResult::text(format!(
        "Autosize set to '{mode}' for volume {uuid} on {}",
        target.label
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::ClusterRegistry;
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        ToolContext {
            clusters: Arc::new(ClusterRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn args(value: Value) -> Arguments {
        Arguments::from_value(Some(value)).unwrap()
    }

    #[tokio::test]
    async fn update_without_changes_is_rejected() {
        let err = update_volume(ctx(), args(json!({"volume_uuid": "v1"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no updates"));
    }

    #[tokio::test]
    async fn create_validates_before_dispatch() {
        let err = create_volume(ctx(), args(json!({"svm_name": "svm1", "volume_name": "v1"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("size"));

        let err = create_volume(
            ctx(),
            args(json!({"svm_name": "svm1", "volume_name": "v1", "size": "10GB", "security_style": "posix"})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("security_style"));
    }

    #[tokio::test]
    async fn autosize_thresholds_are_bounded() {
        let err = enable_autosize(
            ctx(),
            args(json!({"volume_uuid": "v1", "mode": "grow", "grow_threshold_percent": 150})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("grow_threshold_percent"));
    }

    #[test]
    fn volume_schemas_include_both_selectors() {
        let s = with_volume_selector(json!({"mode": {"type": "string"}}), &["mode"]);
        assert!(s["properties"]["volume_uuid"].is_object());
        assert!(s["properties"]["cluster_name"].is_object());
        assert!(s["properties"]["mode"].is_object());
        assert_eq!(s["required"], json!(["mode"]));
    }

    #[test]
    fn stats_summary_reports_usage_and_latest_sample() {
        let volume: Volume = serde_json::from_value(json!({
            "name": "vol1",
            "state": "online",
            "space": {"size": 1073741824, "used": 268435456, "available": 805306368},
            "metric": {
                "timestamp": "2026-01-01T00:00:00Z",
                "status": "ok",
                "iops": {"read": 10, "write": 20, "other": 5, "total": 35},
                "latency": {"read": 150, "write": 300, "other": 0, "total": 230}
            }
        }))
        .unwrap();
        let text = stats_summary(&volume, "prod");
        assert!(text.contains("(25.0%)"), "{text}");
        assert!(text.contains("IOPS: total 35 (read 10, write 20, other 5)"));
        assert!(text.contains("Latency: total 230µs"));
        assert!(!text.contains("Throughput"));

        let idle = Volume { name: "vol2".into(), ..Default::default() };
        assert!(stats_summary(&idle, "prod").contains("No performance sample"));
    }
}
