//! Cluster registry tools and cluster-wide listings.

use serde_json::{json, Value};

use super::args::{format_bytes, resolve_client, schema, Arguments};
use super::{CallToolResult, ToolContext, ToolError, ToolRegistry};
use crate::config::ClusterConfig;

pub fn register(registry: &ToolRegistry) {
    registry.register(
        "list_registered_clusters",
        "List clusters registered with this server (or this session in HTTP mode).",
        json!({"type": "object", "properties": {}}),
        list_registered_clusters,
    );
    registry.register(
        "get_all_clusters_info",
        "Query every registered cluster and report its name, ONTAP version, UUID and reachability.",
        json!({"type": "object", "properties": {}}),
        get_all_clusters_info,
    );
    registry.register(
        "add_cluster",
        "Register an ONTAP cluster for later calls by name. Replaces an existing cluster with the same name.",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Unique cluster name"},
                "cluster_ip": {"type": "string", "description": "Management IP or hostname"},
                "username": {"type": "string", "description": "ONTAP username"},
                "password": {"type": "string", "description": "ONTAP password"},
                "description": {"type": "string", "description": "Free-form description"},
                "verify_ssl": {"type": "boolean", "description": "Verify the TLS certificate (default false)"}
            },
            "required": ["name", "cluster_ip", "username", "password"]
        }),
        add_cluster,
    );
    registry.register(
        "cluster_list_svms",
        "List storage virtual machines (SVMs) on a cluster.",
        schema(json!({}), &[]),
        list_svms,
    );
    registry.register(
        "cluster_list_aggregates",
        "List aggregates on a cluster with capacity usage.",
        schema(
            json!({"svm_name": {"type": "string", "description": "Only aggregates assigned to this SVM"}}),
            &[],
        ),
        list_aggregates,
    );
}

async fn list_registered_clusters(ctx: ToolContext, _args: Arguments) -> Result<CallToolResult, ToolError> {
    let configs = ctx.clusters.configs().await;
    if configs.is_empty() {
        return Ok(CallToolResult::hybrid(
            "No clusters registered. Use add_cluster or pass cluster_ip, username and password.",
            Vec::<Value>::new(),
        ));
    }

    let mut summary = format!("Registered clusters ({}):\n", configs.len());
    let data: Vec<Value> = configs
        .iter()
        .map(|c| {
            summary.push_str(&format!("- {} ({})", c.name, c.cluster_ip));
            if let Some(desc) = &c.description {
                summary.push_str(&format!(": {desc}"));
            }
            summary.push('\n');
            json!({
                "name": c.name,
                "cluster_ip": c.cluster_ip,
                "description": c.description,
                "verify_ssl": c.verify_ssl,
            })
        })
        .collect();
    Ok(CallToolResult::hybrid(summary.trim_end(), data))
}

async fn get_all_clusters_info(ctx: ToolContext, _args: Arguments) -> Result<CallToolResult, ToolError> {
    let results = ctx.clusters.check_all(&ctx.cancel).await;
    if results.is_empty() {
        return Ok(CallToolResult::hybrid("No clusters registered.", Vec::<Value>::new()));
    }

    let reachable = results.iter().filter(|r| r.outcome.is_ok()).count();
    let mut summary = format!("{reachable}/{} clusters reachable\n", results.len());
    let data: Vec<Value> = results
        .into_iter()
        .map(|r| match r.outcome {
            Ok(info) => {
                summary.push_str(&format!(
                    "- {}: online, ONTAP {} (cluster {})\n",
                    r.name, info.version.full, info.name
                ));
                json!({
                    "name": r.name,
                    "status": "online",
                    "cluster_name": info.name,
                    "uuid": info.uuid,
                    "version": info.version.full,
                })
            }
            Err(e) => {
                summary.push_str(&format!("- {}: error: {e}\n", r.name));
                json!({"name": r.name, "status": "error", "error": e.to_string()})
            }
        })
        .collect();
    Ok(CallToolResult::hybrid(summary.trim_end(), data))
}

async fn add_cluster(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let config = ClusterConfig {
        name: args.required_str("name")?.to_string(),
        cluster_ip: args.required_str("cluster_ip")?.to_string(),
        username: args.required_str("username")?.to_string(),
        password: args.required_str("password")?.to_string(),
        description: args.str("description")?.map(str::to_string),
        verify_ssl: args.bool("verify_ssl")?.unwrap_or(false),
    };
    let name = config.name.clone();
    let ip = config.cluster_ip.clone();

    let replaced = ctx
        .clusters
        .add(config)
        .await
        .map_err(ToolError::client("Failed to add cluster"))?;

    Ok(CallToolResult::text(if replaced {
        format!("Cluster '{name}' ({ip}) updated; the previous registration was replaced.")
    } else {
        format!("Cluster '{name}' ({ip}) added.")
    }))
}

async fn list_svms(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let svms = target
        .client
        .list_svms(&ctx.cancel)
        .await
        .map_err(ToolError::client("Failed to list SVMs"))?;

    let mut summary = format!("SVMs on {} ({}):\n", target.label, svms.len());
    for svm in &svms {
        summary.push_str(&format!("- {} [{}] uuid={}\n", svm.name, svm.state, svm.uuid));
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), svms))
}

async fn list_aggregates(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let svm = args.str("svm_name")?;
    let aggregates = target
        .client
        .list_aggregates(&ctx.cancel, svm)
        .await
        .map_err(ToolError::client("Failed to list aggregates"))?;

    let mut summary = format!("Aggregates on {} ({}):\n", target.label, aggregates.len());
    for aggr in &aggregates {
        summary.push_str(&format!("- {} [{}]", aggr.name, aggr.state));
        if let Some(space) = &aggr.space {
            let bs = &space.block_storage;
            summary.push_str(&format!(
                ": {} available of {}",
                format_bytes(bs.available),
                format_bytes(bs.size)
            ));
        }
        summary.push('\n');
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), aggregates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::ClusterRegistry;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

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
    async fn add_then_list() {
        let ctx = ctx();
        let added = add_cluster(
            ctx.clone(),
            args(json!({"name": "c1", "cluster_ip": "10.0.0.1", "username": "u", "password": "secret", "description": "lab"})),
        )
        .await
        .unwrap();
        assert!(added.first_text().unwrap().contains("'c1'"));

        let listed = list_registered_clusters(ctx.clone(), Arguments::default())
            .await
            .unwrap();
        let text = listed.first_text().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["data"][0]["name"], "c1");
        assert_eq!(body["data"][0]["description"], "lab");
        assert!(!text.contains("secret"));
    }

    #[tokio::test]
    async fn add_reports_overwrite() {
        let ctx = ctx();
        let a = json!({"name": "c1", "cluster_ip": "10.0.0.1", "username": "u", "password": "p"});
        add_cluster(ctx.clone(), args(a)).await.unwrap();
        let b = json!({"name": "c1", "cluster_ip": "10.0.0.2", "username": "u", "password": "p"});
        let out = add_cluster(ctx.clone(), args(b)).await.unwrap();
        assert!(out.first_text().unwrap().contains("replaced"));
        assert_eq!(ctx.clusters.len().await, 1);
    }

    #[tokio::test]
    async fn add_requires_every_identity_field() {
        let err = add_cluster(ctx(), args(json!({"name": "c1", "cluster_ip": "10.0.0.1", "username": "u"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[tokio::test]
    async fn empty_registry_lists_nothing() {
        let out = list_registered_clusters(ctx(), Arguments::default()).await.unwrap();
        let body: Value = serde_json::from_str(out.first_text().unwrap()).unwrap();
        assert_eq!(body["data"], json!([]));
    }
}
