//! CIFS/SMB share tools.

use serde_json::{json, Map, Value};
use tracing::info;

use super::args::{resolve_client, schema, Arguments};
use super::{CallToolResult, ToolContext, ToolError, ToolRegistry};
use crate::api::CifsShare;

const PERMISSIONS: [&str; 4] = ["no_access", "read", "change", "full_control"];
const OFFLINE_FILES: [&str; 4] = ["none", "manual", "documents", "programs"];
const SHARE_FLAGS: [&str; 3] = ["access_based_enumeration", "encryption", "oplocks"];

fn acl_schema() -> Value {
    json!({
        "type": "array",
        "description": "Access control entries",
        "items": {
            "type": "object",
            "properties": {
                "user_or_group": {"type": "string"},
                "permission": {"type": "string", "enum": PERMISSIONS},
                "type": {"type": "string", "enum": ["windows", "unix_user", "unix_group"]}
            },
            "required": ["user_or_group", "permission"]
        }
    })
}

pub fn register(registry: &ToolRegistry) {
    registry.register(
        "list_cifs_shares",
        "List CIFS/SMB shares, optionally for one SVM or matching a share name.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "share_name": {"type": "string", "description": "Only shares with this name"}
            }),
            &[],
        ),
        list_cifs_shares,
    );
    registry.register(
        "create_cifs_share",
        "Create a CIFS/SMB share on a path, optionally with access control entries.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "share_name": {"type": "string"},
                "path": {"type": "string", "description": "Junction path of the shared directory, e.g. /vol1"},
                "comment": {"type": "string"},
                "acls": acl_schema()
            }),
            &["svm_name", "share_name", "path"],
        ),
        create_cifs_share,
    );
    registry.register(
        "get_cifs_share",
        "Show one CIFS/SMB share with its ACL and share properties.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "share_name": {"type": "string"}
            }),
            &["svm_name", "share_name"],
        ),
        get_cifs_share,
    );
    registry.register(
        "update_cifs_share",
        "Change a CIFS/SMB share's comment, ACL or properties. A given ACL replaces the existing one.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "share_name": {"type": "string"},
                "comment": {"type": "string"},
                "acls": acl_schema(),
                "access_based_enumeration": {"type": "boolean"},
                "encryption": {"type": "boolean", "description": "Require SMB3 encryption"},
                "oplocks": {"type": "boolean"},
                "offline_files": {"type": "string", "enum": OFFLINE_FILES}
            }),
            &["svm_name", "share_name"],
        ),
        update_cifs_share,
    );
    registry.register(
        "delete_cifs_share",
        "Delete a CIFS/SMB share. Data in the shared path is not affected.",
        schema(
            json!({
                "svm_name": {"type": "string"},
                "share_name": {"type": "string"}
            }),
            &["svm_name", "share_name"],
        ),
        delete_cifs_share,
    );
}

async fn list_cifs_shares(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let target = resolve_client(&ctx, &args).await?;
    let shares = target
        .client
        .list_cifs_shares(&ctx.cancel, args.str("svm_name")?, args.str("share_name")?)
        .await
        .map_err(ToolError::client("Failed to list CIFS shares"))?;

    let mut summary = format!("CIFS shares on {} ({}):\n", target.label, shares.len());
    for s in &shares {
        summary.push_str(&format!("- {} → {}", s.name, s.path));
        if let Some(svm) = &s.svm {
            summary.push_str(&format!(" svm={}", svm.name));
        }
        if !s.acls.is_empty() {
            let acls: Vec<String> = s
                .acls
                .iter()
                .map(|a| format!("{}:{}", a.user_or_group, a.permission))
                .collect();
            summary.push_str(&format!(" acl=[{}]", acls.join(", ")));
        }
        summary.push('\n');
    }
    Ok(CallToolResult::hybrid(summary.trim_end(), shares))
}

fn parse_acls(args: &Arguments) -> Result<Option<Vec<Value>>, ToolError> {
    let Some(raw) = args.object_list("acls")? else {
        return Ok(None);
    };
    raw.into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry = Arguments::from(entry);
            let who = entry
                .str("user_or_group")?
                .ok_or_else(|| ToolError::InvalidParameter(format!("acls[{i}].user_or_group is required")))?;
            let permission = entry
                .str("permission")?
                .ok_or_else(|| ToolError::InvalidParameter(format!("acls[{i}].permission is required")))?;
            if !PERMISSIONS.contains(&permission) {
                return Err(ToolError::InvalidParameter(format!(
                    "acls[{i}].permission must be one of {}",
                    PERMISSIONS.join(", ")
                )));
            }
            let mut acl = json!({ "user_or_group": who, "permission": permission });
            if let Some(kind) = entry.str("type")? {
                acl["type"] = json!(kind);
            }
            Ok(acl)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

async fn create_cifs_share(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("share_name")?;
    let path = args.required_str("path")?;

    let mut body = json!({ "name": name, "path": path, "svm": { "name": svm } });
    if let Some(comment) = args.str("comment")? {
        body["comment"] = json!(comment);
    }
    if let Some(acls) = parse_acls(&args)? {
        body["acls"] = Value::Array(acls);
    }

    let target = resolve_client(&ctx, &args).await?;
    target
        .client
        .create_cifs_share(&ctx.cancel, &body)
        .await
        .map_err(ToolError::client("Failed to create CIFS share"))?;

    info!(cluster = %target.label, svm, share = name, "CIFS share created");
    Ok(CallToolResult::text(format!(
        "CIFS share '{name}' created for {path} in SVM '{svm}' on {}",
        target.label
    )))
}

fn describe_share(share: &CifsShare) -> String {
    let mut lines = vec![format!("Share {} → {}", share.name, share.path)];
    if let Some(svm) = &share.svm {
        lines.push(format!("SVM: {}", svm.name));
    }
    if let Some(comment) = &share.comment {
        lines.push(format!("Comment: {comment}"));
    }
    let flags: Vec<String> = [
        ("access_based_enumeration", share.access_based_enumeration),
        ("encryption", share.encryption),
        ("oplocks", share.oplocks),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| format!("{name}={v}")))
    .collect();
    if !flags.is_empty() {
        lines.push(format!("Properties: {}", flags.join(" ")));
    }
    if let Some(offline) = &share.offline_files {
        lines.push(format!("Offline files: {offline}"));
    }
    if share.acls.is_empty() {
        lines.push("ACL: none".to_string());
    }
    for acl in &share.acls {
        lines.push(format!("ACL: {} {}", acl.user_or_group, acl.permission));
    }
    lines.join("\n")
}

async fn get_cifs_share(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("share_name")?;
    let target = resolve_client(&ctx, &args).await?;
    let share = target
        .client
        .get_cifs_share(&ctx.cancel, svm, name)
        .await
        .map_err(ToolError::client("Failed to get CIFS share"))?
        .ok_or_else(|| ToolError::Failed(format!("CIFS share '{name}' not found in SVM '{svm}'")))?;
    Ok(CallToolResult::hybrid(describe_share(&share), vec![share]))
}

fn build_share_update(args: &Arguments) -> Result<Value, ToolError> {
    let mut body = Map::new();
    if let Some(comment) = args.str("comment")? {
        body.insert("comment".into(), json!(comment));
    }
    if let Some(acls) = parse_acls(args)? {
        body.insert("acls".into(), Value::Array(acls));
    }
    for key in SHARE_FLAGS {
        if let Some(v) = args.bool(key)? {
            body.insert(key.into(), json!(v));
        }
    }
    if let Some(offline) = args.str("offline_files")? {
        if !OFFLINE_FILES.contains(&offline) {
            return Err(ToolError::InvalidParameter(format!(
                "offline_files must be one of {}",
                OFFLINE_FILES.join(", ")
            )));
        }
        body.insert("offline_files".into(), json!(offline));
    }
    if body.is_empty() {
        return Err(ToolError::InvalidParameter("no updates specified".to_string()));
    }
    Ok(Value::Object(body))
}

async fn update_cifs_share(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("share_name")?;
    let body = build_share_update(&args)?;
    let target = resolve_client(&ctx, &args).await?;
    target
        .client
        .update_cifs_share(&ctx.cancel, svm, name, &body)
        .await
        .map_err(ToolError::client("Failed to update CIFS share"))?;

    info!(cluster = %target.label, svm, share = name, "CIFS share updated");
    Ok(CallToolResult::text(format!(
        "CIFS share '{name}' in SVM '{svm}' updated on {}",
        target.label
    )))
}

async fn delete_cifs_share(ctx: ToolContext, args: Arguments) -> Result<CallToolResult, ToolError> {
    let svm = args.required_str("svm_name")?;
    let name = args.required_str("share_name")?;
    let target = resolve_client(&ctx, &args).await?;
    target
        .client
        .delete_cifs_share(&ctx.cancel, svm, name)
        .await
        .map_err(ToolError::client("Failed to delete CIFS share"))?;

    info!(cluster = %target.label, svm, share = name, "CIFS share deleted");
    Ok(CallToolResult::text(format!(
        "CIFS share '{name}' deleted from SVM '{svm}' on {}",
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
    fn acls_are_validated() {
        let ok = parse_acls(&args(json!({
            "acls": [{"user_or_group": "Everyone", "permission": "read"}]
        })))
        .unwrap()
        .unwrap();
        assert_eq!(ok[0]["permission"], "read");

        let err = parse_acls(&args(json!({
            "acls": [{"user_or_group": "Everyone", "permission": "write"}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("acls[0].permission"));

        let err = parse_acls(&args(json!({"acls": ["Everyone"]}))).unwrap_err();
        assert!(err.to_string().contains("acls[0]"));

        assert!(parse_acls(&Arguments::default()).unwrap().is_none());
    }

    #[test]
    fn share_update_body() {
        let body = build_share_update(&args(json!({
            "comment": "finance",
            "encryption": true,
            "offline_files": "manual",
            "acls": [{"user_or_group": "FIN\\users", "permission": "change"}]
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "comment": "finance",
                "encryption": true,
                "offline_files": "manual",
                "acls": [{"user_or_group": "FIN\\users", "permission": "change"}]
            })
        );

        let err = build_share_update(&args(json!({"offline_files": "always"}))).unwrap_err();
        assert!(err.to_string().contains("offline_files"));
        assert!(build_share_update(&Arguments::default()).is_err());
    }

    #[test]
    fn share_description_lists_properties_and_acl() {
        let share: CifsShare = serde_json::from_value(json!({
            "name": "data",
            "path": "/vol1",
            "oplocks": true,
            "acls": [{"user_or_group": "Everyone", "permission": "read"}]
        }))
        .unwrap();
        let text = describe_share(&share);
        assert!(text.contains("Share data → /vol1"));
        assert!(text.contains("Properties: oplocks=true"));
        assert!(text.contains("ACL: Everyone read"));
    }
}
