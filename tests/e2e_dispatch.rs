//! Dual-mode client selection and error surfacing, end to end against a fake cluster.

mod common;

use std::sync::Arc;

use ontap_mcp::rpc::{INTERNAL_ERROR, METHOD_NOT_FOUND};
use ontap_mcp::tools::{register_all, ToolError};
use ontap_mcp::{default_registry, CallToolResult, ClusterRegistry, McpServer, ToolRegistry};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use common::{result_text, tool_call, FakeOntap};

async fn call(server: &McpServer, clusters: &Arc<ClusterRegistry>, message: Value) -> Value {
    let response = server
        .handle_message(&message.to_string(), clusters, &CancellationToken::new())
        .await
        .expect("response");
    serde_json::to_value(response).unwrap()
}

fn server() -> McpServer {
    McpServer::new(Arc::new(default_registry()))
}

#[tokio::test]
async fn direct_mode_reaches_the_cluster_without_registration() {
    let fake = FakeOntap::start().await;
    let clusters = Arc::new(ClusterRegistry::new());

    let resp = call(
        &server(),
        &clusters,
        tool_call(
            1,
            "cluster_list_svms",
            json!({"cluster_ip": fake.cluster_ip, "username": "u", "password": "p"}),
        ),
    )
    .await;

    assert!(resp.get("error").is_none(), "{resp}");
    assert_eq!(resp["result"]["isError"], false);
    assert!(result_text(&resp).contains("vs0"));
    assert_eq!(fake.hit_paths(), vec!["/api/svm/svms".to_string()]);
    // Ephemeral clients are never registered.
    assert!(clusters.is_empty().await);
}

#[tokio::test]
async fn sole_cluster_is_used_without_selector() {
    let fake = FakeOntap::start().await;
    let clusters = Arc::new(ClusterRegistry::new());
    let s = server();

    call(&s, &clusters, tool_call(1, "add_cluster", fake.cluster_entry("c1"))).await;
    let resp = call(&s, &clusters, tool_call(2, "cluster_list_volumes", json!({}))).await;

    assert_eq!(resp["result"]["isError"], false, "{resp}");
    let body: Value = serde_json::from_str(&result_text(&resp)).unwrap();
    assert!(body["summary"].as_str().unwrap().contains("c1"));
    assert_eq!(body["data"][0]["name"], "vol1");
    assert_eq!(fake.hit_paths(), vec!["/api/storage/volumes".to_string()]);
}

#[tokio::test]
async fn ambiguous_selection_is_invalid_parameter() {
    let clusters = Arc::new(ClusterRegistry::new());
    let s = server();

    let none = call(&s, &clusters, tool_call(1, "cluster_list_svms", json!({}))).await;
    assert_eq!(none["result"]["isError"], true);
    assert!(result_text(&none).contains("must provide cluster_name or cluster_ip+username+password"));

    for name in ["a", "b"] {
        call(
            &s,
            &clusters,
            tool_call(
                2,
                "add_cluster",
                json!({"name": name, "cluster_ip": "10.0.0.1", "username": "u", "password": "p"}),
            ),
        )
        .await;
    }
    let two = call(&s, &clusters, tool_call(3, "cluster_list_svms", json!({}))).await;
    assert_eq!(two["result"]["isError"], true);
    assert!(result_text(&two).contains("must provide cluster_name"));
}

#[tokio::test]
async fn unauthorized_is_a_tool_error() {
    let fake = FakeOntap::start().await;
    fake.fail_with(401);
    let clusters = Arc::new(ClusterRegistry::new());
    let s = server();

    call(&s, &clusters, tool_call(1, "add_cluster", fake.cluster_entry("c1"))).await;
    let resp = call(&s, &clusters, tool_call(2, "cluster_list_volumes", json!({"cluster_name": "c1"}))).await;

    assert!(resp.get("error").is_none());
    assert_eq!(resp["result"]["isError"], true);
    let text = result_text(&resp);
    assert!(text.starts_with("Error: "), "{text}");
    assert!(text.contains("HTTP 401") && text.contains("Unauthorized"), "{text}");
}

#[tokio::test]
async fn api_errors_carry_the_status_code() {
    let fake = FakeOntap::start().await;
    fake.fail_with(500);
    let clusters = Arc::new(ClusterRegistry::new());

    let resp = call(
        &server(),
        &clusters,
        tool_call(1, "get_all_clusters_info", json!({})),
    )
    .await;
    // Nothing registered yet: no cluster contacted.
    assert!(fake.hits().is_empty());
    assert_eq!(resp["result"]["isError"], false);

    let resp = call(
        &server(),
        &clusters,
        tool_call(
            2,
            "cluster_list_svms",
            json!({"cluster_ip": fake.cluster_ip, "username": "u", "password": "p"}),
        ),
    )
    .await;
    assert_eq!(resp["result"]["isError"], true);
    assert!(result_text(&resp).contains("HTTP 500"));
}

#[tokio::test]
async fn unreachable_cluster_reports_connection_failure() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let resp = call(
        &server(),
        &Arc::new(ClusterRegistry::new()),
        tool_call(
            1,
            "cluster_list_svms",
            json!({"cluster_ip": format!("http://{addr}"), "username": "u", "password": "p"}),
        ),
    )
    .await;
    assert_eq!(resp["result"]["isError"], true);
    assert!(result_text(&resp).contains("Failed to list SVMs"));
}

#[tokio::test]
async fn unknown_tool_is_method_not_found() {
    let resp = call(
        &server(),
        &Arc::new(ClusterRegistry::new()),
        tool_call(1, "cluster_format_everything", json!({})),
    )
    .await;
    assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    assert!(resp.get("result").is_none());
}

#[tokio::test]
async fn panicking_tool_does_not_take_the_server_down() {
    let tools = ToolRegistry::new();
    register_all(&tools);
    tools.register("crash", "always panics", json!({"type": "object"}), |_, args| async move {
        let pick = args.str("pick")?.unwrap_or("missing").to_string();
        let choices: Vec<CallToolResult> = Vec::new();
        let chosen = choices
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("no result for {pick}"));
        Ok::<_, ToolError>(chosen)
    });
    let s = McpServer::new(Arc::new(tools));
    let clusters = Arc::new(ClusterRegistry::new());

    let resp = call(&s, &clusters, tool_call(1, "crash", json!({}))).await;
    assert_eq!(resp["error"]["code"], INTERNAL_ERROR);
    assert_eq!(resp["id"], 1);

    let resp = call(&s, &clusters, tool_call(2, "list_registered_clusters", json!({}))).await;
    assert_eq!(resp["result"]["isError"], false);
}
