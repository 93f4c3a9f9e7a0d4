//! Line-delimited JSON-RPC over standard streams.
//!
//! One request per input line, one response per output line, flushed after
//! every write. Requests are handled one at a time, so responses come out in
//! the order requests were read. EOF ends the loop cleanly; cancellation ends
//! it after the in-flight request completes.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clusters::ClusterRegistry;
use crate::mcp::McpServer;
use crate::rpc::Response;

/// Run the stdio transport on the process's stdin/stdout.
pub async fn run_stdio(
    server: Arc<McpServer>,
    clusters: Arc<ClusterRegistry>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    info!("Serving MCP on stdio");
    serve(&server, &clusters, reader, writer, &cancel).await
}

/// Serve requests from `reader`, writing responses to `writer`.
pub async fn serve<R, W>(
    server: &McpServer,
    clusters: &Arc<ClusterRegistry>,
    mut reader: R,
    mut writer: W,
    cancel: &CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        // Raw bytes: a line that is not UTF-8 gets a parse error, not an I/O error.
        let read = tokio::select! {
            () = cancel.cancelled() => {
                debug!("stdio transport cancelled");
                break;
            }
            read = reader.read_until(b'\n', &mut line) => read,
        };
        match read {
            Ok(0) => {
                debug!("stdin closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("stdin read error: {e}");
                return Err(e);
            }
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        // Not tied to `cancel`: a request already read runs to completion.
        let request_cancel = CancellationToken::new();
        if let Some(response) = server.handle_message(trimmed, clusters, &request_cancel).await {
            write_response(&mut writer, &response).await?;
        }
    }

    Ok(())
}

/// Write one response as a single line and flush.
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> std::io::Result<()> {
    let mut output = serde_json::to_string(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    output.push('\n');
    writer.write_all(output.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use serde_json::Value;

    async fn run(input: &str) -> Vec<Value> {
        let server = McpServer::new(Arc::new(ToolRegistry::new()));
        let clusters = Arc::new(ClusterRegistry::new());
        let mut out = Vec::new();
        serve(
            &server,
            &clusters,
            input.as_bytes(),
            &mut out,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn blank_lines_and_notifications_are_silent() {
        let out = run("\n  \n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn responses_follow_request_order() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":\"a\",\"method\":\"ping\"}\n",
            "not json\n",
            "{\"jsonrpc\":\"2.0\",\"id\":\"b\",\"method\":\"ping\"}"
        );
        let out = run(input).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["id"], "a");
        assert_eq!(out[1]["id"], Value::Null);
        assert_eq!(out[1]["error"]["code"], -32700);
        assert_eq!(out[2]["id"], "b");
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_a_parse_error() {
        let server = McpServer::new(Arc::new(ToolRegistry::new()));
        let clusters = Arc::new(ClusterRegistry::new());
        let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\xff\xfe garbage\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let mut out = Vec::new();
        serve(&server, &clusters, input, &mut out, &CancellationToken::new())
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], Value::Null);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert_eq!(lines[2]["id"], 2);
    }

    #[tokio::test]
    async fn cancelled_loop_returns() {
        let server = McpServer::new(Arc::new(ToolRegistry::new()));
        let clusters = Arc::new(ClusterRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        // A reader that never yields a line.
        let (_keep_open, pending) = tokio::io::duplex(64);
        let mut out = Vec::new();
        serve(&server, &clusters, BufReader::new(pending), &mut out, &cancel)
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
