//! Stdio MCP server used by the integration tests
//!
//! Reads newline-delimited JSON-RPC from stdin and answers on stdout.
//!
//! # Handled Methods
//!
//! - `initialize` -- protocol `2025-06-18`, capabilities `tools`,
//!   `resources` and `prompts`.
//! - `notifications/initialized` -- swallowed.
//! - `tools/list` -- `echo`, `add` and `confirm`.
//! - `tools/call`:
//!   - `echo` returns `arguments.message` as text;
//!   - `add` returns the sum of `arguments.a` and `arguments.b`;
//!   - `confirm` first sends an `elicitation/create` request to the client
//!     and answers the call with the returned action once the client replies;
//!   - `garble` writes one non-JSON line before its result.
//! - `resources/list`, `resources/read`, `resources/templates/list`,
//!   `prompts/list`, `prompts/get` -- small fixed data sets.
//! - Anything else -- `-32601 Method not found`.
//!
//! Every handled method is also logged to stderr.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

const ELICITATION_ID: &str = "elicit-1";

fn main() {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    // Id of a `confirm` call waiting on the client's elicitation answer.
    let mut awaiting_confirmation: Option<Value> = None;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                send(&mut out, &error(&Value::Null, -32700, "Parse error"));
                continue;
            }
        };

        // A reply from the client to our elicitation request.
        if message.get("method").is_none() {
            if message["id"] == ELICITATION_ID {
                if let Some(call_id) = awaiting_confirmation.take() {
                    let action = message["result"]["action"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("error {}", message["error"]["code"]));
                    send(&mut out, &text_result(&call_id, &format!("confirmation: {action}")));
                }
            }
            continue;
        }

        let method = message["method"].as_str().unwrap_or_default();
        eprintln!("mcp_test_server: {method}");
        if method.starts_with("notifications/") {
            continue;
        }

        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let response = match method {
            "initialize" => ok(
                &id,
                json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
                    "serverInfo": { "name": "mcp-test-server", "version": "0.2.0" }
                }),
            ),
            "tools/list" => ok(&id, tools()),
            "tools/call" => match params["name"].as_str().unwrap_or_default() {
                "echo" => text_result(&id, params["arguments"]["message"].as_str().unwrap_or_default()),
                "add" => {
                    let sum = params["arguments"]["a"].as_f64().unwrap_or(0.0)
                        + params["arguments"]["b"].as_f64().unwrap_or(0.0);
                    text_result(&id, &sum.to_string())
                }
                "confirm" => {
                    awaiting_confirmation = Some(id);
                    json!({
                        "jsonrpc": "2.0",
                        "id": ELICITATION_ID,
                        "method": "elicitation/create",
                        "params": {
                            "message": "Proceed?",
                            "requestedSchema": {
                                "type": "object",
                                "properties": { "ok": { "type": "boolean" } }
                            }
                        }
                    })
                }
                "garble" => {
                    let _ = writeln!(out, "this is not json");
                    text_result(&id, "after garbage")
                }
                other => error(&id, -32602, &format!("Unknown tool: {other}")),
            },
            "resources/list" => ok(
                &id,
                json!({
                    "resources": [
                        { "uri": "mem://greeting", "name": "greeting", "mimeType": "text/plain" }
                    ]
                }),
            ),
            "resources/read" => match params["uri"].as_str().unwrap_or_default() {
                "mem://greeting" => ok(
                    &id,
                    json!({ "contents": [{ "uri": "mem://greeting", "mimeType": "text/plain", "text": "hello" }] }),
                ),
                other => error(&id, -32002, &format!("Resource not found: {other}")),
            },
            "resources/templates/list" => ok(
                &id,
                json!({ "resourceTemplates": [{ "uriTemplate": "mem://{key}", "name": "memory" }] }),
            ),
            "prompts/list" => ok(
                &id,
                json!({
                    "prompts": [{
                        "name": "greet",
                        "description": "Greets someone",
                        "arguments": [{ "name": "name", "required": true }]
                    }]
                }),
            ),
            "prompts/get" => {
                let name = params["arguments"]["name"].as_str().unwrap_or("stranger");
                ok(
                    &id,
                    json!({
                        "messages": [{
                            "role": "user",
                            "content": { "type": "text", "text": format!("Say hello to {name}") }
                        }]
                    }),
                )
            }
            _ => error(&id, -32601, &format!("Method not found: {method}")),
        };

        if !send(&mut out, &response) {
            break;
        }
    }
}

fn tools() -> Value {
    json!({
        "tools": [
            {
                "name": "echo",
                "description": "Echoes input",
                "inputSchema": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } }
                }
            },
            {
                "name": "add",
                "description": "Adds two numbers",
                "inputSchema": {
                    "type": "object",
                    "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
                    "required": ["a", "b"]
                },
                "annotations": { "title": "Adder" }
            },
            {
                "name": "confirm",
                "description": "Asks the user before doing anything",
                "inputSchema": { "type": "object" }
            }
        ]
    })
}

fn send(out: &mut impl Write, message: &Value) -> bool {
    writeln!(out, "{message}").is_ok() && out.flush().is_ok()
}

fn ok(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn text_result(id: &Value, text: &str) -> Value {
    ok(id, json!({ "content": [{ "type": "text", "text": text }], "isError": false }))
}

fn error(id: &Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}
