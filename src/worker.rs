//! Runs one dispatched request to completion inside a leased worker.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::locator;
use crate::params::{self, ParamValue};
use crate::pool::WorkerLease;
use crate::response::ResponseState;
use crate::sandbox::{Sandbox, Value};
use crate::template;

/// Per-request execution deadline around template execution. The DSL has no loop
/// construct and no user-defined recursion, so this exists as a backstop against a future
/// pathological fragment rather than a limit expected to fire in practice.
const EXECUTION_DEADLINE: Duration = Duration::from_secs(30);

/// Executes the dispatched request against `socket`, then writes the response and returns.
/// `_lease` is held purely for its lifetime: dropping it at the end of this function
/// releases the worker back to the pool.
pub async fn handle_request(
    _lease: WorkerLease,
    mut socket: TcpStream,
    headers: HashMap<String, String>,
    body: BytesMut,
    script_path: String,
) {
    let base = locator::base_dir(&script_path, &headers);

    let template_path = match locator::locate(&base, &headers).await {
        Ok(path) => path,
        Err(e) => {
            let mut response = ResponseState::new();
            response.set_error_page("404 Not found", &e.to_string());
            if let Some(wire) = response.finalize() {
                write_response(&mut socket, &wire).await;
            }
            return;
        }
    };

    let source = match tokio::fs::read_to_string(&template_path).await {
        Ok(s) => s,
        Err(e) => {
            let mut response = ResponseState::new();
            response.set_error_page(
                "500 Internal server error",
                &format!("could not read {}: {}", template_path.display(), e),
            );
            if let Some(wire) = response.finalize() {
                write_response(&mut socket, &wire).await;
            }
            return;
        }
    };

    let script_dir = template_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base.clone());

    let params_value = Value::Map(
        params::extract_params(&headers, &body)
            .into_iter()
            .map(|(k, v)| (k, param_value_to_value(v)))
            .collect(),
    );
    let headers_value = Value::Map(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
            .collect(),
    );
    let body_value = Value::Str(String::from_utf8_lossy(&body).into_owned());

    let mut response = ResponseState::new();
    let path_display = template_path.display().to_string();

    let outcome = tokio::time::timeout(EXECUTION_DEADLINE, async {
        let mut sandbox = Sandbox::new(
            params_value,
            headers_value,
            body_value,
            &mut response,
            script_dir,
        );
        template::run(&path_display, &source, &mut sandbox);
        sandbox.take_pending_write().or_else(|| sandbox.finalize())
    })
    .await;

    let wire = match outcome {
        Ok(wire) => wire,
        Err(_) => {
            tracing::warn!(path = %path_display, "template execution exceeded its deadline");
            response.set_error_page("500 Internal server error", "template execution timed out");
            response.finalize()
        }
    };

    if let Some(wire) = wire {
        write_response(&mut socket, &wire).await;
    }
}

async fn write_response(socket: &mut TcpStream, wire: &[u8]) {
    if let Err(e) = socket.write_all(wire).await {
        tracing::debug!(error = %e, "failed writing response to client");
    }
}

fn param_value_to_value(value: ParamValue) -> Value {
    match value {
        ParamValue::Text(s) => Value::Str(s),
        ParamValue::File {
            value,
            filename,
            content_type,
        } => Value::Map(vec![
            (
                "value".to_string(),
                Value::Str(String::from_utf8_lossy(&value).into_owned()),
            ),
            (
                "filename".to_string(),
                filename.map(Value::Str).unwrap_or(Value::Nil),
            ),
            (
                "content_type".to_string(),
                content_type.map(Value::Str).unwrap_or(Value::Nil),
            ),
        ]),
    }
}
