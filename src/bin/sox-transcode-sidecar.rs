use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use sox_transcode::sox::parse_sox_error;
use sox_transcode::{Sox, TranscodeError, TranscodeEvent, TranscodeOptions};

const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
}

impl RpcErrorPayload {
    fn message(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            exit_code: None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyParams {
    input_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscodeParams {
    input_path: PathBuf,
    output_path: PathBuf,
    #[serde(default)]
    options: TranscodeOptions,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn error_payload(err: &TranscodeError) -> RpcErrorPayload {
    match err.process_error() {
        Some(process) => {
            let parsed = parse_sox_error(&process.stderr, process.exit_code());
            RpcErrorPayload {
                summary: parsed.summary,
                detail: format!("{}\nargs: {:?}\n{}", err, process.args, parsed.detail),
                exit_code: process.exit_code(),
            }
        }
        None => RpcErrorPayload::message(err.to_string(), err.to_string()),
    }
}

fn respond(writer: &SharedWriter, id: u64, result: Result<Value, RpcErrorPayload>) {
    let _ = match result {
        Ok(result) => write_json_line_shared(writer, &RpcSuccess { id, result }),
        Err(error) => write_json_line_shared(writer, &RpcFailure { id, error }),
    };
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcErrorPayload> {
    serde_json::from_value(params)
        .map_err(|e| RpcErrorPayload::message("Invalid params payload", e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcErrorPayload> {
    serde_json::to_value(value)
        .map_err(|e| RpcErrorPayload::message("Serialization error", e.to_string()))
}

/// Emit every notification of one transcode job, then its response line.
async fn run_transcode_job(
    sox: Sox,
    request_id: u64,
    job_id: u64,
    params: TranscodeParams,
    writer: SharedWriter,
) {
    let mut handle = sox.transcode(&params.input_path, &params.output_path, &params.options);
    respond(&writer, request_id, Ok(json!({ "jobId": job_id })));

    while let Some(event) = handle.next_event().await {
        let name = format!("audio.job.{}", event.name());
        let payload = match &event {
            TranscodeEvent::Src(info) | TranscodeEvent::Dest(info) => {
                json!({ "jobId": job_id, "info": info })
            }
            TranscodeEvent::Progress(p) => json!({
                "jobId": job_id,
                "elapsedSeconds": p.elapsed_seconds,
                "totalSeconds": p.total_seconds,
            }),
            TranscodeEvent::Error(err) => json!({ "jobId": job_id, "error": error_payload(err) }),
            TranscodeEvent::End => json!({ "jobId": job_id }),
        };
        emit_rpc_event(&writer, &name, payload);
    }
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let next_job_id = AtomicU64::new(1);
    let mut jobs = Vec::new();
    let sox = Sox::discover();
    if let Err(err) = &sox {
        log::error!(target: "sox_transcode::sidecar", "{}", err);
    }

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload::message("Invalid input stream", err.to_string()),
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                respond(
                    &stdout,
                    0,
                    Err(RpcErrorPayload::message("Invalid request", err.to_string())),
                );
                continue;
            }
        };

        // Capabilities are answered even without SoX so front ends can negotiate.
        if request.method == "app.capabilities" {
            let sox_path = sox.as_ref().ok().map(Sox::program);
            respond(
                &stdout,
                request.id,
                Ok(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "soxPath": sox_path,
                })),
            );
            continue;
        }

        let sox = match &sox {
            Ok(sox) => sox.clone(),
            Err(err) => {
                respond(&stdout, request.id, Err(error_payload(err)));
                continue;
            }
        };

        match request.method.as_str() {
            "audio.identify" => {
                let result = params_from_value::<IdentifyParams>(request.params).and_then(|p| {
                    runtime
                        .block_on(sox.identify(&p.input_path))
                        .map_err(|e| error_payload(&TranscodeError::from(e)))
                        .and_then(|info| to_value(&info))
                });
                respond(&stdout, request.id, result);
            }
            "audio.transcode" => match params_from_value::<TranscodeParams>(request.params) {
                Ok(params) => {
                    let job_id = next_job_id.fetch_add(1, Ordering::Relaxed);
                    let writer = Arc::clone(&stdout);
                    jobs.push(runtime.spawn(run_transcode_job(
                        sox, request.id, job_id, params, writer,
                    )));
                }
                Err(error) => respond(&stdout, request.id, Err(error)),
            },
            other => respond(
                &stdout,
                request.id,
                Err(RpcErrorPayload::message(
                    "Unknown method",
                    format!("Unknown method: {}", other),
                )),
            ),
        }
    }

    for job in jobs {
        let _ = runtime.block_on(job);
    }
    Ok(())
}
