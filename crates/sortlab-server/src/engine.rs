//! Engine execution: in-process calls into `sortlab-core`, or a child
//! `sortlab` process sharing the same request/response bytes.
//!
//! The mode is fixed at startup and reported through `/limits`; the rest of
//! the service only sees `Engine::run` and `Engine::list_algorithms`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use sortlab_core::{CancelFlag, ElemType, EngineError, to_json};

use crate::metrics::Metrics;
use crate::validate::EngineCall;

/// Test hook: artificial delay before the in-process engine starts, used to
/// keep runs in flight long enough for cancellation tests.
const TEST_DELAY_ENV: &str = "SORTLAB_TEST_DELAY_MS";

/// How the engine is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    InProcess,
    Shell,
}

impl EngineMode {
    /// Label used in `/limits` and metric tags.
    pub fn name(self) -> &'static str {
        match self {
            EngineMode::InProcess => "in-process",
            EngineMode::Shell => "shell",
        }
    }
}

/// Startup-fixed engine binding.
#[derive(Debug, Clone)]
pub struct Engine {
    mode: EngineMode,
    bin: Option<String>,
}

impl Engine {
    /// Selects the mode from `SORTLAB_MODE` / `SORTLAB_BIN`.
    ///
    /// Shell mode requires a binary path; when `SORTLAB_MODE=shell` is set
    /// without one, the engine falls back to in-process with a warning.
    pub fn from_env() -> Self {
        let bin = std::env::var("SORTLAB_BIN").ok().filter(|s| !s.is_empty());
        let wants_shell = matches!(
            std::env::var("SORTLAB_MODE").as_deref(),
            Ok("shell")
        ) || bin.is_some();
        if wants_shell {
            if let Some(bin) = bin {
                return Self {
                    mode: EngineMode::Shell,
                    bin: Some(bin),
                };
            }
            tracing::warn!("SORTLAB_MODE=shell without SORTLAB_BIN; using in-process engine");
        }
        Self {
            mode: EngineMode::InProcess,
            bin: None,
        }
    }

    pub fn in_process() -> Self {
        Self {
            mode: EngineMode::InProcess,
            bin: None,
        }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Runs one engine invocation under `deadline`, honoring `cancel`.
    ///
    /// Returns the raw JSON row-array bytes. Cancellation and deadline both
    /// surface as [`EngineError::Canceled`].
    pub async fn run(
        &self,
        call: &EngineCall,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EngineError> {
        let started = Instant::now();
        let result = match self.mode {
            EngineMode::InProcess => self.run_in_process(call, deadline, cancel).await,
            EngineMode::Shell => self.run_shell(call, deadline, cancel).await,
        };
        Metrics::global().record_run(
            self.mode.name(),
            call.config.dist.name(),
            call.config.elem_type.name(),
            started.elapsed(),
        );
        result
    }

    async fn run_in_process(
        &self,
        call: &EngineCall,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EngineError> {
        let flag = CancelFlag::new();
        let cfg = call.config.clone();
        let task_flag = flag.clone();
        let handle = tokio::task::spawn_blocking(move || {
            apply_test_delay(&task_flag);
            if task_flag.is_canceled() {
                return Err(EngineError::Canceled);
            }
            sortlab_core::run_benchmark(&cfg, &task_flag)
                .map(|result| to_json(&result).into_bytes())
        });

        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);
        tokio::pin!(handle);

        loop {
            tokio::select! {
                joined = &mut handle => {
                    return joined.map_err(|e| EngineError::Internal(e.to_string()))?;
                }
                () = cancel.cancelled(), if !flag.is_canceled() => {
                    flag.cancel();
                }
                () = &mut sleep, if !flag.is_canceled() => {
                    flag.cancel();
                }
            }
        }
    }

    async fn run_shell(
        &self,
        call: &EngineCall,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EngineError> {
        let bin = self.bin.as_deref().unwrap_or("sortlab");
        let mut child = Command::new(bin)
            .args(&call.argv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Internal(format!("spawn {bin}: {e}")))?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let wait = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let _ = stdout.read_to_end(&mut out).await;
            let _ = stderr.read_to_end(&mut err).await;
            let status = child.wait().await;
            (status, out, err)
        };

        tokio::select! {
            (status, out, err) = wait => {
                let status = status
                    .map_err(|e| EngineError::Internal(format!("wait {bin}: {e}")))?;
                if status.success() {
                    Ok(out)
                } else {
                    let msg = String::from_utf8_lossy(&err).trim().to_string();
                    Err(EngineError::Internal(format!("engine failed: {msg}")))
                }
            }
            () = cancel.cancelled() => Err(EngineError::Canceled),
            () = tokio::time::sleep(deadline) => Err(EngineError::Canceled),
        }
    }

    /// Lists algorithms for one element type, including request-scoped
    /// plugin discovery.
    pub async fn list_algorithms(
        &self,
        elem_type: ElemType,
        plugins: &[String],
    ) -> Result<Vec<String>, EngineError> {
        match self.mode {
            EngineMode::InProcess => {
                let plugins = plugins.to_vec();
                tokio::task::spawn_blocking(move || {
                    sortlab_core::list_algorithms(elem_type, &plugins)
                })
                .await
                .map_err(|e| EngineError::Internal(e.to_string()))
            }
            EngineMode::Shell => {
                let bin = self.bin.as_deref().unwrap_or("sortlab");
                let mut cmd = Command::new(bin);
                cmd.arg("--elem").arg(elem_type.name()).arg("--list");
                for plugin in plugins.iter().filter(|p| !p.is_empty()) {
                    cmd.arg("--plugin").arg(plugin);
                }
                let output = cmd
                    .output()
                    .await
                    .map_err(|e| EngineError::Internal(format!("spawn {bin}: {e}")))?;
                if !output.status.success() {
                    let msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    return Err(EngineError::Internal(format!("list failed: {msg}")));
                }
                Ok(String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect())
            }
        }
    }
}

/// Sleeps in short slices so cancellation still lands during the delay.
fn apply_test_delay(flag: &CancelFlag) {
    let Ok(raw) = std::env::var(TEST_DELAY_ENV) else {
        return;
    };
    let Ok(total_ms) = raw.trim().parse::<u64>() else {
        return;
    };
    let mut remaining = total_ms;
    while remaining > 0 && !flag.is_canceled() {
        let slice = remaining.min(10);
        std::thread::sleep(Duration::from_millis(slice));
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{RunRequest, build_engine_call};

    fn small_call() -> EngineCall {
        build_engine_call(&RunRequest {
            n: 256,
            dist: "runs".to_string(),
            elem_type: "i32".to_string(),
            repeats: 1,
            algos: vec!["std_sort".to_string()],
            assert_sorted: true,
            ..RunRequest::default()
        })
    }

    #[tokio::test]
    async fn in_process_run_returns_row_json() {
        let engine = Engine::in_process();
        let bytes = engine
            .run(&small_call(), Duration::from_secs(30), &CancellationToken::new())
            .await
            .unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["algo"], "std_sort");
    }

    #[tokio::test]
    async fn cancel_token_cancels_the_run() {
        let engine = Engine::in_process();
        let token = CancellationToken::new();
        token.cancel();
        let mut call = small_call();
        call.config.n = 2_000_000;
        let err = engine
            .run(&call, Duration::from_secs(30), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Canceled));
    }

    #[tokio::test]
    async fn deadline_cancels_the_run() {
        let engine = Engine::in_process();
        let mut call = small_call();
        call.config.n = 4_000_000;
        call.config.repeats = 50;
        call.config.algos.clear();
        let err = engine
            .run(&call, Duration::from_millis(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Canceled));
    }

    #[tokio::test]
    async fn list_algorithms_includes_std_sort() {
        let engine = Engine::in_process();
        let names = engine.list_algorithms(ElemType::I32, &[]).await.unwrap();
        assert!(names.contains(&"std_sort".to_string()));
    }

    #[test]
    fn mode_names() {
        assert_eq!(EngineMode::InProcess.name(), "in-process");
        assert_eq!(EngineMode::Shell.name(), "shell");
    }
}
