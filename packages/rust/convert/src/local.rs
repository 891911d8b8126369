//! Conversion through a locally installed office suite (`soffice`).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use darwin_shared::{DarwinError, OutputFormat, Result};

use crate::{Converter, artifact_stem, publish_file, timeout_seconds};

/// How long to keep draining output pipes after the converter exited.
const PIPE_DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Longest diagnostic excerpt carried in an error.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// Runs `<program> --headless --convert-to <ext> --outdir <dir> <input>`.
///
/// Every invocation gets its own staging directory and, unless disabled, its
/// own user profile, so concurrent conversions do not contend for the suite's
/// profile lock.
#[derive(Debug, Clone)]
pub struct LocalBinaryConverter {
    program: String,
    timeout: Duration,
    isolate_profile: bool,
}

impl LocalBinaryConverter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            isolate_profile: true,
        }
    }

    /// Pass a throwaway `-env:UserInstallation` per call.
    pub fn isolate_profile(mut self, isolate: bool) -> Self {
        self.isolate_profile = isolate;
        self
    }

    fn build_command(
        &self,
        input: &Path,
        target: OutputFormat,
        staging: &Path,
        profile: Option<&Path>,
    ) -> Result<Command> {
        let mut cmd = Command::new(&self.program);

        if let Some(profile) = profile {
            let url = Url::from_directory_path(profile).map_err(|()| {
                DarwinError::unavailable(format!(
                    "profile directory {} cannot be expressed as a file URL",
                    profile.display()
                ))
            })?;
            cmd.arg(format!("-env:UserInstallation={url}"));
        }

        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(target.extension())
            .arg("--outdir")
            .arg(staging)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so the launcher and the workers it forks can be
        // killed together.
        #[cfg(unix)]
        cmd.process_group(0);
        Ok(cmd)
    }
}

#[async_trait]
impl Converter for LocalBinaryConverter {
    fn name(&self) -> &str {
        "local"
    }

    #[instrument(skip(self), fields(program = %self.program))]
    async fn convert(
        &self,
        input: &Path,
        target: OutputFormat,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let stem = artifact_stem(input)?;
        std::fs::create_dir_all(out_dir).map_err(|e| DarwinError::io(out_dir, e))?;

        // The suite names its output after the input; staging keeps that
        // name from ever colliding with an existing artifact.
        let staging = tempfile::Builder::new()
            .prefix(".convert-")
            .tempdir_in(out_dir)
            .map_err(|e| DarwinError::io(out_dir, e))?;
        let profile = if self.isolate_profile {
            Some(
                tempfile::Builder::new()
                    .prefix("darwin-profile-")
                    .tempdir()
                    .map_err(|e| DarwinError::io(std::env::temp_dir(), e))?,
            )
        } else {
            None
        };

        let mut cmd = self.build_command(
            input,
            target,
            staging.path(),
            profile.as_ref().map(|p| p.path()),
        )?;

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            DarwinError::unavailable(format!("cannot run `{}`: {e}", self.program))
        })?;
        debug!(pid = child.id(), "converter started");
        let mut group = ProcessGroup {
            leader: child.id(),
        };

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        // Stragglers would keep the pipes open and outlive the conversion.
        group.kill();

        let status = match waited {
            Ok(status) => status.map_err(|e| {
                DarwinError::conversion_failed(format!("waiting for `{}` failed: {e}", self.program))
            })?,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "converter timed out, killed it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to reap converter");
                }
                for handle in [stdout, stderr].into_iter().flatten() {
                    handle.abort();
                }
                return Err(DarwinError::ConversionTimeout {
                    seconds: timeout_seconds(self.timeout),
                });
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.success() {
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(DarwinError::conversion_failed(format!(
                "`{}` exited with {status}: {}",
                self.program,
                excerpt(detail)
            )));
        }

        let produced = staging.path().join(format!("{stem}.{}", target.extension()));
        if !produced.is_file() {
            warn!(stdout = %excerpt(&stdout), "converter exited cleanly without output");
            return Err(DarwinError::ConversionOutputMissing {
                expected: out_dir.join(format!("{stem}.{}", target.extension())),
            });
        }

        let path = publish_file(&produced, out_dir, stem, target)?;
        info!(path = %path.display(), elapsed_ms, "converted artifact");
        Ok(path)
    }
}

/// The process group led by a spawned converter. Killed at the latest on drop,
/// so a cancelled conversion leaves no workers behind.
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        if let Some(pid) = self.leader.take() {
            kill_process_group(pid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "failed to kill converter process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "converter pipe closed with error");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(handle: Option<JoinHandle<String>>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_LIMIT, handle).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
    cut.push('…');
    cut
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Copies its input to `<outdir>/<stem>.<ext>` like the real suite.
    const COPYING_SCRIPT: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --convert-to) ext="$2"; shift 2 ;;
    --outdir) outdir="$2"; shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input")
cp "$input" "$outdir/${name%.*}.$ext"
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        input: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("DAT_Projet_20260218_103000.docx");
            std::fs::write(&input, b"primary bytes").unwrap();
            Self { dir, input }
        }

        fn script(&self, name: &str, body: &str) -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn out_dir(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn entries(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.out_dir())
                .unwrap()
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    #[tokio::test]
    async fn successful_conversion_publishes_one_file() {
        let fx = Fixture::new();
        let program = fx.script("convert.sh", COPYING_SCRIPT);
        let converter = LocalBinaryConverter::new(program, Duration::from_secs(10));

        let out = converter
            .convert(&fx.input, OutputFormat::Pdf, &fx.out_dir())
            .await
            .unwrap();

        assert_eq!(out, fx.out_dir().join("DAT_Projet_20260218_103000.pdf"));
        assert_eq!(std::fs::read(&out).unwrap(), b"primary bytes");
        assert_eq!(fx.entries(), vec!["DAT_Projet_20260218_103000.pdf".to_string()]);
    }

    #[tokio::test]
    async fn passes_isolated_profile_url() {
        let fx = Fixture::new();
        let args_file = fx.dir.path().join("args.txt");
        let body = format!(
            "#!/bin/sh\necho \"$@\" > '{}'\n{}",
            args_file.display(),
            COPYING_SCRIPT.trim_start_matches("#!/bin/sh\n")
        );
        let program = fx.script("convert.sh", &body);
        let converter = LocalBinaryConverter::new(program, Duration::from_secs(10));

        converter
            .convert(&fx.input, OutputFormat::Odt, &fx.out_dir())
            .await
            .unwrap();

        let args = std::fs::read_to_string(args_file).unwrap();
        assert!(args.starts_with("-env:UserInstallation=file:///"), "got {args}");
        assert!(args.contains("--headless --convert-to odt --outdir"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_with_diagnostics() {
        let fx = Fixture::new();
        let program = fx.script("fail.sh", "#!/bin/sh\necho boom >&2\nexit 3\n");
        let converter = LocalBinaryConverter::new(program, Duration::from_secs(10));

        let err = converter
            .convert(&fx.input, OutputFormat::Pdf, &fx.out_dir())
            .await
            .unwrap_err();

        assert_eq!(err.kind().as_str(), "conversion_failed");
        assert!(err.to_string().contains("boom"));
        assert!(fx.entries().is_empty());
    }

    #[tokio::test]
    async fn clean_exit_without_output_is_output_missing() {
        let fx = Fixture::new();
        let program = fx.script("noop.sh", "#!/bin/sh\nexit 0\n");
        let converter = LocalBinaryConverter::new(program, Duration::from_secs(10));

        let err = converter
            .convert(&fx.input, OutputFormat::Pdf, &fx.out_dir())
            .await
            .unwrap_err();

        match err {
            DarwinError::ConversionOutputMissing { expected } => {
                assert_eq!(expected, fx.out_dir().join("DAT_Projet_20260218_103000.pdf"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.entries().is_empty());
    }

    /// Whether `pid` is still a live (non-zombie) process.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    async fn assert_gone(pid_file: &Path) {
        let pid = std::fs::read_to_string(pid_file).unwrap();
        for _ in 0..40 {
            if !is_running(&pid) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("process {} survived the timeout", pid.trim());
    }

    #[tokio::test]
    async fn hung_converter_is_killed_at_the_timeout() {
        let fx = Fixture::new();
        let pid_file = fx.dir.path().join("pid");
        let body = format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n", pid_file.display());
        let program = fx.script("hang.sh", &body);
        let converter = LocalBinaryConverter::new(program, Duration::from_millis(500));

        let started = Instant::now();
        let err = converter
            .convert(&fx.input, OutputFormat::Pdf, &fx.out_dir())
            .await
            .unwrap_err();

        assert_eq!(err.kind().as_str(), "conversion_timeout");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(fx.entries().is_empty());

        #[cfg(target_os = "linux")]
        assert_gone(&pid_file).await;
    }

    #[tokio::test]
    async fn timeout_also_kills_forked_workers() {
        let fx = Fixture::new();
        let worker_file = fx.dir.path().join("worker");
        let body = format!(
            "#!/bin/sh\nsleep 30 &\necho $! > '{}'\nwait\n",
            worker_file.display()
        );
        let program = fx.script("launcher.sh", &body);
        let converter = LocalBinaryConverter::new(program, Duration::from_millis(500));

        let started = Instant::now();
        let err = converter
            .convert(&fx.input, OutputFormat::Pdf, &fx.out_dir())
            .await
            .unwrap_err();

        assert_eq!(err.kind().as_str(), "conversion_timeout");
        assert!(started.elapsed() < Duration::from_secs(10));

        #[cfg(target_os = "linux")]
        assert_gone(&worker_file).await;
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let fx = Fixture::new();
        let converter = LocalBinaryConverter::new(
            "/nonexistent/darwin-test-soffice",
            Duration::from_secs(5),
        );

        let err = converter
            .convert(&fx.input, OutputFormat::Pdf, &fx.out_dir())
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "conversion_unavailable");
    }

    #[test]
    fn long_diagnostics_are_cut() {
        let long = "x".repeat(MAX_DIAGNOSTIC_CHARS + 10);
        assert_eq!(excerpt(&long).chars().count(), MAX_DIAGNOSTIC_CHARS + 1);
        assert_eq!(excerpt("  short \n"), "short");
    }
}
