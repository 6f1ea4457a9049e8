use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cookies::CookieStore;
use crate::util::{Tool, ToolAvailability};

use super::error::ExtractorError;
use super::evasion::{attempt_plan, pacing_args, ClientProfile, RetryPolicy};
use super::progress::{parse_progress_line, progress_template, ExtractorProgress};
use super::runner::{DownloadSpec, MediaExtractor};

const INFO_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
/// Lines of stderr kept for error reporting.
const STDERR_TAIL: usize = 64;
/// Prefixes the line yt-dlp prints once the finished file is in place.
const FILEPATH_MARKER: &str = "[ytrelay-file]";

/// [`MediaExtractor`] backed by the yt-dlp binary.
pub struct YtDlp {
    binary: Option<PathBuf>,
    cookies: Arc<CookieStore>,
    retry: RetryPolicy,
    js_runtime: Option<Tool>,
    info_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlp {
    pub fn new(tools: &ToolAvailability, cookies: Arc<CookieStore>) -> Self {
        Self {
            binary: tools.get_path(Tool::YtDlp).cloned(),
            cookies,
            retry: RetryPolicy::default(),
            js_runtime: tools.js_runtime(),
            info_timeout: INFO_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
        }
    }

    /// Use a specific executable, bypassing tool detection.
    pub fn with_binary(binary: impl Into<PathBuf>, cookies: Arc<CookieStore>) -> Self {
        Self {
            binary: Some(binary.into()),
            cookies,
            retry: RetryPolicy::default(),
            js_runtime: None,
            info_timeout: INFO_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, info: Duration, download: Duration) -> Self {
        self.info_timeout = info;
        self.download_timeout = download;
        self
    }

    fn common_args(&self, profile: &ClientProfile, cookie_path: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--ignore-config".to_string(),
            "--no-playlist".to_string(),
            "--no-colors".to_string(),
        ];
        args.extend(profile.args());

        if let Some(path) = cookie_path.filter(|_| profile.uses_cookies) {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        // Deno is yt-dlp's default runtime; anything else must be named.
        if self.js_runtime == Some(Tool::Node) {
            args.push("--js-runtimes".to_string());
            args.push("node".to_string());
        }
        args
    }

    fn info_args(&self, url: &str, profile: &ClientProfile, cookie_path: Option<&Path>) -> Vec<String> {
        let mut args = self.common_args(profile, cookie_path);
        args.extend(["--dump-single-json".to_string(), "--no-warnings".to_string()]);
        args.extend(pacing_args(&mut rand::rng(), false));
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn download_args(
        &self,
        spec: &DownloadSpec,
        profile: &ClientProfile,
        cookie_path: Option<&Path>,
    ) -> Vec<String> {
        let mut args = self.common_args(profile, cookie_path);
        args.extend([
            "--format".to_string(),
            spec.format_selector(),
            "--output".to_string(),
            spec.output_template(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--postprocessor-args".to_string(),
            "ffmpeg:-c:v copy -c:a copy".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            progress_template(),
            "--print".to_string(),
            format!("after_move:{} %(filepath)s", FILEPATH_MARKER),
            // --print implies --quiet, which would hide progress and merger lines
            "--no-quiet".to_string(),
            "--progress".to_string(),
        ]);
        args.extend(pacing_args(&mut rand::rng(), true));
        args.push("--".to_string());
        args.push(spec.url.clone());
        args
    }

    /// Walk the client ladder until one attempt succeeds or a failure is permanent.
    async fn run_ladder<F>(
        &self,
        build_args: F,
        progress: Option<&mpsc::Sender<ExtractorProgress>>,
        timeout: Duration,
    ) -> Result<Vec<u8>, ExtractorError>
    where
        F: Fn(&ClientProfile, Option<&Path>) -> Vec<String> + Send + Sync,
    {
        let binary = self.binary.as_deref().ok_or(ExtractorError::NotAvailable)?;
        let cookie_path = self.cookies.active_path();
        let plan = attempt_plan(cookie_path.is_some());

        let mut last_error = None;
        for (attempt, profile) in plan.iter().enumerate() {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt as u32 - 1, &mut rand::rng());
                tracing::info!(
                    client = profile.name,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying extraction with next client profile"
                );
                tokio::time::sleep(delay).await;
            }

            let args = build_args(profile, cookie_path.as_deref());
            match run_with_timeout(binary, &args, progress, timeout).await {
                Ok(output) => {
                    tracing::debug!(client = profile.name, "yt-dlp run succeeded");
                    return Ok(output);
                }
                Err(error) if error.kind().is_retryable() => {
                    tracing::warn!(
                        client = profile.name,
                        kind = ?error.kind(),
                        error = %error,
                        "yt-dlp attempt failed"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or(ExtractorError::NotAvailable))
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    async fn fetch_info(&self, url: &str) -> Result<Value, ExtractorError> {
        let output = self
            .run_ladder(
                |profile, cookies| self.info_args(url, profile, cookies),
                None,
                self.info_timeout,
            )
            .await?;
        Ok(serde_json::from_slice(&output)?)
    }

    async fn download(
        &self,
        spec: &DownloadSpec,
        progress: mpsc::Sender<ExtractorProgress>,
    ) -> Result<Option<PathBuf>, ExtractorError> {
        let output = self
            .run_ladder(
                |profile, cookies| self.download_args(spec, profile, cookies),
                Some(&progress),
                self.download_timeout,
            )
            .await?;
        Ok(final_path(&output))
    }
}

/// Last path reported through [`FILEPATH_MARKER`].
fn final_path(output: &[u8]) -> Option<PathBuf> {
    String::from_utf8_lossy(output)
        .lines()
        .rev()
        .filter_map(|line| line.trim_end().strip_prefix(FILEPATH_MARKER))
        .filter_map(|rest| rest.strip_prefix(' '))
        .find(|path| !path.is_empty())
        .map(PathBuf::from)
}

async fn run_with_timeout(
    binary: &Path,
    args: &[String],
    progress: Option<&mpsc::Sender<ExtractorProgress>>,
    timeout: Duration,
) -> Result<Vec<u8>, ExtractorError> {
    // kill_on_drop reaps the child when the timeout drops the future.
    tokio::time::timeout(timeout, execute(binary, args, progress))
        .await
        .map_err(|_| ExtractorError::Timeout(timeout))?
}

async fn execute(
    binary: &Path,
    args: &[String],
    progress: Option<&mpsc::Sender<ExtractorProgress>>,
) -> Result<Vec<u8>, ExtractorError> {
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or(ExtractorError::OutputCaptureFailed)?;
    let stderr = child
        .stderr
        .take()
        .ok_or(ExtractorError::OutputCaptureFailed)?;
    let stderr_task = tokio::spawn(collect_stderr(stderr));

    let mut captured = Vec::new();
    let mut reader = BufReader::new(stdout);
    match progress {
        Some(tx) => {
            let mut processing_sent = false;
            let mut raw = Vec::new();
            loop {
                raw.clear();
                if reader.read_until(b'\n', &mut raw).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&raw);
                match parse_progress_line(&line) {
                    Some(ExtractorProgress::Processing) if processing_sent => {}
                    Some(update) => {
                        processing_sent |= update == ExtractorProgress::Processing;
                        // A dropped receiver only means nobody is watching.
                        let _ = tx.send(update).await;
                    }
                    None => {
                        tracing::trace!(line = %line.trim_end(), "yt-dlp");
                        captured.extend_from_slice(&raw);
                    }
                }
            }
        }
        None => {
            reader.read_to_end(&mut captured).await?;
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(captured)
    } else {
        Err(ExtractorError::from_stderr(&stderr, status.code()))
    }
}

async fn collect_stderr<R: AsyncRead + Unpin>(stderr: R) -> String {
    let mut reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                tracing::debug!(line = %line, "yt-dlp stderr");
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(cookies: Arc<CookieStore>) -> YtDlp {
        YtDlp::with_binary("/usr/bin/yt-dlp", cookies).with_retry_policy(RetryPolicy::immediate())
    }

    fn no_cookies() -> Arc<CookieStore> {
        Arc::new(CookieStore::new("/nonexistent/cookies.txt"))
    }

    #[test]
    fn test_info_args_end_with_separated_url() {
        let ytdlp = extractor(no_cookies());
        let args = ytdlp.info_args("-x https://youtu.be/abc", &ClientProfile::ANDROID, None);
        let n = args.len();
        assert_eq!(args[n - 2], "--");
        assert_eq!(args[n - 1], "-x https://youtu.be/abc");
        assert!(args.contains(&"--dump-single-json".to_string()));
        assert!(args.contains(&"youtube:player_client=android".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_cookies_only_on_cookie_profiles() {
        let ytdlp = extractor(no_cookies());
        let path = Path::new("/data/cookies.txt");

        let web = ytdlp.info_args("u", &ClientProfile::WEB_WITH_COOKIES, Some(path));
        let pos = web.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(web[pos + 1], "/data/cookies.txt");

        let android = ytdlp.info_args("u", &ClientProfile::ANDROID, Some(path));
        assert!(!android.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_download_args() {
        let ytdlp = extractor(no_cookies());
        let spec = DownloadSpec {
            url: "https://youtu.be/abc".into(),
            video_format: "137".into(),
            audio_format: "140".into(),
            output_dir: PathBuf::from("downloads"),
            file_prefix: "[Xenvu.tech]_deadbeef_".into(),
        };
        let args = ytdlp.download_args(&spec, &ClientProfile::IOS, None);
        let value_of = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };
        assert_eq!(value_of("--format"), "137+140");
        assert_eq!(value_of("--merge-output-format"), "mp4");
        assert_eq!(value_of("--postprocessor-args"), "ffmpeg:-c:v copy -c:a copy");
        assert!(value_of("--output").ends_with("[Xenvu.tech]_deadbeef_%(title)s.%(ext)s"));
        assert!(value_of("--progress-template").contains("[ytrelay-progress]"));
        assert_eq!(value_of("--print"), "after_move:[ytrelay-file] %(filepath)s");
        assert!(args.contains(&"--no-quiet".to_string()));
        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"--sleep-interval".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_node_runtime_is_named() {
        let mut ytdlp = extractor(no_cookies());
        ytdlp.js_runtime = Some(Tool::Node);
        let args = ytdlp.common_args(&ClientProfile::ANDROID, None);
        let pos = args.iter().position(|a| a == "--js-runtimes").unwrap();
        assert_eq!(args[pos + 1], "node");

        ytdlp.js_runtime = Some(Tool::Deno);
        let args = ytdlp.common_args(&ClientProfile::ANDROID, None);
        assert!(!args.contains(&"--js-runtimes".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_available() {
        let tools = ToolAvailability::default();
        let ytdlp = YtDlp::new(&tools, no_cookies());
        assert!(!ytdlp.is_available());
        let err = ytdlp.fetch_info("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, ExtractorError::NotAvailable));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script standing in for yt-dlp.
        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_fetch_info_parses_json() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), r#"echo '{"title": "clip", "formats": []}'"#);
            let ytdlp = YtDlp::with_binary(bin, no_cookies());
            let info = ytdlp.fetch_info("https://youtu.be/abc").await.unwrap();
            assert_eq!(info["title"], "clip");
        }

        #[tokio::test]
        async fn test_permanent_failure_stops_ladder() {
            let dir = tempfile::tempdir().unwrap();
            let counter = dir.path().join("count");
            let bin = script(
                dir.path(),
                &format!(
                    "echo x >> '{}'\necho 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1",
                    counter.display()
                ),
            );
            let ytdlp = YtDlp::with_binary(bin, no_cookies())
                .with_retry_policy(RetryPolicy::immediate());
            let err = ytdlp.fetch_info("https://youtu.be/abc").await.unwrap_err();
            assert_eq!(err.to_string(), "ERROR: [youtube] abc: Video unavailable");
            assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 1);
        }

        #[tokio::test]
        async fn test_bot_detection_walks_every_client() {
            let dir = tempfile::tempdir().unwrap();
            let counter = dir.path().join("count");
            let bin = script(
                dir.path(),
                &format!(
                    "echo x >> '{}'\necho 'ERROR: Sign in to confirm you are not a bot' >&2\nexit 1",
                    counter.display()
                ),
            );
            let ytdlp = YtDlp::with_binary(bin, no_cookies())
                .with_retry_policy(RetryPolicy::immediate());
            let err = ytdlp.fetch_info("https://youtu.be/abc").await.unwrap_err();
            assert_eq!(err.kind(), crate::extractor::FailureKind::BotDetected);
            // android, ios, mweb
            assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 3);
        }

        #[tokio::test]
        async fn test_download_reports_progress() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(
                dir.path(),
                "echo '[ytrelay-progress]  50.0%|1.00MiB/s|00:05'\n\
                 echo '[Merger] Merging formats'\n\
                 echo '[Merger] again'",
            );
            let ytdlp = YtDlp::with_binary(bin, no_cookies());
            let spec = DownloadSpec {
                url: "https://youtu.be/abc".into(),
                video_format: "137".into(),
                audio_format: "140".into(),
                output_dir: dir.path().to_path_buf(),
                file_prefix: "p_".into(),
            };
            let (tx, mut rx) = mpsc::channel(16);
            assert_eq!(ytdlp.download(&spec, tx).await.unwrap(), None);

            let mut updates = Vec::new();
            while let Some(update) = rx.recv().await {
                updates.push(update);
            }
            assert_eq!(
                updates,
                vec![
                    ExtractorProgress::Downloading {
                        percent: "50.0%".into(),
                        speed: "1.00MiB/s".into(),
                        eta: "00:05".into(),
                    },
                    ExtractorProgress::Processing,
                ]
            );
        }

        #[tokio::test]
        async fn test_download_returns_reported_path() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(
                dir.path(),
                "echo '[ytrelay-progress] 100.0%|1.00MiB/s|00:00'\n\
                 echo '[Merger] Merging formats'\n\
                 echo '[ytrelay-file] downloads/[Xenvu.tech]_1234abcd_Aperture sweep.f8.mp4'\n\
                 echo 'Deleting original file'",
            );
            let ytdlp = YtDlp::with_binary(bin, no_cookies());
            let spec = DownloadSpec {
                url: "https://youtu.be/abc".into(),
                video_format: "137".into(),
                audio_format: "140".into(),
                output_dir: dir.path().to_path_buf(),
                file_prefix: "[Xenvu.tech]_1234abcd_".into(),
            };
            let (tx, _rx) = mpsc::channel(16);
            let path = ytdlp.download(&spec, tx).await.unwrap();
            assert_eq!(
                path,
                Some(PathBuf::from("downloads/[Xenvu.tech]_1234abcd_Aperture sweep.f8.mp4"))
            );
        }

        #[tokio::test]
        async fn test_timeout_kills_run() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "sleep 5");
            let ytdlp = YtDlp::with_binary(bin, no_cookies())
                .with_retry_policy(RetryPolicy::immediate())
                .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));
            let err = ytdlp.fetch_info("u").await.unwrap_err();
            assert!(matches!(err, ExtractorError::Timeout(_)));
        }
    }
}
