use std::{io::Write, path::Path, time::Duration};

use crate::{
    config::{Mode, RuntimeConfig},
    ffmpeg::{FfmpegError, MediaTool},
    identity::{self, BroadcastIdentity, ResolveError, TargetInput},
    recorder::{self, LiveSession, RecordError, RecordingOutcome},
    util::{self, HttpClient},
    webcast::{self, WebcastError},
};

/// Recheck interval after a not-live classification in automatic mode.
const RECHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Shorter retry interval after an aborted connection.
const CONNECTION_CLOSED_INTERVAL: Duration = Duration::from_secs(2 * 60);

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("The user has never been live")]
    NeverLive,
    #[error("The user is not currently live")]
    NotCurrentlyLive,
    #[error("Automatic mode requires the ffmpeg recording strategy (--ffmpeg)")]
    AutomaticRequiresFfmpeg,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Webcast(#[from] WebcastError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Sleep to apply before the next automatic-mode iteration, if any. Not-live
/// classifications wait out the recheck interval, aborted connections retry
/// sooner, everything else retries immediately.
pub fn backoff_for(err: &RunError) -> Option<Duration> {
    match err {
        RunError::NeverLive | RunError::NotCurrentlyLive => Some(RECHECK_INTERVAL),
        err if is_transport(err) => Some(CONNECTION_CLOSED_INTERVAL),
        _ => None,
    }
}

fn is_transport(err: &RunError) -> bool {
    let download = match err {
        RunError::Resolve(ResolveError::Http(e)) => e,
        RunError::Webcast(WebcastError::Http(e)) => e,
        RunError::Record(RecordError::Http(e)) => e,
        _ => return false,
    };

    match download {
        util::DownloadError::ReqwestError(e) => e.is_connect() || e.is_timeout() || e.is_body(),
        util::DownloadError::ReqwestMiddlewareError(reqwest_middleware::Error::Reqwest(e)) => {
            e.is_connect() || e.is_timeout() || e.is_body()
        }
        util::DownloadError::IoError(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

pub struct Controller<'a> {
    client: &'a HttpClient,
    tool: &'a dyn MediaTool,
    config: &'a RuntimeConfig,
}

impl<'a> Controller<'a> {
    pub fn new(client: &'a HttpClient, tool: &'a dyn MediaTool, config: &'a RuntimeConfig) -> Self {
        Controller {
            client,
            tool,
            config,
        }
    }

    pub async fn run(&self, input: &TargetInput) -> Result<(), RunError> {
        // Unattended polling needs the tool's container guarantees; the
        // direct-stream strategy is only allowed for one-shot runs.
        if self.config.mode == Mode::Automatic && !self.config.use_ffmpeg {
            return Err(RunError::AutomaticRequiresFfmpeg);
        }

        let identity = identity::resolve(self.client, input, self.config.mode).await?;
        info!("USERNAME: {}", identity.username);
        if identity.room_id.is_empty() {
            info!("ROOM_ID: user has never been live");
        } else {
            info!("ROOM_ID: {}", identity.room_id);
        }

        match self.config.mode {
            Mode::Manual => self.record_once(&identity).await,
            Mode::Automatic => self.run_automatic(&identity.username).await,
        }
    }

    /// One poll cycle per iteration, forever. Each cycle re-resolves the room
    /// id from the username and classifies any failure into a backoff.
    async fn run_automatic(&self, username: &str) -> Result<(), RunError> {
        loop {
            if let Err(err) = self.poll_once(username).await {
                match backoff_for(&err) {
                    Some(delay) => {
                        info!("{}", err);
                        info!("Waiting {} seconds before recheck", delay.as_secs());
                        tokio::time::sleep(delay).await;
                    }
                    None => error!("{}", err),
                }
            }
        }
    }

    async fn poll_once(&self, username: &str) -> Result<(), RunError> {
        let room_id = identity::room_id_from_username(self.client, username).await?;
        let identity = BroadcastIdentity {
            username: username.to_string(),
            room_id,
        };
        self.record_once(&identity).await
    }

    async fn record_once(&self, identity: &BroadcastIdentity) -> Result<(), RunError> {
        if identity.room_id.is_empty() {
            return Err(RunError::NeverLive);
        }
        if !webcast::is_live(self.client, &identity.room_id).await? {
            return Err(RunError::NotCurrentlyLive);
        }

        let pull_url = webcast::pull_url(self.client, &identity.room_id).await?;
        info!("LIVE URL: {}", pull_url);

        let session = LiveSession::new(
            pull_url,
            &identity.username,
            &self.config.output_dir,
            self.config.duration,
        );
        match self.config.duration {
            Some(limit) => info!("Start recording for {} seconds", limit.as_secs()),
            None => info!("Started recording..."),
        }

        let outcome = if self.config.use_ffmpeg {
            recorder::record_with_tool(self.tool, &session).await?
        } else {
            recorder::record_direct(self.client, &session).await?
        };
        info!("FINISH: {}", outcome.path());

        self.post_process(&outcome).await;
        Ok(())
    }

    /// Managed-process captures already end up in their final container, so
    /// only direct-stream output is ever converted.
    async fn post_process(&self, outcome: &RecordingOutcome) {
        if self.config.use_ffmpeg {
            return;
        }
        if self.config.auto_convert || confirm_convert() {
            self.convert_to_mp4(outcome.path()).await;
        }
    }

    /// Re-encodes a raw `_flv` capture into its final name and removes the
    /// raw file on success. A missing tool is non-fatal here.
    pub async fn convert_to_mp4(&self, raw: &str) {
        let dest = recorder::converted_path(raw);
        info!("Converting {} to MP4 format...", raw);

        match self.tool.transcode(Path::new(raw), Path::new(&dest)).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(raw).await {
                    warn!("Could not remove {}: {}", raw, e);
                }
                info!("Finished converting {}", raw);
            }
            Err(FfmpegError::NotInstalled) => {
                error!("FFmpeg is not installed, leaving {} untouched", raw);
            }
            Err(e) => error!("Could not convert {}: {}", raw, e),
        }
    }
}

fn confirm_convert() -> bool {
    print!("Do you want to convert it to real mp4? [Y/N] -> ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    line.trim().eq_ignore_ascii_case("y")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::Ffmpeg;

    #[test]
    fn backoff_not_live() {
        assert_eq!(backoff_for(&RunError::NeverLive), Some(RECHECK_INTERVAL));
        assert_eq!(
            backoff_for(&RunError::NotCurrentlyLive),
            Some(RECHECK_INTERVAL)
        );
    }

    #[test]
    fn backoff_transport() {
        let aborted = RunError::Record(RecordError::Http(util::DownloadError::IoError(
            std::io::Error::from(std::io::ErrorKind::ConnectionAborted),
        )));
        assert_eq!(backoff_for(&aborted), Some(CONNECTION_CLOSED_INTERVAL));
    }

    #[test]
    fn backoff_other_errors_retry_immediately() {
        assert_eq!(backoff_for(&RunError::Webcast(WebcastError::AccountPrivate)), None);
        assert_eq!(
            backoff_for(&RunError::Resolve(ResolveError::IpBlocked)),
            None
        );
        let not_found = RunError::Record(RecordError::Http(util::DownloadError::IoError(
            std::io::Error::from(std::io::ErrorKind::NotFound),
        )));
        assert_eq!(backoff_for(&not_found), None);
    }

    struct FakeTool;

    #[async_trait::async_trait]
    impl MediaTool for FakeTool {
        async fn remux_copy(
            &self,
            _input: &str,
            output: &Path,
            _limit: Option<Duration>,
        ) -> Result<(), FfmpegError> {
            tokio::fs::write(output, b"remuxed")
                .await
                .map_err(FfmpegError::IoError)
        }

        async fn transcode(&self, _input: &Path, output: &Path) -> Result<(), FfmpegError> {
            tokio::fs::write(output, b"converted")
                .await
                .map_err(FfmpegError::IoError)
        }
    }

    struct MissingTool;

    #[async_trait::async_trait]
    impl MediaTool for MissingTool {
        async fn remux_copy(
            &self,
            _input: &str,
            _output: &Path,
            _limit: Option<Duration>,
        ) -> Result<(), FfmpegError> {
            Err(FfmpegError::NotInstalled)
        }

        async fn transcode(&self, _input: &Path, _output: &Path) -> Result<(), FfmpegError> {
            Err(FfmpegError::NotInstalled)
        }
    }

    fn manual_config() -> RuntimeConfig {
        RuntimeConfig {
            mode: Mode::Manual,
            use_ffmpeg: false,
            duration: None,
            auto_convert: true,
            output_dir: String::new(),
        }
    }

    #[tokio::test]
    async fn convert_removes_raw_on_success() {
        let dir = tempfile::tempdir().expect("Could not create tempdir");
        let raw = dir.path().join("TK_x_2024.01.01_00-00-00_flv.mp4");
        std::fs::write(&raw, b"raw").expect("Could not write raw file");

        let client = HttpClient::new(None).expect("Could not create HttpClient");
        let tool = FakeTool;
        let config = manual_config();
        let controller = Controller::new(&client, &tool, &config);

        controller
            .convert_to_mp4(&raw.to_string_lossy())
            .await;

        assert!(!raw.exists(), "raw file should be removed");
        assert!(
            dir.path().join("TK_x_2024.01.01_00-00-00.mp4").exists(),
            "converted file should exist"
        );
    }

    #[tokio::test]
    async fn convert_keeps_raw_when_tool_missing() {
        let dir = tempfile::tempdir().expect("Could not create tempdir");
        let raw = dir.path().join("TK_x_2024.01.01_00-00-00_flv.mp4");
        std::fs::write(&raw, b"raw").expect("Could not write raw file");

        let client = HttpClient::new(None).expect("Could not create HttpClient");
        let tool = MissingTool;
        let config = manual_config();
        let controller = Controller::new(&client, &tool, &config);

        controller
            .convert_to_mp4(&raw.to_string_lossy())
            .await;

        assert!(raw.exists(), "raw file must be left untouched");
        assert!(!dir.path().join("TK_x_2024.01.01_00-00-00.mp4").exists());
    }

    #[tokio::test]
    async fn automatic_requires_ffmpeg() {
        let client = HttpClient::new(None).expect("Could not create HttpClient");
        let config = RuntimeConfig {
            mode: Mode::Automatic,
            use_ffmpeg: false,
            duration: None,
            auto_convert: false,
            output_dir: String::new(),
        };
        let tool = Ffmpeg;
        let controller = Controller::new(&client, &tool, &config);

        let res = controller
            .run(&TargetInput::Username("alice".into()))
            .await;
        assert!(matches!(res, Err(RunError::AutomaticRequiresFfmpeg)));
    }
}
