use std::{
    path::{Path, MAIN_SEPARATOR},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use futures::{Future, Stream, StreamExt};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    ffmpeg::{FfmpegError, MediaTool},
    util::{self, HttpClient},
};

const TIMESTAMP_FORMAT: &str = "%Y.%m.%d_%H-%M-%S";

/// Suffix marking an un-transcoded capture awaiting optional post-processing.
pub const RAW_SUFFIX: &str = "_flv.mp4";

/// A confirmed live broadcast about to be captured. Created only after
/// liveness is confirmed and a pull URL obtained; dropped when recording ends.
pub struct LiveSession {
    pub pull_url: String,
    pub started_at: DateTime<Local>,
    pub duration_limit: Option<Duration>,
    pub output_path: String,
}

impl LiveSession {
    pub fn new(
        pull_url: String,
        username: &str,
        output_dir: &str,
        duration_limit: Option<Duration>,
    ) -> Self {
        let started_at = Local::now();
        let output_path = output_path(
            output_dir,
            username,
            &started_at.format(TIMESTAMP_FORMAT).to_string(),
        );

        LiveSession {
            pull_url,
            started_at,
            duration_limit,
            output_path,
        }
    }
}

/// How a recording ended. Failures travel as [`RecordError`]; an operator
/// interrupt is a clean stop, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutcome {
    Completed { path: String },
    Interrupted { path: String, bytes_written: u64 },
}

impl RecordingOutcome {
    pub fn path(&self) -> &str {
        match self {
            RecordingOutcome::Completed { path } => path,
            RecordingOutcome::Interrupted { path, .. } => path,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("ffmpeg is not installed or not in PATH")]
    ToolNotFound,
    #[error("ffmpeg error: {0}")]
    Tool(String),
    #[error("http error: {0}")]
    Http(#[from] util::DownloadError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FfmpegError> for RecordError {
    fn from(err: FfmpegError) -> Self {
        match err {
            FfmpegError::NotInstalled => RecordError::ToolNotFound,
            FfmpegError::Runtime(stderr) => RecordError::Tool(stderr),
            FfmpegError::IoError(e) => RecordError::Io(e),
        }
    }
}

/// Builds `{output_dir}{sep}TK_{username}_{timestamp}_flv.mp4`. The separator
/// is appended only when the directory is non-empty and does not already end
/// in one.
pub fn output_path(output_dir: &str, username: &str, timestamp: &str) -> String {
    let mut dir = output_dir.to_string();
    if !dir.is_empty() && !dir.ends_with('/') && !dir.ends_with('\\') {
        dir.push(MAIN_SEPARATOR);
    }
    format!("{}TK_{}_{}{}", dir, username, timestamp, RAW_SUFFIX)
}

/// Final container name for a raw capture, with the `_flv` marker removed.
pub fn converted_path(raw: &str) -> String {
    raw.replace(RAW_SUFFIX, ".mp4")
}

/// Managed-process strategy: the external tool copies the codec stream
/// straight into the final container, so no `_flv` intermediate is produced.
pub async fn record_with_tool(
    tool: &dyn MediaTool,
    session: &LiveSession,
) -> Result<RecordingOutcome, RecordError> {
    info!("[PRESS 'q' TO STOP RECORDING]");

    let dest = converted_path(&session.output_path);
    tool.remux_copy(&session.pull_url, Path::new(&dest), session.duration_limit)
        .await?;

    Ok(RecordingOutcome::Completed { path: dest })
}

/// Direct-stream strategy: read the pull URL and write the body to disk in
/// chunks. Ctrl-C is caught at the loop boundary and turns the partial file
/// into a clean [`RecordingOutcome::Interrupted`].
pub async fn record_direct(
    client: &HttpClient,
    session: &LiveSession,
) -> Result<RecordingOutcome, RecordError> {
    info!("[PRESS ONLY ONCE CTRL + C TO STOP]");

    let resp = client.get_stream(&session.pull_url).await?;
    let stream = Box::pin(
        resp.bytes_stream()
            .map(|chunk| chunk.map_err(util::DownloadError::from)),
    );

    let mut file = File::create(&session.output_path).await?;
    let stop = Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    let (bytes_written, stopped) =
        copy_stream(stream, &mut file, session.duration_limit, stop).await?;
    info!("Recorded {}", util::format_bytes(bytes_written));

    if stopped {
        Ok(RecordingOutcome::Interrupted {
            path: session.output_path.clone(),
            bytes_written,
        })
    } else {
        Ok(RecordingOutcome::Completed {
            path: session.output_path.clone(),
        })
    }
}

/// Copies chunks from `stream` into `file` until the stream ends, the wall
/// clock reaches `limit`, or `stop` resolves. Returns the byte count and
/// whether the copy was stopped externally.
pub async fn copy_stream<S, B, F>(
    mut stream: S,
    file: &mut File,
    limit: Option<Duration>,
    mut stop: F,
) -> Result<(u64, bool), RecordError>
where
    S: Stream<Item = Result<B, util::DownloadError>> + Unpin,
    B: AsRef<[u8]>,
    F: Future<Output = ()> + Unpin,
{
    let start = Instant::now();
    let mut written = 0u64;
    let mut stopped = false;

    loop {
        tokio::select! {
            _ = &mut stop => {
                stopped = true;
                break;
            }
            chunk = stream.next() => match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(chunk.as_ref()).await?;
                    written += chunk.as_ref().len() as u64;

                    if limit.map_or(false, |limit| start.elapsed() >= limit) {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    file.flush().await?;
    Ok((written, stopped))
}
