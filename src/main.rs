use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::{error, warn};

use tkl_rs::{
    config::{self, AppConfig, Mode, RuntimeConfig},
    controller::{Controller, RunError},
    ffmpeg::Ffmpeg,
    identity::TargetInput,
    recorder::RecordError,
    util::HttpClient,
};

#[derive(Parser, Debug)]
#[command(
    name = "tkl-rs",
    about = "TikTok Live Recorder - A tool for recording live TikTok sessions."
)]
struct Args {
    /// Record a live session from the TikTok URL
    #[arg(long)]
    url: Option<String>,

    /// Record a live session from the TikTok username
    #[arg(long)]
    user: Option<String>,

    /// Record a live session from the TikTok room ID
    #[arg(long = "room_id")]
    room_id: Option<String>,

    /// Recording mode: manual records once, automatic polls until the user
    /// goes live [default: from config file]
    #[arg(long)]
    mode: Option<String>,

    /// Use an HTTP proxy to bypass login restrictions in some countries
    #[arg(long)]
    proxy: Option<String>,

    /// Output directory where recordings are saved
    #[arg(long)]
    output: Option<String>,

    /// Record through ffmpeg instead of streaming the body directly
    /// (required for automatic mode)
    #[arg(long)]
    ffmpeg: bool,

    /// Stop recording after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Convert the raw capture to MP4 without asking
    #[arg(long = "auto-convert")]
    auto_convert: bool,

    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let config = match AppConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not read {}: {}", args.config.display(), e);
            return 1;
        }
    };
    println!("{}", config.banner);

    let input = match TargetInput::from_options(args.url, args.user, args.room_id) {
        Ok(input) => input,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let mode = match args
        .mode
        .as_deref()
        .unwrap_or(&config.default_mode)
        .parse::<Mode>()
    {
        Ok(mode) => mode,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let runtime = RuntimeConfig {
        mode,
        use_ffmpeg: args.ffmpeg,
        duration: args.duration.map(Duration::from_secs),
        auto_convert: args.auto_convert,
        output_dir: args.output.unwrap_or_default(),
    };

    let client = match HttpClient::new(args.proxy.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Could not create HTTP client: {} (proxy example: {})",
                e, config.proxy_example
            );
            return 1;
        }
    };

    match config::load_cookies(config.cookies_path.as_ref()) {
        Ok(jar) => {
            if let Err(e) = client.set_cookies(&jar) {
                warn!("Could not apply cookies: {}", e);
            }
        }
        Err(e) => warn!("Could not load cookies from {}: {}", config.cookies_path, e),
    }

    let tool = Ffmpeg;
    let controller = Controller::new(&client, &tool, &runtime);
    match controller.run(&input).await {
        Ok(()) => 0,
        // A missing tool mid-recording is the one hard failure
        Err(RunError::Record(RecordError::ToolNotFound)) => {
            error!("FFmpeg is not installed or not in PATH");
            1
        }
        Err(e) => {
            error!("{}", e);
            0
        }
    }
}
