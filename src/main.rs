use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use holdspeak::error::Result;
use holdspeak::ipc::client::send_command;
use holdspeak::ipc::protocol::Command;
use holdspeak::settings::{OutputMode, Settings, TranscriptionMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "holdspeak",
    version,
    about = "Push-to-talk transcription: hold a key, speak, it types"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Model file (.bin) to load instead of scanning the models directory
    #[arg(long)]
    model: Option<PathBuf>,

    /// Audio input device name (see `holdspeak devices`)
    #[arg(long)]
    device: Option<String>,

    /// Emit text at every pause while the key is held
    #[arg(long, conflicts_with = "buffered")]
    continuous: bool,

    /// One transcription per key release
    #[arg(long)]
    buffered: bool,

    /// Keep the microphone open between recordings
    #[arg(long, conflicts_with = "no_warm")]
    warm: bool,

    /// Close the microphone after each recording
    #[arg(long)]
    no_warm: bool,

    /// Output via simulated typing
    #[arg(long = "type", conflicts_with = "paste")]
    type_output: bool,

    /// Output via clipboard paste
    #[arg(long)]
    paste: bool,

    /// Force GPU inference on
    #[arg(long, conflicts_with = "no_gpu")]
    gpu: bool,

    /// Force GPU inference off
    #[arg(long)]
    no_gpu: bool,

    /// Inference threads (0 = auto)
    #[arg(long)]
    threads: Option<i32>,

    /// Language code, or "auto" to detect
    #[arg(long)]
    lang: Option<String>,

    /// Disable voice activity detection
    #[arg(long)]
    no_vad: bool,

    /// Input gain before the VAD (0.5 - 3.0)
    #[arg(long)]
    gain: Option<f32>,

    /// Increase status output (-v perf lines, -vv filter detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn as_bool(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query the running daemon's state
    Status,
    /// Stop the running daemon
    Stop,
    /// List local models
    Models,
    /// Switch the daemon to a model by name
    Model { name: String },
    /// Toggle continuous transcription
    Continuous {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Toggle keeping the microphone warm
    MicWarm {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Rescan the models directory
    Reload,
    /// Start/stop recording (for compositor keybindings)
    Toggle {
        /// Press Return after the text is injected
        #[arg(long)]
        send: bool,
    },
    /// List audio input devices
    Devices,
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Some(Commands::Devices) => run_devices(),
        Some(command) => run_control(command),
        None => run_daemon(&cli),
    };
    std::process::exit(exit_code);
}

/// Forward a control subcommand to the running daemon.
fn run_control(command: &Commands) -> i32 {
    let ipc_command = match command {
        Commands::Status => Command::Status,
        Commands::Stop => Command::Stop,
        Commands::Models => Command::Models,
        Commands::Model { name } => Command::Model { name: name.clone() },
        Commands::Continuous { state } => Command::Continuous {
            on: state.as_bool(),
        },
        Commands::MicWarm { state } => Command::MicWarm {
            on: state.as_bool(),
        },
        Commands::Reload => Command::Reload,
        Commands::Toggle { send } => Command::Toggle { send: *send },
        Commands::Devices => unreachable!("handled before dispatch"),
    };

    match send_command(&ipc_command) {
        Ok(response) => {
            println!("{}", response.render());
            response.exit_code()
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

fn run_devices() -> i32 {
    match holdspeak::audio::capture::list_devices() {
        Ok(devices) => {
            for device in devices {
                println!("{}", device);
            }
            0
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

/// Apply CLI flag overrides on top of the persisted settings.
fn settings_from_cli(cli: &Cli) -> Settings {
    let mut settings = Settings::load().with_env_overrides();

    if cli.device.is_some() {
        settings.device = cli.device.clone();
    }
    if cli.continuous {
        settings.transcription_mode = TranscriptionMode::Continuous;
    }
    if cli.buffered {
        settings.transcription_mode = TranscriptionMode::Buffered;
    }
    if cli.warm {
        settings.keep_mic_warm = true;
    }
    if cli.no_warm {
        settings.keep_mic_warm = false;
    }
    if cli.type_output {
        settings.output_mode = OutputMode::Type;
    }
    if cli.paste {
        settings.output_mode = OutputMode::Paste;
    }
    if cli.gpu {
        settings.use_gpu = true;
    }
    if cli.no_gpu {
        settings.use_gpu = false;
    }
    if let Some(threads) = cli.threads {
        settings.thread_count = threads;
    }
    if let Some(lang) = &cli.lang {
        settings.language = lang.clone();
    }
    if cli.no_vad {
        settings.vad.enabled = false;
    }
    if let Some(gain) = cli.gain {
        settings.input_gain = gain;
    }

    settings
}

fn run_daemon(cli: &Cli) -> i32 {
    let settings = settings_from_cli(cli);
    let model_path = cli.model.clone();
    let verbosity = cli.verbose;

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return 1;
        }
    };

    let result: Result<()> =
        runtime.block_on(holdspeak::daemon::run(settings, None, model_path, verbosity));

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}
