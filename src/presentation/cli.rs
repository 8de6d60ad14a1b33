use clap::{Args, Parser, Subcommand, ValueEnum};

/// Process recorded calls into transcripts.
///
/// Without a subcommand, runs the batch pipeline over the given date range:
/// read call records from MySQL, download each leg's audio, transcribe it,
/// and write dated transcript artifacts.
#[derive(Debug, Parser)]
#[command(name = "callscribe", version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// First calendar day to process (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last calendar day to process (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Custom SQL used verbatim; it must take the two dates as positional
    /// parameters and alias its columns to the expected names
    #[arg(long)]
    pub query: Option<String>,

    /// Report format at the end of the run
    #[arg(long, value_enum, default_value = "summary")]
    pub output_format: OutputFormat,

    /// Show what would be processed without downloading or transcribing
    #[arg(long)]
    pub dry_run: bool,

    /// Delete downloaded audio after each successful transcription
    #[arg(long, conflicts_with = "keep_audio")]
    pub cleanup_audio: bool,

    /// Keep downloaded audio even when cleanup is enabled in the environment
    #[arg(long)]
    pub keep_audio: bool,

    /// Re-transcribe legs that already have a transcript
    #[arg(long)]
    pub reprocess: bool,

    /// Records in flight at once (defaults to MAX_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Records dispatched per batch (defaults to CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary on stdout
    Summary,
    /// JSON report file under REPORT_PATH
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the transcription service: the embedded model behind HTTP, kept
    /// resident across many pipeline runs
    Serve(ServeArgs),
    /// Manage the transcription service process
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8000)]
    pub port: u16,
}

#[derive(Debug, Subcommand)]
pub enum ServiceAction {
    /// Spawn the service detached and wait until its health probe answers
    Start,
    /// Signal the recorded service process and wait for it to exit
    Stop,
    /// Report absent / starting / ready
    Status,
}
