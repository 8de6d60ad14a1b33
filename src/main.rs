use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use callscribe::application::ports::{CallRepository, TranscriptionEngine};
use callscribe::application::services::{PipelineOptions, PipelineService};
use callscribe::domain::RetryPolicy;
use callscribe::infrastructure::audio::{LocalWhisperEngine, TranscriptionEngineFactory};
use callscribe::infrastructure::fetch::HttpAudioFetcher;
use callscribe::infrastructure::observability::{init_tracing, TracingConfig};
use callscribe::infrastructure::persistence::{create_pool, MySqlCallRepository};
use callscribe::infrastructure::service::{ServiceState, ServiceSupervisor};
use callscribe::infrastructure::storage::FsTranscriptStore;
use callscribe::presentation::cli::{Cli, Command, OutputFormat, RunArgs, ServeArgs, ServiceAction};
use callscribe::presentation::{report, AppState, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(TracingConfig::default());

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "Configuration error");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Some(Command::Serve(args)) => exit_on_error(serve(args, &settings).await),
        Some(Command::Service { action }) => exit_on_error(service(action, &settings).await),
        None => match run_pipeline(cli.run, settings).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(error = %e, "Fatal error");
                ExitCode::from(2)
            }
        },
    }
}

fn exit_on_error(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::from(2)
        }
    }
}

async fn run_pipeline(args: RunArgs, settings: Settings) -> anyhow::Result<ExitCode> {
    let start = parse_date(
        args.start_date
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--start-date is required"))?,
    )?;
    let end = parse_date(
        args.end_date
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--end-date is required"))?,
    )?;
    anyhow::ensure!(
        start <= end,
        "start date {} must not be after end date {}",
        start,
        end
    );

    let pool = create_pool(&settings.database).await?;
    let repository = Arc::new(MySqlCallRepository::new(pool));

    if args.dry_run {
        return dry_run(repository, start, end, args.query.as_deref()).await;
    }

    let fetcher = Arc::new(HttpAudioFetcher::new(
        settings.audio_root.clone(),
        settings.audio_base_url.clone(),
        RetryPolicy::default(),
    ));
    let engine = TranscriptionEngineFactory::create(
        settings.transcription_mode,
        &settings.whisper_model,
        settings.language.clone(),
        &settings.service_url,
        settings.service_startup_wait,
    )
    .await?;
    let store = Arc::new(FsTranscriptStore::new(settings.transcript_root.clone()));

    let cleanup_audio = if args.keep_audio {
        false
    } else {
        args.cleanup_audio || settings.cleanup_audio
    };
    let options = PipelineOptions {
        workers: args.workers.unwrap_or(settings.workers),
        chunk_size: args.chunk_size.unwrap_or(settings.chunk_size),
        cleanup_audio,
        reprocess: args.reprocess,
        failure_abort_threshold: settings.failure_abort_threshold,
        transcription_retry: RetryPolicy::default(),
    };
    let pipeline = PipelineService::new(repository, fetcher, engine, store, options);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, letting in-flight records finish");
            signal_cancel.cancel();
        }
    });

    let summary = pipeline.run(start, end, args.query.as_deref(), cancel).await?;

    match args.output_format {
        OutputFormat::Json => {
            let path = report::write_json_report(&summary, &settings.report_dir).await?;
            tracing::info!(path = %path.display(), "JSON report written");
        }
        OutputFormat::Summary => report::print_summary(&summary),
    }

    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// The database reader step only: list what a real run would process.
async fn dry_run(
    repository: Arc<MySqlCallRepository>,
    start: NaiveDate,
    end: NaiveDate,
    custom_query: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let records = repository.calls_in_range(start, end, custom_query).await?;
    println!(
        "Dry run: {} record(s) between {} and {}",
        records.len(),
        start,
        end
    );
    for record in records.iter().take(5) {
        println!(
            "  call {} | {} | {} | {}",
            record.call_id, record.started_at, record.user_type, record.audio_url
        );
    }
    if records.len() > 5 {
        println!("  ... and {} more", records.len() - 5);
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(args: ServeArgs, settings: &Settings) -> anyhow::Result<()> {
    let engine = LocalWhisperEngine::new(settings.whisper_model.clone(), settings.language.clone());
    // load the model before binding so /health only answers once it is resident
    engine
        .preload()
        .await
        .map_err(|e| anyhow::anyhow!("model preload failed: {}", e))?;

    let engine: Arc<dyn TranscriptionEngine> = Arc::new(engine);
    let state = AppState {
        engine,
        model: settings.whisper_model.clone(),
    };
    let router = callscribe::presentation::create_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!(%addr, model = %settings.whisper_model, "Transcription service listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn service(action: ServiceAction, settings: &Settings) -> anyhow::Result<()> {
    let supervisor = ServiceSupervisor::new(&settings.state_dir, &settings.service_url);
    match action {
        ServiceAction::Start => {
            let program = std::env::current_exe()?;
            let port = service_port(&settings.service_url);
            let args = vec![
                "serve".to_string(),
                "--host".to_string(),
                "127.0.0.1".to_string(),
                "--port".to_string(),
                port.to_string(),
            ];
            let pid = supervisor
                .start(&program, &args, settings.service_start_timeout)
                .await?;
            println!("service ready (pid {})", pid);
        }
        ServiceAction::Stop => {
            supervisor.stop(Duration::from_secs(30)).await?;
            println!("service stopped");
        }
        ServiceAction::Status => {
            let state = supervisor.status().await?;
            println!("{}", state);
            if state == ServiceState::Absent {
                println!("start it with `callscribe service start`");
            }
        }
    }
    Ok(())
}

fn service_port(service_url: &str) -> u16 {
    reqwest::Url::parse(service_url)
        .ok()
        .and_then(|url| url.port_or_known_default())
        .unwrap_or(8000)
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid date `{}`, expected YYYY-MM-DD", raw))
}
