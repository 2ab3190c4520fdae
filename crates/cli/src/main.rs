use std::{
    cell::RefCell,
    io::{BufRead, IsTerminal},
    path::PathBuf,
    time::Instant,
};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use core_model::{PromptTemplate, RecordKey};
use resolve::{FetchError, Resolution, ResolvePhase, Resolver, Source};
use scheduler::PeriodicTask;
use store_sqlite::SqliteStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod ui;

use config::Config;
use render::OutputFormat;

#[derive(Parser)]
#[command(name = "spacelog")]
#[command(about = "Archive of daily space pictures with generated captions")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Init,
    Fetch(FetchArgs),
    Show {
        key: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    Watch {
        #[arg(long, default_value = "24h")]
        every: String,
    },
    Doctor,
}

#[derive(Args)]
struct FetchArgs {
    /// Day to fetch, YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Search the image library for a keyword instead of the daily picture.
    #[arg(long)]
    topic: Option<String>,
    /// Ignore the archived copy and generate a new one.
    #[arg(long, default_value_t = false)]
    refresh: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let t = Instant::now();

    let db_path = config.db_path();
    info!(path = %db_path.display(), "opening database");
    let store = SqliteStore::open(&db_path)?;
    store.init_schema()?;

    match cli.command {
        Commands::Init => {
            info!(elapsed = ?t.elapsed(), "initialized");
        }
        Commands::Fetch(args) => {
            let day = args.date.unwrap_or_else(today);
            let key = match args.topic.as_deref() {
                Some(topic) => RecordKey::topic(topic, day)?,
                None => RecordKey::date(day),
            };
            let resolver = build_resolver(&config, store)?;
            let resolution = resolve_with_timing(&resolver, &key, args.refresh)?;
            emit(
                &resolution.record,
                Some(resolution.source),
                args.format,
                args.output_dir,
            )?;
            info!(key = %key, elapsed = ?t.elapsed(), "fetch done");
        }
        Commands::Show {
            key,
            format,
            output_dir,
        } => {
            let key: RecordKey = key.parse()?;
            let Some(record) = store.lookup(&key.as_string())? else {
                anyhow::bail!("no archived record for {key}; run `spacelog fetch` first");
            };
            emit(&record, None, format, output_dir)?;
        }
        Commands::List { filter } => {
            let records = store.list_records()?;
            info!(records = records.len(), "records listed");
            let (records, terms) = match filter.as_deref() {
                Some(query) => ui::fuzzy_filter_records(&records, query),
                None => (records, Vec::new()),
            };
            if records.is_empty() {
                info!(elapsed = ?t.elapsed(), "no records");
            }
            ui::print_record_list(&records, &terms);
        }
        Commands::Watch { every } => {
            let interval = humantime::parse_duration(&every)
                .with_context(|| format!("invalid --every value {every:?}"))?;
            let resolver = build_resolver(&config, store)?;
            let handle = PeriodicTask::spawn("daily-refresh", interval, move || {
                let key = RecordKey::date(today());
                let resolution = resolver
                    .resolve(&key, false)
                    .inspect_err(hint_for)?;
                let cached = resolution.source == Source::Cache;
                info!(
                    key = %key,
                    title = %resolution.record.title,
                    cached,
                    "daily record ready"
                );
                Ok(())
            })?;
            let every = humantime::format_duration(interval);
            if std::io::stdin().is_terminal() {
                info!(every = %every, "watching; press Enter to stop");
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line)?;
                let runs = handle.run_count();
                handle.cancel();
                info!(runs, elapsed = ?t.elapsed(), "watch stopped");
            } else {
                info!(every = %every, "watching until the process is terminated");
                handle.wait();
                anyhow::bail!("refresh task stopped unexpectedly");
            }
        }
        Commands::Doctor => {
            info!("running integrity check");
            let result = store.integrity_check()?;
            let records = store.count()?;
            println!("integrity: {result}");
            println!("records: {records}");
            info!(elapsed = ?t.elapsed(), "integrity check done");
        }
    }

    Ok(())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn build_resolver(config: &Config, store: SqliteStore) -> anyhow::Result<Resolver> {
    let client = adapter_common::http_client(config.http_timeout())
        .with_context(|| "building HTTP client")?;
    let provider = nasa::NasaProvider::new(
        nasa::ApodClient::new(
            client.clone(),
            &config.nasa.apod_base_url,
            &config.nasa.api_key,
        ),
        nasa::ImageLibraryClient::new(client.clone(), &config.nasa.library_base_url),
    );
    let generator = gemini::GeminiClient::new(
        client,
        &config.gemini.base_url,
        &config.gemini.model,
        config.gemini_api_key()?,
    );
    info!(model = generator.model(), "text generator ready");
    let template = match config.prompt.template.as_deref() {
        Some(template) => PromptTemplate::new(template).with_context(|| "invalid prompt.template")?,
        None => PromptTemplate::default(),
    };
    Ok(Resolver::new(
        Box::new(provider),
        Box::new(generator),
        template,
        store,
    ))
}

fn resolve_with_timing(
    resolver: &Resolver,
    key: &RecordKey,
    bypass_cache: bool,
) -> anyhow::Result<Resolution> {
    let started = Instant::now();
    let last = RefCell::new(started);
    let step = || {
        let now = Instant::now();
        let since_last = now.duration_since(*last.borrow());
        *last.borrow_mut() = now;
        since_last
    };
    let result = resolver.resolve_with_progress(key, bypass_cache, |phase| match phase {
        ResolvePhase::CacheLookup => {
            info!(key = %key, elapsed = ?started.elapsed(), delta = ?step(), "checking archive");
        }
        ResolvePhase::CacheHit => {
            info!(key = %key, elapsed = ?started.elapsed(), delta = ?step(), "found in archive");
        }
        ResolvePhase::Fetching => {
            info!(key = %key, elapsed = ?started.elapsed(), delta = ?step(), "fetching media");
        }
        ResolvePhase::Generating { prompt_chars } => {
            info!(
                key = %key,
                prompt_chars,
                elapsed = ?started.elapsed(),
                delta = ?step(),
                "generating brief"
            );
        }
        ResolvePhase::Storing => {
            info!(key = %key, elapsed = ?started.elapsed(), delta = ?step(), "storing record");
        }
        ResolvePhase::Done { source } => {
            info!(
                key = %key,
                source = ?source,
                elapsed = ?started.elapsed(),
                delta = ?step(),
                "resolve done"
            );
        }
    });
    result.inspect_err(hint_for).map_err(anyhow::Error::from)
}

fn hint_for(err: &FetchError) {
    warn!(error = %err, "resolve failed");
    if let Some(hint) = ui::failure_hint(err) {
        ui::print_hint(hint);
    }
}

fn emit(
    record: &core_model::ArchiveRecord,
    source: Option<Source>,
    format: OutputFormat,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => ui::print_record(record, source),
        OutputFormat::Json => println!("{}", render::render_record_json(record, source)?),
        OutputFormat::Markdown | OutputFormat::Html => {
            let content = if format == OutputFormat::Html {
                render::render_record_html(record)
            } else {
                render::render_record_markdown(record)
            };
            let extension = format.extension().unwrap_or("txt");
            let dir = render::resolve_output_dir(output_dir)?;
            let path = dir.join(render::export_file_name(record, extension));
            std::fs::write(&path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "exported record");
            println!("{}", path.display());
        }
    }
    Ok(())
}
