use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use tracing_subscriber::EnvFilter;

mod cli;
mod completion;
mod config;
mod error;
mod retrieval;
mod sql;
#[cfg(test)]
mod test_support;
mod util;
mod validate;
mod workflow;

use crate::cli::{AskArgs, BatchArgs, Command, GlobalArgs, RootArgs, SchemaArgs, SearchArgs};
use crate::completion::CompletionService;
use crate::config::{resolve_settings, Settings};
use crate::retrieval::RetrievalIndex;
use crate::sql::{QueryEngine, SqlGenerator};
use crate::validate::answer_text;
use crate::workflow::{run_batch, Workflow};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing();

    match args.command {
        Command::Ask(cmd) => run_ask(&args.global, &cmd),
        Command::Batch(cmd) => run_batch_file(&args.global, &cmd),
        Command::Search(cmd) => run_search(&args.global, &cmd),
        Command::Schema(cmd) => run_schema(&args.global, &cmd),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Long-lived components shared by every run in one process.
struct Session {
    settings: Settings,
    index: RetrievalIndex,
    engine: QueryEngine,
    generator: SqlGenerator,
    completion: Option<Box<dyn CompletionService>>,
}

impl Session {
    fn open(global: &GlobalArgs, top_k: Option<usize>) -> Result<Self> {
        let settings = resolve_settings(&global.overrides(top_k))?;
        if let Some(path) = &settings.config_path {
            tracing::debug!(path = %path.display(), "config loaded");
        }

        let index = RetrievalIndex::build_or_empty(&settings.docs_dir);
        let engine = QueryEngine::new(&settings.db_path);
        let generator = SqlGenerator::from_engine(&engine)
            .with_context(|| format!("load schema from {}", settings.db_path.display()))?;

        let completion = match &settings.completion {
            Some(backend) => {
                let service = backend
                    .connect()
                    .with_context(|| format!("configure completion backend {}", backend.describe()))?;
                tracing::info!(backend = %backend.describe(), "completion service configured");
                Some(service)
            }
            None => {
                tracing::warn!("no completion service configured; using fallbacks");
                None
            }
        };

        Ok(Self {
            settings,
            index,
            engine,
            generator,
            completion,
        })
    }

    fn workflow(&self) -> Workflow<'_> {
        Workflow::new(
            &self.index,
            &self.engine,
            &self.generator,
            self.completion.as_deref(),
        )
        .with_top_k(self.settings.top_k)
    }
}

fn run_ask(global: &GlobalArgs, args: &AskArgs) -> Result<()> {
    let session = Session::open(global, args.top_k)?;
    let state = session.workflow().run(&args.question, &args.format_hint);

    if args.json {
        let text = serde_json::to_string_pretty(&state).context("serialize run state")?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", answer_text(&state.final_answer));
    println!("route: {}", state.route);
    println!("confidence: {:.2}", state.confidence);
    if !state.explanation.is_empty() {
        println!("explanation: {}", state.explanation);
    }
    if !state.citations.is_empty() {
        println!("citations: {}", state.citations.join(", "));
    }
    if !state.sql_query.is_empty() {
        println!("sql: {}", state.sql_query);
    }
    for error in &state.errors {
        eprintln!("unresolved: {error}");
    }
    Ok(())
}

fn run_batch_file(global: &GlobalArgs, args: &BatchArgs) -> Result<()> {
    let session = Session::open(global, args.top_k)?;
    let input = File::open(&args.input)
        .with_context(|| format!("open batch input {}", args.input.display()))?;
    if let Some(parent) = args.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let output = File::create(&args.output)
        .with_context(|| format!("create batch output {}", args.output.display()))?;
    let mut writer = BufWriter::new(output);

    let summary = run_batch(&session.workflow(), BufReader::new(input), &mut writer)?;
    println!(
        "answered {} questions ({} rejected, {} unresolved) -> {}",
        summary.answered,
        summary.rejected,
        summary.unresolved,
        args.output.display()
    );
    Ok(())
}

fn run_search(global: &GlobalArgs, args: &SearchArgs) -> Result<()> {
    let settings = resolve_settings(&global.overrides(args.top_k))?;
    let index = RetrievalIndex::build(&settings.docs_dir)?;
    let hits = match args.query.as_deref() {
        Some(query) => index.search(query, settings.top_k),
        None => index.chunks().cloned().collect(),
    };

    if args.json {
        let text = serde_json::to_string_pretty(&hits).context("serialize search hits")?;
        println!("{text}");
        return Ok(());
    }
    if hits.is_empty() {
        let cwd = std::env::current_dir().ok();
        let root = index
            .root()
            .map(|root| util::display_path(root, cwd.as_deref()))
            .unwrap_or_default();
        eprintln!("no matches among {} chunks in {root}", index.len());
        return Ok(());
    }
    for hit in hits {
        let first_line = hit.content.lines().next().unwrap_or_default();
        println!("{:.3}\t{}\t{}", hit.score, hit.id, util::truncate_string(first_line, 80));
    }
    Ok(())
}

fn run_schema(global: &GlobalArgs, args: &SchemaArgs) -> Result<()> {
    let settings = resolve_settings(&global.overrides(None))?;
    let engine = QueryEngine::new(&settings.db_path);
    let text = match args.table.as_deref() {
        Some(table) => engine.schema(table)?,
        None => engine.all_schemas()?,
    };
    println!("{text}");
    Ok(())
}
