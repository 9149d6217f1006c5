//! CLI argument parsing for the copilot.
//!
//! Global flags override `copilot.json`; each subcommand maps to one entry
//! point in `main.rs`.
use crate::config::Overrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "copilot",
    version,
    about = "Retail analytics copilot over policy documents and a Northwind database",
    after_help = "Examples:\n  copilot ask --question \"What is the return window for unopened beverages?\" --format-hint int\n  copilot batch --input questions.jsonl --output answers.jsonl\n  copilot search --query \"summer beverages 1997\"\n  copilot schema --table \"Order Details\"\n\nSet RUST_LOG=debug for a stage-by-stage transcript on stderr.",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (defaults to ./copilot.json, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory of policy documents to index
    #[arg(long, global = true, value_name = "DIR")]
    pub docs: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// LM command that reads a prompt on stdin (overrides config and env)
    #[arg(long, global = true, value_name = "COMMAND", conflicts_with = "no_lm")]
    pub lm: Option<String>,

    /// Run without a completion service (keyword routing, placeholder answers)
    #[arg(long, global = true)]
    pub no_lm: bool,
}

impl GlobalArgs {
    pub fn overrides(&self, top_k: Option<usize>) -> Overrides {
        Overrides {
            config: self.config.clone(),
            docs: self.docs.clone(),
            db: self.db.clone(),
            lm: self.lm.clone(),
            no_lm: self.no_lm,
            top_k,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Ask(AskArgs),
    Batch(BatchArgs),
    Search(SearchArgs),
    Schema(SchemaArgs),
}

/// Answer a single question.
#[derive(Parser, Debug)]
#[command(about = "Answer one question")]
pub struct AskArgs {
    /// Natural-language question
    #[arg(long, short = 'q')]
    pub question: String,

    /// Expected answer format (e.g. int, float, list[str], {customer:str})
    #[arg(long, default_value = "")]
    pub format_hint: String,

    /// Number of document chunks to retrieve
    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,

    /// Emit the full run state as JSON
    #[arg(long)]
    pub json: bool,
}

/// Answer every question in a JSONL file.
#[derive(Parser, Debug)]
#[command(about = "Answer questions from a JSONL file")]
pub struct BatchArgs {
    /// Input JSONL with {id, question, format_hint} per line
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Output JSONL, one answer per input line
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// Number of document chunks to retrieve
    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,
}

/// Query the document index directly.
#[derive(Parser, Debug)]
#[command(about = "Search the policy documents")]
pub struct SearchArgs {
    /// Query text; without it every indexed chunk is listed
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,

    /// Emit hits as JSON
    #[arg(long)]
    pub json: bool,
}

/// Print allow-listed schema text.
#[derive(Parser, Debug)]
#[command(about = "Print the schema the SQL generator sees")]
pub struct SchemaArgs {
    /// A single canonical table (default: all of them)
    #[arg(long)]
    pub table: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let args = RootArgs::try_parse_from([
            "copilot",
            "ask",
            "--question",
            "top 3 products",
            "--no-lm",
            "--db",
            "nw.sqlite",
        ])
        .expect("parse");
        assert!(args.global.no_lm);
        let overrides = args.global.overrides(Some(4));
        assert_eq!(overrides.db, Some(PathBuf::from("nw.sqlite")));
        assert_eq!(overrides.top_k, Some(4));
        let Command::Ask(ask) = args.command else {
            panic!("expected ask");
        };
        assert_eq!(ask.question, "top 3 products");
        assert_eq!(ask.format_hint, "");
    }

    #[test]
    fn lm_and_no_lm_conflict() {
        let result = RootArgs::try_parse_from([
            "copilot", "--lm", "llm", "--no-lm", "schema",
        ]);
        assert!(result.is_err());
    }
}
