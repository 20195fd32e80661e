//! Command-line access to the extractor and the error classifier.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use webpilot_extract::StructuredContent;
use webpilot_llm::classify::{classify_signal, ProviderSignal, ProviderSignalKind};
use webpilot_llm::DEFAULT_MODEL;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tagged content from an LLM response (file or stdin)
    Extract {
        /// XML-like tag wrapping the relevant content
        #[arg(long)]
        outer_tag: Option<String>,
        /// Fenced code block language wrapping the payload
        #[arg(long)]
        inner_tag: Option<String>,
        /// Tag that may follow an unterminated outer tag
        #[arg(long)]
        next_outer_tag: Option<String>,
        /// Tolerate a missing closing outer tag
        #[arg(long)]
        lenient_outer: bool,
        /// Tolerate a missing inner fence
        #[arg(long)]
        lenient_inner: bool,
        /// Recover content that runs into the next outer tag
        #[arg(long)]
        lenient_next: bool,
        /// Input file; stdin when omitted
        file: Option<PathBuf>,
    },
    /// Show how a provider failure is classified
    Classify {
        /// Failure family, e.g. rate_limit, authentication, bad_request
        #[arg(long)]
        kind: ProviderSignalKind,
        /// Model the failing call was made with
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        /// Provider error text
        message: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            outer_tag,
            inner_tag,
            next_outer_tag,
            lenient_outer,
            lenient_inner,
            lenient_next,
            file,
        } => {
            let mut sc = StructuredContent::new()
                .fail_if_final_tag(!lenient_outer)
                .fail_if_inner_tag(!lenient_inner)
                .fail_if_next_outer_tag(!lenient_next);
            if let Some(tag) = outer_tag {
                sc = sc.with_outer_tag(tag);
            }
            if let Some(tag) = inner_tag {
                sc = sc.with_inner_tag(tag);
            }
            if let Some(tag) = next_outer_tag {
                sc = sc.with_next_outer_tag(tag);
            }

            let text = read_input(file.as_deref())?;
            let content = sc.extract(&text)?;
            println!("{content}");
        }
        Commands::Classify {
            kind,
            model,
            message,
        } => {
            let error = classify_signal(&ProviderSignal::new(kind, message), &model);
            println!("{error:?}");
            println!("dev: {}", error.dev_message());
            println!("user: {}", error.user_message());
            if let Some(agent) = error.agent_message() {
                println!("agent: {agent}");
            }
            println!("retry later: {}", error.should_retry_later());
        }
    }

    Ok(())
}

fn read_input(file: Option<&std::path::Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}
