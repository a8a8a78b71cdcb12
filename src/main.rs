use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mlscores::audit::{audit_all, ItemAudit};
use mlscores::config::Config;
use mlscores::report::{render_grouping, render_percentages, render_section};
use mlscores::retrieval::RetrievalClient;
use mlscores::sparql::SparqlHttpChannel;

/// Multilinguality scores of Wikidata (Wikibase) items
#[derive(Debug, Parser)]
#[command(name = "mlscores", version, about)]
struct Cli {
    /// One or more item identifiers (Q42, ...)
    #[arg(required = true)]
    identifiers: Vec<String>,

    /// One or more language codes (en, fr, ...); all found languages when omitted
    #[arg(short, long, num_args = 1..)]
    language: Option<Vec<String>>,

    /// Also list properties and values missing a label per language
    #[arg(long)]
    missing: bool,

    /// SPARQL endpoint (overrides MLSCORES_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Items audited at the same time (overrides MLSCORES_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging (stderr, so tables on stdout stay clean)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mlscores=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency.max(1);
    }

    let channel = SparqlHttpChannel::new(&config)?;
    info!("Querying {}", channel.endpoint());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending queries");
            on_interrupt.cancel();
        }
    });

    let client = RetrievalClient::new(channel, &config).with_cancellation(cancel);
    let results = audit_all(
        &client,
        &cli.identifiers,
        cli.language.as_deref(),
        config.phase_delay,
        config.concurrency,
    )
    .await;

    for (identifier, audit) in results {
        println!("For Wikidata (Wikibase) item: {}", identifier);
        match audit {
            ItemAudit::NoData => {
                println!("No properties and values found for the item.");
            }
            ItemAudit::Failed(e) => {
                println!("No data for the item: {}.", e);
            }
            ItemAudit::Report(report) => {
                let sections = [
                    (
                        &report.property_coverage,
                        "Language Percentages for property labels",
                    ),
                    (
                        &report.value_coverage,
                        "Language Percentages for property value labels",
                    ),
                    (
                        &report.combined_coverage,
                        "Combined Language Percentages for property label and property value labels",
                    ),
                ];
                for (section, title) in sections {
                    println!("{}", render_section(section, title, render_percentages));
                }

                if cli.missing {
                    let gaps = [
                        (
                            &report.properties_missing,
                            "Properties without labels per language",
                        ),
                        (
                            &report.values_missing,
                            "Property values without labels per language",
                        ),
                    ];
                    for (section, title) in gaps {
                        println!("{}", render_section(section, title, render_grouping));
                    }
                }
            }
        }
    }

    Ok(())
}
