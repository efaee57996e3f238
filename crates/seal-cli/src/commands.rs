use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use colored::Colorize;
use seal_issuance::{
    FallbackMode, IssuanceConfig, LocalAuthority, Pipeline, TimestampAuthority,
    UnreachableAuthority,
};
use seal_store::FsArchiveStore;
use seal_types::{Actor, ContentDigest, LineItem, Party, Record, RecordContent, SeriesKey};
use tracing::{debug, info};

use crate::cli::{Cli, Command, ConfigArgs, DemoArgs, DigestArgs, OutputFormat};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Demo(args) => cmd_demo(args, cli.format).await,
        Command::Digest(args) => cmd_digest(args, cli.format),
        Command::Config(args) => cmd_config(args, cli.format),
    }
}

fn load_config(file: Option<&std::path::Path>) -> anyhow::Result<IssuanceConfig> {
    match file {
        Some(path) => IssuanceConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(IssuanceConfig::default()),
    }
}

async fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }
    let series = SeriesKey::new(args.series.clone())?;
    let mut config = load_config(args.config.as_deref())?;

    let authority: Arc<dyn TimestampAuthority> = if args.fallback {
        config.timestamp.fallback = FallbackMode::LocalUnverified;
        Arc::new(UnreachableAuthority)
    } else {
        Arc::new(LocalAuthority::generate())
    };

    let mut builder = Pipeline::builder(config, authority);
    if let Some(dir) = &args.archive {
        let store = FsArchiveStore::open(dir)
            .with_context(|| format!("opening archive at {}", dir.display()))?;
        builder = builder.archive(Arc::new(store));
    }
    let pipeline = Arc::new(builder.build()?);
    let actor = Actor::new("seal-cli");
    debug!(series = %series.as_str(), count = args.count, fallback = args.fallback, "starting demo");

    let mut handles = Vec::with_capacity(args.count as usize);
    for i in 1..=args.count {
        let pipeline = Arc::clone(&pipeline);
        let actor = actor.clone();
        let series = series.clone();
        handles.push(tokio::spawn(async move {
            let lifecycle = pipeline.lifecycle();
            let draft = lifecycle.create_draft(series, sample_content(i), &actor);
            lifecycle.save_draft(&draft, &actor)?;
            lifecycle.issue(draft, &actor).await
        }));
    }
    let mut issued = Vec::with_capacity(handles.len());
    for handle in handles {
        issued.push(handle.await??);
    }
    issued.sort_by_key(|r| r.sequence_number());

    let mut cancellation = None;
    if args.cancel_first {
        if let Some(first) = issued.first() {
            let record = pipeline
                .lifecycle()
                .cancel(first.record_id(), "issued by mistake", &actor)
                .await?;
            cancellation = Some(record);
        }
    }

    let mut rows = Vec::new();
    for record in issued.iter().chain(cancellation.iter()) {
        let trust = pipeline.lifecycle().verify_record(record.record_id(), &actor)?;
        let status = pipeline.lifecycle().status_of(record.record_id())?;
        rows.push((record, status, trust));
    }

    let entries = pipeline.verify_audit_chain()?;
    let continuity = pipeline.continuity(&series)?;
    info!(issued = issued.len(), entries, "demo complete");
    let width = pipeline.lifecycle().config().number_width;

    match format {
        OutputFormat::Json => {
            let records: Vec<_> = rows
                .iter()
                .map(|(record, status, trust)| {
                    serde_json::json!({
                        "record_id": record.record_id().to_string(),
                        "document_number": record.document_number(width),
                        "kind": record.kind(),
                        "status": status,
                        "sha256": record.content_digest().map(ContentDigest::to_hex),
                        "gross": record.content().totals().ok().map(|t| t.gross),
                        "trust_status": trust,
                    })
                })
                .collect();
            let out = serde_json::json!({
                "series": series.as_str(),
                "records": records,
                "audit_entries": entries,
                "continuity": continuity,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!(
                "{} Issued {} record(s) in series {}",
                "✓".green().bold(),
                issued.len(),
                series.as_str().bold()
            );
            for (record, status, trust) in &rows {
                print_record(record, width, &status.to_string(), *trust);
            }
            println!(
                "{} Audit chain verified ({} entries)",
                "✓".green().bold(),
                entries
            );
            if continuity.is_continuous() {
                println!(
                    "{} Series continuous: {} issued, {} skipped, next {}",
                    "✓".green().bold(),
                    continuity.issued.len(),
                    continuity.skipped.len(),
                    continuity.next_value
                );
            } else {
                println!(
                    "{} Series broken: gaps {:?}, duplicates {:?}",
                    "✗".red().bold(),
                    continuity.gaps,
                    continuity.duplicates
                );
            }
            if let Some(dir) = &args.archive {
                println!("  archive: {}", dir.display().to_string().dimmed());
            }
        }
    }
    Ok(())
}

fn print_record(record: &Record, width: usize, status: &str, trust: seal_types::TrustStatus) {
    let number = record.document_number(width).unwrap_or_default();
    let digest = record
        .content_digest()
        .map(ContentDigest::short_hex)
        .unwrap_or_default();
    let gross = match record.content().totals() {
        Ok(totals) => format_amount(totals.gross, &record.content().currency),
        Err(e) => e.to_string(),
    };
    let trust_label = if trust.is_verified() {
        trust.to_string().green()
    } else {
        trust.to_string().yellow()
    };
    println!(
        "  {}  {}  {:>12}  {}  {}",
        number.yellow(),
        digest.dimmed(),
        gross,
        status,
        trust_label
    );
}

fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

fn cmd_digest(args: DigestArgs, format: OutputFormat) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let digest = ContentDigest::of(&bytes);
    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "file": args.file.display().to_string(),
                "size": bytes.len(),
                "sha256": digest.to_hex(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => println!("{}  {}", digest.to_hex(), args.file.display()),
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.file.as_deref())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn party(name: &str, city: &str, tax_id: Option<&str>) -> Party {
    Party {
        name: name.into(),
        street: "Hauptstraße 5".into(),
        zip: "80331".into(),
        city: city.into(),
        country: "DE".into(),
        tax_id: tax_id.map(Into::into),
        email: None,
        phone: None,
    }
}

fn sample_content(i: u32) -> RecordContent {
    RecordContent {
        issue_date: Utc::now().date_naive(),
        delivery_start: None,
        delivery_end: None,
        seller: party("Demo Seller GmbH", "München", Some("DE987654321")),
        buyer: party(&format!("Customer {i}"), "Hamburg", None),
        currency: "EUR".into(),
        line_items: vec![LineItem {
            description: format!("Service package {i}"),
            quantity: i64::from(i),
            unit: "pc".into(),
            unit_price: 9_900,
            tax_rate_bp: 1900,
        }],
        tax_exempt: false,
        tax_exempt_reason: None,
        notes: None,
        payment_terms: Some("Payable within 30 days".into()),
    }
}
