//! `clickscape` - drive the photo pipeline from the shell

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clickscape_core::gate::check_file;
use clickscape_core::{
    Account, BatchUpload, LinkSigner, PhotoMetadata, PhotoPipeline, PipelineConfig, SignedLink,
    UploadFile, UserId,
};
use clickscape_imaging::DerivationEngine;
use clickscape_plan::{Plan, RuleResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn plan_arg() -> Arg {
    Arg::new("plan")
        .long("plan")
        .default_value("free")
        .value_parser(["free", "premium"])
        .help("Plan to apply")
}

fn cli() -> Command {
    Command::new("clickscape")
        .version(clickscape_core::VERSION)
        .about("ClickScape plan-gated photo pipeline")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file; environment overrides still apply"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("warn")
                .help("Log filter (trace, debug, info, warn, error or a directive list)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("rules")
                .about("Print the upload rules of a plan as JSON")
                .arg(plan_arg()),
        )
        .subcommand(
            Command::new("derive")
                .about("Gate and derive one file without storing it")
                .arg(plan_arg())
                .arg(
                    Arg::new("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Image to derive"),
                )
                .arg(
                    Arg::new("out-dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory for the derived files"),
                ),
        )
        .subcommand(
            Command::new("ingest")
                .about("Upload files into the uploads directory and print the records")
                .arg(plan_arg())
                .arg(
                    Arg::new("user")
                        .long("user")
                        .default_value("1")
                        .value_parser(value_parser!(u64))
                        .help("Uploading user id"),
                )
                .arg(
                    Arg::new("used-bytes")
                        .long("used-bytes")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Bytes the user already holds against the quota"),
                )
                .arg(Arg::new("title").long("title").default_value("").help("Shared title"))
                .arg(Arg::new("category").long("category").default_value("").help("Shared category"))
                .arg(
                    Arg::new("tags")
                        .long("tags")
                        .default_value("")
                        .help("Comma-separated tags"),
                )
                .arg(
                    Arg::new("price")
                        .long("price")
                        .default_value("0")
                        .value_parser(value_parser!(f64))
                        .help("Marketplace price; 0 leaves the photos unlisted"),
                )
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Files to upload as one batch"),
                ),
        )
        .subcommand(
            Command::new("sign")
                .about("Sign a download link for an uploads path")
                .arg(Arg::new("path").required(true).help("Path such as /uploads/<key>"))
                .arg(
                    Arg::new("ttl")
                        .long("ttl")
                        .value_parser(value_parser!(u64))
                        .help("Seconds until expiry; defaults to the configured TTL"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check a signed link query string")
                .arg(Arg::new("query").required(true).help("path=...&exp=...&sig=...")),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let level = matches
        .get_one::<String>("log-level")
        .map_or("warn", String::as_str);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = matches.get_flag("json-logs");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_target(false)))
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<PipelineConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env().context("invalid environment override")
}

fn selected_plan(args: &ArgMatches) -> Plan {
    args.get_one::<String>("plan")
        .map_or(Plan::Free, |p| Plan::parse(p.as_str()))
}

fn required<'a, T>(args: &'a ArgMatches, name: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(name)
        .with_context(|| format!("missing argument <{name}>"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(&matches);
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("rules", args)) => {
            let resolver = RuleResolver::new(config.plans).context("invalid plan limits")?;
            print_json(resolver.rules_for(selected_plan(args)))
        }
        Some(("derive", args)) => {
            derive(
                &config,
                selected_plan(args),
                required::<PathBuf>(args, "input")?,
                required::<PathBuf>(args, "out-dir")?,
            )
            .await
        }
        Some(("ingest", args)) => ingest(config, args).await,
        Some(("sign", args)) => {
            let path = required::<String>(args, "path")?;
            let ttl = args
                .get_one::<u64>("ttl")
                .copied()
                .unwrap_or(config.link_ttl_secs);
            let expires_at = Utc::now()
                .timestamp()
                .saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX));
            let link = LinkSigner::new(&config.download_secret).sign(path, expires_at);
            println!("{link}");
            Ok(())
        }
        Some(("verify", args)) => {
            let query = required::<String>(args, "query")?;
            let link = SignedLink::from_query(query).context("malformed link query")?;
            LinkSigner::new(&config.download_secret)
                .verify_link(&link, Utc::now().timestamp())
                .with_context(|| format!("link for {} refused", link.path))?;
            println!("ok {}", link.path);
            Ok(())
        }
        _ => bail!("unknown command"),
    }
}

async fn derive(config: &PipelineConfig, plan: Plan, input: &Path, out_dir: &Path) -> Result<()> {
    let resolver = RuleResolver::new(config.plans.clone()).context("invalid plan limits")?;
    let rules = resolver.rules_for(plan).clone();
    let engine = DerivationEngine::from_config(&config.imaging).context("invalid imaging config")?;

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .context("input has no usable file name")?;
    let ext = check_file(&rules, filename, &bytes)?;

    let derivation = Arc::new(engine)
        .derive_blocking(rules, bytes.into(), ext)
        .await?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("photo");

    let processed = derivation.processed.content();
    let web_path = out_dir.join(format!("{stem}.web{}", processed.ext()));
    tokio::fs::write(&web_path, processed.bytes())
        .await
        .with_context(|| format!("failed to write {}", web_path.display()))?;
    info!(path = %web_path.display(), watermarked = derivation.watermarked, "wrote processed copy");
    println!("{}", web_path.display());

    if let Some(original) = &derivation.original {
        let original = original.content();
        let path = out_dir.join(format!("{stem}.original{}", original.ext()));
        tokio::fs::write(&path, original.bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}

async fn ingest(config: PipelineConfig, args: &ArgMatches) -> Result<()> {
    let account = Account::new(UserId(*required::<u64>(args, "user")?), selected_plan(args));
    let pipeline = PhotoPipeline::open(config)
        .await
        .context("failed to open pipeline")?;
    pipeline
        .accountant()
        .seed(account.id, *required::<u64>(args, "used-bytes")?);

    let meta = PhotoMetadata::new(required::<String>(args, "title")?.as_str())
        .with_category(required::<String>(args, "category")?.as_str())
        .with_tags(required::<String>(args, "tags")?)
        .with_price(*required::<f64>(args, "price")?);

    let mut batch = BatchUpload::new(meta);
    for path in args.get_many::<PathBuf>("files").into_iter().flatten() {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?;
        batch = batch.with_file(UploadFile::new(filename, bytes));
    }

    let records = pipeline.upload_batch(&account, batch).await?;
    print_json(&records)?;
    let usage = pipeline.usage(&account);
    info!(used = usage.used_bytes, quota = usage.quota_bytes, "storage after upload");
    Ok(())
}
