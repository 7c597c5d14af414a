//! CLI entry point for the road safety rater.
//!
//! Provides subcommands for network screening of crash data, browsing the
//! countermeasure catalog, benefit-cost appraisal of a screened site,
//! budget-constrained prioritization, and before/after evaluation.

use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use road_safety_rater::{
    catalog::CountermeasureCatalog,
    config::EngineConfig,
    engine::{
        appraisal::{AnnualCrashFrequency, Appraiser, CrashCostModel},
        evaluate::evaluate_counts,
        prioritize::{AccrualPolicy, prioritize},
        types::EconomicParams,
    },
    fetch::{BasicClient, auth::AppToken},
    infra::{FileCrashSource, MockCrashSource, SocrataCrashClient, WithFallback},
    output::{DecisionRow, ProjectRow, SiteRow, load_projects, print_json, write_json, write_records},
    publish::{report_key, write_json_to_s3},
    services::crash_source::CrashSource,
    session::{AnalysisRun, ScreeningOutcome, ScreeningReport, ScreeningSession, ScreeningSettings},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "road_safety_rater")]
#[command(about = "Screen, appraise, and prioritize roadway safety projects", long_about = None)]
struct Cli {
    /// Engine config JSON (defaults to $ROAD_SAFETY_CONFIG, then built-ins)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch crashes, aggregate them by street, and rank the worst sites
    Screen {
        /// "chicago", "mock", a Socrata dataset URL, or a local JSON/CSV file
        #[arg(short, long, default_value = "chicago")]
        source: String,

        /// Maximum number of crash rows to request
        #[arg(short, long)]
        limit: Option<u32>,

        /// Only crashes after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Number of ranked sites to keep
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// JSON file to write the screening report to
        #[arg(short, long, default_value = "screening_report.json")]
        report: PathBuf,

        /// Optional: CSV file to append ranked sites to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Serve the built-in dataset (labelled as fallback) if the remote source is down
        #[arg(long, default_value_t = false)]
        allow_fallback: bool,

        /// Optional: S3 bucket to upload the report to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix for the uploaded report
        #[arg(long, default_value = "screening")]
        s3_prefix: String,

        /// Optional: Gzip compress the report before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// List or search the countermeasure catalog
    Countermeasures {
        /// Case-insensitive match on name or target crash type
        #[arg(short, long)]
        search: Option<String>,

        /// Catalog JSON file (defaults to the built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Benefit-cost analysis of countermeasures at one screened site
    Appraise {
        /// Screening report produced by `screen`
        #[arg(short, long, default_value = "screening_report.json")]
        report: PathBuf,

        /// Site id (street name) from the report
        #[arg(long)]
        site: String,

        /// Countermeasure ids to apply (repeatable)
        #[arg(short = 'm', long = "countermeasure", required = true)]
        countermeasures: Vec<String>,

        /// Catalog JSON file (defaults to the built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Override construction cost (defaults to the sum of countermeasure costs)
        #[arg(long)]
        construction_cost: Option<f64>,

        /// Override annual maintenance cost
        #[arg(long)]
        maintenance_cost: Option<f64>,

        /// Override service life in years (defaults to the longest countermeasure life)
        #[arg(long)]
        service_life: Option<u32>,

        /// Override discount rate
        #[arg(long)]
        discount_rate: Option<f64>,

        /// Price every crash at the blended average cost
        #[arg(long, default_value_t = false)]
        blended: bool,

        /// Optional: CSV file to append the resulting project to, for `prioritize`
        #[arg(long)]
        projects: Option<PathBuf>,
    },
    /// Rank projects by BCR and fund them against a budget
    Prioritize {
        /// CSV of candidate projects (id,name,cost,bcr[,npv,lat,lng])
        #[arg(short, long)]
        projects: PathBuf,

        /// Available budget
        #[arg(short, long)]
        budget: f64,

        /// Only funded projects count against the budget
        #[arg(long, default_value_t = false)]
        funded_only: bool,

        /// Optional: CSV file to append funding decisions to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare crash rates before and after a treatment
    Evaluate {
        #[arg(long)]
        before_crashes: f64,

        #[arg(long, default_value_t = 3.0)]
        before_years: f64,

        #[arg(long)]
        after_crashes: f64,

        #[arg(long)]
        after_years: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/road_safety_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("road_safety_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Screen {
            source,
            limit,
            since,
            top_n,
            report,
            output,
            allow_fallback,
            s3_bucket,
            s3_prefix,
            gzip,
        } => {
            let mut query = config.fetch.query();
            if let Some(limit) = limit {
                query.limit = limit;
            }
            if let Some(since) = since {
                query.since = since;
            }
            let settings = ScreeningSettings {
                top_n: top_n.unwrap_or(config.top_n),
                scorer: Arc::new(config.scorer()),
                ..Default::default()
            };

            let crash_source = resolve_source(&source, &config, allow_fallback)?;
            let session = ScreeningSession::new(crash_source, settings);

            let screening = match session.run(query).await? {
                ScreeningOutcome::Completed(screening) => screening,
                ScreeningOutcome::Superseded => bail!("screening run was superseded"),
            };

            if !screening.provenance.is_live() {
                warn!(
                    provenance = ?screening.provenance,
                    "Report is NOT based on live data"
                );
            }
            for site in screening.sites.iter().take(10) {
                info!(
                    rank = ?site.rank,
                    site = %site.display_name(),
                    crashes = site.crashes,
                    fatal = site.severity.k,
                    excess = site.excess,
                    "Ranked site"
                );
            }

            write_json(&report, &screening)?;
            info!(path = %report.display(), sites = screening.sites.len(), "Screening report written");

            if let Some(output) = output {
                let rows: Vec<SiteRow> = screening.sites.iter().map(SiteRow::from).collect();
                write_records(&output, &rows)?;
            }

            if let Some(bucket) = s3_bucket {
                let aws = aws_config::load_from_env().await;
                let s3 = aws_sdk_s3::Client::new(&aws);
                let name = format!("{}.json", screening.generated_at.format("%Y-%m-%dT%H%M%SZ"));
                let key = report_key(&s3_prefix, &name, gzip);
                write_json_to_s3(&s3, &bucket, &key, &screening, gzip).await?;
            }
        }
        Commands::Countermeasures { search, catalog } => {
            let catalog = load_catalog(catalog.as_deref())?;
            let matches = catalog.search(search.as_deref().unwrap_or(""));

            for cm in &matches {
                info!(
                    id = %cm.id,
                    name = %cm.name,
                    cmf = cm.cmf,
                    reduction_pct = cm.reduction_percent(),
                    cost = cm.cost,
                    life = cm.life,
                    crash_type = %cm.crash_type,
                    "Countermeasure"
                );
            }
            info!(matches = matches.len(), total = catalog.len(), "Catalog summary");
        }
        Commands::Appraise {
            report,
            site,
            countermeasures,
            catalog,
            construction_cost,
            maintenance_cost,
            service_life,
            discount_rate,
            blended,
            projects,
        } => {
            let content = std::fs::read_to_string(&report)
                .with_context(|| format!("reading screening report {}", report.display()))?;
            let screening: ScreeningReport = serde_json::from_str(&content)
                .with_context(|| format!("parsing screening report {}", report.display()))?;
            let summary = screening
                .site(&site)
                .cloned()
                .with_context(|| format!("site '{site}' is not in {}", report.display()))?;

            let catalog = load_catalog(catalog.as_deref())?;
            let portfolio = catalog.select(countermeasures.as_slice())?;

            let defaults = EconomicParams::from_portfolio(
                &portfolio,
                maintenance_cost.unwrap_or(config.maintenance_cost),
                discount_rate.unwrap_or(config.discount_rate),
            );
            let params = EconomicParams {
                construction_cost: construction_cost.unwrap_or(defaults.construction_cost),
                service_life: service_life.unwrap_or(defaults.service_life),
                ..defaults
            };
            let appraiser = if blended {
                Appraiser::new(CrashCostModel::Blended {
                    cost_per_crash: config.blended_crash_cost,
                })
            } else {
                config.appraiser()
            };

            let frequency = AnnualCrashFrequency::from_site(&summary, config.observation_years);
            info!(site = %summary.display_name(), annual_crashes = frequency.total, "Appraising site");

            let run = portfolio.iter().fold(
                AnalysisRun::new(
                    format!("appraise-{}", Utc::now().timestamp()),
                    summary.display_name(),
                    Utc::now().year(),
                )
                .with_site_selected(summary.clone()),
                |run, cm| run.with_countermeasure_toggled(&summary.id, cm.clone()),
            );
            let run = run.appraise_site(&summary.id, &appraiser, &params, config.observation_years);

            let appraisal = run
                .appraisal(&summary.id)
                .context("appraisal was not recorded")?;
            print_json(appraisal)?;
            match appraisal.bcr {
                Some(bcr) => info!(bcr, npv = appraisal.npv, "Appraisal complete"),
                None => warn!(npv = appraisal.npv, "BCR undefined: discounted cost is zero"),
            }

            if let Some(projects) = projects {
                let rows: Vec<ProjectRow> = run.projects().iter().map(ProjectRow::from).collect();
                write_records(&projects, &rows)?;
                info!(path = %projects.display(), "Project appended");
            }
        }
        Commands::Prioritize {
            projects,
            budget,
            funded_only,
            output,
        } => {
            let candidates = load_projects(&projects)?;
            let policy = if funded_only {
                AccrualPolicy::FundedOnly
            } else {
                AccrualPolicy::AllProjects
            };
            let plan = prioritize(candidates, budget, policy);

            for decision in &plan.decisions {
                info!(
                    priority = decision.priority,
                    id = %decision.project.id,
                    cost = decision.project.cost,
                    bcr = ?decision.project.bcr,
                    funded = decision.funded,
                    cumulative_cost = decision.cumulative_cost,
                    "Funding decision"
                );
            }
            info!(
                budget,
                funded = plan.funded().count(),
                deferred = plan.deferred().count(),
                funded_cost = plan.funded_cost(),
                cumulative_cost = plan.cumulative_cost,
                "Prioritization summary"
            );

            if let Some(output) = output {
                let rows: Vec<DecisionRow> = plan.decisions.iter().map(DecisionRow::from).collect();
                write_records(&output, &rows)?;
            }
        }
        Commands::Evaluate {
            before_crashes,
            before_years,
            after_crashes,
            after_years,
        } => {
            let result = evaluate_counts(before_crashes, before_years, after_crashes, after_years);
            print_json(&result)?;
            match result.percent_reduction {
                Some(pct) => info!(
                    before_rate = result.before_rate,
                    after_rate = result.after_rate,
                    percent_reduction = pct,
                    improved = result.is_improvement(),
                    "Evaluation complete"
                ),
                None => warn!(
                    after_rate = result.after_rate,
                    "Percent reduction undefined: no crashes before treatment or no after period"
                ),
            }
        }
    }

    Ok(())
}

fn load_catalog(path: Option<&Path>) -> Result<CountermeasureCatalog> {
    match path {
        Some(path) => CountermeasureCatalog::load(path),
        None => Ok(CountermeasureCatalog::builtin()),
    }
}

/// Picks a crash source for `source`: the configured Socrata endpoint for
/// "chicago", the built-in data for "mock", a Socrata dataset for any other
/// http(s) URL, and a local file otherwise.
#[tracing::instrument(skip(config))]
fn resolve_source(
    source: &str,
    config: &EngineConfig,
    allow_fallback: bool,
) -> Result<Arc<dyn CrashSource>> {
    let endpoint = match source {
        "mock" => return Ok(Arc::new(MockCrashSource)),
        "chicago" => config.fetch.endpoint.clone(),
        url if url.starts_with("http") => url.to_string(),
        path => return Ok(Arc::new(FileCrashSource::new(path))),
    };

    let http = BasicClient::with_timeout(config.fetch.timeout())?;
    let retry = config.fetch.retry_policy();

    match std::env::var("SOCRATA_APP_TOKEN").ok().filter(|t| !t.trim().is_empty()) {
        Some(token) => {
            info!("Using Socrata app token");
            let client = SocrataCrashClient::new(AppToken::new(http, &token)?, endpoint, retry);
            Ok(with_optional_fallback(client, allow_fallback))
        }
        None => {
            let client = SocrataCrashClient::new(http, endpoint, retry);
            Ok(with_optional_fallback(client, allow_fallback))
        }
    }
}

fn with_optional_fallback<S: CrashSource + 'static>(
    source: S,
    allow_fallback: bool,
) -> Arc<dyn CrashSource> {
    if allow_fallback {
        Arc::new(WithFallback::new(source))
    } else {
        Arc::new(source)
    }
}
