use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod access;
mod activity;
mod bootstrap;
mod dataset;
mod error;
mod hygiene;
mod models;
mod report;

use access::ClientRegistry;
use activity::{ActivityLogger, ActivitySink, FailurePolicy, FileSink};
use bootstrap::{Session, SessionBootstrap, UploadSource};
use models::ScoreColumn;

const ACCESS_CODE_ENV: &str = "UDDER_ACCESS_CODE";

#[derive(Parser)]
#[command(name = "udder-dashboard")]
#[command(about = "Udder hygiene inspection dashboard for dairy-farm clients", long_about = None)]
#[command(group(
    ArgGroup::new("login")
        .args(["client", "session_code", "query", "upload"])
        .multiple(false)
))]
struct Cli {
    /// Client registry (TOML, one table per client id)
    #[arg(long, env = "UDDER_REGISTRY", default_value = "clients.toml")]
    registry: PathBuf,
    /// Append-only audit log of dashboard views
    #[arg(long, env = "UDDER_ACTIVITY_LOG", default_value = "analytics_log.txt")]
    activity_log: PathBuf,
    /// Fail the command when the activity log cannot be written
    #[arg(long)]
    strict_activity_log: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Client ID, used with --code
    #[arg(long, requires = "code")]
    client: Option<String>,
    #[arg(long, requires = "client")]
    code: Option<String>,
    /// Access code alone, resolved against every registered client
    /// (falls back to $UDDER_ACCESS_CODE when no other login is given)
    #[arg(long)]
    session_code: Option<String>,
    /// Login query string, e.g. "client=acme&code=..."
    #[arg(long)]
    query: Option<String>,
    /// Admin upload of a cleaned CSV ("-" reads stdin)
    #[arg(long, requires = "client_name")]
    upload: Option<PathBuf>,
    #[arg(long, requires = "upload")]
    client_name: Option<String>,
    #[arg(long, requires = "upload")]
    logo: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List farms with clean visit data
    Farms,
    /// Most recent visit for a farm
    Summary { farm: String },
    /// All-time score averages for a farm
    Averages { farm: String },
    /// Best and worst group by score 3 percentage
    Rankings { farm: String },
    /// Per-date trend of one score column
    Trend {
        farm: String,
        #[arg(long, default_value = "score_3_pct")]
        score: ScoreColumn,
    },
    /// Per-date trend of all four score columns
    Trends { farm: String },
    /// Flagged rows awaiting manual review
    Flagged { farm: String },
    /// Write every view for a farm as a markdown report
    Dashboard {
        farm: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the registry digest for an access code
    HashCode { code: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Commands::HashCode { code } = &cli.command {
        println!("{}", access::hash_access_code(code));
        return Ok(());
    }

    let bootstrap = login_from_cli(&cli)?;
    let registry = match bootstrap {
        SessionBootstrap::AdminUpload { .. } => ClientRegistry::default(),
        _ => ClientRegistry::from_path(&cli.registry)?,
    };
    let session = bootstrap.resolve(&registry)?;

    let policy = if cli.strict_activity_log {
        FailurePolicy::Fatal
    } else {
        FailurePolicy::Swallow
    };
    let logger = ActivityLogger::new(FileSink::new(&cli.activity_log), policy);
    debug!(path = %logger.sink().path().display(), ?policy, "activity log ready");

    let output = run(&cli, &session, &logger)?;
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn login_from_cli(cli: &Cli) -> anyhow::Result<SessionBootstrap> {
    if let (Some(client_id), Some(access_code)) = (&cli.client, &cli.code) {
        return Ok(SessionBootstrap::SecretsLogin {
            client_id: client_id.clone(),
            access_code: access_code.clone(),
        });
    }
    if let Some(query) = &cli.query {
        return Ok(SessionBootstrap::QueryParamLogin {
            query: query.clone(),
        });
    }
    if let Some(upload) = &cli.upload {
        let source = if upload.as_os_str() == "-" {
            UploadSource::Stdin
        } else {
            UploadSource::Path(upload.clone())
        };
        return Ok(SessionBootstrap::AdminUpload {
            client_name: cli.client_name.clone().unwrap_or_default(),
            logo: cli.logo.clone(),
            source,
        });
    }
    let access_code = cli
        .session_code
        .clone()
        .or_else(|| std::env::var(ACCESS_CODE_ENV).ok());
    if let Some(access_code) = access_code {
        return Ok(SessionBootstrap::SessionLogin { access_code });
    }
    bail!("no login supplied: use --client/--code, --session-code, --query or --upload")
}

/// Renders the selected view, logging one activity line per view shown.
fn run<S: ActivitySink>(
    cli: &Cli,
    session: &Session,
    logger: &ActivityLogger<S>,
) -> anyhow::Result<String> {
    let dataset = &session.dataset;
    let json = cli.format == OutputFormat::Json;

    if let Some(farm) = farm_of(&cli.command) {
        logger.log(&activity::viewed_farm(farm))?;
    }

    let output = match &cli.command {
        Commands::Farms => {
            let farms = dataset.farms();
            if json {
                serde_json::to_string_pretty(&farms)?
            } else {
                format!(
                    "{}\n{}",
                    report::render_header(&session.profile),
                    report::render_farms(&farms)
                )
            }
        }
        Commands::Summary { farm } => {
            let latest = hygiene::latest_visit_summary(&hygiene::farm_data(dataset.clean(), farm));
            logger.log(&activity::opened_latest_visit(farm))?;
            if json {
                report::to_json(farm, "latest_visit", &latest)?
            } else {
                report::render_latest(latest.as_ref())
            }
        }
        Commands::Averages { farm } => {
            let averages = hygiene::historical_averages(&hygiene::farm_data(dataset.clean(), farm));
            logger.log(&activity::viewed_averages(farm))?;
            if json {
                report::to_json(farm, "historical_averages", &averages)?
            } else {
                report::render_averages(averages.as_ref())
            }
        }
        Commands::Rankings { farm } => {
            let ranking = hygiene::group_rankings(&hygiene::farm_data(dataset.clean(), farm));
            logger.log(&activity::viewed_rankings(farm))?;
            if json {
                report::to_json(farm, "group_rankings", &ranking)?
            } else {
                report::render_rankings(ranking.as_ref())
            }
        }
        Commands::Trend { farm, score } => {
            let trend = hygiene::score_trend(&hygiene::farm_data(dataset.clean(), farm), *score);
            logger.log(&activity::viewed_trend(score.column_name(), farm))?;
            if json {
                report::to_json(farm, "score_trend", &trend)?
            } else {
                report::render_trend(&trend)
            }
        }
        Commands::Trends { farm } => {
            let trend = hygiene::all_score_trend(&hygiene::farm_data(dataset.clean(), farm));
            logger.log(&activity::viewed_all_trends(farm))?;
            if json {
                report::to_json(farm, "all_score_trend", &trend)?
            } else {
                report::render_all_trends(&trend)
            }
        }
        Commands::Flagged { farm } => {
            let flagged = hygiene::flagged_review(dataset, farm);
            logger.log(&activity::opened_flagged(farm))?;
            if json {
                report::to_json(farm, "flagged_review", &flagged)?
            } else {
                report::render_flagged(flagged.as_deref())
            }
        }
        Commands::Dashboard { farm, out } => {
            let rendered = report::build_report(&session.profile, dataset, farm);
            for action in [
                activity::opened_latest_visit(farm),
                activity::viewed_averages(farm),
                activity::viewed_rankings(farm),
                activity::viewed_all_trends(farm),
            ] {
                logger.log(&action)?;
            }
            if dataset.has_issue_column() {
                logger.log(&activity::opened_flagged(farm))?;
            }
            if let Some(out) = out {
                std::fs::write(out, &rendered)
                    .with_context(|| format!("failed to write report {}", out.display()))?;
                return Ok(format!("Report written to {}.\n", out.display()));
            }
            rendered
        }
        Commands::HashCode { code } => access::hash_access_code(code),
    };

    Ok(output)
}

fn farm_of(command: &Commands) -> Option<&str> {
    match command {
        Commands::Summary { farm }
        | Commands::Averages { farm }
        | Commands::Rankings { farm }
        | Commands::Trend { farm, .. }
        | Commands::Trends { farm }
        | Commands::Flagged { farm }
        | Commands::Dashboard { farm, .. } => Some(farm),
        Commands::Farms | Commands::HashCode { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io;

    use clap::CommandFactory;

    use crate::dataset::Dataset;
    use crate::models::ClientProfile;

    const CSV: &str = "\
farm_name,group_id,visit_date,score_1_pct,score_2_pct,score_3_pct,score_4_pct,score_1,score_2,score_3,score_4,data_issue
North,N1,2024-01-05,40,30,20,10,40,30,20,10,False
North,N2,2024-02-05,50,20,20,10,50,20,20,10,True
North,N1,2024-03-05,30,40,20,10,30,40,20,10,False
";

    #[derive(Default)]
    struct RecordingSink {
        lines: RefCell<Vec<String>>,
    }

    impl ActivitySink for RecordingSink {
        fn append(&self, line: &str) -> io::Result<()> {
            self.lines.borrow_mut().push(line.to_string());
            Ok(())
        }
    }

    fn session() -> Session {
        Session {
            profile: ClientProfile {
                name: "Acme Dairy".to_string(),
                logo: None,
                data: None,
            },
            dataset: Dataset::from_reader(CSV.as_bytes()).unwrap(),
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["udder-dashboard", "--client", "acme", "--code", "x"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    /// Runs a command and returns its output plus the logged actions
    /// without their timestamps.
    fn run_view(args: &[&str]) -> (String, Vec<String>) {
        let logger = ActivityLogger::new(RecordingSink::default(), FailurePolicy::Fatal);
        let output = run(&cli(args), &session(), &logger).unwrap();
        let actions = logger
            .sink()
            .lines
            .borrow()
            .iter()
            .map(|line| line.split_once("] ").unwrap().1.to_string())
            .collect();
        (output, actions)
    }

    #[test]
    fn summary_logs_farm_then_view() {
        let (output, actions) = run_view(&["summary", "North"]);
        assert!(output.contains("Date: 2024-03-05 | Group: N1"));
        assert_eq!(
            actions,
            vec![
                "Viewed farm: North".to_string(),
                "Opened Last Visit Summary for: North".to_string(),
            ]
        );
    }

    #[test]
    fn each_view_logs_its_action() {
        let cases: [(&[&str], &str); 5] = [
            (&["averages", "North"], "Viewed Historical Averages for: North"),
            (&["rankings", "North"], "Viewed Group Hygiene Rankings for: North"),
            (
                &["trend", "North", "--score", "score_2_pct"],
                "Viewed score_2_pct trend for: North",
            ),
            (&["trends", "North"], "Viewed All Score Trends for: North"),
            (&["flagged", "North"], "Opened Flagged Data for: North"),
        ];
        for (args, expected) in cases {
            let (_, actions) = run_view(args);
            assert_eq!(actions.len(), 2, "{args:?}");
            assert_eq!(actions[0], "Viewed farm: North");
            assert_eq!(actions[1], expected);
        }
    }

    #[test]
    fn dashboard_logs_every_section() {
        let (output, actions) = run_view(&["dashboard", "North"]);
        assert!(output.starts_with("# Udder Hygiene Dashboard: Acme Dairy"));
        assert_eq!(
            actions,
            vec![
                "Viewed farm: North".to_string(),
                "Opened Last Visit Summary for: North".to_string(),
                "Viewed Historical Averages for: North".to_string(),
                "Viewed Group Hygiene Rankings for: North".to_string(),
                "Viewed All Score Trends for: North".to_string(),
                "Opened Flagged Data for: North".to_string(),
            ]
        );
    }

    #[test]
    fn dashboard_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("north.md");
        let out_arg = out.to_str().unwrap();
        let (output, _) = run_view(&["dashboard", "North", "--out", out_arg]);
        assert!(output.starts_with("Report written to"));
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("## Historical Averages"));
    }

    #[test]
    fn unknown_farm_prints_no_data() {
        for view in ["summary", "averages", "rankings", "trend", "trends"] {
            let (output, actions) = run_view(&[view, "Nowhere"]);
            assert_eq!(output, "No data for this farm.\n", "{view}");
            assert_eq!(actions[0], "Viewed farm: Nowhere");
        }
    }

    #[test]
    fn json_output_is_plain_data() {
        let (output, _) = run_view(&["--format", "json", "averages", "North"]);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["farm"], "North");
        assert_eq!(value["historical_averages"]["score_1_pct"], 35.0);
    }

    #[test]
    fn farms_view_logs_nothing() {
        let (output, actions) = run_view(&["farms"]);
        assert!(output.contains("- North"));
        assert!(actions.is_empty());
    }

    #[test]
    fn session_code_conflicts_with_other_logins() {
        let parsed = Cli::try_parse_from([
            "udder-dashboard",
            "--client",
            "acme",
            "--code",
            "x",
            "--session-code",
            "y",
            "farms",
        ]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from(["udder-dashboard", "--session-code", "y", "farms"]).unwrap();
        assert_eq!(
            login_from_cli(&cli).unwrap(),
            SessionBootstrap::SessionLogin {
                access_code: "y".into(),
            }
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn client_and_query_logins_conflict() {
        let parsed = Cli::try_parse_from([
            "udder-dashboard",
            "--client",
            "acme",
            "--code",
            "x",
            "--query",
            "client=acme&code=x",
            "farms",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn upload_login_builds_admin_bootstrap() {
        let cli = Cli::try_parse_from([
            "udder-dashboard",
            "--upload",
            "-",
            "--client-name",
            "Valley Co-op",
            "summary",
            "North",
        ])
        .unwrap();
        assert_eq!(
            login_from_cli(&cli).unwrap(),
            SessionBootstrap::AdminUpload {
                client_name: "Valley Co-op".into(),
                logo: None,
                source: UploadSource::Stdin,
            }
        );
        assert_eq!(farm_of(&cli.command), Some("North"));
    }

    #[test]
    fn trend_score_is_parsed() {
        let cli = Cli::try_parse_from([
            "udder-dashboard",
            "--client",
            "acme",
            "--code",
            "x",
            "trend",
            "North",
            "--score",
            "score_1_pct",
        ])
        .unwrap();
        match cli.command {
            Commands::Trend { score, .. } => assert_eq!(score, ScoreColumn::Score1),
            _ => panic!("expected trend command"),
        }
        assert!(matches!(
            login_from_cli(&cli).unwrap(),
            SessionBootstrap::SecretsLogin { .. }
        ));
    }
}
