use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wzmap_client::controller::{self, Job, Outcome, Progress};
use wzmap_client::{Config, Controller, Credentials, WarzoneClient};
use wzmap_engine::{MapFile, PipelineError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Duplicate an existing Warzone map onto a new map id", long_about = None)]
struct Cli {
    /// Account email used for both APIs.
    #[arg(long, global = true, env = "WZMAP_EMAIL")]
    email: Option<String>,
    /// API token from https://www.warzone.com/API/GetAPIToken.
    #[arg(long, global = true, env = "WZMAP_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// YAML config file (default: ~/.wzmap/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Save the map of an existing game to a file.
    Download {
        /// Id of a game created on the old map.
        #[arg(long)]
        game_id: u64,
        #[arg(long)]
        out: PathBuf,
    },
    /// Upload a saved map onto a new map.
    Upload {
        /// Id of the new map, from its "Link for Sharing".
        #[arg(long)]
        map_id: u64,
        #[arg(long)]
        file: PathBuf,
    },
    /// Download and upload in one step.
    Duplicate {
        #[arg(long)]
        game_id: u64,
        #[arg(long)]
        map_id: u64,
        /// Also keep the downloaded map here.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Print the commands a saved map would produce without sending anything.
    Plan {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())
        .context("load config")?
        .with_overrides(cli.base_url, cli.email, cli.api_token);

    let job = match cli.command {
        Cmd::Plan { file } => return print_plan(&file),
        Cmd::Download { game_id, out } => Job::Download { game_id, out },
        Cmd::Upload { map_id, file } => Job::Upload { map_id, file },
        Cmd::Duplicate {
            game_id,
            map_id,
            save,
        } => Job::Duplicate {
            game_id,
            map_id,
            save,
        },
    };

    let credentials = match Credentials::new(config.email.clone(), config.api_token.clone()) {
        Ok(c) => c,
        Err(e) => fail(&e),
    };
    let controller = Controller::new(WarzoneClient::new(config.base_url()), credentials);

    let events = controller.spawn(job);
    match controller::wait(events, report_progress).await {
        Some(Ok(outcome)) => {
            report_outcome(&outcome);
            Ok(())
        }
        Some(Err(e)) => fail(&e),
        None => anyhow::bail!("worker stopped without reporting a result"),
    }
}

fn print_plan(file: &Path) -> anyhow::Result<()> {
    let plan = match MapFile::new(file).load().and_then(|map| wzmap_engine::plan(&map)) {
        Ok(plan) => plan,
        Err(e) => fail(&e),
    };
    info!(
        territories = plan.territories,
        bonuses = plan.bonuses,
        commands = plan.commands.len(),
        "plan is valid"
    );
    let json = serde_json::to_string_pretty(&plan.commands).context("serialize commands")?;
    println!("{json}");
    Ok(())
}

fn report_progress(p: &Progress) {
    match p {
        Progress::Fetching { game_id } => info!(game_id, "downloading old map"),
        Progress::Saved { path } => info!(path = %path.display(), "map saved"),
        Progress::Loaded { path } => info!(path = %path.display(), "map loaded"),
        Progress::Planned {
            territories,
            bonuses,
            commands,
        } => info!(territories, bonuses, commands, "commands built and validated"),
        Progress::Uploading { map_id, commands } => {
            info!(map_id, commands, "uploading to new map")
        }
    }
}

fn report_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Downloaded { path } => println!("Saved map to {}", path.display()),
        Outcome::Uploaded {
            commands,
            preview_url,
            ..
        } => {
            println!("Uploaded {commands} commands. Check out your map: {preview_url}");
        }
    }
}

fn fail(e: &PipelineError) -> ! {
    eprintln!("{}", e.title());
    for line in e.details() {
        eprintln!("  {line}");
    }
    std::process::exit(1);
}
