use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use git_backfill::generate::{self, RunOptions};
use git_backfill::mutate::Mode;
use git_backfill::{Author, Backfill, config::Config};

#[derive(Parser)]
#[command(
    name = "git-backfill",
    version,
    author = "Ludwig",
    about = "Generate synthetic, backdated commit history",
    long_about = "A tool for filling a repository with a plausible, backdated commit history \
                  by making small cosmetic edits to its source files. Useful for demo and fixture repositories."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Path to git repository")]
    repo: Option<PathBuf>,

    #[arg(short, long, env = "GIT_BACKFILL_CONFIG", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Skip confirmation prompts")]
    yes: bool,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Show what would be done without making changes")]
    dry_run: bool,
}

#[derive(clap::Args)]
struct WindowArgs {
    #[arg(long, help = "First day of the window (YYYY-MM-DD)")]
    since: Option<NaiveDate>,

    #[arg(long, help = "Last day of the window (YYYY-MM-DD)")]
    until: Option<NaiveDate>,

    #[arg(long, help = "Maximum commits on a single day")]
    max_per_day: Option<u32>,

    #[arg(short = 'n', long, help = "Number of commits to generate")]
    commits: Option<usize>,

    #[arg(short, long, help = "Seed for a reproducible run")]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Edit files and create backdated commits")]
    Generate {
        #[command(flatten)]
        window: WindowArgs,

        #[arg(long, help = "Maximum commits touching one file before files are reused")]
        max_per_file: Option<u32>,

        #[arg(short, long, value_enum, help = "Kind of edits to make")]
        mode: Option<Mode>,

        #[arg(long, help = "Run even with uncommitted changes to tracked files")]
        allow_dirty: bool,
    },

    #[command(about = "List files that would be edited")]
    Scan,

    #[command(about = "Preview the sampled commit timeline")]
    Dates {
        #[command(flatten)]
        window: WindowArgs,
    },

    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Print the configuration file path")]
    Path,

    #[command(about = "Set the commit author")]
    SetIdentity {
        #[arg(help = "Author name")]
        name: String,

        #[arg(help = "Author email")]
        email: String,
    },

    #[command(about = "Set the date window")]
    SetWindow {
        #[arg(help = "First day (YYYY-MM-DD)")]
        start: NaiveDate,

        #[arg(help = "Last day (YYYY-MM-DD)")]
        end: NaiveDate,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    let command = match cli.command {
        Commands::Config { action } => return handle_config(action, &config_path),
        command => command,
    };

    let mut config = Config::load_from(&config_path).context("Failed to load configuration")?;

    match command {
        Commands::Dates { window } => {
            let seed = apply_window(&mut config, &window);
            show_dates(&config, seed)
        }
        command => {
            let repo_path = match cli.repo {
                Some(path) => path,
                None => env::current_dir().context("Failed to get current directory")?,
            };

            match command {
                Commands::Generate {
                    window,
                    max_per_file,
                    mode,
                    allow_dirty,
                } => {
                    let seed = apply_window(&mut config, &window);
                    if let Some(max) = max_per_file {
                        config.generate.max_per_file = max;
                    }
                    if let Some(mode) = mode {
                        config.generate.mode = mode;
                    }

                    let backfill = Backfill::new(repo_path, config)?;
                    let summary = backfill.generate(&RunOptions {
                        seed,
                        yes: cli.yes,
                        dry_run: cli.dry_run,
                        allow_dirty,
                    })?;

                    if !cli.dry_run {
                        println!();
                        println!("{}", "=".repeat(60));
                        println!(
                            "{} Created {} of {} planned commits",
                            "✓".green(),
                            summary.created,
                            summary.planned
                        );
                        println!("Failed commits: {}", summary.failed);
                        if let Some(branch) = summary.backup_branch {
                            println!("Backup saved to branch: {}", branch.yellow());
                        }
                        println!("{}", "=".repeat(60));
                    }
                    Ok(())
                }
                Commands::Scan => {
                    let backfill = Backfill::new(repo_path, config)?;
                    let candidates = backfill.scan()?;
                    for candidate in &candidates {
                        println!(
                            "{:>6}  {}",
                            candidate.lines.to_string().cyan(),
                            candidate.path.display()
                        );
                    }
                    println!("{} candidate files", candidates.len());
                    Ok(())
                }
                Commands::Dates { .. } | Commands::Config { .. } => unreachable!(),
            }
        }
    }
}

fn apply_window(config: &mut Config, args: &WindowArgs) -> Option<u64> {
    if let Some(since) = args.since {
        config.window.start = since;
    }
    if let Some(until) = args.until {
        config.window.end = until;
    }
    if let Some(max) = args.max_per_day {
        config.window.max_per_day = max;
    }
    if let Some(commits) = args.commits {
        config.generate.commits = commits;
    }
    args.seed
}

fn show_dates(config: &Config, seed: Option<u64>) -> Result<()> {
    let timeline = generate::preview_dates(&config.window, config.generate.commits, seed)?;

    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for when in &timeline {
        println!("{}", when.format("%Y-%m-%d %H:%M:%S"));
        *per_day.entry(when.date()).or_insert(0) += 1;
    }

    println!();
    println!(
        "{} commits over {} days (window {} .. {}, at most {} per day)",
        timeline.len().to_string().green(),
        per_day.len(),
        config.window.start,
        config.window.end,
        config.window.max_per_day
    );
    Ok(())
}

fn handle_config(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_from(config_path)?;

            println!(
                "Configuration file: {}",
                config_path.display().to_string().cyan()
            );
            println!();
            match &config.identity {
                Some(identity) => {
                    println!("Identity:");
                    println!("  Name:  {}", identity.name.green());
                    println!("  Email: {}", identity.email.green());
                }
                None => println!("Identity: {}", "from repository git config".green()),
            }
            println!();
            println!("Window:");
            println!("  {} .. {}", config.window.start, config.window.end);
            println!(
                "  At most {} commits per day, {}:00-{}:59",
                config.window.max_per_day, config.window.first_hour, config.window.last_hour
            );
            println!();
            println!("Generate:");
            println!("  Commits:      {}", config.generate.commits);
            println!("  Per file:     {}", config.generate.max_per_file);
            println!("  Mode:         {:?}", config.generate.mode);
            println!("  Extensions:   {}", config.scan.extensions.join(", ").yellow());
            println!("  Min lines:    {}", config.scan.min_lines);
            println!("  Messages:     {}", config.messages.len());
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }

        ConfigAction::SetIdentity { name, email } => {
            let mut config = Config::load_from(config_path)?;
            config.identity = Some(Author { name, email });
            config.save_to(config_path)?;

            println!("{} Updated identity", "✓".green());
        }

        ConfigAction::SetWindow { start, end } => {
            let mut config = Config::load_from(config_path)?;
            config.window.start = start;
            config.window.end = end;
            config.window.validate()?;
            config.save_to(config_path)?;

            println!(
                "{} Window set to {} .. {}",
                "✓".green(),
                start.to_string().yellow(),
                end.to_string().yellow()
            );
        }
    }

    Ok(())
}
