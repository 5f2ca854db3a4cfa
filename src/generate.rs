use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use colored::Colorize;
use dialoguer::Confirm;
use git2::Oid;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};

use crate::Backfill;
use crate::dates::{self, DateWindow};
use crate::git::GitOps;
use crate::messages::MessagePool;
use crate::mutate;
use crate::scan::{self, Candidate, FileRotation};

/// Below this many candidates the same files end up edited over and over.
const FEW_FILES: usize = 20;

const MESSAGE_PREVIEW: usize = 55;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub seed: Option<u64>,
    pub yes: bool,
    pub dry_run: bool,
    pub allow_dirty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub planned: usize,
    pub created: usize,
    pub failed: usize,
    pub backup_branch: Option<String>,
}

pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::seed_from_u64(rand::random()),
    }
}

pub fn preview_dates(window: &DateWindow, count: usize, seed: Option<u64>) -> Result<Vec<NaiveDateTime>> {
    let mut rng = rng_from_seed(seed);
    Ok(dates::sample(window, count, &mut rng)?)
}

fn truncate(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        message.to_string()
    } else {
        let cut: String = message.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Backfill {
    pub fn scan(&self) -> Result<Vec<Candidate>> {
        scan::find_candidates(&self.repo_path, &self.config.scan)
    }

    pub fn generate(&self, opts: &RunOptions) -> Result<Summary> {
        let git = GitOps::open(&self.repo_path)?;
        let settings = &self.config.generate;
        let window = &self.config.window;

        if !opts.allow_dirty && git.has_uncommitted_changes()? {
            anyhow::bail!(
                "Uncommitted changes detected. Please commit or stash them first (or pass --allow-dirty)."
            );
        }
        window.validate()?;

        println!("Finding files to modify...");
        let candidates = self.scan()?;
        println!("Found {} candidate files", candidates.len().to_string().cyan());

        if candidates.is_empty() {
            anyhow::bail!(
                "No files with more than {} lines and extension {} found",
                self.config.scan.min_lines,
                self.config.scan.extensions.join("/")
            );
        }
        if candidates.len() < FEW_FILES {
            println!(
                "{} Only {} candidate files, each will be edited several times",
                "Warning:".yellow().bold(),
                candidates.len()
            );
        }

        if window.capacity() < settings.commits as u64 {
            println!(
                "{} Window {}..{} holds at most {} commits at {} per day",
                "Warning:".yellow().bold(),
                window.start,
                window.end,
                window.capacity(),
                window.max_per_day
            );
        }
        if let Some(head) = git.head_time()? {
            if window.start < head.date_naive() {
                println!(
                    "{} Window starts before the latest commit ({}), history will not be chronological",
                    "Warning:".yellow().bold(),
                    head.format("%Y-%m-%d")
                );
            }
        }

        let mut rng = rng_from_seed(opts.seed);
        println!("Generating commit dates...");
        let timeline = dates::sample(window, settings.commits, &mut rng)?;
        let total = timeline.len();

        let files: Vec<PathBuf> = candidates.into_iter().map(|c| c.path).collect();
        let mut rotation = FileRotation::new(files, settings.max_per_file);
        let mut pool = MessagePool::new(self.config.messages.clone(), &mut rng);

        if opts.dry_run {
            println!("{}", "[DRY RUN] Planned history:".blue().bold());
            for (i, when) in timeline.iter().enumerate() {
                let Some(rel) = rotation.pick(&mut rng).map(Path::to_path_buf) else {
                    break;
                };
                let message = pool.next_for(&rel, &mut rng);
                println!(
                    "  {:>3}. {}  {}  {}",
                    i + 1,
                    when.format("%Y-%m-%d %H:%M:%S").to_string().cyan(),
                    rel.display().to_string().yellow(),
                    message
                );
                rotation.record(&rel);
            }
            println!("  {} Mode: {:?}, files edited in place", "→".blue(), settings.mode);
            println!("  {} A backup branch would be created", "→".blue());
            return Ok(Summary {
                planned: total,
                ..Summary::default()
            });
        }

        if !opts.yes {
            let branch = git.current_branch()?;
            println!(
                "{}",
                format!("This will edit files and create up to {total} backdated commits!")
                    .red()
                    .bold()
            );
            println!("Current branch: {}", branch.yellow());
            println!("Window: {} .. {}", window.start, window.end);
            println!();

            if !Confirm::new()
                .with_prompt("Continue?")
                .default(false)
                .interact()?
            {
                println!("Aborted.");
                return Ok(Summary {
                    planned: total,
                    ..Summary::default()
                });
            }
        }

        let backup_branch = if git.has_commits()? {
            let name = format!("backfill-backup-{}-{}", git.current_branch()?, Utc::now().timestamp());
            println!("Creating backup branch: {}", name.green());
            git.create_backup_branch(&name)?;
            Some(name)
        } else {
            None
        };

        println!("Generating commits...");
        let pb = ProgressBar::new(total as u64);
        pb.set_style(ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}")?);

        let mut summary = Summary {
            planned: total,
            backup_branch,
            ..Summary::default()
        };

        for (i, &when) in timeline.iter().enumerate() {
            pb.set_position(i as u64);
            let Some(rel) = rotation.pick(&mut rng).map(Path::to_path_buf) else {
                break;
            };
            pb.set_message(file_name(&rel));

            let abs = self.repo_path.join(&rel);
            match mutate::mutate_file(&abs, settings.mode, &settings.comments, &mut rng) {
                Ok(edit) => {
                    tracing::debug!(file = %rel.display(), strategy = edit.strategy.name(), line = edit.line, "edited");
                }
                Err(err) => {
                    summary.failed += 1;
                    rotation.retire(&rel);
                    tracing::warn!(file = %rel.display(), %err, "skipping commit, file not edited");
                    pb.suspend(|| println!("{} Skipped {}: {}", "✗".red(), rel.display(), err));
                    continue;
                }
            }

            let message = pool.next_for(&rel, &mut rng);
            match self.commit_file(&git, &rel, &message, when) {
                Ok(oid) => {
                    rotation.record(&rel);
                    summary.created += 1;
                    tracing::debug!(%oid, "committed");
                    pb.suspend(|| {
                        println!(
                            "{} Commit {}/{}: {} ({}) - {}",
                            "✓".green(),
                            i + 1,
                            total,
                            truncate(&message, MESSAGE_PREVIEW),
                            when.format("%Y-%m-%d %H:%M"),
                            file_name(&rel)
                        )
                    });
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(file = %rel.display(), err = %format!("{err:#}"), "commit failed");
                    pb.suspend(|| println!("{} Commit {}/{} failed: {:#}", "✗".red(), i + 1, total, err));
                    if let Err(err) = git.unstage(&rel) {
                        tracing::debug!(file = %rel.display(), %err, "unstage failed");
                    }
                }
            }
        }
        pb.finish_and_clear();

        Ok(summary)
    }

    fn commit_file(&self, git: &GitOps, rel: &Path, message: &str, when: NaiveDateTime) -> Result<Oid> {
        git.stage(rel)?;
        let signature = git.signature(self.config.identity.as_ref(), when)?;
        git.commit_staged(message, &signature)
    }
}
