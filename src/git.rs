use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, Offset, TimeZone, Utc};
use git2::{Commit, ErrorCode, Oid, Repository, Signature, StatusOptions, Time};
use std::path::Path;

use crate::Author;

pub struct GitOps {
    repo: Repository,
}

impl GitOps {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    pub fn current_branch(&self) -> Result<String> {
        match self.repo.head() {
            Ok(head) => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                let target = head.symbolic_target().unwrap_or("HEAD");
                Ok(target.trim_start_matches("refs/heads/").to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_commits(&self) -> Result<bool> {
        Ok(self.head_commit()?.is_some())
    }

    /// Staged or unstaged changes to tracked files. Untracked files don't count.
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    pub fn head_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .head_commit()?
            .and_then(|c| DateTime::from_timestamp(c.time().seconds(), 0)))
    }

    pub fn create_backup_branch(&self, branch_name: &str) -> Result<()> {
        let commit = self
            .head_commit()?
            .context("Cannot create a backup branch without commits")?;
        self.repo.branch(branch_name, &commit, false)?;
        Ok(())
    }

    pub fn stage(&self, rel_path: &Path) -> Result<()> {
        let mut index = self.repo.index()?;
        index
            .add_path(rel_path)
            .with_context(|| format!("Failed to stage {}", rel_path.display()))?;
        index.write()?;
        Ok(())
    }

    pub fn unstage(&self, rel_path: &Path) -> Result<()> {
        match self.head_commit()? {
            Some(head) => self.repo.reset_default(Some(head.as_object()), [rel_path])?,
            None => {
                let mut index = self.repo.index()?;
                index.remove_path(rel_path)?;
                index.write()?;
            }
        }
        Ok(())
    }

    pub fn commit_staged(&self, message: &str, signature: &Signature) -> Result<Oid> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let parent = self.head_commit()?;
        let parents: Vec<&Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), signature, signature, message, &tree, &parents)?;
        Ok(oid)
    }

    /// Without `author`, uses the repository's configured user, then a placeholder.
    pub fn signature(&self, author: Option<&Author>, when: NaiveDateTime) -> Result<Signature<'static>> {
        let time = git_time(when);
        let author = match author {
            Some(a) => a.clone(),
            None => self.configured_author().unwrap_or_default(),
        };
        Signature::new(&author.name, &author.email, &time)
            .with_context(|| format!("Invalid identity {} <{}>", author.name, author.email))
    }

    fn configured_author(&self) -> Option<Author> {
        let sig = self.repo.signature().ok()?;
        Some(Author {
            name: sig.name()?.to_string(),
            email: sig.email()?.to_string(),
        })
    }
}

/// Interprets a naive timestamp in the local timezone, as git does for
/// `GIT_AUTHOR_DATE` without an offset. Nonexistent local times are taken as UTC.
pub fn git_time(when: NaiveDateTime) -> Time {
    match Local.from_local_datetime(&when).earliest() {
        Some(local) => Time::new(local.timestamp(), local.offset().fix().local_minus_utc() / 60),
        None => Time::new(when.and_utc().timestamp(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    fn scratch_repo() -> (tempfile::TempDir, GitOps) {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let git = GitOps::open(dir.path()).unwrap();
        (dir, git)
    }

    fn author() -> Author {
        Author {
            name: "Test Dev".to_string(),
            email: "dev@example.com".to_string(),
        }
    }

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap().and_hms_opt(h, 15, 0).unwrap()
    }

    #[test]
    fn commits_carry_the_backdated_time() {
        let (dir, git) = scratch_repo();
        assert!(!git.has_commits().unwrap());

        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        git.stage(Path::new("a.py")).unwrap();
        let sig = git.signature(Some(&author()), at(10)).unwrap();
        let first = git.commit_staged("First", &sig).unwrap();

        fs::write(dir.path().join("a.py"), "x = 2\n").unwrap();
        git.stage(Path::new("a.py")).unwrap();
        let sig = git.signature(Some(&author()), at(11)).unwrap();
        let second = git.commit_staged("Second", &sig).unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let commit = repo.find_commit(second).unwrap();
        assert_eq!(commit.parent_id(0).unwrap(), first);
        assert_eq!(commit.message(), Some("Second"));
        assert_eq!(commit.author().name(), Some("Test Dev"));
        assert_eq!(commit.time().seconds(), git_time(at(11)).seconds());
        assert_eq!(commit.committer().when().seconds(), git_time(at(11)).seconds());

        let head = git.head_time().unwrap().unwrap();
        assert_eq!(head.timestamp(), git_time(at(11)).seconds());
        assert!(!git.has_uncommitted_changes().unwrap());
    }

    #[test]
    fn unstage_restores_index_to_head() {
        let (dir, git) = scratch_repo();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        git.stage(Path::new("a.py")).unwrap();
        git.commit_staged("Init", &git.signature(Some(&author()), at(9)).unwrap())
            .unwrap();

        fs::write(dir.path().join("a.py"), "x = 3\n").unwrap();
        git.stage(Path::new("a.py")).unwrap();
        git.unstage(Path::new("a.py")).unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let status = repo.status_file(Path::new("a.py")).unwrap();
        assert!(status.contains(git2::Status::WT_MODIFIED));
        assert!(!status.contains(git2::Status::INDEX_MODIFIED));
    }

    #[test]
    fn unborn_branch_reports_its_name_and_refuses_backup() {
        let (_dir, git) = scratch_repo();
        assert!(!git.current_branch().unwrap().is_empty());
        assert!(git.head_time().unwrap().is_none());
        assert!(git.create_backup_branch("backup").is_err());
    }

    #[test]
    fn naive_time_round_trips_through_local_offset() {
        let t = git_time(at(12));
        let back = DateTime::from_timestamp(t.seconds() + i64::from(t.offset_minutes()) * 60, 0)
            .unwrap()
            .naive_utc();
        assert_eq!(back, at(12));
    }
}
