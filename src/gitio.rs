//! Git provider used by the change-risk analyses.
//!
//! Thin wrapper over libgit2 exposing exactly what `pr-risk`,
//! `breaking`, `affected-tests`, and `preflight` consume: changed
//! paths and file content at a ref.

use std::path::Path;

use git2::{DiffOptions, Repository};

use crate::error::Result;

pub struct GitProvider {
    repo: Repository,
}

impl GitProvider {
    /// Discover the repository containing `root`.
    pub fn open(root: &Path) -> Result<GitProvider> {
        let repo = Repository::discover(root)?;
        Ok(GitProvider { repo })
    }

    /// Paths changed relative to HEAD.
    ///
    /// `staged` limits the diff to the index; otherwise both staged and
    /// worktree changes are reported. An unborn HEAD yields an empty
    /// list rather than an error.
    pub fn changed_files(&self, staged: bool) -> Result<Vec<String>> {
        let head_tree = match self.repo.head().and_then(|head| head.peel_to_tree()) {
            Ok(tree) => Some(tree),
            Err(_) => None,
        };
        let mut options = DiffOptions::new();
        options.include_untracked(!staged);

        let diff = if staged {
            self.repo
                .diff_tree_to_index(head_tree.as_ref(), None, Some(&mut options))?
        } else {
            self.repo
                .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut options))?
        };

        let mut paths: Vec<String> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    pub fn staged_files(&self) -> Result<Vec<String>> {
        self.changed_files(true)
    }

    /// Paths changed in the worktree relative to an arbitrary ref.
    pub fn changed_since(&self, refspec: &str) -> Result<Vec<String>> {
        let object = self.repo.revparse_single(refspec)?;
        let tree = object.peel_to_commit()?.tree()?;
        let mut options = DiffOptions::new();
        options.include_untracked(true);
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut options))?;
        let mut paths: Vec<String> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Content of `path` at `refspec` (e.g. "HEAD", "main", a sha), or
    /// `None` when the file does not exist at that ref.
    pub fn file_at_ref(&self, path: &str, refspec: &str) -> Result<Option<String>> {
        let object = self.repo.revparse_single(refspec)?;
        let commit = object.peel_to_commit()?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };
        let blob = match self.repo.find_blob(entry.id()) {
            Ok(blob) => blob,
            Err(_) => return Ok(None),
        };
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "test").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        repo
    }

    fn commit_all(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = repo.signature().unwrap();
        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_changed_files_and_file_at_ref() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        std::fs::write(dir.path().join("app.py"), "def main():\n    pass\n").unwrap();
        commit_all(&repo, "initial");

        std::fs::write(dir.path().join("app.py"), "def main():\n    run()\n").unwrap();
        std::fs::write(dir.path().join("new.py"), "def fresh():\n    pass\n").unwrap();

        let provider = GitProvider::open(dir.path()).unwrap();
        let changed = provider.changed_files(false).unwrap();
        assert!(changed.contains(&"app.py".to_string()), "{changed:?}");
        assert!(changed.contains(&"new.py".to_string()));

        let old = provider.file_at_ref("app.py", "HEAD").unwrap().unwrap();
        assert!(old.contains("pass"));
        assert!(provider.file_at_ref("new.py", "HEAD").unwrap().is_none());
    }

    #[test]
    fn test_staged_files_empty_without_staging() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        commit_all(&repo, "initial");
        std::fs::write(dir.path().join("a.py"), "x = 2\n").unwrap();

        let provider = GitProvider::open(dir.path()).unwrap();
        assert!(provider.staged_files().unwrap().is_empty());
        assert_eq!(provider.changed_files(false).unwrap(), vec!["a.py"]);
    }
}
