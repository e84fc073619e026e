use std::fs;
use std::path::{Path, PathBuf};

use knot_diff::{tree_diff, TreeChanges};
use knot_index::Index;
use knot_merge::{Inputs, Resolve};
use knot_refs::{Refs, SymRef, ORIG_HEAD};
use knot_store::{Blob, Commit, Database, Entry, ObjectKind};
use knot_types::{Author, ObjectId};
use knot_workspace::{FsWorkspace, Migration, Workspace};
use tracing::{debug, info};

use crate::config::{RepoConfig, CONFIG_FILE};
use crate::error::{RepoError, RepoResult};
use crate::pending_commit::{MergeType, PendingCommit};
use crate::rev_list::{RevList, RevListOptions};
use crate::revision::{Revision, HEAD};
use crate::sequencer::{Action, Command, SequenceOptions, Sequencer};
use crate::status::Status;

pub const GIT_DIR: &str = ".git";

/// Name the current side carries in merge inputs and conflict markers.
const HEAD_NAME: &str = "HEAD";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    AlreadyUpToDate,
    FastForward {
        from: ObjectId,
        to: ObjectId,
    },
    Merged {
        oid: ObjectId,
        messages: Vec<String>,
    },
    /// The merge stopped; resolve the paths and commit to finish it.
    Conflicted {
        conflicts: Vec<String>,
        messages: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every command ran; the new commits in order.
    Completed(Vec<ObjectId>),
    /// A command stopped on conflicts and the sequence is paused.
    Conflicted {
        action: Action,
        oid: ObjectId,
        title: String,
        conflicts: Vec<String>,
        messages: Vec<String>,
    },
}

enum Step {
    Committed(ObjectId),
    Conflicted {
        conflicts: Vec<String>,
        messages: Vec<String>,
    },
}

/// A repository on disk: object database, index, refs and working tree
/// under one root.
pub struct Repository {
    git_path: PathBuf,
    db: Database,
    index: Index,
    refs: Refs,
    workspace: FsWorkspace,
    config: RepoConfig,
}

impl Repository {
    /// Create the repository layout below `root`. Existing state is kept.
    pub fn init(root: impl AsRef<Path>) -> RepoResult<Self> {
        let root = root.as_ref();
        let git_path = root.join(GIT_DIR);
        fs::create_dir_all(git_path.join("objects"))?;
        let refs = Refs::new(git_path.clone());
        refs.init()?;

        let config_path = git_path.join(CONFIG_FILE);
        let config = RepoConfig::load(&config_path)?;
        if !config_path.exists() {
            config.save(&config_path)?;
        }

        refs.init_head(&config.core.default_branch)?;
        info!(path = %git_path.display(), "initialized empty repository");
        Self::load(root)
    }

    /// Open the repository containing `path`, searching its ancestors.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let start = path.as_ref();
        let root = start
            .ancestors()
            .find(|dir| dir.join(GIT_DIR).is_dir())
            .ok_or_else(|| RepoError::NotARepository(start.to_path_buf()))?;
        Self::load(root)
    }

    fn load(root: &Path) -> RepoResult<Self> {
        let git_path = root.join(GIT_DIR);
        let config = RepoConfig::load(&git_path.join(CONFIG_FILE))?;
        debug!(root = %root.display(), "repository opened");
        Ok(Self {
            db: Database::open(git_path.join("objects")),
            index: Index::new(git_path.join("index")),
            refs: Refs::new(git_path.clone()),
            workspace: FsWorkspace::new(root),
            config,
            git_path,
        })
    }

    // ---- Accessors ----

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn root(&self) -> &Path {
        self.workspace.root()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn workspace(&self) -> &FsWorkspace {
        &self.workspace
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RepoConfig) -> RepoResult<()> {
        config.save(&self.git_path.join(CONFIG_FILE))?;
        self.config = config;
        Ok(())
    }

    pub fn pending_commit(&self) -> PendingCommit {
        PendingCommit::new(&self.git_path)
    }

    /// Resolve a revision expression, optionally requiring an object kind.
    pub fn resolve(&self, expr: &str, kind: Option<ObjectKind>) -> RepoResult<ObjectId> {
        Revision::new(&self.db, &self.refs, expr).resolve(kind)
    }

    fn resolve_commit(&self, expr: &str) -> RepoResult<ObjectId> {
        Revision::new(&self.db, &self.refs, expr).commit()
    }

    fn head_oid(&self) -> RepoResult<ObjectId> {
        self.refs.read_head()?.ok_or_else(|| {
            RepoError::InvalidOperation("HEAD does not point at a commit yet".into())
        })
    }

    /// Run `f` with the index loaded and locked; the result is written back
    /// on success and the lock released on failure.
    fn update_index<T>(&mut self, f: impl FnOnce(&mut Self) -> RepoResult<T>) -> RepoResult<T> {
        self.index.load_for_update()?;
        match f(self) {
            Ok(value) => {
                self.index.write_updates()?;
                Ok(value)
            }
            Err(e) => {
                self.index.release_lock()?;
                Err(e)
            }
        }
    }

    // ---- Index operations ----

    /// Stage files. `.` stands for the whole working tree.
    pub fn add<S: AsRef<str>>(&mut self, paths: &[S]) -> RepoResult<()> {
        self.update_index(|repo| {
            let mut files = Vec::new();
            for path in paths {
                let path = path.as_ref().trim_end_matches('/');
                let scope = (!path.is_empty() && path != ".").then_some(path);
                files.extend(repo.workspace.list_files(scope)?);
            }
            for file in files {
                let data = repo.workspace.read_file(&file)?;
                let Some(stat) = repo.workspace.stat_file(&file)? else {
                    continue;
                };
                let oid = repo.db.store(&Blob::new(data).into())?;
                repo.index.add(&file, oid, &stat);
            }
            Ok(())
        })
    }

    /// Unstage tracked files and delete them from the working tree.
    pub fn remove<S: AsRef<str>>(&mut self, paths: &[S]) -> RepoResult<()> {
        self.update_index(|repo| {
            for path in paths {
                let path = path.as_ref();
                if !repo.index.tracked_file(path) {
                    return Err(RepoError::InvalidOperation(format!(
                        "pathspec '{path}' did not match any files"
                    )));
                }
            }
            for path in paths {
                repo.index.remove(path.as_ref());
                repo.workspace.remove(path.as_ref())?;
            }
            Ok(())
        })
    }

    /// Compare the working tree and index with HEAD.
    pub fn status(&mut self) -> RepoResult<Status> {
        let head = self.refs.read_head()?;
        self.update_index(|repo| {
            Status::new(&repo.workspace, &mut repo.index, &repo.db, head.as_ref())
        })
    }

    /// Make the index and working tree match `oid`'s tree exactly.
    /// Untracked files are left alone.
    pub fn hard_reset(&mut self, oid: &ObjectId) -> RepoResult<()> {
        self.update_index(|repo| repo.reset_paths(oid))
    }

    /// Move HEAD to `revision` and make the index and working tree match
    /// it. The old HEAD is saved in `ORIG_HEAD`.
    pub fn reset(&mut self, revision: &str) -> RepoResult<ObjectId> {
        let oid = self.resolve_commit(revision)?;
        self.hard_reset(&oid)?;
        if let Some(previous) = self.refs.update_head(&oid)? {
            self.refs.update_ref(ORIG_HEAD, &previous)?;
        }
        Ok(oid)
    }

    fn reset_paths(&mut self, oid: &ObjectId) -> RepoResult<()> {
        let status = Status::new(&self.workspace, &mut self.index, &self.db, Some(oid))?;
        for path in &status.changed {
            self.reset_path(path, status.head_tree.get(path))?;
        }
        debug!(oid = %oid.short_hex(), paths = status.changed.len(), "hard reset");
        Ok(())
    }

    fn reset_path(&mut self, path: &str, item: Option<&Entry>) -> RepoResult<()> {
        self.index.remove(path);
        self.workspace.remove(path)?;
        let Some(item) = item else {
            return Ok(());
        };
        let blob = self.db.load_blob(&item.object_id)?;
        self.workspace
            .write_file(path, &blob.data, Some(item.mode), true)?;
        if let Some(stat) = self.workspace.stat_file(path)? {
            self.index.add(path, item.object_id, &stat);
        }
        Ok(())
    }

    // ---- History ----

    /// Commit the index as the current user. Finishes a pending merge,
    /// cherry-pick or revert when one is waiting.
    pub fn commit(&mut self, message: &str) -> RepoResult<ObjectId> {
        let author = self.config.current_author()?;
        self.commit_as(message, author)
    }

    pub fn commit_as(&mut self, message: &str, author: Author) -> RepoResult<ObjectId> {
        if let Some(kind) = self.pending_commit().merge_type() {
            return self.commit_pending(kind, Some(message));
        }
        self.index.load()?;
        if self.index.conflict() {
            return Err(unmerged("Committing"));
        }
        let parents = self.refs.read_head()?.into_iter().collect();
        self.write_commit(parents, author.clone(), author, message)
    }

    /// Store a commit of the in-memory index and move HEAD to it.
    fn write_commit(
        &mut self,
        parents: Vec<ObjectId>,
        author: Author,
        committer: Author,
        message: &str,
    ) -> RepoResult<ObjectId> {
        let message = clean_message(message);
        if message.trim().is_empty() {
            return Err(RepoError::InvalidOperation(
                "Aborting commit due to empty commit message.".into(),
            ));
        }
        let tree = self.index.write_tree(&self.db)?;
        let commit = Commit::new(parents, tree, author, committer, message);
        let oid = self.db.store(&commit.clone().into())?;
        self.refs.update_head(&oid)?;
        info!(
            oid = %oid.short_hex(),
            parents = commit.parents.len(),
            title = commit.title_line(),
            "commit written"
        );
        Ok(oid)
    }

    fn commit_pending(&mut self, kind: MergeType, message: Option<&str>) -> RepoResult<ObjectId> {
        self.index.load()?;
        if self.index.conflict() {
            return Err(unmerged("Committing"));
        }
        let pending = self.pending_commit();
        let message = match message {
            Some(message) => message.to_string(),
            None => pending.merge_message()?,
        };
        let merge_oid = pending.merge_oid(kind)?;
        let head = self.head_oid()?;
        let committer = self.config.current_author()?;

        let (parents, author) = match kind {
            MergeType::Merge => (vec![head, merge_oid], committer.clone()),
            MergeType::CherryPick => (vec![head], self.db.load_commit(&merge_oid)?.author),
            MergeType::Revert => (vec![head], committer.clone()),
        };
        let oid = self.write_commit(parents, author, committer, &message)?;
        pending.clear(kind)?;
        Ok(oid)
    }

    pub fn rev_list<S: AsRef<str>>(
        &self,
        revs: &[S],
        options: RevListOptions,
    ) -> RepoResult<RevList<'_>> {
        RevList::new(&self.db, &self.refs, &self.workspace, revs, options)
    }

    /// Tree changes between two revisions.
    pub fn diff_commits(&self, a: &str, b: &str) -> RepoResult<TreeChanges> {
        let a = self.resolve_commit(a)?;
        let b = self.resolve_commit(b)?;
        Ok(tree_diff::<&str>(&self.db, Some(&a), Some(&b), &[])?)
    }

    // ---- Branches ----

    pub fn create_branch(&self, name: &str, start: Option<&str>) -> RepoResult<ObjectId> {
        let oid = self.resolve_commit(start.unwrap_or(HEAD))?;
        self.refs.create_branch(name, &oid)?;
        Ok(oid)
    }

    pub fn delete_branch(&self, name: &str) -> RepoResult<ObjectId> {
        Ok(self.refs.delete_branch(name)?)
    }

    pub fn list_branches(&self) -> RepoResult<Vec<SymRef>> {
        Ok(self.refs.list_branches()?)
    }

    /// Move the working tree, index and HEAD to `revision`. A branch name
    /// attaches HEAD to it; anything else detaches.
    pub fn checkout(&mut self, revision: &str) -> RepoResult<ObjectId> {
        let current = self.refs.read_head()?;
        let target = self.resolve_commit(revision)?;
        self.update_index(|repo| repo.migrate(current.as_ref(), &target))?;
        self.refs.set_head(revision, &target)?;
        debug!(revision, oid = %target.short_hex(), "checked out");
        Ok(target)
    }

    fn migrate(&mut self, from: Option<&ObjectId>, to: &ObjectId) -> RepoResult<()> {
        let diff = tree_diff::<&str>(&self.db, from, Some(to), &[])?;
        Migration::new(diff).apply_changes(&self.workspace, &mut self.index, &self.db)?;
        Ok(())
    }

    // ---- Merging ----

    /// Merge `revision` into HEAD.
    pub fn merge(&mut self, revision: &str, message: Option<&str>) -> RepoResult<MergeOutcome> {
        if self.pending_commit().in_progress() {
            return Err(unmerged("Merging"));
        }
        let head = self.head_oid()?;
        let right = self.resolve_commit(revision)?;
        let inputs = Inputs::new(&self.db, HEAD_NAME, revision, head, right)?;
        self.refs.update_ref(ORIG_HEAD, &head)?;

        if inputs.already_merged() {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        if inputs.fast_forward() {
            self.update_index(|repo| repo.migrate(Some(&head), &right))?;
            self.refs.update_head(&right)?;
            info!(from = %head.short_hex(), to = %right.short_hex(), "fast-forward");
            return Ok(MergeOutcome::FastForward {
                from: head,
                to: right,
            });
        }

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Merge commit '{revision}'"));
        let pending = self.pending_commit();
        pending.start(&right, MergeType::Merge)?;
        pending.write_message(&message)?;

        let messages = match self.update_index(|repo| repo.resolve_merge(&inputs)) {
            Ok(messages) => messages,
            Err(e) => {
                pending.clear(MergeType::Merge)?;
                return Err(e);
            }
        };
        if self.index.conflict() {
            let conflicts = self.index.conflict_paths();
            pending.write_message(&conflict_message(&message, &conflicts))?;
            return Ok(MergeOutcome::Conflicted {
                conflicts,
                messages,
            });
        }

        let author = self.config.current_author()?;
        let oid = self.write_commit(vec![head, right], author.clone(), author, &message)?;
        pending.clear(MergeType::Merge)?;
        Ok(MergeOutcome::Merged { oid, messages })
    }

    /// Commit a merge whose conflicts have been resolved, using the saved
    /// message.
    pub fn commit_pending_merge(&mut self) -> RepoResult<ObjectId> {
        self.commit_pending(MergeType::Merge, None)
    }

    /// Drop a conflicted merge and return to HEAD.
    pub fn abort_merge(&mut self) -> RepoResult<()> {
        self.pending_commit().clear(MergeType::Merge)?;
        let head = self.head_oid()?;
        self.hard_reset(&head)
    }

    /// Run the tree merge, returning the progress messages it produced.
    fn resolve_merge(&mut self, inputs: &Inputs) -> RepoResult<Vec<String>> {
        let mut messages = Vec::new();
        {
            let mut resolve = Resolve::new(&self.db, &self.workspace, &mut self.index, inputs);
            resolve.label_conflicts(self.config.merge.conflict_style_names);
            resolve.on_progress(|message| messages.push(message.to_string()));
            resolve.execute()?;
        }
        Ok(messages)
    }

    // ---- Sequencing ----

    /// Apply the changes introduced by each commit on top of HEAD, oldest
    /// first.
    pub fn cherry_pick<S: AsRef<str>>(
        &mut self,
        revs: &[S],
        options: SequenceOptions,
    ) -> RepoResult<SequenceOutcome> {
        self.start_sequence(revs, options, Action::Pick)
    }

    /// Commit the inverse of each commit, newest first.
    pub fn revert<S: AsRef<str>>(
        &mut self,
        revs: &[S],
        options: SequenceOptions,
    ) -> RepoResult<SequenceOutcome> {
        self.start_sequence(revs, options, Action::Revert)
    }

    fn start_sequence<S: AsRef<str>>(
        &mut self,
        revs: &[S],
        options: SequenceOptions,
        action: Action,
    ) -> RepoResult<SequenceOutcome> {
        let head = self.head_oid()?;
        let reversed: Vec<&str> = revs.iter().rev().map(AsRef::as_ref).collect();
        let walk = RevListOptions {
            walk: false,
            ..RevListOptions::default()
        };
        let mut commits = self.rev_list(&reversed, walk)?.commits()?;
        if action == Action::Pick {
            commits.reverse();
        }
        for (oid, commit) in &commits {
            self.select_parent(oid, commit, options.mainline)?;
        }

        let mut sequencer = Sequencer::new(&self.git_path);
        sequencer.start(&head, &options)?;
        for (oid, commit) in commits {
            match action {
                Action::Pick => sequencer.pick(oid, commit),
                Action::Revert => sequencer.revert(oid, commit),
            }
        }
        self.resume_sequencer(sequencer, &options)
    }

    /// Commit the resolved command that stopped the sequence and carry on
    /// with the rest.
    pub fn continue_sequence(&mut self) -> RepoResult<SequenceOutcome> {
        let mut sequencer = Sequencer::new(&self.git_path);
        if !sequencer.in_progress() {
            return Err(no_sequence());
        }
        match self.pending_commit().merge_type() {
            Some(MergeType::Merge) => return Err(unmerged("Continuing")),
            Some(kind) => {
                self.commit_pending(kind, None)?;
            }
            None => {}
        }

        sequencer.load(&self.db)?;
        let head = self.head_oid()?;
        sequencer.drop_command(&head)?;
        let options = sequencer.options()?;
        self.resume_sequencer(sequencer, &options)
    }

    /// Stop the sequence and rewind to where it started. Returns that
    /// commit.
    pub fn abort_sequence(&mut self) -> RepoResult<ObjectId> {
        let mut sequencer = Sequencer::new(&self.git_path);
        if !sequencer.in_progress() {
            return Err(no_sequence());
        }
        let pending = self.pending_commit();
        if let Some(kind) = pending.merge_type() {
            pending.clear(kind)?;
        }

        let current = self.refs.read_head()?;
        let head = sequencer.abort(current.as_ref())?;
        self.hard_reset(&head)?;
        if let Some(previous) = self.refs.update_head(&head)? {
            self.refs.update_ref(ORIG_HEAD, &previous)?;
        }
        info!(head = %head.short_hex(), "sequence aborted");
        Ok(head)
    }

    /// Forget the sequence, keeping HEAD and the working tree as they are.
    pub fn quit_sequence(&mut self) -> RepoResult<()> {
        let pending = self.pending_commit();
        if let Some(kind) = pending.merge_type() {
            pending.clear(kind)?;
        }
        Sequencer::new(&self.git_path).quit()
    }

    fn resume_sequencer(
        &mut self,
        mut sequencer: Sequencer,
        options: &SequenceOptions,
    ) -> RepoResult<SequenceOutcome> {
        let mut done = Vec::new();
        while let Some(command) = sequencer.next_command().cloned() {
            let step = match command.action {
                Action::Pick => self.pick(&command, options),
                Action::Revert => self.revert_one(&command, options),
            };
            match step {
                Ok(Step::Committed(oid)) => {
                    sequencer.drop_command(&oid)?;
                    done.push(oid);
                }
                Ok(Step::Conflicted {
                    conflicts,
                    messages,
                }) => {
                    sequencer.dump(&self.db)?;
                    return Ok(SequenceOutcome::Conflicted {
                        action: command.action,
                        oid: command.oid,
                        title: command.commit.title_line().to_string(),
                        conflicts,
                        messages,
                    });
                }
                Err(e) => {
                    sequencer.dump(&self.db)?;
                    return Err(e);
                }
            }
        }
        sequencer.quit()?;
        Ok(SequenceOutcome::Completed(done))
    }

    fn pick(&mut self, command: &Command, options: &SequenceOptions) -> RepoResult<Step> {
        let head = self.head_oid()?;
        let commit = &command.commit;
        let parent = self.select_parent(&command.oid, commit, options.mainline)?;
        let inputs = Inputs {
            left_name: HEAD_NAME.into(),
            right_name: format!(
                "{}... {}",
                self.db.short_oid(&command.oid),
                commit.title_line()
            ),
            left_oid: head,
            right_oid: command.oid,
            base_oids: parent.into_iter().collect(),
        };

        let messages = self.update_index(|repo| repo.resolve_merge(&inputs))?;
        if self.index.conflict() {
            return self.stop_on_conflict(command, MergeType::CherryPick, &commit.message, messages);
        }
        let committer = self.config.current_author()?;
        let oid = self.write_commit(vec![head], commit.author.clone(), committer, &commit.message)?;
        Ok(Step::Committed(oid))
    }

    fn revert_one(&mut self, command: &Command, options: &SequenceOptions) -> RepoResult<Step> {
        let head = self.head_oid()?;
        let commit = &command.commit;
        let short = self.db.short_oid(&command.oid);
        let parent = self
            .select_parent(&command.oid, commit, options.mainline)?
            .ok_or_else(|| {
                RepoError::InvalidOperation(format!("cannot revert root commit {short}"))
            })?;
        let inputs = Inputs {
            left_name: HEAD_NAME.into(),
            right_name: format!("parent of {short}... {}", commit.title_line()),
            left_oid: head,
            right_oid: parent,
            base_oids: vec![command.oid],
        };
        let message = format!(
            "Revert \"{}\"\n\nThis reverts commit {}.\n",
            commit.title_line(),
            command.oid
        );

        let messages = self.update_index(|repo| repo.resolve_merge(&inputs))?;
        if self.index.conflict() {
            return self.stop_on_conflict(command, MergeType::Revert, &message, messages);
        }
        let author = self.config.current_author()?;
        let oid = self.write_commit(vec![head], author.clone(), author, &message)?;
        Ok(Step::Committed(oid))
    }

    fn stop_on_conflict(
        &mut self,
        command: &Command,
        kind: MergeType,
        message: &str,
        messages: Vec<String>,
    ) -> RepoResult<Step> {
        let pending = self.pending_commit();
        pending.start(&command.oid, kind)?;
        let conflicts = self.index.conflict_paths();
        pending.write_message(&conflict_message(message, &conflicts))?;
        Ok(Step::Conflicted {
            conflicts,
            messages,
        })
    }

    /// The parent a pick or revert is computed against. Merge commits need
    /// a 1-based `mainline`; other commits must not be given one.
    fn select_parent(
        &self,
        oid: &ObjectId,
        commit: &Commit,
        mainline: Option<usize>,
    ) -> RepoResult<Option<ObjectId>> {
        let short = self.db.short_oid(oid);
        match (commit.is_merge(), mainline) {
            (true, None) => Err(RepoError::InvalidOperation(format!(
                "commit {short} is a merge but no -m option was given."
            ))),
            (true, Some(n)) => n
                .checked_sub(1)
                .and_then(|i| commit.parents.get(i))
                .copied()
                .map(Some)
                .ok_or_else(|| {
                    RepoError::InvalidOperation(format!("commit {short} does not have parent {n}"))
                }),
            (false, Some(_)) => Err(RepoError::InvalidOperation(format!(
                "mainline was specified but commit {short} is not a merge."
            ))),
            (false, None) => Ok(commit.parent().copied()),
        }
    }
}

fn unmerged(action: &str) -> RepoError {
    RepoError::InvalidOperation(format!(
        "{action} is not possible because you have unmerged files."
    ))
}

fn no_sequence() -> RepoError {
    RepoError::InvalidOperation("no cherry-pick or revert in progress".into())
}

/// Saved message for a stopped commit: the original text plus the
/// conflicted paths as comment lines.
fn conflict_message(message: &str, conflicts: &[String]) -> String {
    let mut out = format!("{}\n\n# Conflicts:\n", message.trim_end());
    for path in conflicts {
        out.push_str(&format!("#\t{path}\n"));
    }
    out
}

/// Drop comment lines and trailing blank space, ending with one newline.
fn clean_message(message: &str) -> String {
    let kept: Vec<&str> = message
        .lines()
        .filter(|line| !line.starts_with('#'))
        .collect();
    let text = kept.join("\n");
    let text = text.trim_end();
    if text.is_empty() {
        String::new()
    } else {
        format!("{text}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRepo;
    use knot_index::IndexError;
    use knot_workspace::MigrationError;

    fn read(t: &TestRepo, path: &str) -> String {
        fs::read_to_string(t.root().join(path)).unwrap()
    }

    fn head(t: &TestRepo) -> ObjectId {
        t.repo.refs().read_head().unwrap().unwrap()
    }

    fn head_commit(t: &TestRepo) -> Commit {
        t.repo.database().load_commit(&head(t)).unwrap()
    }

    /// master and topic both branch from a commit holding `f.txt`.
    fn diverged(t: &mut TestRepo, master: (&str, &str), topic: (&str, &str)) {
        t.commit_file("f.txt", "base\n", "base");
        t.repo.create_branch("topic", None).unwrap();
        t.repo.checkout("topic").unwrap();
        t.commit_file(topic.0, topic.1, "on topic");
        t.repo.checkout("master").unwrap();
        t.commit_file(master.0, master.1, "on master");
    }

    // -----------------------------------------------------------------
    // Setup and commits
    // -----------------------------------------------------------------

    #[test]
    fn init_creates_layout_and_open_finds_it() {
        let t = TestRepo::new();
        let git = t.repo.git_path();
        assert!(git.join("objects").is_dir());
        assert!(git.join("refs/heads").is_dir());
        assert_eq!(
            fs::read_to_string(git.join("HEAD")).unwrap(),
            "ref: refs/heads/master\n"
        );

        fs::create_dir_all(t.root().join("a/b")).unwrap();
        let opened = Repository::open(t.root().join("a/b")).unwrap();
        assert_eq!(opened.git_path(), git);
        assert_eq!(opened.config().user.name.as_deref(), Some("A. U. Thor"));
    }

    #[test]
    fn reinit_keeps_existing_head() {
        let t = TestRepo::new();
        let git = t.repo.git_path().to_path_buf();
        fs::write(git.join("HEAD"), "ref: refs/heads/topic\n").unwrap();

        Repository::init(t.root()).unwrap();
        assert_eq!(
            fs::read_to_string(git.join("HEAD")).unwrap(),
            "ref: refs/heads/topic\n"
        );
        assert!(!git.join("HEAD.lock").exists());
    }

    #[test]
    fn open_outside_a_repository_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Repository::open(dir.path()).err().unwrap();
        assert!(matches!(err, RepoError::NotARepository(_)));
    }

    #[test]
    fn commits_chain_onto_head() {
        let mut t = TestRepo::new();
        let first = t.commit_file("a.txt", "1\n", "first");
        let second = t.commit_file("a.txt", "2\n", "second\n\n# note\n");

        let commit = head_commit(&t);
        assert_eq!(head(&t), second);
        assert_eq!(commit.parents, vec![first]);
        assert_eq!(commit.message, "second\n");
        assert!(t.repo.database().load_commit(&first).unwrap().parents.is_empty());
    }

    #[test]
    fn empty_message_is_refused() {
        let mut t = TestRepo::new();
        t.write("a.txt", "1\n");
        t.repo.add(&["a.txt"]).unwrap();
        assert!(t.repo.commit("# only a comment\n").is_err());
        assert_eq!(t.repo.refs().read_head().unwrap(), None);
    }

    #[test]
    fn removing_an_untracked_path_fails() {
        let mut t = TestRepo::new();
        t.commit_file("a.txt", "1\n", "first");
        t.write("loose.txt", "x\n");
        let err = t.repo.remove(&["loose.txt"]).unwrap_err();
        assert_eq!(err.to_string(), "pathspec 'loose.txt' did not match any files");
        assert!(t.root().join("loose.txt").exists());
    }

    // -----------------------------------------------------------------
    // Checkout and reset
    // -----------------------------------------------------------------

    #[test]
    fn checkout_switches_trees_and_head() {
        let mut t = TestRepo::new();
        let first = t.commit_file("f.txt", "1\n", "first");
        t.commit_file("dir/g.txt", "g\n", "second");

        t.repo.checkout(&first.to_hex()).unwrap();
        assert_eq!(head(&t), first);
        assert!(!t.root().join("dir").exists());
        assert_eq!(t.repo.refs().current_ref().unwrap().path, "HEAD");

        t.repo.checkout("master").unwrap();
        assert_eq!(read(&t, "dir/g.txt"), "g\n");
        assert_eq!(t.repo.refs().current_ref().unwrap().path, "refs/heads/master");
        assert!(t.repo.status().unwrap().is_clean());
    }

    #[test]
    fn checkout_refuses_to_overwrite_local_changes() {
        let mut t = TestRepo::new();
        t.commit_file("f.txt", "1\n", "first");
        t.repo.create_branch("topic", None).unwrap();
        t.repo.checkout("topic").unwrap();
        t.commit_file("f.txt", "2\n", "second");
        t.repo.checkout("master").unwrap();

        t.write("f.txt", "local edit\n");
        let err = t.repo.checkout("topic").unwrap_err();
        assert!(matches!(err, RepoError::Migration(MigrationError::Conflict(_))));
        assert_eq!(read(&t, "f.txt"), "local edit\n");
        assert_eq!(t.repo.refs().current_ref().unwrap().path, "refs/heads/master");
    }

    #[test]
    fn hard_reset_restores_tracked_files() {
        let mut t = TestRepo::new();
        let first = t.commit_file("f.txt", "1\n", "first");
        t.write("f.txt", "changed\n");
        t.write("g.txt", "new\n");
        t.repo.add(&["g.txt"]).unwrap();
        t.write("untracked.txt", "keep\n");

        t.repo.hard_reset(&first).unwrap();
        assert_eq!(read(&t, "f.txt"), "1\n");
        assert!(!t.root().join("g.txt").exists());
        assert_eq!(read(&t, "untracked.txt"), "keep\n");
        let status = t.repo.status().unwrap();
        assert!(status.changed.is_empty());
    }

    #[test]
    fn reset_moves_head_and_files() {
        let mut t = TestRepo::new();
        let first = t.commit_file("f.txt", "1\n", "first");
        let second = t.commit_file("g.txt", "g\n", "second");

        assert_eq!(t.repo.reset("@^").unwrap(), first);
        assert_eq!(head(&t), first);
        assert!(!t.root().join("g.txt").exists());
        assert_eq!(t.repo.refs().read_ref(ORIG_HEAD).unwrap(), Some(second));
        assert_eq!(t.repo.refs().current_ref().unwrap().path, "refs/heads/master");
    }

    // -----------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------

    #[test]
    fn merge_of_an_ancestor_is_up_to_date() {
        let mut t = TestRepo::new();
        t.commit_file("f.txt", "1\n", "first");
        t.repo.create_branch("topic", None).unwrap();
        let tip = t.commit_file("f.txt", "2\n", "second");

        assert_eq!(t.repo.merge("topic", None).unwrap(), MergeOutcome::AlreadyUpToDate);
        assert_eq!(head(&t), tip);
    }

    #[test]
    fn merge_fast_forwards() {
        let mut t = TestRepo::new();
        let base = t.commit_file("f.txt", "1\n", "first");
        t.repo.create_branch("topic", None).unwrap();
        t.repo.checkout("topic").unwrap();
        let tip = t.commit_file("f.txt", "2\n", "second");
        t.repo.checkout("master").unwrap();

        let outcome = t.repo.merge("topic", None).unwrap();
        assert_eq!(outcome, MergeOutcome::FastForward { from: base, to: tip });
        assert_eq!(head(&t), tip);
        assert_eq!(read(&t, "f.txt"), "2\n");
        assert_eq!(t.repo.refs().read_ref(ORIG_HEAD).unwrap(), Some(base));
    }

    #[test]
    fn clean_merge_commits_both_parents() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("m.txt", "m\n"), ("t.txt", "t\n"));
        let ours = head(&t);
        let theirs = t.repo.refs().read_ref("topic").unwrap().unwrap();

        let MergeOutcome::Merged { oid, .. } = t.repo.merge("topic", None).unwrap() else {
            panic!("expected a merge commit");
        };
        let commit = head_commit(&t);
        assert_eq!(head(&t), oid);
        assert_eq!(commit.parents, vec![ours, theirs]);
        assert_eq!(commit.message, "Merge commit 'topic'\n");
        assert_eq!(read(&t, "t.txt"), "t\n");
        assert_eq!(read(&t, "m.txt"), "m\n");
        assert!(!t.repo.pending_commit().in_progress());
    }

    #[test]
    fn conflicted_merge_waits_for_resolution() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("f.txt", "ours\n"), ("f.txt", "theirs\n"));
        let ours = head(&t);

        let MergeOutcome::Conflicted { conflicts, messages } = t.repo.merge("topic", None).unwrap()
        else {
            panic!("expected conflicts");
        };
        assert_eq!(conflicts, vec!["f.txt".to_string()]);
        assert!(messages.iter().any(|m| m.contains("CONFLICT (content)")));
        assert_eq!(
            read(&t, "f.txt"),
            "<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> topic\n"
        );
        assert_eq!(head(&t), ours);
        assert!(t.repo.merge("topic", None).is_err());

        let err = t.repo.commit("too early").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Committing is not possible because you have unmerged files."
        );

        t.write("f.txt", "both\n");
        t.repo.add(&["f.txt"]).unwrap();
        let oid = t.repo.commit_pending_merge().unwrap();
        let commit = head_commit(&t);
        assert_eq!(head(&t), oid);
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(commit.message, "Merge commit 'topic'\n");
        assert!(!t.repo.pending_commit().in_progress());
    }

    #[test]
    fn abort_merge_restores_head() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("f.txt", "ours\n"), ("f.txt", "theirs\n"));
        t.repo.merge("topic", None).unwrap();

        t.repo.abort_merge().unwrap();
        assert_eq!(read(&t, "f.txt"), "ours\n");
        assert!(!t.repo.pending_commit().in_progress());
        assert!(t.repo.status().unwrap().is_clean());

        let err = t.repo.abort_merge().unwrap_err();
        assert_eq!(err.to_string(), "There is no merge to abort (MERGE_HEAD missing).");
    }

    #[test]
    fn unlabelled_conflicts_when_configured() {
        let mut t = TestRepo::new();
        let mut config = t.repo.config().clone();
        config.merge.conflict_style_names = false;
        t.repo.set_config(config).unwrap();
        diverged(&mut t, ("f.txt", "ours\n"), ("f.txt", "theirs\n"));

        t.repo.merge("topic", None).unwrap();
        assert_eq!(read(&t, "f.txt"), "<<<<<<<\nours\n=======\ntheirs\n>>>>>>>\n");
    }

    // -----------------------------------------------------------------
    // Cherry-pick and revert
    // -----------------------------------------------------------------

    #[test]
    fn cherry_pick_copies_a_commit_keeping_its_author() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("m.txt", "m\n"), ("t.txt", "t\n"));
        let master = head(&t);
        let picked = t.repo.refs().read_ref("topic").unwrap().unwrap();

        let outcome = t.repo.cherry_pick(&["topic"], SequenceOptions::default()).unwrap();
        let SequenceOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done, vec![head(&t)]);

        let commit = head_commit(&t);
        let original = t.repo.database().load_commit(&picked).unwrap();
        assert_eq!(commit.parents, vec![master]);
        assert_eq!(commit.message, original.message);
        assert_eq!(commit.author, original.author);
        assert_eq!(read(&t, "t.txt"), "t\n");
        assert!(!Sequencer::new(t.repo.git_path()).in_progress());
    }

    #[test]
    fn cherry_pick_stops_on_conflict_and_continues() {
        let mut t = TestRepo::new();
        t.commit_file("f.txt", "base\n", "base");
        t.repo.create_branch("topic", None).unwrap();
        t.repo.checkout("topic").unwrap();
        t.commit_file("f.txt", "theirs\n", "change f");
        t.commit_file("g.txt", "g\n", "add g");
        t.repo.checkout("master").unwrap();
        let master = t.commit_file("f.txt", "ours\n", "on master");

        let outcome = t
            .repo
            .cherry_pick(&["topic~1", "topic"], SequenceOptions::default())
            .unwrap();
        let SequenceOutcome::Conflicted { action, title, conflicts, .. } = outcome else {
            panic!("expected a conflict");
        };
        assert_eq!(action, Action::Pick);
        assert_eq!(title, "change f");
        assert_eq!(conflicts, vec!["f.txt".to_string()]);
        assert_eq!(t.repo.pending_commit().merge_type(), Some(MergeType::CherryPick));
        assert!(!t.root().join("g.txt").exists());

        t.write("f.txt", "resolved\n");
        t.repo.add(&["f.txt"]).unwrap();
        let SequenceOutcome::Completed(done) = t.repo.continue_sequence().unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(done.len(), 1);

        let tip = head_commit(&t);
        assert_eq!(tip.title_line(), "add g");
        let resolved = t.repo.database().load_commit(&tip.parents[0]).unwrap();
        assert_eq!(resolved.title_line(), "change f");
        assert_eq!(resolved.parents, vec![master]);
        assert_eq!(read(&t, "g.txt"), "g\n");
        assert_eq!(read(&t, "f.txt"), "resolved\n");
        assert!(!t.repo.pending_commit().in_progress());
        assert!(!Sequencer::new(t.repo.git_path()).in_progress());
    }

    #[test]
    fn abort_sequence_rewinds_to_the_start() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("f.txt", "ours\n"), ("f.txt", "theirs\n"));
        let start = head(&t);

        t.repo.cherry_pick(&["topic"], SequenceOptions::default()).unwrap();
        assert!(t.repo.continue_sequence().is_err());

        assert_eq!(t.repo.abort_sequence().unwrap(), start);
        assert_eq!(head(&t), start);
        assert_eq!(read(&t, "f.txt"), "ours\n");
        assert!(!t.repo.pending_commit().in_progress());
        assert!(matches!(
            t.repo.abort_sequence().unwrap_err(),
            RepoError::InvalidOperation(_)
        ));
    }

    #[test]
    fn revert_undoes_a_commit() {
        let mut t = TestRepo::new();
        t.commit_file("f.txt", "1\n", "first");
        let second = t.commit_file("f.txt", "2\n", "second");

        let outcome = t.repo.revert(&["@"], SequenceOptions::default()).unwrap();
        assert!(matches!(outcome, SequenceOutcome::Completed(ref done) if done.len() == 1));
        assert_eq!(read(&t, "f.txt"), "1\n");
        let commit = head_commit(&t);
        assert_eq!(commit.parents, vec![second]);
        assert_eq!(
            commit.message,
            format!("Revert \"second\"\n\nThis reverts commit {second}.\n")
        );
    }

    #[test]
    fn merge_commits_need_a_mainline() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("m.txt", "m\n"), ("t.txt", "t\n"));
        t.repo.merge("topic", None).unwrap();

        let err = t.repo.revert(&["@"], SequenceOptions::default()).unwrap_err();
        assert!(err.to_string().contains("is a merge but no -m option was given"));
        assert!(!Sequencer::new(t.repo.git_path()).in_progress());

        let outcome = t
            .repo
            .revert(&["@"], SequenceOptions { mainline: Some(1) })
            .unwrap();
        assert!(matches!(outcome, SequenceOutcome::Completed(_)));
        assert!(!t.root().join("t.txt").exists());
        assert_eq!(read(&t, "m.txt"), "m\n");
    }

    #[test]
    fn write_tree_refuses_conflicts() {
        let mut t = TestRepo::new();
        diverged(&mut t, ("f.txt", "ours\n"), ("f.txt", "theirs\n"));
        t.repo.merge("topic", None).unwrap();
        let err = t.repo.index().write_tree(t.repo.database()).unwrap_err();
        assert!(matches!(err, IndexError::Conflict(paths) if paths == vec!["f.txt".to_string()]));
    }
}
