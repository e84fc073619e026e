//! Persistent queue of cherry-pick and revert commands.
//!
//! State lives in `.git/sequencer/`: `head` holds the commit HEAD pointed
//! at when the sequence began, `abort-safety` the HEAD after the last
//! completed command, `todo` the remaining commands, and `opts` the
//! options in TOML form.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use knot_store::{Commit, Database};
use knot_types::{Lockfile, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};

pub const UNSAFE_MESSAGE: &str = "You seem to have moved HEAD. Not rewinding, check your HEAD!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Pick,
    Revert,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Pick => "pick",
            Action::Revert => "revert",
        })
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pick" => Ok(Action::Pick),
            "revert" => Ok(Action::Revert),
            other => Err(format!("unknown sequencer action '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub oid: ObjectId,
    pub commit: Commit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceOptions {
    /// Parent number (1-based) to diff merge commits against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mainline: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct OptsFile {
    options: SequenceOptions,
}

#[derive(Debug)]
pub struct Sequencer {
    path: PathBuf,
    head_path: PathBuf,
    abort_path: PathBuf,
    todo_path: PathBuf,
    opts_path: PathBuf,
    todo_file: Option<Lockfile>,
    commands: Vec<Command>,
}

impl Sequencer {
    /// Sequencer state below the repository directory `git_path`.
    pub fn new(git_path: &Path) -> Self {
        let path = git_path.join("sequencer");
        Self {
            head_path: path.join("head"),
            abort_path: path.join("abort-safety"),
            todo_path: path.join("todo"),
            opts_path: path.join("opts"),
            path,
            todo_file: None,
            commands: Vec::new(),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.path.is_dir()
    }

    /// Begin a sequence from `head`. Fails when one is already running.
    pub fn start(&mut self, head: &ObjectId, options: &SequenceOptions) -> RepoResult<()> {
        match fs::create_dir(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RepoError::InvalidOperation(
                    "a cherry-pick or revert is already in progress".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let opts = OptsFile {
            options: options.clone(),
        };
        let text = toml::to_string(&opts).map_err(|e| RepoError::Config {
            path: self.opts_path.clone(),
            reason: e.to_string(),
        })?;
        write_file(&self.opts_path, &text)?;
        write_file(&self.head_path, &format!("{head}\n"))?;
        write_file(&self.abort_path, &format!("{head}\n"))?;
        self.open_todo_file()
    }

    pub fn options(&self) -> RepoResult<SequenceOptions> {
        let text = match fs::read_to_string(&self.opts_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SequenceOptions::default()),
            Err(e) => return Err(e.into()),
        };
        let opts: OptsFile = toml::from_str(&text).map_err(|e| RepoError::Config {
            path: self.opts_path.clone(),
            reason: e.to_string(),
        })?;
        Ok(opts.options)
    }

    pub fn pick(&mut self, oid: ObjectId, commit: Commit) {
        self.commands.push(Command {
            action: Action::Pick,
            oid,
            commit,
        });
    }

    pub fn revert(&mut self, oid: ObjectId, commit: Commit) {
        self.commands.push(Command {
            action: Action::Revert,
            oid,
            commit,
        });
    }

    pub fn next_command(&self) -> Option<&Command> {
        self.commands.first()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Finish the first command; `head` is where HEAD now points.
    pub fn drop_command(&mut self, head: &ObjectId) -> RepoResult<()> {
        if !self.commands.is_empty() {
            self.commands.remove(0);
        }
        write_file(&self.abort_path, &format!("{head}\n"))
    }

    fn open_todo_file(&mut self) -> RepoResult<()> {
        if !self.path.is_dir() {
            return Ok(());
        }
        let mut lock = Lockfile::new(&self.todo_path);
        lock.hold_for_update()?;
        self.todo_file = Some(lock);
        Ok(())
    }

    /// Write the remaining commands to `todo` as `<action> <short> <title>`.
    pub fn dump(&mut self, db: &Database) -> RepoResult<()> {
        let Some(mut lock) = self.todo_file.take() else {
            return Ok(());
        };
        for command in &self.commands {
            let line = format!(
                "{} {} {}\n",
                command.action,
                db.short_oid(&command.oid),
                command.commit.title_line()
            );
            lock.write(line.as_bytes())?;
        }
        lock.commit()?;
        debug!(commands = self.commands.len(), "sequencer todo saved");
        Ok(())
    }

    /// Read the saved todo list back, holding it for a later `dump`.
    pub fn load(&mut self, db: &Database) -> RepoResult<()> {
        self.open_todo_file()?;
        let text = match fs::read_to_string(&self.todo_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.commands.clear();
        for line in text.lines() {
            let mut fields = line.splitn(3, ' ');
            let (Some(action), Some(short)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(action) = action.parse::<Action>() else {
                continue;
            };
            let Some(oid) = db.prefix_match(short)?.first().copied() else {
                continue;
            };
            let commit = db.load_commit(&oid)?;
            self.commands.push(Command {
                action,
                oid,
                commit,
            });
        }
        Ok(())
    }

    /// Drop all sequencer state.
    pub fn quit(&mut self) -> RepoResult<()> {
        if let Some(mut lock) = self.todo_file.take() {
            lock.rollback()?;
        }
        self.commands.clear();
        match fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// End the sequence and return the commit to rewind to. Refuses when
    /// `current` is not where the last completed command left HEAD.
    pub fn abort(&mut self, current: Option<&ObjectId>) -> RepoResult<ObjectId> {
        let head = read_oid(&self.head_path)?;
        let expected = read_oid(&self.abort_path)?;
        self.quit()?;

        if current != Some(&expected) {
            return Err(RepoError::UnsafeAbort(UNSAFE_MESSAGE.into()));
        }
        Ok(head)
    }
}

fn write_file(path: &Path, content: &str) -> RepoResult<()> {
    let mut lock = Lockfile::new(path);
    lock.hold_for_update()?;
    lock.write(content.as_bytes())?;
    lock.commit()?;
    Ok(())
}

fn read_oid(path: &Path) -> RepoResult<ObjectId> {
    let content = fs::read_to_string(path)?;
    Ok(ObjectId::from_hex(content.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRepo;

    fn git_path(t: &TestRepo) -> PathBuf {
        t.repo.git_path().to_path_buf()
    }

    #[test]
    fn start_writes_state_and_options() {
        let mut t = TestRepo::new();
        let head = t.commit_file("f.txt", "1\n", "one");

        let mut seq = Sequencer::new(&git_path(&t));
        let options = SequenceOptions { mainline: Some(2) };
        seq.start(&head, &options).unwrap();

        assert!(seq.in_progress());
        assert_eq!(seq.options().unwrap(), options);
        let saved = fs::read_to_string(git_path(&t).join("sequencer/head")).unwrap();
        assert_eq!(saved, format!("{head}\n"));

        let mut again = Sequencer::new(&git_path(&t));
        assert!(again.start(&head, &options).is_err());
        seq.quit().unwrap();
        assert!(!seq.in_progress());
    }

    #[test]
    fn dump_and_load_round_the_todo_list() {
        let mut t = TestRepo::new();
        let a = t.commit_file("f.txt", "1\n", "first change");
        let b = t.commit_file("f.txt", "2\n", "second change");
        let db = t.repo.database();

        let mut seq = Sequencer::new(&git_path(&t));
        seq.start(&b, &SequenceOptions::default()).unwrap();
        seq.pick(a, db.load_commit(&a).unwrap());
        seq.revert(b, db.load_commit(&b).unwrap());
        seq.dump(db).unwrap();

        let todo = fs::read_to_string(git_path(&t).join("sequencer/todo")).unwrap();
        assert_eq!(
            todo,
            format!(
                "pick {} first change\nrevert {} second change\n",
                a.short_hex(),
                b.short_hex()
            )
        );

        let mut loaded = Sequencer::new(&git_path(&t));
        loaded.load(db).unwrap();
        let actions: Vec<(Action, ObjectId)> =
            loaded.commands().iter().map(|c| (c.action, c.oid)).collect();
        assert_eq!(actions, vec![(Action::Pick, a), (Action::Revert, b)]);
        loaded.quit().unwrap();
    }

    #[test]
    fn abort_refuses_when_head_moved() {
        let mut t = TestRepo::new();
        let a = t.commit_file("f.txt", "1\n", "one");
        let b = t.commit_file("f.txt", "2\n", "two");

        let mut seq = Sequencer::new(&git_path(&t));
        seq.start(&a, &SequenceOptions::default()).unwrap();
        seq.drop_command(&a).unwrap();
        let err = seq.abort(Some(&b)).unwrap_err();
        assert_eq!(err.to_string(), UNSAFE_MESSAGE);
        assert!(!seq.in_progress());

        let mut seq = Sequencer::new(&git_path(&t));
        seq.start(&a, &SequenceOptions::default()).unwrap();
        seq.drop_command(&b).unwrap();
        assert_eq!(seq.abort(Some(&b)).unwrap(), a);
    }
}
