use std::collections::BTreeMap;
use std::env;
use std::path::{Component, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use colored::Colorize;
use knot_diff::{combined_changes, combined_hunks, diff_hunks, DiffRow, EditKind, Hunk, TreeChanges};
use knot_index::mode_for_stat;
use knot_repo::{
    Action, MergeOutcome, RepoError, Repository, RevListItem, RevListOptions,
    SequenceOptions, SequenceOutcome, Status,
};
use knot_store::{Blob, Commit, Entry, EntryMode, Object};
use knot_types::ObjectId;
use knot_workspace::{ChangeType, Workspace};

use crate::cli::*;

const CONFLICT_EXIT: u8 = 1;

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Init(args) => cmd_init(args),
        Command::Add(args) => cmd_add(args),
        Command::Rm(args) => cmd_rm(args),
        Command::Commit(args) => cmd_commit(args),
        Command::Status(args) => cmd_status(args),
        Command::Diff(args) => cmd_diff(args),
        Command::Log(args) => cmd_log(args),
        Command::RevList(args) => cmd_rev_list(args),
        Command::Branch(args) => cmd_branch(args),
        Command::Checkout(args) => cmd_checkout(args),
        Command::Merge(args) => cmd_merge(args),
        Command::CherryPick(args) => cmd_sequence(args, Action::Pick),
        Command::Revert(args) => cmd_sequence(args, Action::Revert),
        Command::Reset(args) => cmd_reset(args),
        Command::CatFile(args) => cmd_cat_file(args),
    }
}

fn open_repo() -> anyhow::Result<Repository> {
    let cwd = env::current_dir().context("cannot read the current directory")?;
    Ok(Repository::open(cwd)?)
}

/// Turn a command-line path into a repository-relative one.
fn repo_path(repo: &Repository, arg: &str) -> anyhow::Result<String> {
    let full = env::current_dir()?.join(arg);
    let mut normal = PathBuf::new();
    for component in full.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }
    let Ok(relative) = normal.strip_prefix(repo.root()) else {
        bail!("'{arg}' is outside repository at '{}'", repo.root().display());
    };
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(if parts.is_empty() { ".".into() } else { parts.join("/") })
}

fn repo_paths(repo: &Repository, args: &[String]) -> anyhow::Result<Vec<String>> {
    args.iter().map(|arg| repo_path(repo, arg)).collect()
}

fn current_branch(repo: &Repository) -> anyhow::Result<Option<String>> {
    let current = repo.refs().current_ref()?;
    Ok((!current.is_head()).then(|| repo.refs().short_name(&current.path)))
}

fn summary(repo: &Repository, oid: &ObjectId) -> anyhow::Result<String> {
    let commit = repo.database().load_commit(oid)?;
    Ok(format!("{} {}", repo.database().short_oid(oid), commit.title_line()))
}

fn print_commit_line(repo: &Repository, oid: &ObjectId) -> anyhow::Result<()> {
    let commit = repo.database().load_commit(oid)?;
    let branch = current_branch(repo)?.unwrap_or_else(|| "detached HEAD".into());
    let root = if commit.parents.is_empty() { " (root-commit)" } else { "" };
    println!(
        "[{branch}{root} {}] {}",
        repo.database().short_oid(oid),
        commit.title_line()
    );
    Ok(())
}

// ---- Setup and staging ----

fn cmd_init(args: InitArgs) -> anyhow::Result<ExitCode> {
    let cwd = env::current_dir()?;
    let root = match args.path {
        Some(path) => cwd.join(path),
        None => cwd,
    };
    let repo = Repository::init(&root)?;
    println!(
        "Initialized empty knot repository in {}",
        repo.git_path().display()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_add(args: AddArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let paths = repo_paths(&repo, &args.paths)?;
    repo.add(paths.as_slice())?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_rm(args: RmArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let paths = repo_paths(&repo, &args.paths)?;
    repo.remove(paths.as_slice())?;
    for path in &paths {
        println!("rm '{path}'");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_commit(args: CommitArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let pending = repo.pending_commit();
    let message = match args.message {
        Some(message) => message,
        None if pending.in_progress() => pending.merge_message()?,
        None => bail!("a commit message is required: use -m <message>"),
    };
    let oid = repo.commit(&message)?;
    print_commit_line(&repo, &oid)?;
    Ok(ExitCode::SUCCESS)
}

// ---- Status ----

fn cmd_status(args: StatusArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let status = repo.status()?;
    if args.porcelain {
        print_porcelain(&status);
    } else {
        print_long_status(&repo, &status)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn short_code(change: Option<&ChangeType>) -> char {
    match change {
        Some(ChangeType::Added) => 'A',
        Some(ChangeType::Deleted) => 'D',
        Some(ChangeType::Modified) => 'M',
        Some(ChangeType::Untracked) => '?',
        None => ' ',
    }
}

fn conflict_code(stages: &[u8]) -> &'static str {
    match stages {
        [1, 2, 3] => "UU",
        [1, 2] => "UD",
        [1, 3] => "DU",
        [2, 3] => "AA",
        [2] => "AU",
        [3] => "UA",
        _ => "UU",
    }
}

fn conflict_label(stages: &[u8]) -> &'static str {
    match stages {
        [1, 2, 3] => "both modified:",
        [1, 2] => "deleted by them:",
        [1, 3] => "deleted by us:",
        [2, 3] => "both added:",
        [2] => "added by us:",
        [3] => "added by them:",
        _ => "unmerged:",
    }
}

fn long_label(change: &ChangeType) -> &'static str {
    match change {
        ChangeType::Added => "new file:",
        ChangeType::Deleted => "deleted:",
        ChangeType::Modified => "modified:",
        ChangeType::Untracked => "untracked:",
    }
}

fn print_porcelain(status: &Status) {
    for path in &status.changed {
        match status.conflicts.get(path) {
            Some(stages) => println!("{} {path}", conflict_code(stages)),
            None => println!(
                "{}{} {path}",
                short_code(status.index_changes.get(path)),
                short_code(status.workspace_changes.get(path))
            ),
        }
    }
    for path in &status.untracked {
        println!("?? {path}");
    }
}

fn print_long_status(repo: &Repository, status: &Status) -> anyhow::Result<()> {
    match current_branch(repo)? {
        Some(branch) => println!("On branch {}", branch.bold()),
        None => println!("{}", "Not currently on any branch.".red()),
    }

    let mut printed = false;
    let mut section = |title: &str, rows: Vec<(String, &str)>, staged: bool| {
        if rows.is_empty() {
            return;
        }
        printed = true;
        println!("\n{title}\n");
        for (label, path) in rows {
            let line = format!("\t{label:<16}{path}");
            println!("{}", if staged { line.green() } else { line.red() });
        }
    };

    section(
        "Changes to be committed:",
        status
            .index_changes
            .iter()
            .map(|(path, change)| (long_label(change).to_string(), path.as_str()))
            .collect(),
        true,
    );
    section(
        "Unmerged paths:",
        status
            .conflicts
            .iter()
            .map(|(path, stages)| (conflict_label(stages).to_string(), path.as_str()))
            .collect(),
        false,
    );
    section(
        "Changes not staged for commit:",
        status
            .workspace_changes
            .iter()
            .map(|(path, change)| (long_label(change).to_string(), path.as_str()))
            .collect(),
        false,
    );
    section(
        "Untracked files:",
        status
            .untracked
            .iter()
            .map(|path| (String::new(), path.as_str()))
            .collect(),
        false,
    );

    if !printed {
        println!("nothing to commit, working tree clean");
    } else if status.index_changes.is_empty() {
        println!("\nno changes added to commit");
    }
    Ok(())
}

// ---- Diffs ----

/// One side of a file diff.
struct Target {
    path: String,
    oid: ObjectId,
    mode: Option<EntryMode>,
    data: String,
}

impl Target {
    fn from_entry(repo: &Repository, path: &str, entry: Option<&Entry>) -> anyhow::Result<Self> {
        let Some(entry) = entry else {
            return Ok(Self::null(path));
        };
        let blob = repo.database().load_blob(&entry.object_id)?;
        Ok(Self {
            path: path.to_string(),
            oid: entry.object_id,
            mode: Some(entry.mode),
            data: blob.text(),
        })
    }

    fn from_file(repo: &Repository, path: &str) -> anyhow::Result<Self> {
        let Some(stat) = repo.workspace().stat_file(path)? else {
            return Ok(Self::null(path));
        };
        let blob = Blob::new(repo.workspace().read_file(path)?);
        Ok(Self {
            path: path.to_string(),
            oid: repo.database().hash_object(&blob.clone().into()),
            mode: EntryMode::from_mode_bits(mode_for_stat(&stat)),
            data: blob.text(),
        })
    }

    fn null(path: &str) -> Self {
        Self {
            path: path.to_string(),
            oid: ObjectId::from_bytes(&[]),
            mode: None,
            data: String::new(),
        }
    }

    fn diff_path(&self, prefix: &str) -> String {
        match self.mode {
            Some(_) => format!("{prefix}/{}", self.path),
            None => "/dev/null".into(),
        }
    }
}

fn print_file_diff(repo: &Repository, a: &Target, b: &Target) {
    if a.oid == b.oid && a.mode == b.mode {
        return;
    }
    let short = |t: &Target| match t.mode {
        Some(_) => repo.database().short_oid(&t.oid),
        None => "0000000".into(),
    };
    let bits = |mode: EntryMode| format!("{:o}", mode.mode_bits());

    println!("{}", format!("diff --git a/{} b/{}", a.path, b.path).bold());
    match (a.mode, b.mode) {
        (None, Some(mode)) => println!("{}", format!("new file mode {}", bits(mode)).bold()),
        (Some(mode), None) => println!("{}", format!("deleted file mode {}", bits(mode)).bold()),
        (Some(old), Some(new)) if old != new => {
            println!("{}", format!("old mode {}", bits(old)).bold());
            println!("{}", format!("new mode {}", bits(new)).bold());
        }
        _ => {}
    }
    if a.oid == b.oid {
        return;
    }
    let mode_suffix = match (a.mode, b.mode) {
        (Some(old), Some(new)) if old == new => format!(" {}", bits(old)),
        _ => String::new(),
    };
    println!(
        "{}",
        format!("index {}..{}{mode_suffix}", short(a), short(b)).bold()
    );
    println!("{}", format!("--- {}", a.diff_path("a")).bold());
    println!("{}", format!("+++ {}", b.diff_path("b")).bold());

    for hunk in diff_hunks(&a.data, &b.data) {
        print_hunk(&hunk);
    }
}

fn print_hunk<E: DiffRow + std::fmt::Display>(hunk: &Hunk<E>) {
    println!("{}", hunk.header().cyan());
    for edit in &hunk.edits {
        let text = edit.to_string();
        match edit.kind() {
            EditKind::Ins => println!("{}", text.green()),
            EditKind::Del => println!("{}", text.red()),
            EditKind::Eql => println!("{text}"),
        }
    }
}

fn print_tree_changes(repo: &Repository, changes: &TreeChanges) -> anyhow::Result<()> {
    for (path, (old, new)) in changes {
        let a = Target::from_entry(repo, path, old.as_ref())?;
        let b = Target::from_entry(repo, path, new.as_ref())?;
        print_file_diff(repo, &a, &b);
    }
    Ok(())
}

fn cmd_diff(args: DiffArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    match args.revisions.as_slice() {
        [a, b] => {
            let changes = repo.diff_commits(a, b)?;
            print_tree_changes(&repo, &changes)?;
        }
        [_] => bail!("give two revisions, or none to diff the working tree"),
        _ => {
            let status = repo.status()?;
            if args.cached {
                diff_head_index(&repo, &status)?;
            } else {
                diff_index_workspace(&repo, &status)?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn index_target(repo: &Repository, path: &str) -> anyhow::Result<Target> {
    let entry = repo
        .index()
        .entry_for_path(path, 0)
        .map(|e| e.to_tree_entry());
    Target::from_entry(repo, path, entry.as_ref())
}

fn diff_head_index(repo: &Repository, status: &Status) -> anyhow::Result<()> {
    for path in status.index_changes.keys() {
        let a = Target::from_entry(repo, path, status.head_tree.get(path))?;
        let b = index_target(repo, path)?;
        print_file_diff(repo, &a, &b);
    }
    Ok(())
}

fn diff_index_workspace(repo: &Repository, status: &Status) -> anyhow::Result<()> {
    for path in status.workspace_changes.keys() {
        let a = index_target(repo, path)?;
        let b = Target::from_file(repo, path)?;
        print_file_diff(repo, &a, &b);
    }
    Ok(())
}

/// Combined diff of a merge commit against all of its parents.
fn print_combined_diff(repo: &Repository, oid: &ObjectId, commit: &Commit) -> anyhow::Result<()> {
    let db = repo.database();
    let diffs = commit
        .parents
        .iter()
        .map(|parent| knot_diff::tree_diff::<&str>(db, Some(parent), Some(oid), &[]))
        .collect::<Result<Vec<_>, _>>()?;

    for (path, change) in combined_changes(&diffs) {
        let parents = change
            .parents
            .iter()
            .map(|entry| Target::from_entry(repo, &path, entry.as_ref()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let child = Target::from_entry(repo, &path, change.child.as_ref())?;

        println!("{}", format!("diff --cc {path}").bold());
        let shorts: Vec<String> = parents
            .iter()
            .map(|t| match t.mode {
                Some(_) => db.short_oid(&t.oid),
                None => "0000000".into(),
            })
            .collect();
        println!(
            "{}",
            format!("index {}..{}", shorts.join(","), db.short_oid(&child.oid)).bold()
        );
        println!("{}", format!("--- a/{path}").bold());
        println!("{}", format!("+++ {}", child.diff_path("b")).bold());

        let texts: Vec<&str> = parents.iter().map(|t| t.data.as_str()).collect();
        for hunk in combined_hunks(texts.as_slice(), &child.data) {
            print_hunk(&hunk);
        }
    }
    Ok(())
}

// ---- History ----

fn cmd_log(args: LogArgs) -> anyhow::Result<ExitCode> {
    let repo = open_repo()?;
    let mut commits = repo
        .rev_list(args.revisions.as_slice(), RevListOptions::default())?
        .commits()?;
    if let Some(max) = args.max_count {
        commits.truncate(max);
    }
    let decorations = repo.refs().reverse_refs()?;
    let head_ref = repo.refs().current_ref()?;

    for (i, (oid, commit)) in commits.iter().enumerate() {
        let names: Vec<String> = decorations
            .get(oid)
            .into_iter()
            .flatten()
            .filter(|r| !r.is_head())
            .map(|r| {
                let name = repo.refs().short_name(&r.path);
                if *r == head_ref {
                    format!("{} -> {}", "HEAD".cyan().bold(), name.green().bold())
                } else {
                    name.green().bold().to_string()
                }
            })
            .collect();
        let decoration = if names.is_empty() {
            String::new()
        } else {
            format!(" ({})", names.join(", "))
        };

        if args.oneline {
            let short = repo.database().short_oid(oid);
            println!("{}{decoration} {}", short.yellow(), commit.title_line());
        } else {
            if i > 0 {
                println!();
            }
            println!("{}{decoration}", format!("commit {oid}").yellow());
            if commit.is_merge() {
                let shorts: Vec<String> = commit
                    .parents
                    .iter()
                    .map(|p| repo.database().short_oid(p))
                    .collect();
                println!("Merge: {}", shorts.join(" "));
            }
            println!("Author: {} <{}>", commit.author.name, commit.author.email);
            println!("Date:   {}", commit.author.readable_time());
            println!();
            for line in commit.message.lines() {
                println!("    {line}");
            }
        }

        if args.patch {
            if !args.oneline {
                println!();
            }
            if commit.is_merge() {
                print_combined_diff(&repo, oid, commit)?;
            } else {
                let changes = knot_diff::tree_diff::<&str>(
                    repo.database(),
                    commit.parent(),
                    Some(oid),
                    &[],
                )?;
                print_tree_changes(&repo, &changes)?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_rev_list(args: RevListArgs) -> anyhow::Result<ExitCode> {
    let repo = open_repo()?;
    let options = RevListOptions {
        objects: args.objects,
        walk: !args.no_walk,
        missing: args.missing,
    };
    repo.rev_list(args.revisions.as_slice(), options)?.each(|item| match item {
        RevListItem::Commit { oid, .. } => println!("{oid}"),
        RevListItem::Object { path, entry } => {
            println!("{} {path}", entry.object_id);
        }
    })?;
    Ok(ExitCode::SUCCESS)
}

// ---- Branches ----

fn cmd_branch(args: BranchArgs) -> anyhow::Result<ExitCode> {
    let repo = open_repo()?;
    match args.name {
        Some(name) if args.delete => {
            let oid = repo.delete_branch(&name)?;
            println!(
                "Deleted branch {name} (was {}).",
                repo.database().short_oid(&oid)
            );
        }
        Some(name) => {
            repo.create_branch(&name, args.start.as_deref())?;
        }
        None => list_branches(&repo, args.verbose)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn list_branches(repo: &Repository, verbose: bool) -> anyhow::Result<()> {
    let current = repo.refs().current_ref()?;
    let branches = repo.list_branches()?;
    let width = branches
        .iter()
        .map(|b| repo.refs().short_name(&b.path).len())
        .max()
        .unwrap_or(0);

    for branch in &branches {
        let name = repo.refs().short_name(&branch.path);
        let mut line = if *branch == current {
            format!("* {}", format!("{name:<width$}").green())
        } else {
            format!("  {name:<width$}")
        };
        if verbose {
            if let Some(oid) = repo.refs().read_oid(branch)? {
                line.push_str(&format!(" {}", summary(repo, &oid)?));
            }
        }
        println!("{}", line.trim_end());
    }
    Ok(())
}

fn cmd_checkout(args: CheckoutArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let was_detached = current_branch(&repo)?.is_none();
    let previous = repo.refs().read_head()?;

    let target = repo.checkout(&args.revision)?;
    match current_branch(&repo)? {
        Some(branch) => eprintln!("Switched to branch '{branch}'"),
        None => {
            if was_detached {
                if let Some(previous) = previous.filter(|p| *p != target) {
                    eprintln!("Previous HEAD position was {}", summary(&repo, &previous)?);
                }
            } else {
                eprintln!("Note: checking out '{}'.", args.revision);
                eprintln!();
                eprintln!("You are in 'detached HEAD' state.");
                eprintln!();
            }
            eprintln!("HEAD is now at {}", summary(&repo, &target)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_reset(args: ResetArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let oid = repo.reset(&args.revision)?;
    println!("HEAD is now at {}", summary(&repo, &oid)?);
    Ok(ExitCode::SUCCESS)
}

// ---- Merging and sequencing ----

fn cmd_merge(args: MergeArgs) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    if args.abort {
        repo.abort_merge()?;
        return Ok(ExitCode::SUCCESS);
    }
    if args.resume {
        let oid = repo.commit_pending_merge()?;
        print_commit_line(&repo, &oid)?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(revision) = args.revision else {
        bail!("nothing to merge: give a revision");
    };

    match repo.merge(&revision, args.message.as_deref())? {
        MergeOutcome::AlreadyUpToDate => println!("Already up to date."),
        MergeOutcome::FastForward { from, to } => {
            let db = repo.database();
            println!("Updating {}..{}", db.short_oid(&from), db.short_oid(&to));
            println!("Fast-forward");
        }
        MergeOutcome::Merged { messages, .. } => {
            print_messages(&messages);
            println!("Merge made by the 'recursive' strategy.");
        }
        MergeOutcome::Conflicted { messages, .. } => {
            print_messages(&messages);
            println!("Automatic merge failed; fix conflicts and then commit the result.");
            return Ok(ExitCode::from(CONFLICT_EXIT));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_messages(messages: &[String]) {
    for message in messages {
        if message.starts_with("CONFLICT") {
            println!("{}", message.red());
        } else {
            println!("{message}");
        }
    }
}

fn cmd_sequence(args: SequenceArgs, action: Action) -> anyhow::Result<ExitCode> {
    let mut repo = open_repo()?;
    let outcome = if args.resume {
        repo.continue_sequence()?
    } else if args.abort {
        return match repo.abort_sequence() {
            Ok(_) => Ok(ExitCode::SUCCESS),
            Err(RepoError::UnsafeAbort(message)) => {
                eprintln!("{} {message}", "warning:".yellow());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => Err(e.into()),
        };
    } else if args.quit {
        repo.quit_sequence()?;
        return Ok(ExitCode::SUCCESS);
    } else {
        if args.revisions.is_empty() {
            bail!("no commits given");
        }
        let options = SequenceOptions {
            mainline: args.mainline,
        };
        match action {
            Action::Pick => repo.cherry_pick(args.revisions.as_slice(), options)?,
            Action::Revert => repo.revert(args.revisions.as_slice(), options)?,
        }
    };

    match outcome {
        SequenceOutcome::Completed(oids) => {
            for oid in &oids {
                print_commit_line(&repo, oid)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        SequenceOutcome::Conflicted {
            action,
            oid,
            title,
            messages,
            ..
        } => {
            print_messages(&messages);
            let (verb, command) = match action {
                Action::Pick => ("apply", "cherry-pick"),
                Action::Revert => ("revert", "revert"),
            };
            let short = repo.database().short_oid(&oid);
            eprintln!("{} could not {verb} {short}... {title}", "error:".red());
            eprintln!("hint: after resolving the conflicts, mark the corrected paths");
            eprintln!("hint: with 'knot add <paths>' and run 'knot {command} --continue'");
            Ok(ExitCode::from(CONFLICT_EXIT))
        }
    }
}

// ---- Objects ----

fn cmd_cat_file(args: CatFileArgs) -> anyhow::Result<ExitCode> {
    let repo = open_repo()?;
    let oid = repo.resolve(&args.object, None)?;
    let object = repo.database().load(&oid)?;
    if args.kind {
        println!("{}", object.kind());
        return Ok(ExitCode::SUCCESS);
    }
    match object {
        Object::Blob(blob) => print!("{}", blob.text()),
        Object::Tree(tree) => {
            let mut rows = BTreeMap::new();
            for entry in &tree.entries {
                let kind = if entry.mode.is_tree() { "tree" } else { "blob" };
                rows.insert(
                    entry.name.clone(),
                    format!("{:06o} {kind} {}\t{}", entry.mode.mode_bits(), entry.object_id, entry.name),
                );
            }
            for row in rows.values() {
                println!("{row}");
            }
        }
        Object::Commit(commit) => print!("{}", String::from_utf8_lossy(&commit.to_bytes())),
    }
    Ok(ExitCode::SUCCESS)
}

/// Print a failure the way the engine reports it: hinted errors first,
/// then the fatal message.
pub fn report_error(err: &anyhow::Error) {
    tracing::debug!(error = ?err, "command failed");
    if let Some(RepoError::InvalidObject { message, errors }) = err.downcast_ref::<RepoError>() {
        for error in errors {
            eprint!("{error}");
        }
        eprintln!("{} {message}", "fatal:".red());
        return;
    }
    eprintln!("{} {err:#}", "fatal:".red());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcelain_codes_for_conflict_stages() {
        assert_eq!(conflict_code(&[1, 2, 3]), "UU");
        assert_eq!(conflict_code(&[2, 3]), "AA");
        assert_eq!(conflict_code(&[1, 3]), "DU");
        assert_eq!(conflict_label(&[1, 2]), "deleted by them:");
        assert_eq!(short_code(Some(&ChangeType::Modified)), 'M');
        assert_eq!(short_code(None), ' ');
    }

    #[test]
    fn null_target_prints_dev_null() {
        let target = Target::null("a.txt");
        assert_eq!(target.diff_path("a"), "/dev/null");
        let named = Target {
            mode: Some(EntryMode::Regular),
            ..Target::null("a.txt")
        };
        assert_eq!(named.diff_path("b"), "b/a.txt");
    }

    #[test]
    fn paths_resolve_relative_to_the_repository_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let inside = repo.root().join("src/lib.rs");
        assert_eq!(repo_path(&repo, inside.to_str().unwrap()).unwrap(), "src/lib.rs");
        let root = repo.root().join("src/..");
        assert_eq!(repo_path(&repo, root.to_str().unwrap()).unwrap(), ".");
        assert!(repo_path(&repo, "/elsewhere/file").is_err());
    }
}
