use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "knot", about = "knot: a content-addressed version control engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log engine activity to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init(InitArgs),
    /// Add file contents to the index
    Add(AddArgs),
    /// Remove files from the working tree and the index
    Rm(RmArgs),
    /// Record the index as a new commit
    Commit(CommitArgs),
    /// Show the working tree status
    Status(StatusArgs),
    /// Show changes between commits, the index and the working tree
    Diff(DiffArgs),
    /// Show commit history
    Log(LogArgs),
    /// List commits (and optionally objects) reachable from revisions
    RevList(RevListArgs),
    /// List, create or delete branches
    Branch(BranchArgs),
    /// Switch branches or detach HEAD at a commit
    Checkout(CheckoutArgs),
    /// Join another history into the current branch
    Merge(MergeArgs),
    /// Apply the changes introduced by existing commits
    CherryPick(SequenceArgs),
    /// Commit the inverse of existing commits
    Revert(SequenceArgs),
    /// Reset the index and working tree to a commit
    Reset(ResetArgs),
    /// Print the content or type of a stored object
    CatFile(CatFileArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<String>,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct CommitArgs {
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Two-column machine-readable output
    #[arg(long)]
    pub porcelain: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Compare the index with HEAD instead of the working tree with the index
    #[arg(long)]
    pub cached: bool,
    /// Two revisions to compare
    #[arg(num_args = 0..=2)]
    pub revisions: Vec<String>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long)]
    pub max_count: Option<usize>,
    #[arg(long)]
    pub oneline: bool,
    /// Show the diff each commit introduces
    #[arg(short, long)]
    pub patch: bool,
    /// Revisions, ranges and paths
    pub revisions: Vec<String>,
}

#[derive(Args)]
pub struct RevListArgs {
    #[arg(long)]
    pub objects: bool,
    /// Do not walk parents, list only the named commits
    #[arg(long)]
    pub no_walk: bool,
    /// Ignore revisions that cannot be resolved
    #[arg(long)]
    pub missing: bool,
    pub revisions: Vec<String>,
}

#[derive(Args)]
pub struct BranchArgs {
    pub name: Option<String>,
    pub start: Option<String>,
    #[arg(short, long)]
    pub delete: bool,
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct CheckoutArgs {
    pub revision: String,
}

#[derive(Args)]
pub struct MergeArgs {
    pub revision: Option<String>,
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(long, conflicts_with = "revision")]
    pub abort: bool,
    #[arg(long = "continue", conflicts_with_all = ["revision", "abort"])]
    pub resume: bool,
}

#[derive(Args)]
pub struct SequenceArgs {
    pub revisions: Vec<String>,
    /// Parent number to diff merge commits against
    #[arg(short, long)]
    pub mainline: Option<usize>,
    #[arg(long = "continue", conflicts_with_all = ["abort", "quit"])]
    pub resume: bool,
    #[arg(long, conflicts_with = "quit")]
    pub abort: bool,
    #[arg(long)]
    pub quit: bool,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Commit to reset to
    #[arg(default_value = "@")]
    pub revision: String,
}

#[derive(Args)]
pub struct CatFileArgs {
    /// Print the object type instead of its content
    #[arg(short = 't')]
    pub kind: bool,
    pub object: String,
}
