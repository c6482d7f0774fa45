use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cask",
    about = "Cask: content-addressed OCI image store and transfer engine",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the storage root from the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect and manage blobs in the content store
    Content(ContentArgs),
    /// Inspect and manage the image index
    Images(ImagesArgs),
    /// Pull an image and all of its blobs from a registry
    Pull(PullArgs),
    /// Push a local image to a registry
    Push(PushArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct ContentArgs {
    #[command(subcommand)]
    pub action: ContentAction,
}

#[derive(Subcommand)]
pub enum ContentAction {
    /// List committed blobs
    Ls,
    /// List in-flight ingests
    Active,
    /// Write a blob to stdout
    Get { digest: String },
    /// Ingest a file (or stdin) under an ingest ref
    Ingest(IngestArgs),
    /// Delete committed blobs
    Rm { digests: Vec<String> },
    /// Discard an in-flight ingest
    Abort { reference: String },
}

#[derive(Args)]
pub struct IngestArgs {
    /// Ingest ref; reusing it resumes an interrupted ingest
    pub reference: String,
    /// File to read; stdin when omitted
    pub path: Option<PathBuf>,
    #[arg(long)]
    pub expected_size: Option<u64>,
    #[arg(long)]
    pub expected_digest: Option<String>,
}

#[derive(Args)]
pub struct ImagesArgs {
    #[command(subcommand)]
    pub action: ImagesAction,
}

#[derive(Subcommand)]
pub enum ImagesAction {
    /// List images
    Ls,
    /// Remove image names (blobs are kept)
    Rm { names: Vec<String> },
    /// Total stored size of an image
    Size { name: String },
    /// Diff-IDs of an image
    Rootfs { name: String },
    /// Layers paired with their diff-IDs
    Layers { name: String },
    /// Report blobs of an image missing from the content store
    Check { name: String },
}

#[derive(Args)]
pub struct PullArgs {
    pub reference: String,
    /// Registry directory, overriding the configured one
    #[arg(long)]
    pub registry: Option<PathBuf>,
}

#[derive(Args)]
pub struct PushArgs {
    /// Reference to push to
    pub reference: String,
    /// Local image to push; defaults to the reference
    #[arg(long)]
    pub image: Option<String>,
    /// Registry directory, overriding the configured one
    #[arg(long)]
    pub registry: Option<PathBuf>,
}
