use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keel",
    about = "Inspect keel schemas and exercise their link graphs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a group from a schema file and print its tables
    Schema(SchemaArgs),
    /// Populate a schema, remove one object, and report what cascaded
    Cascade(CascadeArgs),
}

#[derive(Args)]
pub struct SchemaArgs {
    /// TOML schema file
    pub path: PathBuf,
}

#[derive(Args)]
pub struct CascadeArgs {
    /// TOML schema file
    pub path: PathBuf,
    /// Table to remove the first object from
    #[arg(short, long)]
    pub table: String,
    /// Objects to create in every table
    #[arg(short = 'n', long, default_value = "3")]
    pub objects: usize,
    /// Print the recorded change log
    #[arg(long)]
    pub log: bool,
}
