use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Merge two banks' tabular exports by a mapping specification", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full merge and write the merged tables plus the merge report
    Merge(MergeArgs),
    /// Show the output plans the merge would execute (declared or built-in)
    Plans(PlansArgs),
    /// List the field mappings of a specification
    Mappings(MappingsArgs),
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Mapping specification (JSON, or YAML with a .yaml/.yml extension)
    #[arg(short, long)]
    pub mapping: PathBuf,
    /// Directory holding the source bank's files
    #[arg(short = 's', long = "source-dir")]
    pub source_dir: PathBuf,
    /// Directory holding the target bank's files
    #[arg(short = 't', long = "target-dir")]
    pub target_dir: PathBuf,
    /// Directory receiving the merged tables and the report (created if missing)
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    /// Character encoding of the written tables (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Give up waiting after this many seconds; files already written are kept
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub struct PlansArgs {
    /// Mapping specification to inspect
    #[arg(short, long)]
    pub mapping: PathBuf,
}

#[derive(Debug, Args)]
pub struct MappingsArgs {
    /// Mapping specification to inspect
    #[arg(short, long)]
    pub mapping: PathBuf,
    /// Only list mappings whose target is this table
    #[arg(long)]
    pub table: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_arguments_parse() {
        let cli = Cli::try_parse_from([
            "bank-merge", "merge", "-m", "map.json", "-s", "a", "-t", "b", "-o", "out",
            "--timeout-secs", "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.mapping, PathBuf::from("map.json"));
                assert_eq!(args.timeout_secs, Some(30));
                assert!(args.output_encoding.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
