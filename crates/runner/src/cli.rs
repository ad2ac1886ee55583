//! Command-line interface for the batch runner.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// stencil - batch driver for ComfyUI workflows
#[derive(Debug, Parser)]
#[command(name = "stencil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every batch mode.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Path to the workflow document (JSON)
    #[arg(long)]
    pub workflow: PathBuf,

    /// Filename prefix for outputs saved server-side
    #[arg(long)]
    pub output_prefix: String,

    /// Override the sampler step count
    #[arg(long)]
    pub steps: Option<u32>,

    /// Fixed sampler seed (default: fresh random seed per job)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Download each job's artifacts into this directory
    #[arg(long)]
    pub download: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one prompt across every frame in a directory
    Frames {
        #[command(flatten)]
        common: CommonArgs,

        /// Directory of numbered source frames
        #[arg(long)]
        source_dir: PathBuf,

        /// Positive prompt applied to every frame
        #[arg(long, default_value = "")]
        prompt: String,

        /// Negative prompt applied to every frame
        #[arg(long, default_value = "")]
        negative_prompt: String,

        /// Resume: skip frames already present in this directory
        #[arg(long, requires = "reference_prefix")]
        reference_dir: Option<PathBuf>,

        /// Filename prefix of the already-produced frames
        #[arg(long, requires = "reference_dir")]
        reference_prefix: Option<String>,

        /// Skip this many source frames (overrides the reference scan)
        #[arg(long)]
        start_index: Option<usize>,
    },

    /// Run many prompts against a single source image
    Prompts {
        #[command(flatten)]
        common: CommonArgs,

        /// Source image submitted with every prompt
        #[arg(long)]
        image: PathBuf,

        /// File with one prompt per line
        #[arg(long, conflicts_with = "llm_query")]
        prompts_file: Option<PathBuf>,

        /// Generate the prompt by asking the configured LLM about the image
        #[arg(long)]
        llm_query: Option<String>,

        /// Negative prompt applied to every job
        #[arg(long, default_value = "")]
        negative_prompt: String,
    },

    /// Run every prompt against every image (cartesian product)
    Matrix {
        #[command(flatten)]
        common: CommonArgs,

        /// Directory of source images
        #[arg(long)]
        source_dir: PathBuf,

        /// File with one prompt per line
        #[arg(long)]
        prompts_file: PathBuf,

        /// Negative prompt applied to every job
        #[arg(long, default_value = "")]
        negative_prompt: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "stencil",
            "frames",
            "--workflow",
            "wf.json",
            "--output-prefix",
            "run",
            "--source-dir",
            "./frames",
            "--prompt",
            "a castle",
        ])
        .unwrap();

        match cli.command {
            Commands::Frames { common, prompt, .. } => {
                assert_eq!(common.output_prefix, "run");
                assert_eq!(prompt, "a castle");
                assert!(common.seed.is_none());
            }
            other => panic!("expected Frames, got {other:?}"),
        }
    }

    #[test]
    fn reference_dir_requires_prefix() {
        let result = Cli::try_parse_from([
            "stencil",
            "frames",
            "--workflow",
            "wf.json",
            "--output-prefix",
            "run",
            "--source-dir",
            "./frames",
            "--reference-dir",
            "./done",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn prompts_file_conflicts_with_llm_query() {
        let result = Cli::try_parse_from([
            "stencil",
            "prompts",
            "--workflow",
            "wf.json",
            "--output-prefix",
            "run",
            "--image",
            "in.png",
            "--prompts-file",
            "p.txt",
            "--llm-query",
            "describe this",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn matrix_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "stencil",
            "matrix",
            "--workflow",
            "wf.json",
            "--output-prefix",
            "grid",
            "--source-dir",
            "./imgs",
            "--prompts-file",
            "p.txt",
            "--steps",
            "30",
        ])
        .unwrap();

        match cli.command {
            Commands::Matrix { common, .. } => assert_eq!(common.steps, Some(30)),
            other => panic!("expected Matrix, got {other:?}"),
        }
    }
}
