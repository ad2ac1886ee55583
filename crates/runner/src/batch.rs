//! Batch driver loops.
//!
//! Each mode expands to a list of [`BatchItem`]s run sequentially over
//! one [`JobChannel`]: stamp, submit, await, optionally download. One
//! job is in flight at a time. A failing item is logged and the batch
//! moves on; Ctrl-C stops submitting further jobs but the channel is
//! still closed cleanly on the way out.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use stencil_client::{JobChannel, OutputCollector};
use stencil_core::{stamp, RoleTable, StampParams, WorkflowGraph};
use stencil_media::frames;
use stencil_media::llm::PromptGenerator;

use crate::cli::{Commands, CommonArgs};
use crate::config::RunnerConfig;

/// One unit of batch work: a label for logging plus the parameters to
/// stamp into the shared workflow.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub label: String,
    pub params: StampParams,
}

/// Tally of a finished (or interrupted) batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

enum ItemOutcome {
    Done,
    Interrupted,
}

/// Entry point: expand the subcommand into items and drive them.
pub async fn run(
    config: &RunnerConfig,
    command: Commands,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (common, items) = expand(config, command).await?;

    let graph = WorkflowGraph::load(&common.workflow)
        .with_context(|| format!("loading workflow {}", common.workflow.display()))?;
    let table = RoleTable::default();

    tracing::info!(
        jobs = items.len(),
        workflow = %common.workflow.display(),
        "Starting batch",
    );

    let mut channel = JobChannel::new(config.server.clone());
    channel.connect().await?;

    // The channel must be released on every exit path, so the loop's
    // result is captured rather than returned early.
    let summary = drive(
        &mut channel,
        &graph,
        &table,
        &items,
        common.download.as_deref(),
        &cancel,
    )
    .await;
    channel.close().await;

    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        interrupted = summary.interrupted,
        "Batch finished",
    );

    if summary.failed > 0 {
        anyhow::bail!("{} of {} jobs failed", summary.failed, items.len());
    }
    Ok(())
}

/// Run every item sequentially, skipping the rest once interrupted.
async fn drive(
    channel: &mut JobChannel,
    graph: &WorkflowGraph,
    table: &RoleTable,
    items: &[BatchItem],
    download: Option<&Path>,
    cancel: &CancellationToken,
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for item in items {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        match run_item(channel, graph, table, item, download, cancel).await {
            Ok(ItemOutcome::Done) => summary.completed += 1,
            Ok(ItemOutcome::Interrupted) => {
                summary.interrupted = true;
                break;
            }
            Err(e) => {
                tracing::error!(item = %item.label, error = %e, "Job failed, continuing batch");
                summary.failed += 1;
            }
        }
    }

    if summary.interrupted {
        tracing::warn!(
            remaining = items.len() - summary.completed - summary.failed,
            "Batch interrupted",
        );
    }
    summary
}

async fn run_item(
    channel: &mut JobChannel,
    graph: &WorkflowGraph,
    table: &RoleTable,
    item: &BatchItem,
    download: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<ItemOutcome> {
    // No-op while connected; re-establishes the socket after a
    // mid-batch ConnectionLost.
    channel.connect().await?;

    let stamped = stamp(graph.clone(), &item.params, table)?;
    let job_id = channel.submit(&stamped).await?;
    tracing::info!(item = %item.label, job_id = %job_id, "Job submitted");

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!(job_id = %job_id, "Interrupt received, abandoning wait");
            return Ok(ItemOutcome::Interrupted);
        }
        result = channel.await_completion(&job_id) => result?,
    }

    if let Some(dir) = download {
        download_artifacts(channel, &job_id, dir).await?;
    }
    Ok(ItemOutcome::Done)
}

/// Save every artifact of `job_id` under `dir`, keeping server filenames.
async fn download_artifacts(
    channel: &JobChannel,
    job_id: &str,
    dir: &Path,
) -> anyhow::Result<()> {
    let collector = OutputCollector::new(channel.api());
    let refs = collector.artifact_refs(job_id).await?;
    std::fs::create_dir_all(dir)?;

    for (node_id, artifacts) in &refs {
        for artifact in artifacts {
            let bytes = channel.api().fetch_artifact(artifact).await?;
            let dest = dir.join(&artifact.filename);
            std::fs::write(&dest, bytes)
                .with_context(|| format!("writing {}", dest.display()))?;
            tracing::info!(node_id = %node_id, path = %dest.display(), "Saved artifact");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Item expansion
// ---------------------------------------------------------------------------

/// Expand a subcommand into its common args and the item list.
async fn expand(
    config: &RunnerConfig,
    command: Commands,
) -> anyhow::Result<(CommonArgs, Vec<BatchItem>)> {
    match command {
        Commands::Frames {
            common,
            source_dir,
            prompt,
            negative_prompt,
            reference_dir,
            reference_prefix,
            start_index,
        } => {
            let mut all = frames::list_frames(&source_dir)
                .with_context(|| format!("listing frames in {}", source_dir.display()))?;

            let done = match (&reference_dir, &reference_prefix) {
                (Some(dir), Some(prefix)) => frames::max_frame_number(dir, prefix)?,
                _ => 0,
            };
            let skip = resume_skip(start_index, done);
            if skip > 0 {
                tracing::info!(skip, total = all.len(), "Resuming batch");
            }
            all.drain(..skip.min(all.len()));

            let base = StampParams {
                positive_prompt: Some(prompt),
                negative_prompt: Some(negative_prompt),
                output_prefix: Some(common.output_prefix.clone()),
                steps: common.steps,
                seed: common.seed,
                ..Default::default()
            };
            Ok((common, frame_items(&all, &base)))
        }

        Commands::Prompts {
            common,
            image,
            prompts_file,
            llm_query,
            negative_prompt,
        } => {
            let prompts = match (prompts_file, llm_query) {
                (Some(path), None) => read_prompt_lines(&path)?,
                (None, Some(query)) => {
                    let generator =
                        PromptGenerator::new(config.ollama_url.clone(), config.ollama_model.clone());
                    let generated = generator.describe_image(&image, &query, None).await?;
                    tracing::info!(prompt = %generated, "Generated prompt");
                    vec![generated]
                }
                _ => anyhow::bail!("supply exactly one of --prompts-file or --llm-query"),
            };

            let base = StampParams {
                negative_prompt: Some(negative_prompt),
                output_prefix: Some(common.output_prefix.clone()),
                steps: common.steps,
                seed: common.seed,
                ..Default::default()
            };
            Ok((common, prompt_items(&image, &prompts, &base)))
        }

        Commands::Matrix {
            common,
            source_dir,
            prompts_file,
            negative_prompt,
        } => {
            let images = frames::list_frames(&source_dir)
                .with_context(|| format!("listing images in {}", source_dir.display()))?;
            let prompts = read_prompt_lines(&prompts_file)?;

            let base = StampParams {
                negative_prompt: Some(negative_prompt),
                output_prefix: Some(common.output_prefix.clone()),
                steps: common.steps,
                seed: common.seed,
                ..Default::default()
            };
            Ok((common, matrix_items(&images, &prompts, &base)))
        }
    }
}

/// How many source frames to skip: an explicit start index wins,
/// otherwise resume one frame before the last one already produced (it
/// may have been mid-flight when the previous run stopped).
pub fn resume_skip(start_index: Option<usize>, frames_done: u64) -> usize {
    match start_index {
        Some(n) => n,
        None => (frames_done as usize).saturating_sub(1),
    }
}

/// One item per frame, same prompt everywhere.
pub fn frame_items(frames: &[PathBuf], base: &StampParams) -> Vec<BatchItem> {
    frames
        .iter()
        .map(|path| BatchItem {
            label: path.display().to_string(),
            params: StampParams {
                source_image: Some(path.display().to_string()),
                ..base.clone()
            },
        })
        .collect()
}

/// One item per prompt, same source image everywhere.
pub fn prompt_items(image: &Path, prompts: &[String], base: &StampParams) -> Vec<BatchItem> {
    prompts
        .iter()
        .map(|prompt| BatchItem {
            label: prompt.clone(),
            params: StampParams {
                positive_prompt: Some(prompt.clone()),
                source_image: Some(image.display().to_string()),
                ..base.clone()
            },
        })
        .collect()
}

/// Cartesian product: every prompt against every image.
pub fn matrix_items(images: &[PathBuf], prompts: &[String], base: &StampParams) -> Vec<BatchItem> {
    let mut items = Vec::with_capacity(images.len() * prompts.len());
    for image in images {
        for prompt in prompts {
            items.push(BatchItem {
                label: format!("{} | {prompt}", image.display()),
                params: StampParams {
                    positive_prompt: Some(prompt.clone()),
                    source_image: Some(image.display().to_string()),
                    ..base.clone()
                },
            });
        }
    }
    items
}

/// Read a prompts file: one prompt per line, blanks skipped.
pub fn read_prompt_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading prompts from {}", path.display()))?;
    let prompts: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if prompts.is_empty() {
        anyhow::bail!("no prompts in {}", path.display());
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> StampParams {
        StampParams {
            output_prefix: Some("out".into()),
            steps: Some(20),
            ..Default::default()
        }
    }

    #[test]
    fn frame_items_carry_their_own_image() {
        let frames = vec![PathBuf::from("a/f_1.png"), PathBuf::from("a/f_2.png")];
        let items = frame_items(&frames, &base_params());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].params.source_image.as_deref(), Some("a/f_1.png"));
        assert_eq!(items[1].params.source_image.as_deref(), Some("a/f_2.png"));
        assert_eq!(items[0].params.output_prefix.as_deref(), Some("out"));
    }

    #[test]
    fn prompt_items_share_the_image() {
        let prompts = vec!["red".to_string(), "blue".to_string()];
        let items = prompt_items(Path::new("in.png"), &prompts, &base_params());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].params.positive_prompt.as_deref(), Some("red"));
        assert_eq!(items[1].params.positive_prompt.as_deref(), Some("blue"));
        assert!(items
            .iter()
            .all(|i| i.params.source_image.as_deref() == Some("in.png")));
    }

    #[test]
    fn matrix_items_are_the_full_product() {
        let images = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        let prompts = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let items = matrix_items(&images, &prompts, &base_params());
        assert_eq!(items.len(), 6);
    }

    #[test]
    fn explicit_start_index_wins_over_reference_scan() {
        assert_eq!(resume_skip(Some(5), 100), 5);
    }

    #[test]
    fn resume_skip_backs_up_one_frame() {
        assert_eq!(resume_skip(None, 10), 9);
    }

    #[test]
    fn resume_skip_with_nothing_done_starts_at_zero() {
        assert_eq!(resume_skip(None, 0), 0);
    }

    #[test]
    fn read_prompt_lines_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.txt");
        std::fs::write(&path, "first\n\n  second  \n\n").unwrap();

        let prompts = read_prompt_lines(&path).unwrap();
        assert_eq!(prompts, vec!["first", "second"]);
    }

    #[test]
    fn empty_prompts_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.txt");
        std::fs::write(&path, "\n  \n").unwrap();
        assert!(read_prompt_lines(&path).is_err());
    }
}
