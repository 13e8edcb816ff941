// SPDX-License-Identifier: AGPL-3.0-only

//! `posehead`: host control program for the pose-head overlay.
//!
//! ```text
//! USAGE:
//!   posehead run <data-dir>                         Load artifacts, run one pass, save results
//!   posehead heads                                  Print head configurations
//!   posehead pack-head <head> --weights --bias      Build <head>_fc_q15.bin from text streams
//!   posehead pack-input --input                     Build posehead_input_q15.bin from a text stream
//!   posehead compare --actual --golden              Compare an output stream against golden
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use posehead_chip::heads::FEATURE_CHANNELS;
use posehead_chip::word::words_for;
use posehead_chip::{HeadId, WORD_BYTES};
use posehead_driver::{PassConfig, PoseHeadGraph};
use posehead_models::loading::{decode_q15, read_blob};
use posehead_models::{compare_q15, pack_input, read_q15_text, FcWeights, ModelArtifacts};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "posehead", about = "Pose-head overlay host control program", version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins if set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load artifacts from a data directory, run one pass and save `<head>_out_hw.txt`.
    Run {
        /// Directory holding posehead_input_q15.bin and <head>_fc_q15.bin.
        data_dir: PathBuf,
        /// Where to write results (defaults to the data directory).
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Pass deadline in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Channel depth in 128-bit words.
        #[arg(long, default_value_t = 1000)]
        depth: usize,
    },
    /// Print the head configuration table and buffer sizes.
    Heads,
    /// Pack weight and bias text streams into a head's FC blob.
    PackHead {
        /// Head name (pose3d, world, flag).
        head: HeadId,
        /// Weight stream (out × in integers, row-major).
        #[arg(long)]
        weights: PathBuf,
        /// Bias stream (out integers).
        #[arg(long)]
        bias: PathBuf,
        /// Output directory.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Convert the backbone feature text stream into the shared input blob.
    PackInput {
        /// Feature stream (whitespace-separated integers).
        #[arg(long)]
        input: PathBuf,
        /// Output directory.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Compare an output stream against a golden Q15 stream (.txt or .bin).
    Compare {
        /// Stream under test.
        #[arg(long)]
        actual: PathBuf,
        /// Golden reference.
        #[arg(long)]
        golden: PathBuf,
        /// Largest accepted absolute difference.
        #[arg(long, default_value_t = 0)]
        tolerance: u16,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match cli.command {
        Cmd::Run { data_dir, out_dir, timeout_ms, depth } => {
            let out_dir = out_dir.unwrap_or_else(|| data_dir.clone());
            let config = PassConfig::default()
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_depth(depth);
            cmd_run(&data_dir, &out_dir, &config)?;
        }
        Cmd::Heads => cmd_heads(),
        Cmd::PackHead { head, weights, bias, out_dir } => {
            cmd_pack_head(head, &weights, &bias, &out_dir)?;
        }
        Cmd::PackInput { input, out_dir } => cmd_pack_input(&input, &out_dir)?,
        Cmd::Compare { actual, golden, tolerance } => cmd_compare(&actual, &golden, tolerance)?,
    }

    Ok(())
}

fn cmd_run(data_dir: &Path, out_dir: &Path, config: &PassConfig) -> Result<()> {
    let graph = PoseHeadGraph::reference()?;
    let artifacts = ModelArtifacts::from_dir(data_dir)
        .with_context(|| format!("loading artifacts from {}", data_dir.display()))?;
    let outputs = artifacts.run(&graph, config).context("overlay pass failed")?;
    let written = outputs.save(out_dir)?;

    println!(
        "Pass complete: {:.1} µs, {} words moved",
        outputs.report.latency_us(),
        outputs.report.words_moved()
    );
    for (head, path) in outputs.heads.iter().zip(&written) {
        println!("  {:<7} {:>4} values → {}", head.name, head.values.len(), path.display());
    }
    Ok(())
}

fn cmd_heads() {
    println!(
        "{:<7} {:>5} {:>5} {:>4} {:>6} {:>6}  {:>10} {:>9} {:>7}",
        "head", "in", "out", "pad", "frame", "shift", "w samples", "w words", "w bytes"
    );
    for head in HeadId::ALL {
        let c = head.config();
        println!(
            "{:<7} {:>5} {:>5} {:>4} {:>6} {:>6}  {:>10} {:>9} {:>7}",
            c.name,
            c.input_channels,
            c.output_channels,
            c.pad,
            c.frame_len(),
            c.shift,
            c.weight_len(),
            c.weight_words(),
            c.weight_words() * WORD_BYTES,
        );
    }
    let feature = FEATURE_CHANNELS;
    println!();
    println!(
        "feature  {} samples / {} words / {} bytes",
        feature,
        words_for(feature),
        words_for(feature) * WORD_BYTES
    );
}

fn cmd_pack_head(head: HeadId, weights: &Path, bias: &Path, out_dir: &Path) -> Result<()> {
    let w = read_q15_text(weights)?;
    let b = read_q15_text(bias)?;
    let fc = FcWeights::new(head.config(), w, b)?;
    let files = fc.write_artifacts(out_dir)?;
    info!("{head}: wrote {}", files.fc.display());
    println!("{head}: {} → {}", fc.packed().len(), files.fc.display());
    Ok(())
}

fn cmd_pack_input(input: &Path, out_dir: &Path) -> Result<()> {
    let feature = read_q15_text(input)?;
    let written = pack_input(&feature, out_dir)?;
    for path in &written {
        println!("  -> {}", path.display());
    }
    Ok(())
}

fn load_stream(path: &Path) -> Result<Vec<i16>> {
    if path.extension().is_some_and(|e| e == "bin") {
        let data = read_blob(path)?;
        if data.len() % 2 != 0 {
            bail!("{}: {} bytes is not a whole number of Q15 samples", path.display(), data.len());
        }
        decode_q15(&data, data.len() / 2).context("decoding Q15 blob")
    } else {
        Ok(read_q15_text(path)?)
    }
}

fn cmd_compare(actual: &Path, golden: &Path, tolerance: u16) -> Result<()> {
    let a = load_stream(actual)?;
    let g = load_stream(golden)?;
    let report = compare_q15(&a, &g, tolerance);
    println!("{report}");
    if !report.passed() {
        bail!("{} differs from {}", actual.display(), golden.display());
    }
    println!("✅ match");
    Ok(())
}
