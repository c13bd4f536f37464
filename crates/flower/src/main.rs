// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Junk sequence generator CLI
//!
//! Generates side-effect-neutral Arm64 sequences and writes them as a C header
//! of `<PREFIX>_BLOCK_NNN()` macros.
//!
//! Usage:
//!     flower 200 --seed 7 -o arm64_blocks.h
//!     flower --verify

use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use clap::Parser;
use env_logger::Env;
use flower::config::{DEFAULT_OUTPUT, DEFAULT_PREFIX};
use flower::{EmitConfig, GeneratorConfig, JumpStyle, ShortagePolicy, emit, parse_count};
use flower_verifier::Verifier;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

#[derive(Parser, Debug)]
#[command(
    name = "flower",
    version,
    about = "Generate side-effect-neutral Arm64 junk instruction macros"
)]
struct Cli {
    /// Number of sequences to generate [default: 500]
    #[arg(allow_negative_numbers = true)]
    count: Option<String>,

    /// Header file to write
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Seed for a reproducible artifact (random when omitted)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Namespace for macro and include-guard names
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Number of preceding sequences whose registers are avoided
    #[arg(long, default_value_t = 1)]
    lookback: usize,

    /// Behaviour when the lookback leaves too few registers
    #[arg(long, value_enum, default_value_t = ShortagePolicy::Clamp)]
    on_shortage: ShortagePolicy,

    /// Syntax for the local camouflage branches
    #[arg(long, value_enum, default_value_t = JumpStyle::Relative)]
    jump_style: JumpStyle,

    /// Verify the rendered header before writing it
    #[arg(long)]
    verify: bool,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Validate everything before any generation or I/O.
    let count = parse_count(cli.count.as_deref())?;
    let emit_config = EmitConfig::new(cli.prefix, cli.jump_style)?;
    let config = GeneratorConfig {
        lookback: cli.lookback,
        on_shortage: cli.on_shortage,
        ..GeneratorConfig::default()
    };

    let seed = cli.seed.unwrap_or_else(rand::random);
    info!("generating {count} sequences with seed {seed}");

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let header = flower::generate_header(&mut rng, count, &config, &emit_config)
        .context("sequence generation failed")?;

    if cli.verify {
        // Widening may legitimately reuse a recent register.
        let diversity = match config.on_shortage {
            ShortagePolicy::Widen => 0,
            ShortagePolicy::Clamp | ShortagePolicy::Fail => config.lookback,
        };
        let result = Verifier::new().with_lookback(diversity).verify_header(&header);
        if !result.is_ok() {
            for error in result.errors() {
                eprintln!("  {error}");
            }
            bail!("generated header failed verification ({} errors)", result.errors().len());
        }
        info!("verified {} units", result.unit_count());
    }

    emit::write_artifact(&cli.output, &header)?;
    info!("wrote {count} sequences to {}", cli.output.display());

    Ok(())
}
