// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI for flower-verifier
//!
//! Checks a generated header and reports every violation found.
//!
//! # Usage
//!
//! ```bash
//! flower 200 -o arm64_blocks.h
//! flower-verify arm64_blocks.h
//!
//! # Also require registers to differ from the previous 2 units
//! flower-verify arm64_blocks.h 2
//! ```

use std::{env, fs, process};

use env_logger::Env;
use flower_verifier::Verifier;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 && args.len() != 3 {
        eprintln!("Usage: {} <header-file> [lookback]", args[0]);
        process::exit(1);
    }

    let path = &args[1];
    let lookback = match args.get(2) {
        Some(depth) => depth.parse().unwrap_or_else(|e| {
            eprintln!("Invalid lookback {}: {}", depth, e);
            process::exit(1);
        }),
        None => 0,
    };

    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path, e);
        process::exit(1);
    });

    let result = Verifier::new().with_lookback(lookback).verify_header(&text);

    let instructions: usize = result.units().iter().map(|u| u.instruction_count).sum();
    println!(
        "Verified {} units ({} instructions)",
        result.unit_count(),
        instructions
    );

    if !result.is_ok() {
        eprintln!("{} errors:", result.errors().len());
        for error in result.errors() {
            eprintln!("  {}", error);
        }
        process::exit(1);
    }

    println!("OK");
}
