// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use talpa::{
    AttributeMap, Dictionary, FormatVersion, SystemClock, UnigramProperty, BIGRAM_COUNT_QUERY,
    MAX_BIGRAM_COUNT_QUERY, MAX_UNIGRAM_COUNT_QUERY, UNIGRAM_COUNT_QUERY,
};

mod cli;
use cli::{Cli, Commands};

#[derive(Serialize)]
struct InspectOutput {
    version: u16,
    locale: String,
    decaying: bool,
    unigram_count: String,
    bigram_count: String,
    max_unigram_count: String,
    max_bigram_count: String,
    attributes: Vec<(String, String)>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> std::io::Result<()> {
    match cli.command {
        Commands::Create {
            dir,
            locale,
            version,
            decaying,
        } => {
            let version = FormatVersion::from_raw(version)?;
            let mut attributes = AttributeMap::new();
            if decaying {
                attributes.set_bool(talpa::header::USES_FORGETTING_CURVE_KEY, true);
                attributes.set_bool(talpa::header::HAS_HISTORICAL_INFO_KEY, true);
            }
            let mut dict =
                Dictionary::create_on_memory(version, &locale, &attributes, Box::new(SystemClock))?;
            dict.flush(Path::new(&dir))?;
            println!("Created {} (version {})", dir, version.raw());
            Ok(())
        }

        Commands::Add { dir, words } => {
            let mut dict = Dictionary::open(Path::new(&dir), true, Box::new(SystemClock))?;
            let mut added = 0usize;
            for spec in &words {
                let (word, probability) = match spec.split_once('=') {
                    Some((w, p)) => (w, p.parse::<u8>().unwrap_or(0)),
                    None => (spec.as_str(), 100),
                };
                if dict.add_unigram(word, &UnigramProperty::with_probability(probability)) {
                    added += 1;
                } else {
                    eprintln!("Rejected: {}", word);
                }
            }
            dict.flush(Path::new(&dir))?;
            println!("Added {} words", added);
            Ok(())
        }

        Commands::Lookup { dir, word } => {
            let dict = Dictionary::open(Path::new(&dir), false, Box::new(SystemClock))?;
            match dict.get_word_property(&word) {
                Some(property) => {
                    println!("{}: probability {}", word, property.probability);
                    for shortcut in &property.shortcuts {
                        println!(
                            "  shortcut -> {} ({})",
                            talpa::buffer::codepoints::string_of(&shortcut.code_points),
                            shortcut.probability
                        );
                    }
                    for ngram in &property.ngrams {
                        println!(
                            "  -> {} ({})",
                            talpa::buffer::codepoints::string_of(&ngram.target_code_points),
                            ngram.probability
                        );
                    }
                }
                None => println!("{}: not found", word),
            }
            Ok(())
        }

        Commands::Inspect { dir } => {
            let dict = Dictionary::open(Path::new(&dir), false, Box::new(SystemClock))?;
            let header = dict.header();
            let output = InspectOutput {
                version: header.version().raw(),
                locale: header.locale(),
                decaying: header.is_decaying_dict(),
                unigram_count: dict.get_property(UNIGRAM_COUNT_QUERY),
                bigram_count: dict.get_property(BIGRAM_COUNT_QUERY),
                max_unigram_count: dict.get_property(MAX_UNIGRAM_COUNT_QUERY),
                max_bigram_count: dict.get_property(MAX_BIGRAM_COUNT_QUERY),
                attributes: header
                    .attributes()
                    .iter()
                    .map(|(k, v)| (k.to_string(), talpa::buffer::codepoints::string_of(v)))
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
            );
            Ok(())
        }

        Commands::Compact { dir } => {
            let mut dict = Dictionary::open(Path::new(&dir), true, Box::new(SystemClock))?;
            dict.flush_with_gc(Path::new(&dir))?;
            println!("Compacted {}", dir);
            Ok(())
        }
    }
}
