use clap::Parser;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use xkcd_words::{normalize, tokenize};

/// A CLI tool to normalize a phrase into search terms using xkcd-words.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Also print the raw tokens before stop-word filtering and stemming.
    #[arg(short, long, default_value_t = false)]
    tokens: bool,
}

#[derive(Serialize)]
struct NormalizedPhrase<'a> {
    phrase: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens: Option<Vec<String>>,
    terms: Vec<String>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let phrase = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let output = NormalizedPhrase {
        phrase: phrase.trim(),
        tokens: args.tokens.then(|| tokenize(&phrase)),
        terms: normalize(&phrase),
    };

    let json_output = serde_json::to_string_pretty(&output)?;
    println!("{}", json_output);

    Ok(())
}
