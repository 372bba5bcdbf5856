use anyhow::Context;
use clap::Parser;
use gpt2_rs::{Preset, Session, SessionOptions, load_model, load_tokenizer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Level, info};

const DIM: &str = "\x1b[0;2m";
const BOLD: &str = "\x1b[0;1m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(version, about = "Generate text with a pretrained GPT-2 model", long_about = None)]
struct Args {
    /// Model size: 124M, 355M or 774M
    #[arg(short, long, default_value = "124M")]
    model: String,

    /// Directory holding the tensor files and tokens.dat [default: the model size]
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Number of top-ranked words to pick each next word from
    #[arg(short, long, default_value_t = 20)]
    choice: usize,

    /// Number of words to generate
    #[arg(short, long, default_value_t = 1)]
    words: usize,

    /// Random seed [default: current time]
    #[arg(short, long)]
    seed: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Prompt text
    prompt: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let preset: Preset = args.model.parse()?;
    let config = preset.config();
    let dir = args.dir.unwrap_or_else(|| PathBuf::from(preset.name()));
    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    });
    info!(%preset, seed, "starting");

    let tokenizer = load_tokenizer(dir.join("tokens.dat")).context("loading vocabulary")?;
    anyhow::ensure!(
        tokenizer.vocab_size() == config.vocab_size,
        "vocabulary has {} tokens, {preset} expects {}",
        tokenizer.vocab_size(),
        config.vocab_size
    );
    let prompt = args.prompt.join(" ");
    let tokens = tokenizer.encode(&prompt);

    let mut out = io::stdout().lock();
    writeln!(out, "> {}", spaced(&tokenizer.decode(&tokens)?))?;

    let weights = load_model(&dir, &config)
        .with_context(|| format!("loading {preset} weights from {}", dir.display()))?;

    let mut session = Session::new(&config, &weights, SessionOptions { top_k: args.choice })?;
    session.feed(&tokens).context("running prompt")?;

    let mut rng = StdRng::seed_from_u64(seed);
    // Bytes, since a token may end partway through a character.
    let mut text = prompt.into_bytes();
    for _ in 0..args.words {
        let step = session.step(&mut rng)?;

        let pool: Vec<usize> = step.candidates.iter().map(|c| c.token).collect();
        writeln!(out, "{DIM}{}{RESET}", spaced(&tokenizer.decode(&pool)?))?;

        text.extend_from_slice(tokenizer.token_bytes(step.token)?);
        writeln!(out, "{BOLD}{}{RESET}", String::from_utf8_lossy(&text))?;
        out.flush()?;
    }

    Ok(())
}

/// Space-separated token list for display.
fn spaced(pieces: &[&[u8]]) -> String {
    String::from_utf8_lossy(&pieces.join(&b' ')).into_owned()
}
