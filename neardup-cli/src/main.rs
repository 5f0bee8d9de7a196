//! CLI for near-duplicate text detection using MinHash LSH.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use neardup::corpus;
use neardup::dedup::Deduplicator;
use neardup::index::{self, BloomLshIndex, BloomParams, DedupIndex, RedisLshIndex, RedisParams};
use neardup::minhash::MinHasher;
use neardup::sink::{DuplicateSink, SinkLayout};
use neardup::store;

#[derive(Parser)]
#[command(name = "neardup")]
#[command(version)]
#[command(about = "Near-duplicate text detection over jsonl corpora using MinHash LSH")]
#[command(group(
    ArgGroup::new("workflow")
        .required(true)
        .args(["single", "multi", "file"])
))]
struct Cli {
    /// Deduplicate a single corpus directory against the index
    #[arg(long)]
    single: bool,

    /// Deduplicate multiple corpora against the index, in the order given
    #[arg(long)]
    multi: bool,

    /// Deduplicate a single jsonl file against the index
    #[arg(long)]
    file: bool,

    /// Corpus label(s) used in output rows
    #[arg(long = "name", required = true, num_args = 1..)]
    names: Vec<String>,

    /// Directory (or directories) of jsonl files; with --file, one jsonl file
    #[arg(long = "input", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Directory (or directories) where signature files live
    #[arg(long = "minhash-dir", required = true, num_args = 1..)]
    minhash_dirs: Vec<PathBuf>,

    /// Path of the csv file where duplicates are logged
    #[arg(long)]
    output_file: PathBuf,

    /// Jaccard similarity threshold in (0, 1]
    #[arg(long, default_value_t = neardup::DEFAULT_THRESHOLD)]
    sim_threshold: f64,

    /// Number of hash permutations per signature
    #[arg(long, default_value_t = neardup::DEFAULT_NUM_PERM)]
    num_perm: usize,

    /// Index backend
    #[arg(long, value_enum, default_value_t = Mode::Bloom)]
    mode: Mode,

    /// Expected total number of documents (bloom mode, required)
    #[arg(short = 'n', long)]
    num: Option<u64>,

    /// Target overall false positive rate (bloom mode)
    #[arg(long, default_value_t = neardup::DEFAULT_FALSE_POSITIVE_RATE)]
    fp: f64,

    /// Directory for bloom backing files (bloom mode, required)
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Purge bloom backing files and the output csv before the run
    #[arg(long)]
    clear: bool,

    /// Port the redis server listens on (lsh mode)
    #[arg(long, default_value_t = 6379)]
    redis_port: u16,

    /// Reuse signature files already present in the minhash dir
    #[arg(long)]
    skip_minhashing: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Lsh,
    Bloom,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    validate(&cli)?;

    if cli.clear {
        clear_previous_run(&cli)?;
    }

    let hasher = MinHasher::new(cli.num_perm);
    compute_signatures(&cli, &hasher)?;

    let duplicates = match cli.mode {
        Mode::Lsh => {
            let params = RedisParams {
                port: cli.redis_port,
                ..RedisParams::default()
            };
            let index = RedisLshIndex::connect(&params, cli.sim_threshold, cli.num_perm)
                .context("connecting to redis")?;
            let layout = if cli.file {
                SinkLayout::KeyPair
            } else {
                SinkLayout::CorpusKeyPair
            };
            run_dedup(&cli, index, layout)?
        }
        Mode::Bloom => {
            let params = BloomParams {
                // Both present after validate().
                expected_items: cli.num.unwrap_or_default(),
                false_positive_rate: cli.fp,
                save_dir: cli.save_dir.clone().unwrap_or_default(),
            };
            let index = BloomLshIndex::open(&params, cli.sim_threshold, cli.num_perm)
                .context("opening bloom index")?;
            run_dedup(&cli, index, SinkLayout::CorpusKey)?
        }
    };

    info!(duplicates, output = %cli.output_file.display(), "run complete");
    Ok(())
}

fn validate(cli: &Cli) -> Result<()> {
    if cli.names.len() != cli.inputs.len() || cli.inputs.len() != cli.minhash_dirs.len() {
        bail!(
            "expected the same number of --name, --input and --minhash-dir values, got {}, {}, {}",
            cli.names.len(),
            cli.inputs.len(),
            cli.minhash_dirs.len()
        );
    }
    if (cli.single || cli.file) && cli.inputs.len() != 1 {
        bail!("--single and --file take exactly one --input");
    }
    if cli.file && !cli.inputs[0].is_file() {
        bail!("--file expects {} to be a jsonl file", cli.inputs[0].display());
    }
    if cli.mode == Mode::Bloom && (cli.num.is_none() || cli.save_dir.is_none()) {
        bail!("bloom mode requires --num and --save-dir");
    }
    Ok(())
}

fn clear_previous_run(cli: &Cli) -> Result<()> {
    if let Some(save_dir) = &cli.save_dir {
        index::clear_backing(save_dir).context("clearing bloom backing files")?;
    }
    if cli.output_file.exists() {
        fs::remove_file(&cli.output_file)
            .with_context(|| format!("removing {}", cli.output_file.display()))?;
    }
    Ok(())
}

fn compute_signatures(cli: &Cli, hasher: &MinHasher) -> Result<()> {
    for (input, minhash_dir) in cli.inputs.iter().zip(&cli.minhash_dirs) {
        if cli.file {
            corpus::compute_signatures_for_file(input, minhash_dir, hasher, cli.skip_minhashing)
                .with_context(|| format!("hashing {}", input.display()))?;
        } else {
            corpus::compute_signatures_for_dir(input, minhash_dir, hasher, cli.skip_minhashing)
                .with_context(|| format!("hashing corpus {}", input.display()))?;
        }
    }
    Ok(())
}

fn run_dedup<I: DedupIndex>(cli: &Cli, index: I, layout: SinkLayout) -> Result<usize> {
    let mut sink = DuplicateSink::append(&cli.output_file, layout)
        .with_context(|| format!("opening {}", cli.output_file.display()))?;
    let mut dedup = Deduplicator::new(index);
    let mut duplicates = 0;

    for ((name, input), minhash_dir) in cli.names.iter().zip(&cli.inputs).zip(&cli.minhash_dirs) {
        duplicates += if cli.file {
            let sig_file = store::signature_path(minhash_dir, input);
            dedup
                .dedup_signature_file(&sig_file, name, &mut sink)
                .with_context(|| format!("deduplicating {}", sig_file.display()))?
        } else {
            dedup
                .dedup_corpus(minhash_dir, name, &mut sink)
                .with_context(|| format!("deduplicating corpus {}", name))?
        };
    }

    dedup.finish().context("flushing index")?;
    sink.flush().context("flushing duplicate log")?;
    Ok(duplicates)
}
