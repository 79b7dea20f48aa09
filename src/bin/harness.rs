//! binstore Test Harness
//!
//! Drives the engine with real files from a directory: every file under the
//! input directory is added (its path doubling as the key), then every key
//! is read back and verified against the source file's length and content
//! hash. Populate and verify run against one engine instance because engine
//! construction rebuilds the store from empty.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use binstore::codec;
use binstore::{Config, Engine, StreamInfo};

/// binstore directory harness
#[derive(Parser, Debug)]
#[command(name = "binstore-harness")]
#[command(about = "Populate a binstore from a directory of files, then verify every payload")]
#[command(version)]
struct Args {
    /// Directory whose files are added to the store
    input_dir: PathBuf,

    /// Directory for the backing file
    storage_dir: PathBuf,

    /// Worker threads for each phase
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Maximum index size in KB
    #[arg(long, default_value = "16384")]
    index_limit_kb: u64,

    /// Maximum backing-file size in KB (0 = unlimited)
    #[arg(long, default_value = "0")]
    storage_limit_kb: u64,

    /// Compression threshold in KB
    #[arg(long, default_value = "16")]
    compression_threshold_kb: u64,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,binstore=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    if !args.input_dir.is_dir() || !args.storage_dir.is_dir() {
        eprintln!("Usage: binstore-harness <InputFolder> <StorageFolder>");
        std::process::exit(1);
    }

    let config = Config::builder()
        .data_dir(&args.storage_dir)
        .max_index_size(args.index_limit_kb * 1024)
        .max_storage_file_size(args.storage_limit_kb * 1024)
        .compression_threshold(args.compression_threshold_kb * 1024)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("failed to open engine: {e}");
            std::process::exit(1);
        }
    };

    let files = collect_files(&args.input_dir);
    tracing::info!("found {} files under {}", files.len(), args.input_dir.display());

    // Phase 1: populate
    let started = Instant::now();
    let added = run_parallel(&files, args.threads, {
        let engine = Arc::clone(&engine);
        move |path| add_file(&engine, path)
    });
    tracing::info!("added {}/{} files in {:?}", added, files.len(), started.elapsed());

    // Phase 2: verify
    let started = Instant::now();
    let verified = run_parallel(&files, args.threads, {
        let engine = Arc::clone(&engine);
        move |path| verify_file(&engine, path)
    });
    tracing::info!(
        "verified {}/{} files in {:?}",
        verified,
        files.len(),
        started.elapsed()
    );

    if verified != files.len() {
        eprintln!("verification failed for {} files", files.len() - verified);
        std::process::exit(1);
    }
    println!("Finished!");
}

/// All regular files under `dir`, recursively
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files
}

/// Run `work` over `files` on `threads` workers, returning the success count
fn run_parallel<F>(files: &[PathBuf], threads: usize, work: F) -> usize
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    let chunk = files.len().div_ceil(threads.max(1)).max(1);
    std::thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk)
            .map(|slice| scope.spawn(|| slice.iter().filter(|path| work(path)).count()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    })
}

fn add_file(engine: &Engine, path: &Path) -> bool {
    let key = path.to_string_lossy();
    let source = match File::open(path) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("cannot open {}: {}", path.display(), e);
            return false;
        }
    };
    match engine.add(&key, &source, &StreamInfo::empty()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("add failed for {}: {}", path.display(), e);
            false
        }
    }
}

fn verify_file(engine: &Engine, path: &Path) -> bool {
    let key = path.to_string_lossy();
    let stored = match engine.get(&key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::warn!("{} was removed before its write completed", path.display());
            return false;
        }
        Err(e) => {
            tracing::warn!("get failed for {}: {}", path.display(), e);
            return false;
        }
    };

    let source = match std::fs::read(path) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("cannot re-read {}: {}", path.display(), e);
            return false;
        }
    };

    if source.len() != stored.len() {
        tracing::warn!(
            "length mismatch for {}: source {}, stored {}",
            path.display(),
            source.len(),
            stored.len()
        );
        return false;
    }

    if codec::content_hash(&source) != codec::content_hash(&stored) {
        tracing::warn!("content hash mismatch for {}", path.display());
        return false;
    }

    true
}
