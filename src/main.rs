//! pagepool workload driver - runs concurrent transactions against a heap file

use anyhow::{Context, Result, bail};
use clap::Parser as ClapParser;
use log::{debug, info};
use pagepool::concurrency::Permissions;
use pagepool::config::BufferPoolConfig;
use pagepool::storage::{
    BufferPool, Catalog, HeapFile, HeapPage, PageId, PageStore, StorageError, TableId, Tuple,
};
use pagepool::transaction::{Transaction, TransactionIdGenerator};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const TABLE: TableId = TableId(1);

/// Drives concurrent insert/read transactions through the buffer pool
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./pagepool_data")]
    data_dir: PathBuf,

    /// Buffer pool capacity in pages
    #[arg(short, long, default_value = "50")]
    capacity: usize,

    /// Lock wait limit in milliseconds
    #[arg(long, default_value = "300")]
    lock_timeout_ms: u64,

    /// Number of worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Transactions per worker
    #[arg(short = 'n', long, default_value = "200")]
    transactions: usize,

    /// Fraction of transactions that roll back on purpose
    #[arg(long, default_value = "0.2")]
    abort_ratio: f64,

    /// Tuple payload size in bytes
    #[arg(long, default_value = "64")]
    tuple_size: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Default)]
struct Stats {
    committed: AtomicU64,
    aborted: AtomicU64,
    timed_out: AtomicU64,
    committed_tuples: AtomicU64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if !(0.0..=1.0).contains(&args.abort_ratio) {
        bail!("--abort-ratio must be between 0 and 1, got {}", args.abort_ratio);
    }

    std::fs::create_dir_all(&args.data_dir).context("Failed to create data directory")?;
    let table_path = args.data_dir.join("workload.tbl");
    let file = Arc::new(
        HeapFile::create(&table_path, TABLE)
            .with_context(|| format!("Failed to create table file: {:?}", table_path))?,
    );

    let catalog: Arc<Catalog<HeapPage>> = Arc::new(Catalog::new());
    catalog.add_table(file.clone());
    let config = BufferPoolConfig::new(args.capacity)
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms));
    info!("Starting workload with {:?}", config);
    let pool = BufferPool::<HeapPage>::new(config, catalog);

    let ids = Arc::new(TransactionIdGenerator::new());
    let stats = Arc::new(Stats::default());
    let started = Instant::now();

    let workers: Vec<_> = (0..args.threads)
        .map(|worker| {
            let pool = pool.clone();
            let ids = Arc::clone(&ids);
            let stats = Arc::clone(&stats);
            let transactions = args.transactions;
            let abort_ratio = args.abort_ratio;
            let tuple_size = args.tuple_size;
            thread::spawn(move || -> Result<()> {
                for _ in 0..transactions {
                    run_transaction(&pool, &ids, &stats, worker, abort_ratio, tuple_size)?;
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("worker thread panicked"))??;
    }

    pool.flush_all_pages()?;
    let elapsed = started.elapsed();

    let stored = count_tuples(file.as_ref())?;
    let expected = stats.committed_tuples.load(Ordering::SeqCst);
    info!(
        "{} committed, {} aborted ({} lock timeouts) in {:?}",
        stats.committed.load(Ordering::SeqCst),
        stats.aborted.load(Ordering::SeqCst),
        stats.timed_out.load(Ordering::SeqCst),
        elapsed
    );
    info!(
        "{} tuples on disk across {} pages, {} expected",
        stored,
        file.num_pages()?,
        expected
    );

    if stored != expected {
        bail!("Durable tuple count {} does not match committed inserts {}", stored, expected);
    }
    Ok(())
}

/// One transaction: insert a tuple, read a random existing page, then commit
/// or roll back. Lock timeouts roll back and count as aborts.
fn run_transaction(
    pool: &BufferPool<HeapPage>,
    ids: &TransactionIdGenerator,
    stats: &Stats,
    worker: usize,
    abort_ratio: f64,
    tuple_size: usize,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    let txn = Transaction::begin(pool, ids);
    let txn_id = txn.id();

    let outcome = (|| -> Result<(), StorageError> {
        let mut payload = vec![0u8; tuple_size];
        rng.fill(&mut payload[..]);
        let mut tuple = Tuple::new(payload);
        txn.insert_tuple(TABLE, &mut tuple)?;

        let num_pages = pool.catalog().store(TABLE)?.num_pages()?;
        if num_pages > 0 {
            let page_id = PageId::new(TABLE, rng.gen_range(0..num_pages));
            let page = txn.get_page(page_id, Permissions::Shared)?;
            debug!(
                "worker {} {} sees {} tuples on page {}",
                worker,
                txn_id,
                page.read().tuples().count(),
                page_id
            );
        }
        Ok(())
    })();

    match outcome {
        Ok(()) if rng.gen_bool(abort_ratio) => {
            txn.abort()?;
            stats.aborted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(()) => {
            txn.commit()?;
            stats.committed.fetch_add(1, Ordering::SeqCst);
            stats.committed_tuples.fetch_add(1, Ordering::SeqCst);
        }
        Err(err) if err.is_abort() => {
            txn.abort()?;
            stats.aborted.fetch_add(1, Ordering::SeqCst);
            stats.timed_out.fetch_add(1, Ordering::SeqCst);
        }
        Err(err) => {
            txn.abort()?;
            return Err(err).with_context(|| format!("worker {} failed in {}", worker, txn_id));
        }
    }
    Ok(())
}

fn count_tuples(file: &HeapFile) -> Result<u64> {
    let mut total = 0;
    for page_no in 0..file.num_pages()? {
        let page = file.read_page(PageId::new(TABLE, page_no))?;
        total += page.tuples().count() as u64;
    }
    Ok(total)
}
