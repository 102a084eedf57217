//! Replay a captured book message stream through order book listeners.
//!
//! Reads a JSON-lines capture (one `ReplayRecord` per line), feeds every
//! message to a listener per symbol, and prints the final books together
//! with listener statistics.
//!
//! # Usage
//!
//! ```bash
//! # Replay a capture and dump the final book
//! cargo run --release --bin book_replay -- --input capture/IBM.jsonl
//!
//! # Verify every delta against the full book while replaying
//! cargo run --release --bin book_replay -- capture/IBM.jsonl --check
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;

use mamda_orderbook::source::{JsonLinesSource, MessageSource};
use mamda_orderbook::{
    BookSubscription, CheckCounters, DeltaChecker, ListenerConfig, ListenerEvent,
    OrderBookListener,
};

/// Command-line arguments
struct Args {
    /// JSON-lines capture file
    input: PathBuf,
    /// Source name for records without a subscription
    source: String,
    /// Symbol for records without a subscription
    symbol: Option<String>,
    /// Fail on duplicate adds and unknown entries
    strict: bool,
    /// Keep applying updates to inconsistent books
    update_inconsistent: bool,
    /// Run the apply-delta check on every event
    check: bool,
    /// Print every event
    verbose: bool,
    /// Skip the final book dump
    quiet: bool,
}

fn parse_args() -> std::result::Result<Args, String> {
    let args: Vec<String> = env::args().collect();

    let mut input: Option<PathBuf> = None;
    let mut source = "REPLAY".to_string();
    let mut symbol: Option<String> = None;
    let mut strict = false;
    let mut update_inconsistent = false;
    let mut check = false;
    let mut verbose = false;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                i += 1;
                if i >= args.len() {
                    return Err("--input requires a path".to_string());
                }
                input = Some(PathBuf::from(&args[i]));
            }
            "--source" => {
                i += 1;
                if i >= args.len() {
                    return Err("--source requires a name".to_string());
                }
                source = args[i].clone();
            }
            "--symbol" | "-s" => {
                i += 1;
                if i >= args.len() {
                    return Err("--symbol requires a name".to_string());
                }
                symbol = Some(args[i].clone());
            }
            "--strict" => strict = true,
            "--update-inconsistent" => update_inconsistent = true,
            "--check" | "-c" => check = true,
            "--verbose" | "-v" => verbose = true,
            "--quiet" | "-q" => quiet = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => {
                if input.is_none() {
                    input = Some(PathBuf::from(arg));
                } else {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }
        i += 1;
    }

    let input = input.ok_or("Input path is required")?;

    Ok(Args {
        input,
        source,
        symbol,
        strict,
        update_inconsistent,
        check,
        verbose,
        quiet,
    })
}

fn print_help() {
    eprintln!(
        r#"
Book Replay

Replays a JSON-lines capture of book messages through order book
listeners and prints the resulting books.

USAGE:
    book_replay [OPTIONS] --input <FILE>
    book_replay <FILE>

OPTIONS:
    -i, --input <FILE>        JSON-lines capture, one record per line
        --source <NAME>       Source for records without a subscription [default: REPLAY]
    -s, --symbol <NAME>       Symbol for records without a subscription
                              [default: taken from the file name]
        --strict              Fail on duplicate adds and unknown entries
        --update-inconsistent Keep applying updates after a sequence gap
    -c, --check               Check every delta against the full book
    -v, --verbose             Print every event
    -q, --quiet               Do not dump the final books
    -h, --help                Print this help message
"#
    );
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let source = match JsonLinesSource::open(&args.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let symbol = args
        .symbol
        .clone()
        .or_else(|| source.metadata().symbol.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let default_sub = BookSubscription::new(&args.source, symbol);

    let config = ListenerConfig::default()
        .with_strict_checking(args.strict)
        .with_update_inconsistent_book(args.update_inconsistent);
    let counters = Arc::new(CheckCounters::default());

    let records = match source.records() {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let start_time = Instant::now();
    let mut listeners: AHashMap<BookSubscription, OrderBookListener> = AHashMap::new();
    let mut decode_errors = 0u64;
    let mut message_errors = 0u64;

    for record in records {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping record: {}", e);
                decode_errors += 1;
                continue;
            }
        };
        let sub = record.subscription.unwrap_or_else(|| default_sub.clone());

        let listener = listeners.entry(sub.clone()).or_insert_with(|| {
            let mut listener = OrderBookListener::with_config(config.clone());
            if args.check {
                listener.add_handler(DeltaChecker::new(Arc::clone(&counters)));
            }
            listener
        });

        match listener.on_msg(&sub, &record.message, record.msg_type) {
            Ok(event) => {
                if args.verbose && event != ListenerEvent::Ignored {
                    println!("{} seq={} {:?}", sub, listener.seq_num(), event);
                }
            }
            Err(e) => {
                message_errors += 1;
                if e.is_fatal() {
                    log::error!("{}: {}", sub, e);
                }
            }
        }
    }

    let elapsed = start_time.elapsed().as_secs_f64();

    let mut subs: Vec<&BookSubscription> = listeners.keys().collect();
    subs.sort_by(|a, b| a.symbol().cmp(b.symbol()).then(a.source().cmp(b.source())));

    for sub in subs {
        let listener = &listeners[sub];
        let stats = listener.stats();

        println!("\n{}", "=".repeat(60));
        println!("{}", sub);
        println!("  Messages: {}", stats.messages_processed);
        println!("  Recaps: {}  Deltas: {}  Clears: {}", stats.recaps, stats.deltas, stats.clears);
        println!("  Gaps: {}  Suppressed: {}", stats.gaps, stats.suppressed);
        println!("  Incomplete: {}  Errors: {}", stats.incomplete, stats.errors);
        println!("  Consistent: {}", listener.is_consistent());

        if !args.quiet {
            if let Some(book) = listener.book_snapshot() {
                print!("\n{}", book.dump());
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("Replay Complete!");
    println!("  Books: {}", listeners.len());
    println!("  Undecodable records: {}", decode_errors);
    println!("  Failed messages: {}", message_errors);
    if args.check {
        println!(
            "  Delta checks: {} ok, {} failed",
            counters.success_count(),
            counters.failure_count()
        );
    }
    println!("  Total time: {:.3}s", elapsed);

    if decode_errors > 0 || message_errors > 0 || counters.failure_count() > 0 {
        std::process::exit(1);
    }
}
