//! Filter stored monthly logs down to plausible rows.
//!
//! The logged data has no integrity protection (the wire protocol carries
//! no checksum), so this pass re-runs the plausibility filter over one or
//! more stored files and prints the surviving rows to stdout in the same
//! semicolon-delimited layout, header first. Point it at the files in
//! chronological order and redirect the output to whatever comes next.

use growatt_1500::filter::{FilterLimits, qualify};
use growatt_1500::storage;

fn main() {
    env_logger::init();

    let files: Vec<String> = std::env::args().skip(1).collect();
    if files.is_empty() {
        eprintln!("usage: export FILE [FILE ...]");
        std::process::exit(2);
    }

    let mut out = std::io::stdout().lock();
    for (index, file) in files.iter().enumerate() {
        let rows = match storage::read_log_file(file) {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("cannot read {file}: {e}");
                std::process::exit(1);
            }
        };

        // Each file is its own filtering pass, same as each file was its
        // own logging session. Header only once across all files.
        let qualified = qualify(rows, FilterLimits::default());
        if let Err(e) = storage::write_rows(&mut out, qualified, index == 0) {
            eprintln!("cannot write output: {e}");
            std::process::exit(1);
        }
    }
}
