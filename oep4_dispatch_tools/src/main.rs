use std::io::{self, BufRead};
use std::process::exit;

use clap::Parser;
use oep4_dispatch::{Blake2bHasher, MethodResolver};
use oep4_token::method::Method;

const LONG_ABOUT: &str =
    "Pass a single method name as a command line argument or a list of method names, separated by \
new-lines to stdin. The output is a list of method numbers, one per method name. With --standard, \
lists the number of every OEP-4 entry point instead.";

/// Takes a method name and converts it to the method number an OEP-4 host routes it by.
///
/// Can be used by contract authors to precompute the method number for a given exported method to
/// avoid runtime hashing during dispatch.
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = Some(LONG_ABOUT)
)]
struct Args {
    /// Method name to hash.
    method_name: Option<String>,

    /// Print the name and number of every standard token method.
    #[clap(long, conflicts_with = "method_name")]
    standard: bool,
}

fn main() {
    let args = Args::parse();
    let resolver = MethodResolver::new(Blake2bHasher {});

    if args.standard {
        for method in Method::ALL {
            match resolver.method_number(method.name()) {
                Ok(number) => println!("{}\t{number}", method.name()),
                Err(e) => {
                    eprintln!("Error computing method number for {}: {e}", method.name());
                    exit(1);
                }
            }
        }
        exit(0);
    }

    let method_name = match args.method_name {
        Some(name) => name,
        None => {
            // read from std-in if no name passed in
            let stdin = io::stdin();
            let mut failed = false;
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        eprintln!("Error reading stdin: {e}");
                        exit(1);
                    }
                };
                let method_name = line.trim();
                if method_name.is_empty() {
                    continue;
                }
                match resolver.method_number(method_name) {
                    Ok(method_number) => println!("{method_number}"),
                    Err(e) => {
                        eprintln!("Error computing method number for {method_name}: {e}");
                        failed = true;
                    }
                }
            }
            exit(if failed { 1 } else { 0 });
        }
    };

    match resolver.method_number(&method_name) {
        Ok(method_number) => {
            println!("{method_number}");
        }
        Err(e) => {
            eprintln!("Error computing method number: {e}");
            exit(1);
        }
    }
}
