//! fastcount - index-free parallel read counting
//!
//! fastcount assigns the reads of a BAM file to genomic features (GTF genes,
//! BED intervals or VCF sites) and writes per-barcode count matrices. The BAM
//! file is split into byte ranges that are decoded in parallel without an
//! index, so unsorted and unindexed files are handled as fast as sorted ones.
//!
//! # Usage
//!
//! ```bash
//! # Gene counts of a bulk RNA-seq library
//! fastcount count --bam input.bam --gtf genes.gtf.gz -s reverse -t 8
//!
//! # Per-cell gene and UMI counts from a gene-tagged single-cell BAM
//! fastcount count --bam possorted.bam --gtf genes.gtf --bamtag --umi-dedup exact \
//!     --barcode-file barcodes.tsv -o counts/
//! ```

extern crate fastcount_lib;
pub mod commands;
use anyhow::Result;
use env_logger::Env;
use fastcount_lib::core::prelude::is_broken_pipe;
use log::*;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case", author, about)]
/// Index-free parallel read counting over BAM files
struct Args {
    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Count reads per feature and barcode
    Count(commands::CountArgs),
}

impl Subcommand {
    fn run(self) -> Result<()> {
        match self {
            Subcommand::Count(args) => commands::run_count(args)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = Args::from_args().subcommand.run() {
        if is_broken_pipe(&err) {
            std::process::exit(0);
        }
        error!("{:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
