use anyhow::{anyhow, Result};
use fastcount_lib::annotation::StrandMode;
use fastcount_lib::bam::ScanLimits;
use fastcount_lib::core::prelude::determine_allowed_cpus;
use fastcount_lib::count::{parse_tag, CountConfig, FeatureMode, UmiDedup};
use log::warn;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

/// CLI arguments for the `count` subcommand.
#[derive(Debug, Clone, StructOpt)]
#[structopt(author, name = "count")]
pub struct CountArgs {
    /// Input BAM file. No index is required.
    #[structopt(long)]
    pub bam: PathBuf,

    /// GTF annotation (`.gtf` or `.gtf.gz`); exons are counted per gene.
    #[structopt(long)]
    pub gtf: Option<PathBuf>,

    /// BED annotation (`.bed` or `.bed.gz`); each interval is its own feature.
    #[structopt(long)]
    pub bed: Option<PathBuf>,

    /// VCF of single-nucleotide variants; each site is a 1-bp feature.
    #[structopt(long)]
    pub vcf: Option<PathBuf>,

    /// Read gene assignments from the feature tag instead of alignment positions (GTF only).
    #[structopt(long)]
    pub bamtag: bool,

    /// Tab-separated list of accepted barcodes with an optional sample name column.
    #[structopt(long = "barcode-file")]
    pub barcode_file: Option<PathBuf>,

    /// BAM tag holding the cell barcode.
    #[structopt(long = "barcode-tag", default_value = "CB")]
    pub barcode_tag: String,

    /// Also count secondary and supplementary alignments.
    #[structopt(long = "multiple-mapped")]
    pub multiple_mapped: bool,

    /// UMI deduplication: `none` or `exact` (requires --bamtag).
    #[structopt(long = "umi-dedup", default_value = "none")]
    pub umi_dedup: UmiDedup,

    /// Strandedness of the library: `no`, `yes` or `reverse`.
    #[structopt(long, short = "s", default_value = "no")]
    pub stranded: StrandMode,

    /// Minimum mapping quality for a read (or both mates) to be counted.
    #[structopt(long = "min-mapq", short = "q", default_value = "10")]
    pub min_mapq: u8,

    /// Number of chunks read in parallel.
    #[structopt(long, short = "t", default_value = "1")]
    pub threads: usize,

    /// Combine mates of paired-end reads before assignment.
    #[structopt(long, short = "p")]
    pub paired: bool,

    /// Output folder (defaults to the folder of the BAM file).
    #[structopt(long, short = "o")]
    pub output: Option<PathBuf>,

    /// BAM tag holding the gene id when --bamtag is set.
    #[structopt(long = "feature-tag", default_value = "GX")]
    pub feature_tag: String,

    /// BAM tag holding the corrected UMI.
    #[structopt(long = "umi-tag", default_value = "UB")]
    pub umi_tag: String,

    /// BAM tag holding the raw UMI, used when the corrected one is missing.
    #[structopt(long = "raw-umi-tag", default_value = "UR")]
    pub raw_umi_tag: String,

    /// Largest record (in bytes) accepted while searching for chunk boundaries.
    #[structopt(long = "max-record-len", default_value = "100000")]
    pub max_record_len: usize,
}

/// Feature annotation chosen on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationSource {
    Gtf(PathBuf),
    Bed(PathBuf),
    Vcf(PathBuf),
}

impl AnnotationSource {
    pub fn path(&self) -> &Path {
        match self {
            AnnotationSource::Gtf(p) | AnnotationSource::Bed(p) | AnnotationSource::Vcf(p) => p,
        }
    }
}

/// Normalised configuration derived from [`CountArgs`].
#[derive(Debug, Clone)]
pub struct CountSettings {
    pub bam: PathBuf,
    pub annotation: AnnotationSource,
    pub barcode_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub config: CountConfig,
}

fn default_output_dir(bam: &Path) -> PathBuf {
    match bam.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl TryFrom<CountArgs> for CountSettings {
    type Error = anyhow::Error;

    fn try_from(args: CountArgs) -> Result<Self> {
        let annotation = match (args.gtf, args.bed, args.vcf) {
            (Some(p), None, None) => AnnotationSource::Gtf(p),
            (None, Some(p), None) => AnnotationSource::Bed(p),
            (None, None, Some(p)) => AnnotationSource::Vcf(p),
            (None, None, None) => {
                return Err(anyhow!("One annotation is required: --gtf, --bed or --vcf"))
            }
            _ => return Err(anyhow!("Only one of --gtf, --bed and --vcf can be given")),
        };
        if args.bamtag && !matches!(annotation, AnnotationSource::Gtf(_)) {
            return Err(anyhow!("--bamtag can only be used together with --gtf"));
        }
        if args.umi_dedup == UmiDedup::Exact && !args.bamtag {
            return Err(anyhow!("--umi-dedup exact requires --bamtag"));
        }

        let mut strand_mode = args.stranded;
        if matches!(annotation, AnnotationSource::Vcf(_)) && strand_mode != StrandMode::None {
            warn!("VCF features are not stranded; ignoring --stranded {}", strand_mode);
            strand_mode = StrandMode::None;
        }

        let threads = determine_allowed_cpus(args.threads)?;
        let output_dir = match args.output {
            Some(dir) => dir,
            None => {
                let dir = default_output_dir(&args.bam);
                warn!(
                    "No output folder given, writing to {} (set one with -o)",
                    dir.display()
                );
                dir
            }
        };

        let config = CountConfig {
            threads,
            paired: args.paired,
            min_mapq: args.min_mapq,
            feature_mode: if args.bamtag {
                FeatureMode::Tag
            } else {
                FeatureMode::Position
            },
            umi_dedup: args.umi_dedup,
            strand_mode,
            keep_multi_mapped: args.multiple_mapped,
            barcode_tag: parse_tag(&args.barcode_tag)?,
            feature_tag: parse_tag(&args.feature_tag)?,
            umi_tag: parse_tag(&args.umi_tag)?,
            raw_umi_tag: parse_tag(&args.raw_umi_tag)?,
            limits: ScanLimits {
                max_record_len: args.max_record_len,
            },
            ..CountConfig::default()
        };
        config.validate()?;

        Ok(CountSettings {
            bam: args.bam,
            annotation,
            barcode_file: args.barcode_file,
            output_dir,
            config,
        })
    }
}
