use std::path::{Path, PathBuf};

use clap::{ArgAction, CommandFactory, ErrorKind, Parser, Subcommand};

use haystack::matcher::{
    self, text, FeatureLibrary, FusionStrategy, FusionWeights, HistogramMetric, JumpPenalty,
    MatchReport, Matcher, Modality, QueryFeatures,
};
use haystack::util::format_offset;

#[derive(clap::ValueEnum, Clone, Debug)]
enum Fusion {
    Weighted,
    Agreement,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum Metric {
    ChiSquare,
    Euclidean,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum Penalty {
    Slope,
    Deviation,
    None,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(
        arg_required_else_help = true,
        after_help = "Combine text feature databases into a single library file. The library is used by the 'search' command and saves re-parsing the text databases on every query."
    )]
    Pack {
        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Audio feature database in the 'Video:'/'Frame N: value' text format."
        )]
        audio: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Motion feature database in the 'Video:'/'Frame N: value' text format."
        )]
        motion: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "JSON feature library with color histogram references."
        )]
        histogram: Option<PathBuf>,

        #[clap(
            short,
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Path of the library file to write."
        )]
        output: PathBuf,
    },

    #[clap(
        arg_required_else_help = true,
        after_help = "Find the segment of the reference library that best matches a query clip. References can come from a packed library, from text databases, or both."
    )]
    Search {
        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Library file written by the 'pack' command."
        )]
        library: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Audio feature database in text format."
        )]
        audio_db: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Motion feature database in text format."
        )]
        motion_db: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "JSON query features. Individual modalities can be overridden with --audio-query and --motion-query."
        )]
        query: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Query audio features, as 'Frame N: value' lines or a whitespace-separated list of values."
        )]
        audio_query: Option<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Query motion features, as 'Frame N: value' lines or a whitespace-separated list of values."
        )]
        motion_query: Option<PathBuf>,

        #[clap(
            long,
            default_value_t = matcher::DEFAULT_TOP_K,
            value_parser = clap::value_parser!(usize),
            help = "Number of candidates kept per modality. The confidence check looks at the top 3."
        )]
        top_k: usize,

        #[clap(long, value_enum, default_value_t = Fusion::Weighted, help = "How the audio and motion rankings are combined. 'weighted' scores each modality by its confidence and weight. 'agreement' picks a candidate both modalities rank, falling back to the confident modality.")]
        fusion: Fusion,

        #[clap(
            long,
            default_value_t = matcher::DEFAULT_AUDIO_WEIGHT,
            value_parser = clap::value_parser!(f64),
            help = "Weight of the audio modality for weighted fusion."
        )]
        audio_weight: f64,

        #[clap(
            long,
            default_value_t = matcher::DEFAULT_MOTION_WEIGHT,
            value_parser = clap::value_parser!(f64),
            help = "Weight of the motion modality for weighted fusion."
        )]
        motion_weight: f64,

        #[clap(long, value_enum, default_value_t = Metric::ChiSquare, help = "Distance between two color histograms.")]
        metric: Metric,

        #[clap(long, value_enum, default_value_t = Penalty::Slope, help = "Extra cost for abrupt changes in scalar features.")]
        jump_penalty: Penalty,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Scan references on multiple threads."
        )]
        threading: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Print the full match report as JSON."
        )]
        json: bool,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        short,
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable debug logging."
    )]
    verbose: bool,
}

impl Cli {
    fn validate(&self) {
        let mut cmd = Cli::command();
        match self.command {
            Commands::Pack {
                ref audio,
                ref motion,
                ref histogram,
                ..
            } => {
                if audio.is_none() && motion.is_none() && histogram.is_none() {
                    cmd.error(
                        ErrorKind::MissingRequiredArgument,
                        "at least one of --audio, --motion or --histogram is required",
                    )
                    .exit();
                }
            }
            Commands::Search {
                ref query,
                ref audio_query,
                ref motion_query,
                top_k,
                audio_weight,
                motion_weight,
                ..
            } => {
                if query.is_none() && audio_query.is_none() && motion_query.is_none() {
                    cmd.error(
                        ErrorKind::MissingRequiredArgument,
                        "at least one of --query, --audio-query or --motion-query is required",
                    )
                    .exit();
                }
                if top_k == 0 {
                    cmd.error(ErrorKind::InvalidValue, "top_k must be at least 1")
                        .exit();
                }
                if !(audio_weight >= 0.0 && motion_weight >= 0.0) {
                    cmd.error(
                        ErrorKind::InvalidValue,
                        "fusion weights must be non-negative numbers",
                    )
                    .exit();
                }
            }
        }
    }
}

fn load_text_database(
    library: FeatureLibrary,
    modality: Modality,
    path: Option<&Path>,
) -> haystack::Result<FeatureLibrary> {
    match path {
        Some(path) => {
            let references = text::read_database(path)?;
            tracing::info!(
                %modality,
                references = references.len(),
                "loaded {}",
                path.display()
            );
            library.with_references(modality, references)
        }
        None => Ok(library),
    }
}

fn display_report(report: &MatchReport) {
    for (modality, ranked) in &report.rankings {
        println!("\n{} top matches:", modality);
        if ranked.is_empty() {
            println!("* N/A");
        }
        for (i, c) in ranked.entries().iter().enumerate() {
            println!(
                "{}. {} - {} (distance: {:.4}){}",
                i + 1,
                c.video_id,
                format_offset(c.offset),
                c.distance,
                if c.confident { " [confident]" } else { "" }
            );
        }
    }

    if !report.histogram.is_empty() {
        println!("\nhistogram top matches:");
        for (i, m) in report.histogram.iter().enumerate() {
            println!(
                "{}. {} - {} (similarity: {:.4})",
                i + 1,
                m.video_id,
                format_offset(m.offset),
                m.similarity
            );
        }
    }

    match &report.final_match {
        Some(m) => println!("\nFinal match: {}", m),
        None => println!("\nFinal match: N/A (histogram matches only)"),
    }
}

fn main() -> haystack::Result<()> {
    let args = Cli::parse();
    args.validate();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match args.command {
        Commands::Pack {
            ref audio,
            ref motion,
            ref histogram,
            ref output,
        } => {
            let mut library = match histogram {
                Some(path) => {
                    let source = FeatureLibrary::from_json_path(path)?;
                    FeatureLibrary::new().with_references(
                        Modality::Histogram,
                        source.references(Modality::Histogram).iter().cloned(),
                    )?
                }
                None => FeatureLibrary::new(),
            };
            library = load_text_database(library, Modality::Audio, audio.as_deref())?;
            library = load_text_database(library, Modality::Motion, motion.as_deref())?;
            library.save(output)?;
            tracing::info!("wrote library to {}", output.display());
        }
        Commands::Search {
            ref library,
            ref audio_db,
            ref motion_db,
            ref query,
            ref audio_query,
            ref motion_query,
            top_k,
            ref fusion,
            audio_weight,
            motion_weight,
            ref metric,
            ref jump_penalty,
            threading,
            json,
        } => {
            let mut references = match library {
                Some(path) => FeatureLibrary::from_path(path)?,
                None => FeatureLibrary::new(),
            };
            references = load_text_database(references, Modality::Audio, audio_db.as_deref())?;
            references = load_text_database(references, Modality::Motion, motion_db.as_deref())?;

            let mut query_features = match query {
                Some(path) => QueryFeatures::from_json_path(path)?,
                None => QueryFeatures::new(),
            };
            if let Some(path) = audio_query {
                query_features = query_features.with(Modality::Audio, text::read_sequence(path)?)?;
            }
            if let Some(path) = motion_query {
                query_features =
                    query_features.with(Modality::Motion, text::read_sequence(path)?)?;
            }

            let fusion = match fusion {
                Fusion::Weighted => FusionStrategy::WeightedConfidence(FusionWeights {
                    audio: audio_weight,
                    motion: motion_weight,
                    ..Default::default()
                }),
                Fusion::Agreement => FusionStrategy::Agreement,
            };
            let metric = match metric {
                Metric::ChiSquare => HistogramMetric::ChiSquare,
                Metric::Euclidean => HistogramMetric::Euclidean,
            };
            let jump_penalty = match jump_penalty {
                Penalty::Slope => JumpPenalty::Slope,
                Penalty::Deviation => JumpPenalty::Deviation,
                Penalty::None => JumpPenalty::None,
            };

            let matcher = Matcher::default()
                .with_top_k(top_k)
                .with_fusion(fusion)
                .with_metric(metric)
                .with_jump_penalty(jump_penalty)
                .with_threading(threading);
            let report = matcher.run(&query_features, &references)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                display_report(&report);
            }
        }
    }

    Ok(())
}
