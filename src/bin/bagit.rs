use std::path::PathBuf;
use std::process::ExitCode;

use ansi_term::Colour::{Green, Red};
use clap::AppSettings::UseLongFormatForHelpSubcommand;
use clap::{Args, Parser, Subcommand};
use log::{error, LevelFilter};

use bagit::bagit::{
    create_bag, open_bag, validate_bag, BagInfo, DigestAlgorithm, Mode, ValidateOptions,
    ValidationVerdict,
};

/// A CLI for creating, loading, and validating BagIt bags
#[derive(Debug, Parser)]
#[clap(name = "bagit", author = "Peter Winckles <pwinckles@pm.me>", version)]
#[clap(setting(UseLongFormatForHelpSubcommand))]
pub struct BagitArgs {
    /// Absolute or relative path to the bag's base directory
    ///
    /// By default, this is the current directory.
    #[clap(short, long, value_name = "BAG_PATH", global = true)]
    pub bag_path: Option<PathBuf>,

    /// Suppress error messages and other command specific logging
    #[clap(short, long, global = true)]
    pub quiet: bool,

    /// Increase log level
    #[clap(short = 'V', long, global = true)]
    pub verbose: bool,

    /// Disable all output styling
    #[clap(short = 'S', long, global = true)]
    pub no_styles: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[clap(subcommand)]
    Bag(BagCmd),
}

#[derive(Subcommand, Debug)]
pub enum BagCmd {
    /// Bag up the contents of the bag directory in place
    Create(CreateArgs),
    /// Check a bag's structure and, by default, its checksums
    Validate(ValidateArgs),
    /// Recalculate an existing bag's manifests and re-declare its tag files
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Digest algorithm to use; may be repeated. Defaults to sha512.
    #[clap(short, long = "algorithm", value_name = "ALGORITHM")]
    pub algorithms: Vec<String>,

    /// bag-info.txt tag to add, formatted as LABEL=VALUE; may be repeated
    #[clap(short, long = "tag", value_name = "LABEL=VALUE")]
    pub tags: Vec<String>,

    /// Number of worker threads to use while hashing payload files
    #[clap(short = 'j', long, default_value = "1")]
    pub processes: usize,

    /// Include dotfiles in the payload
    #[clap(long)]
    pub hidden: bool,

    /// Refresh an existing bag's manifests and tag files instead of creating
    /// a new bag out of loose files
    #[clap(long)]
    pub rebag: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Only check the bag's structure; skip recalculating checksums
    #[clap(long)]
    pub no_fixity: bool,

    /// Only check the declared Payload-Oxum against the payload on disk;
    /// skips every other check, including fixity
    #[clap(long)]
    pub fast: bool,

    /// Number of worker threads to use while verifying checksums
    #[clap(short = 'j', long, default_value = "1")]
    pub processes: usize,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Digest algorithm to use; may be repeated. Defaults to the algorithms
    /// already in use by the bag's manifests.
    #[clap(short, long = "algorithm", value_name = "ALGORITHM")]
    pub algorithms: Vec<String>,

    /// bag-info.txt tag to add, formatted as LABEL=VALUE; may be repeated
    #[clap(short, long = "tag", value_name = "LABEL=VALUE")]
    pub tags: Vec<String>,

    /// Number of worker threads to use while hashing payload files
    #[clap(short = 'j', long, default_value = "1")]
    pub processes: usize,

    /// Leave the existing payload manifests alone; only re-declare tag files
    /// and regenerate tagmanifests
    #[clap(long)]
    pub no_recalculate: bool,
}

fn main() -> ExitCode {
    let mut args = BagitArgs::parse();

    let log_level = if args.quiet {
        LevelFilter::Off
    } else if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::builder()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    if atty::isnt(atty::Stream::Stdout) {
        args.no_styles = true;
    }

    let bag_path = args.bag_path.unwrap_or_else(|| PathBuf::from("."));

    let result = match args.command {
        Command::Bag(BagCmd::Create(create_args)) => run_create(&bag_path, create_args),
        Command::Bag(BagCmd::Validate(validate_args)) => {
            run_validate(&bag_path, validate_args, args.no_styles)
        }
        Command::Bag(BagCmd::Update(update_args)) => run_update(&bag_path, update_args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            print_error(&message, args.no_styles);
            ExitCode::FAILURE
        }
    }
}

fn run_create(bag_path: &PathBuf, create_args: CreateArgs) -> Result<(), String> {
    let bag_info = parse_tags(&create_args.tags)?;
    let algorithms = parse_algorithms(&create_args.algorithms)?;
    let mode = if create_args.rebag {
        Mode::Rebag
    } else {
        Mode::Create
    };

    create_bag(
        bag_path,
        bag_path,
        bag_info,
        &algorithms,
        create_args.hidden,
        create_args.processes,
        mode,
    )
    .map_err(|e| e.to_string())?;

    Ok(())
}

fn run_validate(bag_path: &PathBuf, validate_args: ValidateArgs, no_styles: bool) -> Result<(), String> {
    let options = ValidateOptions::new()
        .with_integrity_check(!validate_args.no_fixity)
        .with_fast(validate_args.fast)
        .with_processes(validate_args.processes);

    let result = validate_bag(bag_path, options).map_err(|e| e.to_string())?;

    for detail in result.details() {
        error!("{detail}");
    }

    match result.verdict() {
        ValidationVerdict::Valid => {
            println!("{}", style("bag is valid", Green, no_styles));
            Ok(())
        }
        ValidationVerdict::Complete => {
            println!("{}", style("bag is complete", Green, no_styles));
            Ok(())
        }
        ValidationVerdict::Invalid => Err(format!(
            "bag is invalid: {} issue(s) found",
            result.details().len()
        )),
    }
}

fn run_update(bag_path: &PathBuf, update_args: UpdateArgs) -> Result<(), String> {
    let bag = open_bag(bag_path).map_err(|e| e.to_string())?;
    let algorithms = parse_algorithms(&update_args.algorithms)?;

    let mut updater = bag
        .update()
        .with_algorithms(&algorithms)
        .with_processes(update_args.processes)
        .recalculate_payload_manifests(!update_args.no_recalculate);

    for tag in &update_args.tags {
        let (label, value) = split_tag(tag)?;
        updater = updater.with_tag(label, value).map_err(|e| e.to_string())?;
    }

    updater.finalize().map_err(|e| e.to_string())?;
    Ok(())
}

fn parse_algorithms(values: &[String]) -> Result<Vec<DigestAlgorithm>, String> {
    values
        .iter()
        .map(|v| DigestAlgorithm::try_from(v.as_str()).map_err(|_| format!("unsupported digest algorithm '{v}'")))
        .collect()
}

fn parse_tags(tags: &[String]) -> Result<BagInfo, String> {
    let mut bag_info = BagInfo::new();
    for tag in tags {
        let (label, value) = split_tag(tag)?;
        bag_info.add(label, value).map_err(|e| e.to_string())?;
    }
    Ok(bag_info)
}

fn split_tag(tag: &str) -> Result<(String, String), String> {
    tag.split_once('=')
        .map(|(label, value)| (label.to_string(), value.to_string()))
        .ok_or_else(|| format!("tag '{tag}' is not formatted as LABEL=VALUE"))
}

fn print_error(message: &str, no_styles: bool) {
    eprintln!("{}: {message}", style("error", Red, no_styles));
}

fn style(text: &str, colour: ansi_term::Colour, no_styles: bool) -> String {
    if no_styles {
        text.to_string()
    } else {
        colour.paint(text).to_string()
    }
}
