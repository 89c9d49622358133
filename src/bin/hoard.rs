use chrono::Local;
use colored::Colorize;
use env_logger::Builder;
use failure::{format_err, Error, ResultExt};
use hoard::{Config, Driver, Filter, GitClone, HttpTransport, Mode, Plan, Summary, TerminalSink};
use log::{debug, log_enabled, LevelFilter};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use structopt::StructOpt;

const DEFAULT_CONFIG: &str = "~/.hoard.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::from_args();

    let outcome = if args.example_config {
        generate_example()
    } else {
        run(&args).await
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);

        for cause in e.iter_causes() {
            eprintln!("\tCaused By: {}", cause);
        }

        process::exit(1);
    }
}

fn generate_example() -> Result<(), Error> {
    let example = Config::example().as_toml()?;
    println!("{}", example);

    Ok(())
}

async fn run(args: &Args) -> Result<(), Error> {
    initialize_logging(args)?;
    let cfg = args.config()?;

    if log_enabled!(log::Level::Debug) {
        for line in format!("{:#?}", cfg).lines() {
            debug!("{}", line);
        }
    }

    let target = args
        .target
        .as_deref()
        .ok_or_else(|| format_err!("No repository URL was provided"))?;

    let verbose = args.verbosity > 0;
    let cloner = GitClone::new(Arc::new(TerminalSink)).verbose(verbose);
    let driver = Driver::new(&cfg, args.filter(), HttpTransport::new(), cloner);

    let target = driver.parse_target(target, args.one)?;
    let plan = driver.plan(&target).await?;
    announce(&plan);

    let summary = driver.execute(&plan).await;

    if verbose {
        println!("result {} ({} succeeded)", target.url, summary.succeeded);
        summary.display(&mut io::stdout())?;
    }

    report(&summary);

    Ok(())
}

fn announce(plan: &Plan) {
    let from = format!(
        "{}{}",
        format!("https://{}/", plan.host).bright_blue(),
        plan.owner.as_deref().unwrap_or_default().bright_green()
    );

    match plan.mode {
        Mode::Listing => {
            println!(
                "Attempting to {} {} repositories from {}",
                "hoard".bright_magenta(),
                plan.items.len().to_string().bright_yellow(),
                from
            );
            let names: Vec<_> = plan.items.iter().map(|item| item.name.as_str()).collect();
            println!("  {}\n", names.join("\n  ").cyan());
        },
        Mode::Direct => {
            println!(
                "Attempting to {} {} repository from {}",
                "hoard".bright_magenta(),
                "one".bright_yellow(),
                from
            );
            for item in &plan.items {
                println!("  {}\n", item.name.cyan());
            }
        },
        Mode::Nothing => {},
    }
}

fn report(summary: &Summary) {
    println!(
        "{} cloned {} repositories successfully.",
        "hoard".bright_magenta(),
        summary.succeeded.to_string().bright_blue()
    );

    if summary.failed() > 0 {
        println!(
            "  {}",
            format!("{} repositories failed to clone.", summary.failed()).bright_yellow()
        );
    }
}

#[derive(Debug, Clone, PartialEq, StructOpt)]
#[structopt(about = "Hoard every repository a user or organisation owns.")]
struct Args {
    #[structopt(help = "A repository URL, or the URL of a user or organisation")]
    target: Option<String>,
    #[structopt(short = "a", long = "all", help = "Clone every repository")]
    all: bool,
    #[structopt(short = "s", long = "sources", help = "Clone repositories which aren't forks (the default)")]
    sources: bool,
    #[structopt(short = "m", long = "mirrors", help = "Clone mirrored repositories")]
    mirrors: bool,
    #[structopt(short = "f", long = "forks", help = "Clone forked repositories")]
    forks: bool,
    #[structopt(
        short = "o",
        long = "one",
        alias = "only",
        help = "Clone the URL itself instead of everything its owner has"
    )]
    one: bool,
    #[structopt(
        short = "d",
        long = "directory",
        parse(from_os_str),
        help = "The directory to put clones in"
    )]
    directory: Option<PathBuf>,
    #[structopt(short = "j", long = "jobs", help = "How many clones to run at once")]
    jobs: Option<usize>,
    #[structopt(
        short = "c",
        long = "config",
        help = "The configuration file to use [default: ~/.hoard.toml]"
    )]
    config_file: Option<String>,
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "Verbose output (repeat for more verbosity)"
    )]
    verbosity: u64,
    #[structopt(long = "example-config", help = "Generate an example config and immediately exit")]
    example_config: bool,
}

impl Args {
    fn filter(&self) -> Filter {
        Filter::resolve(self.all, self.sources, self.mirrors, self.forks)
    }

    fn config(&self) -> Result<Config, Error> {
        let explicit = self.config_file.is_some();
        let config_file = self.config_file.as_deref().unwrap_or(DEFAULT_CONFIG);
        let config_file = shellexpand::full(config_file).context("Unable to expand wildcards")?;
        let config_file = Path::new(&*config_file);

        let mut cfg = if !explicit && !config_file.exists() {
            debug!("No config file found, using the defaults");
            Config::default()
        } else {
            Config::from_file(config_file).context("Couldn't load the config")?
        };

        if let Some(ref dir) = self.directory {
            cfg.general.root = dir.clone();
        }
        if let Some(jobs) = self.jobs {
            cfg.general.concurrency = jobs;
        }

        cfg.validate()?;

        Ok(cfg)
    }
}

fn initialize_logging(args: &Args) -> Result<(), Error> {
    let mut builder = Builder::new();

    let level = match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    builder.filter(Some("hoard"), level);

    if let Ok(filter) = env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }

    builder.format(|out, record| match record.line() {
        Some(line) => writeln!(
            out,
            "{} [{:5}] ({}#{}): {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            line,
            record.args()
        ),
        None => writeln!(
            out,
            "{} [{:5}] ({}): {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        ),
    });

    builder.try_init()?;

    Ok(())
}
