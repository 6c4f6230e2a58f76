use std::io::{BufReader, Write};

use anyhow::{Context, Result};
use log::{debug, error};

use log2dot::Config;

fn _main() -> Result<()> {
    better_panic::install();

    let matches = clap::App::new("log2dot")
        .author("Willi Ballenthin <william.ballenthin@mandiant.com>")
        .about("Converts level 2 BPF verifier log to annotated CFG and outputs it in DOT format.")
        .arg(
            clap::Arg::new("verbose")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .help("log verbose messages"),
        )
        .arg(
            clap::Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("disable informational messages"),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("dot_file")
                .help("Output file path, if omitted output is printed to stdout."),
        )
        .arg(
            clap::Arg::new("colorscheme")
                .long("colorscheme")
                .takes_value(true)
                .default_value("ylorbr8")
                .help("graphviz color scheme used to fill the basic blocks"),
        )
        .arg(
            clap::Arg::new("colors")
                .long("colors")
                .takes_value(true)
                .default_value("4")
                .help("number of colors from the scheme used for execution counts"),
        )
        .arg(
            clap::Arg::new("no-freq-split")
                .long("no-freq-split")
                .action(clap::ArgAction::SetTrue)
                .help("don't end basic blocks where execution counts change"),
        )
        .arg(
            clap::Arg::new("log_file")
                .index(1)
                .help(
                    "Path to verifier log, produced with LOG_LEVEL2, e.g. using `veristat -v -l2 ...`. If omitted, \
                     input is read from stdin.",
                ),
        )
        .get_matches();

    // --quiet overrides --verbose
    let log_level = if matches.is_present("quiet") {
        log::LevelFilter::Error
    } else {
        match matches.occurrences_of("verbose") {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            2 => log::LevelFilter::Trace,
            _ => log::LevelFilter::Trace,
        }
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{:5}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                if log_level == log::LevelFilter::Trace {
                    record.target()
                } else {
                    ""
                },
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()
        .expect("failed to configure logging");

    let config = Config::default()
        .with_split_at_frequency_boundary(!matches.get_flag("no-freq-split"))
        .with_colorscheme(matches.value_of("colorscheme").unwrap())
        .with_colors(matches.value_of_t("colors")?);
    config.validate()?;
    debug!("config: {:?}", config);

    let dot = match matches.value_of("log_file") {
        Some(filename) => {
            debug!("input: {}", filename);
            let f = std::fs::File::open(filename).with_context(|| format!("failed to open {}", filename))?;
            log2dot::log2dot(BufReader::new(f), &config)?
        }
        None => {
            debug!("input: stdin");
            log2dot::log2dot(std::io::stdin().lock(), &config)?
        }
    };

    match matches.value_of("output") {
        Some(filename) => {
            debug!("output: {}", filename);
            std::fs::write(filename, dot).with_context(|| format!("failed to write {}", filename))?;
        }
        None => {
            std::io::stdout().lock().write_all(dot.as_bytes())?;
        }
    }

    Ok(())
}

fn main() {
    if let Err(e) = _main() {
        #[cfg(debug_assertions)]
        error!("{:?}", e);
        #[cfg(not(debug_assertions))]
        error!("{:}", e);
        std::process::exit(1);
    }
}
