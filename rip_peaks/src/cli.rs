use std::{num::NonZeroUsize, path::PathBuf};

use clap::{
    crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, Command,
};

use anyhow::Context;

use utils::{init_log, LogLevel};

use crate::{
    config::{Config, PAdjust},
    genome::read_genome_file,
};

/// Set up definition of command options for clap
fn cli_model() -> Command {
    Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("warn")
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .help("Silence all output"),
        )
        .arg(
            Arg::new("sample")
                .short('m')
                .long("sample")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Aligned reads (SAM) for the IP sample"),
        )
        .arg(
            Arg::new("control")
                .short('c')
                .long("control")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Aligned reads (SAM) for the matched control"),
        )
        .arg(
            Arg::new("genome_sizes")
                .short('g')
                .long("genome-sizes")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Chromosome size table (name<TAB>length)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output-file")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Set output file [default: <stdout>]"),
        )
        .arg(
            Arg::new("genes")
                .short('r')
                .long("genes")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Gene models (BED12) used to derive splice junctions"),
        )
        .arg(
            Arg::new("junctions")
                .short('j')
                .long("junctions")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Splice junction calls (STAR SJ.out.tab layout)"),
        )
        .arg(
            Arg::new("junctions_min_coverage")
                .short('k')
                .long("junctions-min-coverage")
                .value_parser(value_parser!(u32))
                .value_name("INT")
                .default_value("5")
                .help("Minimum read coverage for a junction call"),
        )
        .arg(
            Arg::new("window_size")
                .short('w')
                .long("window-size")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .default_value("25")
                .help("Window size in base pairs"),
        )
        .arg(
            Arg::new("step_size")
                .short('s')
                .long("step-size")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .help("Window step size in base pairs [default: window size]"),
        )
        .arg(
            Arg::new("min_window")
                .short('n')
                .long("min-window")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .default_value("100")
                .help("Drop merged windows smaller than this size"),
        )
        .arg(
            Arg::new("alpha")
                .short('a')
                .long("alpha")
                .value_parser(value_parser!(f64))
                .value_name("FLOAT")
                .default_value("0.05")
                .help("p-value significance threshold"),
        )
        .arg(
            Arg::new("p_adjust")
                .short('p')
                .long("p-adjust")
                .value_parser(value_parser!(PAdjust))
                .ignore_case(true)
                .value_name("none|Bonferroni|BenjaminiHochberg")
                .default_value("BenjaminiHochberg")
                .help("p-value adjustment method"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .default_value("1")
                .help("Number of worker threads"),
        )
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m);

    debug!("Processing command line options");

    let genome = read_genome_file(
        m.get_one::<PathBuf>("genome_sizes")
            .expect("Missing genome size file"),
    )
    .with_context(|| "Could not read genome size table")?;

    let window_size = usize::from(*m.get_one::<NonZeroUsize>("window_size").unwrap());
    let step_size = m
        .get_one::<NonZeroUsize>("step_size")
        .map(|x| usize::from(*x))
        .unwrap_or(window_size);

    if step_size > window_size {
        warn!(
            "Computing windows with step size {} > window size {}. \
             Windows are not overlapping or book-ended!",
            step_size, window_size
        );
    }

    let n_tasks = usize::from(*m.get_one::<NonZeroUsize>("threads").unwrap())
        .min(num_cpus::get().max(1));

    Ok(Config::new(
        m.get_one::<PathBuf>("sample").expect("Missing sample file").clone(),
        m.get_one::<PathBuf>("control")
            .expect("Missing control file")
            .clone(),
        m.get_one::<PathBuf>("genes").cloned(),
        m.get_one::<PathBuf>("junctions").cloned(),
        m.get_one::<PathBuf>("output").cloned(),
        genome,
        window_size,
        step_size,
        usize::from(*m.get_one::<NonZeroUsize>("min_window").unwrap()),
        *m.get_one::<u32>("junctions_min_coverage").unwrap(),
        *m.get_one::<f64>("alpha").unwrap(),
        *m.get_one::<PAdjust>("p_adjust").unwrap(),
        n_tasks,
    ))
}
