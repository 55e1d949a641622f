use std::{
    error::Error,
    fs,
    io::{self, BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

use dcache_sim::{
    config::Config,
    error::SimError,
    gen,
    memory::BackingStore,
    sim::{RunOptions, Simulation},
    trace::Trace,
};
use log::{error, info, warn};

const USAGE: &str = "\
usage:
  dcache_sim (-p <config.json> | --config <json>) [-r <ram>] [-t <trace>]...
             [--json <out>] [-w <warmup>] [-i <instrs>] [-h <heartbeat>]
             [--queue-size <lines>] [-q]
  dcache_sim gen-ram -o <path> -s <MiB> [--seed <n>]
  dcache_sim gen-trace -o <path> -n <count> --ram-size <bytes> -b <block> [--seed <n>]";

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run().inspect_err(|e| error!("{e}"))
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains("--help") {
        println!("{USAGE}");
        return Ok(());
    }

    match args.subcommand()?.as_deref() {
        Some("gen-ram") => gen_ram(args),
        Some("gen-trace") => gen_trace(args),
        Some(other) => Err(format!("unknown command {other:?}\n{USAGE}").into()),
        None => simulate(args),
    }
}

fn rng(args: &mut pico_args::Arguments) -> Result<fastrand::Rng, pico_args::Error> {
    Ok(match args.opt_value_from_str("--seed")? {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    })
}

fn finish(args: pico_args::Arguments) {
    let rest = args.finish();
    if !rest.is_empty() {
        warn!("ignoring arguments {rest:?}");
    }
}

fn gen_ram(mut args: pico_args::Arguments) -> Result<(), Box<dyn Error>> {
    let out: PathBuf = args.value_from_str("-o")?;
    let mib: u64 = args.value_from_str("-s")?;
    let mut rng = rng(&mut args)?;
    finish(args);

    let mut file = BufWriter::new(fs::File::create(&out)?);
    gen::ram(&mut file, mib * 1024 * 1024, &mut rng)?;
    info!("wrote {mib} MiB to {}", out.display());
    Ok(())
}

fn gen_trace(mut args: pico_args::Arguments) -> Result<(), Box<dyn Error>> {
    let out: PathBuf = args.value_from_str("-o")?;
    let count: usize = args.value_from_str("-n")?;
    let ram_size: u64 = args.value_from_str("--ram-size")?;
    let block_size: usize = args.value_from_str("-b")?;
    let mut rng = rng(&mut args)?;
    finish(args);

    let mut file = BufWriter::new(fs::File::create(&out)?);
    gen::trace(&mut file, count, ram_size, block_size, &mut rng)?;
    info!("wrote {count} instructions to {}", out.display());
    Ok(())
}

fn simulate(mut args: pico_args::Arguments) -> Result<(), Box<dyn Error>> {
    let opts = RunOptions {
        warmup: args.opt_value_from_str("-w")?.unwrap_or(0),
        limit: args.opt_value_from_str("-i")?,
        heartbeat: args.opt_value_from_str("-h")?.unwrap_or(0),
        log_queue: args.opt_value_from_str("--queue-size")?.unwrap_or(1024),
    };
    let quiet = args.contains("-q");
    let stats_path: Option<PathBuf> = args.opt_value_from_str("--json")?;

    let mut config = if let Some(json) = args.opt_value_from_str::<_, String>("--config")? {
        Config::from_json(&json)?
    } else {
        let path: PathBuf = args
            .opt_value_from_str("-p")?
            .ok_or("must provide a config with --config <json> or -p <path>")?;
        Config::read(&path)?
    };
    if let Some(ram) = args.opt_value_from_str("-r")? {
        config.ram = Some(ram);
    }
    let traces: Vec<PathBuf> = args.values_from_str("-t")?;
    if !traces.is_empty() {
        config.traces = traces;
    }
    finish(args);
    config.validate()?;

    let ram = config.ram.clone().unwrap_or_default();
    let store = BackingStore::open(&ram).map_err(|source| SimError::Store {
        path: ram.clone(),
        source,
    })?;
    let traces = config
        .traces
        .iter()
        .map(|path| {
            let trace = Trace::read(path).map_err(|source| SimError::Trace {
                path: path.clone(),
                source,
            })?;
            info!(
                "{}: {} instructions, {} lines skipped",
                path.display(),
                trace.len(),
                trace.skipped
            );
            Ok(trace)
        })
        .collect::<Result<Vec<_>, SimError>>()?;

    let sim = Simulation::new(config.cache.clone(), Arc::new(store))?.with_options(opts);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let reports = sim.run(&traces, |line| {
        if !quiet {
            // A closed stdout is not worth aborting the run for.
            let _ = writeln!(out, "{line}");
        }
    })?;

    writeln!(out)?;
    for report in &reports {
        if report.cancelled {
            writeln!(out, "(cancelled after {} instructions)", report.executed)?;
        }
        writeln!(out, "{}", report.stats)?;
    }
    out.flush()?;

    if let Some(path) = stats_path {
        let stats = reports.iter().map(|r| &r.stats).collect::<Vec<_>>();
        serde_json::to_writer_pretty(fs::File::create(&path)?, &stats)?;
        info!("statistics written to {}", path.display());
    }
    Ok(())
}
