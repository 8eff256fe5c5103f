use clap::Parser;
use std::error::Error;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;
use std::{process, thread};
use turasm::{AsmStatus, EngineConfig, ProgramLoader, RunOutcome, Snapshot, TuringMachine};

/// Runs a compiled Turing machine program and prints the result.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(after_help = "EXAMPLES:
  turasm-cli demos/increment.tm
  turasm-cli --speed 1000 --breakpoint 1 demos/increment.tm
  turasm-cli --unthrottled --max-steps 50000000 program.tm
  cat program.tm | turasm-cli --json")]
struct Cli {
    /// The program file to execute. Read from stdin when omitted.
    program: Option<PathBuf>,

    /// TOML file overriding the engine defaults
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Ticks per second. The maximum speed runs a burst of steps per tick
    #[clap(short, long)]
    speed: Option<u32>,

    /// Toggle a breakpoint on the assembly line with this index (repeatable)
    #[clap(short, long = "breakpoint")]
    breakpoints: Vec<usize>,

    /// Print the machine after every tick
    #[clap(short = 'd', long)]
    debug: bool,

    /// Print the final snapshot as JSON
    #[clap(long)]
    json: bool,

    /// Give up after this many ticks
    #[clap(long, default_value_t = 1_000_000)]
    max_ticks: usize,

    /// Run to completion without a timer, then report the elapsed time
    #[clap(short, long)]
    unthrottled: bool,

    /// Step budget of an unthrottled run. Overrides the configured `max_steps`
    #[clap(long)]
    max_steps: Option<usize>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Loads and runs the program. Returns `false` if the machine stopped on an error.
fn run(cli: &Cli) -> Result<bool, Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let mut machine = TuringMachine::with_config(config);
    machine.load(&read_program(cli)?)?;

    if let Some(speed) = cli.speed {
        machine.set_speed(speed)?;
    }
    for &index in &cli.breakpoints {
        machine.set_breakpoint(index)?;
    }

    if cli.debug {
        machine.subscribe(print_state);
    }

    if cli.unthrottled {
        run_unthrottled(cli, &mut machine)?;
    } else {
        run_timed(cli, &mut machine);
    }

    let snapshot = machine.snapshot();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_summary(&snapshot);
    }

    Ok(snapshot.error.is_none())
}

/// Sleeps one task period between ticks until the machine pauses itself.
fn run_timed(cli: &Cli, machine: &mut TuringMachine) {
    let mut ticks = 0;
    let mut task = machine.run();
    while let Some(t) = task {
        if ticks >= cli.max_ticks {
            log::warn!("stopping after {} ticks", ticks);
            machine.pause();
            break;
        }

        thread::sleep(t.period());
        machine.tick(t);
        ticks += 1;
        task = machine.task();
    }
}

fn run_unthrottled(cli: &Cli, machine: &mut TuringMachine) -> Result<(), Box<dyn Error>> {
    let max_steps = cli.max_steps.unwrap_or(machine.config().max_steps);

    let start = Instant::now();
    let outcome = machine.run_to_completion(max_steps)?;
    let elapsed = start.elapsed();

    let report = format!("Program took {:?} ({} steps)", elapsed, machine.step_count());
    // Keep stdout parseable in JSON mode.
    if cli.json {
        eprintln!("{report}");
    } else {
        println!("{report}");
    }

    match outcome {
        RunOutcome::StepLimit => eprintln!("Step limit of {max_steps} reached before halting"),
        RunOutcome::Breakpoint => eprintln!("Stopped at a breakpoint"),
        RunOutcome::Halted | RunOutcome::Error => {}
    }

    Ok(())
}

/// Reads the program from the given file, or from stdin when it is piped.
fn read_program(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if let Some(path) = &cli.program {
        Ok(ProgramLoader::read_program(path)?)
    } else if atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Err("no program file given and nothing piped to stdin".into())
    }
}

fn print_state(snapshot: &Snapshot) {
    println!(
        "Step: {}, State: {}, Tape: [{}], Head: {}",
        snapshot.step_count,
        snapshot.state,
        format_tape(snapshot),
        snapshot.head
    );
}

fn format_tape(snapshot: &Snapshot) -> String {
    snapshot
        .tape
        .iter()
        .enumerate()
        .map(|(i, symbol)| {
            if i == snapshot.head {
                format!("[{symbol}]")
            } else {
                symbol.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_summary(snapshot: &Snapshot) {
    println!("State: {} ({} steps)", snapshot.state, snapshot.step_count);
    println!("Tape: {}", format_tape(snapshot));

    if !snapshot.sections.is_empty() {
        println!("\nSections:");
        for section in &snapshot.sections {
            println!(
                "  {:<4} {:>4}..={:<4} {}",
                section.name, section.start, section.end, section.value
            );
        }
    }

    if !snapshot.assembly.is_empty() {
        println!("\nAssembly:");
        for (i, line) in snapshot.assembly.iter().enumerate() {
            let marker = match line.status {
                AsmStatus::Completed => "x",
                AsmStatus::Current => ">",
                AsmStatus::Pending => " ",
            };
            let breakpoint = if line.breakpoint { "*" } else { " " };
            println!("  {i:>3} [{marker}]{breakpoint} {}", line.text);
        }
    }

    if let Some(error) = &snapshot.error {
        println!("\nMachine error: {}", error);
    }

    println!("\nOutput: {}", snapshot.output);
}
