use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use lefvm::{load_program, HeapConfig, Vm, VmConfig};

#[derive(Parser)]
#[command(name = "lefrun")]
#[command(about = "Run a LEF program image")]
#[command(version)]
struct Cli {
    /// The .lef image to execute
    image: PathBuf,

    /// Base capacity of the pair and list pools
    #[arg(long, default_value_t = 512)]
    pool_size: usize,

    /// Growth cap multiplier over each pool's base capacity
    #[arg(long, default_value_t = 4)]
    pool_growth: usize,

    /// Mark objects reachable from globals permanent before printing stats
    #[arg(long)]
    seal_globals: bool,

    /// Print garbage-collector statistics after the run
    #[arg(long)]
    gc_stats: bool,

    /// Disassemble the program segment instead of running it
    #[arg(long)]
    disasm: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let bytes = match std::fs::read(&cli.image) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("lefrun: cannot read {}: {}", cli.image.display(), e);
            return ExitCode::from(2);
        }
    };

    // Loader errors are recoverable: report and hand control back to the
    // shell that invoked us.
    let image = match load_program(&bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("lefrun: {}: {}", cli.image.display(), e);
            return ExitCode::from(2);
        }
    };

    if cli.disasm {
        print!("{}", lefvm::code::disassemble(&image.code));
        return ExitCode::SUCCESS;
    }

    let config = VmConfig {
        heap: HeapConfig {
            pairs_base: cli.pool_size,
            lists_base: cli.pool_size,
            growth: cli.pool_growth,
            ..HeapConfig::default()
        },
        ..VmConfig::default()
    };

    let mut vm = Vm::new(image, config);
    match vm.run() {
        Ok(result) => {
            if cli.seal_globals {
                vm.seal_globals();
            }
            println!("{}", vm.render(result));
            if cli.gc_stats {
                eprintln!("{}", vm.heap().stats);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            // A fatal VM error halts the whole machine; on the real target
            // this is where the device would restart.
            eprintln!("lefrun: vm halted: {}", e);
            ExitCode::FAILURE
        }
    }
}
