//! Fault-injection instrumentation driver binary.
//!
//! Reads input.yaml next to the source IR file and produces the profiling and
//! fault-injection variants of the program.

use clap::Parser;
use fi_instrument::cli::{init_logging, Cli};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.run() {
        Ok(report) => {
            log::info!("Profiling IR: {}", report.profiling_ir.display());
            log::info!("Fault injection IR: {}", report.fault_injection_ir.display());
            if let Some((profiling, fault_injection)) = &report.executables {
                log::info!("Profiling executable: {}", profiling.display());
                log::info!("Fault injection executable: {}", fault_injection.display());
            }
            log::info!("Success");
        }
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(err.exit_code());
        }
    }
}
