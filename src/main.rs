use std::io::Write;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use jtagscan::cmd;

#[derive(clap::Parser)]
#[clap(
    name = "jtagscan",
    about = "JTAG pin discovery and probing over raw GPIO bit-banging",
    version
)]
enum Cli {
    /// Check the pin set for shorts and crosstalk
    #[clap(name = "check_loopback")]
    CheckLoopback(cmd::loopback::Cmd),
    /// Brute-force pin roles using the BYPASS pattern
    #[clap(name = "scan_bypass")]
    ScanBypass(cmd::bypass::ScanCmd),
    /// Verify known pins using the BYPASS pattern
    #[clap(name = "test_bypass")]
    TestBypass(cmd::bypass::TestCmd),
    /// Brute-force pin roles by reading IDCODEs
    #[clap(name = "scan_idcode")]
    ScanIdcode(cmd::idcode::ScanCmd),
    /// Read and print IDCODEs from known pins
    #[clap(name = "test_idcode")]
    TestIdcode(cmd::idcode::TestCmd),
    /// Dump boundary-scan cells from known pins
    #[clap(name = "boundary_scan")]
    BoundaryScan(cmd::boundary::Cmd),
    /// Enumerate IR opcodes and their DR widths
    #[clap(name = "discover_opcode")]
    DiscoverOpcode(cmd::opcode::Cmd),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = match Cli::parse() {
        Cli::CheckLoopback(cmd) => cmd.run(&mut out),
        Cli::ScanBypass(cmd) => cmd.run(&mut out),
        Cli::TestBypass(cmd) => cmd.run(&mut out),
        Cli::ScanIdcode(cmd) => cmd.run(&mut out),
        Cli::TestIdcode(cmd) => cmd.run(&mut out),
        Cli::BoundaryScan(cmd) => cmd.run(&mut out),
        Cli::DiscoverOpcode(cmd) => cmd.run(&mut out),
    };
    out.flush()?;
    result
}
