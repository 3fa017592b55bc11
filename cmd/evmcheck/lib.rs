pub mod cli;
pub mod initializers;

use evmcheck::{CheckResult, ForkContext, run_checks_with};

use crate::{
    cli::Options,
    initializers::{init_client, init_signer},
};

/// Runs the checks described by `opts`, printing the report to stdout as it
/// is produced. Returns the process exit code.
pub async fn run(opts: &Options) -> eyre::Result<i32> {
    let client = init_client(opts);
    let signer = init_signer(opts);
    let config = opts.check_config();

    let report = run_checks_with(
        &client,
        &signer,
        &config,
        print_context,
        |result: &CheckResult| println!("{result}"),
    )
    .await?;

    println!("{}", report.verdict_line());
    Ok(report.exit_code())
}

fn print_context(context: &ForkContext) {
    println!("Current block: {}", context.current_block);
    println!("Fork block: {}", context.fork_block);
    println!("Pre-fork: {}", context.pre_fork);
}
