use clap::{Parser, error::ErrorKind};
use evmcheck_cli::{cli::Options, initializers::init_tracing, run};

fn parse_options() -> Options {
    match Options::try_parse() {
        Ok(opts) => opts,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let opts = parse_options();

    if let Err(err) = init_tracing(&opts) {
        eprintln!("Failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let code = match run(&opts).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    };
    std::process::exit(code);
}
