// src/main.rs

use fragrun::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(success) => {
            if !success {
                std::process::exit(2);
            }
        }
        Err(err) => {
            eprintln!("fragrun error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let report = run(args).await?;

    if let Some(message) = &report.message {
        eprintln!("fragrun: {message}");
    }
    Ok(report.closeout.is_success())
}
