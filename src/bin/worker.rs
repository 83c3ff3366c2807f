#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dta_grader::run_worker().await {
        eprintln!("dta-grader worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
