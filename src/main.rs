#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dta_grader::run().await {
        eprintln!("dta-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
