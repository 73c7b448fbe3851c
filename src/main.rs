#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_assist::run().await {
        eprintln!("exam-assist fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
