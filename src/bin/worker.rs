#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_assist::run_worker().await {
        eprintln!("exam-assist worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
