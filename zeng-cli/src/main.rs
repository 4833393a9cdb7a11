#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zeng_cli::run_app().await
}
