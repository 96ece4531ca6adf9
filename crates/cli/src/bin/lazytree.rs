use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    lazytree_cli::main_entry().await
}
