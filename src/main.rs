#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quorum_node::node::run_cli().await
}
