mod host;
mod sim;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
