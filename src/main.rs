#[tokio::main]
async fn main() {
    fotowand::start_server().await;
}
