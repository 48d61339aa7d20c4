//! dwd-backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    dwd_backend::run().await;
}
