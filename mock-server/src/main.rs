use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let upload_port = std::env::var("UPLOAD_PORT").unwrap_or_else(|_| "3001".to_string());
    let upload_token = std::env::var("UPLOAD_TOKEN").unwrap_or_else(|_| "dev-upload-token".to_string());

    let addr = format!("127.0.0.1:{port}");
    let upload_addr = format!("127.0.0.1:{upload_port}");
    let listener = TcpListener::bind(&addr).await?;
    let upload_listener = TcpListener::bind(&upload_addr).await?;
    tracing::info!(%addr, %upload_addr, "mock back office listening");

    tokio::try_join!(
        mock_server::run(listener),
        mock_server::run_upload(upload_listener, upload_token),
    )?;
    Ok(())
}
