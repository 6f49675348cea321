use super::Store;
use std::time::Duration;

pub fn run(
    store: &Store,
    port: u16,
    cron_secret: Option<String>,
    sweep_interval_secs: u64,
) -> anyhow::Result<()> {
    let config = presence_server::ServerConfig {
        cron_secret,
        sweep_interval: (sweep_interval_secs > 0).then(|| Duration::from_secs(sweep_interval_secs)),
        ..store.server_config()
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual = listener.local_addr()?.port();
        println!("presence server on http://localhost:{actual}");
        presence_server::serve_on(listener, config).await
    })
}
