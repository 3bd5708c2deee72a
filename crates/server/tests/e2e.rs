use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;

mod support;
use support::{build_app, seed_app, seed_team, FakeProvisioner};

const OPS: &str = "ops@example.com";

struct RunningServer {
    base_url: String,
}

async fn start_server(app: axum::Router) -> anyhow::Result<RunningServer> {
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("server error: {}", e); }
    });
    Ok(RunningServer { base_url: format!("http://{}:{}", addr.ip(), addr.port()) })
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("reqwest client")
}

#[tokio::test]
async fn e2e_public_health() -> anyhow::Result<()> {
    let app = build_app().await?;
    let server = start_server(app.router.clone()).await?;
    let res = client().get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status().as_u16(), StatusCode::OK.as_u16());
    let body: serde_json::Value = res.json().await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn e2e_bind_injects_configuration() -> anyhow::Result<()> {
    let provisioner = FakeProvisioner::start(StatusCode::OK, r#"{"DATABASE_HOST":"10.0.0.5"}"#).await?;
    let app = build_app().await?;
    seed_team(&app.store, "ops", &[OPS]).await?;
    seed_app(&app.store, "painkiller", &["ops"], &["10.1.1.1"]).await?;
    let server = start_server(app.router.clone()).await?;
    let http = client();

    let res = http
        .post(format!("{}/services", server.base_url))
        .header("x-user-email", OPS)
        .json(&json!({"id": "mysql", "endpoint": {"production": provisioner.url()}}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 201);
    let res = http
        .post(format!("{}/instances", server.base_url))
        .header("x-user-email", OPS)
        .json(&json!({"name": "my-mysql", "service_name": "mysql"}))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 201);

    let res = http
        .put(format!("{}/instances/my-mysql/apps/painkiller", server.base_url))
        .header("x-user-email", OPS)
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 200);

    use service::repository::EntityStore;
    let stored = app.store.get_app("painkiller").await?.expect("app");
    let host = stored.env.get("DATABASE_HOST").expect("injected");
    assert_eq!(host.value, "10.0.0.5");
    assert_eq!(host.instance_name, "my-mysql");
    assert!(!host.public);
    assert_eq!(provisioner.calls().len(), 1);
    Ok(())
}
