//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock news sites and run whole crawls
//! against them end-to-end.

use news_harvest::config::{parse_config, Config};
use news_harvest::storage::{RunStatus, SqliteStorage, Storage};
use news_harvest::{run_with_shutdown, HarvestError, RunMode, RunTarget};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Source table for a site served by `server`
fn source_toml(id: &str, server: &MockServer) -> String {
    format!(
        r#"
[[source]]
id = "{id}"
base-url = "{uri}/"
delay-seconds = 0
max-pages = 20
max-workers = 3
"#,
        id = id,
        uri = server.uri()
    )
}

/// Builds a validated config writing everything under `dir`
fn test_config(dir: &Path, sources: &[String]) -> Config {
    let toml = format!(
        r#"
[run]
state-path = "{state}"
database-path = "{db}"
export-dir = "{exports}"
flush-every = 1
inter-source-delay-seconds = 0
incremental-days = 0

[fetcher]
max-retries = 1
timeout-seconds = 5
rate-limit-base-seconds = 0
backoff-unit-seconds = 0

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/bot"
{sources}
"#,
        state = dir.join("state").join("processed.txt").display(),
        db = dir.join("news.db").display(),
        exports = dir.join("exports").display(),
        sources = sources.join("\n")
    );
    parse_config(&toml).expect("test config should be valid")
}

fn listing(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<li><a href="{}">enlace</a></li>"#, href))
        .collect();
    format!(
        "<html><head><title>Portada</title></head><body><ul>{}</ul></body></html>",
        anchors
    )
}

fn article(title: &str, body: &str) -> String {
    format!(
        r#"<html>
<head>
  <title>{title} | Diario</title>
  <meta property="article:published_time" content="2024-03-15T10:30:00-03:00">
  <meta name="description" content="Resumen de {title}">
</head>
<body>
  <ul class="breadcrumb">
    <li><a href="/">Inicio</a></li>
    <li><a href="/categoria/region/">Región</a></li>
    <li>{title}</li>
  </ul>
  <h1 class="entry-title">{title}</h1>
  <span class="author">Por María López</span>
  <div class="entry-content">
    <p>{body}</p>
    <div class="share">Compartir en redes</div>
    <p>Segundo párrafo del artículo con algo más de texto para el cuerpo.</p>
    <a href="/2024/03/10/nota-vieja/">Nota relacionada</a>
  </div>
</body>
</html>"#,
        title = title,
        body = body
    )
}

async fn mount_html(server: &MockServer, route: &str, html: String, expected_hits: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"));
    let mock = match expected_hits {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

/// Home links an article and a pagination page; the pagination page links
/// the same article again, a second article, and back home.
async fn mount_news_site(server: &MockServer, article_hits: Option<u64>) {
    mount_html(
        server,
        "/",
        listing(&["/2024/03/15/nota-uno/", "/page/2/", "/wp-admin/", "/"]),
        None,
    )
    .await;
    mount_html(
        server,
        "/page/2/",
        listing(&["/2024/03/15/nota-uno/", "/2024/03/14/nota-dos/", "/"]),
        None,
    )
    .await;
    mount_html(
        server,
        "/2024/03/15/nota-uno/",
        article(
            "Nota uno",
            "El primer artículo tiene un párrafo inicial bastante largo para superar el mínimo.",
        ),
        article_hits,
    )
    .await;
    mount_html(
        server,
        "/2024/03/14/nota-dos/",
        article(
            "Nota dos",
            "El segundo artículo también trae un párrafo inicial largo con contenido propio.",
        ),
        article_hits,
    )
    .await;
}

fn open_db(dir: &Path) -> SqliteStorage {
    SqliteStorage::new(&dir.join("news.db")).expect("database should open")
}

#[tokio::test]
async fn test_crawl_stores_each_article_once() {
    let server = MockServer::start().await;
    mount_news_site(&server, Some(1)).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[source_toml("diario", &server)]);
    let (_tx, rx) = watch::channel(false);

    let result = run_with_shutdown(
        &config,
        RunTarget::Source("diario".to_string()),
        RunMode::Incremental,
        rx,
    )
    .await
    .expect("run should succeed");

    assert!(!result.interrupted);
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.per_source_counts().get("diario"), Some(&2));

    let stats = &result.per_source["diario"];
    assert_eq!(stats.articles_extracted, 2);
    assert_eq!(stats.discovery_pages, 2);
    assert_eq!(stats.rejected, 0);

    let storage = open_db(dir.path());
    assert_eq!(storage.count_articles().unwrap(), 2);

    let uno_url = format!("{}/2024/03/15/nota-uno/", server.uri());
    let uno = storage.get_article(&uno_url).unwrap().expect("article stored");
    assert_eq!(uno.title, "Nota uno");
    assert_eq!(uno.published_date, "2024-03-15");
    assert_eq!(uno.published_time, "10:30:00");
    assert_eq!(uno.summary, "Resumen de Nota uno");
    assert_eq!(uno.author, "María López");
    assert_eq!(uno.category, "Región");
    assert_eq!(uno.source_id, "diario");
    assert!(!uno.body.contains("Compartir"));

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.mode, "incremental");
    assert_eq!(run.inserted, 2);
    assert_eq!(run.config_hash, config.fingerprint);

    let index = std::fs::read_to_string(dir.path().join("state").join("processed.txt")).unwrap();
    assert!(index.lines().any(|line| line.starts_with(&uno_url)));
    assert_eq!(index.lines().count(), 2);
}

#[tokio::test]
async fn test_second_run_inserts_nothing_and_skips_known_articles() {
    let server = MockServer::start().await;
    // Article pages are fetched by the first run only
    mount_news_site(&server, Some(1)).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[source_toml("diario", &server)]);
    let (_tx, rx) = watch::channel(false);

    let first = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx.clone())
        .await
        .unwrap();
    assert_eq!(first.inserted_count, 2);

    let second = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx)
        .await
        .unwrap();
    assert_eq!(second.inserted_count, 0);
    assert_eq!(second.per_source["diario"].skipped_processed, 2);
    assert_eq!(open_db(dir.path()).count_articles().unwrap(), 2);

    // Only the first run had records of its own to export
    let exports = export_names(dir.path());
    let per_source: Vec<&String> = exports
        .iter()
        .filter(|name| name.starts_with("diario_"))
        .collect();
    assert_eq!(per_source.len(), 2);
    assert!(per_source.iter().any(|name| name.ends_with(".csv")));
    assert!(per_source.iter().any(|name| name.ends_with(".json")));
}

fn export_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir.join("exports"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn find_export(dir: &Path, prefix: &str, extension: &str) -> std::path::PathBuf {
    let name = export_names(dir)
        .into_iter()
        .find(|name| name.starts_with(prefix) && name.ends_with(extension))
        .unwrap_or_else(|| panic!("no {}*{} export", prefix, extension));
    dir.join("exports").join(name)
}

#[tokio::test]
async fn test_csv_export_header() {
    let server = MockServer::start().await;
    mount_news_site(&server, None).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[source_toml("diario", &server)]);
    let (_tx, rx) = watch::channel(false);

    run_with_shutdown(
        &config,
        RunTarget::Source("diario".to_string()),
        RunMode::Incremental,
        rx,
    )
    .await
    .unwrap();

    let csv_text = std::fs::read_to_string(find_export(dir.path(), "diario_", ".csv")).unwrap();
    assert_eq!(
        csv_text.lines().next().unwrap(),
        "title,date,time,summary,body,category,author,tags,url,extraction_timestamp,image_urls,source_id"
    );
    assert_eq!(csv_text.lines().count(), 3);

    // Single-source runs write no consolidated export
    assert!(!export_names(dir.path())
        .iter()
        .any(|name| name.starts_with("consolidated_")));
}

#[tokio::test]
async fn test_all_sources_run_writes_consolidated_export() {
    let primero = MockServer::start().await;
    mount_news_site(&primero, None).await;
    let segundo = MockServer::start().await;
    mount_html(&segundo, "/", listing(&["/2024/03/15/cronica/"]), None).await;
    mount_html(
        &segundo,
        "/2024/03/15/cronica/",
        article(
            "Crónica",
            "La crónica del segundo diario cuenta con un párrafo inicial propio y extenso.",
        ),
        None,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        &[source_toml("primero", &primero), source_toml("segundo", &segundo)],
    );
    let (_tx, rx) = watch::channel(false);

    let result = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx)
        .await
        .unwrap();
    assert_eq!(result.inserted_count, 3);

    let json_path = find_export(dir.path(), "consolidated_", ".json");
    let records: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(records.len(), 3);
    let from_second = records
        .iter()
        .filter(|record| record["source_id"] == "segundo")
        .count();
    assert_eq!(from_second, 1);

    let csv_text =
        std::fs::read_to_string(find_export(dir.path(), "consolidated_", ".csv")).unwrap();
    assert_eq!(csv_text.lines().count(), 4);
}

#[tokio::test]
async fn test_unknown_source_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[source_toml("diario", &server)]);
    let (_tx, rx) = watch::channel(false);

    let result = run_with_shutdown(
        &config,
        RunTarget::Source("inexistente".to_string()),
        RunMode::Full,
        rx,
    )
    .await;

    assert!(matches!(result, Err(HarvestError::UnknownSource(id)) if id == "inexistente"));
}

#[tokio::test]
async fn test_failing_source_does_not_stop_the_next_one() {
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    mount_news_site(&healthy, None).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        &[source_toml("caido", &broken), source_toml("sano", &healthy)],
    );
    let (_tx, rx) = watch::channel(false);

    let result = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx)
        .await
        .unwrap();

    assert_eq!(result.per_source["caido"].inserted, 0);
    assert_eq!(result.per_source["caido"].fetch_failed, 1);
    assert_eq!(result.per_source["sano"].inserted, 2);
    assert_eq!(result.inserted_count, 2);

    let counts = open_db(dir.path()).count_by_source().unwrap();
    assert_eq!(counts.get("sano"), Some(&2));
    assert_eq!(counts.get("caido"), None);
}

#[tokio::test]
async fn test_same_content_under_two_urls_is_stored_once() {
    let server = MockServer::start().await;
    let body = "Un mismo texto publicado bajo dos direcciones distintas del mismo sitio.";
    mount_html(
        &server,
        "/",
        listing(&["/2024/03/15/nota-original/", "/2024/03/15/nota-copia/"]),
        None,
    )
    .await;
    mount_html(&server, "/2024/03/15/nota-original/", article("Repetida", body), None).await;
    mount_html(&server, "/2024/03/15/nota-copia/", article("Repetida", body), None).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[source_toml("diario", &server)]);
    let (_tx, rx) = watch::channel(false);

    let result = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx)
        .await
        .unwrap();

    let stats = &result.per_source["diario"];
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicate_content, 1);
    assert_eq!(open_db(dir.path()).count_articles().unwrap(), 1);

    // Both URLs are remembered, so neither is fetched again
    let index = std::fs::read_to_string(dir.path().join("state").join("processed.txt")).unwrap();
    assert_eq!(index.lines().count(), 2);
}

#[tokio::test]
async fn test_interrupt_before_start_records_interrupted_run() {
    let server = MockServer::start().await;
    mount_news_site(&server, Some(0)).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[source_toml("diario", &server)]);
    let (_tx, rx) = watch::channel(true);

    let result = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx)
        .await
        .unwrap();

    assert!(result.interrupted);
    assert_eq!(result.inserted_count, 0);

    let run = open_db(dir.path()).get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_interrupt_mid_batch_abandons_in_flight_fetches() {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=8)
        .map(|i| format!("/2024/03/15/nota-{}/", i))
        .collect();
    let hrefs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_html(&server, "/", listing(&hrefs), None).await;
    for (i, link) in links.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(link.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(
                        article(
                            &format!("Nota {}", i + 1),
                            "Un párrafo inicial suficientemente largo para que la nota sea aceptada.",
                        ),
                        "text/html; charset=utf-8",
                    )
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let source = source_toml("diario", &server).replace("max-workers = 3", "max-workers = 1");
    let config = test_config(dir.path(), &[source]);
    let (tx, rx) = watch::channel(false);

    let interrupter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();
        Instant::now()
    });

    let result = run_with_shutdown(&config, RunTarget::All, RunMode::Incremental, rx)
        .await
        .unwrap();
    let finished = Instant::now();
    let interrupted_at = interrupter.await.unwrap();

    assert!(result.interrupted);
    assert_eq!(result.inserted_count, 0);
    let stats = &result.per_source["diario"];
    assert_eq!(stats.discovery_pages, 1);
    assert_eq!(stats.abandoned, 1);
    assert!(finished.duration_since(interrupted_at) < Duration::from_secs(2));

    // Only the first article of the batch was ever requested
    let article_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path().starts_with("/2024/"))
        .count();
    assert_eq!(article_requests, 1);

    let run = open_db(dir.path()).get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    assert!(!dir.path().join("state").join("processed.txt").exists());
}

#[tokio::test]
async fn test_sitemap_seeds_full_mode() {
    let server = MockServer::start().await;
    mount_html(&server, "/", listing(&[]), None).await;
    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{uri}/2024/03/15/nota-uno/</loc></url>
  <url><loc>{uri}/wp-content/uploads/foto.jpg</loc></url>
</urlset>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap, "application/xml"))
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/2024/03/15/nota-uno/",
        article(
            "Nota uno",
            "El primer artículo tiene un párrafo inicial bastante largo para superar el mínimo.",
        ),
        Some(1),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut source = source_toml("diario", &server);
    source.push_str("sitemaps = [\"/sitemap.xml\"]\n");
    let config = test_config(dir.path(), &[source]);
    let (_tx, rx) = watch::channel(false);

    let result = run_with_shutdown(&config, RunTarget::All, RunMode::Full, rx)
        .await
        .unwrap();

    assert_eq!(result.inserted_count, 1);
    assert_eq!(result.per_source["diario"].discovery_pages, 2);
}
