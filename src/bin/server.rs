//! HTTP server for the ocean insights UI. Simple HTTP handling on raw
//! tokio, no framework: one request per connection, bounded reads, JSON
//! API plus a single inline page.

use ocean_insights::config::AppConfig;
use ocean_insights::engine::InsightEngine;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const INDEX_PAGE: &str = include_str!("../../static/index.html");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Starting Ocean Insights API server...");

    let config = AppConfig::from_env();
    if config.openai_api_key.is_some() {
        println!("[OK] OpenAI API key found - LLM query parsing enabled");
    } else {
        println!("[WARN] OpenAI API key not found - Heuristic parsing only");
    }
    if config.live_fetch_enabled {
        println!("[OK] Live ERDDAP tier enabled: {}", config.erddap_base_url);
    } else {
        println!("[INFO] Live ERDDAP tier disabled");
    }

    let engine = Arc::new(InsightEngine::from_config(&config)?);

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    println!("[OK] Server listening on http://localhost:8080");

    loop {
        let (stream, addr) = listener.accept().await?;
        println!("[INFO] New connection from: {}", addr);
        let engine = Arc::clone(&engine);
        tokio::spawn(handle_connection(stream, engine));
    }
}

async fn handle_connection(mut stream: TcpStream, engine: Arc<InsightEngine>) {
    use tokio::time::{timeout, Duration};

    // Read the request with a timeout to prevent hanging connections.
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if let Ok(s) = std::str::from_utf8(&buffer) {
                        if let Some(headers_end) = s.find("\r\n\r\n") {
                            match extract_content_length(s) {
                                Some(content_length) => {
                                    if buffer.len() >= headers_end + 4 + content_length {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                    // Cap request size.
                    if buffer.len() > 1_000_000 {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Failed to read from stream: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    })
    .await;

    if read_result.is_err() {
        eprintln!("[WARN] Request read timeout");
        return;
    }
    if buffer.is_empty() {
        return;
    }

    match String::from_utf8(buffer) {
        Ok(request) => {
            let response = handle_request(&request, engine).await;
            if let Err(e) = stream.write_all(response.as_bytes()).await {
                eprintln!("Failed to write response: {}", e);
            }
        }
        Err(e) => {
            eprintln!("Failed to parse request as UTF-8: {}", e);
        }
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

async fn handle_request(request: &str, engine: Arc<InsightEngine>) -> String {
    let lines: Vec<&str> = request.lines().collect();
    if lines.is_empty() {
        return create_response(400, "Bad Request", "application/json", "{}");
    }

    let request_line = lines[0];
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "application/json", "{}");
    }

    let method = parts[0];
    let full_path = parts[1];
    let path = full_path.split('?').next().unwrap_or(full_path);
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    let body = request
        .split_once("\r\n\r\n")
        .map(|(_, b)| b)
        .unwrap_or("");

    match (method, path) {
        ("OPTIONS", _) => create_response(204, "No Content", "text/plain", ""),
        ("GET", "/") => create_response(200, "OK", "text/html; charset=utf-8", INDEX_PAGE),
        ("POST", "/api/query") => handle_query(body, engine).await,
        ("GET", "/api/history") => handle_history(engine),
        _ => create_response(
            404,
            "Not Found",
            "application/json",
            r#"{"error": "not found"}"#,
        ),
    }
}

async fn handle_query(body: &str, engine: Arc<InsightEngine>) -> String {
    #[derive(serde::Deserialize)]
    struct QueryRequest {
        query: String,
    }

    let parsed: QueryRequest = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return create_response(
                400,
                "Bad Request",
                "application/json",
                &format!(r#"{{"error": "invalid request body: {}"}}"#, e),
            );
        }
    };

    let query = parsed.query.trim();
    if query.is_empty() {
        return create_response(
            400,
            "Bad Request",
            "application/json",
            r#"{"error": "query must not be empty"}"#,
        );
    }

    match engine.answer(query).await {
        Ok(answer) => {
            let body = serde_json::to_string(&answer)
                .unwrap_or_else(|_| r#"{"error": "serialization failed"}"#.to_string());
            create_response(200, "OK", "application/json", &body)
        }
        Err(e) => {
            eprintln!("[ERROR] Query failed: {}", e);
            create_response(
                500,
                "Internal Server Error",
                "application/json",
                r#"{"error": "query processing failed"}"#,
            )
        }
    }
}

fn handle_history(engine: Arc<InsightEngine>) -> String {
    let Some(log) = engine.query_log() else {
        return create_response(200, "OK", "application/json", "[]");
    };
    match log.recent(20) {
        Ok(entries) => {
            let body = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string());
            create_response(200, "OK", "application/json", &body)
        }
        Err(e) => {
            eprintln!("[ERROR] History read failed: {}", e);
            create_response(
                500,
                "Internal Server Error",
                "application/json",
                r#"{"error": "history read failed"}"#,
            )
        }
    }
}

fn create_response(status: u16, status_text: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    )
}
